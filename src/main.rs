//! stopgate - Session Completion Gate for coding agents
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use stopgate::config::{stopgate_home, Config};
use stopgate::error::exit_codes;
use stopgate::hooks::{HookRunner, HookType};
use stopgate::storage::FileTurnStateStore;

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "STOPGATE_LOG";

// =============================================================================
// CLI Definition
// =============================================================================

/// stopgate - Session Completion Gate for coding agents
#[derive(Parser)]
#[command(name = "stopgate")]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// [Internal] Run a hook (JSON stdin/stdout). Called by the agent host
    Hook {
        /// The hook event type
        #[arg(value_enum)]
        event: HookEvent,
    },

    /// [User] List recent sessions with their block history
    Sessions {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Maximum number of sessions
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// [User] Dump the turn state of one session
    Debug {
        /// Session ID to inspect
        session_id: String,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Delete the session's turn state
        #[arg(long)]
        reset: bool,
    },

    /// [User] Show the considerations the stop hook runs from here
    Considerations {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum HookEvent {
    Stop,
    SubagentStop,
}

impl From<HookEvent> for HookType {
    fn from(event: HookEvent) -> Self {
        match event {
            HookEvent::Stop => HookType::Stop,
            HookEvent::SubagentStop => HookType::SubagentStop,
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();
    init_tracing();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("stopgate error: {}", e);
            ExitCode::from(exit_codes::APPROVE as u8) // Fail-open
        }
    }
}

/// Install the stderr log subscriber. Stdout carries the hook protocol.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Set up the global panic handler.
///
/// A panic on the main thread logs to `$STOPGATE_HOME/crash.log` and exits
/// with code 3. Checker panics happen on worker threads; those are only
/// logged, and the runner turns them into a synthesized pass.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let thread = std::thread::current();
        if thread.name() != Some("main") {
            eprintln!(
                "stopgate: panic on worker thread {}: {}",
                thread.name().unwrap_or("<unnamed>"),
                info
            );
            return;
        }

        eprintln!("stopgate panic: {}", info);

        if let Some(home) = stopgate_home() {
            let crash_log = home.join("crash.log");
            let _ = std::fs::create_dir_all(&home);
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Hook { event } => run_hook(event.into()),
        Commands::Sessions { json, quiet, limit } => run_sessions(json, quiet, limit),
        Commands::Debug {
            session_id,
            json,
            quiet,
            reset,
        } => run_debug(&session_id, json, quiet, reset),
        Commands::Considerations { json, quiet } => run_considerations(json, quiet),
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

fn run_hook(hook_type: HookType) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = Config::load();
    let store = FileTurnStateStore::new()?.with_lock_timeout(config.storage.lock_timeout());
    let runner = HookRunner::new(store, config);

    let output = runner.run(hook_type)?;
    println!("{}", output);

    Ok(decision_exit_code(&output))
}

/// Map the stop hook's JSON output to a process exit code.
///
/// Anything other than an explicit block approves.
fn decision_exit_code(output: &str) -> ExitCode {
    match serde_json::from_str::<serde_json::Value>(output) {
        Ok(stop_output) => match stop_output.get("decision").and_then(|d| d.as_str()) {
            Some("block") => return ExitCode::from(exit_codes::BLOCK as u8),
            Some("approve") => {}
            Some(unexpected) => {
                tracing::warn!(
                    decision = unexpected,
                    "stop hook returned unexpected decision, defaulting to approve"
                );
            }
            None => {
                tracing::warn!("stop hook output missing 'decision' field, defaulting to approve");
            }
        },
        Err(e) => {
            tracing::warn!(
                error = %e,
                "failed to parse stop hook output as JSON, defaulting to approve"
            );
        }
    }

    ExitCode::from(exit_codes::APPROVE as u8)
}

/// Convert a success boolean to an exit code.
fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::APPROVE as u8)
    } else {
        ExitCode::from(exit_codes::ERROR as u8)
    }
}

fn run_sessions(
    json: bool,
    quiet: bool,
    limit: usize,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use stopgate::cli::sessions::{SessionsCommand, SessionsOptions};

    let store = FileTurnStateStore::new()?;

    let cmd = SessionsCommand::new(store);
    let options = SessionsOptions { json, quiet, limit };

    let output = cmd.run(&options);

    if !quiet {
        if json {
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", output.format_text());
        }
    }

    Ok(success_to_exit_code(output.success))
}

fn run_debug(
    session_id: &str,
    json: bool,
    quiet: bool,
    reset: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use stopgate::cli::debug::{DebugCommand, DebugOptions};

    let config = Config::load();
    let store = FileTurnStateStore::new()?.with_lock_timeout(config.storage.lock_timeout());

    let cmd = DebugCommand::new(store);
    let options = DebugOptions { json, quiet, reset };

    let output = cmd.run(session_id, &options);
    let formatted = cmd.format_output(&output, &options);

    if !formatted.is_empty() {
        println!("{}", formatted);
    }

    Ok(success_to_exit_code(output.success))
}

fn run_considerations(json: bool, quiet: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use stopgate::cli::considerations::{ConsiderationsCommand, ConsiderationsOptions};

    let cwd = std::env::current_dir()?;
    let config = Config::load_from_cwd(&cwd);

    let cmd = ConsiderationsCommand::new(&config);
    let options = ConsiderationsOptions { json, quiet };

    let output = cmd.run(&cwd);
    let formatted = cmd.format_output(&output, &options);

    if !formatted.is_empty() {
        println!("{}", formatted);
    }

    Ok(success_to_exit_code(output.success))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_codes::APPROVE, 0);
        assert_eq!(exit_codes::ERROR, 1);
        assert_eq!(exit_codes::BLOCK, 2);
        assert_eq!(exit_codes::CRASH, 3);
    }

    #[test]
    fn test_success_to_exit_code() {
        assert_eq!(
            success_to_exit_code(true),
            ExitCode::from(exit_codes::APPROVE as u8)
        );
        assert_eq!(
            success_to_exit_code(false),
            ExitCode::from(exit_codes::ERROR as u8)
        );
    }

    #[test]
    fn test_decision_exit_code() {
        assert_eq!(
            decision_exit_code(r#"{"decision":"block","reason":"x"}"#),
            ExitCode::from(exit_codes::BLOCK as u8)
        );
        assert_eq!(
            decision_exit_code(r#"{"decision":"approve"}"#),
            ExitCode::from(exit_codes::APPROVE as u8)
        );
        assert_eq!(
            decision_exit_code(r#"{"decision":"maybe"}"#),
            ExitCode::from(exit_codes::APPROVE as u8)
        );
        assert_eq!(
            decision_exit_code("not json"),
            ExitCode::from(exit_codes::APPROVE as u8)
        );
    }

    #[test]
    fn test_hook_event_conversion() {
        assert_eq!(HookType::from(HookEvent::Stop), HookType::Stop);
        assert_eq!(
            HookType::from(HookEvent::SubagentStop),
            HookType::SubagentStop
        );
    }

    #[test]
    fn test_cli_parse_hook() {
        let cli = Cli::parse_from(["stopgate", "hook", "subagent-stop"]);
        match cli.command {
            Commands::Hook { event } => {
                assert!(matches!(event, HookEvent::SubagentStop));
            }
            _ => panic!("Expected Hook command"),
        }
    }

    #[test]
    fn test_cli_parse_sessions() {
        let cli = Cli::parse_from(["stopgate", "sessions", "--limit", "50", "--json"]);
        match cli.command {
            Commands::Sessions { json, limit, .. } => {
                assert!(json);
                assert_eq!(limit, 50);
            }
            _ => panic!("Expected Sessions command"),
        }
    }

    #[test]
    fn test_cli_parse_sessions_default_limit() {
        let cli = Cli::parse_from(["stopgate", "sessions"]);
        match cli.command {
            Commands::Sessions { limit, .. } => assert_eq!(limit, 20),
            _ => panic!("Expected Sessions command"),
        }
    }

    #[test]
    fn test_cli_parse_debug() {
        let cli = Cli::parse_from(["stopgate", "debug", "session-123", "--reset"]);
        match cli.command {
            Commands::Debug {
                session_id, reset, ..
            } => {
                assert_eq!(session_id, "session-123");
                assert!(reset);
            }
            _ => panic!("Expected Debug command"),
        }
    }

    #[test]
    fn test_cli_parse_considerations() {
        let cli = Cli::parse_from(["stopgate", "considerations", "--json"]);
        match cli.command {
            Commands::Considerations { json, quiet } => {
                assert!(json);
                assert!(!quiet);
            }
            _ => panic!("Expected Considerations command"),
        }
    }
}
