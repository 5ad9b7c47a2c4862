//! Utility functions for stopgate.
//!
//! Bounded file reads and path helpers shared by the store, the transcript
//! parser and the compaction validator.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{GateError, Result};

/// Maximum file size that can be read into memory (64 MB).
///
/// Transcripts of long sessions are the largest inputs the gate reads.
pub const MAX_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Read a file into a string with size limit protection.
///
/// # Errors
///
/// Returns an error if the file cannot be read or exceeds `MAX_FILE_SIZE`.
pub fn read_to_string_limited(path: &Path) -> Result<String> {
    read_to_string_with_limit(path, MAX_FILE_SIZE)
}

/// Read a file into a string with a custom size limit.
pub fn read_to_string_with_limit(path: &Path, max_size: u64) -> Result<String> {
    let metadata = fs::metadata(path).map_err(|e| GateError::storage(path, e))?;

    let size = metadata.len();
    if size > max_size {
        return Err(GateError::storage(
            path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("file is too large ({} bytes, max {} bytes)", size, max_size),
            ),
        ));
    }

    fs::read_to_string(path).map_err(|e| GateError::storage(path, e))
}

/// Make an arbitrary identifier safe to use as a single file name component.
///
/// Anything outside `[A-Za-z0-9_-.]` becomes `_`, and leading dots are
/// replaced so the result can never be `.`, `..` or a hidden file.
pub fn sanitize_file_component(id: &str) -> String {
    let mut out: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if out.starts_with('.') {
        out = out.replacen('.', "_", 1);
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// Lexically normalize a path, resolving `.` and `..` without touching the
/// filesystem.
///
/// `..` never climbs above the root of an absolute path.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `candidate` against `base_dir` and require it to stay inside.
///
/// Relative candidates are joined onto `base_dir`. Both sides are
/// canonicalized when they exist so symlinks cannot smuggle a path out;
/// otherwise the lexical normal form is compared.
///
/// # Errors
///
/// Returns a security error when the resolved path escapes `base_dir`.
pub fn resolve_within(base_dir: &Path, candidate: &Path) -> Result<PathBuf> {
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    };

    let (resolved, base) = match joined.canonicalize() {
        Ok(real) => {
            let base = base_dir
                .canonicalize()
                .unwrap_or_else(|_| normalize_lexically(base_dir));
            (real, base)
        }
        Err(_) => (normalize_lexically(&joined), normalize_lexically(base_dir)),
    };

    if resolved.starts_with(&base) {
        Ok(resolved)
    } else {
        Err(GateError::security(format!(
            "path {} resolves outside {}",
            candidate.display(),
            base_dir.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_read_to_string_limited_success() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.txt");
        fs::write(&path, "Hello, world!").unwrap();

        assert_eq!(read_to_string_limited(&path).unwrap(), "Hello, world!");
    }

    #[test]
    fn test_read_to_string_limited_nonexistent() {
        let temp = TempDir::new().unwrap();
        let result = read_to_string_limited(&temp.path().join("nonexistent.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_read_to_string_with_limit_exceeds() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("large.txt");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&[b'x'; 1000]).unwrap();

        let err = read_to_string_with_limit(&path, 500).unwrap_err().to_string();
        assert!(err.contains("too large"));
        assert!(err.contains("1000 bytes"));
    }

    #[test]
    fn test_read_to_string_at_boundary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("boundary.txt");
        fs::write(&path, "x".repeat(100)).unwrap();

        assert!(read_to_string_with_limit(&path, 100).is_ok());
        assert!(read_to_string_with_limit(&path, 99).is_err());
    }

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("abc-123_x.y"), "abc-123_x.y");
        assert_eq!(sanitize_file_component("../etc/passwd"), "_._etc_passwd");
        assert_eq!(sanitize_file_component(".hidden"), "_hidden");
        assert_eq!(sanitize_file_component(""), "_");
        assert_eq!(sanitize_file_component("a b/c"), "a_b_c");
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(
            normalize_lexically(Path::new("/a/../../../etc")),
            PathBuf::from("/etc")
        );
        assert_eq!(
            normalize_lexically(Path::new("../x")),
            PathBuf::from("../x")
        );
    }

    #[test]
    fn test_resolve_within_accepts_inside() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("pre.jsonl"), "").unwrap();

        let resolved = resolve_within(temp.path(), Path::new("pre.jsonl")).unwrap();
        assert!(resolved.ends_with("pre.jsonl"));
    }

    #[test]
    fn test_resolve_within_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let err = resolve_within(temp.path(), Path::new("../../../etc/passwd")).unwrap_err();
        assert!(err.is_security_violation());
    }

    #[test]
    fn test_resolve_within_rejects_absolute_outside() {
        let temp = TempDir::new().unwrap();
        let err = resolve_within(temp.path(), Path::new("/etc/passwd")).unwrap_err();
        assert!(err.is_security_violation());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_within_rejects_symlink_escape() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), "s").unwrap();
        let inside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), inside.path().join("link"))
            .unwrap();

        let err = resolve_within(inside.path(), Path::new("link")).unwrap_err();
        assert!(err.is_security_violation());
    }
}
