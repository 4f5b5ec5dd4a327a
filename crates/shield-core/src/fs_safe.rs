//! Atomic file I/O for policy state and enforcement artifacts.
//!
//! Both processes persist their state, and the agent rewrites the hosts
//! file and the packet-filter anchor, with the same protocol: write to a
//! temp file in the target directory, fsync the data, rename over the final
//! path, fsync the parent directory. A crash at any point leaves either the
//! old complete file or the new complete file, never a partial write.
//!
//! Reads are bounded: file size is checked before allocation so a corrupted
//! or adversarial state file cannot exhaust memory, and symlinks at state
//! paths are refused.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Default upper bound for any single state-file read.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// Errors from atomic filesystem operations.
#[derive(Debug, thiserror::Error)]
pub enum FsSafeError {
    /// File exceeds the configured size cap.
    #[error("file too large: {size} bytes exceeds maximum of {max} bytes")]
    FileTooLarge {
        /// Actual file size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        max: u64,
    },

    /// The target path is a symbolic link.
    #[error("refusing to open symlink at {}", path.display())]
    SymlinkRefused {
        /// Path that was a symlink.
        path: std::path::PathBuf,
    },

    /// The final path has no parent directory.
    #[error("path has no parent directory: {}", path.display())]
    NoParentDirectory {
        /// Path with no parent.
        path: std::path::PathBuf,
    },

    /// JSON serialization failed.
    #[error("json serialization failed: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// JSON deserialization failed.
    #[error("json deserialization failed: {0}")]
    DeserializeFailed(#[source] serde_json::Error),

    /// An I/O error occurred during the operation.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// Description of the operation that failed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl FsSafeError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Writes `data` to `path` atomically via the temp + fsync + rename
/// protocol.
///
/// The resulting file has mode 0600 (the `NamedTempFile` default). For
/// world-readable artifacts such as the hosts file, use
/// [`atomic_write_mode`].
///
/// # Errors
///
/// Returns [`FsSafeError`] if any filesystem operation fails.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), FsSafeError> {
    atomic_write_inner(path, data, None)
}

/// Writes `data` to `path` atomically with an explicit Unix file mode.
///
/// The hosts file and the packet-filter anchor must stay world-readable
/// after the rename; `NamedTempFile`'s 0600 default would break the
/// resolver and `pfctl`, so the mode is set on the temp file before it is
/// renamed into place.
///
/// # Errors
///
/// Returns [`FsSafeError`] if any filesystem operation fails.
pub fn atomic_write_mode(path: &Path, data: &[u8], mode: u32) -> Result<(), FsSafeError> {
    atomic_write_inner(path, data, Some(mode))
}

fn atomic_write_inner(path: &Path, data: &[u8], mode: Option<u32>) -> Result<(), FsSafeError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| FsSafeError::NoParentDirectory {
            path: path.to_path_buf(),
        })?;

    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| FsSafeError::io("create parent directory", e))?;
    }

    // Temp file in the same directory: same filesystem, so the rename is
    // atomic.
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| FsSafeError::io("create temp file", e))?;

    tmp.write_all(data)
        .map_err(|e| FsSafeError::io("write to temp file", e))?;
    tmp.flush()
        .map_err(|e| FsSafeError::io("flush temp file", e))?;

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))
            .map_err(|e| FsSafeError::io("set temp file mode", e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    tmp.as_file()
        .sync_all()
        .map_err(|e| FsSafeError::io("fsync temp file", e))?;

    tmp.persist(path)
        .map_err(|e| FsSafeError::io("atomic rename to final path", e.error))?;

    // fsync the parent so the rename itself is durable.
    let dir = File::open(parent).map_err(|e| FsSafeError::io("open directory for fsync", e))?;
    dir.sync_all()
        .map_err(|e| FsSafeError::io("fsync directory", e))?;

    Ok(())
}

/// Serializes `value` to pretty-printed JSON and writes it atomically.
///
/// Serialization happens in memory before any file I/O, so a serialization
/// failure never leaves a partial file on disk.
///
/// # Errors
///
/// Returns [`FsSafeError::SerializeFailed`] or any I/O error from
/// [`atomic_write`].
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), FsSafeError> {
    let json = serde_json::to_string_pretty(value).map_err(FsSafeError::SerializeFailed)?;
    atomic_write(path, json.as_bytes())
}

/// Reads the raw bytes of a regular file with a size cap.
///
/// # Errors
///
/// - [`FsSafeError::FileTooLarge`] if the file exceeds `max_size`.
/// - [`FsSafeError::SymlinkRefused`] if the path is a symlink.
/// - [`FsSafeError::Io`] on any I/O error.
pub fn bounded_read(path: &Path, max_size: u64) -> Result<Vec<u8>, FsSafeError> {
    let meta =
        fs::symlink_metadata(path).map_err(|e| FsSafeError::io("stat before open", e))?;
    if meta.file_type().is_symlink() {
        return Err(FsSafeError::SymlinkRefused {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path).map_err(|e| FsSafeError::io("open file", e))?;
    let size = file
        .metadata()
        .map_err(|e| FsSafeError::io("fstat for size check", e))?
        .len();
    if size > max_size {
        return Err(FsSafeError::FileTooLarge {
            size,
            max: max_size,
        });
    }

    let mut buf = Vec::with_capacity(size.min(max_size) as usize);
    file.take(max_size.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|e| FsSafeError::io("bounded read", e))?;

    // The file may have grown between stat and read; take() caps us at
    // max_size + 1, so re-check.
    if buf.len() as u64 > max_size {
        return Err(FsSafeError::FileTooLarge {
            size: buf.len() as u64,
            max: max_size,
        });
    }

    Ok(buf)
}

/// Reads and deserializes a JSON file with a size cap.
///
/// # Errors
///
/// Any error from [`bounded_read`], or
/// [`FsSafeError::DeserializeFailed`] if parsing fails.
pub fn bounded_read_json<T: DeserializeOwned>(
    path: &Path,
    max_size: u64,
) -> Result<T, FsSafeError> {
    let bytes = bounded_read(path, max_size)?;
    serde_json::from_slice(&bytes).map_err(FsSafeError::DeserializeFailed)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestState {
        version: u32,
        names: Vec<String>,
    }

    #[test]
    fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = TestState {
            version: 1,
            names: vec!["a".into(), "b".into()],
        };

        atomic_write_json(&path, &state).unwrap();
        let loaded: TestState = bounded_read_json(&path, DEFAULT_MAX_FILE_SIZE).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn overwrite_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second, longer content").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second, longer content");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("state.json");
        atomic_write(&path, b"x").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"x");
    }

    #[cfg(unix)]
    #[test]
    fn explicit_mode_is_applied() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        atomic_write_mode(&path, b"127.0.0.1 localhost\n", 0o644).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().mode() & 0o777, 0o644);
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.json");
        fs::write(&path, vec![b'x'; 1024]).unwrap();

        match bounded_read(&path, 100) {
            Err(FsSafeError::FileTooLarge { size, max }) => {
                assert_eq!(size, 1024);
                assert_eq!(max, 100);
            },
            other => panic!("expected FileTooLarge, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.json");
        let link = dir.path().join("link.json");
        fs::write(&target, b"{}").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(matches!(
            bounded_read(&link, DEFAULT_MAX_FILE_SIZE),
            Err(FsSafeError::SymlinkRefused { .. })
        ));
    }

    #[test]
    fn serialization_failure_leaves_no_file() {
        // A map with non-string keys fails to serialize as JSON.
        use std::collections::HashMap;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let bad: HashMap<Vec<u8>, u32> = HashMap::from([(vec![1u8], 1)]);

        assert!(atomic_write_json(&path, &bad).is_err());
        assert!(!path.exists());
    }
}
