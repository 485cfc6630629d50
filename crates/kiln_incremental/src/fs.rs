//! File system access for build info and emitted outputs.
//!
//! Reading build info is fail-safe: a missing, unreadable, malformed or
//! out-of-date file is treated as no previous state and only logged.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::build_info::{BuildInfo, BUILD_INFO_VERSION};
use crate::error::IncrementalError;

/// The file operations the engine needs.
pub trait FileSystem: Send + Sync {
    /// Reads a whole file as text.
    fn read_file(&self, path: &str) -> io::Result<String>;

    /// Writes a whole file, creating parent directories as needed.
    fn write_file(&self, path: &str, content: &str) -> io::Result<()>;
}

/// [`FileSystem`] over `std::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn read_file(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write_file(&self, path: &str, content: &str) -> io::Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
    }
}

/// Reads and validates the build info at `path`, returning `None` when there
/// is no usable previous state.
pub fn read_build_info(fs: &dyn FileSystem, path: &str) -> Option<BuildInfo> {
    match try_read_build_info(fs, path) {
        Ok(build_info) => Some(build_info),
        Err(err) => {
            debug!(path, error = %err, "discarding build info");
            None
        }
    }
}

fn try_read_build_info(fs: &dyn FileSystem, path: &str) -> Result<BuildInfo, IncrementalError> {
    let text = fs.read_file(path).map_err(|source| IncrementalError::Io {
        path: PathBuf::from(path),
        source,
    })?;
    let build_info = BuildInfo::parse(&text)?;
    if !build_info.is_valid_version() {
        return Err(IncrementalError::VersionMismatch {
            expected: BUILD_INFO_VERSION.to_string(),
            actual: build_info.version,
        });
    }
    Ok(build_info)
}

/// Serializes `build_info` and writes it to `path`.
pub fn write_build_info(
    fs: &dyn FileSystem,
    path: &str,
    build_info: &BuildInfo,
) -> Result<(), IncrementalError> {
    let text = build_info.to_json()?;
    fs.write_file(path, &text)
        .map_err(|e| IncrementalError::WriteFile {
            path: path.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().replace('\\', "/")
    }

    fn current() -> BuildInfo {
        BuildInfo {
            version: BUILD_INFO_VERSION.to_string(),
            errors: true,
            file_names: vec!["./src/a.ts".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "out/nested/app.tsbuildinfo");
        write_build_info(&StdFileSystem, &path, &current()).unwrap();
        assert_eq!(read_build_info(&StdFileSystem, &path), Some(current()));
    }

    #[test]
    fn missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_build_info(&StdFileSystem, &path_in(&dir, "none.tsbuildinfo")).is_none());
    }

    #[test]
    fn corrupt_json_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "bad.tsbuildinfo");
        std::fs::write(&path, "not valid json {{{").unwrap();
        assert!(read_build_info(&StdFileSystem, &path).is_none());
    }

    #[test]
    fn other_version_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "old.tsbuildinfo");
        let old = BuildInfo {
            version: "0.0.0-old".to_string(),
            ..current()
        };
        write_build_info(&StdFileSystem, &path, &old).unwrap();
        assert!(read_build_info(&StdFileSystem, &path).is_none());

        let err = try_read_build_info(&StdFileSystem, &path).unwrap_err();
        assert!(matches!(err, IncrementalError::VersionMismatch { .. }));
    }

    #[test]
    fn write_into_a_file_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = path_in(&dir, "blocker");
        std::fs::write(&blocker, "").unwrap();
        let err = write_build_info(&StdFileSystem, &format!("{blocker}/x.tsbuildinfo"), &current())
            .unwrap_err();
        assert!(matches!(err, IncrementalError::WriteFile { .. }));
    }
}
