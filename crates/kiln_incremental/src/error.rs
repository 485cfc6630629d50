//! Error types for build-info persistence.

use std::path::PathBuf;

/// Errors that can occur while reading or writing persisted build state.
///
/// Loading is fail-safe: callers turn these into "no previous state" and log
/// the reason. Write failures are reported to the user as a diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum IncrementalError {
    /// An I/O error occurred while reading a build-info file.
    #[error("build info I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The build-info file is not a valid build-info JSON document.
    #[error("failed to parse build info: {reason}")]
    BuildInfoParse {
        /// Description of the parse failure.
        reason: String,
    },

    /// The build-info file was written by a different compiler version.
    #[error("build info version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The running compiler's version.
        expected: String,
        /// The version recorded in the file.
        actual: String,
    },

    /// The build info could not be serialized.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// The build-info file could not be written.
    #[error("could not write {path}: {reason}")]
    WriteFile {
        /// The build-info file name.
        path: String,
        /// Description of the write failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = IncrementalError::Io {
            path: PathBuf::from("/p/out/kiln.tsbuildinfo"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        let msg = err.to_string();
        assert!(msg.contains("build info I/O error"));
        assert!(msg.contains("kiln.tsbuildinfo"));
    }

    #[test]
    fn version_mismatch_display() {
        let err = IncrementalError::VersionMismatch {
            expected: "0.1.0".to_string(),
            actual: "0.0.9".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "build info version mismatch: expected 0.1.0, got 0.0.9"
        );
    }

    #[test]
    fn parse_error_display() {
        let err = IncrementalError::BuildInfoParse {
            reason: "expected value at line 1 column 1".to_string(),
        };
        assert!(err.to_string().starts_with("failed to parse build info:"));
    }

    #[test]
    fn write_error_display() {
        let err = IncrementalError::WriteFile {
            path: "/p/kiln.tsbuildinfo".to_string(),
            reason: "read-only file system".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "could not write /p/kiln.tsbuildinfo: read-only file system"
        );
    }
}
