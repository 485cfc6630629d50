//! Errors reported while reading `kiln.toml`.

/// Why a `kiln.toml` could not be turned into a [`ProjectConfig`](crate::ProjectConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read kiln.toml: {0}")]
    IoError(#[from] std::io::Error),

    /// The text is not valid TOML, or a value has the wrong type.
    #[error("invalid kiln.toml: {0}")]
    ParseError(String),

    /// A `[compilerOptions]` key does not name a known option.
    #[error("unknown compiler option '{0}'")]
    UnknownOption(String),

    /// The options are individually valid but cannot be combined.
    #[error("conflicting compiler options: {0}")]
    ValidationError(String),
}
