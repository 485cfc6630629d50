//! Compiler options, option metadata, and loading of `kiln.toml` configuration.
//!
//! This crate defines the strongly-typed [`CompilerOptions`] consumed by the
//! incremental engine, the static [`OptionDeclaration`] table that says which
//! options affect emit, checking, declaration paths, and persisted build state,
//! and the loader that reads both options and [`EngineSettings`] from TOML.

#![warn(missing_docs)]

pub mod declarations;
pub mod error;
pub mod loader;
pub mod options;
pub mod settings;

pub use declarations::{
    compiler_options_affect_declaration_path, compiler_options_affect_emit,
    compiler_options_affect_semantic_diagnostics, find_declaration, OptionDeclaration,
    OptionValue, OPTION_DECLARATIONS,
};
pub use error::ConfigError;
pub use loader::{
    load_config, load_config_from_str, load_options_from_str, ProjectConfig, CONFIG_FILE_NAME,
};
pub use options::CompilerOptions;
pub use settings::EngineSettings;
