//! Source file identity, path arithmetic, and text ranges.
//!
//! This crate provides [`SourcePath`], the normalized identity of a file in a
//! program, the path helpers used to relativize paths against a build-info
//! directory, [`TextRange`] for diagnostic positions, and [`SourceFile`], the
//! parser's view of one file as consumed by the incremental engine.

#![warn(missing_docs)]

pub mod path;
pub mod range;
pub mod source_file;

pub use path::{
    ensure_path_is_non_module_name, get_directory_path, get_relative_path_from_directory,
    is_declaration_file_name, normalize_absolute_path, SourcePath,
};
pub use range::TextRange;
pub use source_file::{ModuleAugmentation, ModuleName, ResolutionMode, SourceFile};
