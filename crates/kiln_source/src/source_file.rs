//! The parser's view of one source file, as consumed by the incremental engine.

use crate::path::SourcePath;
use crate::range::TextRange;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Module format a file is interpreted under.
///
/// Persisted as its numeric value; `CommonJs` is the default assumed when a
/// compact build-info entry omits it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum ResolutionMode {
    /// No explicit format (the file's format is decided by options alone).
    None,
    /// CommonJS module format.
    #[default]
    CommonJs,
    /// ECMAScript module format.
    EsNext,
}

impl ResolutionMode {
    /// Returns the persisted numeric value.
    pub fn as_u8(self) -> u8 {
        match self {
            ResolutionMode::None => 0,
            ResolutionMode::CommonJs => 1,
            ResolutionMode::EsNext => 99,
        }
    }

    /// Parses a persisted numeric value. Unknown values map to `None`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ResolutionMode::CommonJs,
            99 => ResolutionMode::EsNext,
            _ => ResolutionMode::None,
        }
    }
}

impl Serialize for ResolutionMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ResolutionMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_u8(u8::deserialize(deserializer)?))
    }
}

/// A module specifier as written in the file (`import ... from "./b"`).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ModuleName {
    /// The specifier text without quotes.
    pub text: String,
    /// Where the specifier literal appears.
    pub range: TextRange,
}

impl ModuleName {
    /// Creates a module name at the given range.
    pub fn new(text: impl Into<String>, range: TextRange) -> Self {
        Self {
            text: text.into(),
            range,
        }
    }
}

/// A `declare module`/`declare global` block that augments another scope.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ModuleAugmentation {
    /// `declare global { ... }` inside a module.
    Global,
    /// `declare module "name" { ... }` augmenting a named module.
    Module(ModuleName),
}

/// A parsed source file.
///
/// Carries the text plus the structural facts the incremental engine needs to
/// decide whether the file changed shape: its imports, triple-slash
/// references, augmentations, and whether it is a module or a global script.
#[derive(Clone, Debug)]
pub struct SourceFile {
    /// The file name as given to the program.
    pub file_name: String,
    /// Normalized identity of the file.
    pub path: SourcePath,
    /// Full text of the file.
    pub text: Arc<str>,
    /// `true` for `.d.ts` inputs.
    pub is_declaration_file: bool,
    /// `true` if the file has top-level imports or exports.
    pub is_external_module: bool,
    /// `true` for JSON inputs.
    pub is_json: bool,
    /// `true` if any top-level statement is something other than an ambient
    /// `declare module "name"` block.
    pub has_non_ambient_module_statement: bool,
    /// Module specifiers imported by this file.
    pub imports: Vec<ModuleName>,
    /// Triple-slash `path` references, as written.
    pub referenced_files: Vec<String>,
    /// Scopes this file augments.
    pub module_augmentations: Vec<ModuleAugmentation>,
}

impl SourceFile {
    /// Creates a script file with no imports or augmentations.
    pub fn new(file_name: impl Into<String>, path: SourcePath, text: impl Into<Arc<str>>) -> Self {
        let text: Arc<str> = text.into();
        let file_name = file_name.into();
        Self {
            is_declaration_file: path.is_declaration_file(),
            is_json: file_name.ends_with(".json"),
            file_name,
            path,
            text,
            is_external_module: false,
            has_non_ambient_module_statement: false,
            imports: Vec::new(),
            referenced_files: Vec::new(),
            module_augmentations: Vec::new(),
        }
    }
}
