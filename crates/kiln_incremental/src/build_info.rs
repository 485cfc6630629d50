//! The persisted build-info document.
//!
//! Build info is a JSON object in which every file is named once, in
//! `fileNames`, and referred to everywhere else by its 1-based index. Sets
//! of files are likewise stored once in `fileIdsList` and referred to by
//! list id. Most entries have a compact form for their most common value
//! (a bare string or a bare id), which is why several types here serialize
//! through an untagged representation instead of deriving directly.

use crate::emit_kind::EmitKind;
use crate::error::IncrementalError;
use kiln_config::{find_declaration, CompilerOptions};
use kiln_diagnostics::Category;
use kiln_source::{normalize_absolute_path, ResolutionMode};
use serde::{Deserialize, Serialize};

/// The version written to and expected in build info.
pub const BUILD_INFO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 1-based index into [`BuildInfo::file_names`].
pub type FileId = u32;

/// 1-based index into [`BuildInfo::file_ids_list`].
pub type FileIdListId = u32;

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn no_resolution_mode() -> ResolutionMode {
    ResolutionMode::None
}

fn is_no_resolution_mode(mode: &ResolutionMode) -> bool {
    *mode == ResolutionMode::None
}

fn warning() -> Category {
    Category::Warning
}

fn is_warning(category: &Category) -> bool {
    *category == Category::Warning
}

/// The long form of a file's info.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfoFileInfoObject {
    /// Content hash of the file.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Declaration signature, omitted when it equals `version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Set when the file has no signature at all.
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_signature: bool,
    /// The file augments the global scope.
    #[serde(default, skip_serializing_if = "is_false")]
    pub affects_global_scope: bool,
    /// Module format of the file.
    #[serde(
        default = "no_resolution_mode",
        skip_serializing_if = "is_no_resolution_mode"
    )]
    pub implied_node_format: ResolutionMode,
}

/// A file's info: a bare string when signature and version agree and every
/// other field has its common value, an object otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildInfoFileInfo {
    /// Version and signature, which are equal.
    Compact(String),
    /// Every field spelled out.
    Full(BuildInfoFileInfoObject),
}

/// `[fileId, fileIdListId]`: the files `fileId` references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildInfoReferenceMapEntry(pub FileId, pub FileIdListId);

/// A persisted diagnostic. Positions are relative to the owning file unless
/// `file` names another one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfoDiagnostic {
    /// The diagnostic's file when it differs from the owning file.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub file: FileId,
    /// The diagnostic has no file.
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_file: bool,
    /// Start offset.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub pos: u32,
    /// End offset.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub end: u32,
    /// Diagnostic code.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub code: u32,
    /// Category.
    #[serde(default = "warning", skip_serializing_if = "is_warning")]
    pub category: Category,
    /// Message text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Nested elaborations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_chain: Vec<BuildInfoDiagnostic>,
    /// Related locations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_information: Vec<BuildInfoDiagnostic>,
    /// Reports unnecessary code.
    #[serde(default, skip_serializing_if = "is_false")]
    pub reports_unnecessary: bool,
    /// Reports a deprecated use.
    #[serde(default, skip_serializing_if = "is_false")]
    pub reports_deprecated: bool,
    /// Dropped when emit is disabled.
    #[serde(default, skip_serializing_if = "is_false")]
    pub skipped_on_no_emit: bool,
}

/// `[fileId, diagnostics]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfoDiagnosticsOfFile(pub FileId, pub Vec<BuildInfoDiagnostic>);

/// A semantic-diagnostics entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildInfoSemanticDiagnostic {
    /// The file has no cached diagnostics (it still needs checking).
    Uncached(FileId),
    /// The file's cached, non-empty diagnostics.
    Cached(BuildInfoDiagnosticsOfFile),
}

impl BuildInfoSemanticDiagnostic {
    fn file_id(&self) -> FileId {
        match self {
            BuildInfoSemanticDiagnostic::Uncached(id) => *id,
            BuildInfoSemanticDiagnostic::Cached(of_file) => of_file.0,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum PendingEmitRepr {
    Full(FileId),
    Dts([FileId; 1]),
    Kind(FileId, u32),
}

/// A pending-emit entry. `emit_kind` 0 stands for the full kind the options
/// ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "PendingEmitRepr", into = "PendingEmitRepr")]
pub struct BuildInfoFilePendingEmit {
    /// The file.
    pub file_id: FileId,
    /// Raw [`EmitKind`] bits, 0 for the full kind.
    pub emit_kind: u32,
}

/// Pending declaration emit only, persisted as `[fileId]`.
const DTS_BITS: u32 = EmitKind::DTS.bits();

impl From<PendingEmitRepr> for BuildInfoFilePendingEmit {
    fn from(repr: PendingEmitRepr) -> Self {
        let (file_id, emit_kind) = match repr {
            PendingEmitRepr::Full(file_id) => (file_id, 0),
            PendingEmitRepr::Dts([file_id]) => (file_id, DTS_BITS),
            PendingEmitRepr::Kind(file_id, kind) => (file_id, kind),
        };
        Self { file_id, emit_kind }
    }
}

impl From<BuildInfoFilePendingEmit> for PendingEmitRepr {
    fn from(entry: BuildInfoFilePendingEmit) -> Self {
        match entry.emit_kind {
            0 => PendingEmitRepr::Full(entry.file_id),
            DTS_BITS => PendingEmitRepr::Dts([entry.file_id]),
            kind => PendingEmitRepr::Kind(entry.file_id, kind),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum EmitSignatureValue {
    Current(String),
    WithOptions(Vec<String>),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum EmitSignatureRepr {
    NotEmitted(FileId),
    Emitted(FileId, EmitSignatureValue),
}

/// An emit-signature entry.
///
/// Persisted as a bare id when the file was never emitted, `[id, "sig"]`
/// when the emitted signature differs from the file's signature, `[id, []]`
/// when it differs only because the declaration-map option changed, and
/// `[id, ["sig"]]` when it was recorded under different options.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "EmitSignatureRepr", into = "EmitSignatureRepr")]
pub struct BuildInfoEmitSignature {
    /// The file.
    pub file_id: FileId,
    /// The emitted signature, when it is spelled out.
    pub signature: String,
    /// The signature equals the file's but was recorded under a different
    /// declaration-map option.
    pub differs_only_in_dts_map: bool,
    /// The signature was recorded under a different declaration-map option.
    pub differs_in_options: bool,
}

impl BuildInfoEmitSignature {
    /// An entry for a file that was never emitted.
    pub fn not_emitted(file_id: FileId) -> Self {
        Self {
            file_id,
            signature: String::new(),
            differs_only_in_dts_map: false,
            differs_in_options: false,
        }
    }

    /// Returns `true` for an entry recording that nothing was emitted.
    pub fn is_not_emitted(&self) -> bool {
        self.signature.is_empty() && !self.differs_only_in_dts_map && !self.differs_in_options
    }
}

impl TryFrom<EmitSignatureRepr> for BuildInfoEmitSignature {
    type Error = String;

    fn try_from(repr: EmitSignatureRepr) -> Result<Self, Self::Error> {
        let (file_id, value) = match repr {
            EmitSignatureRepr::NotEmitted(file_id) => return Ok(Self::not_emitted(file_id)),
            EmitSignatureRepr::Emitted(file_id, value) => (file_id, value),
        };
        let mut entry = Self::not_emitted(file_id);
        match value {
            EmitSignatureValue::Current(signature) => entry.signature = signature,
            EmitSignatureValue::WithOptions(list) => match <[String; 1]>::try_from(list) {
                Ok([signature]) => {
                    entry.signature = signature;
                    entry.differs_in_options = true;
                }
                Err(list) if list.is_empty() => entry.differs_only_in_dts_map = true,
                Err(list) => {
                    return Err(format!(
                        "emit signature of file {file_id} has {} entries",
                        list.len()
                    ))
                }
            },
        }
        Ok(entry)
    }
}

impl From<BuildInfoEmitSignature> for EmitSignatureRepr {
    fn from(entry: BuildInfoEmitSignature) -> Self {
        if entry.is_not_emitted() {
            return EmitSignatureRepr::NotEmitted(entry.file_id);
        }
        let value = if entry.differs_only_in_dts_map {
            EmitSignatureValue::WithOptions(Vec::new())
        } else if entry.differs_in_options {
            EmitSignatureValue::WithOptions(vec![entry.signature])
        } else {
            EmitSignatureValue::Current(entry.signature)
        };
        EmitSignatureRepr::Emitted(entry.file_id, value)
    }
}

/// The persisted build state of one program.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// Version of the compiler that wrote the file.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// The program had errors.
    #[serde(default, skip_serializing_if = "is_false")]
    pub errors: bool,
    /// Some files were not checked.
    #[serde(default, skip_serializing_if = "is_false")]
    pub check_pending: bool,
    /// File names relative to the build-info directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_names: Vec<String>,
    /// Info of each program file, in id order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_infos: Vec<BuildInfoFileInfo>,
    /// Deduplicated sorted sets of file ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_ids_list: Vec<Vec<FileId>>,
    /// Build-relevant options, path options relative to the build-info
    /// directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
    /// Forward reference index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referenced_map: Vec<BuildInfoReferenceMapEntry>,
    /// Cached semantic diagnostics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub semantic_diagnostics_per_file: Vec<BuildInfoSemanticDiagnostic>,
    /// Cached declaration-emit diagnostics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emit_diagnostics_per_file: Vec<BuildInfoDiagnosticsOfFile>,
    /// Files changed but not yet propagated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub change_file_set: Vec<FileId>,
    /// Outstanding emit work.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_files_pending_emit: Vec<BuildInfoFilePendingEmit>,
    /// Last declaration file whose content changed, relative to the
    /// build-info directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_changed_dts_file: Option<String>,
    /// Signatures of emitted declaration files that differ from the files'
    /// signatures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emit_signatures: Vec<BuildInfoEmitSignature>,
}

impl BuildInfo {
    /// Parses a build-info document.
    pub fn parse(text: &str) -> Result<Self, IncrementalError> {
        serde_json::from_str(text).map_err(|e| IncrementalError::BuildInfoParse {
            reason: e.to_string(),
        })
    }

    /// Serializes the document.
    pub fn to_json(&self) -> Result<String, IncrementalError> {
        serde_json::to_string(self).map_err(|e| IncrementalError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Returns `true` if the document was written by this compiler version.
    pub fn is_valid_version(&self) -> bool {
        self.version == BUILD_INFO_VERSION
    }

    /// Returns `true` if the document carries per-file state.
    pub fn is_incremental(&self) -> bool {
        !self.file_names.is_empty()
    }

    /// Rebuilds the persisted options, resolving path options against
    /// `build_info_directory`.
    pub fn compiler_options(
        &self,
        build_info_directory: &str,
    ) -> Result<CompilerOptions, IncrementalError> {
        let Some(options) = &self.options else {
            return Ok(CompilerOptions::default());
        };
        let absolute: serde_json::Map<_, _> = options
            .iter()
            .map(|(name, value)| {
                let is_path = find_declaration(name).is_some_and(|decl| decl.is_file_path);
                let value = match value {
                    serde_json::Value::String(path) if is_path && !path.is_empty() => {
                        serde_json::Value::String(normalize_absolute_path(path, build_info_directory))
                    }
                    other => other.clone(),
                };
                (name.clone(), value)
            })
            .collect();
        CompilerOptions::from_json(serde_json::Value::Object(absolute)).map_err(|e| {
            IncrementalError::BuildInfoParse {
                reason: format!("invalid options: {e}"),
            }
        })
    }

    /// Returns a copy with every set-like array sorted, for comparisons that
    /// must not depend on iteration order.
    pub fn canonicalized(&self) -> Self {
        let mut copy = self.clone();
        for list in &mut copy.file_ids_list {
            list.sort_unstable();
        }
        copy.referenced_map.sort();
        copy.semantic_diagnostics_per_file
            .sort_by_key(BuildInfoSemanticDiagnostic::file_id);
        copy.emit_diagnostics_per_file.sort_by_key(|entry| entry.0);
        copy.change_file_set.sort_unstable();
        copy.affected_files_pending_emit.sort();
        copy.emit_signatures.sort();
        copy
    }
}
