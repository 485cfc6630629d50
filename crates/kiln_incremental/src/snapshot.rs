//! The in-memory incremental state of one program.
//!
//! A [`Snapshot`] is produced by the diff phase, refined by propagation and
//! emit, and persisted as build info. Every phase stages its results
//! elsewhere and folds them in through a single commit, so the fields here
//! are only written from one thread at a time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kiln_common::Tristate;
use kiln_config::CompilerOptions;
use kiln_source::{ResolutionMode, SourcePath};

use crate::diagnostics_cache::CachedDiagnostics;
use crate::emit_kind::EmitKind;
use crate::reference_map::ReferenceMap;
use crate::signature::compute_hash;

/// Per-file state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// Content hash.
    pub version: String,
    /// Hash of the declaration surface. Seeded with `version` for a file
    /// first seen; `None` when build info recorded that no signature was
    /// ever computed.
    pub signature: Option<String>,
    /// The file contributes to the global scope.
    pub affects_global_scope: bool,
    /// Module format of the file.
    pub implied_node_format: ResolutionMode,
}

impl FileInfo {
    /// Returns `true` if the signature has never been specialized beyond the
    /// file's content hash.
    pub fn signature_is_version(&self) -> bool {
        self.signature.as_deref() == Some(self.version.as_str())
    }
}

/// The signature of the declaration file actually written for a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmitSignature {
    /// Written with the current declaration-map setting.
    Current(String),
    /// Written with the opposite declaration-map setting.
    DifferentOptions(String),
}

impl EmitSignature {
    /// Carries a signature recorded under `old` options over to `new` ones:
    /// the two forms swap when the declaration-map setting flipped.
    pub fn for_options(self, old: &CompilerOptions, new: &CompilerOptions) -> Self {
        if old.declaration_map.is_true() == new.declaration_map.is_true() {
            return self;
        }
        match self {
            EmitSignature::Current(hash) => EmitSignature::DifferentOptions(hash),
            EmitSignature::DifferentOptions(hash) => EmitSignature::Current(hash),
        }
    }

    /// The recorded hash, whichever form it is in.
    pub fn hash(&self) -> &str {
        match self {
            EmitSignature::Current(hash) | EmitSignature::DifferentOptions(hash) => hash,
        }
    }
}

/// All incremental state of one program.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub(crate) file_infos: HashMap<SourcePath, FileInfo>,
    pub(crate) options: CompilerOptions,
    pub(crate) referenced_map: ReferenceMap,
    pub(crate) semantic_diagnostics_per_file: HashMap<SourcePath, Arc<CachedDiagnostics>>,
    pub(crate) emit_diagnostics_per_file: HashMap<SourcePath, Arc<CachedDiagnostics>>,
    pub(crate) changed_files_set: HashSet<SourcePath>,
    pub(crate) affected_files_pending_emit: HashMap<SourcePath, EmitKind>,
    pub(crate) latest_changed_dts_file: Option<String>,
    pub(crate) emit_signatures: HashMap<SourcePath, EmitSignature>,
    pub(crate) has_errors: Tristate,
    pub(crate) check_pending: bool,
    pub(crate) build_info_emit_pending: bool,
    pub(crate) has_errors_from_old_state: Tristate,
    pub(crate) hash_with_text: bool,
}

impl Snapshot {
    /// An empty snapshot for `options`.
    pub fn new(options: CompilerOptions, hash_with_text: bool) -> Self {
        Self {
            file_infos: HashMap::new(),
            options,
            referenced_map: ReferenceMap::new(),
            semantic_diagnostics_per_file: HashMap::new(),
            emit_diagnostics_per_file: HashMap::new(),
            changed_files_set: HashSet::new(),
            affected_files_pending_emit: HashMap::new(),
            latest_changed_dts_file: None,
            emit_signatures: HashMap::new(),
            has_errors: Tristate::Unknown,
            check_pending: false,
            build_info_emit_pending: false,
            has_errors_from_old_state: Tristate::Unknown,
            hash_with_text,
        }
    }

    /// The options the snapshot was built for.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Info of `path`, if it is part of the program.
    pub fn file_info(&self, path: &SourcePath) -> Option<&FileInfo> {
        self.file_infos.get(path)
    }

    /// Info of every file.
    pub fn file_infos(&self) -> &HashMap<SourcePath, FileInfo> {
        &self.file_infos
    }

    /// The file reference graph.
    pub fn referenced_map(&self) -> &ReferenceMap {
        &self.referenced_map
    }

    /// Files changed since the last propagation.
    pub fn changed_files(&self) -> &HashSet<SourcePath> {
        &self.changed_files_set
    }

    /// Outstanding emit work per file.
    pub fn pending_emit(&self) -> &HashMap<SourcePath, EmitKind> {
        &self.affected_files_pending_emit
    }

    /// Outstanding emit work for `path`.
    pub fn pending_emit_of(&self, path: &SourcePath) -> Option<EmitKind> {
        self.affected_files_pending_emit.get(path).copied()
    }

    /// Returns `true` if semantic diagnostics of `path` are cached.
    pub fn has_cached_semantic_diagnostics(&self, path: &SourcePath) -> bool {
        self.semantic_diagnostics_per_file.contains_key(path)
    }

    /// The cached semantic diagnostics of `path`.
    pub fn semantic_diagnostics_of(&self, path: &SourcePath) -> Option<&Arc<CachedDiagnostics>> {
        self.semantic_diagnostics_per_file.get(path)
    }

    /// The cached declaration-emit diagnostics of `path`.
    pub fn emit_diagnostics_of(&self, path: &SourcePath) -> Option<&Arc<CachedDiagnostics>> {
        self.emit_diagnostics_per_file.get(path)
    }

    /// The signature of the declaration file last written for `path`.
    pub fn emit_signature(&self, path: &SourcePath) -> Option<&EmitSignature> {
        self.emit_signatures.get(path)
    }

    /// The last declaration output whose content changed.
    pub fn latest_changed_dts_file(&self) -> Option<&str> {
        self.latest_changed_dts_file.as_deref()
    }

    /// Whether the program had errors, if known.
    pub fn has_errors(&self) -> Tristate {
        self.has_errors
    }

    /// Returns `true` if some files were not checked.
    pub fn check_pending(&self) -> bool {
        self.check_pending
    }

    /// Returns `true` if the build info is out of date.
    pub fn build_info_emit_pending(&self) -> bool {
        self.build_info_emit_pending
    }

    /// Hashes `text` the way this snapshot hashes versions and signatures.
    pub fn compute_hash(&self, text: &str) -> String {
        compute_hash(text, self.hash_with_text)
    }

    /// Records `path` as changed.
    pub fn add_file_to_change_set(&mut self, path: SourcePath) {
        self.changed_files_set.insert(path);
        self.build_info_emit_pending = true;
    }

    /// Adds `kind` to the outstanding emit work of `path`. Cached emit
    /// diagnostics of the file become stale.
    pub fn add_file_to_affected_files_pending_emit(&mut self, path: SourcePath, kind: EmitKind) {
        self.emit_diagnostics_per_file.remove(&path);
        *self
            .affected_files_pending_emit
            .entry(path)
            .or_insert(EmitKind::empty()) |= kind;
        self.build_info_emit_pending = true;
    }

    /// Returns `true` if emit signatures are tracked, i.e. for composite
    /// builds.
    pub(crate) fn tracks_emit_signatures(&self) -> bool {
        self.options.composite.is_true()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str) -> SourcePath {
        SourcePath::from_normalized(format!("/p/{name}"))
    }

    fn with_declaration_map(on: bool) -> CompilerOptions {
        CompilerOptions {
            composite: Tristate::True,
            declaration_map: on.into(),
            ..Default::default()
        }
    }

    #[test]
    fn emit_signature_swaps_when_map_flips() {
        let off = with_declaration_map(false);
        let on = with_declaration_map(true);
        let sig = EmitSignature::Current("abc".into());
        assert_eq!(
            sig.clone().for_options(&off, &on),
            EmitSignature::DifferentOptions("abc".into())
        );
        assert_eq!(sig.clone().for_options(&on, &on), sig);
        assert_eq!(
            EmitSignature::DifferentOptions("abc".into()).for_options(&on, &off),
            EmitSignature::Current("abc".into())
        );
    }

    #[test]
    fn pending_emit_accumulates_and_drops_emit_diagnostics() {
        let mut snapshot = Snapshot::new(CompilerOptions::default(), false);
        snapshot
            .emit_diagnostics_per_file
            .insert(p("a.ts"), Arc::new(CachedDiagnostics::empty()));
        snapshot.add_file_to_affected_files_pending_emit(p("a.ts"), EmitKind::JS);
        snapshot.add_file_to_affected_files_pending_emit(p("a.ts"), EmitKind::DTS);

        assert_eq!(snapshot.pending_emit_of(&p("a.ts")), Some(EmitKind::JS | EmitKind::DTS));
        assert!(snapshot.emit_diagnostics_of(&p("a.ts")).is_none());
        assert!(snapshot.build_info_emit_pending());
    }

    #[test]
    fn change_set_marks_dirty() {
        let mut snapshot = Snapshot::new(CompilerOptions::default(), false);
        assert!(!snapshot.build_info_emit_pending());
        snapshot.add_file_to_change_set(p("a.ts"));
        assert!(snapshot.changed_files().contains(&p("a.ts")));
        assert!(snapshot.build_info_emit_pending());
    }

    #[test]
    fn hash_uses_snapshot_setting() {
        let plain = Snapshot::new(CompilerOptions::default(), false);
        let texty = Snapshot::new(CompilerOptions::default(), true);
        assert!(texty.compute_hash("x").ends_with("-x"));
        assert!(!plain.compute_hash("x").contains('-'));
    }

    #[test]
    fn signature_is_version() {
        let mut info = FileInfo {
            version: "v".into(),
            signature: Some("v".into()),
            affects_global_scope: false,
            implied_node_format: ResolutionMode::CommonJs,
        };
        assert!(info.signature_is_version());
        info.signature = None;
        assert!(!info.signature_is_version());
    }
}
