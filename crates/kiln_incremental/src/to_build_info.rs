//! Encoding a snapshot as build info.

use std::collections::{BTreeSet, HashMap};

use kiln_diagnostics::Diagnostic;
use kiln_source::{
    ensure_path_is_non_module_name, get_directory_path, get_relative_path_from_directory,
    ResolutionMode, SourcePath,
};

use crate::build_info::{
    BuildInfo, BuildInfoDiagnostic, BuildInfoDiagnosticsOfFile, BuildInfoEmitSignature,
    BuildInfoFileInfo, BuildInfoFileInfoObject, BuildInfoFilePendingEmit,
    BuildInfoReferenceMapEntry, BuildInfoSemanticDiagnostic, FileId, FileIdListId,
    BUILD_INFO_VERSION,
};
use crate::diagnostics_cache::{CachedDiagnostics, PersistedDiagnostic};
use crate::emit_kind::get_file_emit_kind;
use crate::program::Program;
use crate::snapshot::{EmitSignature, FileInfo, Snapshot};

/// Encodes `snapshot` of `program` as the build info written to
/// `build_info_file_name`.
///
/// Per-file state is only written for incremental builds; otherwise the
/// document records the version and the error state.
pub fn snapshot_to_build_info(
    snapshot: &Snapshot,
    program: &dyn Program,
    build_info_file_name: &str,
) -> BuildInfo {
    let mut to = ToBuildInfo {
        snapshot,
        program,
        build_info: BuildInfo {
            version: BUILD_INFO_VERSION.to_string(),
            ..Default::default()
        },
        build_info_directory: get_directory_path(build_info_file_name),
        case_sensitive: program.use_case_sensitive_file_names(),
        file_ids: HashMap::new(),
        file_id_lists: HashMap::new(),
    };
    if snapshot.options.is_incremental() {
        to.set_file_infos_and_emit_signatures();
        to.set_compiler_options();
        to.set_referenced_map();
        to.set_change_file_set();
        to.set_semantic_diagnostics();
        to.set_emit_diagnostics();
        to.set_affected_files_pending_emit();
        if let Some(latest) = &snapshot.latest_changed_dts_file {
            to.build_info.latest_changed_dts_file = Some(to.relative_to_build_info(latest));
        }
    }
    to.build_info.errors = snapshot.has_errors.is_true();
    to.build_info.check_pending = snapshot.check_pending;
    to.build_info
}

struct ToBuildInfo<'a> {
    snapshot: &'a Snapshot,
    program: &'a dyn Program,
    build_info: BuildInfo,
    build_info_directory: &'a str,
    case_sensitive: bool,
    file_ids: HashMap<SourcePath, FileId>,
    file_id_lists: HashMap<String, FileIdListId>,
}

impl ToBuildInfo<'_> {
    fn relative_to_build_info(&self, path: &str) -> String {
        ensure_path_is_non_module_name(&get_relative_path_from_directory(
            self.build_info_directory,
            path,
            self.case_sensitive,
        ))
    }

    fn to_file_id(&mut self, path: &SourcePath) -> FileId {
        if let Some(&id) = self.file_ids.get(path) {
            return id;
        }
        let relative = self.relative_to_build_info(path.as_str());
        self.build_info.file_names.push(relative);
        let id = self.build_info.file_names.len() as FileId;
        self.file_ids.insert(path.clone(), id);
        id
    }

    fn to_file_id_list_id(&mut self, paths: &BTreeSet<SourcePath>) -> FileIdListId {
        let mut ids: Vec<FileId> = paths.iter().map(|path| self.to_file_id(path)).collect();
        ids.sort_unstable();
        let key = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        if let Some(&id) = self.file_id_lists.get(&key) {
            return id;
        }
        self.build_info.file_ids_list.push(ids);
        let id = self.build_info.file_ids_list.len() as FileIdListId;
        self.file_id_lists.insert(key, id);
        id
    }

    fn set_file_infos_and_emit_signatures(&mut self) {
        let (snapshot, program) = (self.snapshot, self.program);
        let composite = snapshot.tracks_emit_signatures();
        for file in program.source_files() {
            let Some(info) = snapshot.file_infos.get(&file.path) else {
                continue;
            };
            let file_id = self.to_file_id(&file.path);
            if composite && !file.is_json && program.source_file_may_be_emitted(file, false) {
                let entry = match snapshot.emit_signatures.get(&file.path) {
                    None => Some(BuildInfoEmitSignature::not_emitted(file_id)),
                    Some(signature) => encode_emit_signature(file_id, signature, info),
                };
                self.build_info.emit_signatures.extend(entry);
            }
            self.build_info.file_infos.push(encode_file_info(info));
        }
    }

    fn set_compiler_options(&mut self) {
        let mut options = serde_json::Map::new();
        for (declaration, value) in self.snapshot.options.build_info_options() {
            let value = match value {
                serde_json::Value::String(path) if declaration.is_file_path && !path.is_empty() => {
                    serde_json::Value::String(self.relative_to_build_info(&path))
                }
                other => other,
            };
            options.insert(declaration.name.to_string(), value);
        }
        if !options.is_empty() {
            self.build_info.options = Some(options);
        }
    }

    fn set_referenced_map(&mut self) {
        let snapshot = self.snapshot;
        for path in snapshot.referenced_map.sorted_files() {
            let Some(references) = snapshot.referenced_map.references(path) else {
                continue;
            };
            let file_id = self.to_file_id(path);
            let list_id = self.to_file_id_list_id(references);
            self.build_info
                .referenced_map
                .push(BuildInfoReferenceMapEntry(file_id, list_id));
        }
    }

    fn set_change_file_set(&mut self) {
        let mut changed: Vec<_> = self.snapshot.changed_files_set.iter().collect();
        changed.sort();
        for path in changed {
            let id = self.to_file_id(path);
            self.build_info.change_file_set.push(id);
        }
    }

    fn set_semantic_diagnostics(&mut self) {
        let snapshot = self.snapshot;
        for file in self.program.source_files() {
            match snapshot.semantic_diagnostics_per_file.get(&file.path) {
                None => {
                    if !snapshot.changed_files_set.contains(&file.path) {
                        let id = self.to_file_id(&file.path);
                        self.build_info
                            .semantic_diagnostics_per_file
                            .push(BuildInfoSemanticDiagnostic::Uncached(id));
                    }
                }
                Some(cached) => {
                    if let Some(of_file) = self.to_diagnostics_of_file(&file.path, cached) {
                        self.build_info
                            .semantic_diagnostics_per_file
                            .push(BuildInfoSemanticDiagnostic::Cached(of_file));
                    }
                }
            }
        }
    }

    fn set_emit_diagnostics(&mut self) {
        let snapshot = self.snapshot;
        let mut files: Vec<_> = snapshot.emit_diagnostics_per_file.iter().collect();
        files.sort_by(|a, b| a.0.cmp(b.0));
        for (path, cached) in files {
            if let Some(of_file) = self.to_diagnostics_of_file(path, cached) {
                self.build_info.emit_diagnostics_per_file.push(of_file);
            }
        }
    }

    fn set_affected_files_pending_emit(&mut self) {
        let snapshot = self.snapshot;
        let full = get_file_emit_kind(&snapshot.options);
        let mut pending: Vec<_> = snapshot.affected_files_pending_emit.iter().collect();
        pending.sort_by(|a, b| a.0.cmp(b.0));
        for (path, &kind) in pending {
            let emittable = self
                .program
                .source_file_by_path(path)
                .is_some_and(|file| self.program.source_file_may_be_emitted(file, false));
            if !emittable {
                continue;
            }
            let file_id = self.to_file_id(path);
            let emit_kind = if kind == full { 0 } else { kind.bits() };
            self.build_info
                .affected_files_pending_emit
                .push(BuildInfoFilePendingEmit { file_id, emit_kind });
        }
    }

    fn to_diagnostics_of_file(
        &mut self,
        path: &SourcePath,
        cached: &CachedDiagnostics,
    ) -> Option<BuildInfoDiagnosticsOfFile> {
        let diagnostics = match cached {
            CachedDiagnostics::Materialized(diagnostics) if !diagnostics.is_empty() => {
                self.encode_diagnostics(path, diagnostics)
            }
            CachedDiagnostics::Persisted { records, .. } if !records.is_empty() => {
                self.encode_persisted(records)
            }
            _ => return None,
        };
        Some(BuildInfoDiagnosticsOfFile(self.to_file_id(path), diagnostics))
    }

    fn encode_diagnostics(&mut self, owner: &SourcePath, diagnostics: &[Diagnostic]) -> Vec<BuildInfoDiagnostic> {
        diagnostics
            .iter()
            .map(|diagnostic| {
                let (file, no_file) = match &diagnostic.file {
                    None => (0, true),
                    Some(file) if file == owner => (0, false),
                    Some(file) => (self.to_file_id(file), false),
                };
                BuildInfoDiagnostic {
                    file,
                    no_file,
                    pos: diagnostic.range.pos,
                    end: diagnostic.range.end,
                    code: diagnostic.code,
                    category: diagnostic.category,
                    message: diagnostic.message.clone(),
                    message_chain: self.encode_diagnostics(owner, &diagnostic.message_chain),
                    related_information: self.encode_diagnostics(owner, &diagnostic.related_information),
                    reports_unnecessary: diagnostic.reports_unnecessary,
                    reports_deprecated: diagnostic.reports_deprecated,
                    skipped_on_no_emit: diagnostic.skipped_on_no_emit,
                }
            })
            .collect()
    }

    fn encode_persisted(&mut self, records: &[PersistedDiagnostic]) -> Vec<BuildInfoDiagnostic> {
        records
            .iter()
            .map(|record| BuildInfoDiagnostic {
                file: record.file.as_ref().map_or(0, |file| self.to_file_id(file)),
                no_file: record.no_file,
                pos: record.pos,
                end: record.end,
                code: record.code,
                category: record.category,
                message: record.message.clone(),
                message_chain: self.encode_persisted(&record.message_chain),
                related_information: self.encode_persisted(&record.related_information),
                reports_unnecessary: record.reports_unnecessary,
                reports_deprecated: record.reports_deprecated,
                skipped_on_no_emit: record.skipped_on_no_emit,
            })
            .collect()
    }
}

fn encode_file_info(info: &FileInfo) -> BuildInfoFileInfo {
    if info.signature_is_version()
        && !info.affects_global_scope
        && info.implied_node_format == ResolutionMode::CommonJs
    {
        return BuildInfoFileInfo::Compact(info.version.clone());
    }
    BuildInfoFileInfo::Full(BuildInfoFileInfoObject {
        version: info.version.clone(),
        signature: info
            .signature
            .clone()
            .filter(|signature| *signature != info.version),
        no_signature: info.signature.is_none(),
        affects_global_scope: info.affects_global_scope,
        implied_node_format: info.implied_node_format,
    })
}

/// Encodes the emit signature of a file, or `None` when it matches the
/// file's signature and needs no entry.
fn encode_emit_signature(
    file_id: FileId,
    signature: &EmitSignature,
    info: &FileInfo,
) -> Option<BuildInfoEmitSignature> {
    let file_signature = info.signature.as_deref();
    let mut entry = BuildInfoEmitSignature::not_emitted(file_id);
    match signature {
        EmitSignature::Current(hash) if Some(hash.as_str()) == file_signature => return None,
        EmitSignature::Current(hash) => entry.signature = hash.clone(),
        EmitSignature::DifferentOptions(hash) if Some(hash.as_str()) == file_signature => {
            entry.differs_only_in_dts_map = true;
        }
        EmitSignature::DifferentOptions(hash) => {
            entry.signature = hash.clone();
            entry.differs_in_options = true;
        }
    }
    Some(entry)
}
