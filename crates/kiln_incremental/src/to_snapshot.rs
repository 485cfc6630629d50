//! Decoding build info back into a snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use kiln_common::Tristate;
use kiln_source::{get_directory_path, normalize_absolute_path, ResolutionMode, SourcePath};

use crate::build_info::{
    BuildInfo, BuildInfoDiagnostic, BuildInfoFileInfo, BuildInfoSemanticDiagnostic, FileId,
    FileIdListId,
};
use crate::diagnostics_cache::{CachedDiagnostics, PersistedDiagnostic};
use crate::emit_kind::{get_file_emit_kind, EmitKind};
use crate::error::IncrementalError;
use crate::fs::{read_build_info, FileSystem};
use crate::snapshot::{EmitSignature, FileInfo, Snapshot};

/// Reads the build info at `build_info_file_name` and decodes it. Returns
/// `None` when there is no usable previous state.
pub fn read_build_info_snapshot(
    fs: &dyn FileSystem,
    build_info_file_name: &str,
    current_directory: &str,
    case_sensitive: bool,
    hash_with_text: bool,
) -> Option<Snapshot> {
    let build_info_file_name = normalize_absolute_path(build_info_file_name, current_directory);
    let build_info = read_build_info(fs, &build_info_file_name)?;
    if !build_info.is_incremental() {
        tracing::debug!(path = %build_info_file_name, "build info carries no per-file state");
        return None;
    }
    match build_info_to_snapshot(&build_info, &build_info_file_name, case_sensitive, hash_with_text) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            tracing::debug!(path = %build_info_file_name, error = %err, "discarding build info");
            None
        }
    }
}

/// Decodes `build_info`, read from the absolute path `build_info_file_name`.
pub fn build_info_to_snapshot(
    build_info: &BuildInfo,
    build_info_file_name: &str,
    case_sensitive: bool,
    hash_with_text: bool,
) -> Result<Snapshot, IncrementalError> {
    let directory = get_directory_path(build_info_file_name);
    let options = build_info.compiler_options(directory)?;
    let file_paths: Vec<SourcePath> = build_info
        .file_names
        .iter()
        .map(|name| SourcePath::new(name, directory, case_sensitive))
        .collect();

    let mut to = ToSnapshot {
        build_info,
        file_paths,
        file_path_sets: Vec::new(),
        snapshot: Snapshot::new(options, hash_with_text),
    };
    to.file_path_sets = build_info
        .file_ids_list
        .iter()
        .map(|ids| {
            ids.iter()
                .map(|&id| to.file_path(id).cloned())
                .collect::<Result<BTreeSet<_>, _>>()
        })
        .collect::<Result<_, _>>()?;

    to.set_file_infos_and_emit_signatures()?;
    to.set_referenced_map()?;
    to.set_change_file_set()?;
    to.set_semantic_diagnostics()?;
    to.set_emit_diagnostics()?;
    to.set_affected_files_pending_emit()?;
    if let Some(latest) = &build_info.latest_changed_dts_file {
        to.snapshot.latest_changed_dts_file = Some(normalize_absolute_path(latest, directory));
    }
    to.snapshot.has_errors = Tristate::from(build_info.errors);
    to.snapshot.check_pending = build_info.check_pending;
    Ok(to.snapshot)
}

struct ToSnapshot<'a> {
    build_info: &'a BuildInfo,
    file_paths: Vec<SourcePath>,
    file_path_sets: Vec<BTreeSet<SourcePath>>,
    snapshot: Snapshot,
}

fn out_of_range(kind: &str, id: u32) -> IncrementalError {
    IncrementalError::BuildInfoParse {
        reason: format!("{kind} id {id} is out of range"),
    }
}

impl ToSnapshot<'_> {
    fn file_path(&self, id: FileId) -> Result<&SourcePath, IncrementalError> {
        (id as usize)
            .checked_sub(1)
            .and_then(|index| self.file_paths.get(index))
            .ok_or_else(|| out_of_range("file", id))
    }

    fn file_path_set(&self, id: FileIdListId) -> Result<&BTreeSet<SourcePath>, IncrementalError> {
        (id as usize)
            .checked_sub(1)
            .and_then(|index| self.file_path_sets.get(index))
            .ok_or_else(|| out_of_range("file list", id))
    }

    fn set_file_infos_and_emit_signatures(&mut self) -> Result<(), IncrementalError> {
        let composite = self.snapshot.tracks_emit_signatures();
        for (index, entry) in self.build_info.file_infos.iter().enumerate() {
            let path = self.file_path(index as FileId + 1)?.clone();
            let info = decode_file_info(entry);
            if composite {
                if let Some(signature) = &info.signature {
                    self.snapshot
                        .emit_signatures
                        .insert(path.clone(), EmitSignature::Current(signature.clone()));
                }
            }
            self.snapshot.file_infos.insert(path, info);
        }

        for entry in &self.build_info.emit_signatures {
            let path = self.file_path(entry.file_id)?.clone();
            if entry.is_not_emitted() {
                self.snapshot.emit_signatures.remove(&path);
                continue;
            }
            let signature = if entry.differs_only_in_dts_map {
                let seeded = self
                    .snapshot
                    .emit_signatures
                    .get(&path)
                    .map(|signature| signature.hash().to_string())
                    .unwrap_or_default();
                EmitSignature::DifferentOptions(seeded)
            } else if entry.differs_in_options {
                EmitSignature::DifferentOptions(entry.signature.clone())
            } else {
                EmitSignature::Current(entry.signature.clone())
            };
            self.snapshot.emit_signatures.insert(path, signature);
        }
        Ok(())
    }

    fn set_referenced_map(&mut self) -> Result<(), IncrementalError> {
        for entry in &self.build_info.referenced_map {
            let path = self.file_path(entry.0)?.clone();
            let references = self.file_path_set(entry.1)?.clone();
            self.snapshot.referenced_map.set(path, references);
        }
        Ok(())
    }

    fn set_change_file_set(&mut self) -> Result<(), IncrementalError> {
        for &id in &self.build_info.change_file_set {
            let path = self.file_path(id)?.clone();
            self.snapshot.changed_files_set.insert(path);
        }
        Ok(())
    }

    fn set_semantic_diagnostics(&mut self) -> Result<(), IncrementalError> {
        let empty = Arc::new(CachedDiagnostics::empty());
        let unchanged: Vec<SourcePath> = self
            .snapshot
            .file_infos
            .keys()
            .filter(|path| !self.snapshot.changed_files_set.contains(*path))
            .cloned()
            .collect();
        for path in unchanged {
            self.snapshot
                .semantic_diagnostics_per_file
                .insert(path, Arc::clone(&empty));
        }

        for entry in &self.build_info.semantic_diagnostics_per_file {
            match entry {
                BuildInfoSemanticDiagnostic::Uncached(id) => {
                    let path = self.file_path(*id)?.clone();
                    self.snapshot.semantic_diagnostics_per_file.remove(&path);
                }
                BuildInfoSemanticDiagnostic::Cached(of_file) => {
                    let path = self.file_path(of_file.0)?.clone();
                    let records = self.decode_diagnostics(&of_file.1)?;
                    self.snapshot
                        .semantic_diagnostics_per_file
                        .insert(path, Arc::new(CachedDiagnostics::persisted(records)));
                }
            }
        }
        Ok(())
    }

    fn set_emit_diagnostics(&mut self) -> Result<(), IncrementalError> {
        for of_file in &self.build_info.emit_diagnostics_per_file {
            let path = self.file_path(of_file.0)?.clone();
            let records = self.decode_diagnostics(&of_file.1)?;
            self.snapshot
                .emit_diagnostics_per_file
                .insert(path, Arc::new(CachedDiagnostics::persisted(records)));
        }
        Ok(())
    }

    fn set_affected_files_pending_emit(&mut self) -> Result<(), IncrementalError> {
        let full = get_file_emit_kind(&self.snapshot.options);
        for entry in &self.build_info.affected_files_pending_emit {
            let path = self.file_path(entry.file_id)?.clone();
            let kind = match entry.emit_kind {
                0 => full,
                bits => EmitKind::from_bits_truncate(bits),
            };
            self.snapshot.affected_files_pending_emit.insert(path, kind);
        }
        Ok(())
    }

    fn decode_diagnostics(
        &self,
        diagnostics: &[BuildInfoDiagnostic],
    ) -> Result<Vec<PersistedDiagnostic>, IncrementalError> {
        diagnostics
            .iter()
            .map(|diagnostic| -> Result<PersistedDiagnostic, IncrementalError> {
                let file = match diagnostic.file {
                    0 => None,
                    id => Some(self.file_path(id)?.clone()),
                };
                Ok(PersistedDiagnostic {
                    file,
                    no_file: diagnostic.no_file,
                    pos: diagnostic.pos,
                    end: diagnostic.end,
                    code: diagnostic.code,
                    category: diagnostic.category,
                    message: diagnostic.message.clone(),
                    message_chain: self.decode_diagnostics(&diagnostic.message_chain)?,
                    related_information: self.decode_diagnostics(&diagnostic.related_information)?,
                    reports_unnecessary: diagnostic.reports_unnecessary,
                    reports_deprecated: diagnostic.reports_deprecated,
                    skipped_on_no_emit: diagnostic.skipped_on_no_emit,
                })
            })
            .collect()
    }
}

fn decode_file_info(entry: &BuildInfoFileInfo) -> FileInfo {
    match entry {
        BuildInfoFileInfo::Compact(hash) => FileInfo {
            version: hash.clone(),
            signature: Some(hash.clone()),
            affects_global_scope: false,
            implied_node_format: ResolutionMode::CommonJs,
        },
        BuildInfoFileInfo::Full(object) => FileInfo {
            version: object.version.clone(),
            signature: if object.no_signature {
                None
            } else {
                Some(object.signature.clone().unwrap_or_else(|| object.version.clone()))
            },
            affects_global_scope: object.affects_global_scope,
            implied_node_format: object.implied_node_format,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_info::{BuildInfoDiagnosticsOfFile, BuildInfoEmitSignature, BUILD_INFO_VERSION};
    use kiln_diagnostics::Category;

    fn p(name: &str) -> SourcePath {
        SourcePath::from_normalized(format!("/p/{name}"))
    }

    fn two_files() -> BuildInfo {
        BuildInfo {
            version: BUILD_INFO_VERSION.to_string(),
            file_names: vec!["./src/a.ts".into(), "./src/b.ts".into()],
            file_infos: vec![
                BuildInfoFileInfo::Compact("ha".into()),
                BuildInfoFileInfo::Compact("hb".into()),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn names_resolve_against_build_info_directory() {
        let snapshot = build_info_to_snapshot(&two_files(), "/p/kiln.tsbuildinfo", true, false).unwrap();
        let info = snapshot.file_info(&p("src/a.ts")).unwrap();
        assert_eq!(info.version, "ha");
        assert!(info.signature_is_version());
    }

    #[test]
    fn unchanged_files_start_with_empty_diagnostics() {
        let mut build_info = two_files();
        build_info.change_file_set = vec![2];
        build_info.semantic_diagnostics_per_file = vec![BuildInfoSemanticDiagnostic::Cached(
            BuildInfoDiagnosticsOfFile(
                1,
                vec![BuildInfoDiagnostic {
                    file: 0,
                    no_file: false,
                    pos: 4,
                    end: 9,
                    code: 2322,
                    category: Category::Error,
                    message: "bad".into(),
                    message_chain: Vec::new(),
                    related_information: Vec::new(),
                    reports_unnecessary: false,
                    reports_deprecated: false,
                    skipped_on_no_emit: false,
                }],
            ),
        )];
        let snapshot = build_info_to_snapshot(&build_info, "/p/kiln.tsbuildinfo", true, false).unwrap();

        let a = p("src/a.ts");
        let cached = snapshot.semantic_diagnostics_of(&a).unwrap();
        let diagnostics = cached.resolve(&a);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].file.as_ref(), Some(&a));
        assert!(!snapshot.has_cached_semantic_diagnostics(&p("src/b.ts")));
        assert!(snapshot.changed_files().contains(&p("src/b.ts")));
    }

    #[test]
    fn uncached_entry_removes_seeded_diagnostics() {
        let mut build_info = two_files();
        build_info.semantic_diagnostics_per_file = vec![BuildInfoSemanticDiagnostic::Uncached(1)];
        let snapshot = build_info_to_snapshot(&build_info, "/p/kiln.tsbuildinfo", true, false).unwrap();
        assert!(!snapshot.has_cached_semantic_diagnostics(&p("src/a.ts")));
        assert!(snapshot.has_cached_semantic_diagnostics(&p("src/b.ts")));
    }

    #[test]
    fn emit_signatures_of_composite_builds() {
        let mut build_info = two_files();
        build_info.options = Some(serde_json::from_str(r#"{"composite": true}"#).unwrap());
        let mut map_only = BuildInfoEmitSignature::not_emitted(1);
        map_only.differs_only_in_dts_map = true;
        build_info.emit_signatures = vec![map_only, BuildInfoEmitSignature::not_emitted(2)];
        let snapshot = build_info_to_snapshot(&build_info, "/p/kiln.tsbuildinfo", true, false).unwrap();

        assert_eq!(
            snapshot.emit_signature(&p("src/a.ts")),
            Some(&EmitSignature::DifferentOptions("ha".into()))
        );
        assert_eq!(snapshot.emit_signature(&p("src/b.ts")), None);
    }

    #[test]
    fn full_pending_emit_uses_own_options() {
        let mut build_info = two_files();
        build_info.options = Some(serde_json::from_str(r#"{"sourceMap": true}"#).unwrap());
        build_info.affected_files_pending_emit = vec![crate::build_info::BuildInfoFilePendingEmit {
            file_id: 2,
            emit_kind: 0,
        }];
        let snapshot = build_info_to_snapshot(&build_info, "/p/kiln.tsbuildinfo", true, false).unwrap();
        assert_eq!(
            snapshot.pending_emit_of(&p("src/b.ts")),
            Some(EmitKind::JS | EmitKind::JS_MAP)
        );
    }

    #[test]
    fn out_of_range_id_is_rejected() {
        let mut build_info = two_files();
        build_info.change_file_set = vec![7];
        let err = build_info_to_snapshot(&build_info, "/p/kiln.tsbuildinfo", true, false).unwrap_err();
        assert!(matches!(err, IncrementalError::BuildInfoParse { .. }));
    }
}
