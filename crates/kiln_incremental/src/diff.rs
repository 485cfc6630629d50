//! Building a snapshot for a new program from the previous one.
//!
//! Every file is examined independently (in parallel unless the host is
//! single threaded) and produces a [`FileDiff`]. The diffs are then folded
//! into the new snapshot in program order, followed by the whole-program
//! passes for deleted files, option-driven emit, and check bookkeeping.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use kiln_config::{
    compiler_options_affect_declaration_path, compiler_options_affect_emit,
    compiler_options_affect_semantic_diagnostics, EngineSettings,
};
use kiln_source::{get_directory_path, ModuleAugmentation, SourceFile, SourcePath};
use tracing::debug;

use crate::diagnostics_cache::CachedDiagnostics;
use crate::emit_kind::{get_file_emit_kind, pending_emit_kind_for_options, EmitKind};
use crate::program::Program;
use crate::signature::compute_hash;
use crate::snapshot::{EmitSignature, FileInfo, Snapshot};
use crate::work_group::WorkGroup;

/// What the diff learned about one file.
struct FileDiff {
    index: usize,
    path: SourcePath,
    info: FileInfo,
    references: BTreeSet<SourcePath>,
    changed: bool,
    emit_diagnostics: Option<Arc<CachedDiagnostics>>,
    semantic_diagnostics: Option<Arc<CachedDiagnostics>>,
    emit_signature: Option<EmitSignature>,
}

/// Which cached state of unchanged files may be carried over.
#[derive(Clone, Copy)]
struct ReusePolicy {
    semantic_diagnostics: bool,
    declaration_file_diagnostics: bool,
    library_file_diagnostics: bool,
    emit_signatures: bool,
}

impl ReusePolicy {
    fn new(old: Option<&Snapshot>, new: &kiln_config::CompilerOptions) -> Self {
        let Some(old) = old else {
            return Self {
                semantic_diagnostics: false,
                declaration_file_diagnostics: false,
                library_file_diagnostics: false,
                emit_signatures: false,
            };
        };
        let semantic_diagnostics =
            !compiler_options_affect_semantic_diagnostics(&old.options, new);
        let declaration_file_diagnostics = semantic_diagnostics
            && new.skip_lib_check.is_true() == old.options.skip_lib_check.is_true();
        let library_file_diagnostics = declaration_file_diagnostics
            && new.skip_default_lib_check.is_true() == old.options.skip_default_lib_check.is_true();
        Self {
            semantic_diagnostics,
            declaration_file_diagnostics,
            library_file_diagnostics,
            emit_signatures: new.composite.is_true()
                && !compiler_options_affect_declaration_path(&old.options, new),
        }
    }
}

/// Builds the snapshot of `program` given the snapshot of the previous
/// program, if any.
pub fn program_to_snapshot(
    program: &dyn Program,
    old: Option<&Snapshot>,
    settings: &EngineSettings,
) -> Snapshot {
    let options = program.options().clone();
    let mut snapshot = Snapshot::new(options, settings.hash_with_text);
    inherit_from_old(&mut snapshot, old);

    let diffs = diff_files(program, old, &snapshot, settings);
    debug!(files = diffs.len(), "computed file diffs");
    for diff in diffs {
        commit_file_diff(&mut snapshot, old, diff);
    }

    let Some(old) = old else {
        return snapshot;
    };
    let global_file_removed = handle_file_delete(program, &mut snapshot, old);
    if !global_file_removed {
        handle_pending_emit(program, &mut snapshot, old);
    }
    handle_pending_check(program, &mut snapshot, old);
    debug!(
        changed = snapshot.changed_files_set.len(),
        pending_emit = snapshot.affected_files_pending_emit.len(),
        "snapshot ready"
    );
    snapshot
}

fn inherit_from_old(snapshot: &mut Snapshot, old: Option<&Snapshot>) {
    if snapshot.options.no_check.is_true() {
        snapshot.check_pending = true;
    }
    match old {
        Some(old) => {
            if snapshot.options.composite.is_true() {
                snapshot.latest_changed_dts_file = old.latest_changed_dts_file.clone();
            }
            snapshot.changed_files_set = old.changed_files_set.clone();
            snapshot.affected_files_pending_emit = old.affected_files_pending_emit.clone();
            snapshot.build_info_emit_pending = old.build_info_emit_pending;
            snapshot.has_errors_from_old_state = old.has_errors;
        }
        None => snapshot.build_info_emit_pending = snapshot.options.is_incremental(),
    }
}

fn diff_files(
    program: &dyn Program,
    old: Option<&Snapshot>,
    snapshot: &Snapshot,
    settings: &EngineSettings,
) -> Vec<FileDiff> {
    let policy = ReusePolicy::new(old, &snapshot.options);
    let single_threaded = settings.single_threaded || program.single_threaded();
    let results = Mutex::new(Vec::with_capacity(program.source_files().len()));
    let mut group = WorkGroup::new(single_threaded);
    for (index, file) in program.source_files().iter().enumerate() {
        let results = &results;
        group.queue(move || {
            let diff = diff_file(program, old, snapshot, policy, index, file);
            results.lock().unwrap().push(diff);
        });
    }
    group.run_and_wait();

    let mut diffs = results.into_inner().unwrap();
    diffs.sort_by_key(|diff| diff.index);
    diffs
}

fn diff_file(
    program: &dyn Program,
    old: Option<&Snapshot>,
    snapshot: &Snapshot,
    policy: ReusePolicy,
    index: usize,
    file: &SourceFile,
) -> FileDiff {
    let path = file.path.clone();
    let version = compute_hash(&file.text, snapshot.hash_with_text);
    let affects_global_scope = file_affects_global_scope(file);
    let implied_node_format = program.implied_node_format(&path);
    let references = get_referenced_files(program, file);

    let mut diff = FileDiff {
        index,
        path,
        info: FileInfo {
            version,
            signature: None,
            affects_global_scope,
            implied_node_format,
        },
        references,
        changed: false,
        emit_diagnostics: None,
        semantic_diagnostics: None,
        emit_signature: None,
    };

    let Some(old) = old else {
        diff.info.signature = Some(diff.info.version.clone());
        return diff;
    };

    diff.changed = match old.file_infos.get(&diff.path) {
        Some(old_info) => {
            diff.info.signature = old_info.signature.clone();
            old_info.version != diff.info.version
                || old_info.affects_global_scope != affects_global_scope
                || old_info.implied_node_format != implied_node_format
                || references_changed(old, &diff.path, &diff.references)
                || references_deleted_file(program, old, &diff.references)
        }
        None => {
            diff.info.signature = Some(diff.info.version.clone());
            true
        }
    };

    // already queued for propagation by an earlier run
    let pending_change = diff.changed || old.changed_files_set.contains(&diff.path);
    if !pending_change {
        diff.emit_diagnostics = old.emit_diagnostics_per_file.get(&diff.path).cloned();
        if policy.semantic_diagnostics
            && (!file.is_declaration_file || policy.declaration_file_diagnostics)
            && (!program.is_source_file_default_library(&diff.path)
                || policy.library_file_diagnostics)
        {
            diff.semantic_diagnostics = old.semantic_diagnostics_per_file.get(&diff.path).cloned();
        }
    }
    if policy.emit_signatures {
        diff.emit_signature = old
            .emit_signatures
            .get(&diff.path)
            .cloned()
            .map(|signature| signature.for_options(&old.options, &snapshot.options));
    }
    diff
}

fn references_changed(old: &Snapshot, path: &SourcePath, references: &BTreeSet<SourcePath>) -> bool {
    match old.referenced_map.references(path) {
        Some(old_references) => old_references != references,
        None => !references.is_empty(),
    }
}

fn references_deleted_file(
    program: &dyn Program,
    old: &Snapshot,
    references: &BTreeSet<SourcePath>,
) -> bool {
    references.iter().any(|reference| {
        program.source_file_by_path(reference).is_none() && old.file_infos.contains_key(reference)
    })
}

fn commit_file_diff(snapshot: &mut Snapshot, old: Option<&Snapshot>, diff: FileDiff) {
    let FileDiff {
        path,
        info,
        references,
        changed,
        emit_diagnostics,
        semantic_diagnostics,
        emit_signature,
        ..
    } = diff;

    snapshot.referenced_map.set(path.clone(), references);
    if old.is_none() {
        let kind = get_file_emit_kind(&snapshot.options);
        snapshot.add_file_to_affected_files_pending_emit(path.clone(), kind);
    }
    if changed {
        snapshot.add_file_to_change_set(path.clone());
    }
    if let Some(diagnostics) = emit_diagnostics {
        snapshot.emit_diagnostics_per_file.insert(path.clone(), diagnostics);
    }
    if let Some(diagnostics) = semantic_diagnostics {
        snapshot.semantic_diagnostics_per_file.insert(path.clone(), diagnostics);
    }
    if let Some(signature) = emit_signature {
        snapshot.emit_signatures.insert(path.clone(), signature);
    }
    snapshot.file_infos.insert(path, info);
}

/// Handles files of the old program that are gone. Returns `true` if a
/// removed file affected the global scope, in which case every remaining
/// file was marked changed.
fn handle_file_delete(program: &dyn Program, snapshot: &mut Snapshot, old: &Snapshot) -> bool {
    let mut removed: Vec<_> = old
        .file_infos
        .iter()
        .filter(|(path, _)| !snapshot.file_infos.contains_key(*path))
        .collect();
    if removed.is_empty() {
        return false;
    }
    removed.sort_by(|a, b| a.0.cmp(b.0));
    debug!(removed = removed.len(), "files removed from program");

    snapshot.build_info_emit_pending = true;
    if !removed.iter().any(|(_, info)| info.affects_global_scope) {
        return false;
    }
    for path in all_files_excluding_default_library(program) {
        snapshot.add_file_to_change_set(path);
    }
    true
}

fn handle_pending_emit(program: &dyn Program, snapshot: &mut Snapshot, old: &Snapshot) {
    let kind = if compiler_options_affect_emit(&old.options, &snapshot.options) {
        get_file_emit_kind(&snapshot.options)
    } else {
        pending_emit_kind_for_options(&snapshot.options, &old.options)
    };
    if kind == EmitKind::empty() {
        return;
    }
    debug!(?kind, "options changed emit for unchanged files");
    for file in program.source_files() {
        if !snapshot.changed_files_set.contains(&file.path) {
            snapshot.add_file_to_affected_files_pending_emit(file.path.clone(), kind);
        }
    }
    snapshot.build_info_emit_pending = true;
}

fn handle_pending_check(program: &dyn Program, snapshot: &mut Snapshot, old: &Snapshot) {
    if snapshot.semantic_diagnostics_per_file.len() != program.source_files().len()
        && old.check_pending != snapshot.check_pending
    {
        snapshot.build_info_emit_pending = true;
    }
}

/// Every file of `program` except the default library, sorted.
pub(crate) fn all_files_excluding_default_library(program: &dyn Program) -> Vec<SourcePath> {
    let mut files: Vec<SourcePath> = program
        .source_files()
        .iter()
        .filter(|file| !program.is_source_file_default_library(&file.path))
        .map(|file| file.path.clone())
        .collect();
    files.sort();
    files
}

/// Returns `true` if `file` contributes declarations to the global scope:
/// it augments the global scope, or it is a script with any statement other
/// than an ambient `declare module "name"` block.
pub fn file_affects_global_scope(file: &SourceFile) -> bool {
    if file
        .module_augmentations
        .iter()
        .any(|augmentation| matches!(augmentation, ModuleAugmentation::Global))
    {
        return true;
    }
    if file.is_external_module || file.is_json {
        return false;
    }
    file.has_non_ambient_module_statement
}

/// Collects the files `file` depends on: resolved imports (with files
/// augmenting those modules), triple-slash references, type-reference
/// directives, augmented modules, and files declaring ambient modules.
pub fn get_referenced_files(program: &dyn Program, file: &SourceFile) -> BTreeSet<SourcePath> {
    let mut referenced = BTreeSet::new();
    let mut add_declaring = |declaring: Vec<SourcePath>| {
        referenced.extend(declaring.into_iter().filter(|path| *path != file.path));
    };

    let checker = program.type_checker_for_file(file);
    for import in &file.imports {
        add_declaring(checker.module_declaring_files(file, import));
    }
    for augmentation in &file.module_augmentations {
        if let ModuleAugmentation::Module(name) = augmentation {
            add_declaring(checker.module_declaring_files(file, name));
        }
    }
    add_declaring(checker.ambient_module_declaring_files());
    drop(checker);

    let directory = get_directory_path(&file.file_name);
    let mut add_file_name = |file_name: &str| {
        let path = match program.parse_file_redirect(file_name) {
            Some(redirect) => SourcePath::new(
                &redirect,
                program.current_directory(),
                program.use_case_sensitive_file_names(),
            ),
            None => SourcePath::new(file_name, directory, program.use_case_sensitive_file_names()),
        };
        referenced.insert(path);
    };
    for reference in &file.referenced_files {
        add_file_name(reference);
    }
    for resolved in program.resolved_type_reference_directives(&file.path) {
        if !resolved.is_empty() {
            add_file_name(&resolved);
        }
    }
    referenced
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_source::{ModuleName, TextRange};

    fn file(name: &str) -> SourceFile {
        SourceFile::new(name, SourcePath::from_normalized(name), "")
    }

    #[test]
    fn modules_do_not_affect_global_scope() {
        let mut module = file("/p/a.ts");
        module.is_external_module = true;
        module.has_non_ambient_module_statement = true;
        assert!(!file_affects_global_scope(&module));
    }

    #[test]
    fn global_augmentation_in_module_affects_global_scope() {
        let mut module = file("/p/a.ts");
        module.is_external_module = true;
        module.module_augmentations.push(ModuleAugmentation::Global);
        assert!(file_affects_global_scope(&module));
    }

    #[test]
    fn scripts_affect_global_scope_unless_only_ambient_modules() {
        let mut script = file("/p/globals.ts");
        script.has_non_ambient_module_statement = true;
        assert!(file_affects_global_scope(&script));

        let mut ambient = file("/p/ambient.d.ts");
        ambient.module_augmentations.push(ModuleAugmentation::Module(ModuleName::new(
            "lodash",
            TextRange::new(15, 21),
        )));
        assert!(!file_affects_global_scope(&ambient));
    }

    #[test]
    fn json_never_affects_global_scope() {
        let mut json = file("/p/data.json");
        json.has_non_ambient_module_statement = true;
        assert!(!file_affects_global_scope(&json));
    }
}
