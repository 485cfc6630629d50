//! Propagating changes through the reference graph.
//!
//! Each changed file gets a fresh declaration signature. Files whose
//! signature moved drag their referencers along; a moved signature on a
//! global-scope file affects the whole program. Every affected file loses
//! its cached semantic diagnostics and is queued for emit, and files that
//! consume the changed declarations are queued for declaration emit (or a
//! full emit when a const enum they may inline changed).
//!
//! Both parallel phases only stage results on the run context. The snapshot
//! is written once, by [`collect_all_affected_files`], after both phases
//! drained and no cancellation was observed.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, Once, OnceLock};

use kiln_source::{is_declaration_file_name, SourceFile, SourcePath};
use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::diff::all_files_excluding_default_library;
use crate::emit_kind::{get_file_emit_kind, EmitKind};
use crate::program::{EmitOnly, EmitOptions, Program, WriteFileData};
use crate::signature::{compute_signature_with_diagnostics, SignatureUpdateKind};
use crate::snapshot::Snapshot;
use crate::work_group::WorkGroup;

/// What one propagation run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Every file found affected by the changed files.
    pub affected: BTreeSet<SourcePath>,
    /// How many times the whole-program invalidation was switched on.
    pub global_invalidations: usize,
    /// How many times default-library diagnostics were dropped.
    pub library_cleanups: usize,
    /// How each updated signature was obtained.
    pub signature_updates: HashMap<SourcePath, SignatureUpdateKind>,
}

#[derive(Default)]
struct Staging {
    removed_semantic_diagnostics: HashSet<SourcePath>,
    pending_emit: HashMap<SourcePath, EmitKind>,
}

/// State shared by the tasks of one propagation run.
struct AffectedFilesRun<'a> {
    program: &'a dyn Program,
    snapshot: &'a Snapshot,
    all_files: OnceLock<Vec<SourcePath>>,
    global_scope_affected: AtomicBool,
    global_invalidations: AtomicUsize,
    library_cleanup: Once,
    library_cleanups: AtomicUsize,
    signatures: Mutex<HashMap<SourcePath, (String, SignatureUpdateKind)>>,
    handled_exports: Mutex<HashMap<SourcePath, bool>>,
    staging: Mutex<Staging>,
}

impl<'a> AffectedFilesRun<'a> {
    fn new(program: &'a dyn Program, snapshot: &'a Snapshot) -> Self {
        Self {
            program,
            snapshot,
            all_files: OnceLock::new(),
            global_scope_affected: AtomicBool::new(false),
            global_invalidations: AtomicUsize::new(0),
            library_cleanup: Once::new(),
            library_cleanups: AtomicUsize::new(0),
            signatures: Mutex::new(HashMap::new()),
            handled_exports: Mutex::new(HashMap::new()),
            staging: Mutex::new(Staging::default()),
        }
    }

    fn all_files(&self) -> &[SourcePath] {
        self.all_files
            .get_or_init(|| all_files_excluding_default_library(self.program))
    }

    fn referenced_by(&self, path: &SourcePath) -> Vec<SourcePath> {
        self.snapshot
            .referenced_map
            .referenced_by(path)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn old_signature(&self, path: &SourcePath) -> Option<&str> {
        self.snapshot
            .file_infos
            .get(path)
            .and_then(|info| info.signature.as_deref())
    }

    fn is_changed_signature(&self, path: &SourcePath) -> bool {
        let signatures = self.signatures.lock().unwrap();
        let new = signatures.get(path).map(|(signature, _)| signature.as_str());
        new != self.old_signature(path)
    }

    fn remove_semantic_diagnostics_of(&self, path: &SourcePath) {
        self.staging
            .lock()
            .unwrap()
            .removed_semantic_diagnostics
            .insert(path.clone());
    }

    fn add_pending_emit(&self, path: &SourcePath, kind: EmitKind) {
        *self
            .staging
            .lock()
            .unwrap()
            .pending_emit
            .entry(path.clone())
            .or_insert(EmitKind::empty()) |= kind;
    }

    fn remove_diagnostics_of_library_files(&self) {
        self.library_cleanup.call_once(|| {
            let options = &self.snapshot.options;
            for file in self.program.source_files() {
                if !self.program.is_source_file_default_library(&file.path) {
                    continue;
                }
                let skips_check = options.skip_default_lib_check.is_true()
                    || (options.skip_lib_check.is_true() && file.is_declaration_file);
                if !skips_check {
                    self.remove_semantic_diagnostics_of(&file.path);
                }
            }
            self.library_cleanups.fetch_add(1, Ordering::SeqCst);
        });
    }

    fn compute_dts_signature(&self, file: &SourceFile) -> Option<String> {
        let signature = Mutex::new(None);
        let hash_with_text = self.snapshot.hash_with_text;
        let write = |file_name: &str, text: &str, data: &mut WriteFileData| -> io::Result<()> {
            assert!(
                is_declaration_file_name(file_name),
                "signature emit produced a non-declaration file: {file_name}"
            );
            let computed = compute_signature_with_diagnostics(&file.path, text, data, hash_with_text);
            *signature.lock().unwrap() = Some(computed);
            Ok(())
        };
        self.program.emit(EmitOptions {
            target_source_file: Some(&file.path),
            emit_only: EmitOnly::ForcedDts,
            write_file: Some(&write),
        });
        signature.into_inner().unwrap()
    }

    /// Computes a new signature for `file` unless this run already did.
    /// Returns `true` if the signature differs from the snapshot's.
    fn update_shape_signature(&self, file: &SourceFile, use_version: bool) -> bool {
        if self.signatures.lock().unwrap().contains_key(&file.path) {
            return false;
        }
        let Some(info) = self.snapshot.file_infos.get(&file.path) else {
            return false;
        };

        let computed = if file.is_declaration_file || use_version {
            None
        } else {
            self.compute_dts_signature(file)
        };
        let (signature, kind) = match computed {
            Some(signature) if !signature.is_empty() => (signature, SignatureUpdateKind::ComputedDts),
            _ => (info.version.clone(), SignatureUpdateKind::UsedVersion),
        };
        let changed = info.signature.as_deref() != Some(signature.as_str());

        let mut signatures = self.signatures.lock().unwrap();
        if signatures.contains_key(&file.path) {
            return false;
        }
        trace!(path = %file.path, ?kind, changed, "updated signature");
        signatures.insert(file.path.clone(), (signature, kind));
        changed
    }

    /// Walks referencers of `file` depth first, visiting each file once.
    /// `visit` returns whether to continue from the visited file, or `None`
    /// to stop the whole walk.
    fn for_each_file_referenced_by(
        &self,
        file: &SourcePath,
        mut visit: impl FnMut(&SourcePath, Option<&SourceFile>) -> Option<bool>,
    ) -> BTreeSet<SourcePath> {
        let mut seen = BTreeSet::from([file.clone()]);
        let mut stack = self.referenced_by(file);
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let current_file = self.program.source_file_by_path(&current);
            match visit(&current, current_file) {
                None => break,
                Some(true) => stack.extend(self.referenced_by(&current)),
                Some(false) => {}
            }
        }
        seen
    }

    fn files_affected_by(&self, path: &SourcePath) -> Vec<SourcePath> {
        let Some(file) = self.program.source_file_by_path(path) else {
            return Vec::new();
        };
        if !self.update_shape_signature(file, false) {
            return vec![path.clone()];
        }

        let affects_global_scope = self
            .snapshot
            .file_infos
            .get(path)
            .is_some_and(|info| info.affects_global_scope);
        if affects_global_scope {
            if self
                .global_scope_affected
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.global_invalidations.fetch_add(1, Ordering::SeqCst);
                debug!(path = %path, "global scope changed");
            }
            let mut files = self.all_files().to_vec();
            if !files.contains(path) {
                files.push(path.clone());
            }
            return files;
        }

        if self.snapshot.options.isolated_modules.is_true() {
            return vec![path.clone()];
        }

        // Visited referencers stay affected even with unchanged declarations:
        // they are checked against the changed file.
        self.for_each_file_referenced_by(path, |_, current| {
            Some(current.is_some_and(|current| self.update_shape_signature(current, false)))
        })
        .into_iter()
        .filter(|path| self.program.source_file_by_path(path).is_some())
        .collect()
    }

    fn handle_dts_may_change_of_affected_file(&self, file: &SourceFile) {
        self.remove_semantic_diagnostics_of(&file.path);

        if self.global_scope_affected.load(Ordering::SeqCst) {
            self.remove_diagnostics_of_library_files();
            self.update_shape_signature(file, false);
            return;
        }
        let options = &self.snapshot.options;
        if options.assume_changes_only_affect_direct_dependencies.is_true() {
            return;
        }
        if !self.snapshot.changed_files_set.contains(&file.path)
            || !self.is_changed_signature(&file.path)
        {
            return;
        }

        if options.isolated_modules.is_true() {
            let mut reached_global = false;
            self.for_each_file_referenced_by(&file.path, |current, _| {
                if self.handle_dts_may_change_of_global_scope(current, false) {
                    reached_global = true;
                    return None;
                }
                self.handle_dts_may_change_of(current, false);
                Some(self.is_changed_signature(current))
            });
            if reached_global {
                return;
            }
        }

        let invalidate_js_files = self.exports_const_enum(file);
        for exported_from in self.referenced_by(&file.path) {
            if self.handle_dts_may_change_of_global_scope(&exported_from, invalidate_js_files) {
                return;
            }
            for importer in self.referenced_by(&exported_from) {
                if self.handle_dts_may_change_of_file_and_exports(&importer, invalidate_js_files) {
                    return;
                }
            }
        }
    }

    /// Importers inline const enum values into their JavaScript, so a file
    /// exporting one (directly or through an alias to its own declaration)
    /// invalidates their JavaScript too.
    fn exports_const_enum(&self, file: &SourceFile) -> bool {
        let checker = self.program.type_checker_for_file(file);
        checker.exported_symbols(file).iter().any(|symbol| {
            symbol.is_const_enum
                || symbol.alias_target.as_ref().is_some_and(|target| {
                    target.is_const_enum && target.declaration_files.contains(&file.path)
                })
        })
    }

    fn handle_dts_may_change_of_file_and_exports(&self, path: &SourcePath, invalidate_js_files: bool) -> bool {
        {
            let mut handled = self.handled_exports.lock().unwrap();
            match handled.get(path) {
                Some(&previous) if previous || !invalidate_js_files => return false,
                _ => {
                    handled.insert(path.clone(), invalidate_js_files);
                }
            }
        }
        if self.handle_dts_may_change_of_global_scope(path, invalidate_js_files) {
            return true;
        }
        self.handle_dts_may_change_of(path, invalidate_js_files);
        for referencing in self.referenced_by(path) {
            if self.handle_dts_may_change_of_file_and_exports(&referencing, invalidate_js_files) {
                return true;
            }
        }
        false
    }

    fn handle_dts_may_change_of_global_scope(&self, path: &SourcePath, invalidate_js_files: bool) -> bool {
        let affects_global_scope = self
            .snapshot
            .file_infos
            .get(path)
            .is_some_and(|info| info.affects_global_scope);
        if !affects_global_scope {
            return false;
        }
        for file in self.all_files() {
            self.handle_dts_may_change_of(file, invalidate_js_files);
        }
        self.remove_diagnostics_of_library_files();
        true
    }

    fn handle_dts_may_change_of(&self, path: &SourcePath, invalidate_js_files: bool) {
        if self.snapshot.changed_files_set.contains(path) {
            return;
        }
        let Some(file) = self.program.source_file_by_path(path) else {
            return;
        };
        self.remove_semantic_diagnostics_of(path);
        self.update_shape_signature(file, true);

        let options = &self.snapshot.options;
        if invalidate_js_files {
            self.add_pending_emit(path, get_file_emit_kind(options));
        } else if options.emit_declarations() {
            let kind = if options.declaration_map.is_true() {
                EmitKind::ALL_DTS
            } else {
                EmitKind::DTS
            };
            self.add_pending_emit(path, kind);
        }
    }
}

/// Propagates the snapshot's changed files through the reference graph and
/// folds the outcome into the snapshot.
///
/// Returns `None` when nothing changed, or when `cancel` was observed; in
/// the latter case the snapshot is untouched.
pub fn collect_all_affected_files(
    program: &dyn Program,
    snapshot: &mut Snapshot,
    single_threaded: bool,
    cancel: &CancellationToken,
) -> Option<PropagationReport> {
    if snapshot.changed_files_set.is_empty() {
        return None;
    }

    let (staging, signatures, report) = {
        let run = AffectedFilesRun::new(program, snapshot);

        let affected = Mutex::new(BTreeSet::new());
        let mut group = WorkGroup::new(single_threaded);
        for path in &snapshot.changed_files_set {
            let (run, affected) = (&run, &affected);
            group.queue(move || {
                let files = run.files_affected_by(path);
                affected.lock().unwrap().extend(files);
            });
        }
        group.run_and_wait();
        if cancel.is_cancelled() {
            return None;
        }
        let affected = affected.into_inner().unwrap();

        let emit_kind = get_file_emit_kind(&snapshot.options);
        let mut group = WorkGroup::new(single_threaded);
        for path in &affected {
            let Some(file) = program.source_file_by_path(path) else {
                continue;
            };
            run.add_pending_emit(path, emit_kind);
            let run = &run;
            group.queue(move || run.handle_dts_may_change_of_affected_file(file));
        }
        group.run_and_wait();
        if cancel.is_cancelled() {
            return None;
        }

        let report = PropagationReport {
            global_invalidations: run.global_invalidations.load(Ordering::SeqCst),
            library_cleanups: run.library_cleanups.load(Ordering::SeqCst),
            affected,
            signature_updates: HashMap::new(),
        };
        (
            run.staging.into_inner().unwrap(),
            run.signatures.into_inner().unwrap(),
            report,
        )
    };

    Some(commit(snapshot, staging, signatures, report))
}

fn commit(
    snapshot: &mut Snapshot,
    staging: Staging,
    signatures: HashMap<SourcePath, (String, SignatureUpdateKind)>,
    mut report: PropagationReport,
) -> PropagationReport {
    for (path, (signature, kind)) in signatures {
        if let Some(info) = snapshot.file_infos.get_mut(&path) {
            info.signature = Some(signature);
        }
        report.signature_updates.insert(path, kind);
    }
    for path in &staging.removed_semantic_diagnostics {
        snapshot.semantic_diagnostics_per_file.remove(path);
    }
    for (path, kind) in staging.pending_emit {
        snapshot.add_file_to_affected_files_pending_emit(path, kind);
    }
    snapshot.changed_files_set.clear();
    snapshot.build_info_emit_pending = true;
    debug!(
        affected = report.affected.len(),
        signatures = report.signature_updates.len(),
        "propagated changes"
    );
    report
}
