//! Turning pending emit into writes.
//!
//! Every file with outstanding emit is emitted once with the narrowest
//! [`EmitOnly`] covering what it still owes. Declaration writes pass
//! through a wrapper that records signatures and, for composite builds,
//! skips rewriting declaration files whose content did not change.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

use kiln_source::{is_declaration_file_name, SourceFile, SourcePath};
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::diagnostics_cache::CachedDiagnostics;
use crate::emit_kind::{pending_emit_kind, EmitKind};
use crate::program::{EmitOnly, EmitOptions, EmitResult, Program, WriteFileCallback, WriteFileData};
use crate::signature::{
    compute_hash, compute_signature_with_diagnostics, text_for_signature, SignatureUpdateKind,
};
use crate::snapshot::{EmitSignature, Snapshot};
use crate::work_group::WorkGroup;

struct EmitUpdate {
    pending_kind: EmitKind,
    result: EmitResult,
}

/// State shared by the tasks of one emit run.
struct EmitFilesRun<'a> {
    program: &'a dyn Program,
    snapshot: &'a Snapshot,
    for_dts_errors: bool,
    signatures: Mutex<HashMap<SourcePath, String>>,
    emit_signatures: Mutex<HashMap<SourcePath, EmitSignature>>,
    latest_changed_dts_files: Mutex<BTreeSet<String>>,
    emit_updates: Mutex<HashMap<SourcePath, EmitUpdate>>,
    deleted_pending_kinds: HashSet<SourcePath>,
}

/// What an emit run staged, ready to be folded into the snapshot.
struct StagedEmit {
    signatures: HashMap<SourcePath, String>,
    emit_signatures: HashMap<SourcePath, EmitSignature>,
    latest_changed_dts_files: BTreeSet<String>,
    emit_updates: HashMap<SourcePath, EmitUpdate>,
    deleted_pending_kinds: HashSet<SourcePath>,
}

impl<'a> EmitFilesRun<'a> {
    fn new(program: &'a dyn Program, snapshot: &'a Snapshot, for_dts_errors: bool) -> Self {
        Self {
            program,
            snapshot,
            for_dts_errors,
            signatures: Mutex::new(HashMap::new()),
            emit_signatures: Mutex::new(HashMap::new()),
            latest_changed_dts_files: Mutex::new(BTreeSet::new()),
            emit_updates: Mutex::new(HashMap::new()),
            deleted_pending_kinds: HashSet::new(),
        }
    }

    fn into_staged(self) -> StagedEmit {
        StagedEmit {
            signatures: self.signatures.into_inner().unwrap(),
            emit_signatures: self.emit_signatures.into_inner().unwrap(),
            latest_changed_dts_files: self.latest_changed_dts_files.into_inner().unwrap(),
            emit_updates: self.emit_updates.into_inner().unwrap(),
            deleted_pending_kinds: self.deleted_pending_kinds,
        }
    }

    /// What of `kind` this call should produce.
    fn pending_kind_for_emit_options(&self, kind: EmitKind, options: &EmitOptions<'_>) -> EmitKind {
        let mut pending = pending_emit_kind(kind, EmitKind::empty());
        if options.emit_only == EmitOnly::Dts {
            pending &= EmitKind::ALL_DTS;
        }
        if self.for_dts_errors {
            pending &= EmitKind::DTS_ERRORS;
        }
        pending
    }

    fn is_emittable(&self, path: &SourcePath) -> Option<&'a SourceFile> {
        let file = self.program.source_file_by_path(path)?;
        self.program
            .source_file_may_be_emitted(file, false)
            .then_some(file)
    }

    /// Emits `file`, routing declaration writes through the signature
    /// bookkeeping when declarations are emitted at all.
    fn emit_file(
        &self,
        file: &SourceFile,
        emit_only: EmitOnly,
        write_file: Option<&WriteFileCallback<'_>>,
    ) -> EmitResult {
        if !self.snapshot.options.emit_declarations() {
            return self.program.emit(EmitOptions {
                target_source_file: Some(&file.path),
                emit_only,
                write_file,
            });
        }
        let write = |file_name: &str, text: &str, data: &mut WriteFileData| -> io::Result<()> {
            if is_declaration_file_name(file_name)
                && self.record_declaration_output(file, file_name, text, data)
            {
                return Ok(());
            }
            match write_file {
                Some(write_file) => write_file(file_name, text, data),
                None => self.program.file_system().write_file(file_name, text),
            }
        };
        self.program.emit(EmitOptions {
            target_source_file: Some(&file.path),
            emit_only,
            write_file: Some(&write),
        })
    }

    /// Records the signature carried by a declaration output of `file`.
    /// Returns `true` if the write should be skipped.
    fn record_declaration_output(
        &self,
        file: &SourceFile,
        output_file_name: &str,
        text: &str,
        data: &mut WriteFileData,
    ) -> bool {
        let mut emit_signature = None;
        if let Some(info) = self.snapshot.file_infos.get(&file.path) {
            if info.signature_is_version() {
                let signature = compute_signature_with_diagnostics(
                    &file.path,
                    text,
                    data,
                    self.snapshot.hash_with_text,
                );
                // declaration diagnostics are part of the signature but not of the text
                if data.diagnostics.is_empty() {
                    emit_signature = Some(signature.clone());
                }
                if signature != info.version {
                    self.signatures
                        .lock()
                        .unwrap()
                        .insert(file.path.clone(), signature);
                }
            }
        }
        self.skip_dts_output_of_composite(file, output_file_name, text, data, emit_signature)
    }

    fn skip_dts_output_of_composite(
        &self,
        file: &SourceFile,
        output_file_name: &str,
        text: &str,
        data: &mut WriteFileData,
        new_signature: Option<String>,
    ) -> bool {
        if !self.snapshot.tracks_emit_signatures() {
            return false;
        }
        let old = self.snapshot.emit_signatures.get(&file.path);
        let new_signature = new_signature.unwrap_or_else(|| {
            compute_hash(text_for_signature(text, data), self.snapshot.hash_with_text)
        });

        if old.map(EmitSignature::hash) == Some(new_signature.as_str()) {
            if let Some(EmitSignature::Current(_)) = old {
                data.skipped_dts_write = true;
                return true;
            }
            data.differs_only_in_map = true;
        } else {
            self.latest_changed_dts_files
                .lock()
                .unwrap()
                .insert(output_file_name.to_string());
        }
        self.emit_signatures
            .lock()
            .unwrap()
            .insert(file.path.clone(), EmitSignature::Current(new_signature));
        false
    }

    fn emit_pending_files(&mut self, options: &EmitOptions<'_>, single_threaded: bool) {
        let mut pending: Vec<_> = self.snapshot.affected_files_pending_emit.iter().collect();
        pending.sort_by(|a, b| a.0.cmp(b.0));

        let mut work = Vec::new();
        for (path, &kind) in pending {
            let Some(file) = self.is_emittable(path) else {
                self.deleted_pending_kinds.insert(path.clone());
                continue;
            };
            let pending_kind = self.pending_kind_for_emit_options(kind, options);
            if !pending_kind.is_empty() {
                work.push((file, kind, pending_kind));
            }
        }

        let run = &*self;
        let write_file = options.write_file;
        let mut group = WorkGroup::new(single_threaded);
        for (file, kind, pending_kind) in work {
            group.queue(move || {
                let result = if run.for_dts_errors {
                    EmitResult::skipped(run.program.declaration_diagnostics(file))
                } else {
                    run.emit_file(file, emit_only_for(pending_kind), write_file)
                };
                let update = EmitUpdate {
                    pending_kind: pending_emit_kind(kind, pending_kind),
                    result,
                };
                run.emit_updates.lock().unwrap().insert(file.path.clone(), update);
            });
        }
        group.run_and_wait();
    }

    /// Surfaces cached emit diagnostics of files that were not emitted.
    fn collect_cached_emit_diagnostics(&mut self) {
        let mut cached: Vec<_> = self.snapshot.emit_diagnostics_per_file.iter().collect();
        cached.sort_by(|a, b| a.0.cmp(b.0));
        for (path, diagnostics) in cached {
            if self.emit_updates.lock().unwrap().contains_key(path) {
                continue;
            }
            if self.is_emittable(path).is_none() {
                self.deleted_pending_kinds.insert(path.clone());
                continue;
            }
            let pending_kind = self
                .snapshot
                .pending_emit_of(path)
                .unwrap_or(EmitKind::empty());
            let update = EmitUpdate {
                pending_kind,
                result: EmitResult::skipped(diagnostics.resolve(path).to_vec()),
            };
            self.emit_updates.lock().unwrap().insert(path.clone(), update);
        }
    }
}

/// The narrowest emit covering `pending`.
fn emit_only_for(pending: EmitKind) -> EmitOnly {
    let js = pending.intersects(EmitKind::ALL_JS);
    let dts = pending.intersects(EmitKind::ALL_DTS);
    match (js, dts) {
        (true, true) => EmitOnly::All,
        (false, true) => EmitOnly::Dts,
        _ => EmitOnly::Js,
    }
}

/// Folds a finished emit run into the snapshot and returns the per-file
/// results in path order.
fn commit(
    snapshot: &mut Snapshot,
    staged: StagedEmit,
    mut signature_updates: Option<&mut HashMap<SourcePath, SignatureUpdateKind>>,
) -> Vec<EmitResult> {
    for (path, signature) in staged.signatures {
        if let Some(info) = snapshot.file_infos.get_mut(&path) {
            info.signature = Some(signature);
        }
        if let Some(updates) = signature_updates.as_deref_mut() {
            updates.insert(path, SignatureUpdateKind::StoredAtEmit);
        }
        snapshot.build_info_emit_pending = true;
    }
    for (path, signature) in staged.emit_signatures {
        snapshot.emit_signatures.insert(path, signature);
        snapshot.build_info_emit_pending = true;
    }
    if let Some(latest) = staged.latest_changed_dts_files.into_iter().next_back() {
        snapshot.latest_changed_dts_file = Some(latest);
        snapshot.build_info_emit_pending = true;
    }
    for path in staged.deleted_pending_kinds {
        snapshot.affected_files_pending_emit.remove(&path);
        snapshot.build_info_emit_pending = true;
    }

    let mut updates: Vec<_> = staged.emit_updates.into_iter().collect();
    updates.sort_by(|a, b| a.0.cmp(&b.0));
    let mut results = Vec::with_capacity(updates.len());
    for (path, update) in updates {
        if update.pending_kind.is_empty() {
            snapshot.affected_files_pending_emit.remove(&path);
        } else {
            snapshot
                .affected_files_pending_emit
                .insert(path.clone(), update.pending_kind);
        }
        if !update.result.diagnostics.is_empty() {
            let cached = CachedDiagnostics::materialized(update.result.diagnostics.clone());
            snapshot.emit_diagnostics_per_file.insert(path, Arc::new(cached));
        }
        results.push(update.result);
        snapshot.build_info_emit_pending = true;
    }
    results
}

/// Emits one file on request, outside the pending-emit bookkeeping.
///
/// Signatures observed while writing its declaration file are still
/// recorded. Returns `None` if `cancel` was observed.
pub fn emit_target_file(
    program: &dyn Program,
    snapshot: &mut Snapshot,
    target: &SourceFile,
    options: EmitOptions<'_>,
    cancel: &CancellationToken,
    signature_updates: Option<&mut HashMap<SourcePath, SignatureUpdateKind>>,
) -> Option<EmitResult> {
    let (result, staged) = {
        let run = EmitFilesRun::new(program, snapshot, false);
        let result = run.emit_file(target, options.emit_only, options.write_file);
        (result, run.into_staged())
    };
    if cancel.is_cancelled() {
        return None;
    }
    commit(snapshot, staged, signature_updates);
    Some(result)
}

/// Emits every file with outstanding emit, or with `for_dts_errors` only
/// produces their declaration diagnostics.
///
/// Propagation must already have run. Returns `None` if `cancel` was
/// observed, leaving the snapshot untouched.
pub fn emit_all_affected_files(
    program: &dyn Program,
    snapshot: &mut Snapshot,
    options: EmitOptions<'_>,
    for_dts_errors: bool,
    single_threaded: bool,
    cancel: &CancellationToken,
    signature_updates: Option<&mut HashMap<SourcePath, SignatureUpdateKind>>,
) -> Option<EmitResult> {
    let staged = {
        let mut run = EmitFilesRun::new(program, snapshot, for_dts_errors);
        if !snapshot.affected_files_pending_emit.is_empty() {
            run.emit_pending_files(&options, single_threaded);
            if cancel.is_cancelled() {
                return None;
            }
        }
        run.collect_cached_emit_diagnostics();
        run.into_staged()
    };
    debug!(
        files = staged.emit_updates.len(),
        for_dts_errors, "emitted affected files"
    );
    let results = commit(snapshot, staged, signature_updates);

    if for_dts_errors {
        if let Some(target) = options.target_source_file {
            let diagnostics = snapshot
                .emit_diagnostics_per_file
                .get(target)
                .map(|cached| cached.resolve(target).to_vec())
                .unwrap_or_default();
            return Some(EmitResult::skipped(diagnostics));
        }
    }
    Some(EmitResult::combine(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowest_emit() {
        assert_eq!(emit_only_for(EmitKind::JS_MAP), EmitOnly::Js);
        assert_eq!(emit_only_for(EmitKind::DTS_ERRORS), EmitOnly::Dts);
        assert_eq!(emit_only_for(EmitKind::ALL_DTS), EmitOnly::Dts);
        assert_eq!(emit_only_for(EmitKind::JS | EmitKind::DTS), EmitOnly::All);
    }
}
