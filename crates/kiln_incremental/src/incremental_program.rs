//! The incremental wrapper around a [`Program`].
//!
//! [`IncrementalProgram`] answers the same diagnostic and emit queries as
//! the program it wraps, but only does work for files whose results are
//! not already in its [`Snapshot`]. Every query first propagates pending
//! changes through the reference graph, then serves cached results and
//! fills in what is missing.

use std::collections::HashMap;
use std::sync::Arc;

use kiln_common::Tristate;
use kiln_config::EngineSettings;
use kiln_diagnostics::{Diagnostic, DiagnosticMessage, DiagnosticSink};
use kiln_source::{SourceFile, SourcePath};
use tracing::{debug, info};

use crate::affected::{collect_all_affected_files, PropagationReport};
use crate::cancel::CancellationToken;
use crate::diagnostics_cache::CachedDiagnostics;
use crate::diff::program_to_snapshot;
use crate::emit::{emit_all_affected_files, emit_target_file};
use crate::program::{EmitOptions, EmitResult, Program, WriteFileData};
use crate::signature::SignatureUpdateKind;
use crate::snapshot::Snapshot;
use crate::to_build_info::snapshot_to_build_info;
use crate::to_snapshot::read_build_info_snapshot;

/// A program paired with the incremental state carried over from earlier
/// builds.
pub struct IncrementalProgram<P: Program> {
    program: P,
    snapshot: Snapshot,
    settings: EngineSettings,
    cancel: CancellationToken,
    signature_updates: Option<HashMap<SourcePath, SignatureUpdateKind>>,
    last_propagation: Option<PropagationReport>,
}

impl<P: Program> IncrementalProgram<P> {
    /// Wraps `program`, diffing it against `old` (the snapshot of the
    /// previous program or the one decoded from build info).
    pub fn new(program: P, old: Option<&Snapshot>, settings: EngineSettings) -> Self {
        let snapshot = program_to_snapshot(&program, old, &settings);
        info!(
            files = snapshot.file_infos.len(),
            changed = snapshot.changed_files_set.len(),
            reused = old.is_some(),
            "created incremental program"
        );
        Self {
            program,
            snapshot,
            settings,
            cancel: CancellationToken::new(),
            signature_updates: settings.track_signature_updates.then(HashMap::new),
            last_propagation: None,
        }
    }

    /// Wraps `program`, reusing the state of the previous incremental
    /// program when there is one.
    pub fn from_previous(program: P, previous: Option<&IncrementalProgram<P>>, settings: EngineSettings) -> Self {
        Self::new(program, previous.map(|previous| &previous.snapshot), settings)
    }

    /// Wraps `program`, reading the previous state from the build info the
    /// program writes to. Starts from scratch when there is no usable build
    /// info.
    pub fn from_build_info(program: P, settings: EngineSettings) -> Self {
        let old = program.build_info_file_name().and_then(|name| {
            read_build_info_snapshot(
                program.file_system(),
                &name,
                program.current_directory(),
                program.use_case_sensitive_file_names(),
                settings.hash_with_text,
            )
        });
        Self::new(program, old.as_ref(), settings)
    }

    /// Uses `token` to cancel work started through this program.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The wrapped program.
    pub fn program(&self) -> &P {
        &self.program
    }

    /// The current incremental state.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Consumes the wrapper, returning the state to seed the next program.
    pub fn into_snapshot(self) -> Snapshot {
        self.snapshot
    }

    /// The token that cancels work on this program.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// How each file's signature was last updated, when tracking is on.
    pub fn signature_updates(&self) -> Option<&HashMap<SourcePath, SignatureUpdateKind>> {
        self.signature_updates.as_ref()
    }

    /// The outcome of the most recent change propagation.
    pub fn last_propagation(&self) -> Option<&PropagationReport> {
        self.last_propagation.as_ref()
    }

    fn single_threaded(&self) -> bool {
        self.settings.single_threaded || self.program.single_threaded()
    }

    fn collect_all_affected_files(&mut self) {
        let single_threaded = self.single_threaded();
        if let Some(report) =
            collect_all_affected_files(&self.program, &mut self.snapshot, single_threaded, &self.cancel)
        {
            debug!(
                affected = report.affected.len(),
                global_invalidations = report.global_invalidations,
                "propagated changes"
            );
            if let Some(updates) = self.signature_updates.as_mut() {
                updates.extend(report.signature_updates.iter().map(|(path, kind)| (path.clone(), *kind)));
            }
            self.last_propagation = Some(report);
        }
    }

    /// Semantic diagnostics of `file`, or of every file.
    ///
    /// Only files without cached diagnostics are checked. With `noEmit`,
    /// diagnostics that only matter when emitting are dropped.
    pub fn get_semantic_diagnostics(&mut self, file: Option<&SourcePath>) -> Vec<Diagnostic> {
        if self.snapshot.options.no_check.is_true() {
            return Vec::new();
        }
        self.collect_semantic_diagnostics_of_affected_files(file);
        if self.cancel.is_cancelled() {
            return Vec::new();
        }

        let mut diagnostics = Vec::new();
        match file {
            Some(path) => {
                if self.program.source_file_by_path(path).is_some() {
                    diagnostics.extend(self.cached_semantic_diagnostics(path));
                }
            }
            None => {
                for source_file in self.program.source_files() {
                    diagnostics.extend(self.cached_semantic_diagnostics(&source_file.path));
                }
            }
        }
        filter_no_emit_semantic_diagnostics(diagnostics, self.snapshot.options.no_emit.is_true())
    }

    fn cached_semantic_diagnostics(&self, path: &SourcePath) -> Vec<Diagnostic> {
        // Every file was checked just before this point.
        let cached = self
            .snapshot
            .semantic_diagnostics_per_file
            .get(path)
            .unwrap_or_else(|| panic!("semantic diagnostics of {path} were not computed"));
        cached.resolve(path).to_vec()
    }

    fn collect_semantic_diagnostics_of_affected_files(&mut self, file: Option<&SourcePath>) {
        self.collect_all_affected_files();
        if self.cancel.is_cancelled() {
            return;
        }

        let cache = &self.snapshot.semantic_diagnostics_per_file;
        if cache.len() == self.program.source_files().len() {
            return;
        }
        let pending: Vec<&SourceFile> = match file {
            Some(path) => match self.program.source_file_by_path(path) {
                Some(source_file) if !cache.contains_key(path) => vec![source_file],
                _ => Vec::new(),
            },
            None => self
                .program
                .source_files()
                .iter()
                .filter(|source_file| !cache.contains_key(&source_file.path))
                .collect(),
        };
        if pending.is_empty() {
            return;
        }

        debug!(files = pending.len(), "checking files without cached diagnostics");
        let results = self.program.semantic_diagnostics_no_filter(&pending);
        if self.cancel.is_cancelled() {
            return;
        }
        for (path, diagnostics) in results {
            self.snapshot
                .semantic_diagnostics_per_file
                .insert(path, Arc::new(CachedDiagnostics::materialized(diagnostics)));
        }
        if self.snapshot.semantic_diagnostics_per_file.len() == self.program.source_files().len()
            && self.snapshot.check_pending
        {
            self.snapshot.check_pending = false;
        }
        self.snapshot.build_info_emit_pending = true;
    }

    /// Declaration diagnostics of `file`, or of every file.
    ///
    /// Produced by emitting declarations without writing them, so the emit
    /// state of the affected files advances as a side effect.
    pub fn get_declaration_diagnostics(&mut self, file: Option<&SourcePath>) -> Vec<Diagnostic> {
        let options = EmitOptions {
            target_source_file: file,
            ..Default::default()
        };
        self.emit_files(options, true)
            .map(|result| result.diagnostics)
            .unwrap_or_default()
    }

    /// Emits outputs for `options.target_source_file`, or for every file
    /// with outstanding emit followed by the build info.
    pub fn emit(&mut self, options: EmitOptions<'_>) -> EmitResult {
        let early = if self.snapshot.options.no_emit.is_true() {
            Some(EmitResult::skipped(Vec::new()))
        } else {
            self.handle_no_emit_on_error(options.target_source_file)
        };

        if let Some(mut result) = early {
            if options.target_source_file.is_none() {
                if let Some(build_info) = self.emit_build_info(&options) {
                    result.append(build_info);
                }
            }
            return result;
        }

        self.emit_files(options, false)
            .unwrap_or_else(|| EmitResult::skipped(Vec::new()))
    }

    fn emit_files(&mut self, options: EmitOptions<'_>, for_dts_errors: bool) -> Option<EmitResult> {
        if !for_dts_errors {
            if let Some(path) = options.target_source_file {
                let target = self.program.source_file_by_path(path)?;
                return emit_target_file(
                    &self.program,
                    &mut self.snapshot,
                    target,
                    options,
                    &self.cancel,
                    self.signature_updates.as_mut(),
                );
            }
        }

        self.collect_all_affected_files();
        if self.cancel.is_cancelled() {
            return None;
        }
        let single_threaded = self.single_threaded();
        let mut result = emit_all_affected_files(
            &self.program,
            &mut self.snapshot,
            options,
            for_dts_errors,
            single_threaded,
            &self.cancel,
            self.signature_updates.as_mut(),
        )?;
        if !for_dts_errors {
            if let Some(build_info) = self.emit_build_info(&options) {
                result.append(build_info);
            }
        }
        Some(result)
    }

    /// Gathers the diagnostics that block emit under `noEmitOnError`. Each
    /// stage only runs when the previous ones reported no errors.
    fn handle_no_emit_on_error(&mut self, file: Option<&SourcePath>) -> Option<EmitResult> {
        if !self.snapshot.options.no_emit_on_error.is_true() {
            return None;
        }

        let sink = DiagnosticSink::new();
        sink.extend(self.program.config_file_parsing_diagnostics());
        let config_errors = sink.error_count();
        sink.extend(self.program.syntactic_diagnostics(file));
        if !sink.has_errors_since(config_errors) {
            sink.extend(self.program.options_diagnostics());
            if file.is_none() {
                sink.extend(self.program.global_diagnostics());
            }
        }
        if !sink.has_errors_since(config_errors) {
            sink.extend(self.program.bind_diagnostics(file));
            sink.extend(self.get_semantic_diagnostics(file));
        }
        if !sink.has_errors_since(config_errors) && self.snapshot.options.emit_declarations() {
            sink.extend(self.get_declaration_diagnostics(file));
        }

        if !sink.has_errors() {
            return None;
        }
        debug!(errors = sink.error_count(), "emit blocked by errors");
        Some(EmitResult::skipped(sink.into_diagnostics()))
    }

    /// Writes the build info if the snapshot changed since it was last
    /// written. Returns `None` when nothing was attempted.
    pub fn emit_build_info(&mut self, options: &EmitOptions<'_>) -> Option<EmitResult> {
        let name = self.program.build_info_file_name()?;
        if self.program.is_emit_blocked(&name) {
            return None;
        }
        if self.snapshot.has_errors.is_unknown() {
            self.snapshot.has_errors = self.ensure_has_errors_for_state();
            if self.snapshot.has_errors != self.snapshot.has_errors_from_old_state {
                self.snapshot.build_info_emit_pending = true;
            }
        }
        if !self.snapshot.build_info_emit_pending || self.cancel.is_cancelled() {
            return None;
        }

        let build_info = snapshot_to_build_info(&self.snapshot, &self.program, &name);
        let written = build_info.to_json().map_err(|err| err.to_string()).and_then(|text| {
            let result = match options.write_file {
                Some(write_file) => {
                    let mut data = WriteFileData {
                        build_info: Some(build_info),
                        ..Default::default()
                    };
                    write_file(&name, &text, &mut data)
                }
                None => self.program.file_system().write_file(&name, &text),
            };
            result.map_err(|err| err.to_string())
        });

        match written {
            Ok(()) => {
                debug!(path = %name, "wrote build info");
                self.snapshot.build_info_emit_pending = false;
                let emitted_files = if self.snapshot.options.list_emitted_files.is_true() {
                    vec![name]
                } else {
                    Vec::new()
                };
                Some(EmitResult {
                    emit_skipped: false,
                    diagnostics: Vec::new(),
                    emitted_files,
                })
            }
            Err(reason) => Some(EmitResult::skipped(vec![
                DiagnosticMessage::COULD_NOT_WRITE_FILE.to_global(&[&name, &reason]),
            ])),
        }
    }

    /// Whether the state has errors, as recorded in build info.
    ///
    /// With incremental state, file-level errors are recoverable from the
    /// cached diagnostics, so only program-level errors count.
    fn ensure_has_errors_for_state(&self) -> Tristate {
        let incremental = self.snapshot.options.is_incremental();
        let file_level = self.program.source_files().iter().any(|file| {
            match self.snapshot.semantic_diagnostics_per_file.get(&file.path) {
                None => incremental,
                Some(cached) if !cached.is_empty() => true,
                Some(_) => self.snapshot.emit_diagnostics_per_file.contains_key(&file.path),
            }
        });
        if file_level {
            return (!incremental).into();
        }

        let program_level = !self.program.config_file_parsing_diagnostics().is_empty()
            || !self.program.syntactic_diagnostics(None).is_empty()
            || !self.program.bind_diagnostics(None).is_empty()
            || !self.program.options_diagnostics().is_empty();
        program_level.into()
    }
}

/// Drops diagnostics that only apply when emitting, if emit is disabled.
fn filter_no_emit_semantic_diagnostics(diagnostics: Vec<Diagnostic>, no_emit: bool) -> Vec<Diagnostic> {
    if !no_emit {
        return diagnostics;
    }
    diagnostics
        .into_iter()
        .filter(|diagnostic| !diagnostic.skipped_on_no_emit)
        .collect()
}
