//! The collaborator surface the engine drives.
//!
//! A [`Program`] is a parsed and bound set of source files together with
//! the services the engine needs from the rest of the compiler: diagnostics,
//! emit, and a [`TypeChecker`] for resolving what a file depends on. The
//! engine never looks inside files beyond the facts these traits expose.

use crate::build_info::BuildInfo;
use crate::fs::FileSystem;
use kiln_config::CompilerOptions;
use kiln_diagnostics::Diagnostic;
use kiln_source::{ModuleName, ResolutionMode, SourceFile, SourcePath};
use std::io;
use std::ops::Deref;

/// Facts about one symbol exported from a file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportedSymbol {
    /// The exported name.
    pub name: String,
    /// The symbol itself is a `const enum`.
    pub is_const_enum: bool,
    /// What the symbol resolves to, when it is an alias of another symbol.
    pub alias_target: Option<AliasTarget>,
}

/// The symbol an exported alias resolves to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AliasTarget {
    /// The target is a `const enum`.
    pub is_const_enum: bool,
    /// Files containing the target's declarations.
    pub declaration_files: Vec<SourcePath>,
}

/// Symbol-level queries used to build the reference graph.
pub trait TypeChecker {
    /// Returns the files declaring the module `module_name` (as written in
    /// `file`) resolves to, including files that augment it.
    fn module_declaring_files(&self, file: &SourceFile, module_name: &ModuleName) -> Vec<SourcePath>;

    /// Returns the files declaring any ambient module of the program.
    fn ambient_module_declaring_files(&self) -> Vec<SourcePath>;

    /// Returns the symbols `file` exports.
    fn exported_symbols(&self, file: &SourceFile) -> Vec<ExportedSymbol>;
}

/// A checker borrowed from a [`Program`], released when dropped.
pub struct CheckerLease<'a> {
    checker: &'a dyn TypeChecker,
    release: Option<Box<dyn FnOnce() + 'a>>,
}

impl<'a> CheckerLease<'a> {
    /// Lends `checker` without any release action.
    pub fn new(checker: &'a dyn TypeChecker) -> Self {
        Self {
            checker,
            release: None,
        }
    }

    /// Lends `checker` and runs `release` when the lease is dropped.
    pub fn with_release(checker: &'a dyn TypeChecker, release: impl FnOnce() + 'a) -> Self {
        Self {
            checker,
            release: Some(Box::new(release)),
        }
    }
}

impl<'a> Deref for CheckerLease<'a> {
    type Target = dyn TypeChecker + 'a;

    fn deref(&self) -> &Self::Target {
        self.checker
    }
}

impl Drop for CheckerLease<'_> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Which outputs an emit call should produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EmitOnly {
    /// Every output the options ask for.
    #[default]
    All,
    /// JavaScript outputs only.
    Js,
    /// Declaration outputs only.
    Dts,
    /// A declaration file even when the options do not ask for one. Used to
    /// compute signatures.
    ForcedDts,
}

/// Extra information passed along with each written file.
#[derive(Clone, Debug, Default)]
pub struct WriteFileData {
    /// Byte offset of the source-map URL comment in the text, if any.
    pub source_map_url_pos: Option<usize>,
    /// Declaration diagnostics reported while producing the file.
    pub diagnostics: Vec<Diagnostic>,
    /// Set when the declaration file was not written because its content is
    /// unchanged.
    pub skipped_dts_write: bool,
    /// Set when the declaration file differs from the previous one only by
    /// the declaration-map option.
    pub differs_only_in_map: bool,
    /// The build info being written, when the file is the build-info file.
    pub build_info: Option<BuildInfo>,
}

/// Callback used to write emitted files.
pub type WriteFileCallback<'a> =
    dyn Fn(&str, &str, &mut WriteFileData) -> io::Result<()> + Sync + 'a;

/// Arguments to an emit call.
#[derive(Clone, Copy, Default)]
pub struct EmitOptions<'a> {
    /// Emit only this file instead of every pending file.
    pub target_source_file: Option<&'a SourcePath>,
    /// Which outputs to produce.
    pub emit_only: EmitOnly,
    /// Where to write outputs; the program's file system when `None`.
    pub write_file: Option<&'a WriteFileCallback<'a>>,
}

/// The outcome of an emit call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmitResult {
    /// Nothing was written.
    pub emit_skipped: bool,
    /// Diagnostics reported while emitting.
    pub diagnostics: Vec<Diagnostic>,
    /// Files written, when the options ask for them to be listed.
    pub emitted_files: Vec<String>,
}

impl EmitResult {
    /// A result that wrote nothing and carries `diagnostics`.
    pub fn skipped(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            emit_skipped: true,
            diagnostics,
            emitted_files: Vec::new(),
        }
    }

    /// Merges results: skipped if any was skipped, everything else appended.
    pub fn combine(results: impl IntoIterator<Item = EmitResult>) -> Self {
        results.into_iter().fold(EmitResult::default(), |mut acc, result| {
            acc.emit_skipped |= result.emit_skipped;
            acc.diagnostics.extend(result.diagnostics);
            acc.emitted_files.extend(result.emitted_files);
            acc
        })
    }

    /// Appends another result's diagnostics and emitted files.
    pub fn append(&mut self, other: EmitResult) {
        self.diagnostics.extend(other.diagnostics);
        self.emitted_files.extend(other.emitted_files);
    }
}

/// A parsed, bound, checkable program.
///
/// Implementations must be shareable across threads: the engine queries
/// different files from parallel tasks.
pub trait Program: Sync {
    /// Compiler options of this program.
    fn options(&self) -> &CompilerOptions;

    /// Every source file, in program order.
    fn source_files(&self) -> &[SourceFile];

    /// Looks up a file by path.
    fn source_file_by_path(&self, path: &SourcePath) -> Option<&SourceFile>;

    /// Returns `true` for the default library file(s).
    fn is_source_file_default_library(&self, path: &SourcePath) -> bool;

    /// Module format `path` is interpreted under.
    fn implied_node_format(&self, path: &SourcePath) -> ResolutionMode;

    /// Borrows a checker that can answer questions about `file`.
    fn type_checker_for_file(&self, file: &SourceFile) -> CheckerLease<'_>;

    /// Resolved file names of the type-reference directives in `path`.
    fn resolved_type_reference_directives(&self, path: &SourcePath) -> Vec<String>;

    /// The file a referenced file name was redirected to, if any.
    fn parse_file_redirect(&self, file_name: &str) -> Option<String> {
        let _ = file_name;
        None
    }

    /// Directory relative file names are resolved against.
    fn current_directory(&self) -> &str;

    /// Whether file names are case sensitive on the host.
    fn use_case_sensitive_file_names(&self) -> bool;

    /// Whether all work must run on the calling thread.
    fn single_threaded(&self) -> bool;

    /// Diagnostics from reading the configuration.
    fn config_file_parsing_diagnostics(&self) -> Vec<Diagnostic>;

    /// Parse diagnostics of `file`, or of every file.
    fn syntactic_diagnostics(&self, file: Option<&SourcePath>) -> Vec<Diagnostic>;

    /// Binder diagnostics of `file`, or of every file.
    fn bind_diagnostics(&self, file: Option<&SourcePath>) -> Vec<Diagnostic>;

    /// Diagnostics about the options themselves.
    fn options_diagnostics(&self) -> Vec<Diagnostic>;

    /// Diagnostics not attached to any file.
    fn global_diagnostics(&self) -> Vec<Diagnostic>;

    /// Checks `files` and returns each file's semantic diagnostics, without
    /// filtering anything out.
    fn semantic_diagnostics_no_filter(&self, files: &[&SourceFile]) -> Vec<(SourcePath, Vec<Diagnostic>)>;

    /// Declaration diagnostics of `file`.
    fn declaration_diagnostics(&self, file: &SourceFile) -> Vec<Diagnostic>;

    /// Emits outputs.
    fn emit(&self, options: EmitOptions<'_>) -> EmitResult;

    /// Whether `file` produces outputs at all.
    fn source_file_may_be_emitted(&self, file: &SourceFile, force_dts_emit: bool) -> bool;

    /// Where build info is written, `None` when it is not written.
    fn build_info_file_name(&self) -> Option<String>;

    /// Whether writing `file_name` is blocked, e.g. because it would
    /// overwrite an input.
    fn is_emit_blocked(&self, file_name: &str) -> bool {
        let _ = file_name;
        false
    }

    /// The file system outputs are written to by default.
    fn file_system(&self) -> &dyn FileSystem;
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_diagnostics::Category;
    use std::cell::Cell;

    struct NoChecker;

    impl TypeChecker for NoChecker {
        fn module_declaring_files(&self, _: &SourceFile, _: &ModuleName) -> Vec<SourcePath> {
            Vec::new()
        }
        fn ambient_module_declaring_files(&self) -> Vec<SourcePath> {
            vec![SourcePath::from_normalized("/p/ambient.d.ts")]
        }
        fn exported_symbols(&self, _: &SourceFile) -> Vec<ExportedSymbol> {
            Vec::new()
        }
    }

    #[test]
    fn lease_releases_on_drop() {
        let released = Cell::new(false);
        {
            let lease = CheckerLease::with_release(&NoChecker, || released.set(true));
            assert_eq!(lease.ambient_module_declaring_files().len(), 1);
            assert!(!released.get());
        }
        assert!(released.get());
    }

    #[test]
    fn combine_results() {
        let a = EmitResult {
            emit_skipped: false,
            diagnostics: vec![Diagnostic::global(1, Category::Error, "a")],
            emitted_files: vec!["/p/a.js".to_string()],
        };
        let b = EmitResult::skipped(vec![Diagnostic::global(2, Category::Error, "b")]);
        let combined = EmitResult::combine([a, b]);
        assert!(combined.emit_skipped);
        assert_eq!(combined.diagnostics.len(), 2);
        assert_eq!(combined.emitted_files, vec!["/p/a.js".to_string()]);
    }

    #[test]
    fn combine_nothing_is_not_skipped() {
        let combined = EmitResult::combine(Vec::new());
        assert!(!combined.emit_skipped);
        assert!(combined.diagnostics.is_empty());
    }
}
