//! Incremental state tracking for programs that are rebuilt repeatedly.
//!
//! This crate diffs each new [`Program`] against the [`Snapshot`] of the
//! previous one, propagates changes through the file [`ReferenceMap`] using
//! declaration signatures to stop early, and serves semantic diagnostics,
//! declaration diagnostics and emit from cache wherever the result cannot
//! have changed. The [`IncrementalProgram`] wrapper drives all of it; the
//! [`BuildInfo`] document persists a snapshot between processes.

#![warn(missing_docs)]

pub mod affected;
pub mod build_info;
pub mod cancel;
pub mod diagnostics_cache;
pub mod diff;
pub mod emit;
pub mod emit_kind;
pub mod error;
pub mod fs;
pub mod incremental_program;
pub mod program;
pub mod reference_map;
pub mod signature;
pub mod snapshot;
pub mod to_build_info;
pub mod to_snapshot;
pub mod work_group;

pub use affected::{collect_all_affected_files, PropagationReport};
pub use build_info::{BuildInfo, BUILD_INFO_VERSION};
pub use cancel::CancellationToken;
pub use diagnostics_cache::{CachedDiagnostics, PersistedDiagnostic};
pub use diff::{file_affects_global_scope, get_referenced_files, program_to_snapshot};
pub use emit_kind::{get_file_emit_kind, pending_emit_kind, pending_emit_kind_for_options, EmitKind};
pub use error::IncrementalError;
pub use fs::{read_build_info, write_build_info, FileSystem, StdFileSystem};
pub use incremental_program::IncrementalProgram;
pub use program::{
    AliasTarget, CheckerLease, EmitOnly, EmitOptions, EmitResult, ExportedSymbol, Program, TypeChecker,
    WriteFileCallback, WriteFileData,
};
pub use reference_map::ReferenceMap;
pub use signature::SignatureUpdateKind;
pub use snapshot::{EmitSignature, FileInfo, Snapshot};
pub use to_build_info::snapshot_to_build_info;
pub use to_snapshot::{build_info_to_snapshot, read_build_info_snapshot};
pub use work_group::WorkGroup;
