//! Cached per-file diagnostics, either live or read back from build info.

use kiln_diagnostics::{Category, Diagnostic};
use kiln_source::{SourcePath, TextRange};
use std::sync::OnceLock;

/// A diagnostic as restored from build info, before it is attached to files.
///
/// `file` is set only when the diagnostic belongs to a file other than the
/// one it is cached for; `no_file` marks a program-wide diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedDiagnostic {
    /// The diagnostic's own file, when it differs from the owning file.
    pub file: Option<SourcePath>,
    /// The diagnostic has no file at all.
    pub no_file: bool,
    /// Start offset.
    pub pos: u32,
    /// End offset.
    pub end: u32,
    /// Diagnostic code.
    pub code: u32,
    /// Category.
    pub category: Category,
    /// Message text.
    pub message: String,
    /// Nested elaborations.
    pub message_chain: Vec<PersistedDiagnostic>,
    /// Related locations.
    pub related_information: Vec<PersistedDiagnostic>,
    /// See [`Diagnostic::reports_unnecessary`].
    pub reports_unnecessary: bool,
    /// See [`Diagnostic::reports_deprecated`].
    pub reports_deprecated: bool,
    /// See [`Diagnostic::skipped_on_no_emit`].
    pub skipped_on_no_emit: bool,
}

impl PersistedDiagnostic {
    /// Attaches the record to files: its own file if recorded, otherwise
    /// `owner` unless it has no file. Nested records default to the file
    /// resolved for their parent.
    pub fn to_diagnostic(&self, owner: Option<&SourcePath>) -> Diagnostic {
        let file = match (&self.file, self.no_file) {
            (Some(file), _) => Some(file.clone()),
            (None, false) => owner.cloned(),
            (None, true) => None,
        };
        let nested = |records: &[PersistedDiagnostic]| {
            records
                .iter()
                .map(|record| record.to_diagnostic(file.as_ref()))
                .collect::<Vec<_>>()
        };
        Diagnostic {
            message_chain: nested(&self.message_chain),
            related_information: nested(&self.related_information),
            file,
            range: TextRange::new(self.pos, self.end),
            code: self.code,
            category: self.category,
            message: self.message.clone(),
            reports_unnecessary: self.reports_unnecessary,
            reports_deprecated: self.reports_deprecated,
            skipped_on_no_emit: self.skipped_on_no_emit,
        }
    }
}

/// The cached diagnostics of one file.
#[derive(Debug)]
pub enum CachedDiagnostics {
    /// Diagnostics produced by this process.
    Materialized(Vec<Diagnostic>),
    /// Diagnostics read from build info, converted on first use.
    Persisted {
        /// The records as read.
        records: Vec<PersistedDiagnostic>,
        /// The converted diagnostics, once resolved.
        resolved: OnceLock<Vec<Diagnostic>>,
    },
}

impl CachedDiagnostics {
    /// Wraps live diagnostics.
    pub fn materialized(diagnostics: Vec<Diagnostic>) -> Self {
        CachedDiagnostics::Materialized(diagnostics)
    }

    /// Wraps persisted records for lazy conversion.
    pub fn persisted(records: Vec<PersistedDiagnostic>) -> Self {
        CachedDiagnostics::Persisted {
            records,
            resolved: OnceLock::new(),
        }
    }

    /// A cache entry recording that the file has no diagnostics.
    pub fn empty() -> Self {
        CachedDiagnostics::Materialized(Vec::new())
    }

    /// Returns the diagnostics, converting persisted records against
    /// `owner` the first time they are asked for.
    pub fn resolve(&self, owner: &SourcePath) -> &[Diagnostic] {
        match self {
            CachedDiagnostics::Materialized(diagnostics) => diagnostics,
            CachedDiagnostics::Persisted { records, resolved } => resolved.get_or_init(|| {
                records
                    .iter()
                    .map(|record| record.to_diagnostic(Some(owner)))
                    .collect()
            }),
        }
    }

    /// Returns `true` if no diagnostic is cached.
    pub fn is_empty(&self) -> bool {
        match self {
            CachedDiagnostics::Materialized(diagnostics) => diagnostics.is_empty(),
            CachedDiagnostics::Persisted { records, .. } => records.is_empty(),
        }
    }
}
