//! Ordered diagnostic collection with a running error count.

use crate::diagnostic::Diagnostic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Collects diagnostics from one or more tasks, keeping arrival order.
///
/// Callers gathering diagnostics in stages take an [`error_count`] mark
/// before a stage and ask [`has_errors_since`] afterwards to decide whether
/// the next stage should run.
///
/// [`error_count`]: DiagnosticSink::error_count
/// [`has_errors_since`]: DiagnosticSink::has_errors_since
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
    errors: AtomicUsize,
}

impl DiagnosticSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one diagnostic.
    pub fn push(&self, diagnostic: Diagnostic) {
        self.extend([diagnostic]);
    }

    /// Records `diagnostics` in order.
    pub fn extend(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        let mut stored = self.diagnostics.lock().unwrap();
        let start = stored.len();
        stored.extend(diagnostics);
        let errors = stored[start..].iter().filter(|d| d.is_error()).count();
        self.errors.fetch_add(errors, Ordering::Relaxed);
    }

    /// Number of error diagnostics recorded so far.
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns `true` if any error was recorded.
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Returns `true` if errors were recorded after the `mark` taken from
    /// [`error_count`](DiagnosticSink::error_count).
    pub fn has_errors_since(&self, mark: usize) -> bool {
        self.error_count() > mark
    }

    /// Consumes the sink, returning its diagnostics.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics.into_inner().unwrap()
    }
}
