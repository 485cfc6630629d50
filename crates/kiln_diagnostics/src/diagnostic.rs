//! Structured diagnostics with message chains and related information.

use crate::category::Category;
use kiln_source::{SourcePath, TextRange};

/// A diagnostic reported against a file (or against the whole program).
///
/// `message_chain` holds the nested "elaborations" of the head message and
/// `related_information` points at other locations; both nest the same shape
/// recursively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// The file the diagnostic is reported in, `None` for global diagnostics.
    pub file: Option<SourcePath>,
    /// Position within `file`.
    pub range: TextRange,
    /// Numeric diagnostic code.
    pub code: u32,
    /// Category of the diagnostic.
    pub category: Category,
    /// The fully formatted message text.
    pub message: String,
    /// Nested elaborations of `message`.
    pub message_chain: Vec<Diagnostic>,
    /// Other locations relevant to this diagnostic.
    pub related_information: Vec<Diagnostic>,
    /// Marks code reported as unnecessary (rendered faded in editors).
    pub reports_unnecessary: bool,
    /// Marks use of a deprecated entity.
    pub reports_deprecated: bool,
    /// Dropped from results when emit is disabled.
    pub skipped_on_no_emit: bool,
}

impl Diagnostic {
    /// Creates a diagnostic at `range` in `file`.
    pub fn new(
        file: Option<SourcePath>,
        range: TextRange,
        code: u32,
        category: Category,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file,
            range,
            code,
            category,
            message: message.into(),
            message_chain: Vec::new(),
            related_information: Vec::new(),
            reports_unnecessary: false,
            reports_deprecated: false,
            skipped_on_no_emit: false,
        }
    }

    /// Creates an error diagnostic located in `file`.
    pub fn error(file: SourcePath, range: TextRange, code: u32, message: impl Into<String>) -> Self {
        Self::new(Some(file), range, code, Category::Error, message)
    }

    /// Creates a program-wide diagnostic with no file.
    pub fn global(code: u32, category: Category, message: impl Into<String>) -> Self {
        Self::new(None, TextRange::default(), code, category, message)
    }

    /// Appends an elaboration to the message chain.
    pub fn with_chain(mut self, chain: Diagnostic) -> Self {
        self.message_chain.push(chain);
        self
    }

    /// Appends related information.
    pub fn with_related(mut self, related: Diagnostic) -> Self {
        self.related_information.push(related);
        self
    }

    /// Marks this diagnostic as skipped when emit is disabled.
    pub fn skipped_on_no_emit(mut self) -> Self {
        self.skipped_on_no_emit = true;
        self
    }

    /// Returns `true` if the category is [`Category::Error`].
    pub fn is_error(&self) -> bool {
        self.category.is_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> SourcePath {
        SourcePath::from_normalized("/p/a.ts")
    }

    #[test]
    fn create_error() {
        let diag = Diagnostic::error(path(), TextRange::new(0, 3), 2322, "type mismatch");
        assert!(diag.is_error());
        assert_eq!(diag.code, 2322);
        assert_eq!(diag.file, Some(path()));
    }

    #[test]
    fn global_has_no_file() {
        let diag = Diagnostic::global(5033, Category::Error, "could not write");
        assert!(diag.file.is_none());
        assert_eq!(diag.range, TextRange::default());
    }

    #[test]
    fn builder_methods_nest() {
        let chain = Diagnostic::new(Some(path()), TextRange::new(1, 2), 2326, Category::Message, "inner");
        let related = Diagnostic::new(
            Some(SourcePath::from_normalized("/p/b.ts")),
            TextRange::new(4, 9),
            2728,
            Category::Message,
            "declared here",
        );
        let diag = Diagnostic::error(path(), TextRange::new(0, 3), 2322, "outer")
            .with_chain(chain)
            .with_related(related)
            .skipped_on_no_emit();
        assert_eq!(diag.message_chain.len(), 1);
        assert_eq!(diag.related_information.len(), 1);
        assert!(diag.skipped_on_no_emit);
    }
}
