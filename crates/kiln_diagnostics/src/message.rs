//! Message templates for diagnostics the engine reports on its own.

use crate::category::Category;
use crate::diagnostic::Diagnostic;

/// A diagnostic message template with `{0}`, `{1}`, ... placeholders.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DiagnosticMessage {
    /// Numeric diagnostic code.
    pub code: u32,
    /// Category of diagnostics created from this template.
    pub category: Category,
    /// Template text.
    pub text: &'static str,
}

impl DiagnosticMessage {
    /// Reported when the build-info file cannot be written.
    pub const COULD_NOT_WRITE_FILE: DiagnosticMessage = DiagnosticMessage {
        code: 5033,
        category: Category::Error,
        text: "Could not write file '{0}': {1}.",
    };

    /// Substitutes `args` into the template.
    pub fn format(&self, args: &[&str]) -> String {
        let mut out = self.text.to_string();
        for (i, arg) in args.iter().enumerate() {
            out = out.replace(&format!("{{{i}}}"), arg);
        }
        out
    }

    /// Creates a program-wide diagnostic from this template.
    pub fn to_global(&self, args: &[&str]) -> Diagnostic {
        Diagnostic::global(self.code, self.category, self.format(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_substitutes_in_order() {
        let text = DiagnosticMessage::COULD_NOT_WRITE_FILE.format(&["/out/a.tsbuildinfo", "disk full"]);
        assert_eq!(text, "Could not write file '/out/a.tsbuildinfo': disk full.");
    }

    #[test]
    fn to_global_uses_code_and_category() {
        let diag = DiagnosticMessage::COULD_NOT_WRITE_FILE.to_global(&["x", "y"]);
        assert_eq!(diag.code, 5033);
        assert!(diag.is_error());
        assert!(diag.file.is_none());
    }
}
