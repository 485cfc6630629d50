//! Hashing of file versions and declaration signatures.

use kiln_common::ContentHash;
use kiln_diagnostics::Diagnostic;
use kiln_source::{ensure_path_is_non_module_name, get_relative_path_from_directory, SourcePath};
use std::fmt::Write;

use crate::program::WriteFileData;

/// How a file's signature was last updated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureUpdateKind {
    /// Computed from a forced declaration emit.
    ComputedDts,
    /// Recorded while the declaration file was being written.
    StoredAtEmit,
    /// The file's version was used as its signature.
    UsedVersion,
}

/// Hashes `text`. With `with_text`, the text is appended as `<hex>-<text>`.
pub fn compute_hash(text: &str, with_text: bool) -> String {
    let hash = ContentHash::of(text).to_hex();
    if with_text {
        format!("{hash}-{text}")
    } else {
        hash
    }
}

/// Returns the part of a declaration text that defines its signature: the
/// text before the source-map URL comment, if any.
pub fn text_for_signature<'a>(text: &'a str, data: &WriteFileData) -> &'a str {
    data.source_map_url_pos
        .and_then(|pos| text.get(..pos))
        .unwrap_or(text)
}

/// Computes the signature of `file` from its declaration text and the
/// declaration diagnostics reported while producing it.
pub fn compute_signature_with_diagnostics(
    file: &SourcePath,
    text: &str,
    data: &WriteFileData,
    with_text: bool,
) -> String {
    let mut input = text_for_signature(text, data).to_string();
    for diagnostic in &data.diagnostics {
        write_diagnostic(diagnostic, file, &mut input);
    }
    compute_hash(&input, with_text)
}

fn write_diagnostic(diagnostic: &Diagnostic, file: &SourcePath, out: &mut String) {
    out.push('\n');
    if let Some(diagnostic_file) = &diagnostic.file {
        if diagnostic_file != file {
            let relative = get_relative_path_from_directory(
                file.directory(),
                diagnostic_file.as_str(),
                false,
            );
            out.push_str(&ensure_path_is_non_module_name(&relative));
        }
        let _ = write!(out, "({},{}): ", diagnostic.range.pos, diagnostic.range.len());
    }
    let _ = write!(
        out,
        "{}{}: {}",
        diagnostic.category.name(),
        diagnostic.code,
        diagnostic.message
    );
    for chain in &diagnostic.message_chain {
        write_diagnostic(chain, file, out);
    }
    for related in &diagnostic.related_information {
        write_diagnostic(related, file, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_diagnostics::Category;
    use kiln_source::TextRange;

    fn p(name: &str) -> SourcePath {
        SourcePath::from_normalized(format!("/p/src/{name}"))
    }

    #[test]
    fn hash_with_text_appends_input() {
        let plain = compute_hash("declare const a: 1;", false);
        assert_eq!(plain.len(), 32);
        assert_eq!(
            compute_hash("declare const a: 1;", true),
            format!("{plain}-declare const a: 1;")
        );
    }

    #[test]
    fn source_map_comment_is_ignored() {
        let text = "export declare const a: number;\n//# sourceMappingURL=a.d.ts.map";
        let with_map = WriteFileData {
            source_map_url_pos: Some(32),
            ..Default::default()
        };
        let signature = compute_signature_with_diagnostics(&p("a.ts"), text, &with_map, true);
        assert!(signature.ends_with("-export declare const a: number;\n"));
    }

    #[test]
    fn map_position_inside_a_character_keeps_the_whole_text() {
        let text = "export declare const s: \"é\";\n";
        let inside = text.find('é').unwrap() + 1;
        let data = WriteFileData {
            source_map_url_pos: Some(inside),
            ..Default::default()
        };
        assert_eq!(text_for_signature(text, &data), text);

        let data = WriteFileData {
            source_map_url_pos: Some(text.len() + 4),
            ..Default::default()
        };
        assert_eq!(text_for_signature(text, &data), text);
    }

    #[test]
    fn diagnostics_are_part_of_the_signature() {
        let text = "export declare const a: any;";
        let clean = WriteFileData::default();
        let chained = Diagnostic::new(
            Some(p("a.ts")),
            TextRange::new(2, 4),
            9008,
            Category::Message,
            "add a type annotation",
        );
        let with_errors = WriteFileData {
            diagnostics: vec![Diagnostic::error(
                p("a.ts"),
                TextRange::new(21, 24),
                9005,
                "declaration emit needs an explicit type",
            )
            .with_chain(chained)],
            ..Default::default()
        };

        let a = compute_signature_with_diagnostics(&p("a.ts"), text, &clean, true);
        let b = compute_signature_with_diagnostics(&p("a.ts"), text, &with_errors, true);
        assert_ne!(a, b);
        assert!(b.ends_with(
            "any;\n(21,3): error9005: declaration emit needs an explicit type\n(2,2): message9008: add a type annotation"
        ));
    }

    #[test]
    fn diagnostics_in_other_files_carry_relative_path() {
        let data = WriteFileData {
            diagnostics: vec![
                Diagnostic::error(
                    SourcePath::from_normalized("/p/lib/b.ts"),
                    TextRange::new(0, 1),
                    2304,
                    "missing",
                ),
                Diagnostic::global(2318, Category::Error, "global type missing"),
            ],
            ..Default::default()
        };
        let signature = compute_signature_with_diagnostics(&p("a.ts"), "x", &data, true);
        assert!(signature.ends_with("x\n../lib/b.ts(0,1): error2304: missing\nerror2318: global type missing"));
    }
}
