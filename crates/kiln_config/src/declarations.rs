//! Static metadata about each compiler option.
//!
//! The incremental engine never compares options field by field. It asks this
//! table whether any option flagged with a given effect differs between two
//! option sets, and it uses the `affects_build_info` flag to decide which
//! options are persisted.

use crate::options::CompilerOptions;
use kiln_common::Tristate;

#[derive(Clone, Copy)]
enum Getter {
    Flag(fn(&CompilerOptions) -> Tristate),
    Text(fn(&CompilerOptions) -> Option<&str>),
}

impl std::fmt::Debug for Getter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Getter::Flag(_) => f.write_str("Flag"),
            Getter::Text(_) => f.write_str("Text"),
        }
    }
}

/// The value of one option, borrowed from a [`CompilerOptions`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OptionValue<'a> {
    /// A boolean option.
    Flag(Tristate),
    /// A string or path option.
    Text(Option<&'a str>),
}

impl OptionValue<'_> {
    /// Returns `true` if the option was explicitly set.
    pub fn is_set(&self) -> bool {
        match self {
            OptionValue::Flag(value) => !value.is_unknown(),
            OptionValue::Text(value) => value.is_some(),
        }
    }

    /// Converts the value into JSON (`null` when unset).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            OptionValue::Flag(Tristate::Unknown) | OptionValue::Text(None) => {
                serde_json::Value::Null
            }
            OptionValue::Flag(value) => serde_json::Value::Bool(value.is_true()),
            OptionValue::Text(Some(text)) => serde_json::Value::String((*text).to_string()),
        }
    }
}

/// Describes one compiler option and which parts of a build it influences.
#[derive(Clone, Copy, Debug)]
pub struct OptionDeclaration {
    /// The camelCase option name.
    pub name: &'static str,
    /// The value is a file system path, resolved relative to its config file.
    pub is_file_path: bool,
    /// Changing the option changes emitted output for every file.
    pub affects_emit: bool,
    /// Changing the option invalidates cached semantic diagnostics.
    pub affects_semantic_diagnostics: bool,
    /// Changing the option moves declaration output files.
    pub affects_declaration_path: bool,
    /// The option is persisted in build-info files.
    pub affects_build_info: bool,
    getter: Getter,
}

impl OptionDeclaration {
    /// Reads this option's value from `options`.
    pub fn value<'a>(&self, options: &'a CompilerOptions) -> OptionValue<'a> {
        match self.getter {
            Getter::Flag(get) => OptionValue::Flag(get(options)),
            Getter::Text(get) => OptionValue::Text(get(options)),
        }
    }
}

const fn flag(name: &'static str, get: fn(&CompilerOptions) -> Tristate) -> OptionDeclaration {
    OptionDeclaration {
        name,
        is_file_path: false,
        affects_emit: false,
        affects_semantic_diagnostics: false,
        affects_declaration_path: false,
        affects_build_info: false,
        getter: Getter::Flag(get),
    }
}

const fn text(name: &'static str, get: fn(&CompilerOptions) -> Option<&str>) -> OptionDeclaration {
    OptionDeclaration {
        name,
        is_file_path: false,
        affects_emit: false,
        affects_semantic_diagnostics: false,
        affects_declaration_path: false,
        affects_build_info: false,
        getter: Getter::Text(get),
    }
}

impl OptionDeclaration {
    const fn path(mut self) -> Self {
        self.is_file_path = true;
        self
    }

    const fn emit(mut self) -> Self {
        self.affects_emit = true;
        self
    }

    const fn semantic(mut self) -> Self {
        self.affects_semantic_diagnostics = true;
        self
    }

    const fn declaration_path(mut self) -> Self {
        self.affects_declaration_path = true;
        self
    }

    const fn build_info(mut self) -> Self {
        self.affects_build_info = true;
        self
    }
}

/// Every option [`CompilerOptions`] understands, in persisted order.
///
/// Options that only select which output kinds are produced (`declaration`,
/// `sourceMap`, ...) are not marked `affects_emit`; the engine tracks them per
/// output kind.
pub static OPTION_DECLARATIONS: &[OptionDeclaration] = &[
    flag("assumeChangesOnlyAffectDirectDependencies", |o| {
        o.assume_changes_only_affect_direct_dependencies
    })
    .emit()
    .semantic()
    .build_info(),
    flag("composite", |o| o.composite).build_info(),
    flag("declaration", |o| o.declaration).build_info(),
    text("declarationDir", |o| o.declaration_dir.as_deref())
        .path()
        .emit()
        .declaration_path()
        .build_info(),
    flag("declarationMap", |o| o.declaration_map).build_info(),
    flag("emitDeclarationOnly", |o| o.emit_declaration_only).build_info(),
    flag("incremental", |o| o.incremental),
    flag("inlineSourceMap", |o| o.inline_source_map).build_info(),
    flag("isolatedModules", |o| o.isolated_modules)
        .semantic()
        .build_info(),
    flag("listEmittedFiles", |o| o.list_emitted_files),
    text("module", |o| o.module.as_deref())
        .emit()
        .semantic()
        .build_info(),
    flag("noCheck", |o| o.no_check).semantic().build_info(),
    flag("noEmit", |o| o.no_emit),
    flag("noEmitOnError", |o| o.no_emit_on_error).build_info(),
    flag("noImplicitAny", |o| o.no_implicit_any)
        .semantic()
        .build_info(),
    text("outDir", |o| o.out_dir.as_deref())
        .path()
        .emit()
        .declaration_path()
        .build_info(),
    text("rootDir", |o| o.root_dir.as_deref())
        .path()
        .emit()
        .declaration_path()
        .build_info(),
    flag("skipDefaultLibCheck", |o| o.skip_default_lib_check).build_info(),
    flag("skipLibCheck", |o| o.skip_lib_check).build_info(),
    flag("sourceMap", |o| o.source_map).build_info(),
    flag("strict", |o| o.strict).semantic().build_info(),
    flag("strictNullChecks", |o| o.strict_null_checks)
        .semantic()
        .build_info(),
    text("target", |o| o.target.as_deref())
        .emit()
        .semantic()
        .build_info(),
    text("tsBuildInfoFile", |o| o.ts_build_info_file.as_deref())
        .path()
        .emit()
        .build_info(),
];

/// Looks up an option declaration by its camelCase name.
pub fn find_declaration(name: &str) -> Option<&'static OptionDeclaration> {
    OPTION_DECLARATIONS.iter().find(|decl| decl.name == name)
}

fn options_differ(
    old: &CompilerOptions,
    new: &CompilerOptions,
    affects: impl Fn(&OptionDeclaration) -> bool,
) -> bool {
    OPTION_DECLARATIONS
        .iter()
        .filter(|decl| affects(decl))
        .any(|decl| decl.value(old) != decl.value(new))
}

/// Returns `true` if any emit-affecting option differs.
pub fn compiler_options_affect_emit(old: &CompilerOptions, new: &CompilerOptions) -> bool {
    options_differ(old, new, |decl| decl.affects_emit)
}

/// Returns `true` if any option that influences semantic diagnostics differs.
pub fn compiler_options_affect_semantic_diagnostics(
    old: &CompilerOptions,
    new: &CompilerOptions,
) -> bool {
    options_differ(old, new, |decl| decl.affects_semantic_diagnostics)
}

/// Returns `true` if any option that moves declaration outputs differs.
pub fn compiler_options_affect_declaration_path(
    old: &CompilerOptions,
    new: &CompilerOptions,
) -> bool {
    options_differ(old, new, |decl| decl.affects_declaration_path)
}

impl CompilerOptions {
    /// Returns the explicitly set, build-relevant options with their values,
    /// in table order.
    pub fn build_info_options(&self) -> Vec<(&'static OptionDeclaration, serde_json::Value)> {
        OPTION_DECLARATIONS
            .iter()
            .filter(|decl| decl.affects_build_info)
            .filter_map(|decl| {
                let value = decl.value(self);
                value.is_set().then(|| (decl, value.to_json()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_unique_and_sorted() {
        let names: Vec<_> = OPTION_DECLARATIONS.iter().map(|d| d.name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn every_table_entry_is_a_serde_key() {
        let all_set = CompilerOptions {
            incremental: Tristate::True,
            composite: Tristate::True,
            declaration: Tristate::True,
            declaration_map: Tristate::True,
            emit_declaration_only: Tristate::True,
            source_map: Tristate::True,
            inline_source_map: Tristate::True,
            isolated_modules: Tristate::True,
            no_emit: Tristate::True,
            no_check: Tristate::True,
            no_emit_on_error: Tristate::True,
            skip_lib_check: Tristate::True,
            skip_default_lib_check: Tristate::True,
            assume_changes_only_affect_direct_dependencies: Tristate::True,
            strict: Tristate::True,
            no_implicit_any: Tristate::True,
            strict_null_checks: Tristate::True,
            list_emitted_files: Tristate::True,
            target: Some("es2022".into()),
            module: Some("esnext".into()),
            out_dir: Some("/o".into()),
            declaration_dir: Some("/d".into()),
            root_dir: Some("/r".into()),
            ts_build_info_file: Some("/b".into()),
        };
        let json = serde_json::to_value(&all_set).unwrap();
        let map = json.as_object().unwrap();
        assert_eq!(map.len(), OPTION_DECLARATIONS.len());
        for decl in OPTION_DECLARATIONS {
            assert_eq!(map.get(decl.name), Some(&decl.value(&all_set).to_json()));
        }
    }

    #[test]
    fn source_map_toggle_does_not_affect_emit_or_checking() {
        let old = CompilerOptions::default();
        let new = CompilerOptions {
            source_map: Tristate::True,
            ..Default::default()
        };
        assert!(!compiler_options_affect_emit(&old, &new));
        assert!(!compiler_options_affect_semantic_diagnostics(&old, &new));
    }

    #[test]
    fn out_dir_moves_declarations() {
        let old = CompilerOptions::default();
        let new = CompilerOptions {
            out_dir: Some("/p/dist".into()),
            ..Default::default()
        };
        assert!(compiler_options_affect_emit(&old, &new));
        assert!(compiler_options_affect_declaration_path(&old, &new));
        assert!(!compiler_options_affect_semantic_diagnostics(&old, &new));
    }

    #[test]
    fn strict_affects_semantic_diagnostics() {
        let old = CompilerOptions::default();
        let new = CompilerOptions {
            strict: Tristate::True,
            ..Default::default()
        };
        assert!(compiler_options_affect_semantic_diagnostics(&old, &new));
    }

    #[test]
    fn explicit_false_differs_from_unset() {
        let old = CompilerOptions::default();
        let new = CompilerOptions {
            strict: Tristate::False,
            ..Default::default()
        };
        assert!(compiler_options_affect_semantic_diagnostics(&old, &new));
    }

    #[test]
    fn build_info_options_skip_unset_and_unpersisted() {
        let options = CompilerOptions {
            composite: Tristate::True,
            incremental: Tristate::True,
            skip_lib_check: Tristate::False,
            out_dir: Some("/p/dist".into()),
            ..Default::default()
        };
        let persisted: Vec<_> = options
            .build_info_options()
            .into_iter()
            .map(|(decl, value)| (decl.name, value))
            .collect();
        assert_eq!(
            persisted,
            vec![
                ("composite", serde_json::json!(true)),
                ("outDir", serde_json::json!("/p/dist")),
                ("skipLibCheck", serde_json::json!(false)),
            ]
        );
    }

    #[test]
    fn find_by_name() {
        assert!(find_declaration("outDir").unwrap().is_file_path);
        assert!(find_declaration("nope").is_none());
    }
}
