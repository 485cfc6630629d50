//! The compiler options the incremental engine reads.

use kiln_common::Tristate;
use serde::{Deserialize, Serialize};

fn is_unset(value: &Tristate) -> bool {
    value.is_unknown()
}

/// Compiler options, keyed in camelCase exactly as they appear in a
/// `[compilerOptions]` table and in persisted build state.
///
/// Boolean flags are [`Tristate`] so "not set" can be told apart from an
/// explicit `false`; only explicitly set options are serialized.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompilerOptions {
    /// Persist build state between runs.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub incremental: Tristate,
    /// Build as a referenceable project; implies `incremental` and `declaration`.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub composite: Tristate,
    /// Emit declaration files.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub declaration: Tristate,
    /// Emit source maps for declaration files.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub declaration_map: Tristate,
    /// Emit only declaration files.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub emit_declaration_only: Tristate,
    /// Emit `.js.map` files.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub source_map: Tristate,
    /// Embed source maps in the emitted JavaScript.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub inline_source_map: Tristate,
    /// Require every file to be transpilable on its own.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub isolated_modules: Tristate,
    /// Do not emit outputs.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub no_emit: Tristate,
    /// Skip semantic checking.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub no_check: Tristate,
    /// Do not emit outputs if any errors were reported.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub no_emit_on_error: Tristate,
    /// Skip type checking of declaration files.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub skip_lib_check: Tristate,
    /// Skip type checking of the default library.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub skip_default_lib_check: Tristate,
    /// Recheck only direct dependents of a changed file.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub assume_changes_only_affect_direct_dependencies: Tristate,
    /// Enable all strict checks.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub strict: Tristate,
    /// Report implied `any` types.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub no_implicit_any: Tristate,
    /// Treat `null` and `undefined` as distinct types.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub strict_null_checks: Tristate,
    /// Print the names of emitted files.
    #[serde(default, skip_serializing_if = "is_unset")]
    pub list_emitted_files: Tristate,
    /// Language level of the emitted JavaScript.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Module system of the emitted JavaScript.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Output directory for emitted files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<String>,
    /// Output directory for declaration files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration_dir: Option<String>,
    /// Root directory of the input files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<String>,
    /// Location of the persisted build-info file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts_build_info_file: Option<String>,
}

impl CompilerOptions {
    /// Returns `true` if build state is persisted between runs.
    pub fn is_incremental(&self) -> bool {
        self.incremental.is_true() || self.composite.is_true()
    }

    /// Returns `true` if declaration files are produced.
    pub fn emit_declarations(&self) -> bool {
        self.declaration.is_true() || self.composite.is_true()
    }

    /// Parses options from a JSON object such as the `options` field of a
    /// persisted build-info file.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_implies_incremental_and_declarations() {
        let options = CompilerOptions {
            composite: Tristate::True,
            ..Default::default()
        };
        assert!(options.is_incremental());
        assert!(options.emit_declarations());
    }

    #[test]
    fn defaults_emit_nothing_extra() {
        let options = CompilerOptions::default();
        assert!(!options.is_incremental());
        assert!(!options.emit_declarations());
    }

    #[test]
    fn serializes_only_set_options() {
        let options = CompilerOptions {
            declaration: Tristate::True,
            source_map: Tristate::False,
            out_dir: Some("/p/dist".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"declaration": true, "sourceMap": false, "outDir": "/p/dist"})
        );
    }

    #[test]
    fn from_json_rejects_unknown_keys() {
        let err = CompilerOptions::from_json(serde_json::json!({"bogus": true}));
        assert!(err.is_err());
        let ok = CompilerOptions::from_json(serde_json::json!({"composite": true})).unwrap();
        assert!(ok.composite.is_true());
    }
}
