//! Configuration file loading and validation.

use crate::declarations::find_declaration;
use crate::error::ConfigError;
use crate::options::CompilerOptions;
use crate::settings::EngineSettings;
use serde::Deserialize;
use std::path::Path;

/// The name of the configuration file looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// The parsed contents of a `kiln.toml` file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Options from the `[compilerOptions]` table.
    #[serde(rename = "compilerOptions", default)]
    pub compiler_options: CompilerOptions,
    /// Settings from the `[engine]` table.
    #[serde(default)]
    pub engine: EngineSettings,
}

/// Loads and validates `<project_dir>/kiln.toml`.
///
/// Path-valued options are resolved against `project_dir`.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE_NAME);
    let content = std::fs::read_to_string(&config_path)?;
    let base = project_dir.to_string_lossy().replace('\\', "/");
    parse_config(&content, Some(&base))
}

/// Parses and validates a `kiln.toml` configuration from a string.
///
/// Path-valued options are kept exactly as written.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    parse_config(content, None)
}

/// Parses only the `[compilerOptions]` table of a configuration string.
pub fn load_options_from_str(content: &str) -> Result<CompilerOptions, ConfigError> {
    Ok(load_config_from_str(content)?.compiler_options)
}

fn parse_config(content: &str, base_directory: Option<&str>) -> Result<ProjectConfig, ConfigError> {
    let mut table: toml::Table =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    if let Some(toml::Value::Table(options)) = table.get_mut("compilerOptions") {
        for (key, value) in options.iter_mut() {
            let decl = find_declaration(key).ok_or_else(|| ConfigError::UnknownOption(key.clone()))?;
            if let (true, Some(base), toml::Value::String(path)) =
                (decl.is_file_path, base_directory, &*value)
            {
                *value = toml::Value::String(kiln_source::normalize_absolute_path(path, base));
            }
        }
    }

    let config: ProjectConfig = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;
    validate_options(&config.compiler_options)?;
    Ok(config)
}

/// Rejects option combinations no build can satisfy.
fn validate_options(options: &CompilerOptions) -> Result<(), ConfigError> {
    if options.emit_declaration_only.is_true() && !options.emit_declarations() {
        return Err(ConfigError::ValidationError(
            "option 'emitDeclarationOnly' requires 'declaration' or 'composite'".to_string(),
        ));
    }
    if options.source_map.is_true() && options.inline_source_map.is_true() {
        return Err(ConfigError::ValidationError(
            "options 'sourceMap' and 'inlineSourceMap' cannot both be enabled".to_string(),
        ));
    }
    if options.declaration_map.is_true() && !options.emit_declarations() {
        return Err(ConfigError::ValidationError(
            "option 'declarationMap' requires 'declaration' or 'composite'".to_string(),
        ));
    }
    Ok(())
}
