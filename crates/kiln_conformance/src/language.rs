//! A line-oriented toy language with just enough structure to exercise the
//! incremental engine.
//!
//! Every non-blank line is one statement:
//!
//! | Statement                         | Meaning                                        |
//! |-----------------------------------|------------------------------------------------|
//! | `import "./b"`                    | imports a module                               |
//! | `export x: number = 1`            | exported constant (initializer optional)       |
//! | `export const enum E`             | exported const enum                            |
//! | `export { E } from "./b"`         | re-export of another module's symbol           |
//! | `let x = 1`                       | local constant, JavaScript only                |
//! | `global x: number`                | global variable declaration                    |
//! | `declare global x: number`        | global augmentation from inside a module       |
//! | `declare module "name"`           | ambient module declaration                     |
//! | `augment "./b"`                   | augmentation of another module                 |
//! | `/// <reference path="./g.ts" />` | triple-slash file reference                    |
//! | `/// <reference types="node" />`  | type-reference directive                       |
//! | `use x`                           | reference to a name, checked semantically      |
//! | `error message`                   | semantic error                                 |
//! | `emitcheck message`               | semantic error dropped under `noEmit`          |
//! | `dtserror message`                | declaration emit error                         |
//! | `syntax message`                  | syntax error                                   |
//! | `// text`                         | comment                                        |

use kiln_source::TextRange;

/// One parsed statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    /// `import "<specifier>"`
    Import {
        /// Module specifier.
        specifier: String,
    },
    /// `export <name>: <type> = <init>`
    Export {
        /// Exported name.
        name: String,
        /// Declared type.
        ty: String,
        /// Initializer, if written.
        init: Option<String>,
    },
    /// `export const enum <name>`
    ExportConstEnum {
        /// Enum name.
        name: String,
    },
    /// `export { <name> } from "<specifier>"`
    ReExport {
        /// Re-exported name.
        name: String,
        /// Module the name comes from.
        specifier: String,
    },
    /// `let <name> = <init>`
    Let {
        /// Local name.
        name: String,
        /// Initializer.
        init: String,
    },
    /// `global <name>: <type>`
    Global {
        /// Global name.
        name: String,
        /// Declared type.
        ty: String,
    },
    /// `declare global <name>: <type>`
    DeclareGlobal {
        /// Global name.
        name: String,
        /// Declared type.
        ty: String,
    },
    /// `declare module "<name>"`
    AmbientModule {
        /// Declared module name.
        name: String,
    },
    /// `augment "<specifier>"`
    Augment {
        /// Augmented module.
        specifier: String,
    },
    /// `/// <reference path="<path>" />`
    Reference {
        /// Referenced file name as written.
        path: String,
    },
    /// `/// <reference types="<name>" />`
    TypesReference {
        /// Type package name.
        name: String,
    },
    /// `use <name>`
    Use {
        /// Referenced name.
        name: String,
    },
    /// `error <message>`
    Error {
        /// Message text.
        message: String,
    },
    /// `emitcheck <message>`
    EmitCheck {
        /// Message text.
        message: String,
    },
    /// `dtserror <message>`
    DtsError {
        /// Message text.
        message: String,
    },
    /// `syntax <message>`
    Syntax {
        /// Message text.
        message: String,
    },
    /// A line that is not a statement.
    Invalid,
}

/// A statement and where it appears.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    /// Range of the line, without the line break.
    pub range: TextRange,
    /// The parsed statement.
    pub statement: Statement,
}

/// Parses `text` into statements, skipping blank lines and comments.
pub fn parse(text: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut offset = 0u32;
    for raw in text.split_inclusive('\n') {
        let start = offset;
        offset += raw.len() as u32;
        let content = raw.trim_end_matches(['\n', '\r']);
        let trimmed = content.trim();
        if trimmed.is_empty() || (trimmed.starts_with("//") && !trimmed.starts_with("///")) {
            continue;
        }
        lines.push(Line {
            range: TextRange::new(start, start + content.len() as u32),
            statement: parse_statement(trimmed),
        });
    }
    lines
}

fn quoted(text: &str) -> Option<&str> {
    let text = text.trim();
    text.strip_prefix('"')?.strip_suffix('"')
}

fn attribute<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let rest = text
        .strip_prefix("/// <reference ")?
        .strip_suffix("/>")?
        .trim()
        .strip_prefix(name)?
        .strip_prefix('=')?;
    quoted(rest)
}

fn name_and_type(text: &str) -> Option<(String, String)> {
    let (name, ty) = text.split_once(':')?;
    let (name, ty) = (name.trim(), ty.trim());
    if name.is_empty() || ty.is_empty() {
        return None;
    }
    Some((name.to_string(), ty.to_string()))
}

fn parse_statement(line: &str) -> Statement {
    let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let message = || rest.to_string();
    let parsed = match keyword {
        "import" => quoted(rest).map(|specifier| Statement::Import { specifier: specifier.to_string() }),
        "export" => parse_export(rest),
        "let" => rest.split_once('=').map(|(name, init)| Statement::Let {
            name: name.trim().to_string(),
            init: init.trim().to_string(),
        }),
        "global" => name_and_type(rest).map(|(name, ty)| Statement::Global { name, ty }),
        "declare" => parse_declare(rest),
        "augment" => quoted(rest).map(|specifier| Statement::Augment { specifier: specifier.to_string() }),
        "use" if !rest.is_empty() => Some(Statement::Use { name: message() }),
        "error" => Some(Statement::Error { message: message() }),
        "emitcheck" => Some(Statement::EmitCheck { message: message() }),
        "dtserror" => Some(Statement::DtsError { message: message() }),
        "syntax" => Some(Statement::Syntax { message: message() }),
        "///" => attribute(line, "path")
            .map(|path| Statement::Reference { path: path.to_string() })
            .or_else(|| {
                attribute(line, "types").map(|name| Statement::TypesReference { name: name.to_string() })
            }),
        _ => None,
    };
    parsed.unwrap_or(Statement::Invalid)
}

fn parse_export(rest: &str) -> Option<Statement> {
    if let Some(name) = rest.strip_prefix("const enum ") {
        return Some(Statement::ExportConstEnum {
            name: name.trim().to_string(),
        });
    }
    if let Some(braced) = rest.strip_prefix('{') {
        let (name, from) = braced.split_once('}')?;
        let specifier = quoted(from.trim().strip_prefix("from")?)?;
        return Some(Statement::ReExport {
            name: name.trim().to_string(),
            specifier: specifier.to_string(),
        });
    }
    let (declaration, init) = match rest.split_once('=') {
        Some((declaration, init)) => (declaration, Some(init.trim().to_string())),
        None => (rest, None),
    };
    let (name, ty) = name_and_type(declaration)?;
    Some(Statement::Export { name, ty, init })
}

fn parse_declare(rest: &str) -> Option<Statement> {
    if let Some(global) = rest.strip_prefix("global ") {
        let (name, ty) = name_and_type(global)?;
        return Some(Statement::DeclareGlobal { name, ty });
    }
    let name = quoted(rest.strip_prefix("module ")?)?;
    Some(Statement::AmbientModule {
        name: name.to_string(),
    })
}

impl Statement {
    /// The declaration-file text this statement contributes, if any.
    pub fn declaration_text(&self) -> Option<String> {
        match self {
            Statement::Import { specifier } => Some(format!("import \"{specifier}\";")),
            Statement::Export { name, ty, .. } => Some(format!("export declare const {name}: {ty};")),
            Statement::ExportConstEnum { name } => Some(format!("export declare const enum {name} {{}}")),
            Statement::ReExport { name, specifier } => Some(format!("export {{ {name} }} from \"{specifier}\";")),
            Statement::Global { name, ty } => Some(format!("declare var {name}: {ty};")),
            Statement::DeclareGlobal { name, ty } => {
                Some(format!("declare global {{ var {name}: {ty}; }}"))
            }
            Statement::AmbientModule { name } => Some(format!("declare module \"{name}\" {{}}")),
            Statement::Augment { specifier } => Some(format!("declare module \"{specifier}\" {{}}")),
            Statement::Reference { path } => Some(format!("/// <reference path=\"{path}\" />")),
            Statement::TypesReference { name } => Some(format!("/// <reference types=\"{name}\" />")),
            _ => None,
        }
    }

    /// The JavaScript text this statement contributes, if any.
    pub fn javascript_text(&self) -> Option<String> {
        match self {
            Statement::Import { specifier } => Some(format!("require(\"{specifier}\");")),
            Statement::Export { name, init, .. } => Some(format!(
                "exports.{name} = {};",
                init.as_deref().unwrap_or("undefined")
            )),
            Statement::ReExport { name, specifier } => {
                Some(format!("exports.{name} = require(\"{specifier}\").{name};"))
            }
            Statement::Let { name, init } => Some(format!("const {name} = {init};")),
            Statement::Global { name, .. } => Some(format!("var {name};")),
            Statement::Use { name } => Some(format!("{name};")),
            _ => None,
        }
    }

    /// Whether the statement makes its file a module.
    pub fn is_module_syntax(&self) -> bool {
        matches!(
            self,
            Statement::Import { .. }
                | Statement::Export { .. }
                | Statement::ExportConstEnum { .. }
                | Statement::ReExport { .. }
                | Statement::DeclareGlobal { .. }
                | Statement::Augment { .. }
        )
    }

    /// Whether the statement counts as a top-level statement other than an
    /// ambient module declaration.
    pub fn is_non_ambient_module_statement(&self) -> bool {
        !matches!(
            self,
            Statement::AmbientModule { .. } | Statement::Reference { .. } | Statement::TypesReference { .. }
        )
    }

    /// The name this statement declares in its own file, if any.
    pub fn declared_name(&self) -> Option<&str> {
        match self {
            Statement::Export { name, .. }
            | Statement::ExportConstEnum { name }
            | Statement::ReExport { name, .. }
            | Statement::Let { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The global name this statement declares, if any.
    pub fn global_name(&self) -> Option<&str> {
        match self {
            Statement::Global { name, .. } | Statement::DeclareGlobal { name, .. } => Some(name),
            _ => None,
        }
    }
}
