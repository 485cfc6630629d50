//! Normalized file identities and the path arithmetic built on them.
//!
//! Paths are always handled in forward-slash form. A [`SourcePath`] is an
//! absolute, normalized path, lower-cased when the host file system is case
//! insensitive, so two spellings of the same file compare equal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Normalized, absolute identity of a file in a program.
///
/// Cheap to clone (reference counted) and totally ordered, which lets the
/// incremental engine sort file sets canonically before persisting them.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcePath(Arc<str>);

impl SourcePath {
    /// Resolves `file_name` against `current_directory` and normalizes it.
    pub fn new(file_name: &str, current_directory: &str, case_sensitive: bool) -> Self {
        let normalized = normalize_absolute_path(file_name, current_directory);
        if case_sensitive {
            Self(normalized.into())
        } else {
            Self(normalized.to_lowercase().into())
        }
    }

    /// Wraps an already-normalized path without further processing.
    pub fn from_normalized(path: impl Into<Arc<str>>) -> Self {
        Self(path.into())
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the directory containing this file.
    pub fn directory(&self) -> &str {
        get_directory_path(&self.0)
    }

    /// Returns `true` if the path names a declaration file (`.d.ts` and friends).
    pub fn is_declaration_file(&self) -> bool {
        is_declaration_file_name(&self.0)
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourcePath({:?})", &*self.0)
    }
}

impl AsRef<str> for SourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

const DECLARATION_EXTENSIONS: [&str; 3] = [".d.ts", ".d.mts", ".d.cts"];

/// Returns `true` if `file_name` ends in a declaration-file extension.
pub fn is_declaration_file_name(file_name: &str) -> bool {
    DECLARATION_EXTENSIONS
        .iter()
        .any(|ext| file_name.ends_with(ext))
}

/// Returns the directory portion of a normalized path, without a trailing slash.
///
/// The root directory is returned as `/`.
pub fn get_directory_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn is_rooted(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Resolves `path` against `base_directory` and removes `.`/`..` segments.
///
/// Backslashes are converted to forward slashes. Rooted paths ignore
/// `base_directory`.
pub fn normalize_absolute_path(path: &str, base_directory: &str) -> String {
    let path = path.replace('\\', "/");
    let combined = if is_rooted(&path) || base_directory.is_empty() {
        path
    } else {
        format!("{}/{}", base_directory.replace('\\', "/"), path)
    };

    let leading_slash = combined.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in combined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                // never pop a drive root
                if parts.last().is_some_and(|p| !p.ends_with(':')) {
                    parts.pop();
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if leading_slash {
        format!("/{joined}")
    } else {
        joined
    }
}

fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Computes the path of `to` relative to the directory `from_directory`.
///
/// Both arguments must be normalized absolute paths. The result uses `../`
/// segments to climb out of `from_directory` and never starts with `./`;
/// pair it with [`ensure_path_is_non_module_name`] when a leading `./` is
/// required.
pub fn get_relative_path_from_directory(
    from_directory: &str,
    to: &str,
    case_sensitive: bool,
) -> String {
    let from = components(from_directory);
    let to_parts = components(to);

    let same = |a: &str, b: &str| {
        if case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    };

    let common = from
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| same(a, b))
        .count();

    let mut result: Vec<&str> = Vec::with_capacity(from.len() - common + to_parts.len() - common);
    result.extend(std::iter::repeat("..").take(from.len() - common));
    result.extend(&to_parts[common..]);
    result.join("/")
}

/// Prefixes `./` to a relative path that would otherwise read as a bare module name.
pub fn ensure_path_is_non_module_name(path: &str) -> String {
    if path.starts_with("./") || path.starts_with("../") || is_rooted(path) || path == ".." {
        path.to_string()
    } else {
        format!("./{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_resolves_relative_names() {
        let p = SourcePath::new("src/a.ts", "/home/project", true);
        assert_eq!(p.as_str(), "/home/project/src/a.ts");
    }

    #[test]
    fn new_folds_case_when_insensitive() {
        let p = SourcePath::new("/Home/Project/A.ts", "/", false);
        assert_eq!(p.as_str(), "/home/project/a.ts");
        let q = SourcePath::new("/Home/Project/A.ts", "/", true);
        assert_eq!(q.as_str(), "/Home/Project/A.ts");
    }

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(
            normalize_absolute_path("./src/../lib/./b.ts", "/p"),
            "/p/lib/b.ts"
        );
        assert_eq!(normalize_absolute_path("/a/b/../../..", "/x"), "/");
        assert_eq!(normalize_absolute_path("c:\\src\\a.ts", "/x"), "c:/src/a.ts");
        assert_eq!(normalize_absolute_path("c:/..", "/x"), "c:");
    }

    #[test]
    fn directory_of_paths() {
        assert_eq!(get_directory_path("/p/src/a.ts"), "/p/src");
        assert_eq!(get_directory_path("/a.ts"), "/");
        assert_eq!(get_directory_path("a.ts"), "");
    }

    #[test]
    fn relative_paths() {
        assert_eq!(
            get_relative_path_from_directory("/p/out", "/p/src/a.ts", true),
            "../src/a.ts"
        );
        assert_eq!(
            get_relative_path_from_directory("/p", "/p/src/a.ts", true),
            "src/a.ts"
        );
        assert_eq!(
            get_relative_path_from_directory("/P", "/p/a.ts", false),
            "a.ts"
        );
        assert_eq!(
            get_relative_path_from_directory("/P", "/p/a.ts", true),
            "../p/a.ts"
        );
    }

    #[test]
    fn non_module_names() {
        assert_eq!(ensure_path_is_non_module_name("src/a.ts"), "./src/a.ts");
        assert_eq!(ensure_path_is_non_module_name("../a.ts"), "../a.ts");
        assert_eq!(ensure_path_is_non_module_name("/abs/a.ts"), "/abs/a.ts");
    }

    #[test]
    fn declaration_file_names() {
        assert!(is_declaration_file_name("/p/a.d.ts"));
        assert!(is_declaration_file_name("/p/a.d.mts"));
        assert!(!is_declaration_file_name("/p/a.ts"));
        assert!(SourcePath::from_normalized("/lib/lib.d.ts").is_declaration_file());
    }

    #[test]
    fn serde_is_a_plain_string() {
        let p = SourcePath::from_normalized("/p/a.ts");
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"/p/a.ts\"");
        let back: SourcePath = serde_json::from_str("\"/p/a.ts\"").unwrap();
        assert_eq!(back, p);
    }
}
