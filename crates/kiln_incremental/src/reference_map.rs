//! The file reference graph as two synchronized indices.

use kiln_source::SourcePath;
use std::collections::{BTreeSet, HashMap};

/// Which files each file references, and which files reference it.
///
/// The forward index maps a file to the files it depends on; the reverse
/// index answers "who references me" without a scan. Both are updated
/// together by [`set`](Self::set) and [`remove`](Self::remove). Files with
/// no references have no forward entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceMap {
    forward: HashMap<SourcePath, BTreeSet<SourcePath>>,
    reverse: HashMap<SourcePath, BTreeSet<SourcePath>>,
}

impl ReferenceMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the references of `file`. An empty set removes the entry.
    pub fn set(&mut self, file: SourcePath, references: BTreeSet<SourcePath>) {
        self.remove(&file);
        if references.is_empty() {
            return;
        }
        for reference in &references {
            self.reverse
                .entry(reference.clone())
                .or_default()
                .insert(file.clone());
        }
        self.forward.insert(file, references);
    }

    /// Removes every reference from `file`.
    pub fn remove(&mut self, file: &SourcePath) {
        let Some(old) = self.forward.remove(file) else {
            return;
        };
        for reference in old {
            if let Some(referencers) = self.reverse.get_mut(&reference) {
                referencers.remove(file);
                if referencers.is_empty() {
                    self.reverse.remove(&reference);
                }
            }
        }
    }

    /// Returns the files `file` references.
    pub fn references(&self, file: &SourcePath) -> Option<&BTreeSet<SourcePath>> {
        self.forward.get(file)
    }

    /// Returns the files that reference `file`.
    pub fn referenced_by(&self, file: &SourcePath) -> Option<&BTreeSet<SourcePath>> {
        self.reverse.get(file)
    }

    /// Iterates over files with references, in unspecified order.
    pub fn files(&self) -> impl Iterator<Item = &SourcePath> {
        self.forward.keys()
    }

    /// Returns the files with references in sorted order.
    pub fn sorted_files(&self) -> Vec<&SourcePath> {
        let mut files: Vec<_> = self.forward.keys().collect();
        files.sort();
        files
    }

    /// Returns the number of files with references.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Returns `true` if no file has references.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str) -> SourcePath {
        SourcePath::from_normalized(format!("/p/{name}"))
    }

    fn set_of(names: &[&str]) -> BTreeSet<SourcePath> {
        names.iter().map(|n| p(n)).collect()
    }

    #[test]
    fn reverse_index_follows_forward() {
        let mut map = ReferenceMap::new();
        map.set(p("a.ts"), set_of(&["b.ts", "c.ts"]));
        map.set(p("d.ts"), set_of(&["b.ts"]));

        assert_eq!(map.referenced_by(&p("b.ts")), Some(&set_of(&["a.ts", "d.ts"])));
        assert_eq!(map.referenced_by(&p("c.ts")), Some(&set_of(&["a.ts"])));
        assert_eq!(map.referenced_by(&p("a.ts")), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn replacing_references_cleans_reverse_entries() {
        let mut map = ReferenceMap::new();
        map.set(p("a.ts"), set_of(&["b.ts"]));
        map.set(p("a.ts"), set_of(&["c.ts"]));

        assert_eq!(map.referenced_by(&p("b.ts")), None);
        assert_eq!(map.referenced_by(&p("c.ts")), Some(&set_of(&["a.ts"])));
    }

    #[test]
    fn empty_set_removes_entry() {
        let mut map = ReferenceMap::new();
        map.set(p("a.ts"), set_of(&["b.ts"]));
        map.set(p("a.ts"), BTreeSet::new());

        assert!(map.is_empty());
        assert_eq!(map.references(&p("a.ts")), None);
        assert_eq!(map.referenced_by(&p("b.ts")), None);
    }

    #[test]
    fn mutual_imports() {
        let mut map = ReferenceMap::new();
        map.set(p("a.ts"), set_of(&["b.ts"]));
        map.set(p("b.ts"), set_of(&["a.ts"]));

        assert_eq!(map.referenced_by(&p("a.ts")), Some(&set_of(&["b.ts"])));
        assert_eq!(map.referenced_by(&p("b.ts")), Some(&set_of(&["a.ts"])));
        map.remove(&p("a.ts"));
        assert_eq!(map.referenced_by(&p("b.ts")), None);
        assert_eq!(map.referenced_by(&p("a.ts")), Some(&set_of(&["b.ts"])));
    }

    #[test]
    fn sorted_files_are_sorted() {
        let mut map = ReferenceMap::new();
        map.set(p("z.ts"), set_of(&["a.ts"]));
        map.set(p("m.ts"), set_of(&["a.ts"]));
        assert_eq!(map.sorted_files(), vec![&p("m.ts"), &p("z.ts")]);
    }
}
