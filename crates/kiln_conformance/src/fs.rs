//! An in-memory file system that records every write.

use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;

use kiln_incremental::FileSystem;

/// Files kept in memory, plus an ordered log of writes.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<String, String>>,
    writes: Mutex<Vec<String>>,
    read_only: Mutex<Vec<String>>,
}

impl MemoryFs {
    /// Creates an empty file system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the content of `path`, if it exists.
    pub fn get(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Returns `true` if `path` exists.
    pub fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    /// Stores `content` at `path` without logging a write.
    pub fn put(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }

    /// Removes `path`.
    pub fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    /// Makes writes to `path` fail.
    pub fn deny_writes_to(&self, path: &str) {
        self.read_only.lock().unwrap().push(path.to_string());
    }

    /// Returns the paths written since the last call, sorted.
    pub fn take_writes(&self) -> Vec<String> {
        let mut writes = std::mem::take(&mut *self.writes.lock().unwrap());
        writes.sort();
        writes
    }
}

impl FileSystem for MemoryFs {
    fn read_file(&self, path: &str) -> io::Result<String> {
        self.get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path} not found")))
    }

    fn write_file(&self, path: &str, content: &str) -> io::Result<()> {
        if self.read_only.lock().unwrap().iter().any(|denied| denied == path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"));
        }
        self.put(path, content);
        self.writes.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_logged_and_readable() {
        let fs = MemoryFs::new();
        fs.write_file("/p/b.js", "b").unwrap();
        fs.write_file("/p/a.js", "a").unwrap();
        assert_eq!(fs.read_file("/p/a.js").unwrap(), "a");
        assert_eq!(fs.take_writes(), vec!["/p/a.js".to_string(), "/p/b.js".to_string()]);
        assert!(fs.take_writes().is_empty());
    }

    #[test]
    fn denied_writes_fail() {
        let fs = MemoryFs::new();
        fs.deny_writes_to("/p/out.json");
        let err = fs.write_file("/p/out.json", "{}").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(!fs.exists("/p/out.json"));
        assert_eq!(fs.read_file("/p/missing").unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
