//! Character-offset ranges within source files.

use serde::{Deserialize, Serialize};

/// A `[pos, end)` range within a source file's text.
///
/// Ranges are file-relative: the owning file travels separately (on the
/// diagnostic or as the key of a per-file cache), which keeps persisted
/// diagnostics free of repeated file names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct TextRange {
    /// Offset of the start of the range (inclusive).
    pub pos: u32,
    /// Offset of the end of the range (exclusive).
    pub end: u32,
}

impl TextRange {
    /// Creates a new range.
    pub fn new(pos: u32, end: u32) -> Self {
        Self { pos, end }
    }

    /// Returns the length of this range.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.pos)
    }

    /// Returns `true` if this range has zero length.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_and_empty() {
        let r = TextRange::new(10, 20);
        assert_eq!(r.len(), 10);
        assert!(!r.is_empty());
        assert!(TextRange::new(5, 5).is_empty());
    }

    #[test]
    fn inverted_range_has_zero_len() {
        assert_eq!(TextRange::new(9, 3).len(), 0);
    }
}
