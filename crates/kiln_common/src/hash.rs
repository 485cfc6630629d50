//! XXH3 hashing of source texts and declaration outputs.

use std::fmt;

/// The 128-bit XXH3 digest of a text.
///
/// Two texts with equal hashes are treated as the same file version, or as
/// the same declaration shape. Build info stores the 32-digit lowercase hex
/// rendering produced by [`Display`](fmt::Display).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(u128);

impl ContentHash {
    /// Hashes `text`.
    pub fn of(text: &str) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(text.as_bytes()))
    }

    /// The persisted hex form.
    pub fn to_hex(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_texts_hash_equal() {
        let dts = "export declare const a: number;\n";
        assert_eq!(ContentHash::of(dts), ContentHash::of(&dts.to_string()));
        assert_ne!(
            ContentHash::of("export declare const a: number;\n"),
            ContentHash::of("export declare const a: string;\n")
        );
    }

    #[test]
    fn hex_form_is_fixed_width() {
        for text in ["", "a", "declare var console: Console;\n"] {
            let hex = ContentHash::of(text).to_hex();
            assert_eq!(hex.len(), 32, "{text:?}");
            assert!(hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        }
    }
}
