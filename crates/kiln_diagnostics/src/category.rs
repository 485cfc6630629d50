//! Diagnostic categories and their persisted numeric encoding.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The category of a diagnostic message.
///
/// Persisted as its numeric value (`Warning` = 0, `Error` = 1,
/// `Suggestion` = 2, `Message` = 3) so build-info files stay compact.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Category {
    /// A potential issue that doesn't prevent compilation.
    Warning,
    /// A definite problem that prevents successful compilation.
    Error,
    /// An editor suggestion.
    Suggestion,
    /// A plain informational message.
    Message,
}

impl Category {
    /// Returns the lowercase name used when rendering diagnostics to text.
    pub fn name(self) -> &'static str {
        match self {
            Category::Warning => "warning",
            Category::Error => "error",
            Category::Suggestion => "suggestion",
            Category::Message => "message",
        }
    }

    /// Returns `true` if this is [`Category::Error`].
    pub fn is_error(self) -> bool {
        self == Category::Error
    }

    /// Returns the persisted numeric value.
    pub fn as_u8(self) -> u8 {
        match self {
            Category::Warning => 0,
            Category::Error => 1,
            Category::Suggestion => 2,
            Category::Message => 3,
        }
    }

    /// Parses a persisted numeric value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Category::Warning),
            1 => Some(Category::Error),
            2 => Some(Category::Suggestion),
            3 => Some(Category::Message),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Category::from_u8(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown diagnostic category {raw}")))
    }
}
