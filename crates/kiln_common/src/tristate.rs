//! Three-valued boolean for options that may be left unset.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A boolean that can also be "not yet known" or "not specified".
///
/// Compiler options use `Unknown` for flags the user never set, and the
/// incremental snapshot uses it for `has_errors` before it has been computed.
/// Serializes as `true`, `false`, or `null`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum Tristate {
    /// Not set or not yet computed.
    #[default]
    Unknown,
    /// Explicitly false.
    False,
    /// Explicitly true.
    True,
}

impl Tristate {
    /// Returns `true` only for [`Tristate::True`].
    pub fn is_true(self) -> bool {
        self == Tristate::True
    }

    /// Returns `true` only for [`Tristate::False`].
    pub fn is_false(self) -> bool {
        self == Tristate::False
    }

    /// Returns `true` for [`Tristate::Unknown`].
    pub fn is_unknown(self) -> bool {
        self == Tristate::Unknown
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        if value {
            Tristate::True
        } else {
            Tristate::False
        }
    }
}

impl From<Option<bool>> for Tristate {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Tristate::Unknown, Tristate::from)
    }
}

impl Serialize for Tristate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tristate::Unknown => serializer.serialize_none(),
            Tristate::False => serializer.serialize_bool(false),
            Tristate::True => serializer.serialize_bool(true),
        }
    }
}

impl<'de> Deserialize<'de> for Tristate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<bool>::deserialize(deserializer)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unknown() {
        assert_eq!(Tristate::default(), Tristate::Unknown);
        assert!(Tristate::default().is_unknown());
    }

    #[test]
    fn only_true_is_true() {
        assert!(Tristate::True.is_true());
        assert!(!Tristate::False.is_true());
        assert!(!Tristate::Unknown.is_true());
    }

    #[test]
    fn from_option() {
        assert_eq!(Tristate::from(Some(true)), Tristate::True);
        assert_eq!(Tristate::from(Some(false)), Tristate::False);
        assert_eq!(Tristate::from(None), Tristate::Unknown);
    }

    #[test]
    fn serde_roundtrip() {
        for value in [Tristate::True, Tristate::False, Tristate::Unknown] {
            let json = serde_json::to_string(&value).unwrap();
            let back: Tristate = serde_json::from_str(&json).unwrap();
            assert_eq!(value, back);
        }
        assert_eq!(serde_json::to_string(&Tristate::Unknown).unwrap(), "null");
    }
}
