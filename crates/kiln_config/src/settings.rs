//! Engine settings that are not compiler options.

use serde::Deserialize;

/// Knobs controlling how the incremental engine runs, as opposed to what it
/// builds. Read from the optional `[engine]` table of `kiln.toml`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields, default)]
pub struct EngineSettings {
    /// Run every parallel phase sequentially on the calling thread, even if
    /// the host program allows concurrency.
    pub single_threaded: bool,
    /// Append the hashed text to every computed hash (`<hex>-<text>`) so test
    /// baselines show what was hashed.
    pub hash_with_text: bool,
    /// Record how each file's signature was last updated.
    pub track_signature_updates: bool,
}

impl EngineSettings {
    /// Settings used by tests: hashes carry their text and signature updates
    /// are tracked.
    pub fn for_testing() -> Self {
        Self {
            single_threaded: false,
            hash_with_text: true,
            track_signature_updates: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_off() {
        let settings = EngineSettings::default();
        assert!(!settings.single_threaded);
        assert!(!settings.hash_with_text);
        assert!(!settings.track_signature_updates);
    }

    #[test]
    fn testing_settings() {
        let settings = EngineSettings::for_testing();
        assert!(settings.hash_with_text);
        assert!(settings.track_signature_updates);
    }
}
