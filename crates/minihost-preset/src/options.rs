//! Persistence options.

use serde::{Deserialize, Serialize};

/// Options shared by [`crate::PresetCodec`] and [`crate::BankCodec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistOptions {
    /// Load files written by a newer plugin revision.
    ///
    /// Some plugins store a bogus version number in their files.
    #[serde(default)]
    pub skip_version_check: bool,
}

impl PersistOptions {
    /// Options that skip the plugin revision check.
    pub fn lenient() -> Self {
        Self {
            skip_version_check: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_strict() {
        assert!(!PersistOptions::default().skip_version_check);
        assert!(PersistOptions::lenient().skip_version_check);
    }

    #[test]
    fn test_serde_default() {
        let options: PersistOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, PersistOptions::default());

        let options: PersistOptions =
            serde_json::from_str(r#"{"skip_version_check": true}"#).unwrap();
        assert!(options.skip_version_check);
    }
}
