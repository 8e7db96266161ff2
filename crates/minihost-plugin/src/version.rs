//! VST protocol versions and the lifecycle policy each one implies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VstVersion {
    Unknown,
    V20,
    V21,
    V22,
    V23,
    V24,
}

impl VstVersion {
    /// Number reported by the plugin's `getVstVersion` opcode.
    pub fn number(self) -> i32 {
        match self {
            VstVersion::V20 => 2,
            VstVersion::V21 => 2100,
            VstVersion::V22 => 2200,
            VstVersion::V23 => 2300,
            VstVersion::V24 => 2400,
            VstVersion::Unknown => 0,
        }
    }

    pub fn from_number(number: i32) -> Self {
        match number {
            2 => VstVersion::V20,
            2100 => VstVersion::V21,
            2200 => VstVersion::V22,
            2300 => VstVersion::V23,
            2400 => VstVersion::V24,
            _ => VstVersion::Unknown,
        }
    }

    /// `None` for [`VstVersion::Unknown`]; such plugins are refused at load.
    pub fn policy(self) -> Option<VersionPolicy> {
        let policy = match self {
            VstVersion::Unknown => return None,
            VstVersion::V20 | VstVersion::V21 | VstVersion::V22 => VersionPolicy {
                needs_start_stop_process: false,
                supports_double_precision: false,
                supports_accumulating_process: true,
            },
            VstVersion::V23 => VersionPolicy {
                needs_start_stop_process: true,
                supports_double_precision: false,
                supports_accumulating_process: true,
            },
            VstVersion::V24 => VersionPolicy {
                needs_start_stop_process: true,
                supports_double_precision: true,
                supports_accumulating_process: false,
            },
        };
        Some(policy)
    }
}

impl std::fmt::Display for VstVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VstVersion::V20 => write!(f, "VST 2.0"),
            VstVersion::V21 => write!(f, "VST 2.1"),
            VstVersion::V22 => write!(f, "VST 2.2"),
            VstVersion::V23 => write!(f, "VST 2.3"),
            VstVersion::V24 => write!(f, "VST 2.4"),
            VstVersion::Unknown => write!(f, "unknown VST version"),
        }
    }
}

/// Which optional protocol steps apply to a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPolicy {
    /// `startProcess`/`stopProcess` bracket the resumed state (2.3+).
    pub needs_start_stop_process: bool,
    /// `processDoubleReplacing` exists (2.4).
    pub supports_double_precision: bool,
    /// The legacy accumulating `process` call is still allowed (deprecated in 2.4).
    pub supports_accumulating_process: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_numbers() {
        for version in [
            VstVersion::V20,
            VstVersion::V21,
            VstVersion::V22,
            VstVersion::V23,
            VstVersion::V24,
        ] {
            assert_eq!(VstVersion::from_number(version.number()), version);
        }
        assert_eq!(VstVersion::from_number(2400), VstVersion::V24);
        assert_eq!(VstVersion::from_number(1), VstVersion::Unknown);
        assert_eq!(VstVersion::from_number(2500), VstVersion::Unknown);
    }

    #[test]
    fn test_policy_table() {
        assert!(VstVersion::Unknown.policy().is_none());

        let v22 = VstVersion::V22.policy().unwrap();
        assert!(!v22.needs_start_stop_process);
        assert!(v22.supports_accumulating_process);

        let v23 = VstVersion::V23.policy().unwrap();
        assert!(v23.needs_start_stop_process);
        assert!(!v23.supports_double_precision);

        let v24 = VstVersion::V24.policy().unwrap();
        assert!(v24.needs_start_stop_process);
        assert!(v24.supports_double_precision);
        assert!(!v24.supports_accumulating_process);
    }

    #[test]
    fn test_version_ordering() {
        assert!(VstVersion::V23 >= VstVersion::V23);
        assert!(VstVersion::V24 > VstVersion::V20);
        assert!(VstVersion::Unknown < VstVersion::V20);
    }
}
