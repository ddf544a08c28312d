use serde::{Deserialize, Serialize};
use wamd_core::app_state::MacVerification;

/// Retries per collection before a resync gives up on it.
pub const DEFAULT_MAX_SYNC_ATTEMPTS: u32 = 2;

/// App-state sync configuration
///
/// Every field has a default, so a partial (or empty) config deserializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Retries per failing collection within one resync, after the first try
    pub max_sync_attempts: u32,
    /// MAC checks applied to fetched patches and snapshots
    pub mac_verification: MacVerification,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_sync_attempts: DEFAULT_MAX_SYNC_ATTEMPTS,
            mac_verification: MacVerification::ALL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.max_sync_attempts, 2);
    }

    #[test]
    fn partial_mac_verification_keeps_other_flag() {
        let json = r#"{"max_sync_attempts": 5, "mac_verification": {"snapshot": false}}"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_sync_attempts, 5);
        assert_eq!(config.mac_verification, MacVerification { patch: true, snapshot: false });
    }
}
