//! Hub configuration.

use serde::{Deserialize, Serialize};

/// Which rooms hear that an identity came online or went offline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresencePolicy {
    /// Every live room, whether or not the identity is in it.
    #[default]
    AllRooms,
    /// Only rooms the identity's connections are in. For the offline
    /// transition, the room its last connection was in before leaving.
    SharedRooms,
}

/// Configuration for the broadcast hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub presence_policy: PresencePolicy,

    /// Capacity of the hub's command channel. Connection tasks wait when
    /// it is full.
    pub channel_size: usize,

    /// Capacity of each connection's outbound queue. Frames for a
    /// connection whose queue is full are dropped.
    pub peer_queue_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            presence_policy: PresencePolicy::AllRooms,
            channel_size: 256,
            peer_queue_size: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_policy_kebab_case_names() {
        let policy: PresencePolicy =
            serde_json::from_str("\"shared-rooms\"").unwrap();
        assert_eq!(policy, PresencePolicy::SharedRooms);
        assert_eq!(
            serde_json::to_string(&PresencePolicy::AllRooms).unwrap(),
            "\"all-rooms\""
        );
    }

    #[test]
    fn test_hub_config_missing_fields_use_defaults() {
        let config: HubConfig =
            serde_json::from_str(r#"{"channel_size": 8}"#).unwrap();
        assert_eq!(config.channel_size, 8);
        assert_eq!(config.peer_queue_size, 256);
        assert_eq!(config.presence_policy, PresencePolicy::AllRooms);
    }
}
