//! Channel endpoint and per-property configuration.
//!
//! Configuration is passed in explicitly at construction; nothing here
//! reads the process environment, which keeps the engines
//! deterministic under test.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, ChannelResult};

/// Endpoint configuration for the channel-manager API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Base URL of the provider API.
    pub base_url: String,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Page size requested from paginated endpoints.
    pub page_size: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.channel.example".to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            page_size: 100,
        }
    }
}

/// Local room identity resolved from an external room id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMapping {
    /// Local room code.
    pub room_code: String,
    /// Local room display name.
    pub room_name: String,
}

/// A property as supplied by the configuration store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    /// Local property id.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Channel-manager API key; absent for misconfigured properties.
    pub api_key: Option<String>,
    /// External room id to local room identity.
    pub room_map: HashMap<String, RoomMapping>,
}

impl Property {
    /// Resolve an external room id through the room map.
    #[must_use]
    pub fn resolve_room(&self, external_room_id: &str) -> Option<&RoomMapping> {
        self.room_map.get(external_room_id)
    }

    /// The API credential, or a configuration error when missing.
    pub fn credential(&self) -> ChannelResult<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ChannelError::MissingCredential {
                property_id: self.id.clone(),
            })
    }
}

/// Source of property configuration (an external collaborator).
#[async_trait]
pub trait PropertyDirectory: Send + Sync {
    /// Look up one property by id.
    async fn property(&self, id: &str) -> ChannelResult<Option<Property>>;

    /// All active properties.
    async fn active_properties(&self) -> ChannelResult<Vec<Property>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(api_key: Option<&str>) -> Property {
        let mut room_map = HashMap::new();
        room_map.insert(
            "ext-201".to_string(),
            RoomMapping {
                room_code: "A2".to_string(),
                room_name: "Seaview Double".to_string(),
            },
        );
        Property {
            id: "villa-aurora".to_string(),
            display_name: "Villa Aurora".to_string(),
            api_key: api_key.map(String::from),
            room_map,
        }
    }

    #[test]
    fn test_resolve_room() {
        let p = property(Some("key"));
        assert_eq!(p.resolve_room("ext-201").unwrap().room_code, "A2");
        assert!(p.resolve_room("ext-999").is_none());
    }

    #[test]
    fn test_credential_missing_or_empty() {
        assert!(property(Some("key")).credential().is_ok());
        assert!(matches!(
            property(None).credential(),
            Err(ChannelError::MissingCredential { .. })
        ));
        assert!(matches!(
            property(Some("")).credential(),
            Err(ChannelError::MissingCredential { .. })
        ));
    }
}
