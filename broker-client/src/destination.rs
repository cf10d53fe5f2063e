//! Destination address builder

use crate::config::BrokerConfig;

/// Builds broker addresses from the configured prefixes
///
/// Application destinations (`/app/...`) are handled by server-side
/// controllers; broadcast destinations (`/topic/...`) fan out to every
/// subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    outbound_prefix: String,
    broadcast_prefix: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self::from_config(&BrokerConfig::default())
    }
}

impl Destinations {
    pub fn new(outbound_prefix: impl Into<String>, broadcast_prefix: impl Into<String>) -> Self {
        Self {
            outbound_prefix: outbound_prefix.into(),
            broadcast_prefix: broadcast_prefix.into(),
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(config.outbound_prefix.clone(), config.broadcast_prefix.clone())
    }

    /// `<outbound-prefix>/<resource>`
    pub fn outbound(&self, resource: &str) -> String {
        join(&self.outbound_prefix, resource)
    }

    /// `<broadcast-prefix>/<resource>`
    pub fn broadcast(&self, resource: &str) -> String {
        join(&self.broadcast_prefix, resource)
    }

    /// Room broadcast topic, e.g. `/topic/rooms/42`
    pub fn room_topic(&self, room_id: impl std::fmt::Display) -> String {
        self.broadcast(&format!("rooms/{room_id}"))
    }

    /// Room chat publish address, e.g. `/app/rooms/42/chat`
    pub fn room_chat(&self, room_id: impl std::fmt::Display) -> String {
        self.outbound(&format!("rooms/{room_id}/chat"))
    }
}

fn join(prefix: &str, resource: &str) -> String {
    format!("{}/{}", prefix, resource.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_destinations() {
        let destinations = Destinations::default();
        assert_eq!(destinations.room_topic(42), "/topic/rooms/42");
        assert_eq!(destinations.room_chat(42), "/app/rooms/42/chat");
    }

    #[test]
    fn test_leading_slash_is_not_doubled() {
        let destinations = Destinations::new("/app", "/queue");
        assert_eq!(destinations.outbound("/presence"), "/app/presence");
        assert_eq!(destinations.broadcast("presence"), "/queue/presence");
    }
}
