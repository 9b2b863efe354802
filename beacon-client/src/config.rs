use beacon_core::IceServerConfig;
use serde::Deserialize;
use std::env;
use std::time::Duration;

pub const DEFAULT_RELAY_URL: &str = "ws://localhost:8080/ws";
pub const DEFAULT_TOPIC_PREFIX: &str = "/topic";
pub const DEFAULT_APP_PREFIX: &str = "/app";

/// Whether a responder sends local media or only receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponderMedia {
    /// Never request devices; the session is receive-only.
    #[default]
    ReceiveOnly,
    /// Request devices, continue receive-only if they are unavailable.
    PreferSend,
    /// Request devices and fail the join if they are unavailable.
    RequireSend,
}

/// Settings shared by the relay channel and the negotiation engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub relay_url: String,
    /// Prefix of destinations the broker delivers from (`/topic/signal/{room}`).
    pub topic_prefix: String,
    /// Prefix of destinations clients publish to (`/app/signal/{room}`).
    pub app_prefix: String,
    pub ice_servers: Vec<IceServerConfig>,
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    #[serde(with = "millis")]
    pub disconnect_timeout: Duration,
    pub responder_media: ResponderMedia,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_owned(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_owned(),
            app_prefix: DEFAULT_APP_PREFIX.to_owned(),
            ice_servers: vec![IceServerConfig::default()],
            connect_timeout: Duration::from_secs(10),
            disconnect_timeout: Duration::from_secs(2),
            responder_media: ResponderMedia::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `BEACON_RELAY_URL` and `TURN_URL` /
    /// `TURN_USERNAME` / `TURN_CREDENTIAL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("BEACON_RELAY_URL") {
            config.relay_url = url;
        }

        if let Ok(turn_url) = env::var("TURN_URL") {
            config.ice_servers.push(IceServerConfig {
                urls: vec![turn_url],
                username: env::var("TURN_USERNAME").ok(),
                credential: env::var("TURN_CREDENTIAL").ok(),
            });
        }

        config
    }

    pub fn subscribe_destination(&self, topic: &str) -> String {
        join_destination(&self.topic_prefix, topic)
    }

    pub fn send_destination(&self, address: &str) -> String {
        join_destination(&self.app_prefix, address)
    }
}

fn join_destination(prefix: &str, path: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
