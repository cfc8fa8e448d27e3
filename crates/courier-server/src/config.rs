//! Server configuration.

use std::time::Duration;

use courier_settings::ServerSettings;

/// Runtime configuration for [`CourierServer`](crate::server::CourierServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Upper bound on a single outbound frame write.
    pub write_timeout: Duration,
    /// Close sessions that send nothing for this long.
    pub idle_timeout: Option<Duration>,
    /// Largest accepted inbound WebSocket message, in bytes.
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            write_timeout: Duration::from_millis(settings.write_timeout_ms),
            idle_timeout: (settings.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(settings.idle_timeout_secs)),
            max_message_bytes: settings.max_message_bytes,
        }
    }
}

impl ServerConfig {
    /// Loopback on an ephemeral port (for tests).
    pub fn ephemeral() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ..Self::default()
        }
    }
}
