use std::time::Duration;

/// Store subtree the matcher scans for open rooms. Matches the path used by
/// existing deployments.
pub const DEFAULT_ROOMS_PATH: &str = "videochat_rooms";

/// Tuning for one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Store path holding the room list.
    pub rooms_path: String,
    /// Retry pacing for rendezvous attempts while the store is unreachable.
    pub backoff: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            rooms_path: DEFAULT_ROOMS_PATH.to_string(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Doubling retry delays, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(15),
        }
    }
}

impl BackoffConfig {
    /// Delay to use after a failed attempt that waited `current`.
    pub fn next(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}
