use std::env;
use std::time::Duration;

use crate::backoff::BackoffPolicy;

/// Polling and retry settings for the reconciler and the HTTP snapshot source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub live_interval: Duration,
    pub idle_interval: Duration,
    pub backoff: BackoffPolicy,
    pub snapshot_url: Option<String>,
    pub http_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let live_interval = Duration::from_millis(
            lookup("CREASE_SYNC_LIVE_MS")
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(2_000)
                .clamp(250, 60_000),
        );
        let idle_interval = Duration::from_secs(
            lookup("CREASE_SYNC_IDLE_SECS")
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(15)
                .max(1),
        );
        let base = Duration::from_millis(
            lookup("CREASE_BACKOFF_BASE_MS")
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(500)
                .clamp(10, 60_000),
        );
        let max = Duration::from_millis(
            lookup("CREASE_BACKOFF_MAX_MS")
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(30_000)
                .max(base.as_millis() as u64),
        );
        let max_attempts = lookup("CREASE_BACKOFF_ATTEMPTS")
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(6)
            .clamp(1, 20);
        let snapshot_url = lookup("CREASE_SNAPSHOT_URL")
            .and_then(|val| if val.trim().is_empty() { None } else { Some(val) });
        let http_timeout = Duration::from_secs(
            lookup("CREASE_HTTP_TIMEOUT_SECS")
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(10)
                .clamp(1, 120),
        );

        Self {
            live_interval,
            idle_interval,
            backoff: BackoffPolicy {
                base,
                max,
                max_attempts,
            },
            snapshot_url,
            http_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let config = SyncConfig::default();
        assert_eq!(config.live_interval, Duration::from_secs(2));
        assert_eq!(config.idle_interval, Duration::from_secs(15));
        assert_eq!(config.backoff.max_attempts, 6);
        assert!(config.snapshot_url.is_none());
    }

    #[test]
    fn clamps_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CREASE_SYNC_LIVE_MS", "5"),
            ("CREASE_SYNC_IDLE_SECS", "soon"),
            ("CREASE_BACKOFF_BASE_MS", "2000"),
            ("CREASE_BACKOFF_MAX_MS", "100"),
            ("CREASE_SNAPSHOT_URL", "  "),
        ]);
        let config = SyncConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.live_interval, Duration::from_millis(250));
        assert_eq!(config.idle_interval, Duration::from_secs(15));
        assert_eq!(config.backoff.max, Duration::from_millis(2000));
        assert!(config.snapshot_url.is_none());
    }
}
