//! Engine configuration: response windows, dispatch bounds, store retry
//! policy. Defaults can be overridden through `CALLTREE_*` environment
//! variables.

use std::time::Duration;

/// Tunables for the escalation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Response window used when a tree does not carry its own.
    pub default_response_window: Duration,
    /// Upper bound on a single dispatch attempt to the notifier.
    pub dispatch_timeout: Duration,
    /// Dispatch retries after the first attempt before a log is marked
    /// Failed.
    pub dispatch_retries: u32,
    /// Pause between dispatch attempts.
    pub dispatch_backoff: Duration,
    /// Store retries after the first attempt before an operation fails
    /// loudly.
    pub persist_retries: u32,
    /// Pause between store attempts.
    pub persist_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_response_window: Duration::from_secs(300),
            dispatch_timeout: Duration::from_secs(10),
            dispatch_retries: 2,
            dispatch_backoff: Duration::from_millis(500),
            persist_retries: 2,
            persist_backoff: Duration::from_millis(200),
        }
    }
}

impl EngineConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_response_window: env_secs(
                "CALLTREE_RESPONSE_WINDOW_SECS",
                defaults.default_response_window,
            ),
            dispatch_timeout: env_secs("CALLTREE_DISPATCH_TIMEOUT_SECS", defaults.dispatch_timeout),
            dispatch_retries: env_u32("CALLTREE_DISPATCH_RETRIES", defaults.dispatch_retries),
            dispatch_backoff: env_millis(
                "CALLTREE_DISPATCH_BACKOFF_MS",
                defaults.dispatch_backoff,
            ),
            persist_retries: env_u32("CALLTREE_PERSIST_RETRIES", defaults.persist_retries),
            persist_backoff: env_millis("CALLTREE_PERSIST_BACKOFF_MS", defaults.persist_backoff),
        }
    }
}

fn env_u32(var: &str, default: u32) -> u32 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_millis(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_response_window, Duration::from_secs(300));
        assert_eq!(config.dispatch_retries, 2);
    }

    #[test]
    fn test_env_override_and_fallback() {
        std::env::set_var("CALLTREE_TEST_SECS", "42");
        assert_eq!(
            env_secs("CALLTREE_TEST_SECS", Duration::from_secs(1)),
            Duration::from_secs(42)
        );
        std::env::remove_var("CALLTREE_TEST_SECS");

        std::env::set_var("CALLTREE_TEST_BAD", "not-a-number");
        assert_eq!(env_u32("CALLTREE_TEST_BAD", 7), 7);
        std::env::remove_var("CALLTREE_TEST_BAD");

        assert_eq!(env_u32("CALLTREE_TEST_UNSET", 3), 3);
    }
}
