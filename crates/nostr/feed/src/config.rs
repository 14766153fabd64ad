//! Feed engine configuration.

use std::time::Duration;

pub const ENV_PAGE_LIMIT: &str = "NOSTR_FEED_PAGE_LIMIT";
pub const ENV_POLL_LIMIT: &str = "NOSTR_FEED_POLL_LIMIT";
pub const ENV_POLL_INTERVAL_SECS: &str = "NOSTR_FEED_POLL_INTERVAL_SECS";
pub const ENV_THREAD_LIMIT: &str = "NOSTR_FEED_THREAD_LIMIT";

/// Feed manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// `limit` sent with every backward page request.
    pub page_limit: u32,
    /// `limit` sent with every future-post poll.
    pub poll_limit: u32,
    pub poll_interval: Duration,
    /// Delay before the poller's first tick.
    pub first_poll_delay: Duration,
    pub thread_limit: u32,
    /// Splice polled posts into the timeline head instead of buffering them.
    pub add_future_posts_directly: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_limit: 40,
            poll_limit: 40,
            poll_interval: Duration::from_secs(30),
            first_poll_delay: Duration::from_secs(3),
            thread_limit: 100,
            add_future_posts_directly: true,
        }
    }
}

impl FeedConfig {
    /// Defaults overridden by any parsable `NOSTR_FEED_*` variable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            page_limit: env_parse(ENV_PAGE_LIMIT).unwrap_or(defaults.page_limit),
            poll_limit: env_parse(ENV_POLL_LIMIT).unwrap_or(defaults.poll_limit),
            poll_interval: env_parse(ENV_POLL_INTERVAL_SECS)
                .filter(|secs| *secs > 0)
                .map_or(defaults.poll_interval, Duration::from_secs),
            thread_limit: env_parse(ENV_THREAD_LIMIT).unwrap_or(defaults.thread_limit),
            ..defaults
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn with_env<T>(vars: &[(&str, Option<&str>)], test: impl FnOnce() -> T) -> T {
        let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, _)| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        for (key, value) in vars {
            match value {
                Some(value) => unsafe { std::env::set_var(key, value) },
                None => unsafe { std::env::remove_var(key) },
            }
        }

        let result = test();

        for (key, value) in previous {
            match value {
                Some(value) => unsafe { std::env::set_var(&key, value) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
        result
    }

    #[test]
    fn env_overrides_apply() {
        let config = with_env(
            &[
                (ENV_PAGE_LIMIT, Some("25")),
                (ENV_POLL_LIMIT, None),
                (ENV_POLL_INTERVAL_SECS, Some("5")),
                (ENV_THREAD_LIMIT, None),
            ],
            FeedConfig::from_env,
        );

        assert_eq!(config.page_limit, 25);
        assert_eq!(config.poll_limit, 40);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.thread_limit, 100);
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        let config = with_env(
            &[
                (ENV_PAGE_LIMIT, Some("lots")),
                (ENV_POLL_LIMIT, Some("")),
                (ENV_POLL_INTERVAL_SECS, Some("0")),
                (ENV_THREAD_LIMIT, Some("-1")),
            ],
            FeedConfig::from_env,
        );

        assert_eq!(config, FeedConfig::default());
    }
}
