//! Runtime configuration with environment overrides.

use std::env;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the HTTP fetcher talks to the platform.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Attempts per GET before giving up.
    pub attempts: u32,
    /// Fixed wait between failed attempts.
    pub backoff: Duration,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US".to_string(),
        }
    }
}

impl FetchConfig {
    /// Defaults overridden by `YTT_RETRY_ATTEMPTS`, `YTT_RETRY_BACKOFF_MS`
    /// and `YTT_USER_AGENT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            attempts: lookup("YTT_RETRY_ATTEMPTS")
                .and_then(|s| s.parse().ok())
                .filter(|&n: &u32| n > 0)
                .unwrap_or(defaults.attempts),
            backoff: lookup("YTT_RETRY_BACKOFF_MS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
            user_agent: lookup("YTT_USER_AGENT")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.user_agent),
            accept_language: defaults.accept_language,
        }
    }
}

/// What to do when one track of a batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The first failed track aborts the whole batch.
    #[default]
    FailFast,
    /// Failed tracks are logged and skipped.
    BestEffort,
}

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` means no deadline.
    pub timeout: Option<Duration>,
    pub policy: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            policy: FailurePolicy::default(),
        }
    }
}

impl Config {
    /// Defaults overridden by `YTT_TIMEOUT_SECS` (0 disables the deadline).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let timeout = match lookup("YTT_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_TIMEOUT),
        };
        Self {
            timeout,
            policy: FailurePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn fetch_defaults() {
        let cfg = FetchConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg.attempts, 3);
        assert_eq!(cfg.backoff, Duration::from_secs(2));
        assert_eq!(cfg.accept_language, "en-US");
    }

    #[test]
    fn fetch_overrides_and_bad_values() {
        let cfg = FetchConfig::from_lookup(lookup(&[
            ("YTT_RETRY_ATTEMPTS", "5"),
            ("YTT_RETRY_BACKOFF_MS", "250"),
            ("YTT_USER_AGENT", "  "),
        ]));
        assert_eq!(cfg.attempts, 5);
        assert_eq!(cfg.backoff, Duration::from_millis(250));
        assert_eq!(cfg.user_agent, DEFAULT_USER_AGENT);

        let cfg = FetchConfig::from_lookup(lookup(&[("YTT_RETRY_ATTEMPTS", "0")]));
        assert_eq!(cfg.attempts, DEFAULT_ATTEMPTS);
    }

    #[test]
    fn timeout_zero_disables_deadline() {
        assert_eq!(Config::from_lookup(lookup(&[("YTT_TIMEOUT_SECS", "0")])).timeout, None);
        assert_eq!(
            Config::from_lookup(lookup(&[("YTT_TIMEOUT_SECS", "7")])).timeout,
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            Config::from_lookup(lookup(&[("YTT_TIMEOUT_SECS", "abc")])).timeout,
            Some(DEFAULT_TIMEOUT)
        );
    }
}
