//! Client configuration, loaded from `TASKDECK_*` environment variables.

use std::time::Duration;

use url::Url;

use crate::app::{PollIntervals, ReconnectPolicy};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_WS_PATH: &str = "/ws/agent";

/// Runtime configuration for the dashboard client.
///
/// Every field has a default so the client works against a local backend
/// without any environment variables set.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// REST base URL (default: `http://localhost:8000`).
    pub base_url: Url,

    /// Push endpoint; derived from `base_url` when not set.
    pub ws_url: Url,

    pub intervals: PollIntervals,

    /// Wait between push reconnect attempts (default: 5 s).
    pub reconnect_delay: Duration,

    /// Per-request timeout; `None` leaves the transport default.
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: invalid URL '{value}': {source}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{var}: unsupported scheme in '{value}', expected {expected}")]
    UnsupportedScheme {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{var}: expected a positive number of seconds, got '{value}'")]
    InvalidSeconds { var: &'static str, value: String },
}

impl Default for ClientConfig {
    fn default() -> Self {
        let base_url = Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid");
        let ws_url = derive_ws_url(&base_url).expect("default base URL is http");
        Self {
            base_url,
            ws_url,
            intervals: PollIntervals::default(),
            reconnect_delay: Duration::from_secs(5),
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Build [`ClientConfig`] from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut config = Self::default();

        if let Some(base) = lookup("TASKDECK_BASE_URL") {
            config.set_base_url("TASKDECK_BASE_URL", &base)?;
        }
        if let Some(ws) = lookup("TASKDECK_WS_URL") {
            config.set_ws_url("TASKDECK_WS_URL", &ws)?;
        }
        config.intervals.list =
            parse_secs(&lookup, "TASKDECK_LIST_INTERVAL_SECS", defaults.intervals.list)?;
        config.intervals.search = config.intervals.list;
        config.intervals.detail =
            parse_secs(&lookup, "TASKDECK_DETAIL_INTERVAL_SECS", defaults.intervals.detail)?;
        config.intervals.stats =
            parse_secs(&lookup, "TASKDECK_STATS_INTERVAL_SECS", defaults.intervals.stats)?;
        config.reconnect_delay =
            parse_secs(&lookup, "TASKDECK_RECONNECT_DELAY_SECS", defaults.reconnect_delay)?;
        if let Some(raw) = lookup("TASKDECK_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Some(seconds("TASKDECK_REQUEST_TIMEOUT_SECS", &raw)?);
        }
        Ok(config)
    }

    /// Replaces the base URL; the push URL follows unless it was set
    /// explicitly before.
    pub fn set_base_url(&mut self, var: &'static str, raw: &str) -> Result<(), ConfigError> {
        let base = parse_url(var, raw, &["http", "https"], "http or https")?;
        let follows_base = derive_ws_url(&self.base_url).as_ref() == Some(&self.ws_url);
        if follows_base && let Some(ws) = derive_ws_url(&base) {
            self.ws_url = ws;
        }
        self.base_url = base;
        Ok(())
    }

    pub fn set_ws_url(&mut self, var: &'static str, raw: &str) -> Result<(), ConfigError> {
        self.ws_url = parse_url(var, raw, &["ws", "wss"], "ws or wss")?;
        Ok(())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::fixed(self.reconnect_delay)
    }
}

/// `http://host:port/...` -> `ws://host:port/ws/agent`.
pub fn derive_ws_url(base: &Url) -> Option<Url> {
    let scheme = match base.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return None,
    };
    let mut ws = base.clone();
    ws.set_scheme(scheme).ok()?;
    ws.set_path(DEFAULT_WS_PATH);
    ws.set_query(None);
    ws.set_fragment(None);
    Some(ws)
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_url(
    var: &'static str,
    raw: &str,
    schemes: &[&str],
    expected: &'static str,
) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl {
        var,
        value: raw.to_string(),
        source,
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::UnsupportedScheme {
            var,
            value: raw.to_string(),
            expected,
        });
    }
    Ok(url)
}

/// Positive seconds, fractions allowed. Values that round to zero or do not
/// fit a [`Duration`] are rejected.
pub fn seconds(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .filter(|duration| !duration.is_zero())
        .ok_or_else(|| ConfigError::InvalidSeconds {
            var,
            value: raw.to_string(),
        })
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    lookup(var).map_or(Ok(default), |raw| seconds(var, &raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.ws_url.as_str(), "ws://localhost:8000/ws/agent");
        assert_eq!(config.intervals.detail, Duration::from_secs(5));
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn ws_url_follows_https_base() {
        let config =
            ClientConfig::from_lookup(lookup(&[("TASKDECK_BASE_URL", "https://tasks.example/api")]))
                .unwrap();
        assert_eq!(config.ws_url.as_str(), "wss://tasks.example/ws/agent");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("TASKDECK_BASE_URL", "http://10.0.0.2:8000"),
            ("TASKDECK_WS_URL", "ws://10.0.0.3:9000/push"),
        ]))
        .unwrap();
        assert_eq!(config.ws_url.as_str(), "ws://10.0.0.3:9000/push");
    }

    #[test]
    fn intervals_and_timeout_from_environment() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("TASKDECK_LIST_INTERVAL_SECS", "2"),
            ("TASKDECK_STATS_INTERVAL_SECS", "0.5"),
            ("TASKDECK_REQUEST_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();
        assert_eq!(config.intervals.list, Duration::from_secs(2));
        assert_eq!(config.intervals.search, Duration::from_secs(2));
        assert_eq!(config.intervals.stats, Duration::from_millis(500));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(15)));
    }

    #[rstest]
    #[case("TASKDECK_BASE_URL", "not a url")]
    #[case("TASKDECK_BASE_URL", "ftp://files.example")]
    #[case("TASKDECK_WS_URL", "http://localhost:8000/ws/agent")]
    #[case("TASKDECK_DETAIL_INTERVAL_SECS", "0")]
    #[case("TASKDECK_RECONNECT_DELAY_SECS", "soon")]
    #[case("TASKDECK_REQUEST_TIMEOUT_SECS", "1e300")]
    #[case("TASKDECK_DETAIL_INTERVAL_SECS", "1e-10")]
    #[case("TASKDECK_LIST_INTERVAL_SECS", "NaN")]
    #[case("TASKDECK_STATS_INTERVAL_SECS", "-2")]
    fn invalid_values_fail_fast(#[case] key: &str, #[case] value: &str) {
        let err = ClientConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
        assert!(err.to_string().starts_with(key));
    }
}
