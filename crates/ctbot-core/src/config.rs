use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, Result};

pub const DEFAULT_API_HOST: &str = "api.telegram.org";

/// Typed configuration for the bot client.
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials / endpoint
    pub telegram_bot_token: String,
    pub api_host: String,
    pub api_base_url: Option<String>,

    // Polling
    pub poll_min_interval: Duration,
    pub long_poll_timeout: Duration,

    // Response draining
    pub drain_max_attempts: Option<u32>,
    pub drain_backoff: Duration,

    // Transport / encoding limits
    pub http_timeout: Duration,
    pub max_payload_bytes: usize,
}

impl Config {
    /// Defaults for everything except the token. Does not read the environment.
    pub fn new(telegram_bot_token: impl Into<String>) -> Self {
        Self {
            telegram_bot_token: telegram_bot_token.into(),
            api_host: DEFAULT_API_HOST.to_string(),
            api_base_url: None,
            // Telegram accepts getUpdates roughly every 3 seconds.
            poll_min_interval: Duration::from_millis(3000),
            long_poll_timeout: Duration::ZERO,
            drain_max_attempts: Some(1000),
            drain_backoff: Duration::from_millis(10),
            http_timeout: Duration::from_secs(60),
            max_payload_bytes: 64 * 1024,
        }
    }

    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let mut cfg = Self::new(telegram_bot_token.trim());

        if let Some(host) = env_str("TELEGRAM_API_HOST").and_then(non_empty) {
            cfg.api_host = host;
        }
        cfg.api_base_url = env_str("TELEGRAM_API_BASE_URL").and_then(non_empty);

        if let Some(ms) = env_u64("CTBOT_POLL_INTERVAL_MS")? {
            cfg.poll_min_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("CTBOT_LONG_POLL_TIMEOUT_SECS")? {
            cfg.long_poll_timeout = Duration::from_secs(secs);
        }

        // 0 means "keep draining until the transport answers or drops".
        if let Some(n) = env_u32("CTBOT_DRAIN_MAX_ATTEMPTS")? {
            cfg.drain_max_attempts = if n == 0 { None } else { Some(n) };
        }
        if let Some(ms) = env_u64("CTBOT_DRAIN_BACKOFF_MS")? {
            cfg.drain_backoff = Duration::from_millis(ms);
        }

        if let Some(secs) = env_u64("CTBOT_HTTP_TIMEOUT_SECS")? {
            cfg.http_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_usize("CTBOT_MAX_PAYLOAD_BYTES")? {
            cfg.max_payload_bytes = n;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that can't work together.
    pub fn validate(&self) -> Result<()> {
        if !self.long_poll_timeout.is_zero() && self.long_poll_timeout >= self.http_timeout {
            return Err(Error::Config(format!(
                "CTBOT_LONG_POLL_TIMEOUT_SECS ({}s) must be below CTBOT_HTTP_TIMEOUT_SECS ({}s)",
                self.long_poll_timeout.as_secs(),
                self.http_timeout.as_secs()
            )));
        }
        Ok(())
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    let Some(raw) = env_str(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    env_parsed(key)
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    env_parsed(key)
}

fn env_usize(key: &str) -> Result<Option<usize>> {
    env_parsed(key)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_documented_defaults() {
        let cfg = Config::new("T1");
        assert_eq!(cfg.telegram_bot_token, "T1");
        assert_eq!(cfg.api_host, "api.telegram.org");
        assert_eq!(cfg.poll_min_interval, Duration::from_millis(3000));
        assert_eq!(cfg.long_poll_timeout, Duration::ZERO);
        assert_eq!(cfg.drain_max_attempts, Some(1000));
        assert_eq!(cfg.max_payload_bytes, 65536);
        assert!(cfg.api_base_url.is_none());
    }

    #[test]
    fn long_poll_must_fit_inside_http_timeout() {
        let mut cfg = Config::new("T1");
        assert!(cfg.validate().is_ok());

        cfg.long_poll_timeout = Duration::from_secs(60);
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("CTBOT_LONG_POLL_TIMEOUT_SECS")));

        cfg.long_poll_timeout = Duration::from_secs(50);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_parsed_rejects_garbage() {
        env::set_var("CTBOT_TEST_GARBAGE_U64", "soon");
        let err = env_u64("CTBOT_TEST_GARBAGE_U64").unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("CTBOT_TEST_GARBAGE_U64")));
        env::remove_var("CTBOT_TEST_GARBAGE_U64");
    }

    #[test]
    fn env_parsed_treats_blank_as_unset() {
        env::set_var("CTBOT_TEST_BLANK_U32", "  ");
        assert_eq!(env_u32("CTBOT_TEST_BLANK_U32").unwrap(), None);
        env::remove_var("CTBOT_TEST_BLANK_U32");
    }
}
