use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use piramide_client::resolver::{DEFAULT_API_PREFIX, DEFAULT_DESCRIPTOR_URL};
use piramide_client::{ClientConfig, ResolverConfig, RetryPolicy};
use piramide_store::DEFAULT_LEDGER_CAPACITY;
use piramide_sync::SyncConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub descriptor_url: String,
    pub api_prefix: String,
    pub db_path: PathBuf,
    pub request_timeout: Duration,
    pub resolve_retry: Duration,
    /// 0 keeps polling the descriptor forever.
    pub resolve_attempts: u32,
    pub push: bool,
    pub ledger_capacity: usize,
    pub sync: SyncConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let request_timeout = Duration::from_secs(parse(&lookup, "PIRAMIDE_REQUEST_TIMEOUT_SECS", 10)?);
        let sync = SyncConfig {
            feed_interval: interval(&lookup, "PIRAMIDE_FEED_INTERVAL_SECS", 15)?,
            status_interval: interval(&lookup, "PIRAMIDE_STATUS_INTERVAL_SECS", 5)?,
            client: ClientConfig { request_timeout },
            reset_class_after_post: flag(&lookup, "PIRAMIDE_RESET_CLASS_AFTER_POST", false)?,
            ..Default::default()
        };

        Ok(Self {
            descriptor_url: var("PIRAMIDE_DESCRIPTOR_URL", DEFAULT_DESCRIPTOR_URL),
            api_prefix: var("PIRAMIDE_API_PREFIX", DEFAULT_API_PREFIX),
            db_path: PathBuf::from(var("PIRAMIDE_DB_PATH", "piramide.db")),
            request_timeout,
            resolve_retry: Duration::from_secs(parse(&lookup, "PIRAMIDE_RESOLVE_RETRY_SECS", 5)?),
            resolve_attempts: parse(&lookup, "PIRAMIDE_RESOLVE_ATTEMPTS", 0)?,
            push: flag(&lookup, "PIRAMIDE_PUSH", true)?,
            ledger_capacity: parse(&lookup, "PIRAMIDE_LEDGER_CAPACITY", DEFAULT_LEDGER_CAPACITY)?,
            sync,
        })
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            descriptor_url: self.descriptor_url.clone(),
            api_prefix: self.api_prefix.clone(),
            request_timeout: self.request_timeout,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self.resolve_attempts {
            0 => RetryPolicy::Every(self.resolve_retry),
            1 => RetryPolicy::Once,
            attempts => RetryPolicy::Bounded {
                attempts,
                delay: self.resolve_retry,
            },
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid {}='{}'", name, raw)),
    }
}

fn interval(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> Result<Duration> {
    let secs = parse(lookup, name, default)?;
    if secs == 0 {
        bail!("invalid {}='0', must be at least 1 second", name);
    }
    Ok(Duration::from_secs(secs))
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> Result<bool> {
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("invalid {}='{}', expected true or false", name, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.descriptor_url, DEFAULT_DESCRIPTOR_URL);
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.db_path, PathBuf::from("piramide.db"));
        assert_eq!(config.sync.feed_interval, Duration::from_secs(15));
        assert_eq!(config.sync.status_interval, Duration::from_secs(5));
        assert_eq!(config.sync.client.request_timeout, Duration::from_secs(10));
        assert!(config.push);
        assert!(!config.sync.reset_class_after_post);
        assert_eq!(config.ledger_capacity, 500);
        assert_eq!(config.retry_policy(), RetryPolicy::Every(Duration::from_secs(5)));
    }

    #[test]
    fn overrides() {
        let config = config_from(&[
            ("PIRAMIDE_API_PREFIX", ""),
            ("PIRAMIDE_PUSH", "off"),
            ("PIRAMIDE_RESOLVE_ATTEMPTS", "3"),
            ("PIRAMIDE_RESOLVE_RETRY_SECS", "2"),
            ("PIRAMIDE_RESET_CLASS_AFTER_POST", "1"),
        ])
        .unwrap();
        assert_eq!(config.api_prefix, "");
        assert!(!config.push);
        assert!(config.sync.reset_class_after_post);
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::Bounded {
                attempts: 3,
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(config_from(&[("PIRAMIDE_RESOLVE_ATTEMPTS", "1")]).unwrap().retry_policy(), RetryPolicy::Once);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = config_from(&[("PIRAMIDE_FEED_INTERVAL_SECS", "soon")]).unwrap_err();
        assert!(format!("{:#}", err).contains("PIRAMIDE_FEED_INTERVAL_SECS"));
        assert!(config_from(&[("PIRAMIDE_PUSH", "maybe")]).is_err());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let err = config_from(&[("PIRAMIDE_FEED_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("PIRAMIDE_FEED_INTERVAL_SECS"));
        let err = config_from(&[("PIRAMIDE_STATUS_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("PIRAMIDE_STATUS_INTERVAL_SECS"));
    }
}
