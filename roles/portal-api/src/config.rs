use serde::Deserialize;
use std::{env, fs};

use crate::poller::PollerSettings;

const DEFAULT_CONFIG_PATH: &str = "config/portal-api.config.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_address: String,
    pub staleness_threshold_secs: u64,
    pub poller: PollerSettings,
    pub redis_url: String,
    /// Pool configuration tables, served verbatim by the admin `pools` method
    pub pool_configs: serde_json::Value,
    pub log_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PortalConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    upstream: UpstreamConfig,
    #[serde(default)]
    history: HistoryConfig,
    #[serde(default)]
    redis: RedisConfig,
    #[serde(default)]
    pools: toml::Table,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ServerConfig {
    listen_address: Option<String>,
    staleness_threshold_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: Some("0.0.0.0:8080".to_string()),
            staleness_threshold_secs: Some(60),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct UpstreamConfig {
    stats_url: Option<String>,
    poll_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    pool_idle_timeout_secs: Option<u64>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            stats_url: Some("http://127.0.0.1:9084/api/stats".to_string()),
            poll_interval_secs: Some(10),
            request_timeout_secs: Some(60),
            pool_idle_timeout_secs: Some(300),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct HistoryConfig {
    max_snapshots: Option<usize>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_snapshots: Some(180),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RedisConfig {
    url: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: Some("redis://127.0.0.1/".to_string()),
        }
    }
}

fn flag_value(args: &[String], names: &[&str]) -> Option<String> {
    args.iter()
        .position(|arg| names.contains(&arg.as_str()))
        .and_then(|i| args.get(i + 1))
        .cloned()
}

impl Config {
    pub fn from_args() -> Result<Self, Box<dyn std::error::Error>> {
        let args: Vec<String> = env::args().collect();
        Self::from_arg_list(&args)
    }

    pub fn from_arg_list(args: &[String]) -> Result<Self, Box<dyn std::error::Error>> {
        let log_file = flag_value(args, &["--log-file", "-f"]);

        // A missing config file means all defaults
        let config_path =
            flag_value(args, &["--config", "-c"]).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let config_str = fs::read_to_string(&config_path).unwrap_or_default();
        let portal_config: PortalConfig = if config_str.is_empty() {
            PortalConfig::default()
        } else {
            toml::from_str(&config_str)?
        };

        let listen_address = flag_value(args, &["--listen-address", "-l"])
            .or(portal_config.server.listen_address)
            .ok_or("Missing required config: server.listen_address")?;

        let stats_url = flag_value(args, &["--stats-url", "-s"])
            .or(portal_config.upstream.stats_url)
            .ok_or("Missing required config: upstream.stats_url")?;

        let redis_url = flag_value(args, &["--redis-url", "-r"])
            .or(portal_config.redis.url)
            .ok_or("Missing required config: redis.url")?;

        let poll_interval_secs = portal_config.upstream.poll_interval_secs.unwrap_or(10);
        if poll_interval_secs == 0 {
            return Err("Invalid config: upstream.poll_interval_secs must be greater than zero".into());
        }
        let request_timeout_secs = portal_config.upstream.request_timeout_secs.unwrap_or(60);
        if request_timeout_secs == 0 {
            return Err("Invalid config: upstream.request_timeout_secs must be greater than zero".into());
        }

        let pool_configs = serde_json::to_value(&portal_config.pools)?;

        Ok(Config {
            listen_address,
            staleness_threshold_secs: portal_config.server.staleness_threshold_secs.unwrap_or(60),
            poller: PollerSettings {
                stats_url,
                poll_interval_secs,
                request_timeout_secs,
                pool_idle_timeout_secs: portal_config.upstream.pool_idle_timeout_secs.unwrap_or(300),
                max_history: portal_config.history.max_snapshots.unwrap_or(180),
            },
            redis_url,
            pool_configs,
            log_file,
        })
    }
}
