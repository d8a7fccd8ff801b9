use crate::config::BootstrapConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, PartialEq)]
pub struct BootstrapToml {
    pub bootstrap_connections: Option<u32>,
    pub bootstrap_connections_max: Option<u32>,
    pub bootstrap_initiator_threads: Option<u32>,
    pub idle_timeout: Option<u64>,
    pub tcp_io_timeout: Option<u64>,
    pub lazy_max_pull_blocks: Option<u32>,
    pub lazy_min_pull_blocks: Option<u32>,
    pub lazy_retry_limit: Option<u32>,
    pub lazy_destinations_retry_limit: Option<u32>,
    pub frontier_retry_limit: Option<u32>,
    pub allow_bootstrap_peers_duplicates: Option<bool>,
    pub disable_legacy_bootstrap: Option<bool>,
    pub disable_lazy_bootstrap: Option<bool>,
}

impl Default for BootstrapToml {
    fn default() -> Self {
        let config = BootstrapConfig::default();
        (&config).into()
    }
}

impl From<&BootstrapToml> for BootstrapConfig {
    fn from(toml: &BootstrapToml) -> Self {
        let mut config = BootstrapConfig::default();

        if let Some(connections) = toml.bootstrap_connections {
            config.bootstrap_connections = connections;
        }
        if let Some(connections_max) = toml.bootstrap_connections_max {
            config.bootstrap_connections_max = connections_max;
        }
        if let Some(threads) = toml.bootstrap_initiator_threads {
            config.bootstrap_initiator_threads = threads;
        }
        if let Some(idle_timeout) = toml.idle_timeout {
            config.idle_timeout = Duration::from_secs(idle_timeout);
        }
        if let Some(tcp_io_timeout) = toml.tcp_io_timeout {
            config.tcp_io_timeout = Duration::from_secs(tcp_io_timeout);
        }
        if let Some(max_pull_blocks) = toml.lazy_max_pull_blocks {
            config.lazy_max_pull_blocks = max_pull_blocks;
        }
        if let Some(min_pull_blocks) = toml.lazy_min_pull_blocks {
            config.lazy_min_pull_blocks = min_pull_blocks;
        }
        if let Some(retry_limit) = toml.lazy_retry_limit {
            config.lazy_retry_limit = retry_limit;
        }
        if let Some(retry_limit) = toml.lazy_destinations_retry_limit {
            config.lazy_destinations_retry_limit = retry_limit;
        }
        if let Some(retry_limit) = toml.frontier_retry_limit {
            config.frontier_retry_limit = retry_limit;
        }
        if let Some(allow) = toml.allow_bootstrap_peers_duplicates {
            config.allow_bootstrap_peers_duplicates = allow;
        }
        if let Some(disable) = toml.disable_legacy_bootstrap {
            config.disable_legacy_bootstrap = disable;
        }
        if let Some(disable) = toml.disable_lazy_bootstrap {
            config.disable_lazy_bootstrap = disable;
        }
        config
    }
}

impl From<&BootstrapConfig> for BootstrapToml {
    fn from(config: &BootstrapConfig) -> Self {
        Self {
            bootstrap_connections: Some(config.bootstrap_connections),
            bootstrap_connections_max: Some(config.bootstrap_connections_max),
            bootstrap_initiator_threads: Some(config.bootstrap_initiator_threads),
            idle_timeout: Some(config.idle_timeout.as_secs()),
            tcp_io_timeout: Some(config.tcp_io_timeout.as_secs()),
            lazy_max_pull_blocks: Some(config.lazy_max_pull_blocks),
            lazy_min_pull_blocks: Some(config.lazy_min_pull_blocks),
            lazy_retry_limit: Some(config.lazy_retry_limit),
            lazy_destinations_retry_limit: Some(config.lazy_destinations_retry_limit),
            frontier_retry_limit: Some(config.frontier_retry_limit),
            allow_bootstrap_peers_duplicates: Some(config.allow_bootstrap_peers_duplicates),
            disable_legacy_bootstrap: Some(config.disable_legacy_bootstrap),
            disable_lazy_bootstrap: Some(config.disable_lazy_bootstrap),
        }
    }
}
