use super::BootstrapToml;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapConfig {
    /// Connections per running attempt
    pub bootstrap_connections: u32,
    pub bootstrap_connections_max: u32,
    pub bootstrap_initiator_threads: u32,
    /// Default maximum idle time for a socket before it's automatically closed
    pub idle_timeout: Duration,
    pub tcp_io_timeout: Duration,
    pub lazy_max_pull_blocks: u32,
    pub lazy_min_pull_blocks: u32,
    pub lazy_retry_limit: u32,
    pub lazy_destinations_retry_limit: u32,
    pub frontier_retry_limit: u32,
    pub allow_bootstrap_peers_duplicates: bool,
    pub disable_legacy_bootstrap: bool,
    pub disable_lazy_bootstrap: bool,
}

impl BootstrapConfig {
    pub fn new_test_instance() -> Self {
        Self {
            bootstrap_initiator_threads: 1,
            idle_timeout: Duration::from_secs(15),
            tcp_io_timeout: Duration::from_secs(5),
            lazy_retry_limit: 2,
            lazy_destinations_retry_limit: 1,
            frontier_retry_limit: 2,
            ..Default::default()
        }
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let toml: BootstrapToml = toml::from_str(toml_str)?;
        Ok((&toml).into())
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            bootstrap_connections: 4,
            bootstrap_connections_max: 64,
            bootstrap_initiator_threads: 1,
            idle_timeout: Duration::from_secs(120),
            tcp_io_timeout: Duration::from_secs(15),
            lazy_max_pull_blocks: 512,
            lazy_min_pull_blocks: 32,
            lazy_retry_limit: 64,
            lazy_destinations_retry_limit: 16,
            frontier_retry_limit: 16,
            allow_bootstrap_peers_duplicates: false,
            disable_legacy_bootstrap: false,
            disable_lazy_bootstrap: false,
        }
    }
}
