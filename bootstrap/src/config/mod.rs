mod bootstrap_config;
mod toml;

pub use bootstrap_config::BootstrapConfig;
pub use toml::BootstrapToml;
