mod bootstrap_toml;

pub use bootstrap_toml::BootstrapToml;
