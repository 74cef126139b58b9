use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{
    asset_store::{AssetStoreBackend, AssetStoreConfig},
    registry::RegistryConfig,
};

const LOCAL_ENV: &str = "local";

/// Environment variables prefixed with this override file values, with
/// `__` separating nested keys (`MEDIA_ASSET_STORE__API_SECRET`).
const ENV_PREFIX: &str = "MEDIA_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub asset_store: AssetStoreConfig,
}

fn default_env() -> String {
    LOCAL_ENV.to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8910".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            env: default_env(),
            listen_addr: default_listen_addr(),
            registry: RegistryConfig::default(),
            asset_store: AssetStoreConfig {
                backend: AssetStoreBackend::Memory,
                cloud_name: "local".to_string(),
                ..Default::default()
            },
        }
    }
}

impl ServerConfig {
    pub fn from_path(path: &str) -> Result<ServerConfig> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&config_str)
    }

    fn from_yaml_str(config_str: &str) -> Result<ServerConfig> {
        let config: ServerConfig = Figment::new()
            .merge(Yaml::string(config_str))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow!("invalid listen address: {}", self.listen_addr));
        }
        if self.registry.path.as_os_str().is_empty() {
            return Err(anyhow!("registry.path is required"));
        }
        if self.registry.marker.trim().is_empty() {
            return Err(anyhow!("registry.marker must not be empty"));
        }
        if self.asset_store.cloud_name.trim().is_empty() {
            return Err(anyhow!("asset_store.cloud_name is required"));
        }
        if self.asset_store.backend == AssetStoreBackend::Http &&
            (self.asset_store.api_key.is_none() || self.asset_store.api_secret.is_none())
        {
            return Err(anyhow!(
                "asset_store.api_key and asset_store.api_secret are required for the http backend"
            ));
        }
        Ok(())
    }

    pub fn structured_logging(&self) -> bool {
        self.env != LOCAL_ENV
    }
}
