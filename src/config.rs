use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_api_url() -> String {
    "https://api.eventma.io".to_string()
}

fn default_storage_path() -> PathBuf {
    Config::eventma_dir().join("storage.json")
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            storage_path: default_storage_path(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(&config_path, contents)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        std::env::var("EVENTMA_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::eventma_dir().join("config.toml"))
    }

    pub fn eventma_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".eventma")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("EVENTMA_API_URL") {
            self.api_url = url;
        }

        if let Ok(path) = std::env::var("EVENTMA_STORAGE_PATH") {
            self.storage_path = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("EVENTMA_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(seconds) = val.parse() {
                self.request_timeout_seconds = seconds;
            }
        }
    }
}

pub async fn show_config() -> Result<()> {
    let config = Config::load()?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub async fn init_config() -> Result<()> {
    let config_path = Config::config_path();

    if config_path.exists() {
        anyhow::bail!("Config file already exists at: {}", config_path.display());
    }

    let config = Config::default();
    config.save()?;

    println!("Initialized config at: {}", config_path.display());
    Ok(())
}
