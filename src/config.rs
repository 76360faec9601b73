use crate::error::FantabaseError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_API_BASE_URL: &str =
    "https://fantabase-api.wittyocean-de44e066.westus2.azurecontainerapps.io";

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.into()
}
fn default_data_dir() -> String {
    "./fantabase.data".into()
}
fn default_public_dir() -> String {
    "./public".into()
}
fn default_web_host() -> String {
    "0.0.0.0".into()
}
fn default_web_port() -> u16 {
    3000
}
fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Base address of the remote chat API. A blank or unparsable value is
    /// not a load error; the widget reports it as a configuration error.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Root directory served by the static asset server.
    #[serde(default = "default_public_dir")]
    pub public_dir: String,
    #[serde(default = "default_web_host")]
    pub web_host: String,
    #[serde(default = "default_web_port")]
    pub web_port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub log_to_file: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: default_api_base_url(),
            data_dir: default_data_dir(),
            public_dir: default_public_dir(),
            web_host: default_web_host(),
            web_port: default_web_port(),
            request_timeout_secs: default_request_timeout_secs(),
            log_to_file: false,
        }
    }
}

impl Config {
    pub fn data_root_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn public_root_dir(&self) -> PathBuf {
        PathBuf::from(&self.public_dir)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn resolve_config_path() -> Result<Option<PathBuf>, FantabaseError> {
        if let Ok(custom) = std::env::var("FANTABASE_CONFIG") {
            if std::path::Path::new(&custom).exists() {
                return Ok(Some(PathBuf::from(custom)));
            }
            return Err(FantabaseError::Config(format!(
                "FANTABASE_CONFIG points to non-existent file: {custom}"
            )));
        }

        for candidate in ["./fantabase.config.yaml", "./fantabase.config.yml"] {
            if std::path::Path::new(candidate).exists() {
                return Ok(Some(PathBuf::from(candidate)));
            }
        }
        Ok(None)
    }

    /// Load config from YAML (defaults when no file exists), then apply the
    /// `HOST` / `PORT` environment overrides.
    pub fn load() -> Result<Self, FantabaseError> {
        let mut config = match Self::resolve_config_path()? {
            Some(path) => {
                let path_str = path.to_string_lossy().to_string();
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    FantabaseError::Config(format!("Failed to read {path_str}: {e}"))
                })?;
                serde_yaml::from_str::<Config>(&content).map_err(|e| {
                    FantabaseError::Config(format!("Failed to parse {path_str}: {e}"))
                })?
            }
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        config.post_deserialize()?;
        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self) -> Result<(), FantabaseError> {
        if let Ok(host) = std::env::var("HOST") {
            if !host.trim().is_empty() {
                self.web_host = host.trim().to_string();
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            let port = port.trim();
            if !port.is_empty() {
                self.web_port = port
                    .parse::<u16>()
                    .map_err(|_| FantabaseError::Config(format!("Invalid PORT: {port}")))?;
            }
        }
        Ok(())
    }

    /// Apply post-deserialization normalization and validation.
    pub(crate) fn post_deserialize(&mut self) -> Result<(), FantabaseError> {
        self.api_base_url = self.api_base_url.trim().to_string();
        if self.data_dir.trim().is_empty() {
            self.data_dir = default_data_dir();
        }
        if self.public_dir.trim().is_empty() {
            self.public_dir = default_public_dir();
        }
        if self.web_host.trim().is_empty() {
            self.web_host = default_web_host();
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        if self.web_port == 0 {
            return Err(FantabaseError::Config("web_port must be non-zero".into()));
        }
        Ok(())
    }

    pub fn save_yaml(&self, path: &str) -> Result<(), FantabaseError> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| FantabaseError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
