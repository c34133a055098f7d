use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::constants;

/// Environment variable that overrides `api.key`.
pub const API_KEY_ENV: &str = "RAPIDAPI_KEY";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ApiConfig {
  pub key: String,
  pub search_host: String,
  pub download_host: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    let c = constants();
    Self { key: String::new(), search_host: c.search_host.clone(), download_host: c.download_host.clone() }
  }
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  /// Media player binary, `mpv` when unset.
  pub player: Option<String>,
  /// Where saved files go, the user's download folder when unset.
  pub download_dir: Option<PathBuf>,
}

impl Config {
  /// Default location of `config.toml`.
  pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "uyatube").map(|dirs| dirs.config_dir().join("config.toml"))
  }

  /// Load from `path`, falling back to defaults when the file does not exist.
  pub fn load(path: &Path) -> Result<Self> {
    let config = match std::fs::read_to_string(path) {
      Ok(content) => Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
      Err(e) => return Err(anyhow!(e).context(format!("Failed to read {}", path.display()))),
    };
    Ok(config.with_env_key(std::env::var(API_KEY_ENV).ok()))
  }

  pub fn parse(content: &str) -> Result<Self> {
    toml::from_str(content).context("Failed to parse config TOML")
  }

  fn with_env_key(mut self, key: Option<String>) -> Self {
    if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
      self.api.key = key.trim().to_string();
    }
    self
  }

  /// Fail early with a pointer to the config file when no credentials are present.
  pub fn require_api_key(&self, path: &Path) -> Result<()> {
    if self.api.key.trim().is_empty() {
      return Err(anyhow!(
        "No API key configured. Set {} or add `key = \"...\"` under [api] in {}",
        API_KEY_ENV,
        path.display()
      ));
    }
    Ok(())
  }

  pub fn player_binary(&self) -> &str {
    self.player.as_deref().unwrap_or("mpv")
  }
}
