use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{Dataset, RetryPolicy, DEFAULT_STALE_RATIO};

/// Longest accepted TTL: one year.
const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL of the REST API (GitHub Enterprise: https://host/api/v3)
  pub api_url: String,
  pub cache: CacheConfig,
  pub retry: RetryConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_url: "https://api.github.com".to_string(),
      cache: CacheConfig::default(),
      retry: RetryConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Set to false to send every request upstream
  pub enabled: bool,
  /// Fraction of the TTL after which cached data is refreshed in the background
  pub stale_ratio: f64,
  /// Serve the last fetched data when a fetch fails after its TTL ran out
  pub retain_last_known: bool,
  pub ttl: TtlConfig,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      stale_ratio: DEFAULT_STALE_RATIO,
      retain_last_known: true,
      ttl: TtlConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
  pub profile_secs: u64,
  pub repos_secs: u64,
  pub pull_requests_secs: u64,
}

impl Default for TtlConfig {
  fn default() -> Self {
    Self {
      profile_secs: 60 * 60,
      repos_secs: 15 * 60,
      pull_requests_secs: 3 * 60,
    }
  }
}

impl TtlConfig {
  pub fn for_dataset(&self, dataset: Dataset) -> Duration {
    let secs = match dataset {
      Dataset::Profile => self.profile_secs,
      Dataset::Repos => self.repos_secs,
      Dataset::PullRequests => self.pull_requests_secs,
    };
    Duration::from_secs(secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_attempts: u32,
  pub base_delay_ms: u64,
  pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay_ms: 1_000,
      max_jitter_ms: 1_000,
    }
  }
}

impl RetryConfig {
  pub fn policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.max_attempts,
      base_delay: Duration::from_millis(self.base_delay_ms),
      max_jitter: Duration::from_millis(self.max_jitter_ms),
      ..RetryPolicy::default()
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ghcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ghcache/config.yaml
  ///
  /// Without any file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("ghcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ghcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  fn validate(&self) -> Result<()> {
    let ratio = self.cache.stale_ratio;
    if !(ratio > 0.0 && ratio <= 1.0) {
      return Err(eyre!(
        "cache.stale_ratio must be in (0, 1], got {}",
        ratio
      ));
    }

    let ttl = &self.cache.ttl;
    for (name, secs) in [
      ("profile_secs", ttl.profile_secs),
      ("repos_secs", ttl.repos_secs),
      ("pull_requests_secs", ttl.pull_requests_secs),
    ] {
      if secs == 0 || secs > MAX_TTL_SECS {
        return Err(eyre!(
          "cache.ttl.{} must be between 1 and {}, got {}",
          name,
          MAX_TTL_SECS,
          secs
        ));
      }
    }

    if self.retry.max_attempts == 0 {
      return Err(eyre!("retry.max_attempts must be at least 1"));
    }

    Ok(())
  }

  /// Get the API token from environment variables.
  ///
  /// Checks GHCACHE_TOKEN first, then GITHUB_TOKEN as fallback.
  /// No token means demo mode.
  pub fn get_api_token() -> Option<String> {
    std::env::var("GHCACHE_TOKEN")
      .or_else(|_| std::env::var("GITHUB_TOKEN"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
