use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::query::QueryConfig;
use crate::resources::ResourceConfigs;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  /// Overrides applied to every resource before its own section
  pub defaults: QueryOverrides,
  pub resources: ResourceOverrides,
  pub mutations: MutationConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Backend base url; `api/...` paths are resolved against it
  pub url: String,
  pub timeout_secs: u64,
  /// How often `watch` checks that the backend is reachable
  pub probe_interval_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:8080".to_string(),
      timeout_secs: 30,
      probe_interval_secs: 10,
    }
  }
}

/// Partial query config. Unset fields keep the preset's value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueryOverrides {
  pub stale_time_ms: Option<u64>,
  pub cache_time_ms: Option<u64>,
  /// 0 disables polling
  pub refetch_interval_ms: Option<u64>,
  pub refetch_on_window_focus: Option<bool>,
  pub refetch_on_reconnect: Option<bool>,
  pub retry_count: Option<u32>,
  pub retry_delay_ms: Option<u64>,
}

impl QueryOverrides {
  pub fn apply(&self, mut config: QueryConfig) -> QueryConfig {
    if let Some(ms) = self.stale_time_ms {
      config.stale_time = Duration::from_millis(ms);
    }
    if let Some(ms) = self.cache_time_ms {
      config.cache_time = Some(Duration::from_millis(ms));
    }
    if let Some(ms) = self.refetch_interval_ms {
      config.refetch_interval = (ms > 0).then(|| Duration::from_millis(ms));
    }
    if let Some(enabled) = self.refetch_on_window_focus {
      config.refetch_on_window_focus = enabled;
    }
    if let Some(enabled) = self.refetch_on_reconnect {
      config.refetch_on_reconnect = enabled;
    }
    if let Some(count) = self.retry_count {
      config.retry_count = count;
    }
    if let Some(ms) = self.retry_delay_ms {
      config.retry_delay = Duration::from_millis(ms);
    }
    config
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceOverrides {
  pub tables: QueryOverrides,
  pub deliveries: QueryOverrides,
  pub ingredients: QueryOverrides,
  pub orders: QueryOverrides,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
  /// Queue mutations on the same key instead of letting them overlap
  pub serialize_per_key: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// `EnvFilter` directives, e.g. "tablesync=debug". RUST_LOG wins when set.
  pub filter: Option<String>,
  /// Log file used by `watch`
  pub file: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tablesync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tablesync/config.yaml
  ///
  /// Without a file every setting has a default, so a missing config is fine.
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("tablesync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tablesync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    // An empty file parses as null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Resource presets with `defaults` and then each resource's section on top.
  pub fn resource_configs(&self) -> ResourceConfigs {
    let presets = ResourceConfigs::default();
    let layer = |preset: QueryConfig, own: &QueryOverrides| own.apply(self.defaults.apply(preset));
    ResourceConfigs {
      tables: layer(presets.tables, &self.resources.tables),
      deliveries: layer(presets.deliveries, &self.resources.deliveries),
      ingredients: layer(presets.ingredients, &self.resources.ingredients),
      orders: layer(presets.orders, &self.resources.orders),
    }
  }

  /// Bearer token for the backend, from TABLESYNC_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("TABLESYNC_TOKEN").ok().filter(|token| !token.is_empty())
  }
}
