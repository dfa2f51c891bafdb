//! JSON configuration file for the `pw-longrun` server.
//!
//! Lookup order: the `--config` path, `pw-longrun.config.json` in the working
//! directory, then `<config dir>/pw-longrun/config.json`. A missing file means
//! all defaults; an explicit path that does not exist is an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use longrun::{SchedulerConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ServerError};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "pw-longrun.config.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
	pub server: ServerSection,
	pub scheduler: SchedulerSection,
	pub session: SessionSection,
	pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSection {
	pub host: String,
	pub port: u16,
}

impl Default for ServerSection {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: 9080,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerSection {
	pub concurrency: usize,
	pub retention_secs: u64,
	/// `null` or `0` disables the background sweeper.
	pub sweep_interval_secs: Option<u64>,
	pub max_id_attempts: usize,
}

impl Default for SchedulerSection {
	fn default() -> Self {
		let defaults = SchedulerConfig::default();
		Self {
			concurrency: defaults.concurrency,
			retention_secs: defaults.retention.as_secs(),
			sweep_interval_secs: defaults.sweep_interval.map(|d| d.as_secs()),
			max_id_attempts: defaults.max_id_attempts,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSection {
	pub refresh_timeout_secs: u64,
	pub refresh_interval_secs: u64,
	pub max_refresh_count: u32,
	pub max_idle_secs: u64,
	pub eviction_interval_secs: u64,
}

impl Default for SessionSection {
	fn default() -> Self {
		let defaults = SessionConfig::default();
		Self {
			refresh_timeout_secs: defaults.refresh_timeout.as_secs(),
			refresh_interval_secs: defaults.refresh_interval.as_secs(),
			max_refresh_count: defaults.max_refresh_count,
			max_idle_secs: defaults.max_idle.as_secs(),
			eviction_interval_secs: defaults.eviction_interval.as_secs(),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSection {
	/// Default `EnvFilter` directive when neither `-v` nor `RUST_LOG` is given.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub level: Option<String>,
}

/// Configuration together with the file it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
	pub config: Config,
	pub path: Option<PathBuf>,
}

impl Config {
	/// Resolves and loads the configuration file, or defaults if there is none.
	pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
		if let Some(path) = explicit {
			if !path.is_file() {
				return Err(ServerError::Config {
					path: path.to_path_buf(),
					message: "file not found".to_string(),
				});
			}
			return Self::load_from(path).map(|config| LoadedConfig {
				config,
				path: Some(path.to_path_buf()),
			});
		}

		let candidates = [Some(PathBuf::from(LOCAL_CONFIG_FILE)), global_config_path()];
		for path in candidates.into_iter().flatten() {
			if path.is_file() {
				let config = Self::load_from(&path)?;
				return Ok(LoadedConfig { config, path: Some(path) });
			}
		}

		debug!(target = "longrun.server", "no config file found; using defaults");
		Ok(LoadedConfig {
			config: Config::default(),
			path: None,
		})
	}

	pub fn load_from(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)?;
		let config = serde_json::from_str(&content).map_err(|err| ServerError::Config {
			path: path.to_path_buf(),
			message: err.to_string(),
		})?;
		debug!(target = "longrun.server", path = %path.display(), "loaded config");
		Ok(config)
	}

	/// Applies `--host`/`--port` overrides.
	pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
		if let Some(host) = host {
			self.server.host = host;
		}
		if let Some(port) = port {
			self.server.port = port;
		}
		self
	}

	pub fn scheduler_config(&self) -> SchedulerConfig {
		let section = &self.scheduler;
		SchedulerConfig {
			concurrency: section.concurrency,
			retention: Duration::from_secs(section.retention_secs),
			sweep_interval: section
				.sweep_interval_secs
				.filter(|secs| *secs > 0)
				.map(Duration::from_secs),
			max_id_attempts: section.max_id_attempts,
		}
	}

	pub fn session_config(&self) -> SessionConfig {
		let section = &self.session;
		SessionConfig {
			refresh_timeout: Duration::from_secs(section.refresh_timeout_secs),
			refresh_interval: Duration::from_secs(section.refresh_interval_secs),
			max_refresh_count: section.max_refresh_count,
			max_idle: Duration::from_secs(section.max_idle_secs),
			eviction_interval: Duration::from_secs(section.eviction_interval_secs),
		}
	}

	pub fn bind_addr(&self) -> String {
		format!("{}:{}", self.server.host, self.server.port)
	}
}

fn global_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("pw-longrun").join("config.json"))
}
