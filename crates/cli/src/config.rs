//! Service configuration: JSON file, then command-line overrides.
//!
//! Lookup order for the file is an explicit `--config` path, then
//! `$XDG_CONFIG_HOME/pv/config.json` (or `~/.config/pv/config.json`) when it
//! exists. Every field has a default, so an empty `{}` is a valid file.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PvError, Result};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:4000";
pub const DEFAULT_BASE_URL: &str = "https://www.onthehouse.com.au";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
	/// Address the HTTP API binds to.
	pub listen: String,
	/// Admission ceiling for concurrent site operations.
	pub max_concurrent: usize,
	/// Sessions left open longer than this are released by a background sweep.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub idle_session_secs: Option<u64>,
	pub site: SiteConfig,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			listen: DEFAULT_LISTEN.to_string(),
			max_concurrent: pv::DEFAULT_CEILING,
			idle_session_secs: None,
			site: SiteConfig::default(),
		}
	}
}

/// Where and how the site backend talks to the valuation website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteConfig {
	pub base_url: String,
	/// Path of the address autocomplete endpoint.
	pub autocomplete_path: String,
	/// Path of the property search results page. The site's home page form
	/// lands on `/real-estate/<slug>/`; the default assumes the same results
	/// are served for `/real-estate?q=<address>`.
	pub search_path: String,
	/// Query parameter carrying the address on the search page.
	pub search_param: String,
	/// Per-request timeout.
	pub timeout_ms: u64,
	pub user_agent: String,
}

impl Default for SiteConfig {
	fn default() -> Self {
		Self {
			base_url: DEFAULT_BASE_URL.to_string(),
			autocomplete_path: "/odin/api/locations".to_string(),
			search_path: "/real-estate".to_string(),
			search_param: "q".to_string(),
			timeout_ms: 15_000,
			user_agent: concat!("pv/", env!("CARGO_PKG_VERSION")).to_string(),
		}
	}
}

impl SiteConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
	pub listen: Option<String>,
	pub max_concurrent: Option<usize>,
	pub idle_session_secs: Option<u64>,
	pub base_url: Option<String>,
}

impl ServiceConfig {
	/// Reads a config file. A missing file is an error here.
	pub fn load(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path).map_err(|err| PvError::Config {
			path: path.to_path_buf(),
			message: err.to_string(),
		})?;
		serde_json::from_str(&content).map_err(|err| PvError::Config {
			path: path.to_path_buf(),
			message: err.to_string(),
		})
	}

	/// Resolves the config from `explicit`, the default location, or defaults.
	pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
		if let Some(path) = explicit {
			return Self::load(path);
		}
		match default_config_path() {
			Some(path) if path.is_file() => Self::load(&path),
			_ => Ok(Self::default()),
		}
	}

	pub fn apply(&mut self, overrides: &ConfigOverrides) {
		if let Some(listen) = &overrides.listen {
			self.listen = listen.clone();
		}
		if let Some(max) = overrides.max_concurrent {
			self.max_concurrent = max;
		}
		if let Some(secs) = overrides.idle_session_secs {
			self.idle_session_secs = Some(secs);
		}
		if let Some(base_url) = &overrides.base_url {
			self.site.base_url = base_url.clone();
		}
	}

	/// Rejects values the service cannot start with.
	pub fn validate(&self) -> Result<()> {
		if self.max_concurrent == 0 {
			return Err(PvError::InvalidConfig("maxConcurrent must be at least 1".to_string()));
		}
		self.listen_addr()?;
		Url::parse(&self.site.base_url)
			.map_err(|err| PvError::InvalidConfig(format!("site.baseUrl '{}': {err}", self.site.base_url)))?;
		if self.site.timeout_ms == 0 {
			return Err(PvError::InvalidConfig("site.timeoutMs must be positive".to_string()));
		}
		Ok(())
	}

	pub fn listen_addr(&self) -> Result<SocketAddr> {
		self.listen
			.parse()
			.map_err(|err| PvError::InvalidConfig(format!("listen '{}': {err}", self.listen)))
	}

	pub fn idle_session_timeout(&self) -> Option<Duration> {
		self.idle_session_secs.filter(|secs| *secs > 0).map(Duration::from_secs)
	}
}

/// `$XDG_CONFIG_HOME/pv/config.json`, falling back to `~/.config`.
pub fn default_config_path() -> Option<PathBuf> {
	std::env::var_os("XDG_CONFIG_HOME")
		.map(PathBuf::from)
		.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
		.map(|dir| dir.join("pv").join("config.json"))
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn empty_file_yields_defaults() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		fs::write(&path, "{}").unwrap();

		let config = ServiceConfig::load(&path).unwrap();
		assert_eq!(config, ServiceConfig::default());
		assert_eq!(config.max_concurrent, 3);
	}

	#[test]
	fn partial_file_keeps_other_defaults() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		fs::write(&path, r#"{ "maxConcurrent": 5, "site": { "timeoutMs": 2000 } }"#).unwrap();

		let config = ServiceConfig::load(&path).unwrap();
		assert_eq!(config.max_concurrent, 5);
		assert_eq!(config.site.timeout_ms, 2000);
		assert_eq!(config.site.base_url, DEFAULT_BASE_URL);
		assert_eq!(config.listen, DEFAULT_LISTEN);
	}

	#[test]
	fn malformed_file_reports_path() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		fs::write(&path, "{ not json").unwrap();

		match ServiceConfig::load(&path) {
			Err(PvError::Config { path: reported, .. }) => assert_eq!(reported, path),
			other => panic!("expected config error, got {other:?}"),
		}
	}

	#[test]
	fn explicit_missing_file_is_an_error() {
		let tmp = TempDir::new().unwrap();
		assert!(ServiceConfig::resolve(Some(&tmp.path().join("absent.json"))).is_err());
	}

	#[test]
	fn overrides_win_over_file_values() {
		let mut config = ServiceConfig::default();
		config.apply(&ConfigOverrides {
			listen: Some("0.0.0.0:8080".into()),
			max_concurrent: Some(1),
			idle_session_secs: Some(600),
			base_url: None,
		});

		assert_eq!(config.listen, "0.0.0.0:8080");
		assert_eq!(config.max_concurrent, 1);
		assert_eq!(config.idle_session_timeout(), Some(Duration::from_secs(600)));
		assert_eq!(config.site.base_url, DEFAULT_BASE_URL);
	}

	#[test]
	fn validate_rejects_bad_values() {
		let mut config = ServiceConfig::default();
		assert!(config.validate().is_ok());

		config.max_concurrent = 0;
		assert!(matches!(config.validate(), Err(PvError::InvalidConfig(_))));

		config.max_concurrent = 2;
		config.listen = "not an address".into();
		assert!(config.validate().is_err());

		config.listen = DEFAULT_LISTEN.into();
		config.site.base_url = "::nope".into();
		assert!(config.validate().is_err());
	}

	#[test]
	fn zero_idle_timeout_disables_sweeper() {
		let config = ServiceConfig {
			idle_session_secs: Some(0),
			..Default::default()
		};
		assert_eq!(config.idle_session_timeout(), None);
	}
}
