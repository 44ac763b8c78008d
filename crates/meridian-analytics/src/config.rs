// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered SDK configuration.
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (`MERIDIAN_ANALYTICS_*`)
//! 2. Config file (`~/.config/meridian/analytics.toml` or a given path)
//! 3. Built-in defaults
//!
//! Experiments and page stage rules can only be set from the config file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use meridian_analytics_core::{ExperimentConfig, DEFAULT_SESSION_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::batch::BatchConfig;
use crate::debug_log::DEFAULT_DEBUG_LOG_CAPACITY;
use crate::emitter::EmitterConfig;
use crate::error::ConfigError;
use crate::page::{PageStageRule, PageStageRules};
use crate::sink::MeasurementProtocolConfig;

pub const ENV_PREFIX: &str = "MERIDIAN_ANALYTICS_";
pub const DEFAULT_MEASUREMENT_ENDPOINT: &str = "https://www.google-analytics.com/mp/collect";
/// Thirty days.
pub const MAX_SESSION_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

const DEFAULT_MAX_BATCH_SIZE: usize = 25;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5000;
const DEFAULT_MAX_QUEUE_SIZE: usize = 500;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsConfigLayer {
	pub measurement_endpoint: Option<String>,
	pub measurement_id: Option<String>,
	pub api_secret: Option<String>,
	pub debug: Option<bool>,
	pub session_timeout_secs: Option<u64>,
	pub max_batch_size: Option<usize>,
	pub flush_interval_ms: Option<u64>,
	pub max_queue_size: Option<usize>,
	pub debug_log_capacity: Option<usize>,
	pub request_timeout_ms: Option<u64>,
	pub forms_base_url: Option<String>,
	pub storage_path: Option<PathBuf>,
	pub experiments: Option<Vec<ExperimentConfig>>,
	pub page_stages: Option<Vec<PageStageRule>>,
}

impl std::fmt::Debug for AnalyticsConfigLayer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AnalyticsConfigLayer")
			.field("measurement_endpoint", &self.measurement_endpoint)
			.field("measurement_id", &self.measurement_id)
			.field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
			.field("debug", &self.debug)
			.field("session_timeout_secs", &self.session_timeout_secs)
			.field("max_batch_size", &self.max_batch_size)
			.field("flush_interval_ms", &self.flush_interval_ms)
			.field("max_queue_size", &self.max_queue_size)
			.field("debug_log_capacity", &self.debug_log_capacity)
			.field("request_timeout_ms", &self.request_timeout_ms)
			.field("forms_base_url", &self.forms_base_url)
			.field("storage_path", &self.storage_path)
			.field("experiments", &self.experiments)
			.field("page_stages", &self.page_stages)
			.finish()
	}
}

macro_rules! merge_fields {
	($self:ident, $other:ident, $($field:ident),+ $(,)?) => {
		$(
			if $other.$field.is_some() {
				$self.$field = $other.$field;
			}
		)+
	};
}

impl AnalyticsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		merge_fields!(
			self,
			other,
			measurement_endpoint,
			measurement_id,
			api_secret,
			debug,
			session_timeout_secs,
			max_batch_size,
			flush_interval_ms,
			max_queue_size,
			debug_log_capacity,
			request_timeout_ms,
			forms_base_url,
			storage_path,
			experiments,
			page_stages,
		);
	}

	pub fn finalize(self) -> Result<AnalyticsConfig, ConfigError> {
		let config = AnalyticsConfig {
			measurement_endpoint: self
				.measurement_endpoint
				.unwrap_or_else(|| DEFAULT_MEASUREMENT_ENDPOINT.to_string()),
			measurement_id: self.measurement_id,
			api_secret: self.api_secret,
			debug: self.debug.unwrap_or(false),
			session_timeout_secs: self
				.session_timeout_secs
				.unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS as u64),
			max_batch_size: self.max_batch_size.unwrap_or(DEFAULT_MAX_BATCH_SIZE),
			flush_interval_ms: self.flush_interval_ms.unwrap_or(DEFAULT_FLUSH_INTERVAL_MS),
			max_queue_size: self.max_queue_size.unwrap_or(DEFAULT_MAX_QUEUE_SIZE),
			debug_log_capacity: self
				.debug_log_capacity
				.unwrap_or(DEFAULT_DEBUG_LOG_CAPACITY),
			request_timeout_ms: self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
			forms_base_url: self.forms_base_url,
			storage_path: self.storage_path,
			experiments: self.experiments.unwrap_or_default(),
			page_stages: self.page_stages,
		};
		config.validate()?;
		Ok(config)
	}
}

/// Resolved SDK configuration.
#[derive(Clone, PartialEq)]
pub struct AnalyticsConfig {
	pub measurement_endpoint: String,
	pub measurement_id: Option<String>,
	pub api_secret: Option<String>,
	pub debug: bool,
	pub session_timeout_secs: u64,
	pub max_batch_size: usize,
	pub flush_interval_ms: u64,
	pub max_queue_size: usize,
	pub debug_log_capacity: usize,
	pub request_timeout_ms: u64,
	pub forms_base_url: Option<String>,
	/// Where identifiers and assignments are persisted. `None` uses the
	/// platform data directory.
	pub storage_path: Option<PathBuf>,
	pub experiments: Vec<ExperimentConfig>,
	/// Replaces the default page stage rules when set.
	pub page_stages: Option<Vec<PageStageRule>>,
}

impl Default for AnalyticsConfig {
	fn default() -> Self {
		Self {
			measurement_endpoint: DEFAULT_MEASUREMENT_ENDPOINT.to_string(),
			measurement_id: None,
			api_secret: None,
			debug: false,
			session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS as u64,
			max_batch_size: DEFAULT_MAX_BATCH_SIZE,
			flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
			max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
			debug_log_capacity: DEFAULT_DEBUG_LOG_CAPACITY,
			request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
			forms_base_url: None,
			storage_path: None,
			experiments: Vec::new(),
			page_stages: None,
		}
	}
}

impl std::fmt::Debug for AnalyticsConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AnalyticsConfig")
			.field("measurement_endpoint", &self.measurement_endpoint)
			.field("measurement_id", &self.measurement_id)
			.field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
			.field("debug", &self.debug)
			.field("session_timeout_secs", &self.session_timeout_secs)
			.field("max_batch_size", &self.max_batch_size)
			.field("flush_interval_ms", &self.flush_interval_ms)
			.field("max_queue_size", &self.max_queue_size)
			.field("debug_log_capacity", &self.debug_log_capacity)
			.field("request_timeout_ms", &self.request_timeout_ms)
			.field("forms_base_url", &self.forms_base_url)
			.field("storage_path", &self.storage_path)
			.field("experiments", &self.experiments)
			.field("page_stages", &self.page_stages)
			.finish()
	}
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
	ConfigError::InvalidValue {
		key: key.to_string(),
		message: message.into(),
	}
}

impl AnalyticsConfig {
	fn validate(&self) -> Result<(), ConfigError> {
		if self.session_timeout_secs == 0 {
			return Err(invalid("session_timeout_secs", "must be greater than zero"));
		}
		if self.session_timeout_secs > MAX_SESSION_TIMEOUT_SECS {
			return Err(invalid(
				"session_timeout_secs",
				format!("must be at most {MAX_SESSION_TIMEOUT_SECS}"),
			));
		}
		if self.max_batch_size == 0 {
			return Err(invalid("max_batch_size", "must be greater than zero"));
		}
		if self.max_queue_size == 0 {
			return Err(invalid("max_queue_size", "must be greater than zero"));
		}
		if self.measurement_id.is_some() != self.api_secret.is_some() {
			return Err(invalid(
				"measurement_id",
				"measurement_id and api_secret must be set together",
			));
		}
		for url in std::iter::once(&self.measurement_endpoint).chain(&self.forms_base_url) {
			if !(url.starts_with("http://") || url.starts_with("https://")) {
				return Err(invalid("url", format!("'{url}' is not an http(s) URL")));
			}
		}
		for experiment in &self.experiments {
			experiment
				.validate()
				.map_err(|e| invalid("experiments", e.to_string()))?;
		}
		Ok(())
	}

	pub fn session_timeout(&self) -> chrono::Duration {
		let secs = self.session_timeout_secs.min(MAX_SESSION_TIMEOUT_SECS);
		chrono::Duration::seconds(secs as i64)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	pub fn batch_config(&self) -> BatchConfig {
		BatchConfig {
			max_batch_size: self.max_batch_size,
			flush_interval: Duration::from_millis(self.flush_interval_ms),
			max_queue_size: self.max_queue_size,
			..BatchConfig::default()
		}
	}

	pub fn emitter_config(&self) -> EmitterConfig {
		EmitterConfig {
			batch: self.batch_config(),
			debug: self.debug,
			debug_log_capacity: self.debug_log_capacity,
		}
	}

	/// Settings for the measurement-protocol sink, if credentials are set.
	pub fn measurement_protocol(&self) -> Option<MeasurementProtocolConfig> {
		Some(MeasurementProtocolConfig {
			endpoint: self.measurement_endpoint.clone(),
			measurement_id: self.measurement_id.clone()?,
			api_secret: self.api_secret.clone()?,
			request_timeout: self.request_timeout(),
		})
	}

	pub fn page_rules(&self) -> PageStageRules {
		match &self.page_stages {
			Some(rules) => PageStageRules::new(rules.clone()),
			None => PageStageRules::default(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<AnalyticsConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<AnalyticsConfigLayer, ConfigError> {
		Ok(AnalyticsConfigLayer::default())
	}
}

pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `~/.config/meridian/analytics.toml` (or the platform equivalent).
	pub fn user() -> Option<Self> {
		dirs::config_dir().map(|dir| Self::new(dir.join("meridian").join("analytics.toml")))
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<AnalyticsConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(AnalyticsConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Reads `MERIDIAN_ANALYTICS_*` variables.
pub struct EnvSource {
	vars: Option<HashMap<String, String>>,
}

impl EnvSource {
	/// Reads the process environment.
	pub fn new() -> Self {
		Self { vars: None }
	}

	/// Reads from a fixed set of variables instead of the process environment.
	pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
		}
	}

	fn var(&self, suffix: &str) -> Option<String> {
		let name = format!("{ENV_PREFIX}{suffix}");
		let value = match &self.vars {
			Some(vars) => vars.get(&name).cloned(),
			None => std::env::var(&name).ok(),
		};
		value.filter(|s| !s.is_empty())
	}

	fn bool(&self, suffix: &str) -> Option<bool> {
		self.var(suffix)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parsed<T: std::str::FromStr>(&self, suffix: &str) -> Result<Option<T>, ConfigError> {
		match self.var(suffix) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: format!("{ENV_PREFIX}{suffix}"),
				message: format!("invalid value '{v}'"),
			}),
			None => Ok(None),
		}
	}
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<AnalyticsConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(AnalyticsConfigLayer {
			measurement_endpoint: self.var("MEASUREMENT_ENDPOINT"),
			measurement_id: self.var("MEASUREMENT_ID"),
			api_secret: self.var("API_SECRET"),
			debug: self.bool("DEBUG"),
			session_timeout_secs: self.parsed("SESSION_TIMEOUT_SECS")?,
			max_batch_size: self.parsed("MAX_BATCH_SIZE")?,
			flush_interval_ms: self.parsed("FLUSH_INTERVAL_MS")?,
			max_queue_size: self.parsed("MAX_QUEUE_SIZE")?,
			debug_log_capacity: self.parsed("DEBUG_LOG_CAPACITY")?,
			request_timeout_ms: self.parsed("REQUEST_TIMEOUT_MS")?,
			forms_base_url: self.var("FORMS_BASE_URL"),
			storage_path: self.var("STORAGE_PATH").map(PathBuf::from),
			experiments: None,
			page_stages: None,
		})
	}
}

/// Merges `sources` in precedence order and resolves the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<AnalyticsConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = AnalyticsConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}
	merged.finalize()
}

/// Loads defaults, the user config file and the environment.
pub fn load_config() -> Result<AnalyticsConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource)];
	if let Some(toml) = TomlSource::user() {
		sources.push(Box::new(toml));
	}
	sources.push(Box::new(EnvSource::new()));
	load_from_sources(sources)
}

/// Loads defaults, the config file at `path` and the environment.
pub fn load_config_from(path: impl Into<PathBuf>) -> Result<AnalyticsConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(path)),
		Box::new(EnvSource::new()),
	];
	load_from_sources(sources)
}
