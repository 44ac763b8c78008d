// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the analytics SDK.

use std::path::PathBuf;

use thiserror::Error;

/// Client storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Storage is disabled or not present.
	#[error("storage unavailable")]
	Unavailable,

	/// Storage refused the write.
	#[error("storage quota exceeded")]
	QuotaExceeded,

	/// The backing file could not be read or written.
	#[error("storage I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// The backing file is not a JSON object of strings.
	#[error("storage is corrupt: {0}")]
	Corrupt(String),
}

/// Analytics SDK errors.
#[derive(Debug, Error)]
pub enum AnalyticsError {
	/// Base URL is missing or invalid.
	#[error("invalid base URL")]
	InvalidBaseUrl,

	/// No analytics sink was configured.
	#[error("no analytics sink configured")]
	MissingSink,

	/// HTTP request failed.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// Server returned an error response.
	#[error("server error ({status}): {message}")]
	ServerError { status: u16, message: String },

	/// The emitter worker has stopped.
	#[error("client has been shut down")]
	ClientShutdown,

	/// The emitter was started outside a Tokio runtime.
	#[error("no async runtime available")]
	NoRuntime,

	/// Client storage failed.
	#[error("storage error: {0}")]
	Storage(#[from] StorageError),

	/// Serialization error.
	#[error("serialization error: {0}")]
	Serialization(String),
}

impl From<serde_json::Error> for AnalyticsError {
	fn from(e: serde_json::Error) -> Self {
		AnalyticsError::Serialization(e.to_string())
	}
}

/// Result type alias for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Config file exists but could not be read.
	#[error("failed to read {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// TOML parsing error.
	#[error("TOML parse error in {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	/// A value was present but not usable.
	#[error("invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn storage_error_converts() {
		let err: AnalyticsError = StorageError::QuotaExceeded.into();
		assert!(matches!(err, AnalyticsError::Storage(StorageError::QuotaExceeded)));
		assert_eq!(err.to_string(), "storage error: storage quota exceeded");
	}

	#[test]
	fn server_error_display() {
		let err = AnalyticsError::ServerError {
			status: 503,
			message: "unavailable".to_string(),
		};
		assert_eq!(err.to_string(), "server error (503): unavailable");
	}

	#[test]
	fn serde_error_converts() {
		let err: AnalyticsError = serde_json::from_str::<serde_json::Value>("{")
			.unwrap_err()
			.into();
		assert!(matches!(err, AnalyticsError::Serialization(_)));
	}
}
