// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the analytics core.

use thiserror::Error;

/// Errors produced when parsing or validating core analytics types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
	/// A lead qualification tier string was not recognised.
	#[error("invalid {kind} tier: {value}")]
	InvalidTier { kind: &'static str, value: String },

	/// A funnel stage string was not recognised.
	#[error("invalid funnel stage: {0}")]
	InvalidStage(String),

	/// An experiment definition cannot be used for bucketing.
	#[error("invalid experiment '{id}': {reason}")]
	InvalidExperiment { id: String, reason: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
