// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! A/B test definitions and deterministic variant bucketing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// One arm of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
	pub id: String,
	/// Relative selection weight. Weights need not sum to 1.
	pub weight: f64,
	/// Arbitrary payload handed to the page when this variant is active.
	#[serde(default)]
	pub config: serde_json::Map<String, serde_json::Value>,
}

impl VariantConfig {
	pub fn new(id: impl Into<String>, weight: f64) -> Self {
		Self {
			id: id.into(),
			weight,
			config: serde_json::Map::new(),
		}
	}

	pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
		self.config.insert(key.into(), value);
		self
	}
}

/// An experiment and its weighted variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
	pub id: String,
	pub variants: Vec<VariantConfig>,
}

impl ExperimentConfig {
	pub fn new(id: impl Into<String>, variants: Vec<VariantConfig>) -> Self {
		Self {
			id: id.into(),
			variants,
		}
	}

	/// Checks that the experiment can bucket visitors.
	pub fn validate(&self) -> Result<()> {
		if self.variants.is_empty() {
			return Err(CoreError::InvalidExperiment {
				id: self.id.clone(),
				reason: "no variants".to_string(),
			});
		}
		if let Some(bad) = self
			.variants
			.iter()
			.find(|v| !v.weight.is_finite() || v.weight < 0.0)
		{
			return Err(CoreError::InvalidExperiment {
				id: self.id.clone(),
				reason: format!("variant '{}' has invalid weight {}", bad.id, bad.weight),
			});
		}
		if self.total_weight() <= 0.0 {
			return Err(CoreError::InvalidExperiment {
				id: self.id.clone(),
				reason: "total weight is zero".to_string(),
			});
		}
		Ok(())
	}

	fn total_weight(&self) -> f64 {
		self.variants.iter().map(|v| v.weight).sum()
	}

	/// Selects the variant for a bucket value in `[0, 1)`.
	///
	/// Walks the cumulative weights and returns the first variant whose
	/// cumulative weight exceeds the scaled bucket. A bucket landing exactly on
	/// a boundary belongs to the later variant. Returns `None` for an
	/// experiment that fails [`validate`](Self::validate).
	pub fn select(&self, bucket: f64) -> Option<&VariantConfig> {
		self.validate().ok()?;

		let target = bucket.clamp(0.0, 1.0) * self.total_weight();
		let mut cumulative = 0.0;
		for variant in &self.variants {
			cumulative += variant.weight;
			if target < cumulative {
				return Some(variant);
			}
		}

		// Rounding can leave `target` at the very top of the range.
		self.variants.iter().rev().find(|v| v.weight > 0.0)
	}
}

/// A visitor's persisted variant for one experiment. Never mutated once
/// created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
	pub test_id: String,
	pub variant_id: String,
	pub visitor_id: String,
	#[serde(default)]
	pub config: serde_json::Map<String, serde_json::Value>,
}

impl Assignment {
	pub fn new(experiment: &ExperimentConfig, variant: &VariantConfig, visitor_id: &str) -> Self {
		Self {
			test_id: experiment.id.clone(),
			variant_id: variant.id.clone(),
			visitor_id: visitor_id.to_string(),
			config: variant.config.clone(),
		}
	}
}

/// Hashes `(visitor_id, test_id)` into `[0, 1)`.
///
/// Uses the top 53 bits of a SHA-256 digest so every result is exactly
/// representable as an `f64` below 1.0.
pub fn bucket(visitor_id: &str, test_id: &str) -> f64 {
	let mut hasher = Sha256::new();
	hasher.update(test_id.as_bytes());
	hasher.update(b".");
	hasher.update(visitor_id.as_bytes());
	let digest = hasher.finalize();

	let mut prefix = [0u8; 8];
	prefix.copy_from_slice(&digest[..8]);
	let value = u64::from_be_bytes(prefix) >> 11;
	value as f64 / (1u64 << 53) as f64
}

/// Hex digest used as a stable assignment fingerprint in logs.
pub fn bucket_key(visitor_id: &str, test_id: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(test_id.as_bytes());
	hasher.update(b".");
	hasher.update(visitor_id.as_bytes());
	hex::encode(&hasher.finalize()[..8])
}
