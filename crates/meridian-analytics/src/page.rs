// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Page-level instrumentation: path to funnel stage rules and scroll depth
//! thresholds.

use std::collections::{BTreeSet, HashMap};

use meridian_analytics_core::FunnelStage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Scroll depths reported, in percent.
pub const SCROLL_THRESHOLDS: [u32; 4] = [25, 50, 75, 100];

/// Maps a path prefix to the funnel stage a visit implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStageRule {
	pub prefix: String,
	pub stage: FunnelStage,
}

impl PageStageRule {
	pub fn new(prefix: impl Into<String>, stage: FunnelStage) -> Self {
		Self {
			prefix: normalize(&prefix.into()),
			stage,
		}
	}

	fn matches(&self, path: &str) -> bool {
		self.prefix == "/"
			|| path == self.prefix
			|| path
				.strip_prefix(self.prefix.as_str())
				.is_some_and(|rest| rest.starts_with('/'))
	}
}

/// Strips query and fragment, ensures a leading slash and drops a trailing
/// one.
fn normalize(path: &str) -> String {
	let path = path.split(['?', '#']).next().unwrap_or_default().trim();
	let trimmed = path.trim_end_matches('/');
	if trimmed.is_empty() {
		"/".to_string()
	} else if trimmed.starts_with('/') {
		trimmed.to_string()
	} else {
		format!("/{trimmed}")
	}
}

/// Ordered prefix rules. The longest matching prefix wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageStageRules {
	rules: Vec<PageStageRule>,
}

impl Default for PageStageRules {
	fn default() -> Self {
		Self::new(vec![
			PageStageRule::new("/", FunnelStage::Awareness),
			PageStageRule::new("/insights", FunnelStage::Interest),
			PageStageRule::new("/services", FunnelStage::Interest),
			PageStageRule::new("/case-studies", FunnelStage::Consideration),
			PageStageRule::new("/personas", FunnelStage::Consideration),
			PageStageRule::new("/contact", FunnelStage::Intent),
			PageStageRule::new("/quote", FunnelStage::Intent),
		])
	}
}

impl PageStageRules {
	pub fn new(rules: Vec<PageStageRule>) -> Self {
		let rules = rules
			.into_iter()
			.map(|r| PageStageRule::new(r.prefix, r.stage))
			.collect();
		Self { rules }
	}

	pub fn rules(&self) -> &[PageStageRule] {
		&self.rules
	}

	/// The stage for `path`, or `None` if no rule matches. On equal-length
	/// prefixes the earlier rule wins.
	pub fn stage_for(&self, path: &str) -> Option<FunnelStage> {
		let path = normalize(path);
		let mut best: Option<&PageStageRule> = None;
		for rule in self.rules.iter().filter(|r| r.matches(&path)) {
			if best.map_or(true, |b| rule.prefix.len() > b.prefix.len()) {
				best = Some(rule);
			}
		}
		best.map(|r| r.stage)
	}
}

/// Remembers which scroll thresholds each page has already reported.
#[derive(Debug, Default)]
pub struct ScrollDepthTracker {
	reported: Mutex<HashMap<String, BTreeSet<u32>>>,
}

impl ScrollDepthTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the thresholds at or below `percent` that `path` has not
	/// reported yet, and marks them reported.
	pub fn record(&self, path: &str, percent: u32) -> Vec<u32> {
		let mut reported = self.reported.lock();
		let seen = reported.entry(normalize(path)).or_default();
		SCROLL_THRESHOLDS
			.iter()
			.copied()
			.filter(|t| *t <= percent && seen.insert(*t))
			.collect()
	}

	pub fn reset(&self, path: &str) {
		self.reported.lock().remove(&normalize(path));
	}
}
