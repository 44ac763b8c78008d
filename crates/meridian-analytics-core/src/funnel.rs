// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Five-stage acquisition funnel.
//!
//! [`FunnelState`] is the pure state machine. It records every transition in
//! its history but only ever moves `current_stage` forward.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A funnel stage. Variants are declared in funnel order, so `Ord` follows
/// the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
	Awareness,
	Interest,
	Consideration,
	Intent,
	Conversion,
}

impl FunnelStage {
	pub const ALL: [FunnelStage; 5] = [
		FunnelStage::Awareness,
		FunnelStage::Interest,
		FunnelStage::Consideration,
		FunnelStage::Intent,
		FunnelStage::Conversion,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			FunnelStage::Awareness => "awareness",
			FunnelStage::Interest => "interest",
			FunnelStage::Consideration => "consideration",
			FunnelStage::Intent => "intent",
			FunnelStage::Conversion => "conversion",
		}
	}

	/// Zero-based position in the funnel.
	pub fn index(&self) -> u32 {
		*self as u32
	}
}

impl std::fmt::Display for FunnelStage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for FunnelStage {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		FunnelStage::ALL
			.into_iter()
			.find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
			.ok_or_else(|| CoreError::InvalidStage(s.to_string()))
	}
}

/// One entry in the funnel history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageVisit {
	pub stage: FunnelStage,
	pub at: DateTime<Utc>,
}

/// Outcome of recording a stage, used to build the tracking event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTransition {
	pub stage: FunnelStage,
	pub previous_stage: FunnelStage,
	pub first_reach: bool,
}

/// Snapshot returned by [`FunnelState::progress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelProgress {
	pub current_stage: FunnelStage,
	pub reached_stages: BTreeSet<FunnelStage>,
	pub history: Vec<StageVisit>,
}

/// Funnel state for one page-load lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelState {
	current_stage: FunnelStage,
	reached_stages: BTreeSet<FunnelStage>,
	history: Vec<StageVisit>,
}

impl Default for FunnelState {
	fn default() -> Self {
		Self::new()
	}
}

impl FunnelState {
	pub fn new() -> Self {
		Self {
			current_stage: FunnelStage::Awareness,
			reached_stages: BTreeSet::new(),
			history: Vec::new(),
		}
	}

	pub fn current_stage(&self) -> FunnelStage {
		self.current_stage
	}

	pub fn has_reached(&self, stage: FunnelStage) -> bool {
		self.reached_stages.contains(&stage)
	}

	/// Records a visit to `stage`.
	///
	/// The visit is always appended to the history. The reached set and the
	/// current stage change only on the first visit to `stage`, and the
	/// current stage never moves backwards.
	pub fn record_stage(&mut self, stage: FunnelStage, at: DateTime<Utc>) -> StageTransition {
		let previous_stage = self.current_stage;
		self.history.push(StageVisit { stage, at });

		let first_reach = self.reached_stages.insert(stage);
		if first_reach && stage > self.current_stage {
			self.current_stage = stage;
		}

		StageTransition {
			stage,
			previous_stage,
			first_reach,
		}
	}

	/// Records a goal completion. Conversion is terminal and always becomes
	/// the current stage.
	pub fn record_conversion(&mut self, at: DateTime<Utc>) -> StageTransition {
		let previous_stage = self.current_stage;
		self.history.push(StageVisit {
			stage: FunnelStage::Conversion,
			at,
		});
		let first_reach = self.reached_stages.insert(FunnelStage::Conversion);
		self.current_stage = FunnelStage::Conversion;

		StageTransition {
			stage: FunnelStage::Conversion,
			previous_stage,
			first_reach,
		}
	}

	pub fn progress(&self) -> FunnelProgress {
		FunnelProgress {
			current_stage: self.current_stage,
			reached_stages: self.reached_stages.clone(),
			history: self.history.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;
	use proptest::prelude::*;

	fn ts(offset_secs: i64) -> DateTime<Utc> {
		DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + Duration::seconds(offset_secs)
	}

	#[test]
	fn stages_are_totally_ordered() {
		assert!(FunnelStage::Awareness < FunnelStage::Interest);
		assert!(FunnelStage::Interest < FunnelStage::Consideration);
		assert!(FunnelStage::Consideration < FunnelStage::Intent);
		assert!(FunnelStage::Intent < FunnelStage::Conversion);
	}

	#[test]
	fn stage_parses_case_insensitively() {
		assert_eq!("Intent".parse::<FunnelStage>(), Ok(FunnelStage::Intent));
		assert!("checkout".parse::<FunnelStage>().is_err());
	}

	#[test]
	fn returning_to_earlier_stage_does_not_regress() {
		let mut state = FunnelState::new();
		state.record_stage(FunnelStage::Interest, ts(0));
		let transition = state.record_stage(FunnelStage::Awareness, ts(10));

		assert_eq!(state.current_stage(), FunnelStage::Interest);
		assert!(state.has_reached(FunnelStage::Interest));
		assert!(state.has_reached(FunnelStage::Awareness));
		assert!(transition.first_reach);
		assert_eq!(transition.previous_stage, FunnelStage::Interest);
	}

	#[test]
	fn repeat_visits_are_logged_but_not_first_reach() {
		let mut state = FunnelState::new();
		state.record_stage(FunnelStage::Consideration, ts(0));
		let again = state.record_stage(FunnelStage::Consideration, ts(5));

		assert!(!again.first_reach);
		assert_eq!(state.progress().history.len(), 2);
		assert_eq!(state.progress().reached_stages.len(), 1);
	}

	#[test]
	fn conversion_supersedes_any_stage() {
		let mut state = FunnelState::new();
		let transition = state.record_conversion(ts(0));

		assert_eq!(state.current_stage(), FunnelStage::Conversion);
		assert_eq!(transition.previous_stage, FunnelStage::Awareness);
	}

	#[test]
	fn conversion_stays_after_later_stage_visits() {
		let mut state = FunnelState::new();
		state.record_conversion(ts(0));
		state.record_stage(FunnelStage::Intent, ts(1));
		assert_eq!(state.current_stage(), FunnelStage::Conversion);
	}

	fn any_stage() -> impl Strategy<Value = FunnelStage> {
		prop_oneof![
			Just(FunnelStage::Awareness),
			Just(FunnelStage::Interest),
			Just(FunnelStage::Consideration),
			Just(FunnelStage::Intent),
			Just(FunnelStage::Conversion),
		]
	}

	proptest! {
		#[test]
		fn current_stage_never_decreases(stages in proptest::collection::vec(any_stage(), 0..40)) {
			let mut state = FunnelState::new();
			let mut last = state.current_stage();
			for (i, stage) in stages.iter().enumerate() {
				state.record_stage(*stage, ts(i as i64));
				prop_assert!(state.current_stage() >= last);
				last = state.current_stage();
			}
		}

		#[test]
		fn current_stage_is_max_reached(stages in proptest::collection::vec(any_stage(), 1..40)) {
			let mut state = FunnelState::new();
			for (i, stage) in stages.iter().enumerate() {
				state.record_stage(*stage, ts(i as i64));
			}
			let max = stages.iter().copied().max().unwrap();
			prop_assert_eq!(state.current_stage(), max.max(FunnelStage::Awareness));
			prop_assert_eq!(state.progress().history.len(), stages.len());
		}
	}
}
