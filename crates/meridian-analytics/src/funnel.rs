// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Conversion funnel tracking.
//!
//! One [`ConversionFunnel`] lives for the lifetime of the host process and is
//! shared by handle. Its state is held in memory only; a new process starts
//! again at awareness.

use std::sync::Arc;

use meridian_analytics_core::{
	EventKind, EventParams, FunnelProgress, FunnelStage, FunnelState, TrackingEvent,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::emitter::EventEmitter;
use crate::environment::Environment;

pub struct ConversionFunnel {
	state: Mutex<FunnelState>,
	env: Arc<dyn Environment>,
	emitter: Arc<EventEmitter>,
}

impl ConversionFunnel {
	pub fn new(env: Arc<dyn Environment>, emitter: Arc<EventEmitter>) -> Self {
		Self {
			state: Mutex::new(FunnelState::new()),
			env,
			emitter,
		}
	}

	/// Records a visit to `stage` and emits a `funnel_stage` event.
	///
	/// Every call is recorded and emitted. The current stage only moves
	/// forward, and only on the first visit to a stage.
	pub fn track_stage(&self, stage: FunnelStage, data: Option<EventParams>) {
		let transition = self.state.lock().record_stage(stage, self.env.now());
		debug!(
			stage = %transition.stage,
			previous_stage = %transition.previous_stage,
			first_reach = transition.first_reach,
			"funnel stage"
		);

		let event = TrackingEvent::new(EventKind::FunnelStage {
			stage: transition.stage,
			previous_stage: transition.previous_stage,
			first_reach: transition.first_reach,
		});
		self.emitter.emit(match data {
			Some(extra) => event.with_extra(extra),
			None => event,
		});
	}

	/// Records a goal completion. The funnel moves to conversion regardless
	/// of where it was.
	pub fn track_conversion(&self, goal_id: &str, data: Option<EventParams>) {
		let transition = self.state.lock().record_conversion(self.env.now());
		debug!(goal_id, previous_stage = %transition.previous_stage, "conversion");

		let event = TrackingEvent::new(EventKind::Conversion {
			goal_id: goal_id.to_string(),
			previous_stage: transition.previous_stage,
		});
		self.emitter.emit(match data {
			Some(extra) => event.with_extra(extra),
			None => event,
		});
	}

	pub fn current_stage(&self) -> FunnelStage {
		self.state.lock().current_stage()
	}

	pub fn has_reached(&self, stage: FunnelStage) -> bool {
		self.state.lock().has_reached(stage)
	}

	pub fn funnel_progress(&self) -> FunnelProgress {
		self.state.lock().progress()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::Harness;
	use chrono::Duration;
	use meridian_analytics_core::ParamValue;

	fn funnel(h: &Harness) -> ConversionFunnel {
		ConversionFunnel::new(h.env.clone(), h.emitter.clone())
	}

	#[test]
	fn starts_at_awareness_with_nothing_reached() {
		let h = Harness::new();
		let funnel = funnel(&h);
		assert_eq!(funnel.current_stage(), FunnelStage::Awareness);
		assert!(funnel.funnel_progress().reached_stages.is_empty());
	}

	#[test]
	fn does_not_regress() {
		let h = Harness::new();
		let funnel = funnel(&h);

		funnel.track_stage(FunnelStage::Interest, None);
		funnel.track_stage(FunnelStage::Awareness, None);

		assert_eq!(funnel.current_stage(), FunnelStage::Interest);
		let progress = funnel.funnel_progress();
		assert!(progress.reached_stages.contains(&FunnelStage::Interest));
		assert!(progress.reached_stages.contains(&FunnelStage::Awareness));
		assert_eq!(progress.history.len(), 2);
	}

	#[test]
	fn every_call_is_recorded_and_emitted() {
		let h = Harness::new();
		let funnel = funnel(&h);

		funnel.track_stage(FunnelStage::Interest, None);
		h.env.advance(Duration::seconds(10));
		funnel.track_stage(FunnelStage::Interest, None);

		let progress = funnel.funnel_progress();
		assert_eq!(progress.history.len(), 2);
		assert!(progress.history[1].at > progress.history[0].at);

		let events = h.emitter.debug_events();
		assert_eq!(events.len(), 2);
		assert_eq!(events[0].params.get("first_reach"), Some(&ParamValue::Bool(true)));
		assert_eq!(events[1].params.get("first_reach"), Some(&ParamValue::Bool(false)));
	}

	#[test]
	fn conversion_is_terminal_from_any_stage() {
		let h = Harness::new();
		let funnel = funnel(&h);

		funnel.track_stage(FunnelStage::Interest, None);
		funnel.track_conversion("quote-submitted", None);
		assert_eq!(funnel.current_stage(), FunnelStage::Conversion);

		funnel.track_stage(FunnelStage::Intent, None);
		assert_eq!(funnel.current_stage(), FunnelStage::Conversion);

		let conversion = h
			.emitter
			.debug_events()
			.into_iter()
			.find(|e| e.name == "conversion")
			.unwrap();
		assert_eq!(
			conversion.params.get("goal_id"),
			Some(&ParamValue::from("quote-submitted"))
		);
		assert_eq!(
			conversion.params.get("previous_stage"),
			Some(&ParamValue::from("interest"))
		);
	}

	#[test]
	fn extra_data_rides_along() {
		let h = Harness::new();
		let funnel = funnel(&h);

		funnel.track_stage(
			FunnelStage::Consideration,
			Some(EventParams::new().insert("case_study", "fintech-migration")),
		);

		let event = h.emitter.debug_events().pop().unwrap();
		assert_eq!(event.name, "funnel_stage");
		assert_eq!(
			event.params.get("case_study"),
			Some(&ParamValue::from("fintech-migration"))
		);
		assert_eq!(
			event.params.get("funnel_stage"),
			Some(&ParamValue::from("consideration"))
		);
	}

	#[test]
	fn state_is_not_shared_between_instances() {
		let h = Harness::new();
		funnel(&h).track_stage(FunnelStage::Intent, None);
		assert_eq!(funnel(&h).current_stage(), FunnelStage::Awareness);
	}
}
