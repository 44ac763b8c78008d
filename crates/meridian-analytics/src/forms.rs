// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Form interaction tracking.
//!
//! A [`FormTracker`] covers one form lifecycle: start, field interactions,
//! then exactly one terminal event. Completion and abandonment are mutually
//! exclusive and the first one recorded wins. Dropping a started tracker
//! that has not reached a terminal event records an abandonment with reason
//! `unmount`.
//!
//! Field values are never kept or forwarded. Only whether a field is filled
//! and its character count are retained.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use meridian_analytics_core::{EventKind, EventParams, TrackingEvent};
use tracing::debug;

use crate::emitter::EventEmitter;
use crate::environment::Environment;
use crate::funnel::ConversionFunnel;

pub const UNMOUNT_REASON: &str = "unmount";
const DEFAULT_ABANDON_REASON: &str = "unknown";

/// What is kept about a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSummary {
	pub filled: bool,
	pub length: usize,
}

impl ValueSummary {
	pub fn of(value: &str) -> Self {
		let trimmed = value.trim();
		Self {
			filled: !trimmed.is_empty(),
			length: trimmed.chars().count(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInteraction {
	pub first_interaction_at: DateTime<Utc>,
	pub last_interaction_at: DateTime<Utc>,
	pub interactions: u32,
	pub last_value: Option<ValueSummary>,
}

/// How a form lifecycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormOutcome {
	Completed,
	Abandoned,
}

pub struct FormTracker {
	env: Arc<dyn Environment>,
	emitter: Arc<EventEmitter>,
	funnel: Option<Arc<ConversionFunnel>>,
	form_id: String,
	form_type: String,
	started_at: Option<DateTime<Utc>>,
	fields: HashMap<String, FieldInteraction>,
	touch_order: Vec<String>,
	last_field: Option<String>,
	completed_at: Option<DateTime<Utc>>,
	abandoned_at: Option<DateTime<Utc>>,
}

impl FormTracker {
	pub fn new(env: Arc<dyn Environment>, emitter: Arc<EventEmitter>) -> Self {
		Self {
			env,
			emitter,
			funnel: None,
			form_id: String::new(),
			form_type: String::new(),
			started_at: None,
			fields: HashMap::new(),
			touch_order: Vec::new(),
			last_field: None,
			completed_at: None,
			abandoned_at: None,
		}
	}

	/// Completion also records a funnel conversion.
	pub fn with_funnel(mut self, funnel: Arc<ConversionFunnel>) -> Self {
		self.funnel = Some(funnel);
		self
	}

	/// Starts the lifecycle and emits `form_start`. Only the first call counts.
	pub fn start_tracking(&mut self, form_id: &str, form_type: &str) {
		if self.started_at.is_some() {
			debug!(form_id = %self.form_id, "form already tracked");
			return;
		}
		self.form_id = form_id.to_string();
		self.form_type = form_type.to_string();
		self.started_at = Some(self.env.now());

		self.emitter.emit(EventKind::FormStart {
			form_id: self.form_id.clone(),
			form_type: self.form_type.clone(),
		});
	}

	/// Records an interaction with `field`. The value is reduced to a
	/// [`ValueSummary`] before it is stored.
	pub fn track_field_interaction(&mut self, field: &str, value: Option<&str>) {
		if self.started_at.is_none() || self.is_terminal() {
			debug!(field, "field interaction outside an active form lifecycle");
			return;
		}
		let now = self.env.now();
		let summary = value.map(ValueSummary::of);

		match self.fields.get_mut(field) {
			Some(interaction) => {
				interaction.last_interaction_at = now;
				interaction.interactions += 1;
				if summary.is_some() {
					interaction.last_value = summary;
				}
			}
			None => {
				self.fields.insert(
					field.to_string(),
					FieldInteraction {
						first_interaction_at: now,
						last_interaction_at: now,
						interactions: 1,
						last_value: summary,
					},
				);
				self.touch_order.push(field.to_string());
			}
		}
		self.last_field = Some(field.to_string());
	}

	fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
		self.started_at
			.map(|started| (now - started).num_milliseconds().max(0))
			.unwrap_or(0)
	}

	/// Records completion and emits `form_complete`. A second call, or a call
	/// after abandonment, is a no-op.
	pub fn track_form_completion(&mut self, goal_id: &str, extra: Option<EventParams>) {
		if self.started_at.is_none() {
			debug!(goal_id, "completion for a form that was never started");
			return;
		}
		if self.is_terminal() {
			debug!(form_id = %self.form_id, "form already finished");
			return;
		}
		let now = self.env.now();
		self.completed_at = Some(now);

		let event = TrackingEvent::new(EventKind::FormComplete {
			form_id: self.form_id.clone(),
			form_type: self.form_type.clone(),
			goal_id: goal_id.to_string(),
			elapsed_ms: self.elapsed_ms(now),
			fields_interacted: self.fields.len(),
		});
		self.emitter.emit(match extra {
			Some(extra) => event.with_extra(extra),
			None => event,
		});

		if let Some(funnel) = &self.funnel {
			funnel.track_conversion(goal_id, None);
		}
	}

	/// Records abandonment and emits `form_abandon`, unless the form has
	/// already finished.
	pub fn track_form_abandonment(&mut self, reason: Option<&str>) {
		if self.started_at.is_none() || self.is_terminal() {
			return;
		}
		let now = self.env.now();
		self.abandoned_at = Some(now);

		self.emitter.emit(EventKind::FormAbandon {
			form_id: self.form_id.clone(),
			form_type: self.form_type.clone(),
			elapsed_ms: self.elapsed_ms(now),
			fields_touched: self.touch_order.clone(),
			last_field: self.last_field.clone(),
			reason: reason.unwrap_or(DEFAULT_ABANDON_REASON).to_string(),
		});
	}

	pub fn form_id(&self) -> &str {
		&self.form_id
	}

	pub fn is_started(&self) -> bool {
		self.started_at.is_some()
	}

	pub fn started_at(&self) -> Option<DateTime<Utc>> {
		self.started_at
	}

	pub fn completed_at(&self) -> Option<DateTime<Utc>> {
		self.completed_at
	}

	pub fn abandoned_at(&self) -> Option<DateTime<Utc>> {
		self.abandoned_at
	}

	pub fn is_terminal(&self) -> bool {
		self.completed_at.is_some() || self.abandoned_at.is_some()
	}

	pub fn outcome(&self) -> Option<FormOutcome> {
		match (self.completed_at, self.abandoned_at) {
			(Some(_), _) => Some(FormOutcome::Completed),
			(None, Some(_)) => Some(FormOutcome::Abandoned),
			(None, None) => None,
		}
	}

	pub fn field(&self, name: &str) -> Option<&FieldInteraction> {
		self.fields.get(name)
	}

	/// Fields in the order they were first touched.
	pub fn fields_touched(&self) -> &[String] {
		&self.touch_order
	}
}

impl Drop for FormTracker {
	fn drop(&mut self) {
		self.track_form_abandonment(Some(UNMOUNT_REASON));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::Harness;
	use chrono::Duration;
	use meridian_analytics_core::{FunnelStage, ParamValue};

	fn tracker(h: &Harness) -> FormTracker {
		FormTracker::new(h.env.clone(), h.emitter.clone())
	}

	fn names(h: &Harness) -> Vec<String> {
		h.emitter.debug_events().into_iter().map(|e| e.name).collect()
	}

	#[test]
	fn completion_reports_elapsed_time_and_fields() {
		let h = Harness::new();
		let mut form = tracker(&h);

		form.start_tracking("contact-main", "contact");
		h.env.advance(Duration::seconds(2));
		form.track_field_interaction("email", Some("jo@acme.io"));
		form.track_field_interaction("company", Some("Acme"));
		form.track_field_interaction("email", Some("jo@acme.com"));
		h.env.advance(Duration::seconds(3));
		form.track_form_completion("contact-submitted", None);

		assert_eq!(form.outcome(), Some(FormOutcome::Completed));
		let event = h.emitter.debug_events().pop().unwrap();
		assert_eq!(event.name, "form_complete");
		assert_eq!(event.params.get("elapsed_ms"), Some(&ParamValue::Integer(5000)));
		assert_eq!(event.params.get("fields_interacted"), Some(&ParamValue::Integer(2)));
		assert_eq!(form.field("email").unwrap().interactions, 2);
	}

	#[test]
	fn completion_is_idempotent() {
		let h = Harness::new();
		let mut form = tracker(&h);
		form.start_tracking("quote", "quote");
		form.track_form_completion("quote-submitted", None);
		let completed_at = form.completed_at();

		h.env.advance(Duration::seconds(5));
		form.track_form_completion("quote-submitted", None);

		assert_eq!(form.completed_at(), completed_at);
		assert_eq!(names(&h), vec!["form_start", "form_complete"]);
	}

	#[test]
	fn completion_wins_over_later_abandonment() {
		let h = Harness::new();
		let mut form = tracker(&h);
		form.start_tracking("quote", "quote");
		form.track_form_completion("quote-submitted", None);
		form.track_form_abandonment(Some("navigation"));
		drop(form);

		assert_eq!(names(&h), vec!["form_start", "form_complete"]);
	}

	#[test]
	fn abandonment_lists_touched_fields() {
		let h = Harness::new();
		let mut form = tracker(&h);
		form.start_tracking("contact-main", "contact");
		form.track_field_interaction("name", Some("Jo"));
		form.track_field_interaction("email", None);
		h.env.advance(Duration::milliseconds(1500));
		form.track_form_abandonment(Some("navigation"));

		assert_eq!(form.outcome(), Some(FormOutcome::Abandoned));
		let event = h.emitter.debug_events().pop().unwrap();
		assert_eq!(event.name, "form_abandon");
		assert_eq!(event.params.get("fields_touched"), Some(&ParamValue::from("name,email")));
		assert_eq!(event.params.get("last_field"), Some(&ParamValue::from("email")));
		assert_eq!(event.params.get("reason"), Some(&ParamValue::from("navigation")));
		assert_eq!(event.params.get("elapsed_ms"), Some(&ParamValue::Integer(1500)));

		form.track_form_completion("contact-submitted", None);
		assert_eq!(form.outcome(), Some(FormOutcome::Abandoned));
	}

	#[test]
	fn drop_fires_unmount_abandonment() {
		let h = Harness::new();
		{
			let mut form = tracker(&h);
			form.start_tracking("newsletter", "newsletter");
			form.track_field_interaction("email", Some("x"));
		}

		let event = h.emitter.debug_events().pop().unwrap();
		assert_eq!(event.name, "form_abandon");
		assert_eq!(event.params.get("reason"), Some(&ParamValue::from(UNMOUNT_REASON)));
	}

	#[test]
	fn unstarted_tracker_emits_nothing() {
		let h = Harness::new();
		{
			let mut form = tracker(&h);
			form.track_field_interaction("email", Some("x"));
			form.track_form_completion("contact-submitted", None);
		}
		assert!(h.emitter.debug_events().is_empty());
	}

	#[test]
	fn values_are_summarized_not_stored() {
		let h = Harness::new();
		let mut form = tracker(&h);
		form.start_tracking("contact-main", "contact");
		form.track_field_interaction("message", Some("  Need help with our data platform  "));
		form.track_field_interaction("phone", Some("   "));

		assert_eq!(
			form.field("message").unwrap().last_value,
			Some(ValueSummary {
				filled: true,
				length: 32
			})
		);
		assert_eq!(
			form.field("phone").unwrap().last_value,
			Some(ValueSummary {
				filled: false,
				length: 0
			})
		);

		form.track_form_completion("contact-submitted", None);
		for event in h.emitter.debug_events() {
			for (_, value) in event.params.iter() {
				assert_ne!(value, &ParamValue::from("Need help with our data platform"));
			}
		}
	}

	#[test]
	fn completion_records_funnel_conversion() {
		let h = Harness::new();
		let funnel = Arc::new(ConversionFunnel::new(h.env.clone(), h.emitter.clone()));
		let mut form = tracker(&h).with_funnel(funnel.clone());

		form.start_tracking("quote", "quote");
		form.track_form_completion("quote-submitted", None);

		assert_eq!(funnel.current_stage(), FunnelStage::Conversion);
		assert_eq!(names(&h), vec!["form_start", "form_complete", "conversion"]);
	}
}
