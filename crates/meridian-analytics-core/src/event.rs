// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event taxonomy for site analytics.
//!
//! Every event the site can send is a variant of [`EventKind`]. A
//! [`TrackingEvent`] pairs a kind with optional free-form extras and renders
//! both into the flat `name` + `params` shape analytics sinks expect.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::funnel::FunnelStage;

/// A single parameter value. Sinks only accept scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
	Bool(bool),
	Integer(i64),
	Number(f64),
	String(String),
}

impl From<&str> for ParamValue {
	fn from(v: &str) -> Self {
		ParamValue::String(v.to_string())
	}
}

impl From<String> for ParamValue {
	fn from(v: String) -> Self {
		ParamValue::String(v)
	}
}

impl From<bool> for ParamValue {
	fn from(v: bool) -> Self {
		ParamValue::Bool(v)
	}
}

impl From<i64> for ParamValue {
	fn from(v: i64) -> Self {
		ParamValue::Integer(v)
	}
}

impl From<i32> for ParamValue {
	fn from(v: i32) -> Self {
		ParamValue::Integer(v.into())
	}
}

impl From<u32> for ParamValue {
	fn from(v: u32) -> Self {
		ParamValue::Integer(v.into())
	}
}

impl From<u64> for ParamValue {
	fn from(v: u64) -> Self {
		ParamValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
	}
}

impl From<usize> for ParamValue {
	fn from(v: usize) -> Self {
		ParamValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
	}
}

impl From<f64> for ParamValue {
	fn from(v: f64) -> Self {
		ParamValue::Number(v)
	}
}

/// Returns true if `key` is a snake_case parameter key.
///
/// Keys must start with a lowercase letter and contain only lowercase
/// letters, digits and underscores, up to 40 characters.
pub fn is_valid_param_key(key: &str) -> bool {
	let mut chars = key.chars();
	match chars.next() {
		Some(c) if c.is_ascii_lowercase() => {}
		_ => return false,
	}
	key.len() <= 40
		&& chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// An ordered map of event parameters.
///
/// # Example
///
/// ```
/// use meridian_analytics_core::EventParams;
///
/// let params = EventParams::new()
///     .insert("cta_id", "hero-book-call")
///     .insert("position", 1)
///     .insert("above_fold", true);
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventParams {
	inner: BTreeMap<String, ParamValue>,
}

impl EventParams {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a key-value pair (builder pattern).
	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<ParamValue>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	/// Inserts a key-value pair in place.
	pub fn set<K, V>(&mut self, key: K, value: V)
	where
		K: Into<String>,
		V: Into<ParamValue>,
	{
		self.inner.insert(key.into(), value.into());
	}

	/// Inserts the value only when present.
	pub fn insert_opt<K, V>(self, key: K, value: Option<V>) -> Self
	where
		K: Into<String>,
		V: Into<ParamValue>,
	{
		match value {
			Some(v) => self.insert(key, v),
			None => self,
		}
	}

	/// Merges `other` into `self`; keys already present in `self` are kept.
	pub fn merge_missing(mut self, other: EventParams) -> Self {
		for (k, v) in other.inner {
			self.inner.entry(k).or_insert(v);
		}
		self
	}

	pub fn get(&self, key: &str) -> Option<&ParamValue> {
		self.inner.get(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.inner.contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
		self.inner.iter()
	}

	/// Removes every key that is not snake_case and returns the rejected keys.
	pub fn retain_valid_keys(&mut self) -> Vec<String> {
		let rejected: Vec<String> = self
			.inner
			.keys()
			.filter(|k| !is_valid_param_key(k))
			.cloned()
			.collect();
		for key in &rejected {
			self.inner.remove(key);
		}
		rejected
	}
}

/// Closed set of events the site sends.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
	PageView {
		path: String,
		title: Option<String>,
		referrer: Option<String>,
	},
	FunnelStage {
		stage: FunnelStage,
		previous_stage: FunnelStage,
		first_reach: bool,
	},
	Conversion {
		goal_id: String,
		previous_stage: FunnelStage,
	},
	FormStart {
		form_id: String,
		form_type: String,
	},
	FormComplete {
		form_id: String,
		form_type: String,
		goal_id: String,
		elapsed_ms: i64,
		fields_interacted: usize,
	},
	FormAbandon {
		form_id: String,
		form_type: String,
		elapsed_ms: i64,
		fields_touched: Vec<String>,
		last_field: Option<String>,
		reason: String,
	},
	ExperimentExposure {
		test_id: String,
		variant_id: String,
	},
	LeadSubmitted {
		form_type: String,
		lead_score: u32,
	},
	CtaClick {
		cta_id: String,
		location: String,
	},
	ScrollDepth {
		path: String,
		percent: u32,
	},
	OutboundClick {
		url: String,
	},
}

impl EventKind {
	/// The snake_case event name sent to the sink.
	pub fn name(&self) -> &'static str {
		match self {
			EventKind::PageView { .. } => "page_view",
			EventKind::FunnelStage { .. } => "funnel_stage",
			EventKind::Conversion { .. } => "conversion",
			EventKind::FormStart { .. } => "form_start",
			EventKind::FormComplete { .. } => "form_complete",
			EventKind::FormAbandon { .. } => "form_abandon",
			EventKind::ExperimentExposure { .. } => "experiment_exposure",
			EventKind::LeadSubmitted { .. } => "lead_submitted",
			EventKind::CtaClick { .. } => "cta_click",
			EventKind::ScrollDepth { .. } => "scroll_depth",
			EventKind::OutboundClick { .. } => "outbound_click",
		}
	}

	fn typed_params(&self) -> EventParams {
		match self {
			EventKind::PageView {
				path,
				title,
				referrer,
			} => EventParams::new()
				.insert("page_path", path.as_str())
				.insert_opt("page_title", title.clone())
				.insert_opt("page_referrer", referrer.clone()),
			EventKind::FunnelStage {
				stage,
				previous_stage,
				first_reach,
			} => EventParams::new()
				.insert("funnel_stage", stage.as_str())
				.insert("previous_stage", previous_stage.as_str())
				.insert("stage_index", stage.index())
				.insert("first_reach", *first_reach),
			EventKind::Conversion {
				goal_id,
				previous_stage,
			} => EventParams::new()
				.insert("goal_id", goal_id.as_str())
				.insert("previous_stage", previous_stage.as_str()),
			EventKind::FormStart { form_id, form_type } => EventParams::new()
				.insert("form_id", form_id.as_str())
				.insert("form_type", form_type.as_str()),
			EventKind::FormComplete {
				form_id,
				form_type,
				goal_id,
				elapsed_ms,
				fields_interacted,
			} => EventParams::new()
				.insert("form_id", form_id.as_str())
				.insert("form_type", form_type.as_str())
				.insert("goal_id", goal_id.as_str())
				.insert("elapsed_ms", *elapsed_ms)
				.insert("fields_interacted", *fields_interacted),
			EventKind::FormAbandon {
				form_id,
				form_type,
				elapsed_ms,
				fields_touched,
				last_field,
				reason,
			} => EventParams::new()
				.insert("form_id", form_id.as_str())
				.insert("form_type", form_type.as_str())
				.insert("elapsed_ms", *elapsed_ms)
				.insert("fields_touched", fields_touched.join(","))
				.insert("fields_touched_count", fields_touched.len())
				.insert_opt("last_field", last_field.clone())
				.insert("reason", reason.as_str()),
			EventKind::ExperimentExposure {
				test_id,
				variant_id,
			} => EventParams::new()
				.insert("test_id", test_id.as_str())
				.insert("variant_id", variant_id.as_str()),
			EventKind::LeadSubmitted {
				form_type,
				lead_score,
			} => EventParams::new()
				.insert("form_type", form_type.as_str())
				.insert("lead_score", *lead_score),
			EventKind::CtaClick { cta_id, location } => EventParams::new()
				.insert("cta_id", cta_id.as_str())
				.insert("location", location.as_str()),
			EventKind::ScrollDepth { path, percent } => EventParams::new()
				.insert("page_path", path.as_str())
				.insert("percent_scrolled", *percent),
			EventKind::OutboundClick { url } => EventParams::new().insert("link_url", url.as_str()),
		}
	}
}

/// An event ready for dispatch: a typed kind plus optional extra parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingEvent {
	kind: EventKind,
	extra: EventParams,
}

impl TrackingEvent {
	pub fn new(kind: EventKind) -> Self {
		Self {
			kind,
			extra: EventParams::new(),
		}
	}

	/// Attaches extra parameters (builder pattern).
	pub fn with_extra(mut self, extra: EventParams) -> Self {
		self.extra = extra;
		self
	}

	pub fn kind(&self) -> &EventKind {
		&self.kind
	}

	pub fn name(&self) -> &'static str {
		self.kind.name()
	}

	/// Renders the flat parameter map.
	///
	/// Typed fields win over extras on key collision, and extra keys that are
	/// not snake_case are dropped.
	pub fn parameters(&self) -> EventParams {
		let mut extra = self.extra.clone();
		extra.retain_valid_keys();
		self.kind.typed_params().merge_missing(extra)
	}
}

impl From<EventKind> for TrackingEvent {
	fn from(kind: EventKind) -> Self {
		Self::new(kind)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn page_view_renders_snake_case_params() {
		let event = TrackingEvent::new(EventKind::PageView {
			path: "/services".to_string(),
			title: Some("Services".to_string()),
			referrer: None,
		});

		assert_eq!(event.name(), "page_view");
		let params = event.parameters();
		assert_eq!(params.get("page_path"), Some(&ParamValue::from("/services")));
		assert_eq!(params.get("page_title"), Some(&ParamValue::from("Services")));
		assert!(!params.contains_key("page_referrer"));
	}

	#[test]
	fn typed_fields_win_over_extras() {
		let event = TrackingEvent::new(EventKind::Conversion {
			goal_id: "quote-submitted".to_string(),
			previous_stage: FunnelStage::Intent,
		})
		.with_extra(
			EventParams::new()
				.insert("goal_id", "spoofed")
				.insert("value", 500),
		);

		let params = event.parameters();
		assert_eq!(
			params.get("goal_id"),
			Some(&ParamValue::from("quote-submitted"))
		);
		assert_eq!(params.get("value"), Some(&ParamValue::Integer(500)));
	}

	#[test]
	fn invalid_extra_keys_are_dropped() {
		let event = TrackingEvent::new(EventKind::OutboundClick {
			url: "https://example.com".to_string(),
		})
		.with_extra(
			EventParams::new()
				.insert("camelCase", 1)
				.insert("ok_key", 2)
				.insert("9lives", 3),
		);

		let params = event.parameters();
		assert!(params.contains_key("ok_key"));
		assert!(!params.contains_key("camelCase"));
		assert!(!params.contains_key("9lives"));
	}

	#[test]
	fn abandon_lists_touched_fields() {
		let event = TrackingEvent::new(EventKind::FormAbandon {
			form_id: "contact".to_string(),
			form_type: "contact".to_string(),
			elapsed_ms: 4200,
			fields_touched: vec!["email".to_string(), "company".to_string()],
			last_field: Some("company".to_string()),
			reason: "navigation".to_string(),
		});

		let params = event.parameters();
		assert_eq!(
			params.get("fields_touched"),
			Some(&ParamValue::from("email,company"))
		);
		assert_eq!(params.get("fields_touched_count"), Some(&ParamValue::Integer(2)));
	}

	#[test]
	fn params_serialize_as_flat_object() {
		let params = EventParams::new()
			.insert("a", "x")
			.insert("b", 2)
			.insert("c", true)
			.insert("d", 1.5);
		let json = serde_json::to_value(&params).unwrap();
		assert_eq!(json, serde_json::json!({"a": "x", "b": 2, "c": true, "d": 1.5}));
	}

	proptest! {
		#[test]
		fn snake_case_keys_are_valid(key in "[a-z][a-z0-9_]{0,39}") {
			prop_assert!(is_valid_param_key(&key));
		}

		#[test]
		fn keys_with_uppercase_are_invalid(prefix in "[a-z]{0,5}", upper in "[A-Z]", suffix in "[a-z]{0,5}") {
			let key = format!("{prefix}{upper}{suffix}");
			prop_assert!(!is_valid_param_key(&key));
		}

		#[test]
		fn rendered_params_always_have_valid_keys(keys in proptest::collection::vec("[a-zA-Z0-9_-]{1,12}", 0..10)) {
			let mut extra = EventParams::new();
			for key in &keys {
				extra.set(key.clone(), 1);
			}
			let event = TrackingEvent::new(EventKind::CtaClick {
				cta_id: "hero".to_string(),
				location: "header".to_string(),
			})
			.with_extra(extra);

			for (key, _) in event.parameters().iter() {
				prop_assert!(is_valid_param_key(key));
			}
		}
	}
}
