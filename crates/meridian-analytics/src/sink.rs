// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Analytics sinks: where batched events end up.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

use crate::batch::QueuedEvent;
use crate::error::{AnalyticsError, Result};
use meridian_analytics_core::{EventParams, ParamValue};

/// The measurement protocol accepts at most this many events per request.
pub const MAX_EVENTS_PER_REQUEST: usize = 25;

/// Receives batches of events from the emitter's worker.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
	/// Send a batch of events. Errors are logged by the caller and the batch
	/// is dropped.
	async fn send_batch(&self, events: Vec<QueuedEvent>) -> Result<()>;
}

/// Discards everything. Useful when analytics is disabled by config.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl AnalyticsSink for NoopSink {
	async fn send_batch(&self, events: Vec<QueuedEvent>) -> Result<()> {
		debug!(count = events.len(), "noop sink discarded events");
		Ok(())
	}
}

/// Connection settings for [`MeasurementProtocolSink`].
#[derive(Clone)]
pub struct MeasurementProtocolConfig {
	pub endpoint: String,
	pub measurement_id: String,
	pub api_secret: String,
	pub request_timeout: Duration,
}

impl std::fmt::Debug for MeasurementProtocolConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MeasurementProtocolConfig")
			.field("endpoint", &self.endpoint)
			.field("measurement_id", &self.measurement_id)
			.field("api_secret", &"[REDACTED]")
			.field("request_timeout", &self.request_timeout)
			.finish()
	}
}

#[derive(Debug, Serialize)]
struct MeasurementPayload<'a> {
	client_id: &'a str,
	timestamp_micros: i64,
	events: Vec<MeasurementEvent<'a>>,
}

#[derive(Debug, Serialize)]
struct MeasurementEvent<'a> {
	name: &'a str,
	timestamp_micros: i64,
	params: EventParams,
}

/// Posts events in the GA4 measurement-protocol shape:
/// `{client_id, events: [{name, timestamp_micros, params}]}`.
pub struct MeasurementProtocolSink {
	config: MeasurementProtocolConfig,
	http: reqwest::Client,
}

impl MeasurementProtocolSink {
	pub fn new(config: MeasurementProtocolConfig) -> Result<Self> {
		if !(config.endpoint.starts_with("http://") || config.endpoint.starts_with("https://")) {
			return Err(AnalyticsError::InvalidBaseUrl);
		}
		let http = meridian_common_http::builder()
			.timeout(config.request_timeout)
			.build()?;
		Ok(Self { config, http })
	}

	async fn post(&self, payload: &MeasurementPayload<'_>) -> Result<()> {
		let response = self
			.http
			.post(self.config.endpoint.trim_end_matches('/'))
			.query(&[
				("measurement_id", self.config.measurement_id.as_str()),
				("api_secret", self.config.api_secret.as_str()),
			])
			.json(payload)
			.send()
			.await?;

		let status = response.status();
		if status.is_success() {
			debug!(
				client_id = %payload.client_id,
				count = payload.events.len(),
				"sent analytics events"
			);
			Ok(())
		} else {
			let message = response.text().await.unwrap_or_default();
			error!(status = status.as_u16(), message = %message, "analytics endpoint rejected events");
			Err(AnalyticsError::ServerError {
				status: status.as_u16(),
				message,
			})
		}
	}
}

/// Groups events by client id, keeping first-seen order.
fn group_by_client(events: &[QueuedEvent]) -> Vec<(&str, Vec<&QueuedEvent>)> {
	let mut groups: Vec<(&str, Vec<&QueuedEvent>)> = Vec::new();
	for event in events {
		match groups.iter_mut().find(|(id, _)| *id == event.client_id) {
			Some((_, group)) => group.push(event),
			None => groups.push((event.client_id.as_str(), vec![event])),
		}
	}
	groups
}

fn wire_params(event: &QueuedEvent) -> EventParams {
	let mut params = event.params.clone();
	params.set("session_id", ParamValue::from(event.session_id.as_str()));
	params
}

#[async_trait]
impl AnalyticsSink for MeasurementProtocolSink {
	async fn send_batch(&self, events: Vec<QueuedEvent>) -> Result<()> {
		let mut first_error = None;

		for (client_id, group) in group_by_client(&events) {
			for chunk in group.chunks(MAX_EVENTS_PER_REQUEST) {
				let payload = MeasurementPayload {
					client_id,
					timestamp_micros: chunk[0].timestamp.timestamp_micros(),
					events: chunk
						.iter()
						.map(|e| MeasurementEvent {
							name: e.name.as_str(),
							timestamp_micros: e.timestamp.timestamp_micros(),
							params: wire_params(e),
						})
						.collect(),
				};
				if let Err(e) = self.post(&payload).await {
					first_error.get_or_insert(e);
				}
			}
		}

		match first_error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}
}
