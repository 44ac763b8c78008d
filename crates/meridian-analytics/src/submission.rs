// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lead submission to the site's form endpoint.
//!
//! Unlike the trackers, submission is a user-facing action whose outcome the
//! form has to show, so errors are returned rather than swallowed.

use std::sync::Arc;
use std::time::Duration;

use meridian_analytics_core::{calculate_lead_score_with, EventKind, LeadRecord, ScoringWeights};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::emitter::EventEmitter;
use crate::error::{AnalyticsError, Result};

const FORMS_PATH: &str = "/api/forms";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionRequest<'a> {
	#[serde(flatten)]
	lead: &'a LeadRecord,
	lead_score: u32,
}

/// The endpoint's reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmissionResponse {
	pub success: bool,
	#[serde(default)]
	pub lead_score: Option<u32>,
	#[serde(default)]
	pub message: Option<String>,
}

pub struct FormSubmissionClient {
	base_url: String,
	http: reqwest::Client,
	weights: ScoringWeights,
	emitter: Option<Arc<EventEmitter>>,
}

impl FormSubmissionClient {
	pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
		let base_url = base_url.into();
		if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
			return Err(AnalyticsError::InvalidBaseUrl);
		}
		let http = meridian_common_http::new_client_with_timeout(request_timeout)?;
		Ok(Self {
			base_url: base_url.trim_end_matches('/').to_string(),
			http,
			weights: ScoringWeights::default(),
			emitter: None,
		})
	}

	pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
		self.weights = weights;
		self
	}

	/// Emit `lead_submitted` after a successful submission.
	pub fn with_emitter(mut self, emitter: Arc<EventEmitter>) -> Self {
		self.emitter = Some(emitter);
		self
	}

	pub fn score(&self, lead: &LeadRecord) -> u32 {
		calculate_lead_score_with(lead, &self.weights)
	}

	/// Scores and posts `lead`.
	pub async fn submit(&self, lead: &LeadRecord) -> Result<FormSubmissionResponse> {
		let lead_score = self.score(lead);
		let url = format!("{}{FORMS_PATH}", self.base_url);
		debug!(form_type = %lead.form_type, lead_score, "submitting lead");

		let response = self
			.http
			.post(&url)
			.json(&SubmissionRequest { lead, lead_score })
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			let message = response.text().await.unwrap_or_default();
			error!(status = status.as_u16(), message = %message, "form endpoint rejected lead");
			return Err(AnalyticsError::ServerError {
				status: status.as_u16(),
				message,
			});
		}

		let body: FormSubmissionResponse = response.json().await?;
		if body.success {
			info!(form_type = %lead.form_type, lead_score, "lead submitted");
			if let Some(emitter) = &self.emitter {
				emitter.emit(EventKind::LeadSubmitted {
					form_type: lead.form_type.clone(),
					lead_score: body.lead_score.unwrap_or(lead_score),
				});
			}
		} else {
			debug!(message = ?body.message, "form endpoint declined lead");
		}
		Ok(body)
	}
}
