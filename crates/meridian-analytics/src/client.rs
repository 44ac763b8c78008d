// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The [`Analytics`] composition root.
//!
//! The host builds one `Analytics` at startup, calls
//! [`initialize`](Analytics::initialize), hands clones to whatever needs to
//! track, and calls [`shutdown`](Analytics::shutdown) on exit. Nothing is
//! looked up globally.

use std::sync::Arc;

use meridian_analytics_core::{
	Assignment, EventKind, EventParams, FunnelStage, LeadRecord, TrackingEvent, VisitorIdentity,
};
use tracing::{info, warn};

use crate::config::AnalyticsConfig;
use crate::emitter::EventEmitter;
use crate::environment::{Environment, SystemEnvironment};
use crate::error::{AnalyticsError, Result};
use crate::experiments::ExperimentManager;
use crate::forms::FormTracker;
use crate::funnel::ConversionFunnel;
use crate::identity::IdentityManager;
use crate::page::{PageStageRules, ScrollDepthTracker};
use crate::sink::{AnalyticsSink, MeasurementProtocolSink};
use crate::submission::{FormSubmissionClient, FormSubmissionResponse};

pub struct AnalyticsBuilder {
	config: AnalyticsConfig,
	env: Option<Arc<dyn Environment>>,
	sink: Option<Arc<dyn AnalyticsSink>>,
	page_rules: Option<PageStageRules>,
}

impl AnalyticsBuilder {
	pub fn new() -> Self {
		Self {
			config: AnalyticsConfig::default(),
			env: None,
			sink: None,
			page_rules: None,
		}
	}

	pub fn config(mut self, config: AnalyticsConfig) -> Self {
		self.config = config;
		self
	}

	/// Defaults to a [`SystemEnvironment`] at the configured storage path.
	pub fn environment(mut self, env: Arc<dyn Environment>) -> Self {
		self.env = Some(env);
		self
	}

	/// Overrides the sink derived from the measurement-protocol settings.
	pub fn sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
		self.sink = Some(sink);
		self
	}

	pub fn page_rules(mut self, rules: PageStageRules) -> Self {
		self.page_rules = Some(rules);
		self
	}

	pub fn build(self) -> Result<Analytics> {
		let config = self.config;

		let env: Arc<dyn Environment> = match self.env {
			Some(env) => env,
			None => Arc::new(match &config.storage_path {
				Some(path) => SystemEnvironment::open(path),
				None => SystemEnvironment::open_default(),
			}),
		};

		let sink: Option<Arc<dyn AnalyticsSink>> = match (self.sink, config.measurement_protocol()) {
			(Some(sink), _) => Some(sink),
			(None, Some(mp)) => Some(Arc::new(MeasurementProtocolSink::new(mp)?)),
			(None, None) => None,
		};

		let identity = Arc::new(IdentityManager::with_timeout(
			env.clone(),
			config.session_timeout(),
		));
		let emitter = Arc::new(EventEmitter::new(
			config.emitter_config(),
			env.clone(),
			identity.clone(),
			sink,
		));
		let funnel = Arc::new(ConversionFunnel::new(env.clone(), emitter.clone()));

		let experiments = Arc::new(ExperimentManager::new(
			env.clone(),
			identity.clone(),
			Some(emitter.clone()),
		));
		for experiment in config.experiments.iter().cloned() {
			let id = experiment.id.clone();
			if let Err(e) = experiments.register(experiment) {
				warn!(test_id = %id, error = %e, "skipping invalid experiment");
			}
		}

		let forms = match &config.forms_base_url {
			Some(url) => Some(Arc::new(
				FormSubmissionClient::new(url.as_str(), config.request_timeout())?
					.with_emitter(emitter.clone()),
			)),
			None => None,
		};

		let page_rules = self.page_rules.unwrap_or_else(|| config.page_rules());

		info!(
			debug = config.debug,
			experiments = config.experiments.len(),
			"analytics client built"
		);

		Ok(Analytics {
			inner: Arc::new(AnalyticsInner {
				config,
				env,
				identity,
				emitter,
				funnel,
				experiments,
				forms,
				page_rules,
				scroll: ScrollDepthTracker::new(),
			}),
		})
	}
}

impl Default for AnalyticsBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct AnalyticsInner {
	config: AnalyticsConfig,
	env: Arc<dyn Environment>,
	identity: Arc<IdentityManager>,
	emitter: Arc<EventEmitter>,
	funnel: Arc<ConversionFunnel>,
	experiments: Arc<ExperimentManager>,
	forms: Option<Arc<FormSubmissionClient>>,
	page_rules: PageStageRules,
	scroll: ScrollDepthTracker,
}

/// Site analytics. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Analytics {
	inner: Arc<AnalyticsInner>,
}

impl Analytics {
	pub fn builder() -> AnalyticsBuilder {
		AnalyticsBuilder::new()
	}

	/// Starts event delivery. Idempotent; see [`EventEmitter::initialize`].
	pub fn initialize(&self) -> bool {
		self.inner.emitter.initialize()
	}

	pub fn config(&self) -> &AnalyticsConfig {
		&self.inner.config
	}

	pub fn identity(&self) -> VisitorIdentity {
		self.inner.identity.identity()
	}

	pub fn emitter(&self) -> &Arc<EventEmitter> {
		&self.inner.emitter
	}

	pub fn funnel(&self) -> &Arc<ConversionFunnel> {
		&self.inner.funnel
	}

	pub fn experiments(&self) -> &Arc<ExperimentManager> {
		&self.inner.experiments
	}

	/// Emits an arbitrary event.
	pub fn track(&self, event: impl Into<TrackingEvent>) {
		self.inner.emitter.emit(event);
	}

	/// Records a navigation: emits `page_view`, then advances the funnel to
	/// the stage the path implies.
	pub fn track_page_view(&self, path: &str, title: Option<&str>) {
		self.track_page_view_with_referrer(path, title, None);
	}

	pub fn track_page_view_with_referrer(
		&self,
		path: &str,
		title: Option<&str>,
		referrer: Option<&str>,
	) {
		let (_, new_session) = self.inner.identity.refresh_session();
		if new_session {
			info!(path, "new analytics session");
		}

		self.inner.emitter.emit(EventKind::PageView {
			path: path.to_string(),
			title: title.map(str::to_string),
			referrer: referrer.map(str::to_string),
		});

		if let Some(stage) = self.inner.page_rules.stage_for(path) {
			self.inner
				.funnel
				.track_stage(stage, Some(EventParams::new().insert("page_path", path)));
		}
	}

	pub fn track_stage(&self, stage: FunnelStage, data: Option<EventParams>) {
		self.inner.funnel.track_stage(stage, data);
	}

	pub fn track_conversion(&self, goal_id: &str, data: Option<EventParams>) {
		self.inner.funnel.track_conversion(goal_id, data);
	}

	pub fn track_cta_click(&self, cta_id: &str, location: &str) {
		self.inner.emitter.emit(EventKind::CtaClick {
			cta_id: cta_id.to_string(),
			location: location.to_string(),
		});
	}

	/// Emits one `scroll_depth` event per newly crossed threshold.
	pub fn track_scroll_depth(&self, path: &str, percent: u32) {
		for threshold in self.inner.scroll.record(path, percent) {
			self.inner.emitter.emit(EventKind::ScrollDepth {
				path: path.to_string(),
				percent: threshold,
			});
		}
	}

	pub fn track_outbound_click(&self, url: &str) {
		self.inner.emitter.emit(EventKind::OutboundClick {
			url: url.to_string(),
		});
	}

	pub fn get_variant(&self, test_id: &str) -> Option<Assignment> {
		self.inner.experiments.get_variant(test_id)
	}

	/// A tracker for one form lifecycle. Completion records a conversion.
	pub fn form_tracker(&self) -> FormTracker {
		FormTracker::new(self.inner.env.clone(), self.inner.emitter.clone())
			.with_funnel(self.inner.funnel.clone())
	}

	/// Scores and submits a lead to the form endpoint.
	pub async fn submit_lead(&self, lead: &LeadRecord) -> Result<FormSubmissionResponse> {
		let forms = self
			.inner
			.forms
			.as_ref()
			.ok_or(AnalyticsError::InvalidBaseUrl)?;
		forms.submit(lead).await
	}

	pub async fn flush(&self) -> Result<()> {
		self.inner.emitter.flush().await
	}

	/// Flushes pending events and stops the worker.
	pub async fn shutdown(&self) {
		self.inner.emitter.shutdown().await;
	}
}
