// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Conversion tracking SDK for the Meridian marketing site.
//!
//! Tracks page views, funnel progression, A/B test exposure and form
//! lifecycles, and forwards events to an analytics sink in the background.
//! No tracking call ever blocks on the network or returns an error to the
//! caller; failures are logged and the event is dropped.
//!
//! # Example
//!
//! ```no_run
//! use meridian_analytics::{load_config, Analytics};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let analytics = Analytics::builder().config(load_config()?).build()?;
//! analytics.initialize();
//!
//! analytics.track_page_view("/services", Some("Services"));
//! if let Some(variant) = analytics.get_variant("hero-cta-test") {
//!     println!("showing variant {}", variant.variant_id);
//! }
//!
//! let mut form = analytics.form_tracker();
//! form.start_tracking("contact-main", "contact");
//! form.track_field_interaction("email", Some("jo@acme.io"));
//! form.track_form_completion("contact-submitted", None);
//!
//! analytics.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod debug_log;
pub mod emitter;
pub mod environment;
pub mod error;
pub mod experiments;
pub mod forms;
pub mod funnel;
pub mod identity;
pub mod page;
pub mod sink;
pub mod submission;

#[cfg(test)]
mod test_support;

pub use batch::{BatchConfig, QueuedEvent};
pub use client::{Analytics, AnalyticsBuilder};
pub use config::{
	load_config, load_config_from, load_from_sources, AnalyticsConfig, AnalyticsConfigLayer,
	ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource,
};
pub use debug_log::DebugLog;
pub use emitter::{EmitterConfig, EventEmitter};
pub use environment::{Environment, JsonFileStore, MemoryEnvironment, SystemEnvironment};
pub use error::{AnalyticsError, ConfigError, Result, StorageError};
pub use experiments::ExperimentManager;
pub use forms::{FieldInteraction, FormOutcome, FormTracker, ValueSummary};
pub use funnel::ConversionFunnel;
pub use identity::IdentityManager;
pub use page::{PageStageRule, PageStageRules, ScrollDepthTracker, SCROLL_THRESHOLDS};
pub use sink::{AnalyticsSink, MeasurementProtocolConfig, MeasurementProtocolSink, NoopSink};
pub use submission::{FormSubmissionClient, FormSubmissionResponse};

pub use meridian_analytics_core::{
	calculate_lead_score, Assignment, BudgetTier, CompanySize, EventKind, EventParams,
	ExperimentConfig, FunnelProgress, FunnelStage, LeadRecord, ParamValue, TrackingEvent, Urgency,
	VariantConfig, VisitorIdentity,
};
