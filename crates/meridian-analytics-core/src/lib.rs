// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Meridian site analytics.
//!
//! This crate holds everything about conversion tracking that does not touch
//! storage, clocks or the network. It is used by the `meridian-analytics`
//! client SDK.
//!
//! # Overview
//!
//! - A closed event taxonomy ([`EventKind`]) rendered to snake_case params
//! - The five-stage conversion funnel state machine ([`FunnelState`])
//! - A/B experiment definitions with deterministic bucketing ([`bucket`])
//! - Lead records and weighted lead scoring ([`calculate_lead_score`])
//! - Visitor and session identifier types
//!
//! # Example
//!
//! ```
//! use meridian_analytics_core::{
//!     bucket, calculate_lead_score, BudgetTier, ExperimentConfig, LeadRecord, VariantConfig,
//! };
//!
//! let experiment = ExperimentConfig::new(
//!     "hero-cta-test",
//!     vec![VariantConfig::new("A", 0.5), VariantConfig::new("B", 0.5)],
//! );
//! let variant = experiment.select(bucket("visitor-1", &experiment.id)).unwrap();
//! assert!(variant.id == "A" || variant.id == "B");
//!
//! let lead = LeadRecord::new("cto@acme.io", "quote").with_budget(BudgetTier::Over100k);
//! assert_eq!(calculate_lead_score(&lead), 50);
//! ```

pub mod error;
pub mod event;
pub mod experiment;
pub mod funnel;
pub mod identity;
pub mod lead;

pub use error::{CoreError, Result};
pub use event::{is_valid_param_key, EventKind, EventParams, ParamValue, TrackingEvent};
pub use experiment::{bucket, bucket_key, Assignment, ExperimentConfig, VariantConfig};
pub use funnel::{FunnelProgress, FunnelStage, FunnelState, StageTransition, StageVisit};
pub use identity::{
	default_session_timeout, SessionId, StoredSession, VisitorId, VisitorIdentity,
	DEFAULT_SESSION_TIMEOUT_SECS,
};
pub use lead::{
	calculate_lead_score, calculate_lead_score_with, BudgetTier, CompanySize, LeadRecord,
	ScoringWeights, Urgency, FREE_MAIL_DOMAINS, MAX_LEAD_SCORE,
};
