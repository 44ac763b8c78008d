// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! A/B test variant assignment.
//!
//! A visitor is bucketed into a variant the first time a page asks for a
//! test, and the assignment is persisted before it is returned. After that
//! the stored assignment is returned unchanged, even if the experiment's
//! weights change or it is removed from config.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use meridian_analytics_core::{bucket, bucket_key, Assignment, EventKind, ExperimentConfig};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::emitter::EventEmitter;
use crate::environment::Environment;
use crate::error::StorageError;
use crate::identity::IdentityManager;

const ASSIGNMENT_KEY_PREFIX: &str = "meridian.ab.";

pub fn assignment_key(test_id: &str) -> String {
	format!("{ASSIGNMENT_KEY_PREFIX}{test_id}")
}

pub struct ExperimentManager {
	env: Arc<dyn Environment>,
	identity: Arc<IdentityManager>,
	emitter: Option<Arc<EventEmitter>>,
	experiments: RwLock<HashMap<String, ExperimentConfig>>,
	/// Assignments made or read during this process, used when storage fails.
	assigned: Mutex<HashMap<String, Assignment>>,
	storage_warned: AtomicBool,
}

impl ExperimentManager {
	pub fn new(
		env: Arc<dyn Environment>,
		identity: Arc<IdentityManager>,
		emitter: Option<Arc<EventEmitter>>,
	) -> Self {
		Self {
			env,
			identity,
			emitter,
			experiments: RwLock::new(HashMap::new()),
			assigned: Mutex::new(HashMap::new()),
			storage_warned: AtomicBool::new(false),
		}
	}

	/// Registers or replaces an experiment. Invalid experiments are rejected.
	pub fn register(&self, experiment: ExperimentConfig) -> meridian_analytics_core::Result<()> {
		experiment.validate()?;
		info!(
			test_id = %experiment.id,
			variants = experiment.variants.len(),
			"registered experiment"
		);
		self.experiments
			.write()
			.insert(experiment.id.clone(), experiment);
		Ok(())
	}

	pub fn experiment(&self, test_id: &str) -> Option<ExperimentConfig> {
		self.experiments.read().get(test_id).cloned()
	}

	fn warn_storage(&self, test_id: &str, error: &StorageError) {
		if !self.storage_warned.swap(true, Ordering::SeqCst) {
			warn!(test_id, error = %error, "assignment storage unavailable, keeping assignments in memory");
		} else {
			debug!(test_id, error = %error, "assignment storage unavailable");
		}
	}

	fn load(&self, test_id: &str, visitor_id: &str) -> Option<Assignment> {
		match self.env.get_item(&assignment_key(test_id)) {
			Ok(Some(raw)) => match serde_json::from_str::<Assignment>(&raw) {
				Ok(a) if a.visitor_id == visitor_id && a.test_id == test_id => Some(a),
				Ok(_) => {
					debug!(test_id, "stored assignment belongs to another visitor");
					None
				}
				Err(e) => {
					warn!(test_id, error = %e, "stored assignment is corrupt, reassigning");
					None
				}
			},
			Ok(None) => None,
			Err(e) => {
				self.warn_storage(test_id, &e);
				None
			}
		}
	}

	fn persist(&self, assignment: &Assignment) {
		let raw = match serde_json::to_string(assignment) {
			Ok(raw) => raw,
			Err(e) => {
				warn!(test_id = %assignment.test_id, error = %e, "failed to serialize assignment");
				return;
			}
		};
		if let Err(e) = self.env.set_item(&assignment_key(&assignment.test_id), &raw) {
			self.warn_storage(&assignment.test_id, &e);
		}
	}

	/// Returns the visitor's variant for `test_id`.
	///
	/// An existing assignment always wins. Otherwise the visitor is bucketed,
	/// the assignment persisted, and an `experiment_exposure` event emitted.
	/// Returns `None` when the test is not configured; callers fall back to
	/// their default content.
	pub fn get_variant(&self, test_id: &str) -> Option<Assignment> {
		let visitor_id = self.identity.visitor_id().to_string();

		let mut assigned = self.assigned.lock();
		if let Some(existing) = assigned.get(test_id).filter(|a| a.visitor_id == visitor_id) {
			return Some(existing.clone());
		}
		if let Some(stored) = self.load(test_id, &visitor_id) {
			assigned.insert(test_id.to_string(), stored.clone());
			return Some(stored);
		}

		let experiment = match self.experiment(test_id) {
			Some(experiment) => experiment,
			None => {
				debug!(test_id, "unknown experiment");
				return None;
			}
		};
		let variant = experiment.select(bucket(&visitor_id, test_id))?;
		let assignment = Assignment::new(&experiment, variant, &visitor_id);

		self.persist(&assignment);
		assigned.insert(test_id.to_string(), assignment.clone());
		drop(assigned);

		debug!(
			test_id,
			variant_id = %assignment.variant_id,
			bucket_key = %bucket_key(&visitor_id, test_id),
			"assigned experiment variant"
		);
		if let Some(emitter) = &self.emitter {
			emitter.emit(EventKind::ExperimentExposure {
				test_id: assignment.test_id.clone(),
				variant_id: assignment.variant_id.clone(),
			});
		}

		Some(assignment)
	}

	/// The variant id only, for callers that branch on it.
	pub fn variant_id(&self, test_id: &str) -> Option<String> {
		self.get_variant(test_id).map(|a| a.variant_id)
	}
}
