// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::batch::{BatchConfig, QueuedEvent};
use crate::emitter::{EmitterConfig, EventEmitter};
use crate::environment::MemoryEnvironment;
use crate::error::{AnalyticsError, Result};
use crate::identity::IdentityManager;
use crate::sink::AnalyticsSink;

/// Sink that records every batch it accepts.
pub struct RecordingSink {
	batches: Mutex<Vec<Vec<QueuedEvent>>>,
	attempts: AtomicUsize,
	should_fail: AtomicBool,
}

impl RecordingSink {
	pub fn new() -> Self {
		Self {
			batches: Mutex::new(Vec::new()),
			attempts: AtomicUsize::new(0),
			should_fail: AtomicBool::new(false),
		}
	}

	pub fn set_should_fail(&self, fail: bool) {
		self.should_fail.store(fail, Ordering::SeqCst);
	}

	pub fn batches(&self) -> Vec<Vec<QueuedEvent>> {
		self.batches.lock().clone()
	}

	pub fn events(&self) -> Vec<QueuedEvent> {
		self.batches.lock().iter().flatten().cloned().collect()
	}

	pub fn event_names(&self) -> Vec<String> {
		self.events().into_iter().map(|e| e.name).collect()
	}

	pub fn attempts(&self) -> usize {
		self.attempts.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl AnalyticsSink for RecordingSink {
	async fn send_batch(&self, events: Vec<QueuedEvent>) -> Result<()> {
		self.attempts.fetch_add(1, Ordering::SeqCst);
		if self.should_fail.load(Ordering::SeqCst) {
			return Err(AnalyticsError::ServerError {
				status: 500,
				message: "mock failure".to_string(),
			});
		}
		self.batches.lock().push(events);
		Ok(())
	}
}

pub fn t0() -> DateTime<Utc> {
	DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
}

/// An emitter wired to a recording sink and an in-memory environment.
pub struct Harness {
	pub env: Arc<MemoryEnvironment>,
	pub sink: Arc<RecordingSink>,
	pub identity: Arc<IdentityManager>,
	pub emitter: Arc<EventEmitter>,
}

impl Harness {
	pub fn new() -> Self {
		Self::with_config(EmitterConfig {
			batch: BatchConfig {
				max_batch_size: 100,
				flush_interval: std::time::Duration::from_secs(3600),
				..Default::default()
			},
			debug: true,
			debug_log_capacity: 50,
		})
	}

	pub fn with_config(config: EmitterConfig) -> Self {
		let env = Arc::new(MemoryEnvironment::starting_at(t0()));
		let sink = Arc::new(RecordingSink::new());
		let identity = Arc::new(IdentityManager::new(env.clone()));
		let emitter = Arc::new(EventEmitter::new(
			config,
			env.clone(),
			identity.clone(),
			Some(sink.clone() as Arc<dyn AnalyticsSink>),
		));
		Self {
			env,
			sink,
			identity,
			emitter,
		}
	}
}
