// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The event emitter.
//!
//! [`EventEmitter::emit`] is synchronous and never fails. It stamps the event
//! with the visitor and session identity, records it in the debug log when
//! debug mode is on, and hands it to the background [`BatchWorker`] without
//! waiting. Before [`initialize`](EventEmitter::initialize) has succeeded,
//! emitting is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use meridian_analytics_core::TrackingEvent;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::batch::{BatchCommand, BatchConfig, BatchWorker, QueuedEvent};
use crate::debug_log::{DebugLog, DEFAULT_DEBUG_LOG_CAPACITY};
use crate::environment::Environment;
use crate::error::{AnalyticsError, Result};
use crate::identity::IdentityManager;
use crate::sink::AnalyticsSink;

/// Emitter settings.
#[derive(Debug, Clone)]
pub struct EmitterConfig {
	pub batch: BatchConfig,
	/// Record every emitted event in the debug log.
	pub debug: bool,
	pub debug_log_capacity: usize,
}

impl Default for EmitterConfig {
	fn default() -> Self {
		Self {
			batch: BatchConfig::default(),
			debug: false,
			debug_log_capacity: DEFAULT_DEBUG_LOG_CAPACITY,
		}
	}
}

pub struct EventEmitter {
	config: EmitterConfig,
	env: Arc<dyn Environment>,
	identity: Arc<IdentityManager>,
	sink: Option<Arc<dyn AnalyticsSink>>,
	debug_log: DebugLog,
	tx: Mutex<Option<mpsc::Sender<BatchCommand>>>,
	worker: Mutex<Option<JoinHandle<()>>>,
	shut_down: AtomicBool,
	init_failure_logged: AtomicBool,
}

impl EventEmitter {
	pub fn new(
		config: EmitterConfig,
		env: Arc<dyn Environment>,
		identity: Arc<IdentityManager>,
		sink: Option<Arc<dyn AnalyticsSink>>,
	) -> Self {
		let debug_log = DebugLog::new(config.debug_log_capacity);
		Self {
			config,
			env,
			identity,
			sink,
			debug_log,
			tx: Mutex::new(None),
			worker: Mutex::new(None),
			shut_down: AtomicBool::new(false),
			init_failure_logged: AtomicBool::new(false),
		}
	}

	/// Starts the background worker.
	///
	/// Safe to call any number of times: only the first successful call
	/// spawns a worker. Returns whether the emitter is running. Failures are
	/// logged once and leave the emitter as a no-op.
	pub fn initialize(&self) -> bool {
		match self.start() {
			Ok(()) => true,
			Err(e) => {
				if !self.init_failure_logged.swap(true, Ordering::SeqCst) {
					warn!(error = %e, "analytics disabled, events will not be sent");
				}
				false
			}
		}
	}

	fn start(&self) -> Result<()> {
		let mut tx = self.tx.lock();
		if tx.is_some() {
			return Ok(());
		}
		if self.shut_down.load(Ordering::SeqCst) {
			return Err(AnalyticsError::ClientShutdown);
		}
		let sink = self.sink.clone().ok_or(AnalyticsError::MissingSink)?;
		let handle = Handle::try_current().map_err(|_| AnalyticsError::NoRuntime)?;

		let (sender, worker) = BatchWorker::channel(self.config.batch.clone(), sink, self.env.clone());
		*self.worker.lock() = Some(handle.spawn(worker.run()));
		*tx = Some(sender);

		info!(debug = self.config.debug, "analytics emitter initialized");
		Ok(())
	}

	pub fn is_initialized(&self) -> bool {
		self.tx.lock().is_some()
	}

	pub fn is_debug(&self) -> bool {
		self.config.debug
	}

	/// Queues an event for delivery. Never blocks and never fails.
	pub fn emit(&self, event: impl Into<TrackingEvent>) {
		let event = event.into();
		let tx = self.sender();
		if tx.is_none() && !self.config.debug {
			debug!(event_name = %event.name(), "analytics not initialized, event dropped");
			return;
		}

		let identity = self.identity.identity();
		let queued = QueuedEvent {
			client_id: identity.visitor_id.to_string(),
			session_id: identity.session_id.to_string(),
			name: event.name().to_string(),
			params: event.parameters(),
			timestamp: self.env.now(),
		};

		if self.config.debug {
			debug!(
				event_name = %queued.name,
				params = ?queued.params,
				"analytics event"
			);
			self.debug_log.push(queued.clone());
		}

		let Some(tx) = tx else {
			debug!(event_name = %queued.name, "analytics not initialized, event dropped");
			return;
		};

		match tx.try_send(BatchCommand::Enqueue(queued)) {
			Ok(()) => {}
			Err(mpsc::error::TrySendError::Full(BatchCommand::Enqueue(e))) => {
				warn!(event_name = %e.name, "analytics queue full, event dropped");
			}
			Err(mpsc::error::TrySendError::Closed(_)) => {
				warn!("analytics worker stopped, event dropped");
			}
			Err(mpsc::error::TrySendError::Full(_)) => {}
		}
	}

	fn sender(&self) -> Option<mpsc::Sender<BatchCommand>> {
		self.tx.lock().clone()
	}

	/// Flushes queued events and waits for the attempt to finish.
	///
	/// A no-op before initialization.
	pub async fn flush(&self) -> Result<()> {
		let Some(tx) = self.sender() else {
			if self.shut_down.load(Ordering::SeqCst) {
				return Err(AnalyticsError::ClientShutdown);
			}
			return Ok(());
		};

		let (done, wait) = oneshot::channel();
		tx.send(BatchCommand::Flush(done))
			.await
			.map_err(|_| AnalyticsError::ClientShutdown)?;
		wait.await.map_err(|_| AnalyticsError::ClientShutdown)
	}

	/// Flushes and stops the worker. Further events are dropped.
	pub async fn shutdown(&self) {
		self.shut_down.store(true, Ordering::SeqCst);
		let tx = self.tx.lock().take();
		let worker = self.worker.lock().take();

		if let Some(tx) = tx {
			let (done, wait) = oneshot::channel();
			if tx.send(BatchCommand::Shutdown(done)).await.is_ok() {
				let _ = wait.await;
			}
		}
		if let Some(worker) = worker {
			if let Err(e) = worker.await {
				warn!(error = %e, "analytics worker task failed");
			}
			info!("analytics emitter shut down");
		}
	}

	/// Events recorded while debug mode is on, oldest first.
	pub fn debug_events(&self) -> Vec<QueuedEvent> {
		self.debug_log.entries()
	}

	pub fn debug_log(&self) -> &DebugLog {
		&self.debug_log
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::environment::MemoryEnvironment;
	use crate::identity::{SESSION_KEY, VISITOR_KEY};
	use crate::test_support::{Harness, RecordingSink};
	use chrono::Duration;
	use meridian_analytics_core::{EventKind, EventParams, ParamValue};

	fn cta(id: &str) -> EventKind {
		EventKind::CtaClick {
			cta_id: id.to_string(),
			location: "hero".to_string(),
		}
	}

	#[test]
	fn emit_before_initialize_is_a_noop() {
		let h = Harness::new();
		h.emitter.emit(cta("book-call"));
		assert!(!h.emitter.is_initialized());
		assert_eq!(h.sink.attempts(), 0);
		assert_eq!(h.emitter.debug_events().len(), 1);
	}

	#[test]
	fn flush_before_initialize_is_ok() {
		let h = Harness::new();
		h.emitter.emit(cta("book-call"));
		let result = tokio_test::block_on(h.emitter.flush());
		assert!(result.is_ok());
		assert_eq!(h.sink.attempts(), 0);
	}

	#[test]
	fn initialize_outside_runtime_degrades() {
		let h = Harness::new();
		assert!(!h.emitter.initialize());
		assert!(!h.emitter.initialize());
		h.emitter.emit(cta("book-call"));
	}

	#[test]
	fn initialize_without_sink_degrades() {
		let env = Arc::new(MemoryEnvironment::new());
		let identity = Arc::new(IdentityManager::new(env.clone()));
		let emitter = EventEmitter::new(EmitterConfig::default(), env, identity, None);

		let runtime = tokio::runtime::Builder::new_current_thread()
			.build()
			.unwrap();
		let _guard = runtime.enter();
		assert!(!emitter.initialize());
		assert!(matches!(emitter.start(), Err(AnalyticsError::MissingSink)));
	}

	#[tokio::test]
	async fn events_reach_sink_with_identity() {
		let h = Harness::new();
		assert!(h.emitter.initialize());

		h.emitter.emit(cta("book-call"));
		h.emitter.flush().await.unwrap();

		let events = h.sink.events();
		assert_eq!(events.len(), 1);
		let event = &events[0];
		assert_eq!(event.name, "cta_click");
		assert_eq!(event.client_id, h.identity.visitor_id().to_string());
		assert_eq!(event.session_id, h.identity.session_id().to_string());
		assert_eq!(event.timestamp, h.env.now());
		assert_eq!(
			event.params.get("cta_id"),
			Some(&ParamValue::from("book-call"))
		);
	}

	#[tokio::test]
	async fn initialize_is_idempotent() {
		let h = Harness::new();
		assert!(h.emitter.initialize());
		assert!(h.emitter.initialize());
		assert!(h.emitter.initialize());

		h.emitter.emit(cta("once"));
		h.emitter.flush().await.unwrap();

		assert_eq!(h.sink.events().len(), 1);
		h.emitter.shutdown().await;
	}

	#[tokio::test]
	async fn sink_failure_never_surfaces() {
		let h = Harness::new();
		h.sink.set_should_fail(true);
		h.emitter.initialize();

		h.emitter.emit(cta("lost"));
		h.emitter.flush().await.unwrap();

		assert_eq!(h.sink.attempts(), 1);
		assert!(h.sink.events().is_empty());
	}

	#[tokio::test]
	async fn shutdown_flushes_and_stops() {
		let h = Harness::new();
		h.emitter.initialize();
		h.emitter.emit(cta("last"));
		h.emitter.shutdown().await;

		assert_eq!(h.sink.event_names(), vec!["cta_click"]);

		h.emitter.emit(cta("late"));
		assert!(!h.emitter.initialize());
		assert!(matches!(
			h.emitter.flush().await,
			Err(AnalyticsError::ClientShutdown)
		));
		assert_eq!(h.sink.events().len(), 1);

		h.emitter.shutdown().await;
	}

	#[tokio::test]
	async fn events_after_idle_carry_new_session() {
		let h = Harness::new();
		h.emitter.initialize();

		h.emitter.emit(cta("before"));
		h.env.advance(Duration::minutes(31));
		h.emitter.emit(cta("after"));
		h.emitter.flush().await.unwrap();

		let events = h.sink.events();
		assert_eq!(events.len(), 2);
		assert_ne!(events[0].session_id, events[1].session_id);
		assert_eq!(events[0].client_id, events[1].client_id);
	}

	#[test]
	fn debug_log_is_bounded() {
		let h = Harness::with_config(EmitterConfig {
			debug: true,
			debug_log_capacity: 2,
			..Default::default()
		});
		for id in ["a", "b", "c"] {
			h.emitter.emit(cta(id));
		}

		let ids: Vec<_> = h
			.emitter
			.debug_events()
			.into_iter()
			.filter_map(|e| e.params.get("cta_id").cloned())
			.collect();
		assert_eq!(ids, vec![ParamValue::from("b"), ParamValue::from("c")]);
	}

	#[test]
	fn uninitialized_emit_leaves_identity_untouched() {
		let h = Harness::with_config(EmitterConfig::default());
		h.emitter.emit(cta("early"));

		assert_eq!(h.env.get_item(SESSION_KEY).unwrap(), None);
		assert_eq!(h.env.get_item(VISITOR_KEY).unwrap(), None);
	}

	#[test]
	fn debug_log_disabled_records_nothing() {
		let h = Harness::with_config(EmitterConfig::default());
		h.emitter.emit(cta("quiet"));
		assert!(h.emitter.debug_events().is_empty());
	}

	#[tokio::test]
	async fn full_queue_drops_without_blocking() {
		let sink = Arc::new(RecordingSink::new());
		let env = Arc::new(MemoryEnvironment::new());
		let identity = Arc::new(IdentityManager::new(env.clone()));
		let emitter = EventEmitter::new(
			EmitterConfig {
				batch: BatchConfig {
					channel_capacity: 1,
					..Default::default()
				},
				..Default::default()
			},
			env,
			identity,
			Some(sink.clone() as Arc<dyn AnalyticsSink>),
		);
		emitter.initialize();

		// The current-thread runtime cannot drain while this loop runs.
		for i in 0..10 {
			emitter.emit(TrackingEvent::new(cta("spam")).with_extra(EventParams::new().insert("n", i)));
		}
		emitter.flush().await.unwrap();

		assert!(sink.events().len() < 10);
		assert!(!sink.events().is_empty());
	}
}
