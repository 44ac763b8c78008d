// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event batching and background flush for the analytics SDK.
//!
//! The emitter never waits on the network: it hands events to a bounded
//! channel and a [`BatchWorker`] task drains it. Delivery is best effort.
//! A batch the sink rejects is logged and dropped, never retried.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use meridian_analytics_core::EventParams;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::environment::Environment;
use crate::sink::AnalyticsSink;

/// Configuration for the event batch queue.
#[derive(Debug, Clone)]
pub struct BatchConfig {
	/// Maximum number of events to batch before flushing.
	pub max_batch_size: usize,
	/// Interval between automatic flushes.
	pub flush_interval: Duration,
	/// Maximum number of events held while offline before dropping oldest.
	pub max_queue_size: usize,
	/// Capacity of the channel between emitter and worker.
	pub channel_capacity: usize,
}

impl Default for BatchConfig {
	fn default() -> Self {
		Self {
			max_batch_size: 25,
			flush_interval: Duration::from_secs(5),
			max_queue_size: 500,
			channel_capacity: 1024,
		}
	}
}

/// An event waiting to be sent, with the identity it was emitted under.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
	pub client_id: String,
	pub session_id: String,
	pub name: String,
	pub params: EventParams,
	pub timestamp: DateTime<Utc>,
}

/// Command sent to the background worker.
#[derive(Debug)]
pub enum BatchCommand {
	/// Queue a new event.
	Enqueue(QueuedEvent),
	/// Flush now and acknowledge once the flush attempt has finished.
	Flush(oneshot::Sender<()>),
	/// Flush, acknowledge, and stop.
	Shutdown(oneshot::Sender<()>),
}

/// Drains the command channel and forwards batches to the sink.
pub struct BatchWorker {
	config: BatchConfig,
	sink: Arc<dyn AnalyticsSink>,
	env: Arc<dyn Environment>,
	rx: mpsc::Receiver<BatchCommand>,
	buffer: VecDeque<QueuedEvent>,
}

impl BatchWorker {
	pub fn new(
		config: BatchConfig,
		sink: Arc<dyn AnalyticsSink>,
		env: Arc<dyn Environment>,
		rx: mpsc::Receiver<BatchCommand>,
	) -> Self {
		Self {
			config,
			sink,
			env,
			rx,
			buffer: VecDeque::new(),
		}
	}

	/// Creates the channel and worker pair.
	pub fn channel(
		config: BatchConfig,
		sink: Arc<dyn AnalyticsSink>,
		env: Arc<dyn Environment>,
	) -> (mpsc::Sender<BatchCommand>, Self) {
		let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
		(tx, Self::new(config, sink, env, rx))
	}

	fn push(&mut self, event: QueuedEvent) {
		while self.buffer.len() >= self.config.max_queue_size.max(1) {
			if let Some(dropped) = self.buffer.pop_front() {
				warn!(
					event_name = %dropped.name,
					client_id = %dropped.client_id,
					"Dropped event due to queue overflow"
				);
			}
		}
		self.buffer.push_back(event);
	}

	/// Sends everything buffered, unless the host is offline.
	async fn flush(&mut self) {
		if self.buffer.is_empty() {
			return;
		}
		if !self.env.is_online() {
			debug!(queued = self.buffer.len(), "offline, deferring analytics flush");
			return;
		}

		let batch_size = self.config.max_batch_size.max(1);
		while !self.buffer.is_empty() {
			let take = batch_size.min(self.buffer.len());
			let batch: Vec<QueuedEvent> = self.buffer.drain(..take).collect();
			let count = batch.len();
			debug!(count, "Flushing event batch");
			if let Err(e) = self.sink.send_batch(batch).await {
				warn!(error = %e, count, "Failed to send analytics batch, dropping it");
			}
		}
	}

	/// Runs until shutdown or until every sender is dropped.
	pub async fn run(mut self) {
		info!(
			flush_interval_ms = self.config.flush_interval.as_millis() as u64,
			max_batch_size = self.config.max_batch_size,
			"Starting analytics batch worker"
		);

		let period = self.config.flush_interval.max(Duration::from_millis(1));
		let mut ticker = tokio::time::interval(period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		ticker.tick().await;

		loop {
			tokio::select! {
				command = self.rx.recv() => match command {
					Some(BatchCommand::Enqueue(event)) => {
						self.push(event);
						if self.buffer.len() >= self.config.max_batch_size {
							self.flush().await;
						}
					}
					Some(BatchCommand::Flush(done)) => {
						self.flush().await;
						let _ = done.send(());
					}
					Some(BatchCommand::Shutdown(done)) => {
						self.flush().await;
						let _ = done.send(());
						break;
					}
					None => {
						self.flush().await;
						break;
					}
				},
				_ = ticker.tick() => self.flush().await,
			}
		}

		if !self.buffer.is_empty() {
			warn!(dropped = self.buffer.len(), "analytics worker stopped with undelivered events");
		}
		info!("Analytics batch worker stopped");
	}
}
