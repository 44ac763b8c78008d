// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded in-memory log of emitted events for local diagnostics.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::batch::QueuedEvent;

/// Default number of events kept.
pub const DEFAULT_DEBUG_LOG_CAPACITY: usize = 200;

/// A ring buffer of recently emitted events.
///
/// When the buffer is full the oldest entry is evicted. Cloning shares the
/// underlying buffer.
#[derive(Clone)]
pub struct DebugLog {
	inner: Arc<DebugLogInner>,
}

struct DebugLogInner {
	entries: RwLock<VecDeque<QueuedEvent>>,
	capacity: usize,
}

impl DebugLog {
	pub fn new(capacity: usize) -> Self {
		Self {
			inner: Arc::new(DebugLogInner {
				entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
				capacity,
			}),
		}
	}

	pub fn with_default_capacity() -> Self {
		Self::new(DEFAULT_DEBUG_LOG_CAPACITY)
	}

	pub fn push(&self, event: QueuedEvent) {
		if self.inner.capacity == 0 {
			return;
		}
		let mut entries = self.inner.entries.write();
		if entries.len() >= self.inner.capacity {
			entries.pop_front();
		}
		entries.push_back(event);
	}

	/// Snapshot of the buffered events, oldest first.
	pub fn entries(&self) -> Vec<QueuedEvent> {
		self.inner.entries.read().iter().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.inner.entries.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.entries.read().is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}
}

impl Default for DebugLog {
	fn default() -> Self {
		Self::with_default_capacity()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use meridian_analytics_core::EventParams;

	fn event(name: &str) -> QueuedEvent {
		QueuedEvent {
			client_id: "v".to_string(),
			session_id: "s".to_string(),
			name: name.to_string(),
			params: EventParams::new(),
			timestamp: Utc::now(),
		}
	}

	#[test]
	fn evicts_oldest_when_full() {
		let log = DebugLog::new(3);
		for i in 0..5 {
			log.push(event(&format!("e{i}")));
		}

		let names: Vec<_> = log.entries().into_iter().map(|e| e.name).collect();
		assert_eq!(names, vec!["e2", "e3", "e4"]);
		assert_eq!(log.len(), 3);
	}

	#[test]
	fn clones_share_entries() {
		let log = DebugLog::new(10);
		let other = log.clone();
		log.push(event("page_view"));
		assert_eq!(other.len(), 1);
		assert_eq!(other.entries()[0].name, "page_view");
	}

	#[test]
	fn zero_capacity_keeps_nothing() {
		let log = DebugLog::new(0);
		log.push(event("page_view"));
		assert!(log.is_empty());
	}
}
