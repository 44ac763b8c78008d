// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Visitor and session identity.
//!
//! The visitor id is created once and kept forever. The session id lives
//! under a sliding expiry: every successful read pushes the expiry out by the
//! session timeout, and a read after the expiry starts a new session.
//!
//! When storage is unavailable both fall back to values held for the
//! lifetime of this manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use meridian_analytics_core::{
	default_session_timeout, SessionId, StoredSession, VisitorId, VisitorIdentity,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::environment::Environment;
use crate::error::StorageError;

pub const VISITOR_KEY: &str = "meridian.visitor_id";
pub const SESSION_KEY: &str = "meridian.session";

/// Derives and persists the visitor and session identifiers.
pub struct IdentityManager {
	env: Arc<dyn Environment>,
	session_timeout: Duration,
	visitor_cache: Mutex<Option<VisitorId>>,
	session_cache: Mutex<Option<StoredSession>>,
	storage_warned: AtomicBool,
}

impl IdentityManager {
	pub fn new(env: Arc<dyn Environment>) -> Self {
		Self::with_timeout(env, default_session_timeout())
	}

	pub fn with_timeout(env: Arc<dyn Environment>, session_timeout: Duration) -> Self {
		Self {
			env,
			session_timeout,
			visitor_cache: Mutex::new(None),
			session_cache: Mutex::new(None),
			storage_warned: AtomicBool::new(false),
		}
	}

	pub fn session_timeout(&self) -> Duration {
		self.session_timeout
	}

	fn warn_storage(&self, op: &str, error: &StorageError) {
		if !self.storage_warned.swap(true, Ordering::SeqCst) {
			warn!(op, error = %error, "identity storage unavailable, falling back to in-memory identifiers");
		} else {
			debug!(op, error = %error, "identity storage unavailable");
		}
	}

	/// Returns the visitor id, creating and persisting it on first use.
	pub fn visitor_id(&self) -> VisitorId {
		let persisted = match self.env.get_item(VISITOR_KEY) {
			Ok(Some(raw)) => match raw.parse::<VisitorId>() {
				Ok(id) => Some(id),
				Err(e) => {
					warn!(error = %e, "stored visitor id is corrupt, replacing it");
					None
				}
			},
			Ok(None) => None,
			Err(e) => {
				self.warn_storage("read_visitor", &e);
				return *self.visitor_cache.lock().get_or_insert_with(VisitorId::new);
			}
		};

		let mut cache = self.visitor_cache.lock();
		if let Some(id) = persisted {
			*cache = Some(id);
			return id;
		}

		let id = *cache.get_or_insert_with(VisitorId::new);
		match self.env.set_item(VISITOR_KEY, &id.to_string()) {
			Ok(()) => debug!(visitor_id = %id, "created visitor id"),
			Err(e) => self.warn_storage("write_visitor", &e),
		}
		id
	}

	/// Returns the current session id, rotating it after inactivity and
	/// sliding its expiry.
	pub fn session_id(&self) -> SessionId {
		self.refresh_session().0.id
	}

	/// Returns the refreshed session and whether it was newly started.
	pub fn refresh_session(&self) -> (StoredSession, bool) {
		let now = self.env.now();
		let persisted = match self.env.get_item(SESSION_KEY) {
			Ok(Some(raw)) => match serde_json::from_str::<StoredSession>(&raw) {
				Ok(session) => Some(session),
				Err(e) => {
					warn!(error = %e, "stored session is corrupt, starting a new one");
					None
				}
			},
			Ok(None) => None,
			Err(e) => {
				self.warn_storage("read_session", &e);
				None
			}
		};

		let mut cache = self.session_cache.lock();
		let current = match (persisted, *cache) {
			(Some(p), Some(c)) => Some(if c.expires_at > p.expires_at { c } else { p }),
			(p, c) => p.or(c),
		};

		let (next, started) = match current {
			Some(session) => session.refresh(now, self.session_timeout),
			None => (StoredSession::start(now, self.session_timeout), true),
		};
		*cache = Some(next);
		drop(cache);

		if started {
			debug!(session_id = %next.id, "started new session");
		}

		match serde_json::to_string(&next) {
			Ok(raw) => {
				if let Err(e) = self.env.set_item(SESSION_KEY, &raw) {
					self.warn_storage("write_session", &e);
				}
			}
			Err(e) => warn!(error = %e, "failed to serialize session"),
		}

		(next, started)
	}

	/// Returns the full identity, refreshing the session.
	pub fn identity(&self) -> VisitorIdentity {
		let visitor_id = self.visitor_id();
		let (session, _) = self.refresh_session();
		VisitorIdentity {
			visitor_id,
			session_id: session.id,
			session_expiry: session.expires_at,
		}
	}
}
