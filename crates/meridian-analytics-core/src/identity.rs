// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Visitor and session identifiers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sessions expire after this many seconds without activity.
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 30 * 60;

/// The default inactivity timeout as a [`Duration`].
pub fn default_session_timeout() -> Duration {
	Duration::seconds(DEFAULT_SESSION_TIMEOUT_SECS)
}

/// Stable, opaque identifier for a browser profile. 128 bits of randomness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitorId(pub Uuid);

impl VisitorId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for VisitorId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for VisitorId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for VisitorId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Identifier for one engagement period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for SessionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for SessionId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Session record as persisted in client storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
	pub id: SessionId,
	pub expires_at: DateTime<Utc>,
}

/// Saturates at the largest representable instant.
fn expiry_after(now: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
	now.checked_add_signed(timeout).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl StoredSession {
	pub fn start(now: DateTime<Utc>, timeout: Duration) -> Self {
		Self {
			id: SessionId::new(),
			expires_at: expiry_after(now, timeout),
		}
	}

	/// A session is expired once `now` is strictly past its expiry.
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		now > self.expires_at
	}

	/// Returns the session that should be used at `now`: the same id with a
	/// slid expiry, or a fresh session if this one expired. The flag is true
	/// when a new session was started.
	pub fn refresh(self, now: DateTime<Utc>, timeout: Duration) -> (Self, bool) {
		if self.is_expired(now) {
			(Self::start(now, timeout), true)
		} else {
			(
				Self {
					id: self.id,
					expires_at: expiry_after(now, timeout),
				},
				false,
			)
		}
	}
}

/// The identity attached to every dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorIdentity {
	pub visitor_id: VisitorId,
	pub session_id: SessionId,
	pub session_expiry: DateTime<Utc>,
}
