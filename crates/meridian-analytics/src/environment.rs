// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host environment capabilities: persisted key-value storage, the current
//! time, and connectivity.
//!
//! Everything the SDK would otherwise read from browser globals goes through
//! [`Environment`], so the trackers run the same against a real profile
//! directory ([`SystemEnvironment`]) and in tests ([`MemoryEnvironment`]).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::StorageError;

/// Capabilities the analytics SDK needs from its host.
///
/// Storage has no TTL support; expiry is enforced by callers comparing stored
/// timestamps against [`now`](Environment::now).
pub trait Environment: Send + Sync {
	fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
	fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
	fn remove_item(&self, key: &str) -> Result<(), StorageError>;
	fn now(&self) -> DateTime<Utc>;
	fn is_online(&self) -> bool;
}

/// In-memory environment with a manual clock.
pub struct MemoryEnvironment {
	items: Mutex<HashMap<String, String>>,
	now: Mutex<DateTime<Utc>>,
	online: AtomicBool,
	storage_disabled: AtomicBool,
}

impl Default for MemoryEnvironment {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryEnvironment {
	pub fn new() -> Self {
		Self::starting_at(Utc::now())
	}

	pub fn starting_at(now: DateTime<Utc>) -> Self {
		Self {
			items: Mutex::new(HashMap::new()),
			now: Mutex::new(now),
			online: AtomicBool::new(true),
			storage_disabled: AtomicBool::new(false),
		}
	}

	pub fn set_now(&self, now: DateTime<Utc>) {
		*self.now.lock() = now;
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock();
		*now += by;
	}

	pub fn set_online(&self, online: bool) {
		self.online.store(online, Ordering::SeqCst);
	}

	/// Makes every storage call fail with [`StorageError::Unavailable`].
	pub fn set_storage_disabled(&self, disabled: bool) {
		self.storage_disabled.store(disabled, Ordering::SeqCst);
	}

	fn check_storage(&self) -> Result<(), StorageError> {
		if self.storage_disabled.load(Ordering::SeqCst) {
			Err(StorageError::Unavailable)
		} else {
			Ok(())
		}
	}
}

impl Environment for MemoryEnvironment {
	fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
		self.check_storage()?;
		Ok(self.items.lock().get(key).cloned())
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.check_storage()?;
		self.items.lock().insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove_item(&self, key: &str) -> Result<(), StorageError> {
		self.check_storage()?;
		self.items.lock().remove(key);
		Ok(())
	}

	fn now(&self) -> DateTime<Utc> {
		*self.now.lock()
	}

	fn is_online(&self) -> bool {
		self.online.load(Ordering::SeqCst)
	}
}

/// Key-value store persisted as a single JSON object on disk.
///
/// The whole map is cached in memory and written through on every change.
pub struct JsonFileStore {
	path: PathBuf,
	items: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
	/// Opens the store at `path`. A missing file is an empty store.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let path = path.into();
		let items = match std::fs::read_to_string(&path) {
			Ok(content) if content.trim().is_empty() => BTreeMap::new(),
			Ok(content) => serde_json::from_str(&content)
				.map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
			Err(e) => return Err(StorageError::Io(e)),
		};

		debug!(path = %path.display(), entries = items.len(), "opened analytics store");
		Ok(Self {
			path,
			items: Mutex::new(items),
		})
	}

	/// `~/.local/share/meridian/analytics.json` (or the platform equivalent).
	pub fn default_path() -> Option<PathBuf> {
		dirs::data_dir().map(|dir| dir.join("meridian").join("analytics.json"))
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
		if let Some(parent) = self.path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let content =
			serde_json::to_string_pretty(items).map_err(|e| StorageError::Corrupt(e.to_string()))?;
		let tmp = self.path.with_extension("json.tmp");
		std::fs::write(&tmp, content)?;
		std::fs::rename(&tmp, &self.path)?;
		Ok(())
	}

	pub fn get(&self, key: &str) -> Option<String> {
		self.items.lock().get(key).cloned()
	}

	pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		let mut items = self.items.lock();
		items.insert(key.to_string(), value.to_string());
		self.persist(&items)
	}

	pub fn remove(&self, key: &str) -> Result<(), StorageError> {
		let mut items = self.items.lock();
		if items.remove(key).is_some() {
			self.persist(&items)?;
		}
		Ok(())
	}
}

/// Wall-clock environment backed by an optional [`JsonFileStore`].
///
/// Without a store every storage call reports [`StorageError::Unavailable`],
/// which the trackers treat as "fall back to process-lifetime identifiers".
pub struct SystemEnvironment {
	store: Option<JsonFileStore>,
	online: AtomicBool,
}

impl SystemEnvironment {
	pub fn new(store: Option<JsonFileStore>) -> Self {
		Self {
			store,
			online: AtomicBool::new(true),
		}
	}

	/// Opens the store at `path`, degrading to no storage if it cannot be
	/// opened.
	pub fn open(path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		match JsonFileStore::open(&path) {
			Ok(store) => Self::new(Some(store)),
			Err(e) => {
				warn!(path = %path.display(), error = %e, "analytics storage unavailable, using ephemeral identifiers");
				Self::new(None)
			}
		}
	}

	/// Opens the store at the default data path.
	pub fn open_default() -> Self {
		match JsonFileStore::default_path() {
			Some(path) => Self::open(path),
			None => {
				warn!("no data directory, using ephemeral identifiers");
				Self::new(None)
			}
		}
	}

	pub fn set_online(&self, online: bool) {
		self.online.store(online, Ordering::SeqCst);
	}

	fn store(&self) -> Result<&JsonFileStore, StorageError> {
		self.store.as_ref().ok_or(StorageError::Unavailable)
	}
}

impl Environment for SystemEnvironment {
	fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.store()?.get(key))
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.store()?.set(key, value)
	}

	fn remove_item(&self, key: &str) -> Result<(), StorageError> {
		self.store()?.remove(key)
	}

	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}

	fn is_online(&self) -> bool {
		self.online.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn memory_environment_roundtrip() {
		let env = MemoryEnvironment::new();
		env.set_item("k", "v").unwrap();
		assert_eq!(env.get_item("k").unwrap(), Some("v".to_string()));
		env.remove_item("k").unwrap();
		assert_eq!(env.get_item("k").unwrap(), None);
	}

	#[test]
	fn memory_environment_clock_advances() {
		let t0 = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
		let env = MemoryEnvironment::starting_at(t0);
		env.advance(Duration::minutes(5));
		assert_eq!(env.now(), t0 + Duration::minutes(5));
	}

	#[test]
	fn disabled_storage_fails() {
		let env = MemoryEnvironment::new();
		env.set_storage_disabled(true);
		assert!(matches!(env.get_item("k"), Err(StorageError::Unavailable)));
		assert!(matches!(env.set_item("k", "v"), Err(StorageError::Unavailable)));
	}

	#[test]
	fn json_store_persists_across_opens() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("analytics.json");

		let store = JsonFileStore::open(&path).unwrap();
		store.set("meridian.visitor_id", "abc").unwrap();
		drop(store);

		let reopened = JsonFileStore::open(&path).unwrap();
		assert_eq!(reopened.get("meridian.visitor_id"), Some("abc".to_string()));

		reopened.remove("meridian.visitor_id").unwrap();
		let again = JsonFileStore::open(&path).unwrap();
		assert_eq!(again.get("meridian.visitor_id"), None);
	}

	#[test]
	fn corrupt_store_is_reported() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("analytics.json");
		std::fs::write(&path, "not json").unwrap();

		assert!(matches!(
			JsonFileStore::open(&path),
			Err(StorageError::Corrupt(_))
		));
	}

	#[test]
	fn system_environment_without_store_is_unavailable() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("analytics.json");
		std::fs::write(&path, "[1, 2]").unwrap();

		let env = SystemEnvironment::open(&path);
		assert!(matches!(env.get_item("k"), Err(StorageError::Unavailable)));
		assert!(env.is_online());
	}
}
