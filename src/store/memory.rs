//! Thread-safe in-memory [`IssuanceStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{AuditRecord, IssuanceStore, RateLimitKey, RateLimitRecord, StoreFuture},
};

type CounterMap = Arc<RwLock<HashMap<RateLimitKey, u64>>>;
type AuditLog = Arc<Mutex<Vec<AuditRecord>>>;

/// Storage backend that keeps counters and audit rows in-process for tests and demos.
///
/// Increments run under a single write lock, which gives the same merge-on-conflict guarantee a
/// database upsert provides across processes.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	counters: CounterMap,
	audit: AuditLog,
}
impl MemoryStore {
	/// Returns the current counter for `key`, if any request was seen.
	pub fn count(&self, key: &RateLimitKey) -> Option<u64> {
		self.counters.read().get(key).copied()
	}

	/// Returns a snapshot of every audit row written so far.
	pub fn audit_records(&self) -> Vec<AuditRecord> {
		self.audit.lock().clone()
	}

	fn increment_now(map: CounterMap, key: RateLimitKey) -> RateLimitRecord {
		let mut guard = map.write();
		let count = guard.entry(key.clone()).and_modify(|count| *count += 1).or_insert(1);

		RateLimitRecord { key, count: *count }
	}
}
impl IssuanceStore for MemoryStore {
	fn increment_rate_limit<'a>(
		&'a self,
		key: &'a RateLimitKey,
	) -> StoreFuture<'a, RateLimitRecord> {
		let map = self.counters.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(Self::increment_now(map, key)) })
	}

	fn insert_audit(&self, record: AuditRecord) -> StoreFuture<'_, ()> {
		let log = self.audit.clone();

		Box::pin(async move {
			log.lock().push(record);

			Ok(())
		})
	}
}
