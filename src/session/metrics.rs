// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for token cache activity.
#[derive(Debug, Default)]
pub struct SessionMetrics {
	cache_hits: AtomicU64,
	refreshes_started: AtomicU64,
	refreshes_joined: AtomicU64,
	refresh_failures: AtomicU64,
	invalidations: AtomicU64,
}
impl SessionMetrics {
	/// Returns how many lookups were served from a valid cached token.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Returns how many authentication runs were started.
	pub fn refreshes_started(&self) -> u64 {
		self.refreshes_started.load(Ordering::Relaxed)
	}

	/// Returns how many lookups joined a refresh another caller started.
	pub fn refreshes_joined(&self) -> u64 {
		self.refreshes_joined.load(Ordering::Relaxed)
	}

	/// Returns how many authentication runs failed.
	pub fn refresh_failures(&self) -> u64 {
		self.refresh_failures.load(Ordering::Relaxed)
	}

	/// Returns how many times the cached token was invalidated or disconnected.
	pub fn invalidations(&self) -> u64 {
		self.invalidations.load(Ordering::Relaxed)
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_started(&self) {
		self.refreshes_started.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_joined(&self) {
		self.refreshes_joined.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_failure(&self) {
		self.refresh_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_invalidation(&self) {
		self.invalidations.fetch_add(1, Ordering::Relaxed);
	}
}
