//! Token cache and single-flight refresh coordination.
//!
//! [`TokenSession`] holds at most one cached token. When the token is missing or expired, the
//! first caller starts an authentication run and stores it as a shared future; every caller that
//! arrives before it finishes awaits that same future and observes the same result. The state lock
//! is only held for bookkeeping and never across an `.await`.

mod metrics;

pub use metrics::SessionMetrics;

// std
use std::sync::Weak;
// crates.io
use futures::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{AuthResult, CachedToken},
};

/// Source of the current instant.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current UTC instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall-clock [`Clock`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Arc<CachedToken>>>>;

struct InFlight {
	epoch: u64,
	future: RefreshFuture,
}

#[derive(Default)]
struct SessionState {
	token: Option<Arc<CachedToken>>,
	in_flight: Option<InFlight>,
	epoch: u64,
}

/// Per-gateway token cache with single-flight refresh.
#[derive(Clone)]
pub struct TokenSession {
	state: Arc<Mutex<SessionState>>,
	clock: Arc<dyn Clock>,
	validity: Duration,
	metrics: Arc<SessionMetrics>,
}
impl TokenSession {
	/// Creates an empty session whose tokens stay valid for `validity`.
	pub fn new(clock: Arc<dyn Clock>, validity: Duration) -> Self {
		Self { state: Default::default(), clock, validity, metrics: Default::default() }
	}

	/// Shared counters for this session.
	pub fn metrics(&self) -> &Arc<SessionMetrics> {
		&self.metrics
	}

	/// Returns the cached token if it is still valid.
	pub fn cached(&self) -> Option<Arc<CachedToken>> {
		let now = self.clock.now();

		self.state.lock().token.as_ref().filter(|token| token.is_valid_at(now)).cloned()
	}

	/// Returns `true` while an authentication run is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().in_flight.is_some()
	}

	/// Returns a valid token, authenticating at most once across concurrent callers.
	///
	/// `authenticate` is only invoked by the caller that starts a refresh; it must build the
	/// future without blocking because it runs under the state lock. The refresh keeps running
	/// for later joiners even if the caller that started it goes away.
	pub async fn get_or_refresh<F, Fut>(&self, authenticate: F) -> Result<Arc<CachedToken>>
	where
		F: FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = Result<AuthResult>>,
	{
		let future = {
			let mut state = self.state.lock();
			let now = self.clock.now();

			if let Some(token) = state.token.as_ref().filter(|token| token.is_valid_at(now)) {
				self.metrics.record_cache_hit();

				return Ok(token.clone());
			}

			state.token = None;

			match state.in_flight.as_ref() {
				Some(in_flight) => {
					self.metrics.record_refresh_joined();

					in_flight.future.clone()
				},
				None => {
					state.epoch += 1;

					let epoch = state.epoch;
					let future = self.refresh_future(epoch, authenticate());

					state.in_flight = Some(InFlight { epoch, future: future.clone() });
					self.metrics.record_refresh_started();

					future
				},
			}
		};

		future.await
	}

	/// Drops the cached token; a refresh already in flight is left alone.
	pub fn invalidate(&self) {
		self.state.lock().token = None;
		self.metrics.record_invalidation();
	}

	/// Drops the cached token and detaches any in-flight refresh.
	///
	/// Callers already awaiting the detached refresh still receive its result, but it is never
	/// written back, so the next lookup always authenticates again.
	pub fn disconnect(&self) {
		let mut state = self.state.lock();

		state.token = None;
		state.in_flight = None;
		self.metrics.record_invalidation();
	}

	/// The future is stored inside the state it writes back to, so it only holds a [`Weak`].
	fn refresh_future<Fut>(&self, epoch: u64, authenticate: Fut) -> RefreshFuture
	where
		Fut: 'static + Send + Future<Output = Result<AuthResult>>,
	{
		let state: Weak<Mutex<SessionState>> = Arc::downgrade(&self.state);
		let clock = self.clock.clone();
		let metrics = self.metrics.clone();
		let validity = self.validity;

		async move {
			let outcome = authenticate
				.await
				.map(|result| Arc::new(CachedToken::from_auth(result, clock.now(), validity)));

			if let Some(state) = state.upgrade() {
				let mut state = state.lock();

				if state.in_flight.as_ref().is_some_and(|in_flight| in_flight.epoch == epoch) {
					state.in_flight = None;
					state.token = outcome.as_ref().ok().cloned();
				}
			}
			if outcome.is_err() {
				metrics.record_refresh_failure();
			}

			outcome
		}
		.boxed()
		.shared()
	}
}
impl Debug for TokenSession {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("TokenSession")
			.field("token", &state.token)
			.field("refreshing", &state.in_flight.is_some())
			.field("validity", &self.validity)
			.finish()
	}
}
