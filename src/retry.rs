//! Bounded retries for transient token-endpoint failures.
//!
//! Only the authentication path is retried here. The executor's 401 handling is a separate,
//! single re-authentication and never goes through this policy.

// self
use crate::{
	_prelude::*,
	obs::{self, Operation},
};

/// Retry policy wrapped around each logical authentication attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Additional attempts after the first one.
	pub max_retries: u32,
	/// Fixed pause between attempts.
	pub pause: Duration,
	/// Case-insensitive body marker that flags an HTTP 400 as transient.
	pub transient_marker: String,
}
impl RetryPolicy {
	/// Default number of additional attempts.
	pub const DEFAULT_MAX_RETRIES: u32 = 2;
	/// Default pause between attempts.
	pub const DEFAULT_PAUSE: Duration = Duration::seconds(1);
	/// Default transient marker.
	pub const DEFAULT_TRANSIENT_MARKER: &'static str = "retry your request";

	/// Policy that never retries.
	pub fn disabled() -> Self {
		Self { max_retries: 0, ..Self::default() }
	}

	/// Overrides the number of additional attempts.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Overrides the pause between attempts; negative values clamp to zero.
	pub fn with_pause(mut self, pause: Duration) -> Self {
		self.pause = if pause.is_negative() { Duration::ZERO } else { pause };

		self
	}

	/// Overrides the transient marker.
	pub fn with_transient_marker(mut self, marker: impl Into<String>) -> Self {
		self.transient_marker = marker.into();

		self
	}

	/// Returns `true` for HTTP 400 bodies that carry the transient marker.
	pub fn is_transient_response(&self, status: u16, body: &str) -> bool {
		status == 400
			&& body.to_ascii_lowercase().contains(&self.transient_marker.to_ascii_lowercase())
	}

	/// Returns `true` for token-endpoint failures classified as transient.
	pub fn is_transient(&self, error: &Error) -> bool {
		matches!(error, Error::AuthEndpoint { transient: true, .. })
	}

	/// Runs `attempt` until it succeeds, fails permanently, or retries run out.
	///
	/// The closure receives the zero-based attempt number. The last error surfaces unchanged.
	pub async fn run<F, Fut, T>(&self, mut attempt: F) -> Result<T>
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut current = 0;

		loop {
			match attempt(current).await {
				Ok(value) => return Ok(value),
				Err(e) if current < self.max_retries && self.is_transient(&e) => {
					current += 1;

					obs::record_retry(Operation::Authenticate, current, &e);

					if self.pause.is_positive() {
						let pause = std::time::Duration::try_from(self.pause).unwrap_or_default();

						tokio::time::sleep(pause).await;
					}
				},
				Err(e) => return Err(e),
			}
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: Self::DEFAULT_MAX_RETRIES,
			pause: Self::DEFAULT_PAUSE,
			transient_marker: Self::DEFAULT_TRANSIENT_MARKER.into(),
		}
	}
}
