use std::time::Duration;

use crate::embedder::Embedder;
use crate::error::Result;

pub const DEFAULT_INIT_ATTEMPTS: u32 = 3;
pub const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Delay before retry number `attempt` (1-based): `attempt × base`.
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

/// Run `embedder.init()` up to `attempts` times, backing off linearly between tries.
///
/// # Errors
///
/// Returns the error of the final attempt once all attempts are exhausted.
pub async fn init_with_retry<E: Embedder>(
    embedder: &E,
    attempts: u32,
    base_delay: Duration,
) -> Result<usize> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match embedder.init().await {
            Ok(dims) => {
                tracing::info!(embedder = embedder.name(), dims, attempt, "embedder ready");
                return Ok(dims);
            }
            Err(e) if attempt >= attempts => {
                tracing::error!(
                    embedder = embedder.name(),
                    attempts,
                    "embedder init failed: {e}"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = backoff_delay(base_delay, attempt);
                tracing::warn!(
                    embedder = embedder.name(),
                    "init failed, retrying in {}ms ({attempt}/{attempts}): {e}",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
