//! Utility functions shared across the engine crate.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Maximum size accepted for an encoded event payload.
pub const MAX_EVENT_PAYLOAD_SIZE: usize = 32_768;

/// Deserialize CBOR data with a size limit to prevent oversized payloads.
pub fn cbor_from_limited_reader<T: DeserializeOwned>(
    data: &[u8],
    max_bytes: usize,
) -> EngineResult<T> {
    if data.len() > max_bytes {
        return Err(EngineError::Validation(format!(
            "CBOR payload too large: {} bytes (max {})",
            data.len(),
            max_bytes
        )));
    }
    ciborium::from_reader(data)
        .map_err(|e| EngineError::Validation(format!("CBOR deserialization failed: {e}")))
}

/// Run `op` with bounded exponential backoff.
///
/// The delay starts at `initial_delay_ms`, doubles each attempt, and gets
/// up to 25% random jitter so colliding retries fan out. Returns the last
/// error once `max_retries` attempts have failed; the caller decides how
/// exhaustion surfaces (admission paths map it to `Timeout`).
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    max_retries: u32,
    initial_delay_ms: u64,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut delay_ms = initial_delay_ms;
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= max_retries {
                    warn!("{} failed after {} attempts: {}", label, attempt, e);
                    return Err(e);
                }
                let jitter = rand::thread_rng().gen_range(0..=delay_ms / 4 + 1);
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = delay_ms.saturating_mul(2);
            }
        }
    }
}
