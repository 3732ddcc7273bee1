//! Monotonic millisecond clock for dispatch timestamps. Wall time may step;
//! issued timestamps never go backwards.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::StoreError;

/// Backwards steps larger than this are reported instead of absorbed.
const MAX_REGRESSION_MS: u64 = 60_000;

#[derive(Debug)]
pub struct MonotonicClock {
    origin_ms: u64,
    last_ms: u64,
}

impl MonotonicClock {
    /// # Errors
    /// Fails with `BrokenClockState` when wall time predates the Unix epoch.
    pub fn new() -> Result<Self, StoreError> {
        let now = wall_ms()?;
        Ok(Self { origin_ms: now, last_ms: now })
    }

    /// Milliseconds since the Unix epoch, clamped to be non-decreasing.
    ///
    /// # Errors
    /// `CorruptedEpoch` when wall time has stepped far behind the clock's
    /// origin; `BrokenClockState` when it has stepped far behind the last
    /// issued timestamp.
    pub fn now_ms(&mut self) -> Result<u64, StoreError> {
        let wall = wall_ms()?;
        if wall + MAX_REGRESSION_MS < self.origin_ms {
            return Err(StoreError::CorruptedEpoch(format!(
                "wall time {wall} predates the clock origin {}",
                self.origin_ms
            )));
        }
        if wall + MAX_REGRESSION_MS < self.last_ms {
            return Err(StoreError::BrokenClockState(format!(
                "wall time {wall} regressed behind the last timestamp {}",
                self.last_ms
            )));
        }
        self.last_ms = self.last_ms.max(wall);
        Ok(self.last_ms)
    }
}

fn wall_ms() -> Result<u64, StoreError> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| StoreError::BrokenClockState(format!("wall time predates the epoch: {e}")))?;
    u64::try_from(since_epoch.as_millis())
        .map_err(|_| StoreError::BrokenClockState("wall time overflows u64 ms".into()))
}
