//! Maps `Box<dyn Error>` from trait boundaries to typed errors.
//!
//! The traits in `loadcell_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to `ScaleError`/`StoreError`, with an optional feature-gated path
//! for `loadcell_hardware::HwError` downcasting.

use crate::error::{ScaleError, StoreError};

/// Map a sample-source error to a typed `ScaleError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics so a timeout is never mistaken for a fault.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ScaleError {
    #[cfg(feature = "hardware-errors")]
    {
        use loadcell_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::DataReadyTimeout => ScaleError::Timeout,
                HwError::Disconnected => ScaleError::Disconnected,
                HwError::NoFreeStateMachine(_) => ScaleError::NoFreeStateMachine,
                other => ScaleError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        ScaleError::Timeout
    } else if lower.contains("disconnected") {
        ScaleError::Disconnected
    } else {
        ScaleError::Hardware(s)
    }
}

/// Block-storage failures keep their message; the store never retries.
pub fn map_storage_error(e: &(dyn std::error::Error + 'static)) -> StoreError {
    StoreError::Storage(e.to_string())
}
