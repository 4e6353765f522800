//! Maps `Box<dyn Error>` from trait boundaries to typed `SweepError`.
//!
//! The traits in `sweep_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `sweep_hardware::HwError` downcasting.

use crate::error::SweepError;

/// Map a trait-boundary error to a typed `SweepError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> SweepError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<sweep_hardware::error::HwError>() {
            return match hw {
                sweep_hardware::error::HwError::Timeout => SweepError::Timeout,
                other => SweepError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        SweepError::Timeout
    } else {
        SweepError::Hardware(s)
    }
}
