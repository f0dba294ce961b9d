//! Debug-only usage warnings.
//!
//! Warnings about recoverable misuse are emitted through `tracing` and
//! compiled out of release builds.

/// Emit a usage warning in debug builds.
macro_rules! dev_warn {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            tracing::warn!($($arg)*);
        }
    };
}

pub(crate) use dev_warn;
