//! Graceful shutdown for services built on the platform
//!
//! A [`Closer`] collects cleanup callbacks (closing pools, flushing buffers)
//! and runs them all once at teardown, either when asked to or when the
//! process receives one of the configured signals.

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

pub mod closer;
pub mod errors;
pub mod prelude;
pub mod signal;
pub mod types;

// Re-export centralized config
pub use config::CloserConfig;

pub use closer::{global, Closer};
pub use errors::CloserError;
pub use signal::ShutdownSignal;
pub use types::CloseFn;
