//! Convenience re-exports for common shutdown-system usage

pub use crate::closer::Closer;
pub use crate::errors::CloserError;
pub use crate::signal::ShutdownSignal;
pub use crate::types::CloseFn;

// Re-export centralized config
pub use config::CloserConfig;
