//! Error types for the shutdown coordinator

use thiserror::Error;

use crate::signal::ShutdownSignal;

#[derive(Error, Debug)]
pub enum CloserError {
    #[error("closer is already closed, callback rejected")]
    AlreadyClosed,

    #[error("unknown shutdown signal: {0}")]
    UnknownSignal(String),

    #[error("failed to listen for {signal}: {source}")]
    Signal {
        signal: ShutdownSignal,
        source: std::io::Error,
    },
}
