//! Execution context for platform operations
//!
//! A [`Context`] carries cancellation, an optional deadline and a chain of
//! typed values through a call chain. Database and cache operations take a
//! `&Context` so that callers can bound how long they block, and so that an
//! active transaction can travel implicitly to nested data-access calls.

pub mod context;
pub mod errors;

pub use crate::context::{CancelHandle, Context};
pub use crate::errors::ContextError;
