//! Observability module providing structured logging.

mod tracing_init;

pub use tracing_init::*;
