//! Observability for `stagehand`: structured logging initialization.

mod logging;

pub use logging::{LogFormat, init_logging, verbosity_to_directive};
