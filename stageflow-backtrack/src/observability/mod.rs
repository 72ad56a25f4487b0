//! Observability utilities.

mod logging;

pub use logging::{init_tracing, LogConfig, LogFormat, LOG_ENV_VAR};
