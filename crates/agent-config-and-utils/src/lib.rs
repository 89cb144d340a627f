//! Core types, configuration, and utilities for the edge agent.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, MalformedLines, DEFAULT_AGENT_ID, DEFAULT_COLLECTOR_URL, DEFAULT_LOG_LEVEL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, LogFormat};
pub use paths::Paths;
