//! Wiring from agent configuration to a running relay.

use agent_config_and_utils::{Config, CoreResult, MalformedLines, Paths};
use relay_buffer::{
    DeliveryConfig, DeliveryHandle, HttpDeliveryClient, MalformedLinePolicy, RelayConfig,
    RelayResult,
};
use std::path::Path;
use std::sync::Arc;

/// Load configuration: file, then `EDGE_AGENT_*` environment.
///
/// An explicit `config_file` must exist; the default location may be absent.
pub fn load_config(paths: &Paths, config_file: Option<&Path>) -> CoreResult<Config> {
    match config_file {
        Some(path) => {
            let mut config = Config::load_from_file(path)?;
            config.apply_env()?;
            Ok(config)
        }
        None => Config::load(paths),
    }
}

pub fn relay_config(config: &Config, paths: &Paths) -> RelayConfig {
    RelayConfig {
        buffer_dir: config.buffer_dir(paths),
        produce_interval: config.produce_interval(),
        flush_interval: config.flush_interval(),
        append_attempts: config.append_attempts,
        append_backoff: config.append_backoff(),
        malformed_lines: match config.malformed_lines {
            MalformedLines::Skip => MalformedLinePolicy::Skip,
            MalformedLines::Halt => MalformedLinePolicy::Halt,
        },
    }
}

pub fn delivery_client(config: &Config) -> RelayResult<DeliveryHandle> {
    let delivery = DeliveryConfig::new(&config.collector_url, config.delivery_timeout())?;
    Ok(Arc::new(HttpDeliveryClient::new(delivery)?))
}
