pub mod cameras;
pub mod config;
pub mod routes;
pub mod state;

use sentinel_core::feed::FeedSink;
use tracing::info;

/// Feed sink that reports store changes through the log.
pub struct TracingSink;

impl FeedSink for TracingSink {
    fn emit_json(&self, event: &str, payload: serde_json::Value) {
        info!(event, %payload, "feed");
    }
}
