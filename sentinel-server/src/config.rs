use crate::cameras::SnapshotFeed;
use sentinel_core::dispatch::DEFAULT_MAX_TURNS;
use sentinel_core::feed::DEFAULT_POLL_PERIOD;
use sentinel_core::llm::{LlmConfig, DEFAULT_TIMEOUT_SECS};
use sentinel_core::route::DEFAULT_SPEED_KMH;
use sentinel_core::scanner::DEFAULT_SCAN_PERIOD;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    Rules,
    Model,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub db_path: String,
    pub bind: String,
    pub dispatch_mode: DispatchMode,
    pub max_turns: usize,
    pub speed_kmh: f64,
    pub feed_poll: Duration,
    pub cameras: Vec<SnapshotFeed>,
    pub scan_period: Duration,
    pub llm: Option<LlmConfig>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let dispatch_mode = match get("SENTINEL_DISPATCH").as_deref().map(str::trim) {
            Some("model") | Some("llm") => DispatchMode::Model,
            _ => DispatchMode::Rules,
        };

        Self {
            db_path: get("SENTINEL_DB").unwrap_or_else(|| "sentinel.db".into()),
            bind: get("SENTINEL_BIND").unwrap_or_else(|| "0.0.0.0:8080".into()),
            dispatch_mode,
            max_turns: parse_or(get("SENTINEL_MAX_TURNS"), DEFAULT_MAX_TURNS),
            speed_kmh: parse_or(get("SENTINEL_SPEED_KMH"), DEFAULT_SPEED_KMH),
            feed_poll: get("SENTINEL_FEED_POLL_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_PERIOD),
            cameras: get("SENTINEL_FEEDS")
                .map(|v| SnapshotFeed::parse_list(&v))
                .unwrap_or_default(),
            scan_period: get("SENTINEL_SCAN_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SCAN_PERIOD),
            llm: llm_config(&get),
        }
    }
}

fn llm_config(get: &impl Fn(&str) -> Option<String>) -> Option<LlmConfig> {
    let api_key_env = get("LLM_API_KEY_ENV").unwrap_or_else(|| "OPENAI_API_KEY".into());
    get(&api_key_env)?;

    Some(LlmConfig {
        provider: get("LLM_PROVIDER").unwrap_or_else(|| "openai".into()),
        model: get("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
        api_key_env,
        temperature: parse_or(get("LLM_TEMPERATURE"), 0.2),
        timeout_secs: parse_or(get("LLM_TIMEOUT_SECS"), DEFAULT_TIMEOUT_SECS),
    })
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
