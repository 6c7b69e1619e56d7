use crate::config::{DispatchMode, ServerConfig};
use sentinel_core::alerts::AlertStore;
use sentinel_core::db::Database;
use sentinel_core::dispatch::{DispatchStrategy, Dispatcher};
use sentinel_core::error::StoreError;
use sentinel_core::feed::Feed;
use sentinel_core::llm::{OpenAiReasoner, ReasoningService, ResilientReasoner};
use sentinel_core::records::RecordStore;
use sentinel_core::registry::{ResponderDirectory, StaticDirectory};
use sentinel_core::route::GreatCircleRoutePlanner;
use sentinel_core::scanner::{ScanGate, Scanner};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub alerts: AlertStore,
    pub records: RecordStore,
    pub dispatcher: Dispatcher,
    pub reasoner: Option<Arc<dyn ReasoningService>>,
    pub scan_gate: ScanGate,
}

impl AppState {
    pub fn feed(&self) -> Feed {
        Feed::new(self.alerts.clone(), self.records.clone())
    }
}

pub fn build_state(config: &ServerConfig) -> Result<AppState, StoreError> {
    let db = Database::open(&config.db_path)?;
    let reasoner = build_reasoner(config);
    Ok(assemble(db, reasoner, config))
}

/// Wires stores and dispatch around an already-built reasoner.
pub fn assemble(
    db: Database,
    reasoner: Option<Arc<dyn ReasoningService>>,
    config: &ServerConfig,
) -> AppState {
    let directory: Arc<dyn ResponderDirectory> = Arc::new(StaticDirectory::seeded());
    let planner = Arc::new(GreatCircleRoutePlanner::with_speed(
        directory.clone(),
        config.speed_kmh,
    ));

    let strategy = match (config.dispatch_mode, reasoner.as_ref()) {
        (DispatchMode::Model, Some(reasoner)) => DispatchStrategy::Model {
            reasoner: reasoner.clone(),
            max_turns: config.max_turns,
        },
        (DispatchMode::Model, None) => {
            warn!("model dispatch requested without a reasoning service, using rules");
            DispatchStrategy::Rules
        }
        (DispatchMode::Rules, _) => DispatchStrategy::Rules,
    };

    AppState {
        alerts: AlertStore::new(db.clone()),
        records: RecordStore::new(db),
        dispatcher: Dispatcher::new(directory, planner).with_strategy(strategy),
        reasoner,
        scan_gate: ScanGate::default(),
    }
}

/// Starts one periodic scanner per configured camera feed.
pub fn start_scanners(state: &AppState, config: &ServerConfig) -> Vec<JoinHandle<()>> {
    if config.cameras.is_empty() {
        return Vec::new();
    }
    let Some(reasoner) = state.reasoner.clone() else {
        warn!(
            feeds = config.cameras.len(),
            "camera feeds configured without a reasoning service, scanning disabled"
        );
        return Vec::new();
    };

    config
        .cameras
        .iter()
        .cloned()
        .map(|camera| {
            info!(feed = %camera.name, location = %camera.location, "scanning camera feed");
            let scanner = Scanner::new(reasoner.clone(), state.alerts.clone(), state.scan_gate.clone());
            tokio::spawn(scanner.run(Arc::new(camera), config.scan_period))
        })
        .collect()
}

fn build_reasoner(config: &ServerConfig) -> Option<Arc<dyn ReasoningService>> {
    let llm = config.llm.as_ref()?;
    match OpenAiReasoner::new(llm.clone()) {
        Ok(inner) => {
            info!(model = %llm.model, "reasoning service configured");
            Some(Arc::new(ResilientReasoner::new(
                Arc::new(inner),
                Duration::from_secs(llm.timeout_secs),
            )))
        }
        Err(err) => {
            warn!(error = %err, "reasoning service unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{BoxFuture, FutureExt};
    use sentinel_core::error::ReasoningError;
    use sentinel_core::llm::ReasoningRequest;

    struct Calm;

    impl ReasoningService for Calm {
        fn complete<'a>(
            &'a self,
            _request: &'a ReasoningRequest,
        ) -> BoxFuture<'a, Result<String, ReasoningError>> {
            async { Ok(r#"{"isAnomaly": false, "anomalyType": "None", "description": "calm"}"#.to_string()) }
                .boxed()
        }
    }

    fn scratch_db(name: &str) -> Database {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        Database::open(format!("/tmp/sentinel-tests/state-{name}-{nanos}.db")).expect("open")
    }

    fn camera_config() -> ServerConfig {
        ServerConfig::from_lookup(|key| match key {
            "SENTINEL_FEEDS" => Some("ghat-5-cam|Ghat 5|/tmp/ghat5.jpg;market-cam|Market Area|/tmp/market.jpg".into()),
            _ => None,
        })
    }

    #[tokio::test]
    async fn scanners_need_a_reasoning_service() {
        let config = camera_config();
        let state = assemble(scratch_db("no-scanners"), None, &config);
        assert!(start_scanners(&state, &config).is_empty());
    }

    #[tokio::test]
    async fn one_scanner_per_camera() {
        let config = camera_config();
        let state = assemble(scratch_db("scanners"), Some(Arc::new(Calm)), &config);
        let handles = start_scanners(&state, &config);
        assert_eq!(handles.len(), 2);
        for handle in handles {
            handle.abort();
        }
    }
}
