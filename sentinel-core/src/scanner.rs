use crate::alerts::AlertStore;
use crate::analysis::{self, FrameAnomaly};
use crate::db;
use crate::error::ReasoningError;
use crate::llm::{MediaPayload, ReasoningService};
use crate::model::{NewAlert, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_secs(10);

/// At most one in-flight scan per feed.
#[derive(Clone, Default)]
pub struct ScanGate {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Releases its feed on drop.
pub struct ScanGuard {
    gate: ScanGate,
    feed: String,
}

impl ScanGate {
    pub fn try_begin(&self, feed: &str) -> Option<ScanGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(feed.to_string()) {
            return None;
        }
        Some(ScanGuard {
            gate: self.clone(),
            feed: feed.to_string(),
        })
    }

    pub fn is_scanning(&self, feed: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(feed)
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.gate
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.feed);
    }
}

pub trait FrameSource: Send + Sync + 'static {
    fn feed_name(&self) -> &str;
    fn location(&self) -> &str;
    /// `None` while the feed is offline or paused.
    fn capture(&self) -> Option<MediaPayload>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameScan {
    pub feed: String,
    pub anomaly: FrameAnomaly,
    pub alert_id: Option<String>,
    pub alert_error: Option<String>,
}

#[derive(Clone)]
pub struct Scanner {
    reasoner: Arc<dyn ReasoningService>,
    alerts: AlertStore,
    gate: ScanGate,
}

impl Scanner {
    pub fn new(reasoner: Arc<dyn ReasoningService>, alerts: AlertStore, gate: ScanGate) -> Self {
        Self {
            reasoner,
            alerts,
            gate,
        }
    }

    pub fn gate(&self) -> &ScanGate {
        &self.gate
    }

    /// Analyzes one frame; an anomaly raises a High alert at `location`.
    /// A failed alert write is reported in the result, not as an error.
    pub async fn scan_frame(
        &self,
        feed: &str,
        location: &str,
        frame: MediaPayload,
    ) -> Result<FrameScan, ReasoningError> {
        let anomaly = analysis::detect_frame_anomaly(self.reasoner.as_ref(), frame).await?;
        let mut scan = FrameScan {
            feed: feed.to_string(),
            anomaly,
            alert_id: None,
            alert_error: None,
        };
        if !scan.anomaly.is_anomaly {
            return Ok(scan);
        }

        info!(feed, anomaly = %scan.anomaly.anomaly_type, "anomaly detected");
        let alerts = self.alerts.clone();
        let new = NewAlert {
            incident_type: scan.anomaly.anomaly_type.clone(),
            location: location.to_string(),
            severity: Severity::High,
        };
        match db::blocking(move || alerts.create(new)).await {
            Ok(alert) => scan.alert_id = Some(alert.id),
            Err(err) => {
                warn!(feed, error = %err, "could not raise alert for anomaly");
                scan.alert_error = Some(err.to_string());
            }
        }
        Ok(scan)
    }

    /// Starts a scan unless one is already pending for this feed.
    pub fn tick(&self, source: &Arc<dyn FrameSource>) -> Option<JoinHandle<()>> {
        let feed = source.feed_name().to_string();
        let Some(guard) = self.gate.try_begin(&feed) else {
            debug!(feed = %feed, "previous scan still pending, skipping tick");
            return None;
        };
        let Some(frame) = source.capture() else {
            debug!(feed = %feed, "feed offline, skipping tick");
            return None;
        };

        let scanner = self.clone();
        let source = source.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            if let Err(err) = scanner.scan_frame(&feed, source.location(), frame).await {
                warn!(feed = %feed, error = %err, "frame scan failed");
            }
        }))
    }

    pub async fn run(self, source: Arc<dyn FrameSource>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick(&source);
        }
    }
}
