use crate::alerts::{AlertStore, SequencedAction, SequencedAlert};
use crate::error::StoreError;
use crate::records::{Collection, Record, RecordStore};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(750);

pub trait FeedSink: Send + Sync + 'static {
    fn emit_json(&self, event: &str, payload: serde_json::Value);
}

/// Last sequence seen per stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    #[serde(default)]
    pub alerts: i64,
    #[serde(default)]
    pub actions: i64,
    #[serde(default)]
    pub video_insights: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FeedChanges {
    pub alerts: Vec<SequencedAlert>,
    pub actions: Vec<SequencedAction>,
    pub video_insights: Vec<Record>,
    pub cursor: FeedCursor,
}

#[derive(Clone, Debug)]
pub struct Feed {
    alerts: AlertStore,
    records: RecordStore,
}

impl Feed {
    pub fn new(alerts: AlertStore, records: RecordStore) -> Self {
        Self { alerts, records }
    }

    pub fn head(&self) -> Result<FeedCursor, StoreError> {
        let (alerts, actions) = self.alerts.latest_seqs()?;
        Ok(FeedCursor {
            alerts,
            actions,
            video_insights: self.records.latest_seq(Collection::VideoInsights)?,
        })
    }

    pub fn changes_after(&self, cursor: FeedCursor) -> Result<FeedChanges, StoreError> {
        let alerts = self.alerts.alerts_after(cursor.alerts)?;
        let actions = self.alerts.actions_after(cursor.actions)?;
        let video_insights = self
            .records
            .records_after(Collection::VideoInsights, cursor.video_insights)?;

        let cursor = FeedCursor {
            alerts: alerts.last().map_or(cursor.alerts, |a| a.seq),
            actions: actions.last().map_or(cursor.actions, |a| a.seq),
            video_insights: video_insights.last().map_or(cursor.video_insights, |r| r.seq),
        };
        Ok(FeedChanges {
            alerts,
            actions,
            video_insights,
            cursor,
        })
    }

    /// Pushes everything after `cursor` to `sink` and advances it.
    pub fn emit_updates(&self, sink: &impl FeedSink, cursor: &mut FeedCursor) -> Result<(), StoreError> {
        let changes = self.changes_after(*cursor)?;

        for a in &changes.alerts {
            sink.emit_json("alert-created", serde_json::to_value(a)?);
        }
        for a in &changes.actions {
            sink.emit_json("alert-action-appended", serde_json::to_value(a)?);
        }
        for r in &changes.video_insights {
            sink.emit_json("video-insight-added", serde_json::to_value(r)?);
        }

        *cursor = changes.cursor;
        Ok(())
    }

    /// Polls from the current head on a background thread.
    pub fn watch(self, sink: impl FeedSink, period: Duration) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let mut cursor = self.head().unwrap_or_default();
            loop {
                if let Err(err) = self.emit_updates(&sink, &mut cursor) {
                    warn!(error = %err, "feed poll failed");
                }
                std::thread::sleep(period);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::model::{ActionKind, NewAction, NewAlert, Severity};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CaptureSink {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl FeedSink for CaptureSink {
        fn emit_json(&self, event: &str, _payload: serde_json::Value) {
            if let Ok(mut guard) = self.seen.lock() {
                guard.push(event.to_string());
            }
        }
    }

    #[test]
    fn emits_each_change_once() {
        let db = test_db("feed-once");
        let alerts = AlertStore::new(db.clone());
        let records = RecordStore::new(db);
        let feed = Feed::new(alerts.clone(), records.clone());

        let alert = alerts
            .create(NewAlert {
                incident_type: "Medical".into(),
                location: "Ghat 2".into(),
                severity: Severity::Medium,
            })
            .expect("create");
        alerts
            .append_action(
                &alert.id,
                NewAction {
                    kind: ActionKind::DispatchResponder,
                    details: "medic-01 responding".into(),
                    polyline: None,
                },
            )
            .expect("append");
        records
            .append(Collection::VideoInsights, serde_json::json!({"videoUrl": "v"}))
            .expect("record");

        let sink = CaptureSink::default();
        let mut cursor = FeedCursor::default();
        feed.emit_updates(&sink, &mut cursor).expect("emit");
        feed.emit_updates(&sink, &mut cursor).expect("emit again");

        let seen = sink.seen.lock().expect("lock").clone();
        assert_eq!(
            seen,
            vec!["alert-created", "alert-action-appended", "video-insight-added"]
        );
        assert_eq!(cursor, feed.head().expect("head"));
    }

    #[test]
    fn cursor_is_unchanged_when_idle() {
        let db = test_db("feed-idle");
        let feed = Feed::new(AlertStore::new(db.clone()), RecordStore::new(db));
        let cursor = FeedCursor {
            alerts: 3,
            actions: 7,
            video_insights: 1,
        };
        let changes = feed.changes_after(cursor).expect("changes");
        assert!(changes.alerts.is_empty());
        assert_eq!(changes.cursor, cursor);
    }
}
