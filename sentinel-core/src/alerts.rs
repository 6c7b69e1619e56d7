use crate::db::Database;
use crate::error::StoreError;
use crate::model::{self, Action, ActionKind, Alert, Coordinate, NewAction, NewAlert, Severity};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequencedAlert {
    pub seq: i64,
    pub alert: Alert,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequencedAction {
    pub seq: i64,
    pub alert_id: String,
    pub action: Action,
}

/// Alerts and their append-only action lists.
#[derive(Clone, Debug)]
pub struct AlertStore {
    db: Database,
}

impl AlertStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, new: NewAlert) -> Result<Alert, StoreError> {
        let alert = Alert {
            id: uuid::Uuid::new_v4().to_string(),
            incident_type: new.incident_type,
            location: new.location,
            severity: new.severity,
            created_at: model::now_string(),
            actions: Vec::new(),
        };

        let conn = self.db.connect()?;
        conn.execute(
            "INSERT INTO alerts (id, incident_type, location, severity, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                alert.id,
                alert.incident_type,
                alert.location,
                alert.severity.as_str(),
                alert.created_at,
            ],
        )?;

        info!(alert_id = %alert.id, incident_type = %alert.incident_type, location = %alert.location, "alert created");
        Ok(alert)
    }

    pub fn get(&self, id: &str) -> Result<Alert, StoreError> {
        let conn = self.db.connect()?;
        let row = conn
            .query_row(
                "SELECT seq, id, incident_type, location, severity, created_at
                 FROM alerts WHERE id = ?1",
                params![id],
                map_alert,
            )
            .optional()?;
        let Some(mut found) = row else {
            return Err(StoreError::AlertNotFound(id.to_string()));
        };

        found.alert.actions = self.actions_for(id)?;
        Ok(found.alert)
    }

    /// Newest first.
    pub fn list(&self) -> Result<Vec<Alert>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(
            "SELECT seq, id, incident_type, location, severity, created_at
             FROM alerts ORDER BY seq DESC",
        )?;
        let rows = stmt.query_map([], map_alert)?;
        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?.alert);
        }

        let mut stmt = conn.prepare(
            "SELECT seq, alert_id, kind, details, polyline, timestamp
             FROM alert_actions ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], map_action)?;
        let mut by_alert: HashMap<String, Vec<Action>> = HashMap::new();
        for row in rows {
            let action = row?;
            by_alert
                .entry(action.alert_id)
                .or_default()
                .push(action.action);
        }

        for alert in &mut alerts {
            alert.actions = by_alert.remove(&alert.id).unwrap_or_default();
        }
        Ok(alerts)
    }

    /// Appends in one write transaction; the row sequence fixes the order.
    pub fn append_action(&self, alert_id: &str, new: NewAction) -> Result<SequencedAction, StoreError> {
        let action = Action {
            kind: new.kind,
            details: new.details,
            polyline: new.polyline,
            timestamp: model::now_string(),
        };
        let polyline = action
            .polyline
            .as_ref()
            .map(|p| serde_json::to_string(p))
            .transpose()?;

        let mut conn = self.db.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let exists = tx
            .query_row("SELECT 1 FROM alerts WHERE id = ?1", params![alert_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::AlertNotFound(alert_id.to_string()));
        }

        tx.execute(
            "INSERT INTO alert_actions (alert_id, kind, details, polyline, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![alert_id, action.kind.as_str(), action.details, polyline, action.timestamp],
        )?;
        let seq = tx.last_insert_rowid();
        tx.commit()?;

        info!(alert_id, kind = action.kind.as_str(), "action appended");
        Ok(SequencedAction {
            seq,
            alert_id: alert_id.to_string(),
            action,
        })
    }

    pub fn actions_for(&self, alert_id: &str) -> Result<Vec<Action>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(
            "SELECT seq, alert_id, kind, details, polyline, timestamp
             FROM alert_actions WHERE alert_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![alert_id], map_action)?;

        let mut actions = Vec::new();
        for row in rows {
            actions.push(row?.action);
        }
        Ok(actions)
    }

    /// Alerts created after `alert_seq`, without their actions.
    pub fn alerts_after(&self, alert_seq: i64) -> Result<Vec<SequencedAlert>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(
            "SELECT seq, id, incident_type, location, severity, created_at
             FROM alerts WHERE seq > ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![alert_seq], map_alert)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn actions_after(&self, action_seq: i64) -> Result<Vec<SequencedAction>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(
            "SELECT seq, alert_id, kind, details, polyline, timestamp
             FROM alert_actions WHERE seq > ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![action_seq], map_action)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Highest alert and action sequence numbers, 0 when empty.
    pub fn latest_seqs(&self) -> Result<(i64, i64), StoreError> {
        let conn = self.db.connect()?;
        let alerts = conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM alerts", [], |row| row.get(0))?;
        let actions =
            conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM alert_actions", [], |row| row.get(0))?;
        Ok((alerts, actions))
    }
}

fn conversion_error(col: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        col,
        rusqlite::types::Type::Text,
        Box::new(StoreError::Corrupt(message)),
    )
}

fn map_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<SequencedAlert> {
    let severity_str: String = row.get(4)?;
    let severity = Severity::parse(&severity_str)
        .ok_or_else(|| conversion_error(4, format!("bad severity '{severity_str}'")))?;

    Ok(SequencedAlert {
        seq: row.get(0)?,
        alert: Alert {
            id: row.get(1)?,
            incident_type: row.get(2)?,
            location: row.get(3)?,
            severity,
            created_at: row.get(5)?,
            actions: Vec::new(),
        },
    })
}

fn map_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<SequencedAction> {
    let kind_str: String = row.get(2)?;
    let kind = ActionKind::parse(&kind_str)
        .ok_or_else(|| conversion_error(2, format!("bad action kind '{kind_str}'")))?;

    let polyline_str: Option<String> = row.get(4)?;
    let polyline = polyline_str
        .map(|s| {
            serde_json::from_str::<Vec<Coordinate>>(&s).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(err))
            })
        })
        .transpose()?;

    Ok(SequencedAction {
        seq: row.get(0)?,
        alert_id: row.get(1)?,
        action: Action {
            kind,
            details: row.get(3)?,
            polyline,
            timestamp: row.get(5)?,
        },
    })
}
