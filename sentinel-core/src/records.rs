use crate::db::Database;
use crate::error::StoreError;
use crate::model;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    VideoInsights,
    LostAndFoundCases,
    SituationalSummaries,
    SocialSentiments,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::VideoInsights,
        Collection::LostAndFoundCases,
        Collection::SituationalSummaries,
        Collection::SocialSentiments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::VideoInsights => "video-insights",
            Collection::LostAndFoundCases => "lost-and-found-cases",
            Collection::SituationalSummaries => "situational-summaries",
            Collection::SocialSentiments => "social-sentiments",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub seq: i64,
    pub id: String,
    pub collection: Collection,
    pub payload: serde_json::Value,
    pub created_at: String,
}

/// Append-only JSON records grouped by collection.
#[derive(Clone, Debug)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn append(&self, collection: Collection, payload: serde_json::Value) -> Result<Record, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = model::now_string();
        let body = serde_json::to_string(&payload)?;

        let conn = self.db.connect()?;
        conn.execute(
            "INSERT INTO records (id, collection, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, collection.as_str(), body, created_at],
        )?;
        let seq = conn.last_insert_rowid();

        info!(%collection, record_id = %id, "record saved");
        Ok(Record {
            seq,
            id,
            collection,
            payload,
            created_at,
        })
    }

    /// Newest first, at most `limit` records.
    pub fn list(&self, collection: Collection, limit: usize) -> Result<Vec<Record>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(
            "SELECT seq, id, payload, created_at FROM records
             WHERE collection = ?1 ORDER BY seq DESC LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![collection.as_str(), limit], |row| map_record(row, collection))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Oldest first, strictly after `seq`.
    pub fn records_after(&self, collection: Collection, seq: i64) -> Result<Vec<Record>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(
            "SELECT seq, id, payload, created_at FROM records
             WHERE collection = ?1 AND seq > ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![collection.as_str(), seq], |row| map_record(row, collection))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn latest_seq(&self, collection: Collection) -> Result<i64, StoreError> {
        let conn = self.db.connect()?;
        Ok(conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM records WHERE collection = ?1",
            params![collection.as_str()],
            |row| row.get(0),
        )?)
    }
}

fn map_record(row: &rusqlite::Row<'_>, collection: Collection) -> rusqlite::Result<Record> {
    let payload_str: String = row.get(2)?;
    let payload = serde_json::from_str(&payload_str).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(err))
    })?;

    Ok(Record {
        seq: row.get(0)?,
        id: row.get(1)?,
        collection,
        payload,
        created_at: row.get(3)?,
    })
}
