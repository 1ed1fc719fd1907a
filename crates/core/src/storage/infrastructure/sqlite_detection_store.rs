use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime};
use rusqlite::{params, Connection, Row};

use crate::storage::domain::detection_store::{
    DetectionRecord, DetectionStore, StoreError, TIMESTAMP_FORMAT,
};

/// SQLite-backed detection log (`detection_results` table).
pub struct SqliteDetectionStore {
    conn: Connection,
    /// Epoch second of the last successful save, per detection type.
    last_saved: HashMap<String, i64>,
}

impl SqliteDetectionStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let store = Self::with_connection(conn)?;
        log::info!("Opened detection store at {}", db_path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn,
            last_saved: HashMap::new(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS detection_results (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              timestamp DATETIME NOT NULL,
              detection_type TEXT NOT NULL,
              confidence REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_results_timestamp ON detection_results(timestamp);
            "#,
        )?;
        Ok(())
    }

    /// `save` with an explicit clock reading.
    pub fn save_at(
        &mut self,
        detection_type: &str,
        confidence: f32,
        now: DateTime<Local>,
    ) -> Result<bool, StoreError> {
        let second = now.timestamp();
        if self.last_saved.get(detection_type) == Some(&second) {
            log::debug!("Already saved {detection_type} in this second, skipping");
            return Ok(false);
        }

        let rounded = (confidence as f64 * 1000.0).round() / 1000.0;
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        self.conn.execute(
            "INSERT INTO detection_results (timestamp, detection_type, confidence) VALUES (?1, ?2, ?3)",
            params![timestamp, detection_type, rounded],
        )?;
        self.last_saved.insert(detection_type.to_string(), second);

        log::debug!("Saved {detection_type} ({rounded:.3}) at {timestamp}");
        Ok(true)
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<DetectionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, raw_record)?;
        let mut records = Vec::new();
        for row in rows {
            let (id, timestamp, detection_type, confidence) = row?;
            let timestamp = NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT)
                .map_err(|source| StoreError::Timestamp {
                    value: timestamp.clone(),
                    source,
                })?;
            records.push(DetectionRecord {
                id,
                timestamp,
                detection_type,
                confidence,
            });
        }
        Ok(records)
    }
}

fn raw_record(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, f64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

impl DetectionStore for SqliteDetectionStore {
    fn save(&mut self, detection_type: &str, confidence: f32) -> Result<bool, StoreError> {
        self.save_at(detection_type, confidence, Local::now())
    }

    fn recent(&self, limit: usize) -> Result<Vec<DetectionRecord>, StoreError> {
        self.query_records(
            "SELECT id, timestamp, detection_type, confidence FROM detection_results \
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
            params![limit as i64],
        )
    }

    fn all(&self) -> Result<Vec<DetectionRecord>, StoreError> {
        self.query_records(
            "SELECT id, timestamp, detection_type, confidence FROM detection_results \
             ORDER BY timestamp, id",
            [],
        )
    }

    fn between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<DetectionRecord>, StoreError> {
        self.query_records(
            "SELECT id, timestamp, detection_type, confidence FROM detection_results \
             WHERE timestamp BETWEEN ?1 AND ?2 ORDER BY timestamp, id",
            params![
                start.format(TIMESTAMP_FORMAT).to_string(),
                end.format(TIMESTAMP_FORMAT).to_string()
            ],
        )
    }

    fn clear(&mut self) -> Result<usize, StoreError> {
        let removed = self.conn.execute("DELETE FROM detection_results", [])?;
        self.last_saved.clear();
        log::info!("Cleared {removed} detection records");
        Ok(removed)
    }

    fn total_count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM detection_results", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    fn count_by_type(&self, detection_type: &str) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM detection_results WHERE detection_type = ?1",
            params![detection_type],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    fn average_confidence(&self) -> Result<f64, StoreError> {
        let avg: Option<f64> =
            self.conn
                .query_row("SELECT AVG(confidence) FROM detection_results", [], |r| {
                    r.get(0)
                })?;
        Ok(avg.unwrap_or(0.0))
    }

    fn statistics(&self) -> Result<Vec<(String, u64)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT detection_type, COUNT(*) AS count FROM detection_results \
             GROUP BY detection_type ORDER BY count DESC, detection_type",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
        let mut stats = Vec::new();
        for row in rows {
            let (kind, count) = row?;
            stats.push((kind, count as u64));
        }
        Ok(stats)
    }
}
