use chrono::NaiveDateTime;
use thiserror::Error;

/// Timestamp layout used for persisted records (local time, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid stored timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// One persisted fatigue event.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRecord {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub detection_type: String,
    pub confidence: f64,
}

impl DetectionRecord {
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Append-only log of fatigue events with simple queries.
///
/// `save` refuses a second record of the same type within one wall-clock
/// second, returning `Ok(false)`. Stored confidences are rounded to three
/// decimals.
pub trait DetectionStore: Send {
    fn save(&mut self, detection_type: &str, confidence: f32) -> Result<bool, StoreError>;

    /// Newest first.
    fn recent(&self, limit: usize) -> Result<Vec<DetectionRecord>, StoreError>;

    /// Oldest first.
    fn all(&self) -> Result<Vec<DetectionRecord>, StoreError>;

    /// Records with `start <= timestamp <= end`, oldest first.
    fn between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<DetectionRecord>, StoreError>;

    /// Deletes every record, returning how many were removed.
    fn clear(&mut self) -> Result<usize, StoreError>;

    fn total_count(&self) -> Result<u64, StoreError>;

    fn count_by_type(&self, detection_type: &str) -> Result<u64, StoreError>;

    /// Mean confidence over all records, 0.0 when empty.
    fn average_confidence(&self) -> Result<f64, StoreError>;

    /// `(type, count)` pairs, most frequent first.
    fn statistics(&self) -> Result<Vec<(String, u64)>, StoreError>;
}
