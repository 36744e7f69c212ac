//! Storage sink: keeps the target database ready and writes frames into it.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::client::{InfluxApi, StorageError};
use super::line_protocol::{InfluxValue, LineProtocolWriter, Point};
use super::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::teleinfo::protocol::{FieldValue, Frame};

/// Tags attached to every point, before operator tags are merged in
pub const STATIC_TAGS: &[(&str, &str)] = &[("source", "teleinfo")];

/// Static tags merged with operator tags; operator values win on conflict.
pub fn merge_tags(operator: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut tags: BTreeMap<String, String> = STATIC_TAGS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    tags.extend(operator.iter().map(|(k, v)| (k.clone(), v.clone())));
    tags
}

/// Point fields for a decoded value: `value`, plus `date` when stamped
pub fn value_fields(value: &FieldValue) -> Vec<(&'static str, InfluxValue)> {
    match value {
        FieldValue::Integer(v) => vec![("value", InfluxValue::Integer(*v))],
        FieldValue::Text(v) => vec![("value", InfluxValue::String(v.clone()))],
        FieldValue::DateStamped { date, value } => vec![
            ("value", InfluxValue::Integer(*value)),
            ("date", InfluxValue::String(date.clone())),
        ],
    }
}

/// One point per key in the frame, all stamped with `timestamp`.
pub fn frame_points(
    frame: &Frame,
    tags: &BTreeMap<String, String>,
    timestamp: DateTime<Utc>,
) -> Vec<Point> {
    frame
        .iter()
        .map(|(key, value)| Point {
            measurement: key.to_string(),
            tags: tags.clone(),
            fields: value_fields(value),
            timestamp,
        })
        .collect()
}

/// Live handle on the target database.
///
/// Obtained through [`StorageSink::connect`], which only returns once the
/// database exists.
pub struct StorageSink<C> {
    client: C,
    database: String,
    tags: BTreeMap<String, String>,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl<C> std::fmt::Debug for StorageSink<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSink")
            .field("database", &self.database)
            .field("tags", &self.tags)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<C: InfluxApi> StorageSink<C> {
    /// Connect with the real-time sleeper
    pub async fn connect(
        client: C,
        database: &str,
        tags: BTreeMap<String, String>,
        policy: RetryPolicy,
    ) -> Result<Self, StorageError> {
        Self::connect_with_sleeper(client, database, tags, policy, Box::new(TokioSleeper)).await
    }

    /// Make sure `database` exists, creating it if needed.
    ///
    /// Unreachable-backend failures are retried forever per `policy`; the call
    /// only returns once connected. Other failures (e.g. rejected
    /// credentials) are returned.
    pub async fn connect_with_sleeper(
        client: C,
        database: &str,
        tags: BTreeMap<String, String>,
        policy: RetryPolicy,
        sleeper: Box<dyn Sleeper>,
    ) -> Result<Self, StorageError> {
        let sink = Self {
            client,
            database: database.to_string(),
            tags,
            policy,
            sleeper,
        };
        sink.ensure_database().await?;
        Ok(sink)
    }

    /// Rerun the connect cycle after the backend went away
    pub async fn reconnect(&self) -> Result<(), StorageError> {
        info!("Reconnecting to InfluxDB...");
        self.ensure_database().await
    }

    async fn ensure_database(&self) -> Result<(), StorageError> {
        info!("Connect to InfluxDB...");
        self.policy
            .retry(
                self.sleeper.as_ref(),
                || self.try_ensure_database(),
                StorageError::is_unreachable,
            )
            .await?;
        info!("Connected to {}!", self.database);
        Ok(())
    }

    async fn try_ensure_database(&self) -> Result<(), StorageError> {
        debug!("Database {} exists?", self.database);
        let databases = self.client.list_databases().await?;
        if !databases.iter().any(|name| *name == self.database) {
            info!("Database {} creation..", self.database);
            self.client.create_database(&self.database).await?;
            info!("Database {} created!", self.database);
        }
        Ok(())
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Write one frame as a single batch, timestamped now.
    ///
    /// # Returns
    ///
    /// * `Ok(n)` - Number of points written; an empty frame writes nothing
    ///   and returns `Ok(0)`
    /// * `Err(StorageError)` - The batch was not stored. Not retried.
    pub async fn write_frame(&self, frame: &Frame) -> Result<usize, StorageError> {
        self.write_frame_at(frame, Utc::now()).await
    }

    pub async fn write_frame_at(
        &self,
        frame: &Frame,
        timestamp: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let points = frame_points(frame, &self.tags, timestamp);
        if points.is_empty() {
            debug!("Empty frame, nothing to write");
            return Ok(0);
        }

        let mut writer = LineProtocolWriter::new();
        for point in &points {
            writer.write_point(point);
        }
        let count = writer.len();

        self.client.write(&self.database, writer.flush()).await?;
        debug!("Inserted {} points at {}", count, points[0].iso_timestamp());
        Ok(count)
    }
}
