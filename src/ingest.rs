//! # Ingestion Loop
//!
//! Read a frame, store it, skip the next frames, repeat.
//!
//! There is no terminal state: [`IngestionLoop::run`] only returns on a
//! transport error (or a non-transient storage error while reconnecting),
//! both of which end the process.

use tracing::{error, info, warn};

use crate::error::Result;
use crate::serial::LineSource;
use crate::storage::{InfluxApi, StorageSink};
use crate::teleinfo::{read_frame, FrameDecimator};

/// Number of stored frames between status log messages
const LOG_INTERVAL_FRAMES: u64 = 100;

/// What happened to the frame read in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Frame stored; number of points
    Written(usize),
    /// Write rejected, frame dropped
    Dropped,
    /// Backend went away; connection re-established, frame dropped
    Reconnected,
}

/// Running totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub frames_read: u64,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub points_written: u64,
    pub reconnects: u64,
}

/// Read -> write -> discard pipeline
pub struct IngestionLoop<S, C> {
    source: S,
    sink: StorageSink<C>,
    decimator: FrameDecimator,
    stats: IngestStats,
    last_log_count: u64,
}

impl<S, C> IngestionLoop<S, C>
where
    S: LineSource,
    C: InfluxApi,
{
    /// # Arguments
    ///
    /// * `source` - Teleinfo line source
    /// * `sink` - Connected storage sink
    /// * `ignore_frames` - Frames skipped after each stored frame (0 keeps every frame)
    pub fn new(source: S, sink: StorageSink<C>, ignore_frames: u32) -> Self {
        Self {
            source,
            sink,
            decimator: FrameDecimator::new(ignore_frames),
            stats: IngestStats::default(),
            last_log_count: 0,
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Run forever. Returns only with a fatal error.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Start collect data (keeping 1 frame out of {})",
            self.decimator.limit() + 1
        );
        loop {
            self.cycle().await?;
        }
    }

    /// One read -> write -> discard cycle
    pub async fn cycle(&mut self) -> Result<WriteOutcome> {
        let frame = read_frame(&mut self.source).await?;
        self.stats.frames_read += 1;

        let outcome = match self.sink.write_frame(&frame).await {
            Ok(points) => {
                self.stats.frames_written += 1;
                self.stats.points_written += points as u64;
                WriteOutcome::Written(points)
            }
            Err(e) if e.is_unreachable() => {
                warn!("Lost connection to InfluxDB: {}", e);
                self.stats.frames_dropped += 1;
                self.sink.reconnect().await?;
                self.stats.reconnects += 1;
                WriteOutcome::Reconnected
            }
            Err(e) => {
                error!("Failed to insert frame: {}", e);
                self.stats.frames_dropped += 1;
                WriteOutcome::Dropped
            }
        };

        if self.stats.frames_written - self.last_log_count >= LOG_INTERVAL_FRAMES {
            info!(
                "Stored {} frames ({} points), dropped {}",
                self.stats.frames_written, self.stats.points_written, self.stats.frames_dropped
            );
            self.last_log_count = self.stats.frames_written;
        }

        self.decimator.discard(&mut self.source).await?;
        Ok(outcome)
    }
}
