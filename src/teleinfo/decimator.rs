//! # Frame Decimation
//!
//! Skips a fixed number of frames between two stored ones. Counting start
//! markers instead of using a timer keeps the write rate proportional to the
//! meter's own transmission rate.

use tracing::debug;

use super::protocol::FRAME_START;
use crate::error::{Result, TeleinfoError};
use crate::serial::LineSource;

/// Default number of frames skipped after each stored frame
pub const DEFAULT_IGNORE_FRAMES: u32 = 10;

/// Counts start markers until the configured limit is reached
#[derive(Debug, Clone)]
pub struct FrameDecimator {
    limit: u32,
    seen: u32,
}

impl FrameDecimator {
    pub fn new(limit: u32) -> Self {
        Self { limit, seen: 0 }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Start markers counted since the last reset
    pub fn seen(&self) -> u32 {
        self.seen
    }

    pub fn is_done(&self) -> bool {
        self.seen >= self.limit
    }

    /// Count the line's start marker, if any. Returns true once the limit is reached.
    pub fn observe(&mut self, line: &[u8]) -> bool {
        if line.contains(&FRAME_START) {
            self.seen += 1;
        }
        self.is_done()
    }

    pub fn reset(&mut self) {
        self.seen = 0;
    }

    /// Consume lines until `limit` start markers have gone by.
    ///
    /// Returns immediately without reading when the limit is zero. The
    /// counter is reset afterwards so the decimator can be reused.
    pub async fn discard<S>(&mut self, source: &mut S) -> Result<()>
    where
        S: LineSource + ?Sized,
    {
        let mut lines = 0usize;
        while !self.is_done() {
            let line = source.read_line().await.map_err(TeleinfoError::Transport)?;
            lines += 1;
            self.observe(&line);
        }
        debug!("Discarded {} frames ({} lines)", self.seen, lines);
        self.reset();
        Ok(())
    }
}

/// Discard `limit` frames from the source.
pub async fn discard_frames<S>(source: &mut S, limit: u32) -> Result<()>
where
    S: LineSource + ?Sized,
{
    FrameDecimator::new(limit).discard(source).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::line_source::mocks::MockLineSource;

    #[test]
    fn test_default_ignore_frames() {
        assert_eq!(DEFAULT_IGNORE_FRAMES, 10);
    }

    #[test]
    fn test_observe_counts_markers_only() {
        let mut decimator = FrameDecimator::new(2);
        assert!(!decimator.observe(b"IRMS1\t005"));
        assert!(!decimator.observe(b"\x03\x02"));
        assert_eq!(decimator.seen(), 1);
        assert!(decimator.observe(b"\x02"));

        decimator.reset();
        assert_eq!(decimator.seen(), 0);
        assert!(!decimator.is_done());
    }

    #[test]
    fn test_zero_limit_is_done_immediately() {
        let decimator = FrameDecimator::new(0);
        assert!(decimator.is_done());
    }

    #[tokio::test]
    async fn test_discard_zero_reads_nothing() {
        let mut source = MockLineSource::new(["\x02", "IRMS1\t005"]);
        discard_frames(&mut source, 0).await.unwrap();
        assert_eq!(source.lines_read, 0);
    }

    #[tokio::test]
    async fn test_discard_consumes_exactly_n_markers() {
        let mut source = MockLineSource::new([
            "IRMS1\t005",
            "\x02",
            "IRMS1\t005",
            "URMS1\t230",
            "\x03",
            "\x02",
            "SINSTS\t01289",
            "\x03",
            "\x02",
            "IRMS1\t006",
        ]);

        discard_frames(&mut source, 2).await.unwrap();
        // Stops right after the second start marker
        assert_eq!(source.lines_read, 6);
        assert_eq!(source.remaining(), 4);
    }

    #[tokio::test]
    async fn test_discard_is_reusable() {
        let mut source = MockLineSource::new(["\x02", "x", "\x02", "y", "\x02"]);
        let mut decimator = FrameDecimator::new(1);

        decimator.discard(&mut source).await.unwrap();
        assert_eq!(source.lines_read, 1);
        decimator.discard(&mut source).await.unwrap();
        assert_eq!(source.lines_read, 3);
        assert_eq!(decimator.seen(), 0);
    }

    #[tokio::test]
    async fn test_discard_propagates_transport_error() {
        let mut source = MockLineSource::new(["\x02"]);
        let result = discard_frames(&mut source, 3).await;
        assert!(matches!(result, Err(TeleinfoError::Transport(_))));
    }
}
