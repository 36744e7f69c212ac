//! # Teleinfo Frame Decoder
//!
//! Turns newline-delimited teleinfo lines into complete [`Frame`]s.
//!
//! Decoding happens in two layers:
//! - [`decode_line`] decodes one information group into a key/value pair,
//!   returning a per-line result
//! - [`FrameAssembler`] tracks the STX/ETX framing and aggregates the
//!   per-line results, skipping lines that fail to decode

use std::num::ParseIntError;

use thiserror::Error;
use tracing::{debug, error, trace};

use super::protocol::*;
use crate::error::{Result, TeleinfoError};
use crate::serial::LineSource;

/// Failure to decode a single information group.
///
/// Never fatal: the line is skipped and the rest of the frame still decodes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    /// Line bytes are not valid UTF-8
    #[error("line is not valid UTF-8: {0:02X?}")]
    InvalidUtf8(Vec<u8>),

    /// A field required by the key's kind is absent
    #[error("{key}: missing field {index}")]
    MissingField { key: &'static str, index: usize },

    /// A numeric field does not parse as a base-10 integer
    #[error("{key}: invalid integer {value:?}: {source}")]
    InvalidInteger {
        key: &'static str,
        value: String,
        source: ParseIntError,
    },
}

/// Decode one teleinfo line.
///
/// # Returns
///
/// * `Ok(Some((key, value)))` - Known key, decoded per its [`ValueKind`]
/// * `Ok(None)` - Key not in [`MEASURE_KEYS`], line ignored
/// * `Err(FieldError)` - Known key whose payload is malformed
///
/// # Examples
///
/// ```
/// use linky_teleinfo::teleinfo::decoder::decode_line;
/// use linky_teleinfo::teleinfo::protocol::FieldValue;
///
/// let decoded = decode_line(b"IRMS1\t005\t/").unwrap();
/// assert_eq!(decoded, Some(("IRMS1", FieldValue::Integer(5))));
/// ```
pub fn decode_line(line: &[u8]) -> std::result::Result<Option<(&'static str, FieldValue)>, FieldError> {
    let text = std::str::from_utf8(line).map_err(|_| FieldError::InvalidUtf8(line.to_vec()))?;
    // Markers sharing a line with an information group are framing, not payload
    let text = text
        .trim_start_matches(is_marker)
        .trim_end_matches(|c| is_marker(c) || c == '\r');

    let mut fields = text.split(FIELD_SEPARATOR);
    let Some((key, kind)) = fields.next().and_then(lookup_key) else {
        return Ok(None);
    };

    let mut field = |index: usize| fields.next().ok_or(FieldError::MissingField { key, index });

    let value = match kind {
        ValueKind::Integer => FieldValue::Integer(parse_integer(key, field(2)?)?),
        ValueKind::Text => FieldValue::Text(field(2)?.to_string()),
        ValueKind::DateStampedInteger => {
            let date = field(2)?.to_string();
            let value = parse_integer(key, field(3)?)?;
            FieldValue::DateStamped { date, value }
        }
    };

    Ok(Some((key, value)))
}

fn is_marker(c: char) -> bool {
    c == FRAME_START as char || c == FRAME_END as char
}

fn parse_integer(key: &'static str, raw: &str) -> std::result::Result<i64, FieldError> {
    raw.trim().parse::<i64>().map_err(|source| FieldError::InvalidInteger {
        key,
        value: raw.to_string(),
        source,
    })
}

/// Framing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Discarding lines until a start marker shows up
    Hunting,
    /// Inside a frame, accumulating fields until the end marker
    Collecting,
}

/// Byte-level framing state machine.
///
/// Feed it lines with [`push_line`](Self::push_line); it yields a [`Frame`]
/// once the end marker is seen, then goes back to hunting.
#[derive(Debug)]
pub struct FrameAssembler {
    state: FrameState,
    frame: Frame,
    field_errors: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            state: FrameState::Hunting,
            frame: Frame::new(),
            field_errors: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Fields skipped because they failed to decode, since creation
    pub fn field_errors(&self) -> usize {
        self.field_errors
    }

    /// Feed one line; returns the completed frame when this line ends it.
    pub fn push_line(&mut self, line: &[u8]) -> Option<Frame> {
        match self.state {
            FrameState::Hunting => {
                if line.contains(&FRAME_START) {
                    trace!("Start of frame found");
                    self.state = FrameState::Collecting;
                }
                None
            }
            FrameState::Collecting => {
                let start = line.iter().position(|&b| b == FRAME_START);
                let end = line.iter().position(|&b| b == FRAME_END);

                // A second STX is kept as an ordinary line, no resync. One
                // following the ETX belongs to the next frame.
                let stray_start = match (start, end) {
                    (Some(s), Some(e)) => s < e,
                    (Some(_), None) => true,
                    _ => false,
                };
                if stray_start {
                    debug!("Start marker seen inside a frame, treating as data");
                }

                match decode_line(line) {
                    Ok(Some((key, value))) => self.frame.insert(key, value),
                    Ok(None) => {}
                    Err(e) => {
                        error!("Skipping teleinfo field: {}", e);
                        self.field_errors += 1;
                    }
                }

                if let Some(end) = end {
                    self.state = if line[end..].contains(&FRAME_START) {
                        FrameState::Collecting
                    } else {
                        FrameState::Hunting
                    };
                    return Some(std::mem::take(&mut self.frame));
                }
                None
            }
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Read one complete frame from the source.
///
/// Skips input up to the next start marker, then decodes lines until the
/// end marker. A frame cut short by a transport error is discarded and the
/// error returned as [`TeleinfoError::Transport`].
///
/// # Examples
///
/// ```no_run
/// use linky_teleinfo::serial::TeleinfoSerial;
/// use linky_teleinfo::teleinfo::decoder::read_frame;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut serial = TeleinfoSerial::open("/dev/ttyAMA0", 9600, std::time::Duration::from_secs(5))?;
///     let frame = read_frame(&mut serial).await?;
///     println!("{}", frame);
///     Ok(())
/// }
/// ```
pub async fn read_frame<S>(source: &mut S) -> Result<Frame>
where
    S: LineSource + ?Sized,
{
    let mut assembler = FrameAssembler::new();
    loop {
        let line = source.read_line().await.map_err(TeleinfoError::Transport)?;
        if let Some(frame) = assembler.push_line(&line) {
            debug!("Teleinfo frame: {} ({} fields skipped)", frame, assembler.field_errors());
            return Ok(frame);
        }
    }
}
