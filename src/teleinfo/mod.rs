//! # Teleinfo Protocol Module
//!
//! Decoding of the Linky teleinfo serial protocol.
//!
//! This module handles:
//! - Frame synchronization on STX/ETX markers
//! - Per-key value decoding (integer, text, date-stamped integer)
//! - Frame decimation between stored frames

pub mod protocol;
pub mod decoder;
pub mod decimator;

pub use decimator::{discard_frames, FrameDecimator};
pub use decoder::{read_frame, FieldError, FrameAssembler};
pub use protocol::{FieldValue, Frame, ValueKind};
