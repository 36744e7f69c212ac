//! # Teleinfo Protocol Constants and Types
//!
//! Core definitions for the Linky "standard mode" teleinfo protocol.
//!
//! A frame starts with STX (0x02) and ends with ETX (0x03). Between them each
//! information group sits on its own line, fields separated by a horizontal tab:
//!
//! ```text
//! KEY<TAB>VALUE<TAB>CHECKSUM
//! KEY<TAB>DATE<TAB>VALUE<TAB>CHECKSUM
//! ```

use std::collections::BTreeMap;
use std::fmt;

/// Start of frame marker (STX)
pub const FRAME_START: u8 = 0x02;

/// End of frame marker (ETX)
pub const FRAME_END: u8 = 0x03;

/// Field separator within an information group
pub const FIELD_SEPARATOR: char = '\t';

/// Decoding rule attached to a known key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Base-10 signed integer in field 2
    Integer,
    /// Field 2 kept verbatim
    Text,
    /// Date string in field 2, base-10 signed integer in field 3
    DateStampedInteger,
}

/// Known teleinfo keys and how to decode them.
///
/// Keys absent from this table are dropped by the decoder.
pub const MEASURE_KEYS: &[(&str, ValueKind)] = &[
    // Active energy indices (Wh)
    ("EAST", ValueKind::Integer),
    ("EASF01", ValueKind::Integer),
    ("EASF02", ValueKind::Integer),
    ("EASF03", ValueKind::Integer),
    ("EASF04", ValueKind::Integer),
    ("EASF05", ValueKind::Integer),
    ("EASF06", ValueKind::Integer),
    ("EASF07", ValueKind::Integer),
    ("EASF08", ValueKind::Integer),
    ("EASF09", ValueKind::Integer),
    ("EASF10", ValueKind::Integer),
    ("EASD01", ValueKind::Integer),
    ("EASD02", ValueKind::Integer),
    ("EASD03", ValueKind::Integer),
    ("EASD04", ValueKind::Integer),
    // Instantaneous current (A) and voltage (V)
    ("IRMS1", ValueKind::Integer),
    ("URMS1", ValueKind::Integer),
    // Reference and cut-off power (kVA)
    ("PREF", ValueKind::Integer),
    ("PCOUP", ValueKind::Integer),
    // Instantaneous apparent power (VA)
    ("SINSTS", ValueKind::Integer),
    // Daily maxima, load curve points and mean voltage
    ("SMAXSN", ValueKind::DateStampedInteger),
    ("SMAXSN-1", ValueKind::DateStampedInteger),
    ("CCASN", ValueKind::DateStampedInteger),
    ("CCASN-1", ValueKind::DateStampedInteger),
    ("UMOY1", ValueKind::DateStampedInteger),
    // Labels
    ("NGTF", ValueKind::Text),
    ("LTARF", ValueKind::Text),
    ("MSG1", ValueKind::Text),
];

/// Look up a key in the known-key table.
///
/// Returns the table's own `'static` key alongside its kind, so frames never
/// need to allocate key names.
pub fn lookup_key(key: &str) -> Option<(&'static str, ValueKind)> {
    MEASURE_KEYS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|&(name, kind)| (name, kind))
}

/// Decoded value of one information group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    DateStamped { date: String, value: i64 },
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{:?}", v),
            FieldValue::DateStamped { date, value } => write!(f, "{}@{}", value, date),
        }
    }
}

/// One complete teleinfo frame: known keys mapped to their decoded values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    fields: BTreeMap<&'static str, FieldValue>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value; a repeated key replaces the earlier one.
    pub fn insert(&mut self, key: &'static str, value: FieldValue) {
        self.fields.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over keys and values in key order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}
