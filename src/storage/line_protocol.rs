//! InfluxDB Line Protocol encoding.
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp
//! ```
//!
//! Timestamps are written in seconds; writes must use `precision=s`.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// A value stored in an InfluxDB field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfluxValue {
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
}

impl InfluxValue {
    /// Format this value for Line Protocol.
    ///
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - String: double-quoted, inner quotes and backslashes escaped
    pub fn to_line_protocol(&self) -> String {
        match self {
            InfluxValue::Integer(v) => format!("{}i", v),
            InfluxValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
        }
    }
}

impl fmt::Display for InfluxValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

/// One timestamped, tagged measurement record.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: Vec<(&'static str, InfluxValue)>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    /// Timestamp as ISO-8601 with second precision, e.g. `2024-01-01T12:00:00Z`
    pub fn iso_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Encode as one Line Protocol line.
    ///
    /// Tags come out sorted by key. Returns `None` for a point without
    /// fields, which InfluxDB would reject.
    pub fn to_line(&self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }

        let mut line = escape_measurement(&self.measurement);

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&escape_tag(value));
        }

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&value.to_line_protocol());
        }

        line.push(' ');
        line.push_str(&self.timestamp.timestamp().to_string());
        Some(line)
    }
}

/// Accumulates points and produces a Line Protocol request body.
#[derive(Debug, Default)]
pub struct LineProtocolWriter {
    buffer: Vec<String>,
}

impl LineProtocolWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point; points without fields are skipped.
    pub fn write_point(&mut self, point: &Point) {
        if let Some(line) = point.to_line() {
            self.buffer.push(line);
        }
    }

    /// Drain the buffer into a newline-separated body.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer).join("\n")
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Measurement names escape commas and spaces.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys escape commas, equals signs and spaces.
fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
