//! # Linky Teleinfo Library
//!
//! Read electricity meter telemetry from a Linky teleinfo serial output and
//! store it in InfluxDB.
//!
//! This library provides the frame decoder, the frame decimator, the
//! InfluxDB sink and the ingestion loop tying them together.

pub mod config;
pub mod error;
pub mod ingest;
pub mod serial;
pub mod storage;
pub mod teleinfo;
