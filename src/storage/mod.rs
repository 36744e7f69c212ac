//! # Storage Module
//!
//! Writes decoded frames to InfluxDB.
//!
//! This module handles:
//! - Ensuring the target database exists, retrying while InfluxDB is unreachable
//! - Converting frames into tagged, timestamped points
//! - Line Protocol encoding and batch writes over HTTP

pub mod client;
pub mod line_protocol;
pub mod retry;
pub mod sink;

pub use client::{InfluxApi, InfluxClient, StorageError};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use sink::StorageSink;
