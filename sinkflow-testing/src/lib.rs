#![allow(dead_code)]
//! Sinkflow Testing Utilities.

/// In-memory Pulsar broker for testing producers without a live cluster.
pub mod simplepulsar;
