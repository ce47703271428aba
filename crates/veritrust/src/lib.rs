//! Application review workflow for the VeriTrust job board.
//!
//! The crate owns the status machine governing an application's review
//! lifecycle, the live snapshot feed both candidate and company observers
//! subscribe to, and the HTTP surface the service binary mounts.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
