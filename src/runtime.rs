//! Runtime glue shared by both sides: configuration, error taxonomy, wire types and
//! telemetry.

pub mod config;
pub mod error;
pub mod protocol;
pub mod telemetry;
