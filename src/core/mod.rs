// LogPulse - core/mod.rs
//
// Core business logic layer.
// Dependencies: parsing and data crates only (regex, chrono, serde_json,
// percent-encoding, woothee).
// Must NOT depend on: platform, app, or filesystem I/O.

pub mod enrich;
pub mod fields;
pub mod format;
pub mod json_fields;
pub mod model;
pub mod parser;
pub mod record;
pub mod sites;
pub mod timestamp;
