// LogPulse - lib.rs
//
// Library entry point, exposing the ingestion pipeline for the CLI binary,
// integration tests, and hosts that embed the scanner with their own site
// directory, enricher, and record sink.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
