// LogPulse - platform/mod.rs
//
// Platform layer: config.toml loading, platform directories, and the
// file-backed record sink.
// Dependencies: core and app types, directories crate.

pub mod config;
pub mod jsonl_sink;
