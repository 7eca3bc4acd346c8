// LogPulse - app/mod.rs
//
// Application layer: scan coordination, file scanning, scan state
// persistence, and the record sink contract.
// Dependencies: core layer.
// Must NOT depend on: platform specifics.

pub mod coordinator;
pub mod file_scan;
pub mod flight;
pub mod offsets;
pub mod sink;
pub mod state_store;
