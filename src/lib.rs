//! coda-decode: decoder for CODA/EVIO data-acquisition banks
//!
//! Turns the banks of one event (nuclear physics detector readout) into
//! digitization records keyed by crate, slot and channel, and tracks the
//! run/trigger state carried by header, trigger-interface and slow-control
//! banks.

pub mod common;
pub mod composite;
pub mod config;
pub mod decoder;
pub mod evio;
pub mod output;
