//! Per-tick systems.
//!
//! One frame runs these in a fixed chain: RSU placement (once, at its load
//! tick), FCD reconciliation, per-RSU coverage, map gossip + activation
//! decisions, the UVCAST network step, and the global map rebuild. Fallible
//! systems report through [`crate::error::SimFault`]; the runner aborts the
//! run on the first recorded fault.

pub mod coverage;
pub mod global_map;
pub mod gossip;
pub mod network;
pub mod reconcile;
pub mod rsu_load;
