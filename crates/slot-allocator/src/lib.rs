//! Slot allocation and rebalancing engine.
//!
//! Given a person who needs a recurring lesson slot, the engine ranks existing slot groups they
//! could join directly, single displacements that free a seat, and bounded displacement chains.
//! Accepted recommendations are applied as one all-or-nothing plan against the external store.

pub mod allocation;
pub mod config;
pub mod error;
pub mod telemetry;
