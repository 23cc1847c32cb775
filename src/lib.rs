//! Round coordination and aggregation for federated training.
//!
//! Participants connect over TCP, receive an id, and submit locally trained parameter sets. The
//! coordinator collects one update per registered participant, averages them into a new global
//! model and broadcasts it back, one round at a time.

pub mod aggregation;
pub mod anomaly;
pub mod config;
pub mod coordinator;
pub mod initialization;
pub mod model;
pub mod service;

pub use comms::{ParameterSet, Tensor};
