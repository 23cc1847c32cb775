mod aggregator;
mod error;
mod fedavg;
mod weighting;

pub use aggregator::{Aggregator, WeightedUpdate};
pub use error::{AggregationErr, Result};
pub use fedavg::{FedAvg, aggregate};
pub use weighting::Weighting;
