mod config;
mod error;
mod specs;

pub use config::CoordinatorConfig;
pub use error::{ConfigErr, Result};
pub use specs::{AnomalySpec, DetectorSpec, DistributionSpec, ModelSpec, ParamGenSpec};
