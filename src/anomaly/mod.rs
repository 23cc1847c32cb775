mod detector;
mod group;
pub mod magnitude;
mod noop;
mod policy;

pub use detector::AnomalyDetector;
pub use group::GroupOutlierCheck;
pub use magnitude::MagnitudeDetector;
pub use noop::NoopDetector;
pub use policy::ExclusionPolicy;
