mod dataset;
mod dense;
mod error;
mod model;

pub use dataset::EvalSet;
pub use dense::DenseModel;
pub use error::{ModelErr, Result};
pub use model::{Evaluation, Model};
