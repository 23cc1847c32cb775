mod chained;
mod constant;
mod error;
mod param_gen;
mod random;

pub use chained::ChainedParamGen;
pub use constant::ConstParamGen;
pub use error::{InitErr, Result};
pub use param_gen::{ParamGen, initial_parameters};
pub use random::RandParamGen;
