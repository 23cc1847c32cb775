use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;
use rand_distr::{NormalError, uniform::Error as UniformError};

pub type Result<T> = std::result::Result<T, InitErr>;

/// Errors raised while generating the initial global model.
#[derive(Debug)]
pub enum InitErr {
    /// A random generator was configured with parameters its distribution rejects.
    Distribution(String),
    /// The generator ran out before `layer` could be filled.
    Exhausted {
        layer: usize,
        needed: usize,
        got: usize,
    },
    Shape(ShapeError),
}

impl From<NormalError> for InitErr {
    fn from(value: NormalError) -> Self {
        Self::Distribution(value.to_string())
    }
}

impl From<UniformError> for InitErr {
    fn from(value: UniformError) -> Self {
        Self::Distribution(value.to_string())
    }
}

impl From<ShapeError> for InitErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl Display for InitErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distribution(e) => write!(f, "invalid distribution: {e}"),
            Self::Exhausted { layer, needed, got } => write!(
                f,
                "parameter generator exhausted at layer {layer}: got {got} of {needed} values"
            ),
            Self::Shape(e) => write!(f, "invalid layer shape: {e}"),
        }
    }
}

impl Error for InitErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Shape(e) => Some(e),
            _ => None,
        }
    }
}
