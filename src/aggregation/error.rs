use std::{
    error::Error,
    fmt::{self, Display},
};

use comms::ShapeMismatch;

pub type Result<T> = std::result::Result<T, AggregationErr>;

/// Returned whenever a round's updates can't be combined into a meaningful average.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationErr {
    /// There was nothing to aggregate.
    Empty,
    /// The update at `index` doesn't share the layout of the first one.
    ShapeMismatch { index: usize, source: ShapeMismatch },
    /// Every weight was zero, the mean is undefined.
    ZeroWeight,
    InvalidWeight { index: usize, weight: f32 },
}

impl Display for AggregationErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("no updates to aggregate"),
            Self::ShapeMismatch { index, source } => {
                write!(f, "update {index} can't be aggregated: {source}")
            }
            Self::ZeroWeight => f.write_str("the total aggregation weight is zero"),
            Self::InvalidWeight { index, weight } => {
                write!(f, "update {index} has an invalid weight {weight}")
            }
        }
    }
}

impl Error for AggregationErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ShapeMismatch { source, .. } => Some(source),
            _ => None,
        }
    }
}
