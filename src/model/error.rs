use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use comms::ShapeMismatch;

pub type Result<T> = std::result::Result<T, ModelErr>;

/// Errors raised by the model collaborator and its datasets.
#[derive(Debug)]
pub enum ModelErr {
    ShapeMismatch(ShapeMismatch),
    /// The parameters can't be read as (weight, bias) dense layer pairs.
    NotDense {
        layer: usize,
        shape: Vec<usize>,
    },
    FeatureMismatch {
        expected: usize,
        got: usize,
    },
    EmptyDataset,
    LabelOutOfRange {
        label: usize,
        classes: usize,
    },
    RaggedInputs {
        row: usize,
        expected: usize,
        got: usize,
    },
    LabelCount {
        inputs: usize,
        labels: usize,
    },
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for ModelErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch(e) => write!(f, "model parameters rejected: {e}"),
            Self::NotDense { layer, shape } => {
                write!(f, "layer {layer} with shape {shape:?} doesn't fit a dense layout")
            }
            Self::FeatureMismatch { expected, got } => {
                write!(f, "the model takes {expected} features, the data has {got}")
            }
            Self::EmptyDataset => f.write_str("the evaluation dataset is empty"),
            Self::LabelOutOfRange { label, classes } => {
                write!(f, "label {label} is out of range for {classes} classes")
            }
            Self::RaggedInputs { row, expected, got } => {
                write!(f, "input row {row} has {got} features, expected {expected}")
            }
            Self::LabelCount { inputs, labels } => {
                write!(f, "{inputs} input rows but {labels} labels")
            }
            Self::Io(e) => write!(f, "failed to read the dataset: {e}"),
            Self::Json(e) => write!(f, "failed to parse the dataset: {e}"),
        }
    }
}

impl Error for ModelErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ShapeMismatch(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeMismatch> for ModelErr {
    fn from(value: ShapeMismatch) -> Self {
        Self::ShapeMismatch(value)
    }
}

impl From<io::Error> for ModelErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ModelErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
