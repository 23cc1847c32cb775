use std::{fs, path::Path};

use ndarray::{Array2, ArrayView2};
use serde::Deserialize;

use super::{ModelErr, Result};

#[derive(Deserialize)]
struct RawEvalSet {
    inputs: Vec<Vec<f32>>,
    labels: Vec<usize>,
}

/// Held out samples with their class labels.
#[derive(Debug, Clone)]
pub struct EvalSet {
    inputs: Array2<f32>,
    labels: Vec<usize>,
}

impl EvalSet {
    /// Creates a new `EvalSet`.
    ///
    /// # Arguments
    /// * `inputs` - One row of features per sample.
    /// * `labels` - The class of every sample.
    ///
    /// # Returns
    /// An error if there isn't exactly one label per row.
    pub fn new(inputs: Array2<f32>, labels: Vec<usize>) -> Result<Self> {
        if inputs.nrows() != labels.len() {
            return Err(ModelErr::LabelCount {
                inputs: inputs.nrows(),
                labels: labels.len(),
            });
        }

        Ok(Self { inputs, labels })
    }

    /// Parses a JSON document shaped as `{ "inputs": [[f32]], "labels": [usize] }`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawEvalSet = serde_json::from_str(json)?;
        let features = raw.inputs.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(raw.inputs.len() * features);

        for (row, input) in raw.inputs.iter().enumerate() {
            if input.len() != features {
                return Err(ModelErr::RaggedInputs {
                    row,
                    expected: features,
                    got: input.len(),
                });
            }

            flat.extend_from_slice(input);
        }

        let inputs = Array2::from_shape_vec((raw.inputs.len(), features), flat)
            .map_err(|_| ModelErr::LabelCount {
                inputs: raw.inputs.len(),
                labels: raw.labels.len(),
            })?;

        Self::new(inputs, raw.labels)
    }

    /// Reads and parses the dataset at `path`, see `EvalSet::from_json`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn inputs(&self) -> ArrayView2<'_, f32> {
        self.inputs.view()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
