use comms::ParameterSet;
use ndarray::{Array2, ArrayView1, ArrayView2, Ix1, Ix2};

use super::{EvalSet, Evaluation, Model, ModelErr, Result};

/// A stack of fully connected layers classifying rows of features.
///
/// The parameters are read as consecutive (weight `[in, out]`, bias `[out]`) pairs. Hidden layers
/// use ReLU and the output is scored with softmax cross entropy.
#[derive(Debug, Clone)]
pub struct DenseModel {
    params: ParameterSet,
}

impl DenseModel {
    /// Creates a new `DenseModel`.
    ///
    /// # Arguments
    /// * `params` - The initial parameters.
    pub fn new(params: ParameterSet) -> Self {
        Self { params }
    }

    /// Views the parameters as dense layers, checking that consecutive layers connect.
    fn dense_layers(&self) -> Result<Vec<(ArrayView2<'_, f32>, ArrayView1<'_, f32>)>> {
        let tensors = self.params.layers();
        let not_dense = |layer: usize| ModelErr::NotDense {
            layer,
            shape: tensors.get(layer).map(|t| t.shape().to_vec()).unwrap_or_default(),
        };

        if tensors.is_empty() || tensors.len() % 2 != 0 {
            return Err(not_dense(tensors.len()));
        }

        let mut layers: Vec<(ArrayView2<f32>, ArrayView1<f32>)> =
            Vec::with_capacity(tensors.len() / 2);

        for (i, pair) in tensors.chunks_exact(2).enumerate() {
            let w = pair[0]
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|_| not_dense(2 * i))?;
            let b = pair[1]
                .view()
                .into_dimensionality::<Ix1>()
                .map_err(|_| not_dense(2 * i + 1))?;

            if b.len() != w.ncols() {
                return Err(not_dense(2 * i + 1));
            }

            if let Some((prev, _)) = layers.last()
                && prev.ncols() != w.nrows()
            {
                return Err(not_dense(2 * i));
            }

            layers.push((w, b));
        }

        Ok(layers)
    }

    fn forward(&self, inputs: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let layers = self.dense_layers()?;
        let (first, _) = &layers[0];

        if inputs.ncols() != first.nrows() {
            return Err(ModelErr::FeatureMismatch {
                expected: first.nrows(),
                got: inputs.ncols(),
            });
        }

        let last = layers.len() - 1;
        let mut x = inputs.to_owned();

        for (i, (w, b)) in layers.iter().enumerate() {
            x = x.dot(w) + b;

            if i < last {
                x.mapv_inplace(|v| v.max(0.));
            }
        }

        Ok(x)
    }
}

impl Model for DenseModel {
    type Dataset = EvalSet;

    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn set_parameters(&mut self, params: ParameterSet) -> Result<()> {
        params.check_shape(&self.params.shape())?;
        self.params = params;
        Ok(())
    }

    fn evaluate(&self, data: &EvalSet) -> Result<Evaluation> {
        if data.is_empty() {
            return Err(ModelErr::EmptyDataset);
        }

        let logits = self.forward(data.inputs())?;
        let classes = logits.ncols();
        let mut loss = 0.;
        let mut correct = 0;

        for (row, &label) in logits.rows().into_iter().zip(data.labels()) {
            if label >= classes {
                return Err(ModelErr::LabelOutOfRange { label, classes });
            }

            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let log_sum_exp = row
                .iter()
                .map(|&v| ((v - max) as f64).exp())
                .sum::<f64>()
                .ln()
                + max as f64;

            loss += log_sum_exp - row[label] as f64;

            let mut predicted = 0;
            for (class, &v) in row.iter().enumerate() {
                if v > row[predicted] {
                    predicted = class;
                }
            }

            if predicted == label {
                correct += 1;
            }
        }

        let n = data.len() as f64;
        Ok(Evaluation {
            loss: (loss / n) as f32,
            accuracy: (correct as f64 / n) as f32,
        })
    }
}
