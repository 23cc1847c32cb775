//! Federated averaging, the element-wise weighted mean of every submitted layer.

use comms::{ParameterSet, Tensor};

use super::{AggregationErr, Aggregator, Result, WeightedUpdate};

/// Computes `sum(w_i * x_i) / sum(w_i)` per element, layer by layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FedAvg;

impl FedAvg {
    pub fn new() -> Self {
        Self
    }
}

impl Aggregator for FedAvg {
    fn aggregate(&self, updates: &[WeightedUpdate<'_>]) -> Result<ParameterSet> {
        let Some(first) = updates.first() else {
            return Err(AggregationErr::Empty);
        };

        let shape = first.params.shape();
        let mut total = 0.;

        for (index, update) in updates.iter().enumerate() {
            update
                .params
                .check_shape(&shape)
                .map_err(|source| AggregationErr::ShapeMismatch { index, source })?;

            let weight = update.weight;
            if !weight.is_finite() || weight < 0. {
                return Err(AggregationErr::InvalidWeight { index, weight });
            }

            total += weight;
        }

        if total == 0. {
            return Err(AggregationErr::ZeroWeight);
        }

        let mut layers: Vec<Tensor> = first
            .params
            .layers()
            .iter()
            .map(|l| Tensor::zeros(l.raw_dim()))
            .collect();

        for update in updates {
            for (acc, layer) in layers.iter_mut().zip(update.params.layers()) {
                acc.scaled_add(update.weight, layer);
            }
        }

        for acc in &mut layers {
            acc.mapv_inplace(|v| v / total);
        }

        Ok(ParameterSet::new(layers))
    }
}

/// Averages `updates` giving each of them the same weight.
///
/// # Arguments
/// * `updates` - The parameter sets to average, all of the same shape.
///
/// # Returns
/// The element-wise arithmetic mean or an error if `updates` is empty or the shapes differ.
pub fn aggregate(updates: &[ParameterSet]) -> Result<ParameterSet> {
    let weighted: Vec<_> = updates.iter().map(WeightedUpdate::uniform).collect();
    FedAvg.aggregate(&weighted)
}
