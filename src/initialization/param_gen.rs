use comms::{ParameterSet, Tensor};
use ndarray::IxDyn;

use super::{InitErr, Result};

/// A `ParamGen` generates values for the initial state of the model's parameters.
pub trait ParamGen {
    /// Should sample at most `n` parameters.
    ///
    /// # Arguments
    /// * `n` - The upper limit of samples to generate.
    ///
    /// # Returns
    /// `None` once the generator is exhausted.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;
}

/// Fills a fresh parameter set of the given layout, layer by layer, in row-major order.
///
/// # Arguments
/// * `shapes` - The shape of every layer.
/// * `param_gen` - Where the values come from.
///
/// # Returns
/// The initial parameters or `InitErr::Exhausted` if the generator runs out first.
pub fn initial_parameters<G>(shapes: &[Vec<usize>], param_gen: &mut G) -> Result<ParameterSet>
where
    G: ParamGen + ?Sized,
{
    let mut layers = Vec::with_capacity(shapes.len());

    for (layer, shape) in shapes.iter().enumerate() {
        let needed = shape.iter().product();
        let mut values: Vec<f32> = Vec::with_capacity(needed);

        while values.len() < needed {
            match param_gen.sample(needed - values.len()) {
                Some(sample) if !sample.is_empty() => values.extend(sample),
                _ => {
                    return Err(InitErr::Exhausted {
                        layer,
                        needed,
                        got: values.len(),
                    });
                }
            }
        }

        let tensor = Tensor::from_shape_vec(IxDyn(shape), values)?;
        layers.push(tensor);
    }

    Ok(ParameterSet::new(layers))
}
