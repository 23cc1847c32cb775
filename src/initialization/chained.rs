use super::ParamGen;

/// A parameter generator that delegates to a chain of generators, moving to the next one as each
/// is exhausted.
///
/// Handy to initialize every layer of the model differently, by giving each generator in the
/// chain a limit equal to the size of its layer.
pub struct ChainedParamGen {
    param_gens: Vec<Box<dyn ParamGen>>,
    curr: usize,
}

impl ChainedParamGen {
    /// Creates a new `ChainedParamGen`.
    ///
    /// # Arguments
    /// * `param_gens` - The generators, in the order they should be drained.
    pub fn new(param_gens: Vec<Box<dyn ParamGen>>) -> Self {
        Self {
            param_gens,
            curr: 0,
        }
    }
}

impl ParamGen for ChainedParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        let mut sample = Vec::with_capacity(n);

        while sample.len() < n {
            let param_gen = self.param_gens.get_mut(self.curr)?;

            match param_gen.sample(n - sample.len()) {
                Some(values) if !values.is_empty() => sample.extend(values),
                _ => {
                    self.curr += 1;

                    if self.curr == self.param_gens.len() {
                        break;
                    }
                }
            }
        }

        (!sample.is_empty() || n == 0).then_some(sample)
    }
}
