use std::{
    cell::RefCell,
    error::Error,
    fmt::{self, Display},
    rc::Rc,
};

use comms::ParameterSet;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    anomaly::{AnomalyDetector, MagnitudeDetector, NoopDetector},
    config::{ConfigErr, CoordinatorConfig, DetectorSpec, DistributionSpec, ModelSpec, ParamGenSpec},
    coordinator::Coordinator,
    initialization::{self, ChainedParamGen, ConstParamGen, InitErr, ParamGen, RandParamGen},
    model::{DenseModel, EvalSet, ModelErr},
};

/// Returned whenever a configuration can't be turned into a running coordinator.
#[derive(Debug)]
pub enum BuildErr {
    Config(ConfigErr),
    Init(InitErr),
    EvalData(ModelErr),
}

impl Display for BuildErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Init(e) => write!(f, "failed to initialize the global model: {e}"),
            Self::EvalData(e) => write!(f, "failed to load the evaluation data: {e}"),
        }
    }
}

impl Error for BuildErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Init(e) => Some(e),
            Self::EvalData(e) => Some(e),
        }
    }
}

impl From<ConfigErr> for BuildErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}

impl From<InitErr> for BuildErr {
    fn from(value: InitErr) -> Self {
        Self::Init(value)
    }
}

impl From<ModelErr> for BuildErr {
    fn from(value: ModelErr) -> Self {
        Self::EvalData(value)
    }
}

/// Builds `Coordinator`s given a configuration.
#[derive(Debug, Default)]
pub struct CoordinatorBuilder;

impl CoordinatorBuilder {
    /// Creates a new `CoordinatorBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds a new coordinator over a dense model following `config`.
    ///
    /// # Arguments
    /// * `config` - The coordinator configuration, it's validated first.
    ///
    /// # Returns
    /// A new coordinator at round 0, or the reason the configuration can't be honored.
    pub fn build(&self, config: &CoordinatorConfig) -> Result<Coordinator<DenseModel>, BuildErr> {
        config.validate()?;

        let params = self.initial_parameters(&config.model)?;
        let detector = self.resolve_detector(config.anomaly.detector);
        let mut coordinator =
            Coordinator::new(DenseModel::new(params), config.settings()).with_detector(detector);

        if let Some(path) = &config.eval_data {
            let data = EvalSet::from_path(path)?;
            log::info!("loaded {} evaluation samples from {}", data.len(), path.display());
            coordinator = coordinator.with_eval_data(data);
        }

        Ok(coordinator)
    }

    /// Generates a random number generator given (or not) a seed.
    ///
    /// # Returns
    /// A clonable random number generator with interior mutability.
    fn generate_rng(&self, seed: Option<u64>) -> Rc<RefCell<StdRng>> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Rc::new(RefCell::new(rng))
    }

    fn initial_parameters(&self, spec: &ModelSpec) -> initialization::Result<ParameterSet> {
        let rng = self.generate_rng(spec.seed);
        let mut param_gen = self.resolve_param_gen(rng, &spec.init)?;
        initialization::initial_parameters(&spec.layers, param_gen.as_mut())
    }

    /// Resolves a `ParamGen` out of its specification, a missing limit never runs out.
    ///
    /// # Arguments
    /// * `rng` - The random number generator shared by every random generator of the chain.
    /// * `spec` - The specification of the parameter generator.
    fn resolve_param_gen<R>(
        &self,
        rng: Rc<RefCell<R>>,
        spec: &ParamGenSpec,
    ) -> initialization::Result<Box<dyn ParamGen>>
    where
        R: Rng + 'static,
    {
        match spec {
            ParamGenSpec::Const { value, limit } => {
                let limit = limit.unwrap_or(usize::MAX);
                Ok(Box::new(ConstParamGen::new(*value, limit)))
            }
            ParamGenSpec::Rand {
                distribution,
                limit,
            } => self.resolve_distribution(rng, *distribution, limit.unwrap_or(usize::MAX)),
            ParamGenSpec::Chained { specs } => {
                let param_gens = specs
                    .iter()
                    .map(|spec| self.resolve_param_gen(rng.clone(), spec))
                    .collect::<initialization::Result<Vec<_>>>()?;

                Ok(Box::new(ChainedParamGen::new(param_gens)))
            }
        }
    }

    fn resolve_distribution<R>(
        &self,
        rng: Rc<RefCell<R>>,
        spec: DistributionSpec,
        limit: usize,
    ) -> initialization::Result<Box<dyn ParamGen>>
    where
        R: Rng + 'static,
    {
        let param_gen: Box<dyn ParamGen> = match spec {
            DistributionSpec::Uniform { low, high } => {
                Box::new(RandParamGen::uniform(rng, limit, low, high)?)
            }
            DistributionSpec::Normal { mean, std_dev } => {
                Box::new(RandParamGen::normal(rng, limit, mean, std_dev)?)
            }
            DistributionSpec::XavierUniform { fan_in, fan_out } => {
                Box::new(RandParamGen::xavier_uniform(rng, limit, fan_in, fan_out)?)
            }
            DistributionSpec::Kaiming { fan_in } => {
                Box::new(RandParamGen::kaiming(rng, limit, fan_in)?)
            }
            DistributionSpec::Lecun { fan_in } => Box::new(RandParamGen::lecun(rng, limit, fan_in)?),
        };

        Ok(param_gen)
    }

    fn resolve_detector(&self, spec: DetectorSpec) -> Box<dyn AnomalyDetector> {
        match spec {
            DetectorSpec::Noop => Box::new(NoopDetector),
            DetectorSpec::Magnitude { threshold, warmup } => {
                Box::new(MagnitudeDetector::new(threshold, warmup))
            }
        }
    }
}
