use serde::{Deserialize, Serialize};

use crate::anomaly::{ExclusionPolicy, GroupOutlierCheck, magnitude};

/// The specification for the `Distribution` of a random parameter generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionSpec {
    Uniform { low: f32, high: f32 },
    Normal { mean: f32, std_dev: f32 },
    XavierUniform { fan_in: usize, fan_out: usize },
    Kaiming { fan_in: usize },
    Lecun { fan_in: usize },
}

/// The specification for the `ParamGen` that fills the initial global model.
///
/// A missing `limit` means the generator never runs out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamGenSpec {
    Const {
        value: f32,
        #[serde(default)]
        limit: Option<usize>,
    },
    Rand {
        distribution: DistributionSpec,
        #[serde(default)]
        limit: Option<usize>,
    },
    Chained {
        specs: Vec<ParamGenSpec>,
    },
}

/// The specification for the `AnomalyDetector`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorSpec {
    #[default]
    Noop,
    Magnitude {
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default = "default_warmup")]
        warmup: u64,
    },
}

fn default_threshold() -> f64 {
    magnitude::DEFAULT_THRESHOLD
}

fn default_warmup() -> u64 {
    magnitude::DEFAULT_WARMUP
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalySpec {
    #[serde(default)]
    pub detector: DetectorSpec,
    /// Compares the updates of a round against each other before aggregating them.
    #[serde(default)]
    pub group: Option<GroupOutlierCheck>,
    #[serde(default)]
    pub policy: ExclusionPolicy,
}

/// The layout of the global model and how to initialize it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// The shape of every parameter tensor, in layer order.
    pub layers: Vec<Vec<usize>>,
    pub init: ParamGenSpec,
    #[serde(default)]
    pub seed: Option<u64>,
}
