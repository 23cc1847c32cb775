use serde::{Deserialize, Serialize};

/// How much each update counts towards the round's average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Every participant counts the same regardless of its local data volume.
    #[default]
    Uniform,
    /// Each participant counts proportionally to the amount of samples it trained on.
    SampleCount,
}

impl Weighting {
    /// The base weight of an update that reported `samples` local samples.
    pub fn weight(&self, samples: u64) -> f32 {
        match self {
            Self::Uniform => 1.,
            Self::SampleCount => samples as f32,
        }
    }
}
