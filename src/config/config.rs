use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use super::{
    AnomalySpec, ConfigErr, DetectorSpec, DistributionSpec, ModelSpec, ParamGenSpec, Result,
};
use crate::{
    aggregation::Weighting,
    anomaly::{ExclusionPolicy, GroupOutlierCheck, magnitude},
    coordinator::{CoordinatorSettings, TimeoutPolicy},
};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8765;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_min_participants() -> usize {
    1
}

fn default_deadline_check_interval_ms() -> u64 {
    1000
}

fn default_max_frame_len() -> usize {
    comms::DEFAULT_MAX_FRAME_LEN
}

/// The configuration of the coordinator binary, read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub total_rounds: u64,
    #[serde(default = "default_min_participants")]
    pub min_participants: usize,
    #[serde(default)]
    pub stop_at_total_rounds: bool,
    #[serde(default)]
    pub round_timeout_secs: Option<u64>,
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,
    #[serde(default = "default_deadline_check_interval_ms")]
    pub deadline_check_interval_ms: u64,
    #[serde(default)]
    pub broadcast_timeout_secs: Option<u64>,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    #[serde(default)]
    pub weighting: Weighting,
    #[serde(default)]
    pub anomaly: AnomalySpec,
    pub model: ModelSpec,
    /// A JSON file with `inputs` and `labels` to evaluate the global model on.
    #[serde(default)]
    pub eval_data: Option<PathBuf>,
}

impl CoordinatorConfig {
    /// Parses a configuration from JSON, missing optional fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses the configuration file at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigErr::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json(&json)
    }

    /// Overrides the listen address with the `HOST` and `PORT` environment variables, if set.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(env::var("HOST").ok(), env::var("PORT").ok())
    }

    fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) -> Result<()> {
        if let Some(host) = host {
            self.host = host;
        }

        if let Some(port) = port {
            self.port = port.parse().map_err(|_| ConfigErr::Env {
                var: "PORT",
                value: port,
            })?;
        }

        Ok(())
    }

    /// The address to listen at.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolves `addr` if it's a literal socket address.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.addr().parse().ok()
    }

    pub fn deadline_check_interval(&self) -> Duration {
        Duration::from_millis(self.deadline_check_interval_ms)
    }

    /// The coordinator settings this configuration describes.
    pub fn settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            total_rounds: self.total_rounds,
            min_participants: self.min_participants,
            stop_at_total_rounds: self.stop_at_total_rounds,
            round_timeout: self.round_timeout_secs.map(Duration::from_secs),
            timeout_policy: self.timeout_policy,
            broadcast_timeout: self.broadcast_timeout_secs.map(Duration::from_secs),
            weighting: self.weighting,
            exclusion: self.anomaly.policy,
            group_check: self.anomaly.group,
        }
    }

    /// Checks every value that would otherwise only fail once the server is running.
    pub fn validate(&self) -> Result<()> {
        if self.total_rounds == 0 {
            return invalid("total_rounds must be at least 1");
        }

        if self.min_participants == 0 {
            return invalid("min_participants must be at least 1");
        }

        if self.round_timeout_secs == Some(0) {
            return invalid("round_timeout_secs must be positive");
        }

        if self.broadcast_timeout_secs == Some(0) {
            return invalid("broadcast_timeout_secs must be positive");
        }

        if self.deadline_check_interval_ms == 0 {
            return invalid("deadline_check_interval_ms must be positive");
        }

        if self.max_frame_len == 0 {
            return invalid("max_frame_len must be positive");
        }

        if let ExclusionPolicy::DownWeightFlagged { factor } = self.anomaly.policy
            && !(0. ..=1.).contains(&factor)
        {
            return invalid(format!("down weighting factor {factor} is not within [0, 1]"));
        }

        if let DetectorSpec::Magnitude { threshold, .. } = self.anomaly.detector
            && !(threshold.is_finite() && threshold > 0.)
        {
            return invalid(format!("magnitude threshold {threshold} must be positive"));
        }

        if let DetectorSpec::Magnitude { warmup, .. } = self.anomaly.detector
            && warmup < magnitude::MIN_WARMUP
        {
            return invalid(format!(
                "magnitude warmup {warmup} must be at least {}",
                magnitude::MIN_WARMUP
            ));
        }

        if let Some(GroupOutlierCheck { threshold }) = self.anomaly.group
            && !(threshold.is_finite() && threshold > 0.)
        {
            return invalid(format!("group outlier threshold {threshold} must be positive"));
        }

        self.validate_model()
    }

    fn validate_model(&self) -> Result<()> {
        let layers = &self.model.layers;

        if layers.is_empty() {
            return invalid("the model must have at least one layer");
        }

        if let Some(i) = layers.iter().position(|l| l.is_empty() || l.contains(&0)) {
            return invalid(format!("layer {i} has an empty shape {:?}", layers[i]));
        }

        validate_param_gen(&self.model.init)
    }
}

fn validate_param_gen(spec: &ParamGenSpec) -> Result<()> {
    match spec {
        ParamGenSpec::Const { .. } => Ok(()),
        ParamGenSpec::Rand { distribution, .. } => match *distribution {
            DistributionSpec::Kaiming { fan_in } | DistributionSpec::Lecun { fan_in }
                if fan_in == 0 =>
            {
                invalid("fan_in must be positive")
            }
            DistributionSpec::XavierUniform { fan_in, fan_out } if fan_in + fan_out == 0 => {
                invalid("fan_in + fan_out must be positive")
            }
            _ => Ok(()),
        },
        ParamGenSpec::Chained { specs } => specs.iter().try_for_each(validate_param_gen),
    }
}

fn invalid<T>(reason: impl Into<String>) -> Result<T> {
    Err(ConfigErr::Invalid(reason.into()))
}
