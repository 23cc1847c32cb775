use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

pub type Result<T> = std::result::Result<T, ConfigErr>;

/// Errors raised while loading or validating the coordinator configuration.
#[derive(Debug)]
pub enum ConfigErr {
    Io { path: PathBuf, source: io::Error },
    Json(serde_json::Error),
    /// An environment override couldn't be parsed.
    Env { var: &'static str, value: String },
    Invalid(String),
}

impl Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            Self::Json(e) => write!(f, "malformed config: {e}"),
            Self::Env { var, value } => write!(f, "invalid {var} override {value:?}"),
            Self::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
