use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfsTestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("{step} failed with exit code {rc}")]
    Step {
        step: String,
        rc: i32,
        output: String,
    },

    #[error("Precondition not met: {0}")]
    Precondition(String),

    #[error("No nodes in the cluster")]
    NoNodes,

    #[error("Cloud provisioning error: {0}")]
    Cloud(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),
}

impl OfsTestError {
    /// Builds a step failure from a non-zero exit status.
    pub fn step(step: impl Into<String>, rc: i32) -> Self {
        OfsTestError::Step {
            step: step.into(),
            rc,
            output: String::new(),
        }
    }

    /// Exit status carried by the error, if it came from a command.
    pub fn rc(&self) -> Option<i32> {
        match self {
            OfsTestError::Step { rc, .. } => Some(*rc),
            _ => None,
        }
    }
}

pub type Error = OfsTestError;
pub type Result<T> = std::result::Result<T, Error>;
