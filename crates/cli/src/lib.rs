pub mod cli;
pub mod config;
pub mod crd;
pub mod kubernetes;
pub mod output;
pub mod run;
pub mod tail;
pub mod watch;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes error: {0}")]
    Kubernetes(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Internal error: {0}")]
    Internal(String),
    /// The run's pod reached the Failed phase with no cancellation or
    /// deletion explaining it.
    #[error("task pod '{0}' has failed")]
    PodFailed(String),
    /// A readiness condition went Unknown before the pod could fail
    /// cleanly. Carries the condition message verbatim.
    #[error("{0}")]
    PodNotReady(String),
}

pub type Result<T> = std::result::Result<T, Error>;
