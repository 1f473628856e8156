use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScaleError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("timeout waiting for sample")]
    Timeout,
    #[error("sample source disconnected")]
    Disconnected,
    #[error("no free state machine for a new channel")]
    NoFreeStateMachine,
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("config record failed read-back verification")]
    VerifyFailed,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("storage geometry unusable: {0}")]
    Geometry(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("missing sample source")]
    MissingSource,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T, E = ScaleError> = std::result::Result<T, E>;
pub use eyre::Report;
