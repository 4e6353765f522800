use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SweepError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for instrument")]
    Timeout,
    #[error("setup failed: {0}")]
    Setup(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sweep plan")]
    MissingPlan,
    #[error("missing source-meter")]
    MissingSource,
    #[error("missing data sink")]
    MissingSink,
    #[error("plan sweeps or samples temperature but no cryostat was provided")]
    MissingCryostat,
    #[error("plan drives the field but no magnet supply was provided")]
    MissingMagnet,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
