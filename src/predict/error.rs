use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Invalid TLE: {0}")]
    InvalidTle(String),
    #[error("Propagation error: {0}")]
    Propagation(String),
    #[error("Geometry engine exited with {0}")]
    EngineExit(String),
    #[error("Malformed engine output: {0}")]
    Malformed(String),
    #[error("Geometry engine IO error: {0}")]
    Io(#[from] std::io::Error),
}
