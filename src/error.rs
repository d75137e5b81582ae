use thiserror::Error;

// Unified error type for tridist

#[derive(Error, Debug)]
pub enum TdError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("transport error: {0}")]
    Transport(String),
}
