use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreenerError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Classifier error: {0}")]
    ClassifierError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
