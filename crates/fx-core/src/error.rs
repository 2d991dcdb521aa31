use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FxError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate fetch error: {0}")]
    RateFetch(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Model fit error: {0}")]
    ModelFit(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl FxError {
    /// True for conditions a query caller should surface as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, FxError::NotFound(_))
    }
}
