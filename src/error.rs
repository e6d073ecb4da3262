use thiserror::Error;

pub type RiskResult<T> = Result<T, RiskError>;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("unknown zone: {0}")]
    NotFound(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("invalid training data: {0}")]
    TrainingData(String),
}

impl RiskError {
    pub fn is_per_request(&self) -> bool {
        matches!(self, RiskError::Validation(_) | RiskError::NotFound(_))
    }
}
