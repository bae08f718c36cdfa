use thiserror::Error;

#[derive(Debug, Error)]
pub enum RevealError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("counter text {0:?} does not start with an integer")]
    InvalidInitialValue(String),
    #[error("invalid page config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("dom: {0}")]
    Dom(String),
}

pub type RevealResult<T> = Result<T, RevealError>;
