use thiserror::Error;

pub type CairnResult<T> = Result<T, CairnError>;

#[derive(Debug, Error)]
pub enum CairnError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
