use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandinError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("submission store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("malformed submission archive: {0}")]
    ArchiveFormat(String),

    #[error("submission must be {expected} lines, not {actual}")]
    LineCount { expected: usize, actual: usize },

    #[error(
        "it has only been {elapsed_secs} seconds since your last submission \
         (submissions allowed every {min_secs} seconds)"
    )]
    Throttled { elapsed_secs: u64, min_secs: u64 },

    #[error("invalid group: {0}")]
    InvalidGroup(String),

    #[error("malformed answer file: {0}")]
    AnswerFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, HandinError>;
