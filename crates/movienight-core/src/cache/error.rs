use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Foreign key violation: {0}")]
    ForeignKey(String),

    #[error("Cache lock poisoned")]
    Poisoned,

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
