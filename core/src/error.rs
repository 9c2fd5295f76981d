use thiserror::Error;

/// Error taxonomy for the snapshot engine. Variants are grouped
/// by what raised them, not by layer, so callers can match on kind
/// without caring whether it came from the VFS, a backend, or the header
/// codec.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("incorrect passphrase")]
    BadPassphrase,

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("path is not a directory: {0}")]
    NotADirectory(String),

    #[error("corruption detected in {what}: {detail}")]
    Corruption { what: String, detail: String },

    #[error("codec error ({name}): {detail}")]
    Codec { name: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid sort key: {0}")]
    InvalidSortKey(String),

    #[error("duplicate sort key: {0}")]
    DuplicateKey(String),

    #[error("format error: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn corruption(what: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::Corruption {
            what: what.into(),
            detail: detail.into(),
        }
    }

    pub fn codec(name: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::Codec {
            name: name.into(),
            detail: detail.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }
}
