use thiserror::Error;

pub type Result<T> = std::result::Result<T, SeedbankError>;

#[derive(Error, Debug)]
pub enum SeedbankError {
    /// An identifier the caller wants to claim is already owned by another
    /// package, or a validator rejected an identifier value.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unrecognized identifier scheme or remote-location URI scheme.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Retryable storage or network failure. Exhausted retries escalate
    /// to `Fatal`.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// Unrecoverable failure during create/update; anything already
    /// written for the operation has been rolled back best-effort.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}
