use thiserror::Error;

/// Failure to obtain a sample from a meter.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The reader could not be constructed, for example, the meter is not connected.
    #[error("reader is unavailable: {0:#}")]
    Unavailable(anyhow::Error),

    /// The reader exists but the read request failed.
    #[error("failed to read the meter: {0:#}")]
    Failure(anyhow::Error),
}

/// Persist or fetch call failed.
#[derive(Debug, Error)]
#[error("storage failure: {0:#}")]
pub struct StorageError(#[from] pub anyhow::Error);

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        Self(error.into())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(error: serde_json::Error) -> Self {
        Self(error.into())
    }
}

/// Anything that aborts a single tick.
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
