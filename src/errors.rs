use thiserror::Error;

/// Failures that abort a whole carve or load operation.
#[derive(Error, Debug)]
pub enum CarveError {
    #[error("GPU backend unavailable: {0}")]
    Backend(String),

    #[error("GPU read-back failed: {0}")]
    Readback(String),

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("control point file: {0}")]
    Persistence(#[from] serde_json::Error),

    #[error("unsupported control point file version {0}")]
    UnsupportedVersion(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CarveError {
    pub fn backend<T: ToString>(msg: T) -> Self {
        CarveError::Backend(msg.to_string())
    }

    pub fn readback<T: ToString>(msg: T) -> Self {
        CarveError::Readback(msg.to_string())
    }
}

/// Failure confined to a single terrain tile; other tiles keep processing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TileError {
    #[error("terrain layer '{0}' is not registered on this tile")]
    MissingTerrainLayer(String),

    #[error("tile grid is empty or malformed: {0}")]
    MalformedGrid(String),
}
