//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, vector, raster, and locator errors, and provides
//! semantic variants for configuration-class failures that abort the run.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Locator error: {0}")]
    Locator(#[from] crate::io::LocatorError),

    #[error("Raster error: {0}")]
    Raster(#[from] crate::io::RasterError),

    #[error("Vector error: {0}")]
    Vector(#[from] crate::io::VectorError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported index: {name}")]
    UnsupportedIndex { name: String },

    #[error("Unsupported resampling method: {name}")]
    UnsupportedResampling { name: String },

    #[error("Invalid pattern for {arg}: {message}")]
    InvalidPattern { arg: &'static str, message: String },

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Missing required argument: {arg}")]
    MissingArgument { arg: String },

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl Error {
    /// True for errors that must abort the whole batch before any stage runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedIndex { .. }
                | Error::UnsupportedResampling { .. }
                | Error::InvalidPattern { .. }
                | Error::InvalidArgument { .. }
                | Error::MissingArgument { .. }
                | Error::Discovery(_)
        )
    }
}
