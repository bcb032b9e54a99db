use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid date `{value}` for {arg}: expected YYYY-MM-DD")]
    InvalidDate { arg: &'static str, value: String },

    #[error("Start date {start} is after end date {end}")]
    DateRangeOrder { start: String, end: String },

    #[error("Unknown band designation `{name}`")]
    UnknownBand { name: String },

    #[error("--bands overrides the multiband layout and applies only to the tif platform, not {platform}")]
    BandOrderPlatform { platform: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pipeline(#[from] zonex::Error),
}
