/// Errors surfaced by the transcription core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Analysis or filterbank parameters that cannot produce a usable result.
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    /// Matrix shapes handed to the preprocessor do not line up.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    /// A tempo of zero beats per minute reached the duration classifier.
    #[error("invalid tempo: {0} bpm")]
    InvalidTempo(u32),

    /// The frame analyzer could not be set up, so nothing was processed.
    #[error("failed to initialize frame analyzer: {0}")]
    AnalyzerInit(String),
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::Configuration {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
