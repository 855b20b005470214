//! Crate-wide error type.
//!
//! DSP blocks never return an error for a numeric decode failure (loss of
//! SOF lock, LDPC non-convergence, BCH uncorrectable); those degrade
//! gracefully and are published as metrics instead (§7). `Error` here is
//! reserved for configuration, I/O, and stream-plumbing failures that
//! should abort the run.

/// All errors produced by this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A stream-level invariant was violated (e.g. a handle used after its
    /// peer was dropped, or a buffer operation requested more than is
    /// available).
    #[error("stream error: {0}")]
    Stream(String),

    /// Underlying I/O failure (opening/reading/writing a file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Pipeline/module configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Pipeline description JSON could not be parsed.
    #[error("pipeline description error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Construct a [`Error::Stream`] with a formatted message.
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Construct a [`Error::Config`] with a formatted message.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
