//! Error types for H.265 parsing and conversion.

use thiserror::Error;

/// Errors that can occur while handling H.265 data.
#[derive(Error, Debug)]
pub enum H265Error {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The NAL unit parser rejected the stream.
    #[error(transparent)]
    Nalu(#[from] h264::NaluError),

    /// Length-prefix rewriting failed.
    #[error(transparent)]
    Conversion(#[from] h264::H264Error),

    /// `configurationVersion` is not 1.
    #[error("unsupported decoder configuration version: {0}")]
    UnsupportedConfigurationVersion(u8),

    /// NAL unit length prefixes must be 1, 2 or 4 bytes.
    #[error("invalid NAL unit length size: {0}")]
    InvalidLengthSize(u8),

    /// Parameter sets can only be inserted into a frame with at least one
    /// NAL unit.
    #[error("frame contains no NAL unit")]
    NoNalu,
}

/// A specialized result type for H.265 operations.
pub type Result<T> = std::result::Result<T, H265Error>;
