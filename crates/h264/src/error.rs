//! Error types for H.264 parsing and conversion.

use thiserror::Error;

/// Failure reported by a NAL unit parser.
///
/// Running out of NAL units is not an error; parsers signal it with `None`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluError {
    /// The stream is malformed, e.g. a NAL unit header is truncated or its
    /// forbidden bit is set.
    #[error("invalid NAL unit stream")]
    InvalidStream,

    /// The stream cannot be handled, e.g. its subsample map describes more
    /// bytes than the stream holds.
    #[error("unsupported NAL unit stream")]
    UnsupportedStream,
}

/// Errors that can occur while handling H.264 data.
#[derive(Error, Debug)]
pub enum H264Error {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The NAL unit parser rejected the stream.
    #[error(transparent)]
    Nalu(#[from] NaluError),

    /// `configurationVersion` is not 1.
    #[error("unsupported decoder configuration version: {0}")]
    UnsupportedConfigurationVersion(u8),

    /// NAL unit length prefixes must be 1, 2 or 4 bytes.
    #[error("invalid NAL unit length size: {0}")]
    InvalidLengthSize(u8),

    /// A sequence parameter set too short to carry profile and level.
    #[error("sequence parameter set too short: {0} bytes")]
    ParameterSetTooShort(usize),

    /// A length prefix of zero.
    #[error("empty NAL unit at offset {offset}")]
    EmptyNalu {
        /// Offset of the length prefix.
        offset: usize,
    },

    /// A length prefix pointing past the end of the frame.
    #[error("NAL unit at offset {offset} with length {length} overruns frame of {frame_len} bytes")]
    NaluOutOfBounds {
        /// Offset of the NAL unit payload.
        offset: usize,
        /// Declared length.
        length: usize,
        /// Size of the frame.
        frame_len: usize,
    },

    /// Bytes left over after the last complete NAL unit.
    #[error("frame has {trailing} trailing bytes after the last NAL unit")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        trailing: usize,
    },

    /// No subsample covers the given position of the frame.
    #[error("no subsample covers frame offset {position}")]
    SubsampleNotFound {
        /// Position within the frame.
        position: usize,
    },

    /// Parameter sets can only be inserted into a frame with at least one
    /// NAL unit.
    #[error("frame contains no NAL unit")]
    NoNalu,
}

/// A specialized result type for H.264 operations.
pub type Result<T> = std::result::Result<T, H264Error>;

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        insta::assert_snapshot!(H264Error::InvalidLengthSize(3), @"invalid NAL unit length size: 3");
        insta::assert_snapshot!(
            H264Error::NaluOutOfBounds { offset: 4, length: 100, frame_len: 20 },
            @"NAL unit at offset 4 with length 100 overruns frame of 20 bytes"
        );
        insta::assert_snapshot!(H264Error::from(NaluError::InvalidStream), @"invalid NAL unit stream");
    }
}
