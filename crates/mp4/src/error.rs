use std::io;

use h264::H264Error;
use h265::H265Error;
use media_types::DecryptConfigError;
use thiserror::Error;

use crate::fourcc::FourCc;

#[derive(Error, Debug)]
pub enum Mp4Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("truncated box header")]
    TruncatedHeader,

    #[error("invalid size {size} for box '{box_type}'")]
    InvalidBoxSize { box_type: FourCc, size: u64 },

    #[error("box '{0}' runs to the end of the stream before the stream is complete")]
    BoxRunsToEndOfStream(FourCc),

    #[error("box '{box_type}' of {size} bytes extends past the end of the stream")]
    TruncatedBox { box_type: FourCc, size: u64 },

    #[error("invalid top-level box '{0}'")]
    InvalidTopLevelBox(FourCc),

    #[error("missing '{child}' box in '{parent}'")]
    MissingChild { parent: FourCc, child: FourCc },

    #[error("unexpected '{found}' box in '{parent}', expected '{expected}'")]
    UnexpectedChild {
        parent: FourCc,
        expected: FourCc,
        found: FourCc,
    },

    #[error("invalid '{box_type}' box: {reason}")]
    InvalidBox {
        box_type: FourCc,
        reason: &'static str,
    },

    #[error("movie fragment received before the movie box")]
    NoMovie,

    #[error("no track with id {0}")]
    TrackNotFound(u32),

    #[error("no 'trex' box for track {0}")]
    TrackExtendsNotFound(u32),

    #[error("invalid sample description index {index} for track {track_id}")]
    InvalidSampleDescriptionIndex { track_id: u32, index: u32 },

    #[error("reserved sample dependency value")]
    ReservedSampleDependency,

    #[error("sample-to-group table of track {track_id} does not match its sample count")]
    SampleToGroupMismatch { track_id: u32 },

    #[error("sample group description index {0} out of range")]
    InvalidGroupDescriptionIndex(u32),

    #[error("auxiliary information does not cover the samples of the run")]
    InsufficientAuxInfo,

    #[error("auxiliary information is not available for an encrypted sample")]
    AuxInfoUnavailable,

    #[error("invalid IV size {0}")]
    InvalidIvSize(u8),

    #[error("subsamples cover {subsample_total} bytes but the sample has {sample_size}")]
    SubsampleSizeMismatch {
        subsample_total: u64,
        sample_size: u32,
    },

    #[error("data at offset {0} is no longer buffered")]
    DataDiscarded(u64),

    #[error("data offset {0} points before the start of the stream")]
    InvalidDataOffset(i64),

    #[error("frame of track {track_id} is not conformant Annex-B")]
    NonConformantAnnexB { track_id: u32 },

    #[error("demuxer stopped after an earlier error")]
    Stopped,

    #[error("stream ended in the middle of a fragment")]
    UnexpectedEndOfStream,

    #[error("H.264 error: {0}")]
    H264(#[from] H264Error),

    #[error("H.265 error: {0}")]
    H265(#[from] H265Error),

    #[error("invalid decryption parameters: {0}")]
    DecryptConfig(#[from] DecryptConfigError),
}

pub type Result<T> = std::result::Result<T, Mp4Error>;
