//! Fragmented MP4 (ISO-BMFF) demuxing with Common Encryption metadata.
//!
//! - [`BoxReader`]: incremental box parsing with a three-way [`ParseResult`]
//! - [`boxes`]: typed `moov`/`moof` box trees
//! - [`TrackRunIterator`]: samples of a fragment in stream order, with
//!   timing, keyframe flags and per-sample [`DecryptConfig`](media_types::DecryptConfig)
//! - [`FragmentedMp4Demuxer`]: push bytes in, pull decoder-ready samples out
//! - [`pssh`]: key ids and system data from `pssh` init data
//!
//! ## License
//!
//! This project is licensed under the [MIT](./LICENSE.MIT) or
//! [Apache-2.0](./LICENSE.Apache-2.0) license. You can choose between one of
//! them if you use this work.
//!
//! `SPDX-License-Identifier: MIT OR Apache-2.0`
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(unsafe_code)]

mod box_reader;
pub mod boxes;
mod cenc;
mod cenc_resolver;
mod demux;
pub mod error;
mod fourcc;
pub mod pssh;
mod sample_to_group;
mod track_run;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use box_reader::{BoxHeader, BoxReader, ParseBox, ParseResult, is_valid_top_level_box};
pub use cenc::FrameCencInfo;
pub use cenc_resolver::{CencResolver, SampleEncryption};
pub use demux::{DemuxOptions, DemuxedSample, FragmentedMp4Demuxer};
pub use error::{Mp4Error, Result};
pub use fourcc::FourCc;
pub use sample_to_group::SampleToGroupIterator;
pub use track_run::{SampleInfo, TrackRunIterator};
