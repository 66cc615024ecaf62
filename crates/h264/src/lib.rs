//! H.264 helpers for demuxing length-prefixed video from ISO-BMFF.
//!
//! - [`H264NaluParser`]: locates NAL units in an Annex-B stream, skipping
//!   start codes that fall inside encrypted subsamples
//! - [`AVCDecoderConfigurationRecord`]: the `avcC` box payload
//! - [`annex_b`]: length-prefix to start-code conversion, parameter set
//!   injection and NAL unit order validation
//! - [`AvcBitstreamConverter`]: all of the above wrapped for a single track
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

pub mod annex_b;
mod config;
mod converter;
pub mod error;
mod nalu;
mod parser;

pub use config::{AVCDecoderConfigurationRecord, AvcExtendedConfig};
pub use converter::AvcBitstreamConverter;
pub use error::{H264Error, NaluError, Result};
pub use nalu::{Nalu, NaluType};
pub use parser::{
    H264NaluParser, NaluScanner, StartCode, find_start_code, find_start_code_in_clear_ranges,
};
