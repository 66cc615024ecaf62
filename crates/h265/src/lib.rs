//! H.265 helpers for demuxing length-prefixed video from ISO-BMFF.
//!
//! Mirrors the `h264` crate: a NAL unit parser that respects encrypted
//! subsamples, the `hvcC` decoder configuration record, and Annex-B
//! conversion with VPS/SPS/PPS injection on keyframes.
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
mod enums;
pub mod error;
mod nalu;
mod parser;

pub use config::{HEVCDecoderConfigurationRecord, NaluArray, ProfileCompatibilityFlags};
pub use converter::HevcBitstreamConverter;
pub use enums::*;
pub use error::{H265Error, Result};
pub use h264::NaluError;
pub use nalu::{Nalu, NaluType};
pub use parser::H265NaluParser;
