//! Small helpers for reading big-endian binary data.
//!
//! - [`ByteCursor`]: a bounds-checked reader over a borrowed byte slice
//! - [`BitReader`]: an MSB-first bit reader over any [`std::io::Read`]
//!
//! `SPDX-License-Identifier: MIT OR Apache-2.0`
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

mod bit_read;
mod byte_cursor;

pub use bit_read::BitReader;
pub use byte_cursor::ByteCursor;
