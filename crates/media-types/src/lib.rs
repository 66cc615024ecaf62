//! Media domain types shared by the codec and container crates.
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]

mod converter;
mod decrypt;
mod subsample;

pub use converter::{AnalysisResult, BitstreamConverter};
pub use decrypt::{DECRYPTION_KEY_SIZE, DecryptConfig, DecryptConfigError};
pub use subsample::{
    EncryptedRanges, SubsampleEntry, total_subsample_size, verify_subsamples_match_size,
};
