//! Annex-B conversion for H.265.
//!
//! Length-prefix rewriting is codec independent and shared with the `h264`
//! crate; only parameter set handling differs.

use media_types::SubsampleEntry;

use crate::config::HEVCDecoderConfigurationRecord;
use crate::error::{H265Error, Result};
use crate::nalu::NaluType;
use crate::parser::H265NaluParser;

pub use h264::annex_b::{ANNEX_B_START_CODE, find_subsample_index};

/// Replaces every NAL unit length prefix in `frame` with a start code,
/// adjusting `subsamples` when the frame grows.
pub fn convert_frame_to_annex_b(
    length_size: u8,
    frame: &mut Vec<u8>,
    subsamples: &mut [SubsampleEntry],
) -> Result<()> {
    h264::annex_b::convert_frame_to_annex_b(length_size, frame, subsamples)?;
    Ok(())
}

/// Concatenates every NAL unit of every array in `config`, each behind a
/// start code, in record order.
pub fn convert_config_to_annex_b(config: &HEVCDecoderConfigurationRecord) -> Vec<u8> {
    let total: usize = config
        .nalus()
        .map(|nalu| nalu.len() + ANNEX_B_START_CODE.len())
        .sum();

    let mut out = Vec::with_capacity(total);
    for nalu in config.nalus() {
        out.extend_from_slice(&ANNEX_B_START_CODE);
        out.extend_from_slice(nalu);
    }
    out
}

/// Inserts the VPS, SPS and PPS of `config` into an Annex-B `frame`, right
/// after a leading access unit delimiter if there is one.
pub fn insert_param_sets_annex_b(
    config: &HEVCDecoderConfigurationRecord,
    frame: &mut Vec<u8>,
    subsamples: &mut Vec<SubsampleEntry>,
) -> Result<()> {
    let insert_at = {
        let mut parser = H265NaluParser::new();
        parser.set_encrypted_stream(frame, subsamples);
        let first = parser.advance_to_next_nalu()?.ok_or(H265Error::NoNalu)?;
        if first.nal_unit_type == NaluType::Aud {
            first.end_offset()
        } else {
            0
        }
    };

    let param_sets = convert_config_to_annex_b(config);
    h264::annex_b::splice_clear_block(frame, subsamples, insert_at, &param_sets)?;
    Ok(())
}

/// NAL unit order validation for H.265.
///
/// Ordering is not validated yet: the rules of ISO/IEC 23008-2 7.4.2.4.4 are
/// not implemented and every buffer is accepted. Callers must not rely on
/// this to reject malformed streams.
pub fn is_valid_annex_b(_buffer: &[u8], _subsamples: &[SubsampleEntry]) -> bool {
    true
}
