//! Conversion between length-prefixed (ISO-BMFF) and Annex-B H.264 streams.
//!
//! Every function that rewrites a frame also keeps its subsample map in sync,
//! so that `sum(clear_bytes + cypher_bytes)` always equals the frame size.
//! Frames are left in an unspecified state when a conversion fails.

use byteorder::{BigEndian, ByteOrder};
use media_types::{AnalysisResult, SubsampleEntry};
use tracing::debug;

use crate::config::AVCDecoderConfigurationRecord;
use crate::error::{H264Error, Result};
use crate::nalu::NaluType;
use crate::parser::H264NaluParser;

/// The 4-byte start code written in front of every NAL unit.
pub const ANNEX_B_START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Returns the index of the subsample containing byte `position`.
pub fn find_subsample_index(subsamples: &[SubsampleEntry], position: usize) -> Option<usize> {
    let mut end = 0usize;
    for (index, subsample) in subsamples.iter().enumerate() {
        end = end
            .saturating_add(subsample.clear_bytes as usize)
            .saturating_add(subsample.cypher_bytes as usize);
        if end > position {
            return Some(index);
        }
    }
    None
}

/// Replaces every `length_size`-byte NAL unit length prefix in `frame` with a
/// start code.
///
/// A 4-byte prefix is rewritten in place. Shorter prefixes grow the frame,
/// and the clear part of the subsample holding each prefix grows with it.
pub fn convert_frame_to_annex_b(
    length_size: u8,
    frame: &mut Vec<u8>,
    subsamples: &mut [SubsampleEntry],
) -> Result<()> {
    match length_size {
        4 => convert_in_place(frame),
        1 | 2 => convert_with_growth(length_size as usize, frame, subsamples),
        other => Err(H264Error::InvalidLengthSize(other)),
    }
}

fn convert_in_place(frame: &mut [u8]) -> Result<()> {
    const LENGTH_SIZE: usize = 4;

    let mut pos = 0;
    while pos + LENGTH_SIZE < frame.len() {
        let nal_length = BigEndian::read_u32(&frame[pos..]) as usize;
        if nal_length == 0 {
            return Err(H264Error::EmptyNalu { offset: pos });
        }
        let payload = pos + LENGTH_SIZE;
        if nal_length > frame.len() - payload {
            return Err(H264Error::NaluOutOfBounds {
                offset: payload,
                length: nal_length,
                frame_len: frame.len(),
            });
        }

        frame[pos..payload].copy_from_slice(&ANNEX_B_START_CODE);
        pos = payload + nal_length;
    }

    if pos != frame.len() {
        return Err(H264Error::TrailingBytes {
            trailing: frame.len() - pos,
        });
    }
    Ok(())
}

fn convert_with_growth(
    length_size: usize,
    frame: &mut Vec<u8>,
    subsamples: &mut [SubsampleEntry],
) -> Result<()> {
    let source = std::mem::take(frame);
    frame.reserve(source.len() + 32);
    let size_adjustment = (ANNEX_B_START_CODE.len() - length_size) as u32;

    let mut pos = 0;
    while pos + length_size < source.len() {
        let nal_length = BigEndian::read_uint(&source[pos..], length_size) as usize;
        if nal_length == 0 {
            return Err(H264Error::EmptyNalu { offset: pos });
        }
        pos += length_size;
        if nal_length > source.len() - pos {
            return Err(H264Error::NaluOutOfBounds {
                offset: pos,
                length: nal_length,
                frame_len: source.len(),
            });
        }

        let start_code_pos = frame.len();
        frame.extend_from_slice(&ANNEX_B_START_CODE);
        if !subsamples.is_empty() {
            let index = find_subsample_index(subsamples, start_code_pos).ok_or(
                H264Error::SubsampleNotFound {
                    position: start_code_pos,
                },
            )?;
            subsamples[index].clear_bytes += size_adjustment;
        }

        frame.extend_from_slice(&source[pos..pos + nal_length]);
        pos += nal_length;
    }

    if pos != source.len() {
        return Err(H264Error::TrailingBytes {
            trailing: source.len() - pos,
        });
    }
    Ok(())
}

/// Concatenates the SPS and PPS lists of `config`, each behind a start code.
pub fn convert_config_to_annex_b(config: &AVCDecoderConfigurationRecord) -> Vec<u8> {
    let parameter_sets = config.sps.iter().chain(config.pps.iter());
    let total: usize = parameter_sets
        .clone()
        .map(|ps| ps.len() + ANNEX_B_START_CODE.len())
        .sum();

    let mut out = Vec::with_capacity(total);
    for ps in parameter_sets {
        out.extend_from_slice(&ANNEX_B_START_CODE);
        out.extend_from_slice(ps);
    }
    out
}

/// Splices `block` into `frame` at `insert_at`, growing the clear part of the
/// subsample that covers the insertion point.
///
/// At the end of the frame the last subsample is extended when it has no
/// encrypted bytes; otherwise a clear-only subsample is appended.
pub fn splice_clear_block(
    frame: &mut Vec<u8>,
    subsamples: &mut Vec<SubsampleEntry>,
    insert_at: usize,
    block: &[u8],
) -> Result<()> {
    if !subsamples.is_empty() {
        let added = block.len() as u32;
        if insert_at < frame.len() {
            let index = find_subsample_index(subsamples, insert_at)
                .ok_or(H264Error::SubsampleNotFound { position: insert_at })?;
            subsamples[index].clear_bytes += added;
        } else if let Some(last) = subsamples.last_mut()
            && last.cypher_bytes == 0
        {
            last.clear_bytes += added;
        } else {
            subsamples.push(SubsampleEntry::new(added, 0));
        }
    }

    frame.splice(insert_at..insert_at, block.iter().copied());
    Ok(())
}

/// Inserts the SPS and PPS of `config` into an Annex-B `frame`, right after a
/// leading access unit delimiter if there is one, otherwise at the start.
pub fn insert_param_sets_annex_b(
    config: &AVCDecoderConfigurationRecord,
    frame: &mut Vec<u8>,
    subsamples: &mut Vec<SubsampleEntry>,
) -> Result<()> {
    let insert_at = {
        let mut parser = H264NaluParser::new();
        parser.set_encrypted_stream(frame, subsamples);
        let first = parser.advance_to_next_nalu()?.ok_or(H264Error::NoNalu)?;
        if first.nal_unit_type == NaluType::Aud {
            first.end_offset()
        } else {
            0
        }
    };

    let param_sets = convert_config_to_annex_b(config);
    splice_clear_block(frame, subsamples, insert_at, &param_sets)
}

/// Position in an access unit, in the order of ISO/IEC 14496-10 7.4.1.2.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NaluOrderState {
    AudAllowed,
    BeforeFirstVcl,
    AfterFirstVcl,
    EoStreamAllowed,
    NoMoreDataAllowed,
}

/// Returns the state after `nalu_type`, or `None` if it may not appear here.
fn next_order_state(
    state: NaluOrderState,
    last: Option<NaluType>,
    nalu_type: NaluType,
) -> Option<NaluOrderState> {
    use NaluOrderState::*;

    if state == NoMoreDataAllowed {
        return None;
    }

    match nalu_type {
        NaluType::Aud => (state == AudAllowed).then_some(BeforeFirstVcl),
        NaluType::Sei
        | NaluType::Prefix
        | NaluType::SubsetSps
        | NaluType::Dps
        | NaluType::Reserved17
        | NaluType::Reserved18
        | NaluType::Pps
        | NaluType::Sps => (state <= BeforeFirstVcl).then_some(BeforeFirstVcl),
        NaluType::SpsExt => (last == Some(NaluType::Sps)).then_some(state),
        NaluType::NonIdrSlice
        | NaluType::SliceDataA
        | NaluType::SliceDataB
        | NaluType::SliceDataC
        | NaluType::IdrSlice => (state <= AfterFirstVcl).then_some(AfterFirstVcl),
        NaluType::CodedSliceAux => (state == AfterFirstVcl).then_some(state),
        NaluType::EndOfSequence => (state == AfterFirstVcl).then_some(EoStreamAllowed),
        NaluType::EndOfStream => (state >= AfterFirstVcl).then_some(NoMoreDataAllowed),
        NaluType::Filler | NaluType::Unspecified => {
            (state >= AfterFirstVcl && state < EoStreamAllowed).then_some(state)
        }
        NaluType::CodedSliceExtension | NaluType::Other(_) => {
            (state == AfterFirstVcl).then_some(state)
        }
    }
}

/// Checks NAL unit ordering and detects whether the access unit starts with an
/// IDR slice.
///
/// An empty buffer is conformant. Otherwise the buffer is conformant when its
/// order is valid and it holds at least one coded slice.
pub fn analyze_annex_b(buffer: &[u8], subsamples: &[SubsampleEntry]) -> AnalysisResult {
    let mut result = AnalysisResult::default();
    if buffer.is_empty() {
        result.is_conformant = Some(true);
        return result;
    }

    let mut parser = H264NaluParser::new();
    parser.set_encrypted_stream(buffer, subsamples);

    let mut state = NaluOrderState::AudAllowed;
    let mut last = None;
    loop {
        let nalu = match parser.advance_to_next_nalu() {
            Ok(Some(nalu)) => nalu,
            Ok(None) => {
                result.is_conformant = Some(state >= NaluOrderState::AfterFirstVcl);
                return result;
            }
            Err(err) => {
                debug!("failed to parse Annex-B stream: {err}");
                result.is_conformant = Some(false);
                return result;
            }
        };

        let Some(next) = next_order_state(state, last, nalu.nal_unit_type) else {
            debug!(
                "unexpected NALU {:?} in state {:?}",
                nalu.nal_unit_type, state
            );
            result.is_conformant = Some(false);
            return result;
        };

        if result.is_keyframe.is_none() && nalu.nal_unit_type.is_vcl() {
            result.is_keyframe = Some(nalu.nal_unit_type == NaluType::IdrSlice);
        }

        state = next;
        last = Some(nalu.nal_unit_type);
    }
}

/// Returns `true` if `buffer` is a correctly ordered H.264 access unit.
pub fn is_valid_annex_b(buffer: &[u8], subsamples: &[SubsampleEntry]) -> bool {
    analyze_annex_b(buffer, subsamples).is_conformant == Some(true)
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use bytes::Bytes;
    use media_types::verify_subsamples_match_size;

    use super::*;

    const AUD: &[u8] = &[0x09, 0xF0];
    const SPS: &[u8] = &[0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02];
    const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];
    const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x21];
    const NON_IDR: &[u8] = &[0x41, 0x9A, 0x02];

    fn test_config(length_size: u8) -> AVCDecoderConfigurationRecord {
        AVCDecoderConfigurationRecord {
            configuration_version: 1,
            profile_indication: 0x42,
            profile_compatibility: 0xC0,
            level_indication: 0x1E,
            length_size,
            sps: vec![Bytes::from_static(SPS)],
            pps: vec![Bytes::from_static(PPS)],
            extended_config: None,
        }
    }

    fn length_prefixed(nalus: &[&[u8]], length_size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for nalu in nalus {
            let len = nalu.len() as u64;
            out.extend_from_slice(&len.to_be_bytes()[8 - length_size..]);
            out.extend_from_slice(nalu);
        }
        out
    }

    fn annex_b(nalus: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for nalu in nalus {
            out.extend_from_slice(&ANNEX_B_START_CODE);
            out.extend_from_slice(nalu);
        }
        out
    }

    fn with_headers(headers: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for header in headers {
            out.extend_from_slice(&ANNEX_B_START_CODE);
            out.push(*header);
            out.push(0x80);
        }
        out
    }

    #[test]
    fn test_convert_all_length_sizes() {
        let nalus: [&[u8]; 5] = [AUD, SPS, PPS, IDR, NON_IDR];
        for length_size in [1usize, 2, 4] {
            let mut frame = length_prefixed(&nalus, length_size);
            convert_frame_to_annex_b(length_size as u8, &mut frame, &mut []).unwrap();
            assert_eq!(frame, annex_b(&nalus), "length size {length_size}");
            assert!(is_valid_annex_b(&frame, &[]));
        }
    }

    #[test]
    fn test_convert_adjusts_subsamples() {
        let nalus: [&[u8]; 2] = [&[0x65, 0x88], &[0x41, 0x9A, 0x9B]];
        for length_size in [1usize, 2] {
            let mut frame = length_prefixed(&nalus, length_size);
            let header = length_size as u32 + 1;
            let mut subsamples = vec![
                SubsampleEntry::new(header, 1),
                SubsampleEntry::new(header, 2),
            ];
            convert_frame_to_annex_b(length_size as u8, &mut frame, &mut subsamples).unwrap();
            assert_eq!(frame, annex_b(&nalus));
            assert_eq!(
                subsamples,
                vec![SubsampleEntry::new(5, 1), SubsampleEntry::new(5, 2)]
            );
            assert!(verify_subsamples_match_size(&subsamples, frame.len()));
            assert!(is_valid_annex_b(&frame, &subsamples));
        }
    }

    #[test]
    fn test_convert_length_4_keeps_subsamples() {
        let mut frame = length_prefixed(&[IDR], 4);
        let mut subsamples = vec![SubsampleEntry::new(5, 3)];
        convert_frame_to_annex_b(4, &mut frame, &mut subsamples).unwrap();
        assert_eq!(subsamples, vec![SubsampleEntry::new(5, 3)]);
        assert_eq!(&frame[..4], &ANNEX_B_START_CODE);
    }

    #[test]
    fn test_convert_errors() {
        let mut frame = vec![0, 0, 0, 0, 0x65];
        assert!(matches!(
            convert_frame_to_annex_b(4, &mut frame, &mut []),
            Err(H264Error::EmptyNalu { offset: 0 })
        ));

        let mut frame = vec![0, 0, 0, 9, 0x65];
        assert!(matches!(
            convert_frame_to_annex_b(4, &mut frame, &mut []),
            Err(H264Error::NaluOutOfBounds { length: 9, .. })
        ));

        let mut frame = vec![0, 0, 0, 1, 0x65, 0xAA];
        assert!(matches!(
            convert_frame_to_annex_b(4, &mut frame, &mut []),
            Err(H264Error::TrailingBytes { trailing: 1 })
        ));

        let mut frame = vec![0, 1, 0x65, 0];
        assert!(matches!(
            convert_frame_to_annex_b(2, &mut frame, &mut []),
            Err(H264Error::TrailingBytes { trailing: 1 })
        ));

        let mut frame = vec![1, 0x65, 0, 0x41];
        assert!(matches!(
            convert_frame_to_annex_b(1, &mut frame, &mut []),
            Err(H264Error::EmptyNalu { offset: 2 })
        ));

        let mut frame = vec![0, 0, 1, 0x65];
        assert!(matches!(
            convert_frame_to_annex_b(3, &mut frame, &mut []),
            Err(H264Error::InvalidLengthSize(3))
        ));
    }

    #[test]
    fn test_convert_empty_frame() {
        let mut frame = Vec::new();
        convert_frame_to_annex_b(2, &mut frame, &mut []).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_find_subsample_index() {
        let subsamples = [SubsampleEntry::new(2, 3), SubsampleEntry::new(1, 4)];
        assert_eq!(find_subsample_index(&subsamples, 0), Some(0));
        assert_eq!(find_subsample_index(&subsamples, 4), Some(0));
        assert_eq!(find_subsample_index(&subsamples, 5), Some(1));
        assert_eq!(find_subsample_index(&subsamples, 9), Some(1));
        assert_eq!(find_subsample_index(&subsamples, 10), None);
    }

    #[test]
    fn test_convert_config() {
        let out = convert_config_to_annex_b(&test_config(4));
        assert_eq!(out, annex_b(&[SPS, PPS]));
    }

    #[test]
    fn test_insert_param_sets_after_aud() {
        let mut frame = annex_b(&[AUD, IDR]);
        let mut subsamples = vec![SubsampleEntry::new(11, 3)];
        insert_param_sets_annex_b(&test_config(4), &mut frame, &mut subsamples).unwrap();

        assert_eq!(frame, annex_b(&[AUD, SPS, PPS, IDR]));
        assert_eq!(subsamples, vec![SubsampleEntry::new(29, 3)]);
        assert!(verify_subsamples_match_size(&subsamples, frame.len()));
        assert!(is_valid_annex_b(&frame, &subsamples));
    }

    #[test]
    fn test_insert_param_sets_at_start() {
        let mut frame = annex_b(&[IDR]);
        let mut subsamples = Vec::new();
        insert_param_sets_annex_b(&test_config(4), &mut frame, &mut subsamples).unwrap();
        assert_eq!(frame, annex_b(&[SPS, PPS, IDR]));
        assert!(subsamples.is_empty());
    }

    #[test]
    fn test_insert_param_sets_at_end() {
        let mut frame = annex_b(&[AUD]);
        let mut subsamples = vec![SubsampleEntry::new(6, 0)];
        insert_param_sets_annex_b(&test_config(4), &mut frame, &mut subsamples).unwrap();
        assert_eq!(subsamples, vec![SubsampleEntry::new(24, 0)]);

        let mut frame = annex_b(&[&[0x09, 0xF0, 0xAA, 0xBB]]);
        let mut subsamples = vec![SubsampleEntry::new(6, 2)];
        insert_param_sets_annex_b(&test_config(4), &mut frame, &mut subsamples).unwrap();
        assert_eq!(
            subsamples,
            vec![SubsampleEntry::new(6, 2), SubsampleEntry::new(18, 0)]
        );
        assert!(verify_subsamples_match_size(&subsamples, frame.len()));
    }

    #[test]
    fn test_insert_param_sets_empty_frame() {
        let mut frame = Vec::new();
        let err = insert_param_sets_annex_b(&test_config(4), &mut frame, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, H264Error::NoNalu));
    }

    #[test]
    fn test_nalu_order() {
        let cases: &[(&[u8], bool)] = &[
            (&[0x09], false),
            (&[0x09, 0x67, 0x68, 0x65], true),
            (&[0x67, 0x09, 0x65], false),
            (&[0x65, 0x67], false),
            (&[0x65, 0x41, 0x0A, 0x0B], true),
            (&[0x65, 0x0B, 0x65], false),
            (&[0x65, 0x0A, 0x65], false),
            (&[0x67, 0x0D, 0x68, 0x65], true),
            (&[0x68, 0x0D, 0x65], false),
            (&[0x06, 0x0C, 0x65], false),
            (&[0x65, 0x0C], true),
            (&[0x65, 0x13], true),
            (&[0x13], false),
            (&[0x65, 0x15], true),
            (&[0x67, 0x15], false),
            (&[0x06, 0x06, 0x41], true),
        ];
        for (headers, expected) in cases {
            assert_eq!(
                is_valid_annex_b(&with_headers(headers), &[]),
                *expected,
                "headers {headers:02x?}"
            );
        }
    }

    #[test]
    fn test_empty_buffer_is_valid() {
        assert!(is_valid_annex_b(&[], &[]));
    }

    #[test]
    fn test_analyze_keyframe() {
        let result = analyze_annex_b(&with_headers(&[0x09, 0x41]), &[]);
        assert_eq!(result.is_keyframe, Some(false));
        assert_eq!(result.is_conformant, Some(true));

        let result = analyze_annex_b(&with_headers(&[0x67, 0x68]), &[]);
        assert_eq!(result.is_keyframe, None);
        assert_eq!(result.is_conformant, Some(false));

        let result = analyze_annex_b(&with_headers(&[0x67, 0x68, 0x65, 0x41]), &[]);
        assert_eq!(result.is_keyframe, Some(true));
    }

    #[test]
    fn test_analyze_invalid_stream() {
        let result = analyze_annex_b(&[0, 0, 0, 1, 0xE5, 0x00], &[]);
        assert_eq!(result.is_conformant, Some(false));
    }
}
