//! Shared fMP4 test builders.
//!
//! This module is available for local mp4 tests and optionally for downstream
//! crate tests when the `test-utils` feature is enabled.

use crate::box_reader::{BoxHeader, BoxReader, ParseBox};
use crate::error::{Mp4Error, Result};

pub fn make_box(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let size = (8 + body.len()) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(body);
    out
}

pub fn make_full_box(fourcc: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + payload.len());
    body.push(version);
    body.push(((flags >> 16) & 0xFF) as u8);
    body.push(((flags >> 8) & 0xFF) as u8);
    body.push((flags & 0xFF) as u8);
    body.extend_from_slice(payload);
    make_box(fourcc, &body)
}

/// Runs `parse` on a reader over the first box of `data`.
pub fn with_reader<T>(
    data: &[u8],
    parse: impl FnOnce(&mut BoxReader<'_>) -> Result<T>,
) -> Result<T> {
    let header = BoxHeader::parse(data, true)
        .into_result()?
        .ok_or(Mp4Error::TruncatedHeader)?;
    let mut parent = BoxReader::read_concatenated_boxes(data);
    parent.scan_children()?;
    let mut reader = parent
        .take_child(header.box_type)
        .ok_or(Mp4Error::TruncatedHeader)?;
    parse(&mut reader)
}

pub fn parse_box<T: ParseBox>(data: &[u8]) -> Result<T> {
    with_reader(data, T::parse)
}

// Protection

pub fn make_tenc(is_encrypted: bool, iv_size: u8, key_id: [u8; 16]) -> Vec<u8> {
    let mut payload = vec![0, 0, is_encrypted as u8, iv_size];
    payload.extend_from_slice(&key_id);
    make_full_box(b"tenc", 0, 0, &payload)
}

/// A `sinf` box; `schi_children` usually holds a `tenc` box.
pub fn make_sinf(format: &[u8; 4], scheme: &[u8; 4], schi_children: &[u8]) -> Vec<u8> {
    let mut schm = scheme.to_vec();
    schm.extend_from_slice(&0x0001_0000u32.to_be_bytes());

    let mut body = make_box(b"frma", format);
    body.extend(make_full_box(b"schm", 0, 0, &schm));
    body.extend(make_box(b"schi", schi_children));
    make_box(b"sinf", &body)
}

/// A `seig` `sbgp` box from `(sample_count, group_description_index)` pairs.
pub fn make_sbgp(entries: &[(u32, u32)]) -> Vec<u8> {
    let mut payload = b"seig".to_vec();
    payload.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (sample_count, index) in entries {
        payload.extend_from_slice(&sample_count.to_be_bytes());
        payload.extend_from_slice(&index.to_be_bytes());
    }
    make_full_box(b"sbgp", 0, 0, &payload)
}

/// A version 1 `seig` `sgpd` box from `(is_encrypted, iv_size, key_id)` entries.
pub fn make_sgpd(entries: &[(bool, u8, [u8; 16])]) -> Vec<u8> {
    let mut payload = b"seig".to_vec();
    payload.extend_from_slice(&20u32.to_be_bytes());
    payload.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (is_encrypted, iv_size, key_id) in entries {
        payload.extend_from_slice(&[0, 0, *is_encrypted as u8, *iv_size]);
        payload.extend_from_slice(key_id);
    }
    make_full_box(b"sgpd", 1, 0, &payload)
}

/// A `pssh` box. Key ids are written for every version above 0.
pub fn make_pssh(version: u8, system_id: &[u8; 16], key_ids: &[[u8; 16]], data: &[u8]) -> Vec<u8> {
    let mut payload = system_id.to_vec();
    if version > 0 {
        payload.extend_from_slice(&(key_ids.len() as u32).to_be_bytes());
        for key_id in key_ids {
            payload.extend_from_slice(key_id);
        }
    }
    payload.extend_from_slice(&(data.len() as u32).to_be_bytes());
    payload.extend_from_slice(data);
    make_full_box(b"pssh", version, 0, &payload)
}

// Sample entries

pub const TEST_SPS: [u8; 6] = [0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02];
pub const TEST_PPS: [u8; 4] = [0x68, 0xCE, 0x3C, 0x80];

/// An `avcC` box with one SPS ([`TEST_SPS`]) and one PPS ([`TEST_PPS`]).
pub fn make_avcc(length_size_minus_one: u8) -> Vec<u8> {
    let mut record = vec![1, 0x42, 0xC0, 0x1E, 0xFC | length_size_minus_one, 0xE1];
    record.extend_from_slice(&(TEST_SPS.len() as u16).to_be_bytes());
    record.extend_from_slice(&TEST_SPS);
    record.push(1);
    record.extend_from_slice(&(TEST_PPS.len() as u16).to_be_bytes());
    record.extend_from_slice(&TEST_PPS);
    make_box(b"avcC", &record)
}

/// An MPEG-4 audio `esds` box.
pub fn make_esds(decoder_specific_info: &[u8]) -> Vec<u8> {
    let mut decoder_config = vec![0x40, 0x15, 0, 0, 0];
    decoder_config.extend_from_slice(&128_000u32.to_be_bytes());
    decoder_config.extend_from_slice(&128_000u32.to_be_bytes());
    decoder_config.push(0x05);
    decoder_config.push(decoder_specific_info.len() as u8);
    decoder_config.extend_from_slice(decoder_specific_info);

    let mut es = vec![0, 1, 0]; // ES_ID, flags
    es.push(0x04);
    es.push(decoder_config.len() as u8);
    es.extend(decoder_config);

    let mut payload = vec![0x03, es.len() as u8];
    payload.extend(es);
    make_full_box(b"esds", 0, 0, &payload)
}

pub fn make_visual_sample_entry(fourcc: &[u8; 4], width: u16, height: u16, children: &[u8]) -> Vec<u8> {
    let mut body = vec![0; 6];
    body.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    body.extend_from_slice(&[0; 16]);
    body.extend_from_slice(&width.to_be_bytes());
    body.extend_from_slice(&height.to_be_bytes());
    body.extend_from_slice(&0x0048_0000u32.to_be_bytes());
    body.extend_from_slice(&0x0048_0000u32.to_be_bytes());
    body.extend_from_slice(&[0; 4]);
    body.extend_from_slice(&1u16.to_be_bytes()); // frame_count
    body.extend_from_slice(&[0; 32]);
    body.extend_from_slice(&0x0018u16.to_be_bytes());
    body.extend_from_slice(&(-1i16).to_be_bytes());
    body.extend_from_slice(children);
    make_box(fourcc, &body)
}

/// An audio sample entry with 16-bit samples.
pub fn make_audio_sample_entry(
    fourcc: &[u8; 4],
    channel_count: u16,
    sample_rate: u32,
    children: &[u8],
) -> Vec<u8> {
    let mut body = vec![0; 6];
    body.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    body.extend_from_slice(&[0; 8]);
    body.extend_from_slice(&channel_count.to_be_bytes());
    body.extend_from_slice(&16u16.to_be_bytes());
    body.extend_from_slice(&[0; 4]);
    body.extend_from_slice(&(sample_rate << 16).to_be_bytes());
    body.extend_from_slice(children);
    make_box(fourcc, &body)
}

// Movie

pub fn make_ftyp() -> Vec<u8> {
    let mut body = b"iso6".to_vec();
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(b"iso6dash");
    make_box(b"ftyp", &body)
}

pub fn make_mvhd(timescale: u32) -> Vec<u8> {
    let mut payload = vec![0; 8];
    payload.extend_from_slice(&timescale.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes()); // duration
    payload.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate
    payload.extend_from_slice(&0x0100u16.to_be_bytes()); // volume
    payload.extend_from_slice(&[0; 10]);
    payload.extend(identity_matrix());
    payload.extend_from_slice(&[0; 24]);
    payload.extend_from_slice(&2u32.to_be_bytes()); // next_track_id
    make_full_box(b"mvhd", 0, 0, &payload)
}

fn identity_matrix() -> Vec<u8> {
    [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000]
        .iter()
        .flat_map(|value| value.to_be_bytes())
        .collect()
}

/// A `tkhd` box; `width` and `height` are 16.16 fixed point.
pub fn make_tkhd(version: u8, track_id: u32, width: u32, height: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    if version == 1 {
        payload.extend_from_slice(&[0; 16]);
        payload.extend_from_slice(&track_id.to_be_bytes());
        payload.extend_from_slice(&[0; 4]);
        payload.extend_from_slice(&0u64.to_be_bytes());
    } else {
        payload.extend_from_slice(&[0; 8]);
        payload.extend_from_slice(&track_id.to_be_bytes());
        payload.extend_from_slice(&[0; 4]);
        payload.extend_from_slice(&0u32.to_be_bytes());
    }
    payload.extend_from_slice(&[0; 8]);
    payload.extend_from_slice(&[0; 8]); // layer, alternate_group, volume, reserved
    payload.extend(identity_matrix());
    payload.extend_from_slice(&width.to_be_bytes());
    payload.extend_from_slice(&height.to_be_bytes());
    make_full_box(b"tkhd", version, 0x03, &payload)
}

/// A version 0 `mdhd` box with the language set to `eng`.
pub fn make_mdhd(timescale: u32) -> Vec<u8> {
    let mut payload = vec![0; 8];
    payload.extend_from_slice(&timescale.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes());
    let language: u16 = (5 << 10) | (14 << 5) | 7;
    payload.extend_from_slice(&language.to_be_bytes());
    payload.extend_from_slice(&[0; 2]);
    make_full_box(b"mdhd", 0, 0, &payload)
}

pub fn make_hdlr(handler_type: &[u8; 4]) -> Vec<u8> {
    let mut payload = vec![0; 4];
    payload.extend_from_slice(handler_type);
    payload.extend_from_slice(&[0; 12]);
    payload.push(0);
    make_full_box(b"hdlr", 0, 0, &payload)
}

/// An `elst` box from `(segment_duration, media_time)` pairs.
pub fn make_elst(version: u8, edits: &[(u64, i64)]) -> Vec<u8> {
    let mut payload = (edits.len() as u32).to_be_bytes().to_vec();
    for &(segment_duration, media_time) in edits {
        if version == 1 {
            payload.extend_from_slice(&segment_duration.to_be_bytes());
            payload.extend_from_slice(&media_time.to_be_bytes());
        } else {
            payload.extend_from_slice(&(segment_duration as u32).to_be_bytes());
            payload.extend_from_slice(&(media_time as i32).to_be_bytes());
        }
        payload.extend_from_slice(&1i16.to_be_bytes());
        payload.extend_from_slice(&0i16.to_be_bytes());
    }
    make_full_box(b"elst", version, 0, &payload)
}

pub fn make_trex(
    track_id: u32,
    default_sample_description_index: u32,
    default_sample_duration: u32,
    default_sample_size: u32,
    default_sample_flags: u32,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(20);
    for value in [
        track_id,
        default_sample_description_index,
        default_sample_duration,
        default_sample_size,
        default_sample_flags,
    ] {
        payload.extend_from_slice(&value.to_be_bytes());
    }
    make_full_box(b"trex", 0, 0, &payload)
}

/// A `trak` box.
///
/// `sample_entries` go into `stsd`, `stbl_extra` is appended to `stbl` and
/// `elst`, when given, is wrapped in an `edts` box.
pub fn make_trak(
    track_id: u32,
    timescale: u32,
    handler_type: &[u8; 4],
    sample_entries: &[Vec<u8>],
    stbl_extra: &[u8],
    elst: Option<&[u8]>,
) -> Vec<u8> {
    let mut stsd = (sample_entries.len() as u32).to_be_bytes().to_vec();
    for entry in sample_entries {
        stsd.extend_from_slice(entry);
    }
    let mut stbl = make_full_box(b"stsd", 0, 0, &stsd);
    stbl.extend_from_slice(stbl_extra);
    let minf = make_box(b"minf", &make_box(b"stbl", &stbl));

    let mut mdia = make_mdhd(timescale);
    mdia.extend(make_hdlr(handler_type));
    mdia.extend(minf);

    let mut trak = make_tkhd(0, track_id, 640 << 16, 360 << 16);
    if let Some(elst) = elst {
        trak.extend(make_box(b"edts", elst));
    }
    trak.extend(make_box(b"mdia", &mdia));
    make_box(b"trak", &trak)
}

/// An H.264 video track with 4-byte NAL unit lengths.
pub fn make_video_trak(track_id: u32, timescale: u32, elst: Option<&[u8]>) -> Vec<u8> {
    let entry = make_visual_sample_entry(b"avc1", 640, 360, &make_avcc(3));
    make_trak(track_id, timescale, b"vide", &[entry], &[], elst)
}

/// A `cenc` protected H.264 video track.
pub fn make_encrypted_video_trak(
    track_id: u32,
    timescale: u32,
    tenc: &[u8],
    stbl_extra: &[u8],
) -> Vec<u8> {
    let mut children = make_sinf(b"avc1", b"cenc", tenc);
    children.extend(make_avcc(3));
    let entry = make_visual_sample_entry(b"encv", 640, 360, &children);
    make_trak(track_id, timescale, b"vide", &[entry], stbl_extra, None)
}

/// An AAC audio track.
pub fn make_audio_trak(track_id: u32, timescale: u32) -> Vec<u8> {
    let entry = make_audio_sample_entry(b"mp4a", 2, timescale, &make_esds(&[0x11, 0x90]));
    make_trak(track_id, timescale, b"soun", &[entry], &[], None)
}

/// A `moov` box. No `mvex` is written when `trex` is empty.
pub fn make_moov(traks: &[Vec<u8>], trex: &[Vec<u8>]) -> Vec<u8> {
    let mut body = make_mvhd(1000);
    for trak in traks {
        body.extend_from_slice(trak);
    }
    if !trex.is_empty() {
        body.extend(make_box(b"mvex", &trex.concat()));
    }
    make_box(b"moov", &body)
}

// Fragments

/// A `tfhd` box with default-base-is-moof set.
pub fn make_tfhd(
    track_id: u32,
    sample_description_index: Option<u32>,
    default_sample_duration: Option<u32>,
    default_sample_size: Option<u32>,
    default_sample_flags: Option<u32>,
) -> Vec<u8> {
    let mut flags = 0x02_0000;
    let mut payload = track_id.to_be_bytes().to_vec();
    for (mask, value) in [
        (0x02, sample_description_index),
        (0x08, default_sample_duration),
        (0x10, default_sample_size),
        (0x20, default_sample_flags),
    ] {
        if let Some(value) = value {
            flags |= mask;
            payload.extend_from_slice(&value.to_be_bytes());
        }
    }
    make_full_box(b"tfhd", 0, flags, &payload)
}

pub fn make_tfdt(version: u8, decode_time: u64) -> Vec<u8> {
    let payload = if version == 1 {
        decode_time.to_be_bytes().to_vec()
    } else {
        (decode_time as u32).to_be_bytes().to_vec()
    };
    make_full_box(b"tfdt", version, 0, &payload)
}

/// Per-sample `trun` fields. A field is written for every sample when it is
/// set on the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrunSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub cts_offset: Option<i32>,
}

pub fn make_trun(
    version: u8,
    data_offset: Option<i32>,
    first_sample_flags: Option<u32>,
    samples: &[TrunSample],
) -> Vec<u8> {
    let first = samples.first().copied().unwrap_or_default();
    let mut flags = 0;
    let mut payload = (samples.len() as u32).to_be_bytes().to_vec();
    if let Some(offset) = data_offset {
        flags |= 0x001;
        payload.extend_from_slice(&offset.to_be_bytes());
    }
    if let Some(first_flags) = first_sample_flags {
        flags |= 0x004;
        payload.extend_from_slice(&first_flags.to_be_bytes());
    }
    if first.duration.is_some() {
        flags |= 0x100;
    }
    if first.size.is_some() {
        flags |= 0x200;
    }
    if first.flags.is_some() {
        flags |= 0x400;
    }
    if first.cts_offset.is_some() {
        flags |= 0x800;
    }

    for sample in samples {
        if first.duration.is_some() {
            payload.extend_from_slice(&sample.duration.unwrap_or(0).to_be_bytes());
        }
        if first.size.is_some() {
            payload.extend_from_slice(&sample.size.unwrap_or(0).to_be_bytes());
        }
        if first.flags.is_some() {
            payload.extend_from_slice(&sample.flags.unwrap_or(0).to_be_bytes());
        }
        if first.cts_offset.is_some() {
            payload.extend_from_slice(&sample.cts_offset.unwrap_or(0).to_be_bytes());
        }
    }
    make_full_box(b"trun", version, flags, &payload)
}

pub fn make_saio(version: u8, offsets: &[u64]) -> Vec<u8> {
    let mut payload = (offsets.len() as u32).to_be_bytes().to_vec();
    for &offset in offsets {
        if version == 1 {
            payload.extend_from_slice(&offset.to_be_bytes());
        } else {
            payload.extend_from_slice(&(offset as u32).to_be_bytes());
        }
    }
    make_full_box(b"saio", version, 0, &payload)
}

/// A `saiz` box. With a nonzero `default_size`, only the length of `sizes`
/// is used, as the sample count.
pub fn make_saiz(default_size: u8, sizes: &[u8]) -> Vec<u8> {
    let mut payload = vec![default_size];
    payload.extend_from_slice(&(sizes.len() as u32).to_be_bytes());
    if default_size == 0 {
        payload.extend_from_slice(sizes);
    }
    make_full_box(b"saiz", 0, 0, &payload)
}

pub fn make_traf(children: &[Vec<u8>]) -> Vec<u8> {
    make_box(b"traf", &children.concat())
}

pub fn make_moof(sequence_number: u32, trafs: &[Vec<u8>]) -> Vec<u8> {
    let mut body = make_full_box(b"mfhd", 0, 0, &sequence_number.to_be_bytes());
    body.extend(trafs.concat());
    make_box(b"moof", &body)
}

/// A `moof` followed by an `mdat` holding `mdat_body`.
///
/// `build_moof` receives the offset of the `mdat` payload from the start of
/// the `moof`, for use in `trun` data offsets and `saio` entries. It must
/// build a box of the same size whatever the offset.
pub fn make_fragment(build_moof: impl Fn(u32) -> Vec<u8>, mdat_body: &[u8]) -> Vec<u8> {
    let moof_size = build_moof(0).len() as u32;
    let mut out = build_moof(moof_size + 8);
    assert_eq!(out.len() as u32, moof_size, "moof size depends on the offset");
    out.extend(make_box(b"mdat", mdat_body));
    out
}

/// Auxiliary information entry with an IV and a subsample list.
pub fn make_cenc_aux_info(iv: &[u8], subsamples: &[(u16, u32)]) -> Vec<u8> {
    let mut out = iv.to_vec();
    if !subsamples.is_empty() {
        out.extend_from_slice(&(subsamples.len() as u16).to_be_bytes());
        for &(clear, cipher) in subsamples {
            out.extend_from_slice(&clear.to_be_bytes());
            out.extend_from_slice(&cipher.to_be_bytes());
        }
    }
    out
}
