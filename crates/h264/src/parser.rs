use media_types::{EncryptedRanges, SubsampleEntry, total_subsample_size};
use memchr::memchr;
use tracing::trace;

use crate::error::NaluError;
use crate::nalu::{Nalu, NaluType};

/// Position and length of an Annex-B start code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartCode {
    pub offset: usize,
    /// 3 for `00 00 01`, 4 for `00 00 00 01`.
    pub size: usize,
}

/// Finds the first `00 00 01` in `data`. A zero byte right before it is
/// treated as part of a 4-byte start code.
pub fn find_start_code(data: &[u8]) -> Option<StartCode> {
    let mut search_from = 2;
    while search_from < data.len() {
        let idx = search_from + memchr(0x01, &data[search_from..])?;
        if data[idx - 1] == 0 && data[idx - 2] == 0 {
            let mut offset = idx - 2;
            let mut size = 3;
            if offset > 0 && data[offset - 1] == 0 {
                offset -= 1;
                size += 1;
            }
            return Some(StartCode { offset, size });
        }
        search_from = idx + 1;
    }
    None
}

/// Like [`find_start_code`], but ignores start codes that overlap `encrypted`.
///
/// `base` is the position of `data[0]` in the coordinate space of
/// `encrypted`. The start code and the NAL unit header byte after it must all
/// be clear; otherwise the search resumes one byte past the rejected match.
pub fn find_start_code_in_clear_ranges(
    data: &[u8],
    base: usize,
    encrypted: &EncryptedRanges,
) -> Option<StartCode> {
    if encrypted.is_empty() {
        return find_start_code(data);
    }

    let mut start = 0;
    loop {
        let found = find_start_code(&data[start..])?;
        let code_start = base + start + found.offset;
        let code_end = code_start + found.size;
        if !encrypted.intersects(code_start, code_end + 1) {
            return Some(StartCode {
                offset: start + found.offset,
                size: found.size,
            });
        }
        start += found.offset + 1;
    }
}

/// Splits an Annex-B stream into raw NAL unit payloads.
///
/// Shared by the codec-specific parsers, which only differ in how they decode
/// the NAL unit header.
#[derive(Debug, Clone, Default)]
pub struct NaluScanner<'a> {
    stream: &'a [u8],
    pos: usize,
    encrypted: EncryptedRanges,
    subsamples_overrun: bool,
}

impl<'a> NaluScanner<'a> {
    pub fn new(stream: &'a [u8], subsamples: &[SubsampleEntry]) -> Self {
        let subsamples_overrun = !subsamples.is_empty()
            && total_subsample_size(subsamples).is_none_or(|total| total > stream.len());
        Self {
            stream,
            pos: 0,
            encrypted: EncryptedRanges::from_subsamples(subsamples),
            subsamples_overrun,
        }
    }

    /// Returns the offset and payload of the next NAL unit, or `None` once the
    /// stream holds no further start code followed by data.
    pub fn next_nalu(&mut self) -> Result<Option<(usize, &'a [u8])>, NaluError> {
        if self.subsamples_overrun {
            return Err(NaluError::UnsupportedStream);
        }

        let Some(start_code) =
            find_start_code_in_clear_ranges(&self.stream[self.pos..], self.pos, &self.encrypted)
        else {
            self.pos = self.stream.len();
            return Ok(None);
        };

        let nalu_start = self.pos + start_code.offset + start_code.size;
        if nalu_start >= self.stream.len() {
            self.pos = self.stream.len();
            return Ok(None);
        }

        let nalu_len = find_start_code_in_clear_ranges(
            &self.stream[nalu_start..],
            nalu_start,
            &self.encrypted,
        )
        .map_or(self.stream.len() - nalu_start, |next| next.offset);

        self.pos = nalu_start + nalu_len;
        if nalu_len == 0 {
            return Ok(None);
        }

        trace!(offset = nalu_start, size = nalu_len, "NALU found");
        Ok(Some((nalu_start, &self.stream[nalu_start..nalu_start + nalu_len])))
    }
}

/// Iterates over the NAL units of an H.264 Annex-B stream.
#[derive(Debug, Clone, Default)]
pub struct H264NaluParser<'a> {
    scanner: NaluScanner<'a>,
}

impl<'a> H264NaluParser<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the parser to the start of an unencrypted stream.
    pub fn set_stream(&mut self, stream: &'a [u8]) {
        self.set_encrypted_stream(stream, &[]);
    }

    /// Resets the parser to the start of `stream`, whose encrypted regions are
    /// described by `subsamples`.
    pub fn set_encrypted_stream(&mut self, stream: &'a [u8], subsamples: &[SubsampleEntry]) {
        self.scanner = NaluScanner::new(stream, subsamples);
    }

    /// Returns the next NAL unit, `Ok(None)` at the end of the stream.
    pub fn advance_to_next_nalu(&mut self) -> Result<Option<Nalu<'a>>, NaluError> {
        let Some((offset, data)) = self.scanner.next_nalu()? else {
            return Ok(None);
        };

        let header = data[0];
        if header & 0x80 != 0 {
            return Err(NaluError::InvalidStream);
        }

        Ok(Some(Nalu {
            data,
            nal_ref_idc: (header >> 5) & 0x03,
            nal_unit_type: NaluType::from(header & 0x1f),
            offset,
        }))
    }
}
