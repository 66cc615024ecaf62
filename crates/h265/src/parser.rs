use std::io;

use bytes_util::BitReader;
use h264::{NaluError, NaluScanner};
use media_types::SubsampleEntry;

use crate::nalu::{Nalu, NaluType};

fn read_header(data: &[u8]) -> io::Result<(bool, u8, u8, u8)> {
    let mut bit_reader = BitReader::new(data);
    let forbidden_zero_bit = bit_reader.read_bit()?;
    let nal_unit_type = bit_reader.read_bits(6)? as u8;
    let nuh_layer_id = bit_reader.read_bits(6)? as u8;
    let nuh_temporal_id_plus1 = bit_reader.read_bits(3)? as u8;
    Ok((
        forbidden_zero_bit,
        nal_unit_type,
        nuh_layer_id,
        nuh_temporal_id_plus1,
    ))
}

/// Iterates over the NAL units of an H.265 Annex-B stream.
///
/// Start codes are only recognized in clear bytes, see
/// [`h264::find_start_code_in_clear_ranges`].
#[derive(Debug, Clone, Default)]
pub struct H265NaluParser<'a> {
    scanner: NaluScanner<'a>,
}

impl<'a> H265NaluParser<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stream(&mut self, stream: &'a [u8]) {
        self.set_encrypted_stream(stream, &[]);
    }

    pub fn set_encrypted_stream(&mut self, stream: &'a [u8], subsamples: &[SubsampleEntry]) {
        self.scanner = NaluScanner::new(stream, subsamples);
    }

    /// Returns the next NAL unit, `Ok(None)` at the end of the stream.
    pub fn advance_to_next_nalu(&mut self) -> Result<Option<Nalu<'a>>, NaluError> {
        let Some((offset, data)) = self.scanner.next_nalu()? else {
            return Ok(None);
        };

        let (forbidden_zero_bit, nal_unit_type, nuh_layer_id, nuh_temporal_id_plus1) =
            read_header(data).map_err(|_| NaluError::InvalidStream)?;

        if forbidden_zero_bit {
            return Err(NaluError::InvalidStream);
        }

        Ok(Some(Nalu {
            data,
            nal_unit_type: NaluType::from(nal_unit_type),
            nuh_layer_id,
            nuh_temporal_id_plus1,
            offset,
        }))
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_fields() {
        // VPS, SPS, PPS, IDR_W_RADL with temporal id 1
        let stream = [
            0, 0, 0, 1, 0x40, 0x01, 0x0C, 0, 0, 0, 1, 0x42, 0x01, 0x01, 0, 0, 1, 0x44, 0x01,
            0xC0, 0, 0, 0, 1, 0x26, 0x01, 0xAF,
        ];
        let mut parser = H265NaluParser::new();
        parser.set_stream(&stream);

        let mut types = Vec::new();
        while let Some(nalu) = parser.advance_to_next_nalu().unwrap() {
            assert_eq!(nalu.nuh_layer_id, 0);
            assert_eq!(nalu.nuh_temporal_id_plus1, 1);
            types.push(nalu.nal_unit_type);
        }
        assert_eq!(
            types,
            vec![NaluType::Vps, NaluType::Sps, NaluType::Pps, NaluType::IdrWRadl]
        );
    }

    #[test]
    fn test_layer_id() {
        // type 1, layer 1, tid+1 = 5
        let mut parser = H265NaluParser::new();
        parser.set_stream(&[0, 0, 1, 0x02, 0x0D, 0xAA]);
        let nalu = parser.advance_to_next_nalu().unwrap().unwrap();
        assert_eq!(nalu.nal_unit_type, NaluType::TrailR);
        assert_eq!(nalu.nuh_layer_id, 1);
        assert_eq!(nalu.nuh_temporal_id_plus1, 5);
        assert_eq!(nalu.offset, 3);
    }

    #[test]
    fn test_forbidden_bit() {
        let mut parser = H265NaluParser::new();
        parser.set_stream(&[0, 0, 1, 0xC0, 0x01]);
        assert_eq!(parser.advance_to_next_nalu(), Err(NaluError::InvalidStream));
    }

    #[test]
    fn test_truncated_header() {
        let mut parser = H265NaluParser::new();
        parser.set_stream(&[0, 0, 1, 0x40]);
        assert_eq!(parser.advance_to_next_nalu(), Err(NaluError::InvalidStream));
    }

    #[test]
    fn test_encrypted_start_code_skipped() {
        let stream = [0, 0, 0, 1, 0x26, 0x01, 0xAA, 0, 0, 1, 0x40, 0x01];
        let mut parser = H265NaluParser::new();
        parser.set_encrypted_stream(&stream, &[SubsampleEntry::new(6, 6)]);
        let nalu = parser.advance_to_next_nalu().unwrap().unwrap();
        assert_eq!(nalu.data.len(), 8);
        assert_eq!(parser.advance_to_next_nalu(), Ok(None));
    }
}
