/// H.264 `nal_unit_type` (ISO/IEC 14496-10 Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NaluType {
    Unspecified,
    NonIdrSlice,
    SliceDataA,
    SliceDataB,
    SliceDataC,
    IdrSlice,
    Sei,
    Sps,
    Pps,
    Aud,
    EndOfSequence,
    EndOfStream,
    Filler,
    SpsExt,
    Prefix,
    SubsetSps,
    Dps,
    Reserved17,
    Reserved18,
    CodedSliceAux,
    CodedSliceExtension,
    /// Types 21 to 31: reserved or unspecified.
    Other(u8),
}

impl NaluType {
    /// Coded slice of a picture (types 1 to 5).
    pub fn is_vcl(self) -> bool {
        matches!(
            self,
            NaluType::NonIdrSlice
                | NaluType::SliceDataA
                | NaluType::SliceDataB
                | NaluType::SliceDataC
                | NaluType::IdrSlice
        )
    }
}

impl From<u8> for NaluType {
    fn from(value: u8) -> Self {
        match value & 0x1f {
            0 => NaluType::Unspecified,
            1 => NaluType::NonIdrSlice,
            2 => NaluType::SliceDataA,
            3 => NaluType::SliceDataB,
            4 => NaluType::SliceDataC,
            5 => NaluType::IdrSlice,
            6 => NaluType::Sei,
            7 => NaluType::Sps,
            8 => NaluType::Pps,
            9 => NaluType::Aud,
            10 => NaluType::EndOfSequence,
            11 => NaluType::EndOfStream,
            12 => NaluType::Filler,
            13 => NaluType::SpsExt,
            14 => NaluType::Prefix,
            15 => NaluType::SubsetSps,
            16 => NaluType::Dps,
            17 => NaluType::Reserved17,
            18 => NaluType::Reserved18,
            19 => NaluType::CodedSliceAux,
            20 => NaluType::CodedSliceExtension,
            other => NaluType::Other(other),
        }
    }
}

impl From<NaluType> for u8 {
    fn from(value: NaluType) -> Self {
        match value {
            NaluType::Unspecified => 0,
            NaluType::NonIdrSlice => 1,
            NaluType::SliceDataA => 2,
            NaluType::SliceDataB => 3,
            NaluType::SliceDataC => 4,
            NaluType::IdrSlice => 5,
            NaluType::Sei => 6,
            NaluType::Sps => 7,
            NaluType::Pps => 8,
            NaluType::Aud => 9,
            NaluType::EndOfSequence => 10,
            NaluType::EndOfStream => 11,
            NaluType::Filler => 12,
            NaluType::SpsExt => 13,
            NaluType::Prefix => 14,
            NaluType::SubsetSps => 15,
            NaluType::Dps => 16,
            NaluType::Reserved17 => 17,
            NaluType::Reserved18 => 18,
            NaluType::CodedSliceAux => 19,
            NaluType::CodedSliceExtension => 20,
            NaluType::Other(other) => other,
        }
    }
}

/// A NAL unit borrowed from the parser's stream. `data` starts at the header
/// byte and excludes the start code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nalu<'a> {
    pub data: &'a [u8],
    pub nal_ref_idc: u8,
    pub nal_unit_type: NaluType,
    /// Offset of `data` within the parser's stream.
    pub offset: usize,
}

impl Nalu<'_> {
    /// Offset just past the last byte of this NAL unit.
    pub fn end_offset(&self) -> usize {
        self.offset + self.data.len()
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_nalu_type_round_trip_all_values() {
        for value in 0u8..32 {
            assert_eq!(u8::from(NaluType::from(value)), value);
        }
        assert_eq!(NaluType::from(0x65), NaluType::IdrSlice);
    }

    #[test]
    fn test_is_vcl() {
        assert!(NaluType::IdrSlice.is_vcl());
        assert!(NaluType::NonIdrSlice.is_vcl());
        assert!(!NaluType::Sps.is_vcl());
        assert!(!NaluType::CodedSliceAux.is_vcl());
    }
}
