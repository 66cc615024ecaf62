/// H.265 `nal_unit_type` (ISO/IEC 23008-2 Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NaluType {
    TrailN,
    TrailR,
    TsaN,
    TsaR,
    StsaN,
    StsaR,
    RadlN,
    RadlR,
    RaslN,
    RaslR,
    BlaWLp,
    BlaWRadl,
    BlaNLp,
    IdrWRadl,
    IdrNLp,
    CraNut,
    Vps,
    Sps,
    Pps,
    Aud,
    Eos,
    Eob,
    Fd,
    PrefixSei,
    SuffixSei,
    /// Reserved VCL (10-15, 22-31) or non-VCL (41-47) types.
    Reserved(u8),
    /// Types 48 to 63.
    Unspecified(u8),
}

impl NaluType {
    pub fn is_vcl(self) -> bool {
        u8::from(self) < 32
    }

    /// Intra random access point picture (types 16 to 23).
    pub fn is_irap(self) -> bool {
        (16..=23).contains(&u8::from(self))
    }
}

impl From<u8> for NaluType {
    fn from(value: u8) -> Self {
        match value & 0x3f {
            0 => NaluType::TrailN,
            1 => NaluType::TrailR,
            2 => NaluType::TsaN,
            3 => NaluType::TsaR,
            4 => NaluType::StsaN,
            5 => NaluType::StsaR,
            6 => NaluType::RadlN,
            7 => NaluType::RadlR,
            8 => NaluType::RaslN,
            9 => NaluType::RaslR,
            16 => NaluType::BlaWLp,
            17 => NaluType::BlaWRadl,
            18 => NaluType::BlaNLp,
            19 => NaluType::IdrWRadl,
            20 => NaluType::IdrNLp,
            21 => NaluType::CraNut,
            32 => NaluType::Vps,
            33 => NaluType::Sps,
            34 => NaluType::Pps,
            35 => NaluType::Aud,
            36 => NaluType::Eos,
            37 => NaluType::Eob,
            38 => NaluType::Fd,
            39 => NaluType::PrefixSei,
            40 => NaluType::SuffixSei,
            other @ 48..=63 => NaluType::Unspecified(other),
            other => NaluType::Reserved(other),
        }
    }
}

impl From<NaluType> for u8 {
    fn from(value: NaluType) -> Self {
        match value {
            NaluType::TrailN => 0,
            NaluType::TrailR => 1,
            NaluType::TsaN => 2,
            NaluType::TsaR => 3,
            NaluType::StsaN => 4,
            NaluType::StsaR => 5,
            NaluType::RadlN => 6,
            NaluType::RadlR => 7,
            NaluType::RaslN => 8,
            NaluType::RaslR => 9,
            NaluType::BlaWLp => 16,
            NaluType::BlaWRadl => 17,
            NaluType::BlaNLp => 18,
            NaluType::IdrWRadl => 19,
            NaluType::IdrNLp => 20,
            NaluType::CraNut => 21,
            NaluType::Vps => 32,
            NaluType::Sps => 33,
            NaluType::Pps => 34,
            NaluType::Aud => 35,
            NaluType::Eos => 36,
            NaluType::Eob => 37,
            NaluType::Fd => 38,
            NaluType::PrefixSei => 39,
            NaluType::SuffixSei => 40,
            NaluType::Reserved(value) | NaluType::Unspecified(value) => value,
        }
    }
}

/// A NAL unit borrowed from the parser's stream, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nalu<'a> {
    pub data: &'a [u8],
    pub nal_unit_type: NaluType,
    pub nuh_layer_id: u8,
    pub nuh_temporal_id_plus1: u8,
    /// Offset of `data` within the parser's stream.
    pub offset: usize,
}

impl Nalu<'_> {
    pub fn end_offset(&self) -> usize {
        self.offset + self.data.len()
    }
}
