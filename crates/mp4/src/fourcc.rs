use std::fmt;

/// A four character code identifying a box or a format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const NULL: FourCc = FourCc([0; 4]);

    pub const AVC1: FourCc = FourCc(*b"avc1");
    pub const AVC3: FourCc = FourCc(*b"avc3");
    pub const AVCC: FourCc = FourCc(*b"avcC");
    pub const BLOC: FourCc = FourCc(*b"bloc");
    pub const CENC: FourCc = FourCc(*b"cenc");
    pub const EDTS: FourCc = FourCc(*b"edts");
    pub const ELST: FourCc = FourCc(*b"elst");
    pub const EMSG: FourCc = FourCc(*b"emsg");
    pub const ENCA: FourCc = FourCc(*b"enca");
    pub const ENCV: FourCc = FourCc(*b"encv");
    pub const ESDS: FourCc = FourCc(*b"esds");
    pub const FREE: FourCc = FourCc(*b"free");
    pub const FRMA: FourCc = FourCc(*b"frma");
    pub const FTYP: FourCc = FourCc(*b"ftyp");
    pub const HDLR: FourCc = FourCc(*b"hdlr");
    pub const HEV1: FourCc = FourCc(*b"hev1");
    pub const HVC1: FourCc = FourCc(*b"hvc1");
    pub const HVCC: FourCc = FourCc(*b"hvcC");
    pub const MDAT: FourCc = FourCc(*b"mdat");
    pub const MDHD: FourCc = FourCc(*b"mdhd");
    pub const MDIA: FourCc = FourCc(*b"mdia");
    pub const MECO: FourCc = FourCc(*b"meco");
    pub const MEHD: FourCc = FourCc(*b"mehd");
    pub const META: FourCc = FourCc(*b"meta");
    pub const MFHD: FourCc = FourCc(*b"mfhd");
    pub const MFRA: FourCc = FourCc(*b"mfra");
    pub const MINF: FourCc = FourCc(*b"minf");
    pub const MOOF: FourCc = FourCc(*b"moof");
    pub const MOOV: FourCc = FourCc(*b"moov");
    pub const MP4A: FourCc = FourCc(*b"mp4a");
    pub const MVEX: FourCc = FourCc(*b"mvex");
    pub const MVHD: FourCc = FourCc(*b"mvhd");
    pub const PASP: FourCc = FourCc(*b"pasp");
    pub const PDIN: FourCc = FourCc(*b"pdin");
    pub const PRFT: FourCc = FourCc(*b"prft");
    pub const PSSH: FourCc = FourCc(*b"pssh");
    pub const SAIO: FourCc = FourCc(*b"saio");
    pub const SAIZ: FourCc = FourCc(*b"saiz");
    pub const SBGP: FourCc = FourCc(*b"sbgp");
    pub const SCHI: FourCc = FourCc(*b"schi");
    pub const SCHM: FourCc = FourCc(*b"schm");
    pub const SDTP: FourCc = FourCc(*b"sdtp");
    pub const SEIG: FourCc = FourCc(*b"seig");
    pub const SGPD: FourCc = FourCc(*b"sgpd");
    pub const SIDX: FourCc = FourCc(*b"sidx");
    pub const SINF: FourCc = FourCc(*b"sinf");
    pub const SKIP: FourCc = FourCc(*b"skip");
    pub const SOUN: FourCc = FourCc(*b"soun");
    pub const SSIX: FourCc = FourCc(*b"ssix");
    pub const STBL: FourCc = FourCc(*b"stbl");
    pub const STSD: FourCc = FourCc(*b"stsd");
    pub const STYP: FourCc = FourCc(*b"styp");
    pub const TENC: FourCc = FourCc(*b"tenc");
    pub const TFDT: FourCc = FourCc(*b"tfdt");
    pub const TFHD: FourCc = FourCc(*b"tfhd");
    pub const TKHD: FourCc = FourCc(*b"tkhd");
    pub const TRAF: FourCc = FourCc(*b"traf");
    pub const TRAK: FourCc = FourCc(*b"trak");
    pub const TREX: FourCc = FourCc(*b"trex");
    pub const TRUN: FourCc = FourCc(*b"trun");
    pub const UUID: FourCc = FourCc(*b"uuid");
    pub const VIDE: FourCc = FourCc(*b"vide");

    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCc(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<[u8; 4]> for FourCc {
    fn from(value: [u8; 4]) -> Self {
        FourCc(value)
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|&b| b.is_ascii_graphic() || b == b' ') {
            self.0.iter().try_for_each(|&b| write!(f, "{}", b as char))
        } else {
            write!(f, "0x{:08x}", u32::from_be_bytes(self.0))
        }
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}
