//! Common Encryption signalling: `sinf` and its children, and `pssh`.

use bytes::Bytes;

use crate::box_reader::{BoxReader, ParseBox};
use crate::error::{Mp4Error, Result};
use crate::fourcc::FourCc;

/// Size of a key id or a protection system id.
pub const KEY_ID_SIZE: usize = 16;

/// `frma`: the sample entry type before encryption was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OriginalFormat {
    pub format: FourCc,
}

impl ParseBox for OriginalFormat {
    const BOX_TYPE: FourCc = FourCc::FRMA;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        let format = FourCc(reader.cursor().read_fourcc()?);
        Ok(Self { format })
    }
}

/// `schm`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemeType {
    pub scheme_type: FourCc,
    pub version: u32,
}

impl ParseBox for SchemeType {
    const BOX_TYPE: FourCc = FourCc::SCHM;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let cursor = reader.cursor();
        let scheme_type = FourCc(cursor.read_fourcc()?);
        let version = cursor.read_u32()?;
        Ok(Self {
            scheme_type,
            version,
        })
    }
}

/// Validates an IV size against the encryption flag it comes with.
pub(crate) fn check_iv_size(box_type: FourCc, is_encrypted: bool, iv_size: u8) -> Result<()> {
    let valid = if is_encrypted {
        iv_size == 8 || iv_size == 16
    } else {
        iv_size == 0
    };
    if valid {
        Ok(())
    } else {
        Err(Mp4Error::InvalidBox {
            box_type,
            reason: "IV size does not match the encryption flag",
        })
    }
}

/// `tenc`: track-wide encryption defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackEncryption {
    pub is_encrypted: bool,
    /// 0 when not encrypted, otherwise 8 or 16.
    pub default_iv_size: u8,
    pub default_kid: [u8; KEY_ID_SIZE],
}

impl ParseBox for TrackEncryption {
    const BOX_TYPE: FourCc = FourCc::TENC;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let cursor = reader.cursor();
        cursor.skip(2)?; // reserved
        let is_encrypted = cursor.read_u8()? != 0;
        let default_iv_size = cursor.read_u8()?;
        let default_kid = cursor.read_array::<KEY_ID_SIZE>()?;
        check_iv_size(Self::BOX_TYPE, is_encrypted, default_iv_size)?;
        Ok(Self {
            is_encrypted,
            default_iv_size,
            default_kid,
        })
    }
}

/// `schi`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemeInfo {
    pub track_encryption: TrackEncryption,
}

impl ParseBox for SchemeInfo {
    const BOX_TYPE: FourCc = FourCc::SCHI;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.scan_children()?;
        let track_encryption = reader.read_child()?;
        Ok(Self { track_encryption })
    }
}

/// `sinf`. Only the `cenc` scheme carries scheme information here; other
/// schemes parse with a default `info` and are skipped by sample entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtectionSchemeInfo {
    pub format: OriginalFormat,
    pub scheme_type: SchemeType,
    pub info: SchemeInfo,
}

impl ProtectionSchemeInfo {
    pub fn has_supported_scheme(&self) -> bool {
        self.scheme_type.scheme_type == FourCc::CENC
    }
}

impl ParseBox for ProtectionSchemeInfo {
    const BOX_TYPE: FourCc = FourCc::SINF;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.scan_children()?;
        let format = reader.read_child()?;
        let scheme_type: SchemeType = reader.read_child()?;
        let info = if scheme_type.scheme_type == FourCc::CENC {
            reader.read_child()?
        } else {
            SchemeInfo::default()
        };
        Ok(Self {
            format,
            scheme_type,
            info,
        })
    }
}

/// A `pssh` box kept verbatim for the key system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionSystemSpecificHeader {
    pub system_id: [u8; KEY_ID_SIZE],
    /// The whole box, header included.
    pub raw_box: Bytes,
}

impl ParseBox for ProtectionSystemSpecificHeader {
    const BOX_TYPE: FourCc = FourCc::PSSH;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let system_id = reader.cursor().read_array::<KEY_ID_SIZE>()?;
        Ok(Self {
            system_id,
            raw_box: Bytes::copy_from_slice(reader.raw_box()),
        })
    }
}

/// A fully decoded `pssh` box, version 0 or 1.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FullProtectionSystemSpecificHeader {
    pub version: u8,
    pub system_id: [u8; KEY_ID_SIZE],
    /// Only present in version 1 boxes.
    pub key_ids: Vec<[u8; KEY_ID_SIZE]>,
    pub data: Bytes,
}

impl ParseBox for FullProtectionSystemSpecificHeader {
    const BOX_TYPE: FourCc = FourCc::PSSH;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let version = reader.version();
        if version > 1 || reader.flags() != 0 {
            return Err(Mp4Error::InvalidBox {
                box_type: Self::BOX_TYPE,
                reason: "unsupported version or flags",
            });
        }

        let cursor = reader.cursor();
        let system_id = cursor.read_array::<KEY_ID_SIZE>()?;

        let mut key_ids = Vec::new();
        if version == 1 {
            let kid_count = cursor.read_u32()? as usize;
            if !cursor.has_bytes(kid_count.saturating_mul(KEY_ID_SIZE)) {
                return Err(Mp4Error::InvalidBox {
                    box_type: Self::BOX_TYPE,
                    reason: "key id count exceeds box size",
                });
            }
            key_ids.reserve(kid_count);
            for _ in 0..kid_count {
                key_ids.push(cursor.read_array::<KEY_ID_SIZE>()?);
            }
        }

        let data_size = cursor.read_u32()? as usize;
        let data = Bytes::copy_from_slice(cursor.read_slice(data_size)?);

        Ok(Self {
            version,
            system_id,
            key_ids,
            data,
        })
    }
}
