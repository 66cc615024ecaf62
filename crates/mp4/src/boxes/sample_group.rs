//! Sample grouping boxes, of which only the `seig` grouping is read.

use tracing::warn;

use super::protection::{KEY_ID_SIZE, check_iv_size};
use crate::box_reader::{BoxReader, ParseBox};
use crate::error::{Mp4Error, Result};
use crate::fourcc::FourCc;

/// Group description indices above this value refer to the description box
/// of the enclosing track fragment rather than the track's sample table.
pub const FRAGMENT_GROUP_DESCRIPTION_INDEX_BASE: u32 = 0x10000;

/// `is_encrypted` + `iv_size` + `key_id`, after two reserved bytes.
const SEIG_ENTRY_SIZE: usize = 4 + KEY_ID_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleToGroupEntry {
    pub sample_count: u32,
    /// 1-based; 0 means the samples belong to no group.
    pub group_description_index: u32,
}

/// `sbgp`. Entries are left empty for groupings other than `seig`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleToGroup {
    pub grouping_type: FourCc,
    pub grouping_type_parameter: u32,
    pub entries: Vec<SampleToGroupEntry>,
}

impl ParseBox for SampleToGroup {
    const BOX_TYPE: FourCc = FourCc::SBGP;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let version = reader.version();
        let cursor = reader.cursor();

        let grouping_type = FourCc(cursor.read_fourcc()?);
        let grouping_type_parameter = if version == 1 { cursor.read_u32()? } else { 0 };

        if grouping_type != FourCc::SEIG {
            warn!("SampleToGroup box with grouping_type '{grouping_type}' is not supported");
            return Ok(Self {
                grouping_type,
                grouping_type_parameter,
                entries: Vec::new(),
            });
        }

        let count = cursor.read_u32()? as usize;
        if !cursor.has_bytes(count.saturating_mul(8)) {
            return Err(Mp4Error::InvalidBox {
                box_type: Self::BOX_TYPE,
                reason: "entry count exceeds box size",
            });
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(SampleToGroupEntry {
                sample_count: cursor.read_u32()?,
                group_description_index: cursor.read_u32()?,
            });
        }

        Ok(Self {
            grouping_type,
            grouping_type_parameter,
            entries,
        })
    }
}

/// One `seig` sample group description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CencSampleEncryptionInfoEntry {
    pub is_encrypted: bool,
    pub iv_size: u8,
    pub key_id: [u8; KEY_ID_SIZE],
}

/// `sgpd`. Entries are left empty for groupings other than `seig`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleGroupDescription {
    pub grouping_type: FourCc,
    pub entries: Vec<CencSampleEncryptionInfoEntry>,
}

impl ParseBox for SampleGroupDescription {
    const BOX_TYPE: FourCc = FourCc::SGPD;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let version = reader.version();
        let cursor = reader.cursor();

        let grouping_type = FourCc(cursor.read_fourcc()?);
        if grouping_type != FourCc::SEIG {
            warn!("SampleGroupDescription box with grouping_type '{grouping_type}' is not supported");
            return Ok(Self {
                grouping_type,
                entries: Vec::new(),
            });
        }

        let invalid = |reason| Mp4Error::InvalidBox {
            box_type: Self::BOX_TYPE,
            reason,
        };

        let mut default_length = 0;
        if version == 1 {
            default_length = cursor.read_u32()? as usize;
            if default_length != 0 && default_length < SEIG_ENTRY_SIZE {
                return Err(invalid("default description length too small"));
            }
        }

        let count = cursor.read_u32()? as usize;
        if !cursor.has_bytes(count.saturating_mul(SEIG_ENTRY_SIZE)) {
            return Err(invalid("entry count exceeds box size"));
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let description_length = match version {
                1 if default_length == 0 => {
                    let length = cursor.read_u32()? as usize;
                    if length < SEIG_ENTRY_SIZE {
                        return Err(invalid("description length too small"));
                    }
                    length
                }
                1 => default_length,
                _ => SEIG_ENTRY_SIZE,
            };

            cursor.skip(2)?; // reserved
            let is_encrypted = cursor.read_u8()? != 0;
            let iv_size = cursor.read_u8()?;
            let key_id = cursor.read_array::<KEY_ID_SIZE>()?;
            check_iv_size(Self::BOX_TYPE, is_encrypted, iv_size)?;
            // Longer descriptions carry fields we do not use.
            cursor.skip(description_length - SEIG_ENTRY_SIZE)?;

            entries.push(CencSampleEncryptionInfoEntry {
                is_encrypted,
                iv_size,
                key_id,
            });
        }

        Ok(Self {
            grouping_type,
            entries,
        })
    }
}

/// Reads `sgpd` children until the `seig` one is found.
///
/// Descriptions of other grouping types are discarded. Returns an empty
/// description when there is no `seig` grouping.
pub(crate) fn read_seig_description(reader: &mut BoxReader<'_>) -> Result<SampleGroupDescription> {
    while reader.has_child(FourCc::SGPD) {
        let description: SampleGroupDescription = reader.read_child()?;
        if description.grouping_type == FourCc::SEIG {
            return Ok(description);
        }
    }
    Ok(SampleGroupDescription::default())
}

/// Reads `sbgp` children until the `seig` one is found.
pub(crate) fn read_seig_sample_to_group(reader: &mut BoxReader<'_>) -> Result<SampleToGroup> {
    while reader.has_child(FourCc::SBGP) {
        let sample_to_group: SampleToGroup = reader.read_child()?;
        if sample_to_group.grouping_type == FourCc::SEIG {
            return Ok(sample_to_group);
        }
    }
    Ok(SampleToGroup::default())
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;
    use crate::test_support::{make_full_box, make_sbgp, make_sgpd, parse_box};

    #[test]
    fn test_sbgp() {
        let sbgp =
            parse_box::<SampleToGroup>(&make_sbgp(&[(0, 1), (3, 1), (2, 0x10001)])).unwrap();
        assert_eq!(sbgp.grouping_type, FourCc::SEIG);
        assert_eq!(sbgp.entries.len(), 3);
        assert_eq!(
            sbgp.entries[2],
            SampleToGroupEntry {
                sample_count: 2,
                group_description_index: 0x10001
            }
        );
    }

    #[test]
    fn test_sbgp_other_grouping_type() {
        let mut payload = b"roll".to_vec();
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&[0, 0, 0, 5, 0, 0, 0, 1]);
        let sbgp = parse_box::<SampleToGroup>(&make_full_box(b"sbgp", 0, 0, &payload)).unwrap();
        assert_eq!(sbgp.grouping_type, FourCc(*b"roll"));
        assert!(sbgp.entries.is_empty());
    }

    #[test]
    fn test_sbgp_count_too_large() {
        let mut payload = b"seig".to_vec();
        payload.extend_from_slice(&100u32.to_be_bytes());
        assert!(parse_box::<SampleToGroup>(&make_full_box(b"sbgp", 0, 0, &payload)).is_err());
    }

    #[test]
    fn test_sgpd_v1_default_length() {
        let sgpd = parse_box::<SampleGroupDescription>(&make_sgpd(&[
            (true, 8, [1; 16]),
            (false, 0, [0; 16]),
        ]))
        .unwrap();
        assert_eq!(sgpd.entries.len(), 2);
        assert!(sgpd.entries[0].is_encrypted);
        assert_eq!(sgpd.entries[0].iv_size, 8);
        assert_eq!(sgpd.entries[0].key_id, [1; 16]);
        assert!(!sgpd.entries[1].is_encrypted);
    }

    #[test]
    fn test_sgpd_v1_explicit_lengths() {
        let mut payload = b"seig".to_vec();
        payload.extend_from_slice(&0u32.to_be_bytes()); // default_length
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&24u32.to_be_bytes());
        payload.extend_from_slice(&[0, 0, 1, 16]);
        payload.extend_from_slice(&[9; 16]);
        payload.extend_from_slice(&[0xAA; 4]);
        let sgpd =
            parse_box::<SampleGroupDescription>(&make_full_box(b"sgpd", 1, 0, &payload)).unwrap();
        assert_eq!(sgpd.entries.len(), 1);
        assert_eq!(sgpd.entries[0].iv_size, 16);
        assert_eq!(sgpd.entries[0].key_id, [9; 16]);
    }

    #[test]
    fn test_sgpd_invalid_iv_size() {
        assert!(
            parse_box::<SampleGroupDescription>(&make_sgpd(&[(true, 12, [0; 16])])).is_err()
        );
        assert!(
            parse_box::<SampleGroupDescription>(&make_sgpd(&[(false, 8, [0; 16])])).is_err()
        );
    }
}
