//! Helpers for `pssh` init data, given as back-to-back `pssh` boxes.

use bytes::Bytes;
use tracing::debug;

use crate::box_reader::BoxReader;
use crate::boxes::{FullProtectionSystemSpecificHeader, KEY_ID_SIZE, ProtectionSystemSpecificHeader};
use crate::error::Result;

/// System id of the W3C Common PSSH box format,
/// `1077efec-c0b2-4d02-ace3-3c1e52e2fb4b`.
pub const COMMON_SYSTEM_ID: [u8; KEY_ID_SIZE] = [
    0x10, 0x77, 0xef, 0xec, 0xc0, 0xb2, 0x4d, 0x02, 0xac, 0xe3, 0x3c, 0x1e, 0x52, 0xe2, 0xfb, 0x4b,
];

/// Splits `input` into `pssh` boxes and decodes those of a known version.
///
/// Fails if anything other than a `pssh` box is present. Boxes that do not
/// decode are skipped.
fn read_all_pssh_boxes(input: &[u8]) -> Result<Vec<FullProtectionSystemSpecificHeader>> {
    let raw_boxes: Vec<ProtectionSystemSpecificHeader> =
        BoxReader::read_concatenated_boxes(input).read_all_children_and_check_fourcc()?;

    let mut boxes = Vec::with_capacity(raw_boxes.len());
    for raw in &raw_boxes {
        let mut raw_reader = BoxReader::read_concatenated_boxes(&raw.raw_box);
        match raw_reader.read_all_children::<FullProtectionSystemSpecificHeader>() {
            Ok(parsed) => boxes.extend(parsed),
            Err(err) => debug!("skipping undecodable pssh box: {err}"),
        }
    }
    Ok(boxes)
}

/// Whether `input` is made of well-formed `pssh` boxes only. Empty input
/// holds no boxes and is valid.
pub fn validate_pssh_input(input: &[u8]) -> bool {
    input.is_empty() || read_all_pssh_boxes(input).is_ok()
}

/// Key ids listed by the first Common system `pssh` box.
///
/// `Ok(None)` when no such box lists any key id, including for empty input.
pub fn key_ids_for_common_system_id(input: &[u8]) -> Result<Option<Vec<[u8; KEY_ID_SIZE]>>> {
    if input.is_empty() {
        return Ok(None);
    }
    Ok(read_all_pssh_boxes(input)?
        .into_iter()
        .find(|pssh| pssh.system_id == COMMON_SYSTEM_ID)
        .map(|pssh| pssh.key_ids)
        .filter(|key_ids| !key_ids.is_empty()))
}

/// The data of the first `pssh` box for `system_id`.
pub fn pssh_data(input: &[u8], system_id: &[u8; KEY_ID_SIZE]) -> Result<Option<Bytes>> {
    if input.is_empty() {
        return Ok(None);
    }
    Ok(read_all_pssh_boxes(input)?
        .into_iter()
        .find(|pssh| &pssh.system_id == system_id)
        .map(|pssh| pssh.data))
}
