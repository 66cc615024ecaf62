use crate::boxes::{
    CencSampleEncryptionInfoEntry, FRAGMENT_GROUP_DESCRIPTION_INDEX_BASE, KEY_ID_SIZE,
    TrackEncryption,
};
use crate::error::{Mp4Error, Result};

/// Encryption parameters that apply to one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleEncryption {
    pub is_encrypted: bool,
    pub iv_size: u8,
    pub key_id: [u8; KEY_ID_SIZE],
}

impl From<&TrackEncryption> for SampleEncryption {
    fn from(tenc: &TrackEncryption) -> Self {
        Self {
            is_encrypted: tenc.is_encrypted,
            iv_size: tenc.default_iv_size,
            key_id: tenc.default_kid,
        }
    }
}

impl From<&CencSampleEncryptionInfoEntry> for SampleEncryption {
    fn from(entry: &CencSampleEncryptionInfoEntry) -> Self {
        Self {
            is_encrypted: entry.is_encrypted,
            iv_size: entry.iv_size,
            key_id: entry.key_id,
        }
    }
}

/// Maps sample group description indices to encryption parameters for the
/// runs of one track fragment.
///
/// Index 0 selects the track defaults from `tenc`. Indices up to
/// `0x10000` select 1-based entries of the track's `seig` descriptions, and
/// larger ones select entries of the fragment's descriptions after
/// subtracting `0x10000`.
#[derive(Debug, Clone, Default)]
pub struct CencResolver {
    track_encryption: TrackEncryption,
    track_entries: Vec<CencSampleEncryptionInfoEntry>,
    fragment_entries: Vec<CencSampleEncryptionInfoEntry>,
}

impl CencResolver {
    /// `track_encryption` is `None` for tracks without protection info, whose
    /// samples are clear unless a group says otherwise.
    pub fn new(
        track_encryption: Option<TrackEncryption>,
        track_entries: Vec<CencSampleEncryptionInfoEntry>,
        fragment_entries: Vec<CencSampleEncryptionInfoEntry>,
    ) -> Self {
        Self {
            track_encryption: track_encryption.unwrap_or_default(),
            track_entries,
            fragment_entries,
        }
    }

    pub fn track_encryption(&self) -> &TrackEncryption {
        &self.track_encryption
    }

    /// The group description entry for a nonzero index, if it exists.
    pub fn entry(&self, group_description_index: u32) -> Option<&CencSampleEncryptionInfoEntry> {
        let (entries, index) = if group_description_index > FRAGMENT_GROUP_DESCRIPTION_INDEX_BASE
        {
            (
                &self.fragment_entries,
                group_description_index - FRAGMENT_GROUP_DESCRIPTION_INDEX_BASE,
            )
        } else {
            (&self.track_entries, group_description_index)
        };
        let index = (index as usize).checked_sub(1)?;
        entries.get(index)
    }

    pub fn resolve(&self, group_description_index: u32) -> Result<SampleEncryption> {
        if group_description_index == 0 {
            return Ok(SampleEncryption::from(&self.track_encryption));
        }
        self.entry(group_description_index)
            .map(SampleEncryption::from)
            .ok_or(Mp4Error::InvalidGroupDescriptionIndex(group_description_index))
    }
}
