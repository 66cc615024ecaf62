use std::fmt;

use thiserror::Error;

use crate::subsample::SubsampleEntry;

/// Size of a content key and of a full initialization vector.
pub const DECRYPTION_KEY_SIZE: usize = 16;

/// Reasons a [`DecryptConfig`] cannot be built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptConfigError {
    #[error("key id must not be empty")]
    EmptyKeyId,

    #[error("iv must be 16 bytes or empty, got {0}")]
    InvalidIvSize(usize),
}

/// Everything a decryptor needs for one sample.
///
/// Immutable once built. An empty `iv` means the caller supplies the IV out of
/// band. An empty subsample list means the whole sample is encrypted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DecryptConfig {
    key_id: Vec<u8>,
    iv: Vec<u8>,
    subsamples: Vec<SubsampleEntry>,
}

impl DecryptConfig {
    pub fn new(
        key_id: impl Into<Vec<u8>>,
        iv: impl Into<Vec<u8>>,
        subsamples: Vec<SubsampleEntry>,
    ) -> Result<Self, DecryptConfigError> {
        let key_id = key_id.into();
        let iv = iv.into();
        if key_id.is_empty() {
            return Err(DecryptConfigError::EmptyKeyId);
        }
        if !iv.is_empty() && iv.len() != DECRYPTION_KEY_SIZE {
            return Err(DecryptConfigError::InvalidIvSize(iv.len()));
        }
        Ok(Self {
            key_id,
            iv,
            subsamples,
        })
    }

    pub fn key_id(&self) -> &[u8] {
        &self.key_id
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    pub fn subsamples(&self) -> &[SubsampleEntry] {
        &self.subsamples
    }

    /// Same key and IV with a replaced subsample map, as needed after the
    /// sample bytes have been rewritten.
    pub fn with_subsamples(&self, subsamples: Vec<SubsampleEntry>) -> Self {
        Self {
            key_id: self.key_id.clone(),
            iv: self.iv.clone(),
            subsamples,
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl fmt::Debug for DecryptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptConfig")
            .field("key_id", &hex(&self.key_id))
            .field("iv", &hex(&self.iv))
            .field("subsamples", &self.subsamples)
            .finish()
    }
}
