use std::io;

use bytes_util::ByteCursor;
use media_types::{DECRYPTION_KEY_SIZE, SubsampleEntry};

use crate::error::{Mp4Error, Result};

fn insufficient(_: io::Error) -> Mp4Error {
    Mp4Error::InsufficientAuxInfo
}

/// Per-sample CENC auxiliary information.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameCencInfo {
    /// 8-byte IVs are zero-padded on the right.
    pub iv: [u8; DECRYPTION_KEY_SIZE],
    /// Empty when the whole sample is encrypted.
    pub subsamples: Vec<SubsampleEntry>,
}

impl FrameCencInfo {
    /// Parses one auxiliary information entry.
    ///
    /// The subsample list is optional: an entry holding only the IV describes
    /// a sample encrypted in full.
    pub fn parse(iv_size: u8, data: &[u8]) -> Result<Self> {
        if iv_size != 8 && iv_size != 16 {
            return Err(Mp4Error::InvalidIvSize(iv_size));
        }

        let mut cursor = ByteCursor::new(data);
        let iv_size = iv_size as usize;
        let mut iv = [0; DECRYPTION_KEY_SIZE];
        iv[..iv_size].copy_from_slice(cursor.read_slice(iv_size).map_err(insufficient)?);

        if cursor.remaining() == 0 {
            return Ok(Self {
                iv,
                subsamples: Vec::new(),
            });
        }

        let count = cursor.read_u16().map_err(insufficient)? as usize;
        if !cursor.has_bytes(count * 6) {
            return Err(Mp4Error::InsufficientAuxInfo);
        }

        let subsamples = (0..count)
            .map(|_| {
                let clear_bytes = cursor.read_u16()? as u32;
                let cypher_bytes = cursor.read_u32()?;
                Ok(SubsampleEntry::new(clear_bytes, cypher_bytes))
            })
            .collect::<io::Result<Vec<_>>>()
            .map_err(insufficient)?;

        Ok(Self { iv, subsamples })
    }

    /// Sum of all clear and encrypted subsample bytes.
    pub fn total_size_of_subsamples(&self) -> u64 {
        self.subsamples.iter().map(SubsampleEntry::size).sum()
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_iv_only() {
        let info = FrameCencInfo::parse(8, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(&info.iv[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&info.iv[8..], &[0; 8]);
        assert!(info.subsamples.is_empty());
        assert_eq!(info.total_size_of_subsamples(), 0);
    }

    #[test]
    fn test_with_subsamples() {
        let mut data = vec![0xAB; 16];
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&[0, 5, 0, 0, 0, 100]);
        data.extend_from_slice(&[0xFF, 0xFF, 0, 0, 1, 0]);
        let info = FrameCencInfo::parse(16, &data).unwrap();
        assert_eq!(info.iv, [0xAB; 16]);
        assert_eq!(
            info.subsamples,
            vec![SubsampleEntry::new(5, 100), SubsampleEntry::new(0xFFFF, 256)]
        );
        assert_eq!(info.total_size_of_subsamples(), 105 + 0xFFFF + 256);
    }

    #[test]
    fn test_invalid_iv_size() {
        assert!(matches!(
            FrameCencInfo::parse(12, &[0; 12]),
            Err(Mp4Error::InvalidIvSize(12))
        ));
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            FrameCencInfo::parse(8, &[0; 7]),
            Err(Mp4Error::InsufficientAuxInfo)
        ));
        // A lone byte cannot hold the subsample count.
        assert!(matches!(
            FrameCencInfo::parse(8, &[0; 9]),
            Err(Mp4Error::InsufficientAuxInfo)
        ));

        let mut data = vec![0; 8];
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&[0, 5, 0, 0, 0, 100]);
        assert!(matches!(
            FrameCencInfo::parse(8, &data),
            Err(Mp4Error::InsufficientAuxInfo)
        ));
    }
}
