use bytes::Bytes;
use bytes_util::ByteCursor;
use tracing::debug;

use crate::error::{H264Error, Result};

/// AVC Decoder Configuration Record
///
/// ISO/IEC 14496-15:2022(E) - 5.3.2.1.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AVCDecoderConfigurationRecord {
    /// Always 1.
    pub configuration_version: u8,
    pub profile_indication: u8,
    pub profile_compatibility: u8,
    pub level_indication: u8,
    /// Size in bytes of the NAL unit length prefix: 1, 2 or 4.
    pub length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
    /// Present for the High profiles (100, 110, 122, 144).
    pub extended_config: Option<AvcExtendedConfig>,
}

/// Range extension fields carried by High profile records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AvcExtendedConfig {
    pub chroma_format: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub sequence_parameter_set_ext: Vec<Bytes>,
}

const PROFILES_WITH_EXTENSION: [u8; 4] = [100, 110, 122, 144];

fn read_parameter_sets(cursor: &mut ByteCursor<'_>, count: usize) -> Result<Vec<Bytes>> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        let length = cursor.read_u16()? as usize;
        sets.push(Bytes::copy_from_slice(cursor.read_slice(length)?));
    }
    Ok(sets)
}

impl AVCDecoderConfigurationRecord {
    /// Parses the payload of an `avcC` box.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);

        let configuration_version = cursor.read_u8()?;
        if configuration_version != 1 {
            return Err(H264Error::UnsupportedConfigurationVersion(configuration_version));
        }

        let profile_indication = cursor.read_u8()?;
        let profile_compatibility = cursor.read_u8()?;
        let level_indication = cursor.read_u8()?;

        let length_size = (cursor.read_u8()? & 0x03) + 1;
        if length_size == 3 {
            return Err(H264Error::InvalidLengthSize(length_size));
        }

        let num_sps = (cursor.read_u8()? & 0x1f) as usize;
        let sps = read_parameter_sets(&mut cursor, num_sps)?;
        if let Some(short) = sps.iter().find(|s| s.len() <= 4) {
            return Err(H264Error::ParameterSetTooShort(short.len()));
        }

        let num_pps = cursor.read_u8()? as usize;
        let pps = read_parameter_sets(&mut cursor, num_pps)?;

        // Many muxers omit the extension even for High profiles.
        let extended_config = if PROFILES_WITH_EXTENSION.contains(&profile_indication) {
            match Self::parse_extension(&mut cursor) {
                Ok(ext) => Some(ext),
                Err(err) => {
                    debug!("ignoring avcC range extension: {err}");
                    None
                }
            }
        } else {
            None
        };

        let record = Self {
            configuration_version,
            profile_indication,
            profile_compatibility,
            level_indication,
            length_size,
            sps,
            pps,
            extended_config,
        };
        debug!("Video codec: {}", record.codec_string());
        Ok(record)
    }

    fn parse_extension(cursor: &mut ByteCursor<'_>) -> Result<AvcExtendedConfig> {
        let chroma_format = cursor.read_u8()? & 0x03;
        let bit_depth_luma_minus8 = cursor.read_u8()? & 0x07;
        let bit_depth_chroma_minus8 = cursor.read_u8()? & 0x07;
        let num_sps_ext = cursor.read_u8()? as usize;
        let sequence_parameter_set_ext = read_parameter_sets(cursor, num_sps_ext)?;

        Ok(AvcExtendedConfig {
            chroma_format,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            sequence_parameter_set_ext,
        })
    }

    /// RFC 6381 codec string, e.g. `avc1.64001f`.
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02x}{:02x}{:02x}",
            self.profile_indication, self.profile_compatibility, self.level_indication
        )
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    fn sample_avcc(length_size_minus_one: u8) -> Vec<u8> {
        let sps = [0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02];
        let pps = [0x68, 0xCE, 0x3C, 0x80];
        let mut data = vec![1, 0x42, 0xC0, 0x1E, 0xFC | length_size_minus_one, 0xE1];
        data.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        data.extend_from_slice(&sps);
        data.push(1);
        data.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        data.extend_from_slice(&pps);
        data
    }

    #[test]
    fn test_parse_baseline() {
        let record = AVCDecoderConfigurationRecord::parse(&sample_avcc(3)).unwrap();
        assert_eq!(record.length_size, 4);
        assert_eq!(record.profile_indication, 0x42);
        assert_eq!(record.sps.len(), 1);
        assert_eq!(record.pps.len(), 1);
        assert_eq!(record.pps[0].as_ref(), &[0x68, 0xCE, 0x3C, 0x80]);
        assert!(record.extended_config.is_none());
        assert_eq!(record.codec_string(), "avc1.42c01e");
    }

    #[test]
    fn test_length_sizes() {
        assert_eq!(
            AVCDecoderConfigurationRecord::parse(&sample_avcc(0)).unwrap().length_size,
            1
        );
        assert_eq!(
            AVCDecoderConfigurationRecord::parse(&sample_avcc(1)).unwrap().length_size,
            2
        );
        let err = AVCDecoderConfigurationRecord::parse(&sample_avcc(2)).unwrap_err();
        assert!(matches!(err, H264Error::InvalidLengthSize(3)));
    }

    #[test]
    fn test_rejects_version() {
        let mut data = sample_avcc(3);
        data[0] = 2;
        let err = AVCDecoderConfigurationRecord::parse(&data).unwrap_err();
        assert!(matches!(err, H264Error::UnsupportedConfigurationVersion(2)));
    }

    #[test]
    fn test_truncated() {
        let data = sample_avcc(3);
        let err = AVCDecoderConfigurationRecord::parse(&data[..data.len() - 1]).unwrap_err();
        assert!(matches!(err, H264Error::Io(_)));
    }

    #[test]
    fn test_short_sps_rejected() {
        let data = [1, 0x42, 0xC0, 0x1E, 0xFF, 0xE1, 0x00, 0x02, 0x67, 0x42, 0x00];
        let err = AVCDecoderConfigurationRecord::parse(&data).unwrap_err();
        assert!(matches!(err, H264Error::ParameterSetTooShort(2)));
    }

    #[test]
    fn test_high_profile_extension() {
        let mut data = sample_avcc(3);
        data[1] = 100;
        data.extend_from_slice(&[0xFD, 0xF8, 0xF8, 0x00]);
        let record = AVCDecoderConfigurationRecord::parse(&data).unwrap();
        let ext = record.extended_config.unwrap();
        assert_eq!(ext.chroma_format, 1);
        assert_eq!(ext.bit_depth_luma_minus8, 0);
        assert!(ext.sequence_parameter_set_ext.is_empty());
    }

    #[test]
    fn test_high_profile_without_extension() {
        let mut data = sample_avcc(3);
        data[1] = 100;
        let record = AVCDecoderConfigurationRecord::parse(&data).unwrap();
        assert!(record.extended_config.is_none());
    }
}
