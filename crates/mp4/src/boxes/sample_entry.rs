//! Visual and audio sample entries of the `stsd` box.

use bytes::Bytes;
use bytes_util::ByteCursor;
use h264::{AVCDecoderConfigurationRecord, AvcBitstreamConverter};
use h265::{HEVCDecoderConfigurationRecord, HevcBitstreamConverter};
use media_types::{AnalysisResult, BitstreamConverter, SubsampleEntry};
use tracing::{debug, warn};

use super::protection::{ProtectionSchemeInfo, TrackEncryption};
use crate::box_reader::{BoxReader, ParseBox};
use crate::error::{Mp4Error, Result};
use crate::fourcc::FourCc;

/// `pasp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelAspectRatio {
    pub h_spacing: u32,
    pub v_spacing: u32,
}

impl Default for PixelAspectRatio {
    fn default() -> Self {
        Self {
            h_spacing: 1,
            v_spacing: 1,
        }
    }
}

impl ParseBox for PixelAspectRatio {
    const BOX_TYPE: FourCc = FourCc::PASP;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        let cursor = reader.cursor();
        Ok(Self {
            h_spacing: cursor.read_u32()?,
            v_spacing: cursor.read_u32()?,
        })
    }
}

/// Codec of a visual sample entry, with the converter its frames go through.
#[derive(Debug, Clone)]
pub enum VideoCodecConfig {
    Avc(AvcBitstreamConverter),
    Hevc(HevcBitstreamConverter),
    /// Frames are passed through untouched.
    Unsupported,
}

impl BitstreamConverter for VideoCodecConfig {
    type Error = Mp4Error;

    fn convert_and_analyze_frame(
        &self,
        frame: &mut Vec<u8>,
        is_keyframe: bool,
        subsamples: &mut Vec<SubsampleEntry>,
    ) -> Result<AnalysisResult> {
        match self {
            VideoCodecConfig::Avc(converter) => {
                Ok(converter.convert_and_analyze_frame(frame, is_keyframe, subsamples)?)
            }
            VideoCodecConfig::Hevc(converter) => {
                Ok(converter.convert_and_analyze_frame(frame, is_keyframe, subsamples)?)
            }
            VideoCodecConfig::Unsupported => Ok(AnalysisResult::default()),
        }
    }
}

/// Reads `sinf` children until one uses the `cenc` scheme.
fn read_cenc_sinf(reader: &mut BoxReader<'_>) -> Result<ProtectionSchemeInfo> {
    loop {
        let sinf: ProtectionSchemeInfo = reader.read_child()?;
        if sinf.has_supported_scheme() {
            return Ok(sinf);
        }
        debug!(
            "skipping protection scheme '{}'",
            sinf.scheme_type.scheme_type
        );
    }
}

#[derive(Debug, Clone)]
pub struct VideoSampleEntry {
    /// The box type, `encv` for encrypted entries.
    pub format: FourCc,
    pub data_reference_index: u16,
    pub width: u16,
    pub height: u16,
    pub pixel_aspect: PixelAspectRatio,
    /// Present for `encv` entries.
    pub sinf: Option<ProtectionSchemeInfo>,
    pub codec: VideoCodecConfig,
}

impl VideoSampleEntry {
    /// Format of the samples once decrypted.
    pub fn actual_format(&self) -> FourCc {
        match &self.sinf {
            Some(sinf) => sinf.format.format,
            None => self.format,
        }
    }

    pub fn track_encryption(&self) -> Option<&TrackEncryption> {
        self.sinf.as_ref().map(|sinf| &sinf.info.track_encryption)
    }

    pub fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        let format = reader.box_type();
        let cursor = reader.cursor();
        cursor.skip(6)?; // reserved
        let data_reference_index = cursor.read_u16()?;
        cursor.skip(16)?; // pre_defined and reserved
        let width = cursor.read_u16()?;
        let height = cursor.read_u16()?;
        // resolution, reserved, frame_count, compressorname, depth, pre_defined
        cursor.skip(50)?;

        reader.scan_children()?;
        let pixel_aspect = reader.maybe_read_child()?.unwrap_or_default();

        let sinf = if format == FourCc::ENCV {
            Some(read_cenc_sinf(reader)?)
        } else {
            None
        };
        let actual_format = sinf.as_ref().map_or(format, |sinf| sinf.format.format);

        let codec = match actual_format {
            FourCc::AVC1 | FourCc::AVC3 => {
                let mut avcc = reader.take_child(FourCc::AVCC).ok_or(Mp4Error::MissingChild {
                    parent: format,
                    child: FourCc::AVCC,
                })?;
                let config =
                    AVCDecoderConfigurationRecord::parse(avcc.cursor().remaining_slice())?;
                VideoCodecConfig::Avc(AvcBitstreamConverter::new(config))
            }
            FourCc::HEV1 | FourCc::HVC1 => {
                let mut hvcc = reader.take_child(FourCc::HVCC).ok_or(Mp4Error::MissingChild {
                    parent: format,
                    child: FourCc::HVCC,
                })?;
                let config =
                    HEVCDecoderConfigurationRecord::parse(hvcc.cursor().remaining_slice())?;
                VideoCodecConfig::Hevc(HevcBitstreamConverter::new(config))
            }
            other => {
                warn!("Unsupported VisualSampleEntry type {other}");
                VideoCodecConfig::Unsupported
            }
        };

        Ok(Self {
            format,
            data_reference_index,
            width,
            height,
            pixel_aspect,
            sinf,
            codec,
        })
    }
}

/// `esds`, reduced to what identifies the audio codec.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementaryStreamDescriptor {
    /// 0x40 for MPEG-4 audio.
    pub object_type: u8,
    /// Opaque codec configuration, the AudioSpecificConfig for AAC.
    pub decoder_specific_info: Bytes,
}

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;

fn read_descriptor_header(cursor: &mut ByteCursor<'_>, expected_tag: u8) -> Result<usize> {
    if cursor.read_u8()? != expected_tag {
        return Err(Mp4Error::InvalidBox {
            box_type: FourCc::ESDS,
            reason: "unexpected descriptor tag",
        });
    }
    // Up to four bytes, seven bits each, high bit set on all but the last.
    let mut size = 0usize;
    for _ in 0..4 {
        let byte = cursor.read_u8()?;
        size = (size << 7) | (byte & 0x7f) as usize;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok(size)
}

impl ParseBox for ElementaryStreamDescriptor {
    const BOX_TYPE: FourCc = FourCc::ESDS;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let cursor = reader.cursor();

        read_descriptor_header(cursor, ES_DESCRIPTOR_TAG)?;
        cursor.skip(2)?; // ES_ID
        let flags = cursor.read_u8()?;
        if flags & 0x80 != 0 {
            cursor.skip(2)?; // dependsOn_ES_ID
        }
        if flags & 0x40 != 0 {
            return Err(Mp4Error::InvalidBox {
                box_type: Self::BOX_TYPE,
                reason: "URL streams are not supported",
            });
        }
        if flags & 0x20 != 0 {
            cursor.skip(2)?; // OCR_ES_Id
        }

        read_descriptor_header(cursor, DECODER_CONFIG_DESCRIPTOR_TAG)?;
        let object_type = cursor.read_u8()?;
        // streamType, bufferSizeDB, maxBitrate, avgBitrate
        cursor.skip(12)?;

        let decoder_specific_info = if cursor.remaining() > 0 {
            let size = read_descriptor_header(cursor, DECODER_SPECIFIC_INFO_TAG)?;
            Bytes::copy_from_slice(cursor.read_slice(size)?)
        } else {
            Bytes::new()
        };

        Ok(Self {
            object_type,
            decoder_specific_info,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSampleEntry {
    /// The box type, `enca` for encrypted entries.
    pub format: FourCc,
    pub data_reference_index: u16,
    pub channel_count: u16,
    pub sample_size: u16,
    /// Integer part of the 16.16 sample rate.
    pub sample_rate: u32,
    /// Present for `enca` entries.
    pub sinf: Option<ProtectionSchemeInfo>,
    pub esds: Option<ElementaryStreamDescriptor>,
}

impl AudioSampleEntry {
    pub fn actual_format(&self) -> FourCc {
        match &self.sinf {
            Some(sinf) => sinf.format.format,
            None => self.format,
        }
    }

    pub fn track_encryption(&self) -> Option<&TrackEncryption> {
        self.sinf.as_ref().map(|sinf| &sinf.info.track_encryption)
    }

    pub fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        let format = reader.box_type();
        let cursor = reader.cursor();
        cursor.skip(6)?; // reserved
        let data_reference_index = cursor.read_u16()?;
        cursor.skip(8)?; // version, revision, vendor
        let channel_count = cursor.read_u16()?;
        let sample_size = cursor.read_u16()?;
        cursor.skip(4)?; // pre_defined, reserved
        let sample_rate = cursor.read_u32()? >> 16;

        reader.scan_children()?;
        let sinf = if format == FourCc::ENCA {
            Some(read_cenc_sinf(reader)?)
        } else {
            None
        };
        let esds = reader.maybe_read_child()?;

        Ok(Self {
            format,
            data_reference_index,
            channel_count,
            sample_size,
            sample_rate,
            sinf,
            esds,
        })
    }
}
