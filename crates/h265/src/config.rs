use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use bytes_util::BitReader;
use tracing::debug;

use crate::enums::NumTemporalLayers;
use crate::error::{H265Error, Result};
use crate::nalu::NaluType;

bitflags::bitflags! {
    /// `general_profile_compatibility_flags`: bit `j` set means the stream
    /// conforms to profile `j`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProfileCompatibilityFlags: u32 {
        const MAIN_PROFILE = 1 << 30;
        const MAIN_10_PROFILE = 1 << 29;
        const MAIN_STILL_PICTURE_PROFILE = 1 << 28;
        const FORMAT_RANGE_EXTENSIONS_PROFILE = 1 << 27;
        const HIGH_THROUGHPUT_PROFILE = 1 << 26;
        const SCREEN_CONTENT_CODING_EXTENSIONS_PROFILE = 1 << 22;
        const _ = !0;
    }
}

/// One `NAL_unit_type` array of an `hvcC` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaluArray {
    /// All NAL units of this type are in the array (none in the stream).
    pub array_completeness: bool,
    pub nal_unit_type: NaluType,
    pub nalus: Vec<Bytes>,
}

/// HEVC Decoder Configuration Record
///
/// ISO/IEC 14496-15:2022(E) - 8.3.2.1.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HEVCDecoderConfigurationRecord {
    pub configuration_version: u8,
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: ProfileCompatibilityFlags,
    /// 48 bits.
    pub general_constraint_indicator_flags: u64,
    pub general_level_idc: u8,
    /// 12 bits.
    pub min_spatial_segmentation_idc: u16,
    /// 0 mixed or unknown, 1 slice, 2 tile, 3 wavefront.
    pub parallelism_type: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    /// In frames per 256 seconds, 0 if unspecified.
    pub avg_frame_rate: u16,
    pub constant_frame_rate: u8,
    pub num_temporal_layers: NumTemporalLayers,
    pub temporal_id_nested: bool,
    /// Size in bytes of the NAL unit length prefix: 1, 2 or 4.
    pub length_size: u8,
    pub arrays: Vec<NaluArray>,
}

impl HEVCDecoderConfigurationRecord {
    /// Parses the payload of an `hvcC` box.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = io::Cursor::new(data);

        let configuration_version = reader.read_u8()?;
        if configuration_version != 1 {
            return Err(H265Error::UnsupportedConfigurationVersion(
                configuration_version,
            ));
        }

        let mut bit_reader = BitReader::new(&mut reader);
        let general_profile_space = bit_reader.read_bits(2)? as u8;
        let general_tier_flag = bit_reader.read_bit()?;
        let general_profile_idc = bit_reader.read_bits(5)? as u8;
        let general_profile_compatibility_flags =
            ProfileCompatibilityFlags::from_bits_retain(bit_reader.read_bits(32)? as u32);
        let general_constraint_indicator_flags = bit_reader.read_bits(48)?;
        let general_level_idc = bit_reader.read_bits(8)? as u8;

        bit_reader.read_bits(4)?; // reserved_4bits
        let min_spatial_segmentation_idc = bit_reader.read_bits(12)? as u16;

        bit_reader.read_bits(6)?; // reserved_6bits
        let parallelism_type = bit_reader.read_bits(2)? as u8;

        bit_reader.read_bits(6)?; // reserved_6bits
        let chroma_format_idc = bit_reader.read_bits(2)? as u8;

        bit_reader.read_bits(5)?; // reserved_5bits
        let bit_depth_luma_minus8 = bit_reader.read_bits(3)? as u8;

        bit_reader.read_bits(5)?; // reserved_5bits
        let bit_depth_chroma_minus8 = bit_reader.read_bits(3)? as u8;

        let avg_frame_rate = bit_reader.read_bits(16)? as u16;
        let constant_frame_rate = bit_reader.read_bits(2)? as u8;
        let num_temporal_layers = NumTemporalLayers::from(bit_reader.read_bits(3)? as u8);
        let temporal_id_nested = bit_reader.read_bit()?;
        let length_size = bit_reader.read_bits(2)? as u8 + 1;
        if length_size == 3 {
            return Err(H265Error::InvalidLengthSize(length_size));
        }

        let num_of_arrays = bit_reader.read_bits(8)? as u8;
        let mut arrays = Vec::with_capacity(num_of_arrays as usize);
        for _ in 0..num_of_arrays {
            let array_completeness = bit_reader.read_bit()?;
            bit_reader.read_bit()?; // reserved

            let nal_unit_type = NaluType::from(bit_reader.read_bits(6)? as u8);
            let reader = bit_reader.get_mut();
            let num_nalus = reader.read_u16::<BigEndian>()?;

            let mut nalus = Vec::with_capacity(num_nalus as usize);
            for _ in 0..num_nalus {
                let nal_unit_length = reader.read_u16::<BigEndian>()? as usize;
                let mut nalu = vec![0u8; nal_unit_length];
                reader.read_exact(&mut nalu)?;
                nalus.push(Bytes::from(nalu));
            }

            arrays.push(NaluArray {
                array_completeness,
                nal_unit_type,
                nalus,
            });
        }

        let record = Self {
            configuration_version,
            general_profile_space,
            general_tier_flag,
            general_profile_idc,
            general_profile_compatibility_flags,
            general_constraint_indicator_flags,
            general_level_idc,
            min_spatial_segmentation_idc,
            parallelism_type,
            chroma_format_idc,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            avg_frame_rate,
            constant_frame_rate,
            num_temporal_layers,
            temporal_id_nested,
            length_size,
            arrays,
        };
        debug!(
            profile = record.general_profile_idc,
            level = record.general_level_idc,
            length_size = record.length_size,
            "parsed hvcC"
        );
        Ok(record)
    }

    /// All parameter sets in record order.
    pub fn nalus(&self) -> impl Iterator<Item = &Bytes> + '_ {
        self.arrays.iter().flat_map(|array| array.nalus.iter())
    }
}
