//! Boxes of a movie fragment, `moof` and everything below it.

use super::protection::ProtectionSystemSpecificHeader;
use super::sample_group::{
    SampleGroupDescription, SampleToGroup, read_seig_description, read_seig_sample_to_group,
};
use crate::box_reader::{BoxReader, ParseBox};
use crate::error::{Mp4Error, Result};
use crate::fourcc::FourCc;

/// Sample flag bit marking a sample that is not a sync sample.
pub const SAMPLE_IS_NON_SYNC_SAMPLE: u32 = 0x0001_0000;

/// Upper bound on the samples of one track fragment, across all its runs.
///
/// A `trun` without per-sample fields costs no bytes per sample, so its
/// count is otherwise unbounded by the box size.
pub const MAX_TRACK_FRAGMENT_SAMPLES: u32 = 1 << 20;

/// `sample_depends_on` as carried in sample flags and `sdtp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleDependsOn {
    #[default]
    Unknown,
    Others,
    NoOther,
    Reserved,
}

impl From<u8> for SampleDependsOn {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0 => SampleDependsOn::Unknown,
            1 => SampleDependsOn::Others,
            2 => SampleDependsOn::NoOther,
            _ => SampleDependsOn::Reserved,
        }
    }
}

impl SampleDependsOn {
    /// Decodes bits 24-25 of a sample flags word.
    pub fn from_sample_flags(flags: u32) -> Self {
        Self::from((flags >> 24) as u8)
    }
}

/// `mfhd`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MovieFragmentHeader {
    pub sequence_number: u32,
}

impl ParseBox for MovieFragmentHeader {
    const BOX_TYPE: FourCc = FourCc::MFHD;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        Ok(Self {
            sequence_number: reader.cursor().read_u32()?,
        })
    }
}

/// `tfhd`. Absent optional fields are 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackFragmentHeader {
    pub track_id: u32,
    pub sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
    pub has_default_sample_flags: bool,
}

impl ParseBox for TrackFragmentHeader {
    const BOX_TYPE: FourCc = FourCc::TFHD;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let flags = reader.flags();

        // Data offsets are always relative to the start of the moof box.
        if flags & 0x01 != 0 {
            return Err(Mp4Error::InvalidBox {
                box_type: Self::BOX_TYPE,
                reason: "base-data-offset-present is not supported",
            });
        }

        let cursor = reader.cursor();
        let track_id = cursor.read_u32()?;
        let mut read_if = |mask: u32| -> Result<u32> {
            if flags & mask != 0 {
                Ok(cursor.read_u32()?)
            } else {
                Ok(0)
            }
        };

        let sample_description_index = read_if(0x02)?;
        let default_sample_duration = read_if(0x08)?;
        let default_sample_size = read_if(0x10)?;
        let default_sample_flags = read_if(0x20)?;

        Ok(Self {
            track_id,
            sample_description_index,
            default_sample_duration,
            default_sample_size,
            default_sample_flags,
            has_default_sample_flags: flags & 0x20 != 0,
        })
    }
}

/// `tfdt`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackFragmentDecodeTime {
    pub decode_time: u64,
}

impl ParseBox for TrackFragmentDecodeTime {
    const BOX_TYPE: FourCc = FourCc::TFDT;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let decode_time = if reader.version() == 1 {
            reader.cursor().read_u64()?
        } else {
            reader.cursor().read_u32_into_u64()?
        };
        Ok(Self { decode_time })
    }
}

/// `trun`. Per-sample tables are empty when the field is not present; the
/// first-sample flags, when given, become entry 0 of `sample_flags`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackFragmentRun {
    pub sample_count: u32,
    /// Relative to the start of the enclosing moof box.
    pub data_offset: i64,
    pub sample_durations: Vec<u32>,
    pub sample_sizes: Vec<u32>,
    pub sample_flags: Vec<u32>,
    pub sample_composition_time_offsets: Vec<i64>,
}

impl ParseBox for TrackFragmentRun {
    const BOX_TYPE: FourCc = FourCc::TRUN;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let flags = reader.flags();
        let cursor = reader.cursor();

        let sample_count = cursor.read_u32()?;
        let data_offset_present = flags & 0x001 != 0;
        let first_sample_flags_present = flags & 0x004 != 0;
        let durations_present = flags & 0x100 != 0;
        let sizes_present = flags & 0x200 != 0;
        let flags_present = flags & 0x400 != 0;
        let cts_offsets_present = flags & 0x800 != 0;

        let data_offset = if data_offset_present {
            cursor.read_i32_into_i64()?
        } else {
            0
        };
        let first_sample_flags = if first_sample_flags_present {
            Some(cursor.read_u32()?)
        } else {
            None
        };

        let fields = [
            durations_present,
            sizes_present,
            flags_present,
            cts_offsets_present,
        ]
        .iter()
        .filter(|&&present| present)
        .count();
        if sample_count > MAX_TRACK_FRAGMENT_SAMPLES {
            return Err(Mp4Error::InvalidBox {
                box_type: Self::BOX_TYPE,
                reason: "too many samples",
            });
        }
        let count = sample_count as usize;
        if !cursor.has_bytes(count.saturating_mul(fields * 4)) {
            return Err(Mp4Error::InvalidBox {
                box_type: Self::BOX_TYPE,
                reason: "sample count exceeds box size",
            });
        }

        let table = |present: bool| if present { count } else { 0 };
        let mut sample_durations = Vec::with_capacity(table(durations_present));
        let mut sample_sizes = Vec::with_capacity(table(sizes_present));
        let mut sample_flags = Vec::with_capacity(table(flags_present));
        let mut sample_composition_time_offsets = Vec::with_capacity(table(cts_offsets_present));

        for _ in 0..count {
            if durations_present {
                sample_durations.push(cursor.read_u32()?);
            }
            if sizes_present {
                sample_sizes.push(cursor.read_u32()?);
            }
            if flags_present {
                sample_flags.push(cursor.read_u32()?);
            }
            if cts_offsets_present {
                // Version 0 declares the offset unsigned, but writers routinely
                // store negative offsets there, so both versions read signed.
                let offset = cursor.read_i32_into_i64()?;
                sample_composition_time_offsets.push(offset);
            }
        }

        if let Some(first) = first_sample_flags {
            match sample_flags.first_mut() {
                Some(flags) => *flags = first,
                None => sample_flags.push(first),
            }
        }

        Ok(Self {
            sample_count,
            data_offset,
            sample_durations,
            sample_sizes,
            sample_flags,
            sample_composition_time_offsets,
        })
    }
}

/// `saio`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleAuxiliaryInformationOffset {
    /// Relative to the start of the enclosing moof box.
    pub offsets: Vec<u64>,
}

impl ParseBox for SampleAuxiliaryInformationOffset {
    const BOX_TYPE: FourCc = FourCc::SAIO;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let flags = reader.flags();
        let version = reader.version();
        let cursor = reader.cursor();
        if flags & 1 != 0 {
            cursor.skip(8)?; // aux_info_type, aux_info_type_parameter
        }

        let count = cursor.read_u32()? as usize;
        let bytes_per_offset = if version == 1 { 8 } else { 4 };
        if !cursor.has_bytes(count.saturating_mul(bytes_per_offset)) {
            return Err(Mp4Error::InvalidBox {
                box_type: Self::BOX_TYPE,
                reason: "entry count exceeds box size",
            });
        }

        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(if version == 1 {
                cursor.read_u64()?
            } else {
                cursor.read_u32_into_u64()?
            });
        }
        Ok(Self { offsets })
    }
}

/// `saiz`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleAuxiliaryInformationSize {
    /// Size of every entry, or 0 when `sample_info_sizes` gives them.
    pub default_sample_info_size: u8,
    pub sample_count: u32,
    pub sample_info_sizes: Vec<u8>,
}

impl ParseBox for SampleAuxiliaryInformationSize {
    const BOX_TYPE: FourCc = FourCc::SAIZ;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let flags = reader.flags();
        let cursor = reader.cursor();
        if flags & 1 != 0 {
            cursor.skip(8)?; // aux_info_type, aux_info_type_parameter
        }

        let default_sample_info_size = cursor.read_u8()?;
        let sample_count = cursor.read_u32()?;
        let sample_info_sizes = if default_sample_info_size == 0 {
            cursor.read_vec(sample_count as usize)?
        } else {
            Vec::new()
        };
        Ok(Self {
            default_sample_info_size,
            sample_count,
            sample_info_sizes,
        })
    }
}

/// `sdtp`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndependentAndDisposableSamples {
    sample_depends_on: Vec<SampleDependsOn>,
}

impl IndependentAndDisposableSamples {
    /// Dependency of sample `index`, `Unknown` past the end of the table.
    pub fn sample_depends_on(&self, index: usize) -> SampleDependsOn {
        self.sample_depends_on
            .get(index)
            .copied()
            .unwrap_or_default()
    }
}

impl ParseBox for IndependentAndDisposableSamples {
    const BOX_TYPE: FourCc = FourCc::SDTP;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        if reader.version() != 0 || reader.flags() != 0 {
            return Err(Mp4Error::InvalidBox {
                box_type: Self::BOX_TYPE,
                reason: "unsupported version or flags",
            });
        }

        let entries = reader.cursor().remaining_slice();
        let sample_depends_on = entries
            .iter()
            .map(|&entry| SampleDependsOn::from(entry >> 4))
            .collect::<Vec<_>>();
        if sample_depends_on.contains(&SampleDependsOn::Reserved) {
            return Err(Mp4Error::ReservedSampleDependency);
        }
        Ok(Self { sample_depends_on })
    }
}

/// `traf`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackFragment {
    pub header: TrackFragmentHeader,
    pub decode_time: TrackFragmentDecodeTime,
    pub runs: Vec<TrackFragmentRun>,
    pub auxiliary_offset: Option<SampleAuxiliaryInformationOffset>,
    pub auxiliary_size: Option<SampleAuxiliaryInformationSize>,
    pub sdtp: Option<IndependentAndDisposableSamples>,
    /// Empty unless a `seig` grouping is present.
    pub sample_group_description: SampleGroupDescription,
    pub sample_to_group: SampleToGroup,
}

impl ParseBox for TrackFragment {
    const BOX_TYPE: FourCc = FourCc::TRAF;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.scan_children()?;
        let header = reader.read_child()?;
        let decode_time = reader.read_child()?;
        let runs: Vec<TrackFragmentRun> = reader.maybe_read_children()?;

        let total_samples: u64 = runs.iter().map(|run| run.sample_count as u64).sum();
        if total_samples > MAX_TRACK_FRAGMENT_SAMPLES as u64 {
            return Err(Mp4Error::InvalidBox {
                box_type: Self::BOX_TYPE,
                reason: "too many samples",
            });
        }

        Ok(Self {
            header,
            decode_time,
            runs,
            auxiliary_offset: reader.maybe_read_child()?,
            auxiliary_size: reader.maybe_read_child()?,
            sdtp: reader.maybe_read_child()?,
            sample_group_description: read_seig_description(reader)?,
            sample_to_group: read_seig_sample_to_group(reader)?,
        })
    }
}

/// `moof`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MovieFragment {
    pub header: MovieFragmentHeader,
    pub tracks: Vec<TrackFragment>,
    pub pssh: Vec<ProtectionSystemSpecificHeader>,
}

impl ParseBox for MovieFragment {
    const BOX_TYPE: FourCc = FourCc::MOOF;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.scan_children()?;
        Ok(Self {
            header: reader.read_child()?,
            tracks: reader.read_children()?,
            pssh: reader.maybe_read_children()?,
        })
    }
}
