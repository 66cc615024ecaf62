//! Boxes of the initialization segment, `ftyp` and `moov`.

use tracing::warn;

use super::protection::ProtectionSystemSpecificHeader;
use super::sample_entry::{AudioSampleEntry, VideoSampleEntry};
use super::sample_group::{SampleGroupDescription, read_seig_description};
use crate::box_reader::{BoxReader, ParseBox};
use crate::error::{Mp4Error, Result};
use crate::fourcc::FourCc;

/// `ftyp`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileType {
    pub major_brand: FourCc,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCc>,
}

impl ParseBox for FileType {
    const BOX_TYPE: FourCc = FourCc::FTYP;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        let cursor = reader.cursor();
        let major_brand = FourCc(cursor.read_fourcc()?);
        let minor_version = cursor.read_u32()?;
        let mut compatible_brands = Vec::with_capacity(cursor.remaining() / 4);
        while cursor.remaining() >= 4 {
            compatible_brands.push(FourCc(cursor.read_fourcc()?));
        }
        Ok(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }
}

/// Reads a 3x3 display matrix of 16.16 and 2.30 fixed point values.
fn read_display_matrix(reader: &mut BoxReader<'_>) -> Result<[i32; 9]> {
    let mut matrix = [0; 9];
    for value in &mut matrix {
        *value = reader.cursor().read_i32()?;
    }
    Ok(matrix)
}

/// `mvhd`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MovieHeader {
    pub version: u8,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// 16.16 fixed point.
    pub rate: i32,
    /// 8.8 fixed point.
    pub volume: i16,
    pub display_matrix: [i32; 9],
    pub next_track_id: u32,
}

impl ParseBox for MovieHeader {
    const BOX_TYPE: FourCc = FourCc::MVHD;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let version = reader.version();
        let cursor = reader.cursor();

        let (creation_time, modification_time, timescale, duration) = if version == 1 {
            (
                cursor.read_u64()?,
                cursor.read_u64()?,
                cursor.read_u32()?,
                cursor.read_u64()?,
            )
        } else {
            (
                cursor.read_u32_into_u64()?,
                cursor.read_u32_into_u64()?,
                cursor.read_u32()?,
                cursor.read_u32_into_u64()?,
            )
        };
        let rate = cursor.read_i32()?;
        let volume = cursor.read_i16()?;
        cursor.skip(10)?; // reserved

        let display_matrix = read_display_matrix(reader)?;
        let cursor = reader.cursor();
        cursor.skip(24)?; // pre_defined
        let next_track_id = cursor.read_u32()?;

        Ok(Self {
            version,
            creation_time,
            modification_time,
            timescale,
            duration,
            rate,
            volume,
            display_matrix,
            next_track_id,
        })
    }
}

/// Rounds a 16.16 fixed point dimension to the nearest integer.
fn round_fixed_16_16(value: u32) -> u32 {
    ((value >> 15) + 1) >> 1
}

/// `tkhd`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackHeader {
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub duration: u64,
    pub layer: i16,
    pub alternate_group: i16,
    pub volume: i16,
    pub display_matrix: [i32; 9],
    /// Rounded to whole pixels.
    pub width: u32,
    pub height: u32,
}

impl ParseBox for TrackHeader {
    const BOX_TYPE: FourCc = FourCc::TKHD;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let version = reader.version();
        let cursor = reader.cursor();

        let (creation_time, modification_time, track_id, duration) = if version == 1 {
            let creation_time = cursor.read_u64()?;
            let modification_time = cursor.read_u64()?;
            let track_id = cursor.read_u32()?;
            cursor.skip(4)?; // reserved
            (creation_time, modification_time, track_id, cursor.read_u64()?)
        } else {
            let creation_time = cursor.read_u32_into_u64()?;
            let modification_time = cursor.read_u32_into_u64()?;
            let track_id = cursor.read_u32()?;
            cursor.skip(4)?; // reserved
            (
                creation_time,
                modification_time,
                track_id,
                cursor.read_u32_into_u64()?,
            )
        };

        cursor.skip(8)?; // reserved
        let layer = cursor.read_i16()?;
        let alternate_group = cursor.read_i16()?;
        let volume = cursor.read_i16()?;
        cursor.skip(2)?; // reserved

        let display_matrix = read_display_matrix(reader)?;
        let cursor = reader.cursor();
        let width = round_fixed_16_16(cursor.read_u32()?);
        let height = round_fixed_16_16(cursor.read_u32()?);

        Ok(Self {
            creation_time,
            modification_time,
            track_id,
            duration,
            layer,
            alternate_group,
            volume,
            display_matrix,
            width,
            height,
        })
    }
}

/// `mdhd`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaHeader {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// ISO 639-2/T code, `und` when unset or malformed.
    pub language: String,
}

fn decode_language(code: u16) -> String {
    let chars = [(code >> 10) & 0x1f, (code >> 5) & 0x1f, code & 0x1f];
    if chars.iter().any(|&c| !(1..=26).contains(&c)) {
        return "und".to_string();
    }
    chars.iter().map(|&c| (c as u8 + 0x60) as char).collect()
}

impl ParseBox for MediaHeader {
    const BOX_TYPE: FourCc = FourCc::MDHD;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let version = reader.version();
        let cursor = reader.cursor();

        let (creation_time, modification_time, timescale, duration) = if version == 1 {
            (
                cursor.read_u64()?,
                cursor.read_u64()?,
                cursor.read_u32()?,
                cursor.read_u64()?,
            )
        } else {
            (
                cursor.read_u32_into_u64()?,
                cursor.read_u32_into_u64()?,
                cursor.read_u32()?,
                cursor.read_u32_into_u64()?,
            )
        };
        let language = decode_language(cursor.read_u16()?);
        cursor.skip(2)?; // pre_defined

        Ok(Self {
            creation_time,
            modification_time,
            timescale,
            duration,
            language,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackType {
    #[default]
    Invalid,
    Video,
    Audio,
}

/// `hdlr`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandlerReference {
    pub handler_type: FourCc,
    pub track_type: TrackType,
}

impl ParseBox for HandlerReference {
    const BOX_TYPE: FourCc = FourCc::HDLR;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let cursor = reader.cursor();
        cursor.skip(4)?; // pre_defined
        let handler_type = FourCc(cursor.read_fourcc()?);
        let track_type = match handler_type {
            FourCc::VIDE => TrackType::Video,
            FourCc::SOUN => TrackType::Audio,
            _ => TrackType::Invalid,
        };
        Ok(Self {
            handler_type,
            track_type,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditListEntry {
    pub segment_duration: u64,
    /// In media timescale units, -1 for an empty edit.
    pub media_time: i64,
    pub media_rate_integer: i16,
    pub media_rate_fraction: i16,
}

/// `elst`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EditList {
    pub edits: Vec<EditListEntry>,
}

impl ParseBox for EditList {
    const BOX_TYPE: FourCc = FourCc::ELST;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let version = reader.version();
        let cursor = reader.cursor();

        let count = cursor.read_u32()? as usize;
        let entry_size = if version == 1 { 20 } else { 12 };
        if !cursor.has_bytes(count.saturating_mul(entry_size)) {
            return Err(Mp4Error::InvalidBox {
                box_type: Self::BOX_TYPE,
                reason: "entry count exceeds box size",
            });
        }

        let mut edits = Vec::with_capacity(count);
        for _ in 0..count {
            let (segment_duration, media_time) = if version == 1 {
                (cursor.read_u64()?, cursor.read_i64()?)
            } else {
                (cursor.read_u32_into_u64()?, cursor.read_i32_into_i64()?)
            };
            edits.push(EditListEntry {
                segment_duration,
                media_time,
                media_rate_integer: cursor.read_i16()?,
                media_rate_fraction: cursor.read_i16()?,
            });
        }
        Ok(Self { edits })
    }
}

/// `edts`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Edit {
    pub list: EditList,
}

impl ParseBox for Edit {
    const BOX_TYPE: FourCc = FourCc::EDTS;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.scan_children()?;
        Ok(Self {
            list: reader.read_child()?,
        })
    }
}

/// `stsd`. Entries are parsed according to the handler type of the track.
#[derive(Debug, Clone, Default)]
pub struct SampleDescription {
    pub track_type: TrackType,
    pub video_entries: Vec<VideoSampleEntry>,
    pub audio_entries: Vec<AudioSampleEntry>,
}

impl SampleDescription {
    pub fn parse(reader: &mut BoxReader<'_>, track_type: TrackType) -> Result<Self> {
        reader.read_full_box_header()?;
        let count = reader.cursor().read_u32()? as usize;

        let mut description = Self {
            track_type,
            ..Default::default()
        };
        let parsed = match track_type {
            TrackType::Video => {
                description.video_entries =
                    reader.read_all_children_with(VideoSampleEntry::parse)?;
                description.video_entries.len()
            }
            TrackType::Audio => {
                description.audio_entries =
                    reader.read_all_children_with(AudioSampleEntry::parse)?;
                description.audio_entries.len()
            }
            TrackType::Invalid => return Ok(description),
        };
        if parsed != count {
            warn!("stsd declares {count} entries but holds {parsed}");
        }
        Ok(description)
    }

    pub fn len(&self) -> usize {
        match self.track_type {
            TrackType::Video => self.video_entries.len(),
            TrackType::Audio => self.audio_entries.len(),
            TrackType::Invalid => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `stbl`
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    pub description: SampleDescription,
    /// The `seig` group descriptions shared by every fragment of the track.
    pub sample_group_description: SampleGroupDescription,
}

impl SampleTable {
    pub fn parse(reader: &mut BoxReader<'_>, track_type: TrackType) -> Result<Self> {
        reader.scan_children()?;
        let mut stsd = reader.take_child(FourCc::STSD).ok_or(Mp4Error::MissingChild {
            parent: FourCc::STBL,
            child: FourCc::STSD,
        })?;
        let description = SampleDescription::parse(&mut stsd, track_type)?;
        let sample_group_description = read_seig_description(reader)?;
        Ok(Self {
            description,
            sample_group_description,
        })
    }
}

/// `mdia`, with `minf` flattened into the sample table.
#[derive(Debug, Clone, Default)]
pub struct Media {
    pub header: MediaHeader,
    pub handler: HandlerReference,
    pub sample_table: SampleTable,
}

impl ParseBox for Media {
    const BOX_TYPE: FourCc = FourCc::MDIA;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.scan_children()?;
        let header = reader.read_child()?;
        let handler: HandlerReference = reader.read_child()?;

        // The handler type decides how the sample description is read.
        let missing = |parent, child| Mp4Error::MissingChild { parent, child };
        let mut minf = reader
            .take_child(FourCc::MINF)
            .ok_or(missing(FourCc::MDIA, FourCc::MINF))?;
        minf.scan_children()?;
        let mut stbl = minf
            .take_child(FourCc::STBL)
            .ok_or(missing(FourCc::MINF, FourCc::STBL))?;
        let sample_table = SampleTable::parse(&mut stbl, handler.track_type)?;

        Ok(Self {
            header,
            handler,
            sample_table,
        })
    }
}

/// `trak`
#[derive(Debug, Clone, Default)]
pub struct Track {
    pub header: TrackHeader,
    pub media: Media,
    pub edit: Option<Edit>,
}

impl Track {
    pub fn track_id(&self) -> u32 {
        self.header.track_id
    }

    pub fn track_type(&self) -> TrackType {
        self.media.handler.track_type
    }

    pub fn timescale(&self) -> u32 {
        self.media.header.timescale
    }

    pub fn sample_description(&self) -> &SampleDescription {
        &self.media.sample_table.description
    }
}

impl ParseBox for Track {
    const BOX_TYPE: FourCc = FourCc::TRAK;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.scan_children()?;
        Ok(Self {
            header: reader.read_child()?,
            media: reader.read_child()?,
            edit: reader.maybe_read_child()?,
        })
    }
}

/// `mehd`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MovieExtendsHeader {
    pub fragment_duration: u64,
}

impl ParseBox for MovieExtendsHeader {
    const BOX_TYPE: FourCc = FourCc::MEHD;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let fragment_duration = if reader.version() == 1 {
            reader.cursor().read_u64()?
        } else {
            reader.cursor().read_u32_into_u64()?
        };
        Ok(Self { fragment_duration })
    }
}

/// `trex`: per-track defaults for fragment samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackExtends {
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

impl ParseBox for TrackExtends {
    const BOX_TYPE: FourCc = FourCc::TREX;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.read_full_box_header()?;
        let cursor = reader.cursor();
        Ok(Self {
            track_id: cursor.read_u32()?,
            default_sample_description_index: cursor.read_u32()?,
            default_sample_duration: cursor.read_u32()?,
            default_sample_size: cursor.read_u32()?,
            default_sample_flags: cursor.read_u32()?,
        })
    }
}

/// `mvex`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MovieExtends {
    pub header: Option<MovieExtendsHeader>,
    pub tracks: Vec<TrackExtends>,
}

impl ParseBox for MovieExtends {
    const BOX_TYPE: FourCc = FourCc::MVEX;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.scan_children()?;
        Ok(Self {
            header: reader.maybe_read_child()?,
            tracks: reader.read_children()?,
        })
    }
}

/// `moov`
#[derive(Debug, Clone, Default)]
pub struct Movie {
    pub header: MovieHeader,
    pub tracks: Vec<Track>,
    /// Absent in unfragmented files, which cannot be demuxed.
    pub extends: Option<MovieExtends>,
    pub pssh: Vec<ProtectionSystemSpecificHeader>,
}

impl Movie {
    pub fn track(&self, track_id: u32) -> Option<&Track> {
        self.tracks.iter().find(|track| track.track_id() == track_id)
    }

    pub fn track_index(&self, track_id: u32) -> Option<usize> {
        self.tracks.iter().position(|track| track.track_id() == track_id)
    }

    pub fn track_extends(&self, track_id: u32) -> Option<&TrackExtends> {
        self.extends
            .as_ref()?
            .tracks
            .iter()
            .find(|trex| trex.track_id == track_id)
    }
}

impl ParseBox for Movie {
    const BOX_TYPE: FourCc = FourCc::MOOV;

    fn parse(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.scan_children()?;
        let header = reader.read_child()?;
        let tracks = reader.read_children()?;
        let extends = reader.maybe_read_child()?;
        if extends.is_none() {
            warn!(
                "moov has no mvex box; this looks like an unfragmented MP4 and its \
                 fragments cannot be resolved"
            );
        }
        let pssh = reader.maybe_read_children()?;
        Ok(Self {
            header,
            tracks,
            extends,
            pssh,
        })
    }
}
