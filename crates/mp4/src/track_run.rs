use std::sync::Arc;

use media_types::DecryptConfig;
use tracing::{debug, trace};

use crate::boxes::{
    AudioSampleEntry, Movie, MovieFragment, SAMPLE_IS_NON_SYNC_SAMPLE,
    SampleDependsOn, TrackExtends, TrackFragment, TrackFragmentHeader, TrackFragmentRun, TrackType,
    VideoSampleEntry,
};
use crate::cenc::FrameCencInfo;
use crate::cenc_resolver::{CencResolver, SampleEncryption};
use crate::error::{Mp4Error, Result};
use crate::sample_to_group::SampleToGroupIterator;

/// Timing, size and flags of one sample in a track run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleInfo {
    pub size: u32,
    pub duration: u32,
    /// Composition offset, with the edit list shift applied.
    pub cts_offset: i64,
    pub is_keyframe: bool,
    pub cenc_group_description_index: u32,
}

#[derive(Debug, Clone)]
struct TrackRunInfo {
    track_id: u32,
    track_index: usize,
    description_index: usize,
    timescale: u32,
    is_audio: bool,
    start_dts: i64,
    /// Relative to the start of the moof box.
    sample_start_offset: i64,
    /// -1 when the run has no auxiliary information.
    aux_info_start_offset: i64,
    aux_info_default_size: u8,
    aux_info_sizes: Vec<u8>,
    aux_info_total_size: i64,
    has_encrypted_samples: bool,
    cenc: Arc<CencResolver>,
    samples: Vec<SampleInfo>,
}

impl TrackRunInfo {
    /// Ordering key: the smaller, then the larger, of the sample data and
    /// auxiliary information offsets.
    fn data_order(&self) -> (i64, i64) {
        let aux = if self.aux_info_total_size > 0 {
            self.aux_info_start_offset
        } else {
            i64::MAX
        };
        (
            aux.min(self.sample_start_offset),
            aux.max(self.sample_start_offset),
        )
    }

    fn aux_info_size_of(&self, sample_index: usize) -> usize {
        match self.aux_info_default_size {
            0 => self.aux_info_sizes.get(sample_index).copied().unwrap_or(0) as usize,
            size => size as usize,
        }
    }
}

fn populate_sample_info(
    trex: &TrackExtends,
    tfhd: &TrackFragmentHeader,
    trun: &TrackFragmentRun,
    edit_list_offset: i64,
    index: usize,
    sdtp_depends_on: SampleDependsOn,
    is_audio: bool,
) -> Result<SampleInfo> {
    let size = match trun.sample_sizes.get(index) {
        Some(&size) => size,
        None if tfhd.default_sample_size > 0 => tfhd.default_sample_size,
        None => trex.default_sample_size,
    };
    let duration = match trun.sample_durations.get(index) {
        Some(&duration) => duration,
        None if tfhd.default_sample_duration > 0 => tfhd.default_sample_duration,
        None => trex.default_sample_duration,
    };
    let cts_offset = trun
        .sample_composition_time_offsets
        .get(index)
        .copied()
        .unwrap_or(0)
        + edit_list_offset;
    let flags = match trun.sample_flags.get(index) {
        Some(&flags) => flags,
        None if tfhd.has_default_sample_flags => tfhd.default_sample_flags,
        None => trex.default_sample_flags,
    };

    let mut depends_on = SampleDependsOn::from_sample_flags(flags);
    if depends_on == SampleDependsOn::Unknown {
        depends_on = sdtp_depends_on;
    }
    if depends_on == SampleDependsOn::Reserved {
        return Err(Mp4Error::ReservedSampleDependency);
    }

    // Some muxers mark every video frame as a sync sample, so video frames
    // that depend on others are never keyframes. Audio frames may depend on
    // earlier ones and still be random access points.
    let is_sync_sample = flags & SAMPLE_IS_NON_SYNC_SAMPLE == 0;
    let is_keyframe = is_sync_sample && (depends_on != SampleDependsOn::Others || is_audio);

    Ok(SampleInfo {
        size,
        duration,
        cts_offset,
        is_keyframe,
        cenc_group_description_index: 0,
    })
}

/// Offset that removes the composition delay signalled by the first edit.
///
/// Only a single non-empty edit is understood. Empty edits are ignored and
/// later edits are dropped.
fn edit_list_offset(movie: &Movie, track_index: usize) -> i64 {
    let Some(edit) = &movie.tracks[track_index].edit else {
        return 0;
    };
    let edits = &edit.list.edits;
    let Some(first) = edits.first() else {
        return 0;
    };
    if edits.len() > 1 {
        debug!("Multi-entry edit box detected; some components ignored.");
    }
    if first.media_time < 0 {
        debug!("Empty edit list entry ignored.");
        0
    } else {
        -first.media_time
    }
}

/// Walks the samples of a movie fragment in the order their data appears in
/// the stream.
///
/// Runs of all audio and video tracks are merged and sorted by the lower of
/// their sample data and auxiliary information offsets, so a caller reading
/// a growing buffer never has to look back further than
/// [`max_clear_offset`](Self::max_clear_offset).
#[derive(Debug, Clone)]
pub struct TrackRunIterator {
    moov: Arc<Movie>,
    runs: Vec<TrackRunInfo>,
    run_index: usize,
    sample_index: usize,
    sample_dts: i64,
    sample_offset: i64,
    cenc_info: Vec<Option<FrameCencInfo>>,
}

impl TrackRunIterator {
    pub fn new(moov: Arc<Movie>) -> Self {
        Self {
            moov,
            runs: Vec::new(),
            run_index: 0,
            sample_index: 0,
            sample_dts: 0,
            sample_offset: 0,
            cenc_info: Vec::new(),
        }
    }

    pub fn movie(&self) -> &Arc<Movie> {
        &self.moov
    }

    /// Replaces the runs with those of `moof` and moves to the first sample.
    pub fn init(&mut self, moof: &MovieFragment) -> Result<()> {
        self.runs.clear();
        for traf in &moof.tracks {
            self.add_track_fragment(traf)?;
        }
        self.runs.sort_by_key(TrackRunInfo::data_order);
        trace!(runs = self.runs.len(), "track runs initialized");

        self.run_index = 0;
        self.reset_run();
        Ok(())
    }

    fn add_track_fragment(&mut self, traf: &TrackFragment) -> Result<()> {
        let moov = Arc::clone(&self.moov);
        let track_id = traf.header.track_id;
        let track_index = moov
            .track_index(track_id)
            .ok_or(Mp4Error::TrackNotFound(track_id))?;
        let track = &moov.tracks[track_index];
        let trex = moov
            .track_extends(track_id)
            .ok_or(Mp4Error::TrackExtendsNotFound(track_id))?;

        let stsd = track.sample_description();
        let is_audio = match stsd.track_type {
            TrackType::Audio => true,
            TrackType::Video => false,
            TrackType::Invalid => {
                debug!(track_id, "Skipping unhandled track type");
                return Ok(());
            }
        };

        let mut desc_index = traf.header.sample_description_index;
        if desc_index == 0 {
            desc_index = trex.default_sample_description_index;
        }
        if desc_index == 0 || stsd.is_empty() {
            return Err(Mp4Error::InvalidSampleDescriptionIndex {
                track_id,
                index: desc_index,
            });
        }
        // Descriptions are 1-based in the file.
        let mut description_index = desc_index as usize - 1;
        if description_index >= stsd.len() {
            debug!(track_id, desc_index, "sample description index out of range, using the first");
            description_index = 0;
        }

        let track_encryption = if is_audio {
            stsd.audio_entries[description_index].track_encryption().copied()
        } else {
            stsd.video_entries[description_index].track_encryption().copied()
        };
        let cenc = Arc::new(CencResolver::new(
            track_encryption,
            track.media.sample_table.sample_group_description.entries.clone(),
            traf.sample_group_description.entries.clone(),
        ));

        let edit_list_offset = edit_list_offset(&moov, track_index);
        let mut sample_to_group = SampleToGroupIterator::new(&traf.sample_to_group);
        let uses_sample_groups = sample_to_group.is_valid();

        let mut run_start_dts = traf.decode_time.decode_time as i64;
        let mut sample_count_sum = 0usize;

        for (run_number, trun) in traf.runs.iter().enumerate() {
            let sample_count = trun.sample_count as usize;

            let mut run = TrackRunInfo {
                track_id,
                track_index,
                description_index,
                timescale: track.timescale(),
                is_audio,
                start_dts: run_start_dts,
                sample_start_offset: trun.data_offset,
                aux_info_start_offset: -1,
                aux_info_default_size: 0,
                aux_info_sizes: Vec::new(),
                aux_info_total_size: 0,
                has_encrypted_samples: false,
                cenc: Arc::clone(&cenc),
                samples: Vec::with_capacity(sample_count),
            };

            // The n-th saio offset belongs to the n-th run.
            let aux_offset = traf
                .auxiliary_offset
                .as_ref()
                .and_then(|saio| saio.offsets.get(run_number));
            if let Some(&aux_offset) = aux_offset {
                let saiz = traf
                    .auxiliary_size
                    .as_ref()
                    .ok_or(Mp4Error::InsufficientAuxInfo)?;
                if (saiz.sample_count as usize) < sample_count_sum + sample_count {
                    return Err(Mp4Error::InsufficientAuxInfo);
                }

                run.aux_info_start_offset =
                    i64::try_from(aux_offset).map_err(|_| Mp4Error::InsufficientAuxInfo)?;
                run.aux_info_default_size = saiz.default_sample_info_size;
                run.aux_info_total_size = if saiz.default_sample_info_size > 0 {
                    saiz.default_sample_info_size as i64 * sample_count as i64
                } else {
                    let sizes = saiz
                        .sample_info_sizes
                        .get(sample_count_sum..sample_count_sum + sample_count)
                        .ok_or(Mp4Error::InsufficientAuxInfo)?;
                    run.aux_info_sizes = sizes.to_vec();
                    sizes.iter().map(|&size| size as i64).sum()
                };
            }

            for index in 0..sample_count {
                let mut sample = populate_sample_info(
                    trex,
                    &traf.header,
                    trun,
                    edit_list_offset,
                    index,
                    traf.sdtp.as_ref().map_or(SampleDependsOn::Unknown, |sdtp| {
                        sdtp.sample_depends_on(sample_count_sum + index)
                    }),
                    is_audio,
                )?;
                run_start_dts += sample.duration as i64;

                if uses_sample_groups {
                    let group_index = sample_to_group
                        .group_description_index()
                        .ok_or(Mp4Error::SampleToGroupMismatch { track_id })?;
                    if group_index != 0 && cenc.entry(group_index).is_none() {
                        return Err(Mp4Error::InvalidGroupDescriptionIndex(group_index));
                    }
                    sample.cenc_group_description_index = group_index;
                    sample_to_group.advance();
                }

                run.has_encrypted_samples |=
                    cenc.resolve(sample.cenc_group_description_index)?.is_encrypted;
                run.samples.push(sample);
            }

            self.runs.push(run);
            sample_count_sum += sample_count;
        }

        // The table must cover exactly the samples of the fragment.
        if uses_sample_groups && sample_to_group.is_valid() {
            return Err(Mp4Error::SampleToGroupMismatch { track_id });
        }
        Ok(())
    }

    fn run(&self) -> Option<&TrackRunInfo> {
        self.runs.get(self.run_index)
    }

    fn sample(&self) -> Option<&SampleInfo> {
        self.run()?.samples.get(self.sample_index)
    }

    fn reset_run(&mut self) {
        let Some(run) = self.runs.get(self.run_index) else {
            return;
        };
        self.sample_dts = run.start_dts;
        self.sample_offset = run.sample_start_offset;
        self.sample_index = 0;
        self.cenc_info.clear();
    }

    pub fn is_run_valid(&self) -> bool {
        self.run_index < self.runs.len()
    }

    pub fn is_sample_valid(&self) -> bool {
        self.sample().is_some()
    }

    pub fn advance_run(&mut self) {
        if self.is_run_valid() {
            self.run_index += 1;
            self.reset_run();
        }
    }

    pub fn advance_sample(&mut self) {
        if let Some(&sample) = self.sample() {
            self.sample_dts += sample.duration as i64;
            self.sample_offset += sample.size as i64;
            self.sample_index += 1;
        }
    }

    /// Whether the current run has encrypted samples whose auxiliary
    /// information has not been passed to [`cache_aux_info`](Self::cache_aux_info).
    pub fn aux_info_needs_to_be_cached(&self) -> bool {
        self.run().is_some_and(|run| {
            run.has_encrypted_samples && run.aux_info_total_size > 0 && self.cenc_info.is_empty()
        })
    }

    /// Parses the auxiliary information of the current run from `buf`, which
    /// starts at [`aux_info_offset`](Self::aux_info_offset).
    pub fn cache_aux_info(&mut self, buf: &[u8]) -> Result<()> {
        if !self.aux_info_needs_to_be_cached() {
            return Err(Mp4Error::AuxInfoUnavailable);
        }
        let Some(run) = self.runs.get(self.run_index) else {
            return Err(Mp4Error::AuxInfoUnavailable);
        };
        if (buf.len() as i64) < run.aux_info_total_size {
            return Err(Mp4Error::InsufficientAuxInfo);
        }

        let mut cenc_info = Vec::with_capacity(run.samples.len());
        let mut pos = 0;
        for (index, sample) in run.samples.iter().enumerate() {
            let info_size = run.aux_info_size_of(index);
            let encryption = run.cenc.resolve(sample.cenc_group_description_index)?;
            if encryption.is_encrypted {
                let entry = buf
                    .get(pos..pos + info_size)
                    .ok_or(Mp4Error::InsufficientAuxInfo)?;
                cenc_info.push(Some(FrameCencInfo::parse(encryption.iv_size, entry)?));
            } else {
                cenc_info.push(None);
            }
            pos += info_size;
        }

        trace!(samples = cenc_info.len(), "cached auxiliary information");
        self.cenc_info = cenc_info;
        Ok(())
    }

    /// Lowest moof-relative offset that is still needed, 0 when nothing is.
    ///
    /// Covers the current sample, the auxiliary information of the current run
    /// while it is uncached, and the data of the next run.
    pub fn max_clear_offset(&self) -> i64 {
        let mut offset = i64::MAX;
        if self.is_sample_valid() {
            offset = offset.min(self.sample_offset);
            if self.aux_info_needs_to_be_cached() {
                offset = offset.min(self.aux_info_offset());
            }
        }
        if let Some(next) = self.runs.get(self.run_index + 1) {
            offset = offset.min(next.sample_start_offset);
            if next.aux_info_total_size > 0 {
                offset = offset.min(next.aux_info_start_offset);
            }
        }
        if offset == i64::MAX { 0 } else { offset }
    }

    pub fn track_id(&self) -> u32 {
        self.run().map_or(0, |run| run.track_id)
    }

    pub fn timescale(&self) -> u32 {
        self.run().map_or(0, |run| run.timescale)
    }

    pub fn is_audio(&self) -> bool {
        self.run().is_some_and(|run| run.is_audio)
    }

    pub fn video_description(&self) -> Option<&VideoSampleEntry> {
        let run = self.run().filter(|run| !run.is_audio)?;
        self.moov.tracks[run.track_index]
            .sample_description()
            .video_entries
            .get(run.description_index)
    }

    pub fn audio_description(&self) -> Option<&AudioSampleEntry> {
        let run = self.run().filter(|run| run.is_audio)?;
        self.moov.tracks[run.track_index]
            .sample_description()
            .audio_entries
            .get(run.description_index)
    }

    /// Moof-relative offset of the current run's auxiliary information.
    pub fn aux_info_offset(&self) -> i64 {
        self.run().map_or(-1, |run| run.aux_info_start_offset)
    }

    pub fn aux_info_size(&self) -> i64 {
        self.run().map_or(0, |run| run.aux_info_total_size)
    }

    /// Moof-relative offset of the current sample's data.
    pub fn sample_offset(&self) -> i64 {
        self.sample_offset
    }

    pub fn sample_size(&self) -> u32 {
        self.sample().map_or(0, |sample| sample.size)
    }

    pub fn dts(&self) -> i64 {
        self.sample_dts
    }

    pub fn cts(&self) -> i64 {
        self.sample_dts + self.sample().map_or(0, |sample| sample.cts_offset)
    }

    pub fn duration(&self) -> u32 {
        self.sample().map_or(0, |sample| sample.duration)
    }

    pub fn is_keyframe(&self) -> bool {
        self.sample().is_some_and(|sample| sample.is_keyframe)
    }

    pub fn sample_info(&self) -> Option<&SampleInfo> {
        self.sample()
    }

    /// Encryption parameters of the current sample.
    pub fn sample_encryption(&self) -> Result<SampleEncryption> {
        match (self.run(), self.sample()) {
            (Some(run), Some(sample)) => run.cenc.resolve(sample.cenc_group_description_index),
            _ => Ok(SampleEncryption::default()),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.sample_encryption()
            .is_ok_and(|encryption| encryption.is_encrypted)
    }

    /// Decryption parameters of the current sample, `None` if it is clear.
    ///
    /// Fails when the auxiliary information has not been cached or its
    /// subsamples do not add up to the sample size.
    pub fn decrypt_config(&self) -> Result<Option<DecryptConfig>> {
        let encryption = self.sample_encryption()?;
        if !encryption.is_encrypted {
            return Ok(None);
        }

        let cenc_info = self
            .cenc_info
            .get(self.sample_index)
            .and_then(Option::as_ref)
            .ok_or(Mp4Error::AuxInfoUnavailable)?;

        let sample_size = self.sample_size();
        if !cenc_info.subsamples.is_empty() {
            let subsample_total = cenc_info.total_size_of_subsamples();
            if subsample_total != sample_size as u64 {
                return Err(Mp4Error::SubsampleSizeMismatch {
                    subsample_total,
                    sample_size,
                });
            }
        }

        Ok(Some(DecryptConfig::new(
            encryption.key_id.to_vec(),
            cenc_info.iv.to_vec(),
            cenc_info.subsamples.clone(),
        )?))
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use media_types::SubsampleEntry;

    use super::*;
    use crate::test_support::{
        TrunSample, make_audio_trak, make_cenc_aux_info, make_elst, make_encrypted_video_trak,
        make_full_box, make_moof, make_moov, make_saio, make_saiz, make_sbgp, make_sgpd,
        make_tenc, make_tfdt, make_tfhd, make_traf, make_trex, make_trun, make_video_trak,
        parse_box,
    };

    const SYNC: u32 = 0x0200_0000;
    const NON_SYNC: u32 = 0x0101_0000;
    const DEPENDS_ON_OTHERS: u32 = 0x0100_0000;

    fn movie(traks: &[Vec<u8>], trex: &[Vec<u8>]) -> Arc<Movie> {
        Arc::new(parse_box::<Movie>(&make_moov(traks, trex)).unwrap())
    }

    fn fragment(trafs: &[Vec<u8>]) -> MovieFragment {
        parse_box::<MovieFragment>(&make_moof(1, trafs)).unwrap()
    }

    fn with_flags(flags: &[u32]) -> Vec<TrunSample> {
        flags
            .iter()
            .map(|&flags| TrunSample {
                flags: Some(flags),
                ..Default::default()
            })
            .collect()
    }

    fn with_sizes(sizes: &[u32]) -> Vec<TrunSample> {
        sizes
            .iter()
            .map(|&size| TrunSample {
                size: Some(size),
                ..Default::default()
            })
            .collect()
    }

    fn init(moov: Arc<Movie>, trafs: &[Vec<u8>]) -> Result<TrackRunIterator> {
        let mut iter = TrackRunIterator::new(moov);
        iter.init(&fragment(trafs))?;
        Ok(iter)
    }

    #[test]
    fn test_timing_with_edit_list() {
        let elst = make_elst(0, &[(0, 1024)]);
        let moov = movie(
            &[make_video_trak(1, 90000, Some(&elst))],
            &[make_trex(1, 1, 3000, 100, NON_SYNC)],
        );
        let samples = [
            TrunSample {
                cts_offset: Some(2048),
                ..Default::default()
            },
            TrunSample {
                cts_offset: Some(-512),
                ..Default::default()
            },
        ];
        let mut iter = init(
            moov,
            &[make_traf(&[
                make_tfhd(1, None, None, None, None),
                make_tfdt(1, 10000),
                make_trun(1, Some(200), Some(SYNC), &samples),
            ])],
        )
        .unwrap();

        assert!(iter.is_run_valid());
        assert_eq!(iter.track_id(), 1);
        assert_eq!(iter.timescale(), 90000);
        assert!(!iter.is_audio());
        assert!(iter.video_description().is_some());
        assert!(iter.audio_description().is_none());
        assert_eq!(iter.sample_offset(), 200);
        assert_eq!(iter.sample_size(), 100);
        assert_eq!(iter.dts(), 10000);
        assert_eq!(iter.cts(), 11024);
        assert_eq!(iter.duration(), 3000);
        assert!(iter.is_keyframe());

        iter.advance_sample();
        assert_eq!(iter.sample_offset(), 300);
        assert_eq!(iter.dts(), 13000);
        assert_eq!(iter.cts(), 13000 - 512 - 1024);
        assert!(!iter.is_keyframe());

        iter.advance_sample();
        assert!(!iter.is_sample_valid());
        assert!(iter.is_run_valid());
        iter.advance_run();
        assert!(!iter.is_run_valid());
        assert_eq!(iter.max_clear_offset(), 0);
    }

    #[test]
    fn test_empty_edit_is_ignored() {
        let elst = make_elst(1, &[(1000, -1), (5000, 0)]);
        let moov = movie(
            &[make_video_trak(1, 90000, Some(&elst))],
            &[make_trex(1, 1, 3000, 100, 0)],
        );
        let iter = init(
            moov,
            &[make_traf(&[
                make_tfhd(1, None, None, None, None),
                make_tfdt(0, 0),
                make_trun(0, Some(0), None, &[TrunSample::default()]),
            ])],
        )
        .unwrap();
        assert_eq!(iter.cts(), iter.dts());
    }

    #[test]
    fn test_keyframe_rules() {
        let moov = movie(
            &[make_video_trak(1, 90000, None), make_audio_trak(2, 48000)],
            &[make_trex(1, 1, 1, 1, 0), make_trex(2, 1, 1, 1, 0)],
        );
        let sdtp = make_full_box(b"sdtp", 0, 0, &[0x00, 0x10, 0x20]);
        let mut iter = init(
            moov,
            &[
                make_traf(&[
                    make_tfhd(1, None, None, None, None),
                    make_tfdt(0, 0),
                    make_trun(0, Some(0), None, &with_flags(&[DEPENDS_ON_OTHERS, 0, 0])),
                    sdtp,
                ]),
                make_traf(&[
                    make_tfhd(2, None, None, None, None),
                    make_tfdt(0, 0),
                    make_trun(0, Some(100), None, &with_flags(&[DEPENDS_ON_OTHERS])),
                ]),
            ],
        )
        .unwrap();

        // A sync video frame that depends on others is not a keyframe.
        assert!(!iter.is_keyframe());
        iter.advance_sample();
        // Flags say nothing, sdtp says it depends on others.
        assert!(!iter.is_keyframe());
        iter.advance_sample();
        assert!(iter.is_keyframe());
        iter.advance_sample();

        iter.advance_run();
        assert!(iter.is_audio());
        assert!(iter.audio_description().is_some());
        assert!(iter.is_keyframe());
    }

    #[test]
    fn test_tfhd_defaults_with_partial_overrides() {
        let moov = movie(&[make_video_trak(1, 90000, None)], &[make_trex(1, 1, 3000, 100, 0)]);
        let samples = [
            TrunSample {
                size: Some(900),
                flags: Some(SYNC),
                ..Default::default()
            },
            TrunSample {
                size: Some(0),
                flags: Some(NON_SYNC),
                ..Default::default()
            },
        ];
        let mut moof = fragment(&[make_traf(&[
            make_tfhd(1, None, Some(512), Some(1000), None),
            make_tfdt(1, 7000),
            make_trun(0, Some(0), None, &samples),
        ])]);
        // Only the first sample carries its own size.
        moof.tracks[0].runs[0].sample_sizes.truncate(1);

        let mut iter = TrackRunIterator::new(moov);
        iter.init(&moof).unwrap();

        assert!(iter.is_keyframe());
        assert_eq!(iter.sample_size(), 900);
        assert_eq!(iter.duration(), 512);
        assert_eq!(iter.dts(), 7000);

        iter.advance_sample();
        assert!(!iter.is_keyframe());
        assert_eq!(iter.sample_size(), 1000);
        assert_eq!(iter.dts(), 7000 + 512);
        assert_eq!(iter.sample_offset(), 900);

        iter.advance_sample();
        assert!(!iter.is_sample_valid());
    }

    #[test]
    fn test_reserved_dependency() {
        let moov = movie(&[make_video_trak(1, 90000, None)], &[make_trex(1, 1, 1, 1, 0)]);
        let result = init(
            moov,
            &[make_traf(&[
                make_tfhd(1, None, None, None, None),
                make_tfdt(0, 0),
                make_trun(0, Some(0), None, &with_flags(&[0x0300_0000])),
            ])],
        );
        assert!(matches!(result, Err(Mp4Error::ReservedSampleDependency)));
    }

    #[test]
    fn test_runs_sorted_by_data_offset() {
        let moov = movie(
            &[make_video_trak(1, 90000, None), make_audio_trak(2, 48000)],
            &[make_trex(1, 1, 1, 10, 0), make_trex(2, 1, 1, 10, 0)],
        );
        let mut iter = init(
            moov,
            &[
                make_traf(&[
                    make_tfhd(1, None, None, None, None),
                    make_tfdt(0, 0),
                    make_trun(0, Some(500), None, &[TrunSample::default(); 2]),
                ]),
                make_traf(&[
                    make_tfhd(2, None, None, None, None),
                    make_tfdt(0, 0),
                    make_trun(0, Some(100), None, &[TrunSample::default()]),
                ]),
            ],
        )
        .unwrap();

        assert_eq!(iter.track_id(), 2);
        // The next run's data is still needed.
        assert_eq!(iter.max_clear_offset(), 100);
        iter.advance_sample();
        assert_eq!(iter.max_clear_offset(), 500);
        iter.advance_run();
        assert_eq!(iter.track_id(), 1);
        assert_eq!(iter.sample_offset(), 500);
    }

    #[test]
    fn test_unknown_track() {
        let moov = movie(&[make_video_trak(1, 90000, None)], &[make_trex(1, 1, 1, 1, 0)]);
        let traf = make_traf(&[
            make_tfhd(9, None, None, None, None),
            make_tfdt(0, 0),
            make_trun(0, Some(0), None, &[TrunSample::default()]),
        ]);
        assert!(matches!(
            init(moov, &[traf]),
            Err(Mp4Error::TrackNotFound(9))
        ));

        let moov = movie(
            &[make_video_trak(1, 90000, None), make_video_trak(2, 90000, None)],
            &[make_trex(1, 1, 1, 1, 0)],
        );
        let traf = make_traf(&[
            make_tfhd(2, None, None, None, None),
            make_tfdt(0, 0),
            make_trun(0, Some(0), None, &[TrunSample::default()]),
        ]);
        assert!(matches!(
            init(moov, &[traf]),
            Err(Mp4Error::TrackExtendsNotFound(2))
        ));
    }

    #[test]
    fn test_sample_description_index() {
        let moov = movie(&[make_video_trak(1, 90000, None)], &[make_trex(1, 0, 1, 1, 0)]);
        let run = |index| {
            make_traf(&[
                make_tfhd(1, index, None, None, None),
                make_tfdt(0, 0),
                make_trun(0, Some(0), None, &[TrunSample::default()]),
            ])
        };

        // Out of range falls back to the first description.
        let iter = init(Arc::clone(&moov), &[run(Some(3))]).unwrap();
        assert!(iter.video_description().is_some());

        assert!(matches!(
            init(moov, &[run(None)]),
            Err(Mp4Error::InvalidSampleDescriptionIndex { track_id: 1, index: 0 })
        ));
    }

    fn encrypted_movie(stbl_extra: &[u8]) -> Arc<Movie> {
        movie(
            &[make_encrypted_video_trak(
                1,
                90000,
                &make_tenc(true, 8, [4; 16]),
                stbl_extra,
            )],
            &[make_trex(1, 1, 3000, 0, 0)],
        )
    }

    fn encrypted_fragment(sizes: &[u32], aux_sizes: &[u8]) -> Vec<u8> {
        make_traf(&[
            make_tfhd(1, None, None, None, None),
            make_tfdt(0, 0),
            make_trun(0, Some(1000), None, &with_sizes(sizes)),
            make_saiz(0, aux_sizes),
            make_saio(0, &[500]),
        ])
    }

    #[test]
    fn test_aux_info() {
        let iv = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut aux = make_cenc_aux_info(&iv, &[(4, 6)]);
        aux.extend(make_cenc_aux_info(&iv, &[]));

        let mut iter = init(encrypted_movie(&[]), &[encrypted_fragment(&[10, 20], &[16, 8])]).unwrap();
        assert!(iter.is_encrypted());
        assert!(iter.aux_info_needs_to_be_cached());
        assert_eq!(iter.aux_info_offset(), 500);
        assert_eq!(iter.aux_info_size(), 24);
        assert_eq!(iter.max_clear_offset(), 500);
        assert!(matches!(
            iter.decrypt_config(),
            Err(Mp4Error::AuxInfoUnavailable)
        ));

        assert!(matches!(
            iter.cache_aux_info(&aux[..20]),
            Err(Mp4Error::InsufficientAuxInfo)
        ));
        iter.cache_aux_info(&aux).unwrap();
        assert!(!iter.aux_info_needs_to_be_cached());
        assert_eq!(iter.max_clear_offset(), 1000);

        let config = iter.decrypt_config().unwrap().unwrap();
        assert_eq!(config.key_id(), &[4; 16]);
        assert_eq!(&config.iv()[..8], &iv);
        assert_eq!(config.subsamples(), &[SubsampleEntry::new(4, 6)]);

        iter.advance_sample();
        let config = iter.decrypt_config().unwrap().unwrap();
        assert!(config.subsamples().is_empty());
    }

    #[test]
    fn test_subsample_size_mismatch() {
        let aux = make_cenc_aux_info(&[0; 8], &[(4, 4)]);
        let mut iter = init(encrypted_movie(&[]), &[encrypted_fragment(&[10], &[16])]).unwrap();
        iter.cache_aux_info(&aux).unwrap();
        assert!(matches!(
            iter.decrypt_config(),
            Err(Mp4Error::SubsampleSizeMismatch {
                subsample_total: 8,
                sample_size: 10,
            })
        ));
    }

    #[test]
    fn test_saiz_shorter_than_runs() {
        let result = init(encrypted_movie(&[]), &[encrypted_fragment(&[10, 20], &[16])]);
        assert!(matches!(result, Err(Mp4Error::InsufficientAuxInfo)));
    }

    fn grouped_fragment(sbgp: &[(u32, u32)]) -> Vec<u8> {
        make_traf(&[
            make_tfhd(1, None, None, None, None),
            make_tfdt(0, 0),
            make_trun(0, Some(0), None, &with_sizes(&[10, 10, 10])),
            make_sgpd(&[(true, 16, [7; 16])]),
            make_sbgp(sbgp),
        ])
    }

    #[test]
    fn test_sample_groups() {
        let moov = encrypted_movie(&make_sgpd(&[(false, 0, [0; 16])]));
        let mut iter = init(moov, &[grouped_fragment(&[(1, 1), (1, 0x10001), (1, 0)])]).unwrap();

        let info = *iter.sample_info().unwrap();
        assert_eq!(info.cenc_group_description_index, 1);
        assert!(!iter.is_encrypted());
        assert_eq!(iter.decrypt_config().unwrap(), None);

        iter.advance_sample();
        let encryption = iter.sample_encryption().unwrap();
        assert!(encryption.is_encrypted);
        assert_eq!(encryption.iv_size, 16);
        assert_eq!(encryption.key_id, [7; 16]);

        iter.advance_sample();
        let encryption = iter.sample_encryption().unwrap();
        assert_eq!(encryption.iv_size, 8);
        assert_eq!(encryption.key_id, [4; 16]);
    }

    #[test]
    fn test_sample_groups_must_cover_the_fragment() {
        let moov = encrypted_movie(&make_sgpd(&[(false, 0, [0; 16])]));
        assert!(matches!(
            init(Arc::clone(&moov), &[grouped_fragment(&[(2, 1)])]),
            Err(Mp4Error::SampleToGroupMismatch { track_id: 1 })
        ));
        assert!(matches!(
            init(Arc::clone(&moov), &[grouped_fragment(&[(4, 1)])]),
            Err(Mp4Error::SampleToGroupMismatch { track_id: 1 })
        ));
        assert!(matches!(
            init(moov, &[grouped_fragment(&[(3, 5)])]),
            Err(Mp4Error::InvalidGroupDescriptionIndex(5))
        ));
    }
}
