//! Push-based demuxer for fragmented MP4 streams.
//!
//! Bytes are appended with [`FragmentedMp4Demuxer::push`] and samples are
//! pulled with [`FragmentedMp4Demuxer::poll`]. The demuxer keeps only the
//! bytes it may still need: media data boxes are never buffered in full, and
//! a fragment's sample data is released as soon as every run before it has
//! been emitted.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use media_types::{BitstreamConverter, DecryptConfig, verify_subsamples_match_size};
use tracing::{debug, trace, warn};

use crate::box_reader::{BoxReader, ParseBox, ParseResult};
use crate::boxes::{Movie, MovieFragment, ProtectionSystemSpecificHeader};
use crate::error::{Mp4Error, Result};
use crate::fourcc::FourCc;
use crate::track_run::TrackRunIterator;

/// Sample post-processing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemuxOptions {
    /// Rewrite H.264 and H.265 frames from length-prefixed to Annex-B, with
    /// parameter sets in front of every keyframe.
    pub convert_to_annex_b: bool,
    /// Fail instead of logging when a converted frame breaks the NAL unit
    /// order rules.
    pub reject_non_conformant_annex_b: bool,
    /// Let a conclusive bitstream analysis override the container's
    /// keyframe flag.
    pub trust_bitstream_keyframes: bool,
}

impl Default for DemuxOptions {
    fn default() -> Self {
        Self {
            convert_to_annex_b: true,
            reject_non_conformant_annex_b: false,
            trust_bitstream_keyframes: true,
        }
    }
}

/// One sample ready for a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxedSample {
    pub track_id: u32,
    pub is_audio: bool,
    pub data: Bytes,
    /// In `timescale` units.
    pub dts: i64,
    pub cts: i64,
    pub duration: u32,
    pub timescale: u32,
    pub is_keyframe: bool,
    /// Present for encrypted samples. The subsamples describe `data`.
    pub decrypt_config: Option<DecryptConfig>,
}

/// Bytes of the stream addressed by absolute offset.
#[derive(Debug, Default)]
struct ByteQueue {
    buf: BytesMut,
    /// Offset of `buf[0]` in the stream.
    head: u64,
    /// Bytes before this offset are dropped as they arrive.
    skip_until: u64,
}

impl ByteQueue {
    fn head(&self) -> u64 {
        self.head
    }

    fn tail(&self) -> u64 {
        self.head + self.buf.len() as u64
    }

    fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn is_skipping(&self) -> bool {
        self.skip_until > self.head
    }

    fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        self.discard_skipped();
    }

    /// Everything buffered from `offset` on; empty past the tail.
    fn peek_at(&self, offset: u64) -> Result<&[u8]> {
        if offset < self.head {
            return Err(Mp4Error::DataDiscarded(offset));
        }
        let start = (offset - self.head).min(self.buf.len() as u64) as usize;
        Ok(&self.buf[start..])
    }

    /// Drops everything before `offset`, including bytes not received yet.
    fn trim(&mut self, offset: u64) {
        self.skip_until = self.skip_until.max(offset);
        self.discard_skipped();
    }

    fn discard_skipped(&mut self) {
        if !self.is_skipping() {
            return;
        }
        let count = (self.skip_until.min(self.tail()) - self.head) as usize;
        self.buf.advance(count);
        self.head += count as u64;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ParsingBoxes,
    EmittingSamples,
    Stopped,
}

enum Progress {
    Advanced,
    Sample(DemuxedSample),
    NeedMoreData,
}

fn absolute_offset(base: u64, relative: i64) -> Result<u64> {
    base.checked_add_signed(relative)
        .ok_or(Mp4Error::InvalidDataOffset(relative))
}

fn concat_pssh(boxes: &[ProtectionSystemSpecificHeader]) -> Vec<u8> {
    boxes.iter().flat_map(|pssh| pssh.raw_box.iter().copied()).collect()
}

/// Streaming demuxer for fragmented MP4.
///
/// An error stops the demuxer; every later [`poll`](Self::poll) fails with
/// [`Mp4Error::Stopped`].
#[derive(Debug)]
pub struct FragmentedMp4Demuxer {
    options: DemuxOptions,
    queue: ByteQueue,
    state: State,
    moov: Option<Arc<Movie>>,
    runs: Option<TrackRunIterator>,
    init_data: Vec<u8>,
    /// Stream offset of the current moof box.
    moof_head: u64,
    /// End of the last media data box known to hold the current fragment.
    mdat_tail: u64,
    eos: bool,
}

impl Default for FragmentedMp4Demuxer {
    fn default() -> Self {
        Self::new(DemuxOptions::default())
    }
}

impl FragmentedMp4Demuxer {
    pub fn new(options: DemuxOptions) -> Self {
        Self {
            options,
            queue: ByteQueue::default(),
            state: State::ParsingBoxes,
            moov: None,
            runs: None,
            init_data: Vec::new(),
            moof_head: 0,
            mdat_tail: 0,
            eos: false,
        }
    }

    pub fn options(&self) -> &DemuxOptions {
        &self.options
    }

    /// The latest movie box, once one has been parsed.
    pub fn movie(&self) -> Option<&Arc<Movie>> {
        self.moov.as_ref()
    }

    /// The `pssh` boxes of the latest `moov` or `moof` that carried any,
    /// back to back. Empty for clear streams.
    pub fn encryption_init_data(&self) -> &[u8] {
        &self.init_data
    }

    pub fn push(&mut self, data: &[u8]) {
        if self.eos {
            warn!("Ignoring {} bytes pushed after the end of the stream", data.len());
            return;
        }
        self.queue.push(data);
    }

    /// Marks the stream complete. Boxes still buffered are parsed with the
    /// end-of-stream rules and a fragment cut short becomes an error.
    pub fn set_end_of_stream(&mut self) {
        self.eos = true;
    }

    /// Returns the next sample, or `None` until more data is pushed.
    pub fn poll(&mut self) -> Result<Option<DemuxedSample>> {
        if self.state == State::Stopped {
            return Err(Mp4Error::Stopped);
        }
        match self.poll_sample() {
            Ok(sample) => Ok(sample),
            Err(err) => {
                warn!("Stopping demuxer: {err}");
                self.state = State::Stopped;
                self.runs = None;
                Err(err)
            }
        }
    }

    fn poll_sample(&mut self) -> Result<Option<DemuxedSample>> {
        loop {
            let progress = match self.state {
                State::ParsingBoxes => self.parse_box()?,
                State::EmittingSamples => {
                    let progress = self.enqueue_sample()?;
                    if !matches!(progress, Progress::NeedMoreData)
                        && self.state == State::EmittingSamples
                    {
                        self.discard_mdats_until_max_clear_offset()?;
                    }
                    progress
                }
                State::Stopped => return Err(Mp4Error::Stopped),
            };

            match progress {
                Progress::Advanced => continue,
                Progress::Sample(sample) => return Ok(Some(sample)),
                Progress::NeedMoreData => {
                    if self.eos && self.state == State::EmittingSamples {
                        return Err(Mp4Error::UnexpectedEndOfStream);
                    }
                    if self.eos && self.queue.is_skipping() {
                        debug!("Stream ended inside a skipped box");
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn parse_box(&mut self) -> Result<Progress> {
        if self.queue.is_skipping() || self.queue.bytes().is_empty() {
            return Ok(Progress::NeedMoreData);
        }

        let header = match BoxReader::start_top_level(self.queue.bytes(), self.eos) {
            ParseResult::Ok(header) => header,
            ParseResult::NeedMoreData => return Ok(Progress::NeedMoreData),
            ParseResult::Error(err) => return Err(err),
        };

        match header.box_type {
            FourCc::MOOV => self.parse_moov(),
            FourCc::MOOF => self.parse_moof(),
            other => {
                trace!(box_type = %other, size = header.size, "skipping top-level box");
                self.queue.trim(self.queue.head() + header.size);
                Ok(Progress::Advanced)
            }
        }
    }

    fn parse_moov(&mut self) -> Result<Progress> {
        let (movie, size) = match BoxReader::read_top_level(self.queue.bytes(), self.eos) {
            ParseResult::Ok(mut reader) => (Movie::parse(&mut reader)?, reader.size()),
            ParseResult::NeedMoreData => return Ok(Progress::NeedMoreData),
            ParseResult::Error(err) => return Err(err),
        };

        if self.moov.is_some() {
            debug!("Replacing the movie with a new moov box");
        }
        debug!(tracks = movie.tracks.len(), "parsed moov");
        if !movie.pssh.is_empty() {
            self.init_data = concat_pssh(&movie.pssh);
        }
        self.moov = Some(Arc::new(movie));
        self.runs = None;
        self.queue.trim(self.queue.head() + size as u64);
        Ok(Progress::Advanced)
    }

    fn parse_moof(&mut self) -> Result<Progress> {
        let moov = self.moov.as_ref().ok_or(Mp4Error::NoMovie)?;
        let (moof, size) = match BoxReader::read_top_level(self.queue.bytes(), self.eos) {
            ParseResult::Ok(mut reader) => (MovieFragment::parse(&mut reader)?, reader.size()),
            ParseResult::NeedMoreData => return Ok(Progress::NeedMoreData),
            ParseResult::Error(err) => return Err(err),
        };

        let mut runs = TrackRunIterator::new(Arc::clone(moov));
        runs.init(&moof)?;
        trace!(
            sequence_number = moof.header.sequence_number,
            "parsed moof"
        );
        if !moof.pssh.is_empty() {
            self.init_data = concat_pssh(&moof.pssh);
        }

        // The moof stays buffered: auxiliary information may live inside it.
        self.moof_head = self.queue.head();
        self.mdat_tail = self.moof_head + size as u64;
        self.runs = Some(runs);
        self.state = State::EmittingSamples;
        Ok(Progress::Advanced)
    }

    fn enqueue_sample(&mut self) -> Result<Progress> {
        let Some(runs) = self.runs.as_mut() else {
            self.state = State::ParsingBoxes;
            return Ok(Progress::Advanced);
        };

        if !runs.is_run_valid() {
            // Whatever follows the fragment's media data is parsed as boxes.
            self.queue.trim(self.mdat_tail);
            self.state = State::ParsingBoxes;
            trace!("end of fragment");
            return Ok(Progress::Advanced);
        }

        if !runs.is_sample_valid() {
            runs.advance_run();
            return Ok(Progress::Advanced);
        }

        if runs.aux_info_needs_to_be_cached() {
            let offset = absolute_offset(self.moof_head, runs.aux_info_offset())?;
            let size = runs.aux_info_size() as usize;
            let buf = self.queue.peek_at(offset)?;
            if buf.len() < size {
                return Ok(Progress::NeedMoreData);
            }
            runs.cache_aux_info(&buf[..size])?;
            return Ok(Progress::Advanced);
        }

        let size = runs.sample_size() as usize;
        if size == 0 {
            debug!(track_id = runs.track_id(), "Ignoring zero-sized sample");
            runs.advance_sample();
            return Ok(Progress::Advanced);
        }

        let offset = absolute_offset(self.moof_head, runs.sample_offset())?;
        let buf = self.queue.peek_at(offset)?;
        if buf.len() < size {
            return Ok(Progress::NeedMoreData);
        }
        let mut frame = buf[..size].to_vec();

        let track_id = runs.track_id();
        let mut is_keyframe = runs.is_keyframe();
        let mut decrypt_config = runs.decrypt_config()?;

        if let Some(entry) = runs.video_description().filter(|_| self.options.convert_to_annex_b)
        {
            let mut subsamples = decrypt_config
                .as_ref()
                .map(|config| config.subsamples().to_vec())
                .unwrap_or_default();

            if decrypt_config.is_some() && subsamples.is_empty() {
                // The length prefixes are encrypted along with the rest.
                debug!(track_id, "Leaving fully encrypted frame unconverted");
            } else {
                let analysis =
                    entry
                        .codec
                        .convert_and_analyze_frame(&mut frame, is_keyframe, &mut subsamples)?;

                if analysis.is_conformant == Some(false) {
                    if self.options.reject_non_conformant_annex_b {
                        return Err(Mp4Error::NonConformantAnnexB { track_id });
                    }
                    debug!(track_id, dts = runs.dts(), "Frame is not conformant Annex-B");
                }

                if let Some(analyzed) = analysis.is_keyframe {
                    if self.options.trust_bitstream_keyframes {
                        if analyzed != is_keyframe {
                            warn!(
                                track_id,
                                dts = runs.dts(),
                                "Container keyframe flag {is_keyframe} does not match the bitstream"
                            );
                        }
                        is_keyframe = analyzed;
                    }
                }

                if decrypt_config.is_some() && !subsamples.is_empty() {
                    if !verify_subsamples_match_size(&subsamples, frame.len()) {
                        return Err(Mp4Error::SubsampleSizeMismatch {
                            subsample_total: subsamples.iter().map(|s| s.size()).sum(),
                            sample_size: frame.len() as u32,
                        });
                    }
                    decrypt_config = decrypt_config.map(|config| config.with_subsamples(subsamples));
                }
            }
        }

        let sample = DemuxedSample {
            track_id,
            is_audio: runs.is_audio(),
            data: Bytes::from(frame),
            dts: runs.dts(),
            cts: runs.cts(),
            duration: runs.duration(),
            timescale: runs.timescale(),
            is_keyframe,
            decrypt_config,
        };
        trace!(
            track_id,
            dts = sample.dts,
            size = sample.data.len(),
            keyframe = sample.is_keyframe,
            "sample"
        );
        runs.advance_sample();
        Ok(Progress::Sample(sample))
    }

    /// Walks the media data boxes below the lowest offset the fragment still
    /// needs and releases the bytes before it.
    fn discard_mdats_until_max_clear_offset(&mut self) -> Result<()> {
        let Some(runs) = &self.runs else {
            return Ok(());
        };
        let max_clear_offset = self
            .moof_head
            .saturating_add_signed(runs.max_clear_offset());
        let upper_bound = max_clear_offset.min(self.queue.tail());

        while self.mdat_tail < upper_bound {
            let buf = self.queue.peek_at(self.mdat_tail)?;
            match BoxReader::start_top_level(buf, self.eos) {
                ParseResult::Ok(header) => {
                    if header.box_type != FourCc::MDAT {
                        debug!("Unexpected box type while parsing MDATs: {}", header.box_type);
                    }
                    self.mdat_tail += header.size;
                }
                ParseResult::NeedMoreData => break,
                ParseResult::Error(err) => return Err(err),
            }
        }

        self.queue.trim(self.mdat_tail.min(upper_bound));
        Ok(())
    }
}
