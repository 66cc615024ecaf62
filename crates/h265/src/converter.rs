use media_types::{AnalysisResult, BitstreamConverter, SubsampleEntry};

use crate::annex_b;
use crate::config::HEVCDecoderConfigurationRecord;
use crate::error::{H265Error, Result};

/// Converts the length-prefixed frames of one HEVC track to Annex-B.
#[derive(Debug, Clone)]
pub struct HevcBitstreamConverter {
    config: HEVCDecoderConfigurationRecord,
}

impl HevcBitstreamConverter {
    pub fn new(config: HEVCDecoderConfigurationRecord) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HEVCDecoderConfigurationRecord {
        &self.config
    }
}

impl BitstreamConverter for HevcBitstreamConverter {
    type Error = H265Error;

    /// Parameter sets are injected when the container marks the frame as a
    /// keyframe. No analysis is performed, so both fields of the result are
    /// `None`.
    fn convert_and_analyze_frame(
        &self,
        frame: &mut Vec<u8>,
        is_keyframe: bool,
        subsamples: &mut Vec<SubsampleEntry>,
    ) -> Result<AnalysisResult> {
        annex_b::convert_frame_to_annex_b(self.config.length_size, frame, subsamples)?;
        if is_keyframe {
            annex_b::insert_param_sets_annex_b(&self.config, frame, subsamples)?;
        }
        Ok(AnalysisResult::default())
    }
}
