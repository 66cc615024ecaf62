use media_types::{AnalysisResult, BitstreamConverter, SubsampleEntry};

use crate::annex_b;
use crate::config::AVCDecoderConfigurationRecord;
use crate::error::{H264Error, Result};

/// Converts the length-prefixed frames of one AVC track to Annex-B.
///
/// Keyframes get the track's SPS and PPS injected, so a decoder can start
/// from any of them.
#[derive(Debug, Clone)]
pub struct AvcBitstreamConverter {
    config: AVCDecoderConfigurationRecord,
}

impl AvcBitstreamConverter {
    pub fn new(config: AVCDecoderConfigurationRecord) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AVCDecoderConfigurationRecord {
        &self.config
    }
}

impl BitstreamConverter for AvcBitstreamConverter {
    type Error = H264Error;

    /// The container's keyframe flag is only used when the converted frame
    /// has no coded slice to decide from.
    fn convert_and_analyze_frame(
        &self,
        frame: &mut Vec<u8>,
        is_keyframe: bool,
        subsamples: &mut Vec<SubsampleEntry>,
    ) -> Result<AnalysisResult> {
        annex_b::convert_frame_to_annex_b(self.config.length_size, frame, subsamples)?;

        let analysis = annex_b::analyze_annex_b(frame, subsamples);
        if analysis.is_keyframe.unwrap_or(is_keyframe) {
            annex_b::insert_param_sets_annex_b(&self.config, frame, subsamples)?;
        }
        Ok(analysis)
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use bytes::Bytes;
    use media_types::verify_subsamples_match_size;

    use super::*;
    use crate::annex_b::{ANNEX_B_START_CODE, is_valid_annex_b};

    fn converter(length_size: u8) -> AvcBitstreamConverter {
        AvcBitstreamConverter::new(AVCDecoderConfigurationRecord {
            configuration_version: 1,
            profile_indication: 0x42,
            profile_compatibility: 0xC0,
            level_indication: 0x1E,
            length_size,
            sps: vec![Bytes::from_static(&[0x67, 0x42, 0xC0, 0x1E, 0xDA])],
            pps: vec![Bytes::from_static(&[0x68, 0xCE, 0x3C, 0x80])],
            extended_config: None,
        })
    }

    #[test]
    fn test_keyframe_gets_parameter_sets() {
        let mut frame = vec![0x00, 0x03, 0x65, 0x88, 0x84];
        let mut subsamples = vec![SubsampleEntry::new(3, 2)];
        let analysis = converter(2)
            .convert_and_analyze_frame(&mut frame, false, &mut subsamples)
            .unwrap();

        assert_eq!(analysis.is_keyframe, Some(true));
        assert_eq!(analysis.is_conformant, Some(true));
        assert_eq!(&frame[..5], &[0, 0, 0, 1, 0x67]);
        assert_eq!(frame.len(), 7 + 17);
        assert_eq!(subsamples, vec![SubsampleEntry::new(22, 2)]);
        assert!(verify_subsamples_match_size(&subsamples, frame.len()));
        assert!(is_valid_annex_b(&frame, &subsamples));
    }

    #[test]
    fn test_analysis_overrides_container_flag() {
        let mut frame = vec![0, 0, 0, 2, 0x41, 0x9A];
        let analysis = converter(4)
            .convert_and_analyze_frame(&mut frame, true, &mut Vec::new())
            .unwrap();
        assert_eq!(analysis.is_keyframe, Some(false));
        assert_eq!(frame, vec![0, 0, 0, 1, 0x41, 0x9A]);
    }

    #[test]
    fn test_inconclusive_analysis_uses_container_flag() {
        let mut frame = vec![0, 0, 0, 2, 0x06, 0x05];
        let analysis = converter(4)
            .convert_and_analyze_frame(&mut frame, true, &mut Vec::new())
            .unwrap();
        assert_eq!(analysis.is_keyframe, None);
        assert_eq!(analysis.is_conformant, Some(false));
        assert_eq!(&frame[..4], &ANNEX_B_START_CODE);
        assert_eq!(frame[4], 0x67);
    }

    #[test]
    fn test_conversion_error() {
        let mut frame = vec![0, 9, 0x65];
        let err = converter(2)
            .convert_and_analyze_frame(&mut frame, true, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, H264Error::NaluOutOfBounds { .. }));
    }
}
