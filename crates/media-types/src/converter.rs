use crate::subsample::SubsampleEntry;

/// Outcome of inspecting a converted frame.
///
/// `None` in either field means the analysis was not performed or was
/// inconclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    pub is_conformant: Option<bool>,
    pub is_keyframe: Option<bool>,
}

/// Rewrites length-prefixed frames from a container into a decoder-ready
/// bitstream, keeping the subsample map in sync with the rewritten bytes.
pub trait BitstreamConverter: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Converts `frame` in place. `subsamples` describes `frame` on entry and
    /// the converted frame on return; an empty list stays empty.
    fn convert_and_analyze_frame(
        &self,
        frame: &mut Vec<u8>,
        is_keyframe: bool,
        subsamples: &mut Vec<SubsampleEntry>,
    ) -> Result<AnalysisResult, Self::Error>;
}
