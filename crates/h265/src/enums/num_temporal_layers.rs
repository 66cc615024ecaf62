/// `numTemporalLayers` of an `hvcC` record.
///
/// `0` and `1` carry special meaning; larger values are a layer count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NumTemporalLayers {
    /// The stream might be temporally scalable.
    Unknown,
    /// The stream is not temporally scalable.
    NotScalable,
    /// The stream has this many temporal layers.
    Count(u8),
}

impl NumTemporalLayers {
    /// Returns `true` unless the record rules out temporal scalability.
    pub fn may_be_scalable(self) -> bool {
        self != NumTemporalLayers::NotScalable
    }
}

impl From<u8> for NumTemporalLayers {
    fn from(value: u8) -> Self {
        match value {
            0 => NumTemporalLayers::Unknown,
            1 => NumTemporalLayers::NotScalable,
            count => NumTemporalLayers::Count(count),
        }
    }
}

impl From<NumTemporalLayers> for u8 {
    fn from(value: NumTemporalLayers) -> Self {
        match value {
            NumTemporalLayers::Unknown => 0,
            NumTemporalLayers::NotScalable => 1,
            NumTemporalLayers::Count(count) => count,
        }
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8() {
        assert_eq!(NumTemporalLayers::from(0), NumTemporalLayers::Unknown);
        assert_eq!(NumTemporalLayers::from(1), NumTemporalLayers::NotScalable);
        assert_eq!(NumTemporalLayers::from(3), NumTemporalLayers::Count(3));
        assert_eq!(u8::from(NumTemporalLayers::Count(7)), 7);
        assert!(!NumTemporalLayers::NotScalable.may_be_scalable());
        assert!(NumTemporalLayers::Unknown.may_be_scalable());
    }
}
