/// One clear/encrypted pair of a subsample encryption map.
///
/// A sample described by a list of entries is laid out as
/// `clear_bytes` of plaintext followed by `cypher_bytes` of ciphertext,
/// repeated for each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SubsampleEntry {
    pub clear_bytes: u32,
    pub cypher_bytes: u32,
}

impl SubsampleEntry {
    pub const fn new(clear_bytes: u32, cypher_bytes: u32) -> Self {
        Self {
            clear_bytes,
            cypher_bytes,
        }
    }

    /// Clear plus encrypted size of this entry.
    pub fn size(&self) -> u64 {
        u64::from(self.clear_bytes) + u64::from(self.cypher_bytes)
    }
}

/// Sum of all clear and encrypted bytes, or `None` on overflow of `usize`.
pub fn total_subsample_size(subsamples: &[SubsampleEntry]) -> Option<usize> {
    subsamples.iter().try_fold(0usize, |acc, s| {
        acc.checked_add(s.clear_bytes as usize)?
            .checked_add(s.cypher_bytes as usize)
    })
}

/// Returns `true` when the subsamples describe exactly `input_size` bytes.
pub fn verify_subsamples_match_size(subsamples: &[SubsampleEntry], input_size: usize) -> bool {
    total_subsample_size(subsamples) == Some(input_size)
}

/// Ordered, non-overlapping list of encrypted `[start, end)` byte ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptedRanges {
    ranges: Vec<(usize, usize)>,
}

impl EncryptedRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the ranges covered by the encrypted part of each subsample,
    /// relative to the start of the sample.
    pub fn from_subsamples(subsamples: &[SubsampleEntry]) -> Self {
        let mut ranges = Self::new();
        let mut offset = 0usize;
        for subsample in subsamples {
            offset = offset.saturating_add(subsample.clear_bytes as usize);
            let end = offset.saturating_add(subsample.cypher_bytes as usize);
            ranges.add(offset, end);
            offset = end;
        }
        ranges
    }

    /// Appends `[start, end)`. Empty ranges are ignored; a range touching the
    /// previous one is merged into it.
    pub fn add(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        if let Some(last) = self.ranges.last_mut()
            && last.1 >= start
        {
            last.1 = last.1.max(end);
            return;
        }
        self.ranges.push((start, end));
    }

    /// Returns `true` if `[start, end)` overlaps any encrypted range.
    pub fn intersects(&self, start: usize, end: usize) -> bool {
        if start >= end {
            return false;
        }
        self.ranges.iter().any(|&(s, e)| start < e && s < end)
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.ranges.iter().copied()
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_total_size() {
        let subsamples = [SubsampleEntry::new(10, 20), SubsampleEntry::new(5, 0)];
        assert_eq!(total_subsample_size(&subsamples), Some(35));
        assert!(verify_subsamples_match_size(&subsamples, 35));
        assert!(!verify_subsamples_match_size(&subsamples, 34));
        assert!(verify_subsamples_match_size(&[], 0));
    }

    #[test]
    fn test_ranges_from_subsamples() {
        let subsamples = [
            SubsampleEntry::new(4, 10),
            SubsampleEntry::new(0, 6),
            SubsampleEntry::new(3, 0),
            SubsampleEntry::new(2, 8),
        ];
        let ranges = EncryptedRanges::from_subsamples(&subsamples);
        assert_eq!(ranges.iter().collect::<Vec<_>>(), vec![(4, 20), (25, 33)]);
        assert!(ranges.intersects(0, 5));
        assert!(!ranges.intersects(0, 4));
        assert!(!ranges.intersects(20, 25));
        assert!(ranges.intersects(24, 26));
        assert!(!ranges.intersects(33, 40));
    }

    #[test]
    fn test_empty_range_never_intersects() {
        let mut ranges = EncryptedRanges::new();
        ranges.add(5, 5);
        assert!(ranges.is_empty());
        ranges.add(0, 10);
        assert!(!ranges.intersects(3, 3));
    }
}
