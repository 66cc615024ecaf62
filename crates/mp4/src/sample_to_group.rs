use crate::boxes::{SampleToGroup, SampleToGroupEntry};

/// Walks a sample-to-group table one sample at a time.
///
/// Entries with a sample count of 0 are skipped, so the iterator is only
/// valid while it points at a sample.
#[derive(Debug, Clone)]
pub struct SampleToGroupIterator<'a> {
    entries: &'a [SampleToGroupEntry],
    index: usize,
    remaining_samples: u32,
}

impl<'a> SampleToGroupIterator<'a> {
    pub fn new(sample_to_group: &'a SampleToGroup) -> Self {
        Self::from_entries(&sample_to_group.entries)
    }

    pub fn from_entries(entries: &'a [SampleToGroupEntry]) -> Self {
        let mut iter = Self {
            entries,
            index: 0,
            remaining_samples: 0,
        };
        iter.skip_empty_entries();
        iter
    }

    fn skip_empty_entries(&mut self) {
        while let Some(entry) = self.entries.get(self.index) {
            self.remaining_samples = entry.sample_count;
            if self.remaining_samples > 0 {
                return;
            }
            self.index += 1;
        }
    }

    pub fn is_valid(&self) -> bool {
        self.remaining_samples > 0
    }

    /// Group description index of the current sample.
    pub fn group_description_index(&self) -> Option<u32> {
        if !self.is_valid() {
            return None;
        }
        self.entries
            .get(self.index)
            .map(|entry| entry.group_description_index)
    }

    /// Moves to the next sample and returns whether there is one.
    pub fn advance(&mut self) -> bool {
        if !self.is_valid() {
            return false;
        }
        self.remaining_samples -= 1;
        if self.remaining_samples == 0 {
            self.index += 1;
            self.skip_empty_entries();
        }
        self.is_valid()
    }
}

impl Iterator for SampleToGroupIterator<'_> {
    type Item = u32;

    /// Yields the group description index of each sample in turn.
    fn next(&mut self) -> Option<u32> {
        let index = self.group_description_index()?;
        self.advance();
        Some(index)
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    fn entry(sample_count: u32, group_description_index: u32) -> SampleToGroupEntry {
        SampleToGroupEntry {
            sample_count,
            group_description_index,
        }
    }

    #[test]
    fn test_empty_table() {
        let iter = SampleToGroupIterator::from_entries(&[]);
        assert!(!iter.is_valid());
        assert_eq!(iter.group_description_index(), None);
    }

    #[test]
    fn test_leading_zero_count_entry() {
        let entries = [entry(0, 5), entry(3, 1)];
        let mut iter = SampleToGroupIterator::from_entries(&entries);
        for _ in 0..2 {
            assert!(iter.is_valid());
            assert_eq!(iter.group_description_index(), Some(1));
            assert!(iter.advance());
        }
        assert_eq!(iter.group_description_index(), Some(1));
        assert!(!iter.advance());
        assert!(!iter.is_valid());
    }

    #[test]
    fn test_zero_count_entries_between() {
        let entries = [entry(1, 1), entry(0, 9), entry(0, 8), entry(2, 0x10002)];
        let iter = SampleToGroupIterator::from_entries(&entries);
        assert_eq!(iter.collect::<Vec<_>>(), vec![1, 0x10002, 0x10002]);
    }

    #[test]
    fn test_all_zero_counts() {
        let entries = [entry(0, 1), entry(0, 2)];
        assert!(!SampleToGroupIterator::from_entries(&entries).is_valid());
    }
}
