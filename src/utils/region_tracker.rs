// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Tracking of labeled, non-overlapping genomic regions under a
//! monotonically advancing position.

use std::cmp;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound::{Excluded, Unbounded};

/// Half-open genomic interval `[begin, end)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, new, CopyGetters, Serialize, Deserialize,
)]
#[getset(get_copy = "pub")]
pub struct Interval {
    begin: i64,
    end: i64,
}

impl Interval {
    pub fn len(&self) -> i64 {
        cmp::max(self.end - self.begin, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    /// True if this interval shares at least one position with `[begin, end)`.
    pub fn intersects(&self, begin: i64, end: i64) -> bool {
        self.begin < end && begin < self.end
    }

    /// True if `[begin, end)` lies completely inside this interval.
    pub fn contains_range(&self, begin: i64, end: i64) -> bool {
        self.begin <= begin && end <= self.end
    }

    fn touches(&self, other: &Interval) -> bool {
        self.end == other.begin || other.end == self.begin
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{},{})", self.begin, self.end)
    }
}

/// Set of non-overlapping intervals, each carrying a payload.
///
/// Intervals are kept sorted by begin position. Adjacent or overlapping
/// intervals with equal payloads are merged eagerly on insertion, so the
/// tracker never holds two touching intervals with the same payload.
#[derive(Debug, Clone)]
pub struct IntervalTracker<T> {
    // begin -> (end, payload)
    regions: BTreeMap<i64, (i64, T)>,
}

/// Tracker for plain regions without a label, e.g. targeted regions.
pub type RegionTracker = IntervalTracker<()>;

impl<T> Default for IntervalTracker<T> {
    fn default() -> Self {
        IntervalTracker {
            regions: BTreeMap::new(),
        }
    }
}

impl<T> IntervalTracker<T>
where
    T: PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    /// Iterate over stored intervals in position order.
    pub fn iter(&self) -> impl Iterator<Item = (Interval, &T)> + '_ {
        self.regions
            .iter()
            .map(|(&begin, (end, payload))| (Interval::new(begin, *end), payload))
    }

    /// Payload of the stored interval intersecting `[begin, end)`, if any.
    ///
    /// Since stored intervals do not overlap, the only candidates are the
    /// last interval starting at or before `begin` and the first one starting
    /// after it.
    pub fn is_intersect_region(&self, begin: i64, end: i64) -> Option<&T> {
        if let Some((&b, (e, payload))) = self.regions.range(..=begin).next_back() {
            if Interval::new(b, *e).intersects(begin, end) {
                return Some(payload);
            }
        }
        self.regions
            .range((Excluded(begin), Unbounded))
            .next()
            .filter(|(b, (e, _))| Interval::new(**b, *e).intersects(begin, end))
            .map(|(_, (_, payload))| payload)
    }

    /// Payload of the stored interval that fully contains `[begin, end)`, if any.
    pub fn is_subset_of_region(&self, begin: i64, end: i64) -> Option<&T> {
        let (&b, (e, payload)) = self.regions.range(..=begin).next_back()?;
        if *e > begin && Interval::new(b, *e).contains_range(begin, end) {
            Some(payload)
        } else {
            None
        }
    }

    /// Payload of the stored interval covering `pos`, if any.
    pub fn is_in_region(&self, pos: i64) -> Option<&T> {
        self.is_intersect_region(pos, pos + 1)
    }

    /// Add a labeled interval, merging it with every stored interval it
    /// overlaps and with touching intervals of equal payload.
    ///
    /// Returns false without modifying the tracker if the range overlaps a
    /// stored interval with a different payload, or if the range is empty.
    /// Touching intervals with a different payload are left as unmerged
    /// neighbors.
    pub fn add_region(&mut self, range: Interval, payload: T) -> bool {
        if range.is_empty() {
            return false;
        }

        let mut merged = range;
        let mut absorbed = Vec::new();
        {
            let predecessor = self.regions.range(..range.begin()).next_back();
            let candidates = predecessor
                .into_iter()
                .chain(self.regions.range(range.begin()..=range.end()));
            for (&begin, (end, existing_payload)) in candidates {
                let existing = Interval::new(begin, *end);
                let touching = existing.touches(&range);
                let overlapping = existing.intersects(range.begin(), range.end());
                if !touching && !overlapping {
                    continue;
                }
                if *existing_payload != payload {
                    if overlapping {
                        return false;
                    }
                    continue;
                }
                merged = Interval::new(
                    cmp::min(merged.begin(), existing.begin()),
                    cmp::max(merged.end(), existing.end()),
                );
                absorbed.push(begin);
            }
        }

        for begin in absorbed {
            self.regions.remove(&begin);
        }
        self.regions.insert(merged.begin(), (merged.end(), payload));
        true
    }

    /// Forget everything at or before `pos`.
    ///
    /// Intervals ending at or before `pos + 1` are discarded. An interval
    /// reaching beyond `pos` but starting at or before it is clipped to begin
    /// at `pos + 1`. Cost is proportional to the number of evicted intervals.
    pub fn remove_to_pos(&mut self, pos: i64) {
        while let Some((_, (end, _))) = self.regions.first_key_value() {
            if *end > pos + 1 {
                break;
            }
            self.regions.pop_first();
        }
        if let Some((&begin, _)) = self.regions.first_key_value() {
            if begin <= pos {
                if let Some(value) = self.regions.remove(&begin) {
                    self.regions.insert(pos + 1, value);
                }
            }
        }
    }
}

impl<T> fmt::Display for IntervalTracker<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "RegionTracker")?;
        for (&begin, (end, payload)) in &self.regions {
            writeln!(
                f,
                "region: {} value: {:?}",
                Interval::new(begin, *end),
                payload
            )?;
        }
        Ok(())
    }
}
