// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Filters that can be set on a locus or on a single sample of a locus.
#[derive(
    Display,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
pub enum FilterFlag {
    /// Sample evidence conflicts with the assumed ploidy of the region.
    PloidyConflict,
    /// Locus lies outside of the targeted regions.
    OffTarget,
    /// Calibrated score is below the model threshold.
    LowScore,
    #[strum(serialize = "LowGQ")]
    LowGQ,
    HighDepth,
    /// Overlapping indels that could not be genotyped jointly.
    IndelConflict,
    /// Site genotype contradicts an overlapping indel.
    SiteConflict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet {
    inner: BTreeSet<FilterFlag>,
}

impl FilterSet {
    pub fn set(&mut self, filter: FilterFlag) {
        self.inner.insert(filter);
    }

    pub fn is_set(&self, filter: FilterFlag) -> bool {
        self.inner.contains(&filter)
    }

    pub fn is_pass(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = FilterFlag> + '_ {
        self.inner.iter().cloned()
    }

    pub fn merge(&mut self, other: &FilterSet) {
        self.inner.extend(other.iter());
    }
}

impl fmt::Display for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_pass() {
            write!(f, "PASS")
        } else {
            write!(f, "{}", self.inner.iter().join(";"))
        }
    }
}
