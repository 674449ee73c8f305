// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

pub mod filters;

use std::cmp;
use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;

pub use filters::{FilterFlag, FilterSet};

/// Genotype of a single sample as allele indices (0 = reference).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct Genotype {
    pub alleles: Vec<u32>,
    #[serde(default)]
    pub phased: bool,
}

impl Genotype {
    pub fn is_het(&self) -> bool {
        self.alleles.len() == 2 && self.alleles[0] != self.alleles[1]
    }

    pub fn is_hom_alt(&self) -> bool {
        match self.alleles.first() {
            Some(&first) => first != 0 && self.alleles.iter().all(|&a| a == first),
            None => false,
        }
    }

    pub fn is_non_ref(&self) -> bool {
        self.alleles.iter().any(|&a| a != 0)
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.alleles.is_empty() {
            return write!(f, ".");
        }
        let sep = if self.phased { "|" } else { "/" };
        write!(f, "{}", self.alleles.iter().join(sep))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleCall {
    pub genotype: Genotype,
    #[serde(default)]
    pub gq: Option<u32>,
    #[serde(default)]
    pub depth: u32,
    /// Upstream evidence contradicts the ploidy assumed for this region.
    #[serde(default)]
    pub ploidy_conflict: bool,
    #[serde(default)]
    pub filters: FilterSet,
    #[serde(default)]
    pub phase_set: Option<i64>,
}

impl SampleCall {
    pub fn new(genotype: Genotype, gq: Option<u32>, depth: u32) -> Self {
        SampleCall {
            genotype,
            gq,
            depth,
            ..Default::default()
        }
    }
}

/// Genotyping mode a locus was called under.
///
/// Continuous loci carry an allele frequency estimate instead of a diploid
/// genotype likelihood and are classified with the default rules only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genotyping {
    Diploid,
    Continuous { allele_frequency: f64 },
}

impl Default for Genotyping {
    fn default() -> Self {
        Genotyping::Diploid
    }
}

/// Information shared by site and indel loci.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, CopyGetters, MutGetters, Setters)]
pub struct LocusInfo {
    #[getset(get_copy = "pub")]
    pos: i64,
    #[getset(get = "pub", get_mut = "pub")]
    samples: Vec<SampleCall>,
    #[serde(default)]
    #[getset(get = "pub", get_mut = "pub")]
    filters: FilterSet,
    #[serde(default)]
    #[getset(get_copy = "pub", set = "pub")]
    score: Option<f64>,
    #[serde(default)]
    #[getset(get = "pub", get_mut = "pub")]
    features: BTreeMap<String, f64>,
    #[serde(default)]
    #[getset(get_copy = "pub")]
    genotyping: Genotyping,
}

impl LocusInfo {
    pub fn new(pos: i64, samples: Vec<SampleCall>, genotyping: Genotyping) -> Self {
        LocusInfo {
            pos,
            samples,
            filters: FilterSet::default(),
            score: None,
            features: BTreeMap::new(),
            genotyping,
        }
    }

    pub fn with_feature(mut self, name: &str, value: f64) -> Self {
        self.features.insert(name.to_owned(), value);
        self
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self.genotyping, Genotyping::Continuous { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, new, Getters, MutGetters)]
pub struct SiteLocus {
    #[getset(get = "pub", get_mut = "pub")]
    info: LocusInfo,
    #[getset(get = "pub")]
    ref_allele: String,
    #[getset(get = "pub")]
    alt_alleles: Vec<String>,
}

impl SiteLocus {
    pub fn pos(&self) -> i64 {
        self.info.pos()
    }

    /// True if all alternative alleles are single base substitutions.
    pub fn is_snv(&self) -> bool {
        !self.alt_alleles.is_empty()
            && self
                .alt_alleles
                .iter()
                .all(|alt| alt.len() == 1 && alt.as_str() != "." && *alt != self.ref_allele)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndelKind {
    Insertion,
    Deletion,
    Swap,
    Breakend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct IndelAllele {
    pub kind: IndelKind,
    /// Number of reference bases replaced by this allele.
    #[serde(default)]
    pub ref_length: u32,
    #[serde(default)]
    pub insert_seq: String,
}

impl IndelAllele {
    pub fn is_breakend(&self) -> bool {
        self.kind == IndelKind::Breakend
    }
}

impl fmt::Display for IndelAllele {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            IndelKind::Insertion => write!(f, "INS:{}", self.insert_seq),
            IndelKind::Deletion => write!(f, "DEL:{}", self.ref_length),
            IndelKind::Swap => write!(f, "SWAP:{}:{}", self.ref_length, self.insert_seq),
            IndelKind::Breakend => write!(f, "BND"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, new, Getters, MutGetters)]
pub struct IndelLocus {
    #[getset(get = "pub", get_mut = "pub")]
    info: LocusInfo,
    #[getset(get = "pub", get_mut = "pub")]
    alleles: Vec<IndelAllele>,
}

impl IndelLocus {
    pub fn pos(&self) -> i64 {
        self.info.pos()
    }

    /// End of the reference span touched by any allele. Insertions occupy the
    /// position they are inserted before.
    pub fn end(&self) -> i64 {
        let span = self
            .alleles
            .iter()
            .map(|allele| allele.ref_length as i64)
            .max()
            .unwrap_or(0);
        self.pos() + cmp::max(span, 1)
    }

    pub fn has_breakend(&self) -> bool {
        self.alleles.iter().any(IndelAllele::is_breakend)
    }
}

/// A candidate variant locus flowing through the calling pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariantLocus {
    Site(SiteLocus),
    Indel(IndelLocus),
}

impl VariantLocus {
    pub fn pos(&self) -> i64 {
        self.info().pos()
    }

    /// End of the reference span of the locus (exclusive).
    pub fn end(&self) -> i64 {
        match self {
            VariantLocus::Site(site) => site.pos() + 1,
            VariantLocus::Indel(indel) => indel.end(),
        }
    }

    pub fn info(&self) -> &LocusInfo {
        match self {
            VariantLocus::Site(site) => site.info(),
            VariantLocus::Indel(indel) => indel.info(),
        }
    }

    pub fn info_mut(&mut self) -> &mut LocusInfo {
        match self {
            VariantLocus::Site(site) => site.info_mut(),
            VariantLocus::Indel(indel) => indel.info_mut(),
        }
    }

    pub fn is_indel(&self) -> bool {
        matches!(self, VariantLocus::Indel(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VariantLocus::Site(_) => "SITE",
            VariantLocus::Indel(_) => "INDEL",
        }
    }

    /// Reference and alternative allele columns as written by the sink.
    pub fn allele_columns(&self) -> (String, String) {
        match self {
            VariantLocus::Site(site) => {
                let alts = if site.alt_alleles().is_empty() {
                    ".".to_owned()
                } else {
                    site.alt_alleles().join(",")
                };
                (site.ref_allele().clone(), alts)
            }
            VariantLocus::Indel(indel) => (
                ".".to_owned(),
                indel.alleles().iter().map(|a| a.to_string()).join(","),
            ),
        }
    }
}

impl From<SiteLocus> for VariantLocus {
    fn from(site: SiteLocus) -> Self {
        VariantLocus::Site(site)
    }
}

impl From<IndelLocus> for VariantLocus {
    fn from(indel: IndelLocus) -> Self {
        VariantLocus::Indel(indel)
    }
}
