// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Resolution of overlapping indels.
//!
//! Indels and all loci starting inside the span of a buffered indel are held
//! back until a locus beyond the union of buffered indel spans arrives. The
//! cluster is then resolved and emitted in position order.

use std::cmp;
use std::rc::Rc;

use anyhow::Result;
use itertools::Itertools;

use crate::calling::stage::{FlushState, VariantStage};
use crate::scoring::LocusClassifier;
use crate::utils::{EmptyClear, SlidingPositionMap};
use crate::variants::{FilterFlag, Genotype, IndelLocus, SampleCall, VariantLocus};

pub struct OverlapMergeStage {
    classifier: Rc<dyn LocusClassifier>,
    buffer: SlidingPositionMap<i64, Vec<VariantLocus>, EmptyClear>,
    // end of the union of buffered indel spans
    buffered_end: Option<i64>,
    downstream: Box<dyn VariantStage>,
    flush_state: FlushState,
}

impl OverlapMergeStage {
    pub fn new(classifier: Rc<dyn LocusClassifier>, downstream: Box<dyn VariantStage>) -> Self {
        OverlapMergeStage {
            classifier,
            buffer: SlidingPositionMap::new(),
            buffered_end: None,
            downstream,
            flush_state: FlushState::default(),
        }
    }

    /// Number of loci currently held back.
    pub fn buffered(&self) -> usize {
        self.buffer
            .keys()
            .map(|pos| self.buffer.get_or_default(pos, &Vec::new()).len())
            .sum()
    }

    fn close_cluster(&mut self) -> Result<()> {
        let positions = self.buffer.keys().collect_vec();
        let mut cluster = Vec::new();
        for pos in positions {
            cluster.append(self.buffer.get_mut(pos)?);
            self.buffer.erase(pos)?;
        }
        self.buffered_end = None;

        for locus in self.resolve(cluster) {
            self.downstream.process(locus)?;
        }
        Ok(())
    }

    fn resolve(&self, mut cluster: Vec<VariantLocus>) -> Vec<VariantLocus> {
        let indels = cluster
            .iter()
            .enumerate()
            .filter(|(_, locus)| locus.is_indel())
            .map(|(i, _)| i)
            .collect_vec();

        mark_site_conflicts(&mut cluster);

        if indels.len() == 2 {
            if let Some(merged) = self.merge_pair(&cluster[indels[0]], &cluster[indels[1]]) {
                debug!(
                    "Merging overlapping indels at {} and {}.",
                    cluster[indels[0]].pos(),
                    cluster[indels[1]].pos()
                );
                cluster[indels[0]] = merged.into();
                cluster.remove(indels[1]);
                return cluster;
            }
        }
        if indels.len() > 1 {
            for &i in &indels {
                cluster[i].info_mut().filters_mut().set(FilterFlag::IndelConflict);
            }
        }
        cluster
    }

    /// Merge two single-allele indels that are heterozygous in every sample
    /// into one locus with genotype 1/2.
    fn merge_pair(&self, first: &VariantLocus, second: &VariantLocus) -> Option<IndelLocus> {
        let (first, second) = match (first, second) {
            (VariantLocus::Indel(first), VariantLocus::Indel(second)) => (first, second),
            _ => return None,
        };
        if first.alleles().len() != 1
            || second.alleles().len() != 1
            || first.info().sample_count() != second.info().sample_count()
            || first.info().samples().is_empty()
        {
            return None;
        }
        let all_het = first
            .info()
            .samples()
            .iter()
            .chain(second.info().samples())
            .all(|sample| sample.genotype.is_het());
        if !all_het {
            return None;
        }

        let mut merged = first.clone();
        merged.alleles_mut().push(second.alleles()[0].clone());
        let samples = first
            .info()
            .samples()
            .iter()
            .zip(second.info().samples())
            .map(|(a, b)| merge_sample_calls(a, b))
            .collect_vec();
        *merged.info_mut().samples_mut() = samples;
        merged.info_mut().filters_mut().merge(second.info().filters());
        merged.info_mut().set_score(None);

        if merged.info().is_continuous() {
            self.classifier.default_classify_indel(&mut merged);
        } else {
            self.classifier.classify_indel(&mut merged);
        }
        Some(merged)
    }
}

fn merge_sample_calls(a: &SampleCall, b: &SampleCall) -> SampleCall {
    let gq = match (a.gq, b.gq) {
        (Some(a), Some(b)) => Some(cmp::min(a, b)),
        (a, b) => a.or(b),
    };
    let mut merged = SampleCall::new(
        Genotype::new(vec![1, 2], false),
        gq,
        cmp::max(a.depth, b.depth),
    );
    merged.ploidy_conflict = a.ploidy_conflict || b.ploidy_conflict;
    merged.filters.merge(&a.filters);
    merged.filters.merge(&b.filters);
    merged
}

/// Flag samples of sites that carry a non-reference call inside an indel that
/// is homozygous alternative in the same sample.
fn mark_site_conflicts(cluster: &mut [VariantLocus]) {
    let hom_indels = cluster
        .iter()
        .filter_map(|locus| match locus {
            VariantLocus::Indel(indel) => Some((
                indel.pos(),
                indel.end(),
                indel
                    .info()
                    .samples()
                    .iter()
                    .map(|sample| sample.genotype.is_hom_alt())
                    .collect_vec(),
            )),
            VariantLocus::Site(_) => None,
        })
        .collect_vec();

    for locus in cluster.iter_mut() {
        if let VariantLocus::Site(site) = locus {
            let pos = site.pos();
            for (begin, end, hom_alt) in &hom_indels {
                if pos < *begin || pos >= *end {
                    continue;
                }
                for (sample, &hom) in site.info_mut().samples_mut().iter_mut().zip(hom_alt) {
                    if hom && sample.genotype.is_non_ref() {
                        sample.filters.set(FilterFlag::SiteConflict);
                    }
                }
            }
        }
    }
}

impl VariantStage for OverlapMergeStage {
    fn process(&mut self, locus: VariantLocus) -> Result<()> {
        self.flush_state.mark_active();

        if let Some(end) = self.buffered_end {
            if locus.pos() >= end {
                self.close_cluster()?;
            }
        }

        match self.buffered_end {
            None if !locus.is_indel() => self.downstream.process(locus),
            buffered_end => {
                if locus.is_indel() {
                    self.buffered_end =
                        Some(buffered_end.map_or(locus.end(), |end| cmp::max(end, locus.end())));
                }
                self.buffer.get_or_create(locus.pos()).push(locus);
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        if !self.flush_state.begin_flush() {
            return Ok(());
        }
        self.close_cluster()?;
        self.downstream.flush()
    }
}
