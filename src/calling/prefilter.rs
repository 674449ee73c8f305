// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::rc::Rc;

use anyhow::Result;
use strum_macros::{Display, IntoStaticStr};

use crate::calling::stage::{FlushState, VariantStage};
use crate::scoring::LocusClassifier;
use crate::utils::{RegionTracker, SimpleCounter};
use crate::variants::{FilterFlag, LocusInfo, VariantLocus};

/// Interval at which dropped loci are reported.
const DROP_LOG_INTERVAL: usize = 100;

#[derive(Display, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    #[strum(serialize = "indel with breakend allele")]
    Breakend,
}

/// First stage of the pipeline.
///
/// Applies the filters shared by all loci, asks the classifier for a score and
/// forwards the locus. Indels with breakend alleles are not supported and are
/// dropped.
#[derive(new)]
pub struct PrefilterStage {
    classifier: Rc<dyn LocusClassifier>,
    targeted_regions: Option<RegionTracker>,
    downstream: Box<dyn VariantStage>,
    #[new(default)]
    drops: SimpleCounter<DropReason>,
    #[new(default)]
    flush_state: FlushState,
}

impl PrefilterStage {
    pub fn drops(&self) -> &SimpleCounter<DropReason> {
        &self.drops
    }

    /// Replace the targeted regions, e.g. with those of the next contig.
    /// Regions are evicted while loci pass, so they cannot be reused.
    pub fn set_targeted_regions(&mut self, regions: Option<RegionTracker>) {
        self.targeted_regions = regions;
    }

    fn drop_locus(&mut self, pos: i64, reason: DropReason) {
        debug!("Dropping locus at {}: {}.", pos, reason);
        self.drops.incr(reason);
        if self.drops.total_count() % DROP_LOG_INTERVAL == 0 {
            info!("Dropped {} unsupported loci so far.", self.drops.total_count());
        }
    }

    fn apply_shared_filters(&mut self, info: &mut LocusInfo) {
        for sample in info.samples_mut() {
            if sample.ploidy_conflict {
                sample.filters.set(FilterFlag::PloidyConflict);
            }
        }

        if let Some(regions) = self.targeted_regions.as_mut() {
            let pos = info.pos();
            if regions.is_in_region(pos).is_none() {
                info.filters_mut().set(FilterFlag::OffTarget);
            }
            // input is sorted, regions before this locus are no longer needed
            regions.remove_to_pos(pos - 1);
        }
    }
}

impl VariantStage for PrefilterStage {
    fn process(&mut self, mut locus: VariantLocus) -> Result<()> {
        self.flush_state.mark_active();

        if let VariantLocus::Indel(indel) = &locus {
            if indel.has_breakend() {
                self.drop_locus(indel.pos(), DropReason::Breakend);
                return Ok(());
            }
        }

        self.apply_shared_filters(locus.info_mut());

        match &mut locus {
            VariantLocus::Site(site) => {
                if site.info().is_continuous() {
                    self.classifier.default_classify_site(site);
                } else {
                    self.classifier.classify_site(site);
                }
            }
            VariantLocus::Indel(indel) => {
                if indel.info().is_continuous() {
                    self.classifier.default_classify_indel(indel);
                } else {
                    self.classifier.classify_indel(indel);
                }
            }
        }

        self.downstream.process(locus)
    }

    fn flush(&mut self) -> Result<()> {
        if !self.flush_state.begin_flush() {
            return Ok(());
        }
        if self.drops.total_count() > 0 {
            for (reason, count) in self.drops.iter() {
                info!("Dropped {} loci: {}.", count, reason);
            }
        }
        self.downstream.flush()
    }
}
