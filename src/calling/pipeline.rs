// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs::File;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use derive_builder::Builder;

use crate::calling::overlapper::OverlapMergeStage;
use crate::calling::phaser::PhaserStage;
use crate::calling::prefilter::PrefilterStage;
use crate::calling::stage::VariantStage;
use crate::errors::{self, Error};
use crate::scoring::LocusClassifier;
use crate::utils::RegionTracker;
use crate::variants::{IndelLocus, SiteLocus, VariantLocus};

/// Default distance below which heterozygous SNVs are phased together (one codon).
pub const DEFAULT_PHASING_WINDOW: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder, CopyGetters)]
#[builder(pattern = "owned", default, build_fn(validate = "Self::validate"))]
#[serde(default)]
#[getset(get_copy = "pub")]
pub struct PipelineOptions {
    /// Resolve overlapping indels and phase nearby heterozygous SNVs.
    phasing: bool,
    phasing_window: i64,
    log_each_record: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            phasing: false,
            phasing_window: DEFAULT_PHASING_WINDOW,
            log_each_record: false,
        }
    }
}

impl PipelineOptionsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        match self.phasing_window {
            Some(window) if window < 1 => Err(format!(
                "phasing window has to be at least 1, found {}",
                window
            )),
            _ => Ok(()),
        }
    }
}

impl PipelineOptions {
    /// Read options from a YAML file. Missing keys take their default value.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = File::open(path)
            .with_context(|| format!("Unable to open config file {}.", path.display()))?;
        let options: PipelineOptions = serde_yaml::from_reader(reader)
            .with_context(|| format!("Unable to parse config file {}.", path.display()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.phasing_window < 1 {
            return Err(Error::InvalidPipelineOptions {
                msg: format!(
                    "phasing window has to be at least 1, found {}",
                    self.phasing_window
                ),
            }
            .into());
        }
        Ok(())
    }

    pub fn set_phasing(&mut self, phasing: bool) {
        self.phasing = phasing;
    }

    pub fn set_phasing_window(&mut self, phasing_window: i64) {
        self.phasing_window = phasing_window;
    }

    pub fn set_log_each_record(&mut self, log_each_record: bool) {
        self.log_each_record = log_each_record;
    }
}

/// Owner of the stage chain.
///
/// Loci have to be passed in non-decreasing position order. `flush` has to
/// be called once at the end of the input.
pub struct VariantPipeline {
    head: PrefilterStage,
    options: PipelineOptions,
    last_pos: Option<i64>,
    processed: usize,
}

impl VariantPipeline {
    pub fn builder() -> VariantPipelineBuilder {
        VariantPipelineBuilder::default()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Number of loci passed to the pipeline so far.
    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn process(&mut self, locus: VariantLocus) -> Result<()> {
        let pos = locus.pos();
        if let Some(previous) = self.last_pos {
            if pos < previous {
                return Err(Error::UnsortedInput {
                    previous,
                    current: pos,
                }
                .into());
            }
        }
        self.last_pos = Some(pos);
        if self.options.log_each_record {
            info!("Processing {} locus at {}.", locus.kind(), pos);
        }
        self.processed += 1;
        self.head.process(locus)
    }

    pub fn process_site(&mut self, site: SiteLocus) -> Result<()> {
        self.process(site.into())
    }

    pub fn process_indel(&mut self, indel: IndelLocus) -> Result<()> {
        self.process(indel.into())
    }

    /// Drain all buffered loci into the sink.
    pub fn flush(&mut self) -> Result<()> {
        debug!("Flushing pipeline after {} loci.", self.processed);
        self.head.flush()
    }

    /// Flush and forget the last position. Targeted regions are evicted
    /// while loci pass, so use `reset_with_targets` when continuing with
    /// another contig in targeted mode.
    pub fn reset(&mut self) -> Result<()> {
        self.flush()?;
        self.last_pos = None;
        Ok(())
    }

    /// Reset and install the targeted regions of the next contig. `None`
    /// switches targeted mode off.
    pub fn reset_with_targets(&mut self, regions: Option<RegionTracker>) -> Result<()> {
        self.reset()?;
        self.head.set_targeted_regions(regions);
        Ok(())
    }
}

#[derive(Default)]
pub struct VariantPipelineBuilder {
    classifier: Option<Rc<dyn LocusClassifier>>,
    targeted_regions: Option<RegionTracker>,
    sink: Option<Box<dyn VariantStage>>,
    options: PipelineOptions,
}

impl VariantPipelineBuilder {
    pub fn classifier(mut self, classifier: Rc<dyn LocusClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Enable targeted mode: loci outside of the given regions are marked
    /// off-target.
    pub fn targeted_regions(mut self, regions: RegionTracker) -> Self {
        self.targeted_regions = Some(regions);
        self
    }

    pub fn sink(mut self, sink: Box<dyn VariantStage>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Wire the stages from the sink backwards. Disabled stages are skipped.
    pub fn build(self) -> Result<VariantPipeline> {
        self.options.validate()?;
        let phasing = self.options.phasing;

        let mut downstream = self
            .sink
            .ok_or_else(|| errors::stage_wiring(if phasing { "phaser" } else { "prefilter" }))?;
        let classifier = self
            .classifier
            .ok_or_else(|| errors::stage_wiring("prefilter"))?;

        let mut stages = vec!["sink"];
        if phasing {
            downstream = Box::new(PhaserStage::new(
                self.options.phasing_window,
                downstream,
            ));
            downstream = Box::new(OverlapMergeStage::new(Rc::clone(&classifier), downstream));
            stages.push("phaser");
            stages.push("overlap merge");
        }
        let head = PrefilterStage::new(classifier, self.targeted_regions, downstream);
        stages.push("prefilter");
        stages.reverse();
        debug!("Pipeline stages: {}.", stages.join(" -> "));

        Ok(VariantPipeline {
            head,
            options: self.options,
            last_pos: None,
            processed: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calling::testing::{deletion, snv, Recorder};
    use crate::scoring::ScoringModels;
    use crate::utils::Interval;
    use crate::variants::FilterFlag;

    fn classifier() -> Rc<dyn LocusClassifier> {
        Rc::new(ScoringModels::default())
    }

    #[test]
    fn test_missing_sink() {
        let err = VariantPipeline::builder()
            .classifier(classifier())
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::StageWiring {
                stage: "prefilter".to_owned()
            })
        );
        let err = VariantPipeline::builder()
            .sink(Recorder::default().boxed())
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::StageWiring { .. })
        ));
    }

    #[test]
    fn test_options() {
        let options = PipelineOptionsBuilder::default()
            .phasing(true)
            .build()
            .unwrap();
        assert!(options.phasing());
        assert_eq!(options.phasing_window(), DEFAULT_PHASING_WINDOW);
        assert!(PipelineOptionsBuilder::default()
            .phasing_window(0)
            .build()
            .is_err());

        let options: PipelineOptions = serde_yaml::from_str("phasing_window: 5").unwrap();
        assert_eq!(options.phasing_window(), 5);
        assert!(!options.phasing());
    }

    #[test]
    fn test_unsorted_and_reset() {
        let sink = Recorder::default();
        let mut pipeline = VariantPipeline::builder()
            .classifier(classifier())
            .sink(sink.boxed())
            .build()
            .unwrap();
        pipeline.process(snv(10, &[&[0, 1]])).unwrap();
        let err = pipeline.process(snv(5, &[&[0, 1]])).err().unwrap();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::UnsortedInput {
                previous: 10,
                current: 5
            })
        );
        pipeline.reset().unwrap();
        pipeline.process(snv(5, &[&[0, 1]])).unwrap();
        pipeline.flush().unwrap();
        assert_eq!(sink.positions(), vec![10, 5]);
        assert_eq!(sink.flushes.get(), 2);
        assert_eq!(pipeline.processed(), 2);
    }

    #[test]
    fn test_reset_with_targets() {
        let targets = |begin, end| {
            let mut regions = RegionTracker::new();
            regions.add_region(Interval::new(begin, end), ());
            regions
        };
        let sink = Recorder::default();
        let mut pipeline = VariantPipeline::builder()
            .classifier(classifier())
            .sink(sink.boxed())
            .targeted_regions(targets(100, 200))
            .build()
            .unwrap();
        pipeline.process(snv(150, &[&[0, 1]])).unwrap();
        pipeline.reset_with_targets(Some(targets(0, 50))).unwrap();
        pipeline.process(snv(20, &[&[0, 1]])).unwrap();
        pipeline.process(snv(60, &[&[0, 1]])).unwrap();
        pipeline.flush().unwrap();

        let off_target = sink
            .loci
            .borrow()
            .iter()
            .map(|locus| locus.info().filters().is_set(FilterFlag::OffTarget))
            .collect::<Vec<_>>();
        assert_eq!(off_target, vec![false, false, true]);
        assert_eq!(sink.flushes.get(), 2);
    }

    #[test]
    fn test_phasing_chain() {
        let sink = Recorder::default();
        let mut pipeline = VariantPipeline::builder()
            .classifier(classifier())
            .sink(sink.boxed())
            .options(
                PipelineOptionsBuilder::default()
                    .phasing(true)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        pipeline.process(snv(10, &[&[0, 1]])).unwrap();
        pipeline.process(deletion(11, 4, &[&[0, 1]])).unwrap();
        pipeline.process(snv(12, &[&[0, 1]])).unwrap();
        assert_eq!(sink.len(), 0);
        pipeline.flush().unwrap();
        pipeline.flush().unwrap();
        assert_eq!(sink.positions(), vec![10, 11, 12]);
        assert_eq!(sink.flushes.get(), 1);
        let loci = sink.loci.borrow();
        assert_eq!(loci[2].info().samples()[0].phase_set, Some(10));
    }
}
