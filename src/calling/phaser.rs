// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::Result;

use crate::calling::stage::{FlushState, VariantStage};
use crate::variants::VariantLocus;

/// Phasing of nearby heterozygous SNVs.
///
/// Heterozygous diploid SNVs closer than `window` to the previous one form a
/// block. Blocks of at least two such sites get a phase set (the block start)
/// and phased genotypes. Every locus seen while a block is open is held back
/// and emitted in order once the block is closed.
pub struct PhaserStage {
    window: i64,
    block: Vec<VariantLocus>,
    block_start: i64,
    last_het: Option<i64>,
    het_sites: usize,
    downstream: Box<dyn VariantStage>,
    flush_state: FlushState,
}

impl PhaserStage {
    pub fn new(window: i64, downstream: Box<dyn VariantStage>) -> Self {
        PhaserStage {
            window,
            block: Vec::new(),
            block_start: 0,
            last_het: None,
            het_sites: 0,
            downstream,
            flush_state: FlushState::default(),
        }
    }

    pub fn buffered(&self) -> usize {
        self.block.len()
    }

    fn close_block(&mut self) -> Result<()> {
        if self.het_sites > 1 {
            debug!(
                "Phasing block of {} heterozygous sites starting at {}.",
                self.het_sites, self.block_start
            );
            let phase_set = self.block_start;
            for locus in self.block.iter_mut().filter(|locus| is_het_snv(locus)) {
                for sample in locus.info_mut().samples_mut() {
                    if sample.genotype.is_het() {
                        sample.genotype.phased = true;
                        sample.phase_set = Some(phase_set);
                    }
                }
            }
        }
        self.last_het = None;
        self.het_sites = 0;
        for locus in self.block.drain(..) {
            self.downstream.process(locus)?;
        }
        Ok(())
    }
}

fn is_het_snv(locus: &VariantLocus) -> bool {
    match locus {
        VariantLocus::Site(site) => {
            !site.info().is_continuous()
                && site.is_snv()
                && site
                    .info()
                    .samples()
                    .iter()
                    .any(|sample| sample.genotype.is_het())
        }
        VariantLocus::Indel(_) => false,
    }
}

impl VariantStage for PhaserStage {
    fn process(&mut self, locus: VariantLocus) -> Result<()> {
        self.flush_state.mark_active();
        let het = is_het_snv(&locus);

        if let Some(last) = self.last_het {
            if locus.pos() - last >= self.window {
                self.close_block()?;
            }
        }

        match (self.last_het, het) {
            (None, false) => self.downstream.process(locus),
            (None, true) => {
                self.block_start = locus.pos();
                self.last_het = Some(locus.pos());
                self.het_sites = 1;
                self.block.push(locus);
                Ok(())
            }
            (Some(_), het) => {
                if het {
                    self.last_het = Some(locus.pos());
                    self.het_sites += 1;
                }
                self.block.push(locus);
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        if !self.flush_state.begin_flush() {
            return Ok(());
        }
        self.close_block()?;
        self.downstream.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calling::testing::{deletion, snv, Recorder};

    fn stage() -> (PhaserStage, Recorder) {
        let sink = Recorder::default();
        (PhaserStage::new(3, sink.boxed()), sink)
    }

    #[test]
    fn test_phase_block() {
        let (mut stage, sink) = stage();
        stage.process(snv(10, &[&[0, 1], &[0, 0]])).unwrap();
        stage.process(deletion(11, 1, &[&[0, 1], &[0, 1]])).unwrap();
        stage.process(snv(12, &[&[1, 0], &[1, 1]])).unwrap();
        assert_eq!(stage.buffered(), 3);
        stage.process(snv(20, &[&[0, 1], &[0, 1]])).unwrap();
        assert_eq!(sink.positions(), vec![10, 11, 12]);
        stage.flush().unwrap();
        assert_eq!(sink.positions(), vec![10, 11, 12, 20]);

        let loci = sink.loci.borrow();
        let first = loci[0].info().samples();
        assert!(first[0].genotype.phased);
        assert_eq!(first[0].phase_set, Some(10));
        assert_eq!(first[1].phase_set, None);
        assert_eq!(loci[0].info().samples()[0].genotype.to_string(), "0|1");
        assert_eq!(loci[2].info().samples()[0].phase_set, Some(10));
        assert_eq!(loci[2].info().samples()[1].phase_set, None);
        // indels are passed along untouched
        assert_eq!(loci[1].info().samples()[0].phase_set, None);
        // single heterozygous site is not phased
        assert_eq!(loci[3].info().samples()[0].phase_set, None);
        assert!(!loci[3].info().samples()[0].genotype.phased);
    }

    #[test]
    fn test_non_het_forwarded() {
        let (mut stage, sink) = stage();
        stage.process(snv(1, &[&[1, 1]])).unwrap();
        stage.process(snv(2, &[&[0, 0]])).unwrap();
        assert_eq!(sink.positions(), vec![1, 2]);
        assert_eq!(stage.buffered(), 0);
        stage.flush().unwrap();
        stage.flush().unwrap();
        assert_eq!(sink.flushes.get(), 1);
    }
}
