use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::Result;

use varstream::variants::{
    Genotype, Genotyping, IndelAllele, IndelKind, IndelLocus, LocusInfo, SampleCall, SiteLocus,
};
use varstream::{VariantLocus, VariantStage};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Sink recording all loci it receives and the number of flushes.
#[derive(Default, Clone)]
pub(crate) struct RecordingSink {
    loci: Rc<RefCell<Vec<VariantLocus>>>,
    flushes: Rc<Cell<usize>>,
}

impl RecordingSink {
    pub(crate) fn boxed(&self) -> Box<dyn VariantStage> {
        Box::new(self.clone())
    }

    pub(crate) fn count(&self) -> usize {
        self.loci.borrow().len()
    }

    pub(crate) fn flushes(&self) -> usize {
        self.flushes.get()
    }

    pub(crate) fn positions(&self) -> Vec<i64> {
        self.loci.borrow().iter().map(|locus| locus.pos()).collect()
    }

    pub(crate) fn loci(&self) -> Vec<VariantLocus> {
        self.loci.borrow().clone()
    }
}

impl VariantStage for RecordingSink {
    fn process(&mut self, locus: VariantLocus) -> Result<()> {
        self.loci.borrow_mut().push(locus);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes.set(self.flushes.get() + 1);
        Ok(())
    }
}

fn samples(genotypes: &[&[u32]]) -> Vec<SampleCall> {
    genotypes
        .iter()
        .map(|gt| SampleCall::new(Genotype::new(gt.to_vec(), false), Some(50), 30))
        .collect()
}

pub(crate) fn site(pos: i64, genotypes: &[&[u32]]) -> VariantLocus {
    SiteLocus::new(
        LocusInfo::new(pos, samples(genotypes), Genotyping::Diploid),
        "C".to_owned(),
        vec!["T".to_owned()],
    )
    .into()
}

pub(crate) fn indel(pos: i64, alleles: Vec<IndelAllele>, genotypes: &[&[u32]]) -> VariantLocus {
    IndelLocus::new(
        LocusInfo::new(pos, samples(genotypes), Genotyping::Diploid),
        alleles,
    )
    .into()
}

pub(crate) fn deletion(pos: i64, len: u32, genotypes: &[&[u32]]) -> VariantLocus {
    indel(
        pos,
        vec![IndelAllele::new(IndelKind::Deletion, len, String::new())],
        genotypes,
    )
}

pub(crate) fn breakend(pos: i64) -> VariantLocus {
    indel(
        pos,
        vec![IndelAllele::new(IndelKind::Breakend, 0, String::new())],
        &[&[0, 1]],
    )
}
