// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::io::Write;

use anyhow::{Context, Result};
use itertools::Itertools;

use crate::calling::stage::VariantStage;
use crate::variants::{SampleCall, VariantLocus};

const FORMAT: &str = "GT:GQ:DP:FT:PS";

/// Terminal stage writing one tab separated line per locus.
#[derive(Debug)]
pub struct LocusWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> LocusWriter<W> {
    /// Create a writer and write the header line.
    pub fn new(mut inner: W, sample_names: &[String]) -> Result<Self> {
        let mut header = "#POS\tTYPE\tREF\tALT\tQUAL\tFILTER\tFORMAT".to_owned();
        for name in sample_names {
            header.push('\t');
            header.push_str(name);
        }
        writeln!(inner, "{}", header).context("Unable to write header.")?;
        Ok(LocusWriter { inner, written: 0 })
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn format_sample(sample: &SampleCall) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        sample.genotype,
        sample.gq.map_or_else(|| ".".to_owned(), |gq| gq.to_string()),
        sample.depth,
        sample.filters,
        sample
            .phase_set
            .map_or_else(|| ".".to_owned(), |ps| ps.to_string()),
    )
}

impl<W: Write> VariantStage for LocusWriter<W> {
    fn process(&mut self, locus: VariantLocus) -> Result<()> {
        let (ref_allele, alt_alleles) = locus.allele_columns();
        let info = locus.info();
        let qual = info
            .score()
            .map_or_else(|| ".".to_owned(), |qual| format!("{:.2}", qual));
        let mut line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            info.pos(),
            locus.kind(),
            ref_allele,
            alt_alleles,
            qual,
            info.filters(),
            FORMAT,
        );
        if !info.samples().is_empty() {
            line.push('\t');
            line.push_str(&info.samples().iter().map(format_sample).join("\t"));
        }
        writeln!(self.inner, "{}", line)
            .with_context(|| format!("Unable to write locus at {}.", info.pos()))?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush().context("Unable to flush output.")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calling::testing::{deletion, snv};
    use crate::variants::FilterFlag;

    #[test]
    fn test_write_loci() {
        let mut writer = LocusWriter::new(Vec::new(), &["tumor".to_owned()]).unwrap();
        let mut site = snv(7, &[&[0, 1]]);
        site.info_mut().set_score(Some(13.0));
        site.info_mut().samples_mut()[0].phase_set = Some(5);
        let mut indel = deletion(9, 3, &[&[1, 1]]);
        indel.info_mut().filters_mut().set(FilterFlag::IndelConflict);
        indel.info_mut().samples_mut()[0].gq = None;

        writer.process(site).unwrap();
        writer.process(indel).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.written(), 2);

        let out = String::from_utf8(writer.into_inner()).unwrap();
        let lines = out.lines().collect_vec();
        assert_eq!(lines[0], "#POS\tTYPE\tREF\tALT\tQUAL\tFILTER\tFORMAT\ttumor");
        assert_eq!(
            lines[1],
            "7\tSITE\tA\tT\t13.00\tPASS\tGT:GQ:DP:FT:PS\t0/1:40:20:PASS:5"
        );
        assert_eq!(
            lines[2],
            "9\tINDEL\t.\tDEL:3\t.\tIndelConflict\tGT:GQ:DP:FT:PS\t1/1:.:20:PASS:."
        );
    }
}
