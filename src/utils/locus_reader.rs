// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use crate::errors::Error;
use crate::variants::VariantLocus;

/// Reader for loci stored as one JSON object per line.
///
/// Empty lines and lines starting with `#` are skipped.
#[derive(Debug)]
pub struct LocusReader<R> {
    lines: io::Lines<R>,
    line: usize,
}

impl LocusReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Unable to open loci file {}.", path.display()))?;
        Ok(LocusReader::new(BufReader::new(file)))
    }
}

impl<R: BufRead> LocusReader<R> {
    pub fn new(reader: R) -> Self {
        LocusReader {
            lines: reader.lines(),
            line: 0,
        }
    }

    fn next_inner(&mut self) -> Result<Option<VariantLocus>> {
        for line in &mut self.lines {
            self.line += 1;
            let line_no = self.line;
            let line = line.with_context(|| format!("Unable to read line {}.", line_no))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let locus = serde_json::from_str(line).map_err(|e| Error::InvalidLocusRecord {
                line: line_no,
                msg: e.to_string(),
            })?;
            return Ok(Some(locus));
        }
        Ok(None)
    }
}

impl<R: BufRead> Iterator for LocusReader<R> {
    type Item = Result<VariantLocus>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_inner().transpose()
    }
}
