// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use bio::io::bed;

use crate::errors::Error;
use crate::utils::{Interval, RegionTracker};

/// Load the targeted regions of one contig from a BED file.
pub fn read_targeted_regions<P: AsRef<Path>>(path: P, contig: &str) -> Result<RegionTracker> {
    let path = path.as_ref();
    let reader = bed::Reader::from_file(path)
        .with_context(|| format!("Failed to open BED file {}.", path.display()))?;
    let regions = parse_targeted_regions(reader, contig)?;
    info!(
        "Loaded {} targeted regions on {} from {}.",
        regions.len(),
        contig,
        path.display()
    );
    Ok(regions)
}

/// Collect the records of `contig` into a tracker. Overlapping and adjacent
/// records are merged.
pub fn parse_targeted_regions<R: io::Read>(
    mut reader: bed::Reader<R>,
    contig: &str,
) -> Result<RegionTracker> {
    let mut regions = RegionTracker::new();
    for record in reader.records() {
        let record = record.context("Failed to read BED record.")?;
        if record.chrom() != contig {
            continue;
        }
        let (start, end) = (record.start() as i64, record.end() as i64);
        if start >= end {
            return Err(Error::InvalidBedRecord {
                chrom: record.chrom().to_owned(),
                pos: start,
                msg: "Invalid region coordinates: start >= end".to_owned(),
            }
            .into());
        }
        regions.add_region(Interval::new(start, end), ());
    }
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_and_merge() {
        let data = b"chr1\t10\t20\nchr2\t0\t100\nchr1\t20\t30\nchr1\t50\t60\n";
        let regions = parse_targeted_regions(bed::Reader::new(&data[..]), "chr1").unwrap();
        assert_eq!(
            regions.iter().map(|(interval, _)| interval).collect::<Vec<_>>(),
            vec![Interval::new(10, 30), Interval::new(50, 60)]
        );
        assert!(regions.is_in_region(29).is_some());
        assert!(regions.is_in_region(30).is_none());
    }

    #[test]
    fn test_invalid_record() {
        let data = b"chr1\t20\t20\n";
        let err = parse_targeted_regions(bed::Reader::new(&data[..]), "chr1")
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidBedRecord { pos: 20, .. })
        ));
    }

    #[test]
    fn test_read_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chr3\t100\t200").unwrap();
        writeln!(file, "chr3\t150\t250").unwrap();
        file.flush().unwrap();
        let regions = read_targeted_regions(file.path(), "chr3").unwrap();
        assert_eq!(regions.len(), 1);
        assert!(read_targeted_regions(file.path(), "chr1").unwrap().is_empty());
        assert!(read_targeted_regions("/nonexistent/regions.bed", "chr3").is_err());
    }
}
