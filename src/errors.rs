// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("attempting to retrieve an invalid key '{key}' from position map")]
    InvalidKey { key: String },
    #[error("pipeline stage {stage} requires a downstream stage or collaborator that was never supplied")]
    StageWiring { stage: String },
    #[error("the input loci are not sorted: position {previous} > {current}")]
    UnsortedInput { previous: i64, current: i64 },
    #[error("invalid scoring model: {msg}")]
    InvalidScoringModel { msg: String },
    #[error("invalid BED record at {chrom}:{pos}: {msg}")]
    InvalidBedRecord { chrom: String, pos: i64, msg: String },
    #[error("invalid locus record in line {line}: {msg}")]
    InvalidLocusRecord { line: usize, msg: String },
    #[error("invalid pipeline options: {msg}")]
    InvalidPipelineOptions { msg: String },
}

pub(crate) fn invalid_key<K: std::fmt::Display>(key: K) -> Error {
    Error::InvalidKey {
        key: key.to_string(),
    }
}

pub(crate) fn stage_wiring(stage: &str) -> Error {
    Error::StageWiring {
        stage: stage.to_owned(),
    }
}
