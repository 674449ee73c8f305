// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Streaming core of a variant calling pipeline: tracking of labeled genomic
//! regions, a sliding position-keyed map, and a chain of stages that filter,
//! classify, merge and phase candidate loci before they are written.

#[macro_use]
extern crate log;
#[macro_use]
extern crate approx;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate getset;
#[macro_use]
extern crate derive_new;

pub mod calling;
pub mod cli;
pub mod errors;
pub mod scoring;
pub mod utils;
pub mod variants;

pub use crate::calling::{PipelineOptions, VariantPipeline, VariantStage};
pub use crate::scoring::{LocusClassifier, ScoringModels};
pub use crate::variants::VariantLocus;
