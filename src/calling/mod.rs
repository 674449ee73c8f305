// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

pub mod overlapper;
pub mod phaser;
pub mod pipeline;
pub mod prefilter;
pub mod stage;
pub mod writer;

pub use overlapper::OverlapMergeStage;
pub use phaser::PhaserStage;
pub use pipeline::{PipelineOptions, PipelineOptionsBuilder, VariantPipeline, VariantPipelineBuilder};
pub use prefilter::PrefilterStage;
pub use stage::{FlushState, SharedStage, SharedStageHandle, VariantStage};
pub use writer::LocusWriter;
