// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use progress_logger::ProgressLogger;
use structopt::StructOpt;

use crate::calling::{LocusWriter, PipelineOptions, VariantPipeline};
use crate::scoring::{LocusClassifier, ScoringModels};
use crate::utils::bed::read_targeted_regions;
use crate::utils::locus_reader::LocusReader;

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "varstream",
    about = "Filter, classify, merge and phase candidate variant loci of one contig."
)]
#[structopt(setting = structopt::clap::AppSettings::ColoredHelp)]
pub enum Varstream {
    #[structopt(
        name = "call",
        about = "Run candidate loci (JSON lines, sorted by position) through the calling pipeline and write the final calls as TSV.",
        usage = "varstream call --contig chr1 --loci loci.jsonl --models models.json --targets targets.bed > calls.tsv"
    )]
    #[structopt(setting = structopt::clap::AppSettings::ColoredHelp)]
    Call {
        #[structopt(
            long,
            parse(from_os_str),
            help = "JSON lines file with candidate loci (if omitted, read from STDIN)."
        )]
        loci: Option<PathBuf>,
        #[structopt(long, help = "Contig the loci belong to.")]
        contig: String,
        #[structopt(
            long,
            parse(from_os_str),
            help = "BED file with targeted regions. Loci outside of them are marked as off-target."
        )]
        targets: Option<PathBuf>,
        #[structopt(
            long,
            parse(from_os_str),
            help = "JSON file with scoring models (if omitted, only the default hard filters are applied)."
        )]
        models: Option<PathBuf>,
        #[structopt(
            long,
            parse(from_os_str),
            help = "YAML file with pipeline options. Command line flags take precedence."
        )]
        config: Option<PathBuf>,
        #[structopt(
            long,
            parse(from_os_str),
            help = "TSV file that shall contain the results (if omitted, write to STDOUT)."
        )]
        output: Option<PathBuf>,
        #[structopt(long = "sample-names", help = "Names of the samples, in input order.")]
        sample_names: Vec<String>,
        #[structopt(long, help = "Resolve overlapping indels and phase nearby heterozygous SNVs.")]
        phasing: bool,
        #[structopt(
            long = "phasing-window",
            help = "Heterozygous SNVs closer than this are phased together (default: 3)."
        )]
        phasing_window: Option<i64>,
        #[structopt(long = "log-each-record", help = "Print log message for each locus.")]
        log_each_record: bool,
        #[structopt(long, short, help = "Provide verbose output.")]
        verbose: bool,
    },
}

impl Varstream {
    pub fn verbose(&self) -> bool {
        match self {
            Varstream::Call { verbose, .. } => *verbose,
        }
    }
}

pub fn run(opt: Varstream) -> Result<()> {
    match opt {
        Varstream::Call {
            loci,
            contig,
            targets,
            models,
            config,
            output,
            sample_names,
            phasing,
            phasing_window,
            log_each_record,
            ..
        } => {
            let mut options = match config {
                Some(path) => PipelineOptions::from_path(path)?,
                None => PipelineOptions::default(),
            };
            if phasing {
                options.set_phasing(true);
            }
            if let Some(window) = phasing_window {
                options.set_phasing_window(window);
            }
            if log_each_record {
                options.set_log_each_record(true);
            }

            let classifier: Rc<dyn LocusClassifier> = Rc::new(match models {
                Some(path) => ScoringModels::from_path(path)?,
                None => ScoringModels::default(),
            });

            let out: Box<dyn Write> = match output {
                Some(path) => Box::new(BufWriter::new(File::create(&path).with_context(
                    || format!("Unable to create output file {}.", path.display()),
                )?)),
                None => Box::new(BufWriter::new(io::stdout())),
            };

            let mut builder = VariantPipeline::builder()
                .classifier(classifier)
                .sink(Box::new(LocusWriter::new(out, &sample_names)?))
                .options(options);
            if let Some(path) = targets {
                builder = builder.targeted_regions(read_targeted_regions(path, &contig)?);
            }
            let mut pipeline = builder.build()?;

            let input: Box<dyn BufRead> = match loci {
                Some(path) => Box::new(BufReader::new(
                    File::open(&path)
                        .with_context(|| format!("Unable to open loci file {}.", path.display()))?,
                )),
                None => Box::new(BufReader::new(io::stdin())),
            };

            let mut progress_logger = ProgressLogger::builder()
                .with_items_name("loci")
                .with_frequency(std::time::Duration::from_secs(20))
                .start();
            for locus in LocusReader::new(input) {
                pipeline.process(locus?)?;
                progress_logger.update(1u64);
            }
            pipeline.flush()?;
            progress_logger.stop();
            info!("Processed {} loci on {}.", pipeline.processed(), contig);
            Ok(())
        }
    }
}
