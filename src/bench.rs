//! End-to-end trace generation runs.
//!
//! A run reads a corpus, sorts it by time on disk (unless it is declared pre-sorted), extracts the
//! corpus statistics, and synthesizes a trace out of the sorted records.
//!
//! ## Configuration Format
//!
//! A configuration file is formatted in TOML. It consists of four sections, all of them (and every
//! option in them) optional:
//!
//! ```toml
//! [record]
//! # which fields of a record are interpreted, see crate::record
//!
//! [sort]
//! # external sort options, see crate::sort
//!
//! [trace]
//! # simulation options, see crate::trace
//!
//! [model]
//! # population model and its options, see crate::models
//! ```
//!
//! Available options and their usage can be found in [`crate::record::RecordOpt`],
//! [`crate::sort::SortOpt`], [`crate::trace::TraceOpt`] and [`crate::models::ModelOpt`],
//! respectively. An empty configuration is valid and reproduces the defaults of the classic
//! tweet-corpus setup.
//!
//! Any option can be overwritten via environment variables without changing the content of the
//! TOML file. The variable name is the prefix `TRACEBENCH_`, followed by the section and the option
//! separated by a double underscore. For example, setting `TRACEBENCH_TRACE__SEED=42` fixes the
//! random seed of a run.
//!
//! ## Files
//!
//! The input, output and sorted intermediate files of a run are given separately in a [`FileOpt`],
//! since they usually change from run to run while the configuration does not. The sorted
//! intermediate file is removed at the end of a run (also on failure) unless it should be kept.

use crate::models::ModelOpt;
use crate::record::{RecordOpt, RecordStream, Schema};
use crate::sort::{ExternalSorter, SortOpt};
use crate::stats::CorpusStats;
use crate::trace::{TraceOpt, TraceParams, TraceSummary, TraceSynthesizer};
use crate::*;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use log::{debug, info};
use quanta::Instant;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "TRACEBENCH_";

/// The whole configuration file.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct TraceBenchOpt {
    pub record: RecordOpt,
    pub sort: SortOpt,
    pub trace: TraceOpt,
    pub model: ModelOpt,
}

/// Paths of a single run.
#[derive(Clone, Debug)]
pub struct FileOpt {
    /// Line-delimited JSON corpus.
    pub input: PathBuf,

    /// Where the trace is written.
    pub output: PathBuf,

    /// Sorted intermediate file. Unused if `pre_sorted` is set.
    pub sorted: PathBuf,

    /// The input is already sorted by time: skip the external sort and peek the statistics.
    pub pre_sorted: bool,

    /// Keep the sorted intermediate file after the run.
    pub keep_sorted: bool,
}

impl FileOpt {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: PathBuf::from("benchmark.trace"),
            sorted: PathBuf::from("sorted.dat"),
            pre_sorted: false,
            keep_sorted: false,
        }
    }
}

/// A validated configuration, ready to run.
#[derive(Debug)]
pub struct TraceBench {
    schema: Schema,
    sorter: ExternalSorter,
    params: TraceParams,
    seed: Option<u64>,
    model: ModelOpt,
}

impl TraceBench {
    pub fn new(opt: &TraceBenchOpt) -> Result<Self, Error> {
        let schema = Schema::new(&opt.record)?;
        let sorter = ExternalSorter::new(&opt.sort, &schema)?;
        let params = TraceParams::new(&opt.trace)?;
        // fail on bad model options before any file is touched
        opt.model.build()?;
        Ok(Self {
            schema,
            sorter,
            params,
            seed: opt.trace.seed,
            model: opt.model.clone(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Generate a trace from `files.input` into `files.output`.
    pub fn generate(&self, files: &FileOpt) -> Result<TraceSummary, Error> {
        let start = Instant::now();
        ensure_distinct(&files.input, &files.output)?;

        let (source, stats, _guard) = if files.pre_sorted {
            let stats = CorpusStats::peek_file(&files.input, &self.schema)?;
            (files.input.as_path(), stats, None)
        } else {
            ensure_distinct(&files.input, &files.sorted)?;
            ensure_distinct(&files.output, &files.sorted)?;
            let (stats, guard) = if files.keep_sorted {
                (self.sorter.sort_file(&files.input, &files.sorted)?, None)
            } else {
                let (stats, guard) = self.sorter.sort_file_temp(&files.input, &files.sorted)?;
                (stats, Some(guard))
            };
            (files.sorted.as_path(), stats, guard)
        };
        info!("Corpus {}: {}", source.display(), stats);

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut synthesizer = TraceSynthesizer::new(
            self.params.clone(),
            self.schema.clone(),
            stats,
            self.model.build()?,
            self.model.build()?,
            rng,
        )?;
        let records = RecordStream::open(source)?;
        let summary = synthesizer.run(records, File::create(&files.output)?)?;
        info!(
            "Generated {} from {} in {:.2}s",
            files.output.display(),
            files.input.display(),
            start.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    /// Only sort `input` into `output`.
    pub fn sort(&self, input: &Path, output: &Path) -> Result<CorpusStats, Error> {
        ensure_distinct(input, output)?;
        self.sorter.sort_file(input, output)
    }

    /// Statistics of `input`, either by a full scan or, for sorted files, by peeking.
    pub fn stats(&self, input: &Path, peek: bool) -> Result<CorpusStats, Error> {
        if peek {
            CorpusStats::peek_file(input, &self.schema)
        } else {
            CorpusStats::scan_file(input, &self.schema)
        }
    }
}

/// Writing to `b` must not clobber `a`.
fn ensure_distinct(a: &Path, b: &Path) -> Result<(), Error> {
    let same = a == b
        || match (a.canonicalize(), b.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
    if same {
        return Err(Error::Config(format!(
            "{} would overwrite {}",
            b.display(),
            a.display()
        )));
    }
    Ok(())
}

/// Parse a configuration from a TOML string, with environment variable overrides applied.
pub fn init(text: &str) -> Result<TraceBench, Error> {
    init_with_env(text, Env::prefixed(ENV_PREFIX).split("__"))
}

fn init_with_env(text: &str, env: Env) -> Result<TraceBench, Error> {
    let opt: TraceBenchOpt = Figment::new()
        .merge(Toml::string(text))
        .merge(env)
        .extract()
        .map_err(|e| Error::Config(e.to_string()))?;
    debug!(
        "Creating trace generator with the following configurations: {:?}",
        opt
    );
    TraceBench::new(&opt)
}
