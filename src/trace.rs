//! The trace synthesis loop.
//!
//! Records of a time-sorted corpus are replayed as writes at their (zero-based) timestamps, while
//! read events arrive following a Poisson process. The read rate is chosen so that, over the whole
//! corpus, there are about `rw_ratio` reads per write:
//!
//! ```txt
//! rate = rw_ratio * records / (max_time - min_time)
//! ```
//!
//! Each read goes to the primary key space with probability `ps_ratio / (1 + ps_ratio)` and to the
//! secondary one otherwise, and its target is sampled from the population model of that key space.
//! A read is skipped (not emitted) if the model has nothing to offer yet.
//!
//! ## Configuration Format
//!
//! ```toml
//! [trace]
//! speedup = 100.0 # output timestamps are divided by this factor (default: 100)
//! rw_ratio = 30.0 # reads per write (default: 30)
//! ps_ratio = 10.0 # primary-key reads per secondary-key read (default: 10)
//! output_limit = 1000000 # stop after this many output lines (default: unlimited)
//! seed = 42 # seed of the random source, for reproducible traces (default: random)
//! ```
//!
//! ## Output Format
//!
//! The trace itself is formatted by [`TraceLine`]. A run also produces a [`TraceSummary`], whose
//! text form is a single line:
//!
//! ```txt
//! writes <w> reads <r> skipped_reads <s> untimed <t> unkeyed <u> lines <l> capped <c> gap_min <i> gap_avg <v> gap_p50 <m> gap_p99 <p> gap_max <a>
//! ```
//!
//! Where the `gap_*` entries describe the distribution of the simulated time between consecutive
//! read events, in the corpus' native (unscaled) timestamp unit.

use crate::record::{Record, Schema, IO_BUFFER};
use crate::stats::CorpusStats;
use crate::*;
use hdrhistogram::Histogram;
use log::{debug, info};
use quanta::Instant;
use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::Deserialize;
use std::fmt;
use std::io::{self, BufWriter, Write};

/// The `[trace]` section of a configuration file.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TraceOpt {
    pub speedup: Option<f64>,
    pub rw_ratio: Option<f64>,
    pub ps_ratio: Option<f64>,
    pub output_limit: Option<u64>,
    pub seed: Option<u64>,
}

/// Validated simulation parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceParams {
    pub speedup: f64,
    pub rw_ratio: f64,
    pub ps_ratio: f64,
    pub output_limit: Option<u64>,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            speedup: 100.0,
            rw_ratio: 30.0,
            ps_ratio: 10.0,
            output_limit: None,
        }
    }
}

impl TraceParams {
    pub fn new(opt: &TraceOpt) -> Result<Self, Error> {
        let default = Self::default();
        let params = Self {
            speedup: opt.speedup.unwrap_or(default.speedup),
            rw_ratio: opt.rw_ratio.unwrap_or(default.rw_ratio),
            ps_ratio: opt.ps_ratio.unwrap_or(default.ps_ratio),
            output_limit: opt.output_limit,
        };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), Error> {
        if !(self.speedup.is_finite() && self.speedup > 0.0) {
            return Err(Error::Config(format!(
                "speedup must be a positive number, got {}",
                self.speedup
            )));
        }
        for (name, ratio) in [("rw_ratio", self.rw_ratio), ("ps_ratio", self.ps_ratio)] {
            if !(ratio.is_finite() && ratio >= 0.0) {
                return Err(Error::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, ratio
                )));
            }
        }
        if self.output_limit == Some(0) {
            return Err(Error::Config("output_limit must be positive".to_string()));
        }
        Ok(())
    }
}

/// What happened during a run.
#[derive(Debug)]
pub struct TraceSummary {
    /// Write lines emitted.
    pub writes: u64,

    /// Read lines emitted.
    pub reads: u64,

    /// Read events dropped because the chosen population model had no target.
    pub skipped_reads: u64,

    /// Records that could not be replayed because they lack a usable timestamp.
    pub untimed: u64,

    /// Key fields (primary and secondary counted separately) that were absent or empty on a
    /// replayed record, and therefore not fed to their population model.
    pub unkeyed: u64,

    /// Total lines emitted.
    pub lines: u64,

    /// Whether the run was cut short by `output_limit`.
    pub capped: bool,

    /// Simulated time between consecutive read events.
    pub gaps: Histogram<u64>,
}

impl TraceSummary {
    fn new() -> Self {
        Self {
            writes: 0,
            reads: 0,
            skipped_reads: 0,
            untimed: 0,
            unkeyed: 0,
            lines: 0,
            capped: false,
            gaps: Histogram::new(3).expect("3 significant digits is a valid precision"),
        }
    }
}

impl fmt::Display for TraceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "writes {} reads {} skipped_reads {} untimed {} unkeyed {} lines {} capped {}",
            self.writes,
            self.reads,
            self.skipped_reads,
            self.untimed,
            self.unkeyed,
            self.lines,
            self.capped
        )?;
        if self.gaps.len() > 0 {
            let hdr = &self.gaps;
            write!(
                f,
                " gap_min {} gap_avg {:.2} gap_p50 {} gap_p99 {} gap_max {}",
                hdr.min(),
                hdr.mean(),
                hdr.value_at_quantile(0.50),
                hdr.value_at_quantile(0.99),
                hdr.max()
            )?;
        }
        Ok(())
    }
}

/// Merges replayed writes and synthetic reads into one trace.
pub struct TraceSynthesizer<R: Rng> {
    params: TraceParams,
    schema: Schema,
    stats: CorpusStats,
    primary: Box<dyn PopulationModel>,
    secondary: Box<dyn PopulationModel>,
    arrivals: Exp<f64>,
    rng: R,
}

impl<R: Rng> TraceSynthesizer<R> {
    /// Prepare a run over a corpus described by `stats`. Fails on a degenerate corpus.
    pub fn new(
        params: TraceParams,
        schema: Schema,
        stats: CorpusStats,
        primary: Box<dyn PopulationModel>,
        secondary: Box<dyn PopulationModel>,
        rng: R,
    ) -> Result<Self, Error> {
        stats.validate()?;
        let rate = params.rw_ratio * stats.records as f64 / stats.duration() as f64;
        let arrivals = Exp::new(rate)
            .map_err(|e| Error::Config(format!("invalid read arrival rate {}: {}", rate, e)))?;
        debug!(
            "Read arrival rate {} over a duration of {} ({})",
            rate,
            stats.duration(),
            stats
        );
        Ok(Self {
            params,
            schema,
            stats,
            primary,
            secondary,
            arrivals,
            rng,
        })
    }

    /// Replay `records` (sorted by time) and write the trace into `output`.
    ///
    /// The output is flushed before returning, whether the run completed, hit `output_limit`, or
    /// failed.
    pub fn run(
        &mut self,
        records: impl IntoIterator<Item = io::Result<Record>>,
        output: impl Write,
    ) -> Result<TraceSummary, Error> {
        let start = Instant::now();
        let mut output = BufWriter::with_capacity(IO_BUFFER, output);
        let mut summary = TraceSummary::new();
        let result = self.simulate(records.into_iter(), &mut output, &mut summary);
        let flushed = output.flush();
        result?;
        flushed?;
        info!(
            "Synthesized {} lines ({} writes, {} reads) in {:.2}s{}",
            summary.lines,
            summary.writes,
            summary.reads,
            start.elapsed().as_secs_f64(),
            if summary.capped { ", output capped" } else { "" }
        );
        Ok(summary)
    }

    fn simulate(
        &mut self,
        mut records: impl Iterator<Item = io::Result<Record>>,
        output: &mut impl Write,
        summary: &mut TraceSummary,
    ) -> Result<(), Error> {
        let duration = self.stats.duration();
        let p = 1.0 / (1.0 + self.params.ps_ratio);
        let mut pending = self.next_write(&mut records, summary)?;
        let mut elapsed = 0i64;

        while elapsed < duration {
            let gap = self.arrivals.sample(&mut self.rng).floor();
            if gap.is_finite() {
                summary.gaps.saturating_record(gap as u64);
                elapsed = elapsed.saturating_add(gap as i64);
            } else {
                // rate 0, no read ever arrives
                elapsed = i64::MAX;
            }

            while let Some((time, record)) = pending.take() {
                if time > elapsed {
                    pending = Some((time, record));
                    break;
                }
                if self.replay(time, &record, output, summary)? {
                    return Ok(());
                }
                pending = self.next_write(&mut records, summary)?;
            }
            if !gap.is_finite() {
                break;
            }

            let space = if self.rng.random::<f64>() > p {
                KeySpace::Primary
            } else {
                KeySpace::Secondary
            };
            let model = match space {
                KeySpace::Primary => &self.primary,
                KeySpace::Secondary => &self.secondary,
            };
            match model.sample(&mut self.rng) {
                Some(target) => {
                    let line = TraceLine::Read {
                        time: self.scale(elapsed),
                        space,
                        target: &target,
                    };
                    summary.reads += 1;
                    if self.emit(&line, output, summary)? {
                        return Ok(());
                    }
                }
                None => summary.skipped_reads += 1,
            }
        }
        Ok(())
    }

    /// The next record with a usable timestamp, paired with its zero-based time.
    fn next_write(
        &self,
        records: &mut impl Iterator<Item = io::Result<Record>>,
        summary: &mut TraceSummary,
    ) -> Result<Option<(i64, Record)>, Error> {
        for record in records {
            let record = record?;
            match record.timestamp(&self.schema.time_field) {
                Ok(time) => return Ok(Some((time.saturating_sub(self.stats.min_time), record))),
                Err(_) => summary.untimed += 1,
            }
        }
        Ok(None)
    }

    /// Emit a write and feed its keys to the models. Returns whether the output cap was reached.
    fn replay(
        &mut self,
        time: i64,
        record: &Record,
        output: &mut impl Write,
        summary: &mut TraceSummary,
    ) -> Result<bool, Error> {
        let line = TraceLine::Write {
            time: self.scale(time),
            payload: record.line(),
        };
        summary.writes += 1;
        let capped = self.emit(&line, output, summary)?;
        for (space, model) in [
            (KeySpace::Primary, &mut self.primary),
            (KeySpace::Secondary, &mut self.secondary),
        ] {
            match record.key(self.schema.key_field(space), self.schema.key_type) {
                Ok(key) => model.record_write(key),
                Err(_) => summary.unkeyed += 1,
            }
        }
        Ok(capped)
    }

    /// Write one line. Returns whether the output cap was reached.
    fn emit(
        &self,
        line: &TraceLine,
        output: &mut impl Write,
        summary: &mut TraceSummary,
    ) -> Result<bool, Error> {
        writeln!(output, "{}", line)?;
        summary.lines += 1;
        if self
            .params
            .output_limit
            .is_some_and(|limit| summary.lines >= limit)
        {
            summary.capped = true;
        }
        Ok(summary.capped)
    }

    fn scale(&self, time: i64) -> u64 {
        (time.max(0) as f64 / self.params.speedup) as u64
    }
}
