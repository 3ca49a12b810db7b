#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! A benchmark trace synthesizer that turns a corpus of timestamped JSON records into a replayable
//! sequence of write and read commands.
//!
//! With `tracebench`, you feed a (possibly huge) line-delimited JSON file in, and get a trace file
//! out. Every record of the corpus is replayed as a write at its original (relative, optionally
//! sped up) timestamp, and reads are interleaved following a Poisson arrival process whose rate is
//! derived from the desired read/write ratio. Which key a read targets is decided by a pluggable
//! [`PopulationModel`] that learns about keys as they are written.
//!
//! A few key design choices include:
//!
//! - The corpus never has to fit in memory. Unsorted inputs are first sorted on disk by
//! [`sort::ExternalSorter`] with a bounded number of lines held in memory at any time.
//! - Records are schema-less. Only a handful of configured fields (timestamp, tie-breaks, primary
//! and secondary keys) are ever looked at; the rest of a record is carried to the output verbatim.
//! - Population models are black boxes. They are created dynamically from the `[model]` section
//! of a TOML file and dynamically dispatched, so new models can be registered from other crates
//! without touching this one.
//!
//! More detailed usage could be found in the module-level rustdocs:
//!
//! - [`mod@bench`] for the config format of a trace generation run.
//! - [`mod@models`] for the config format of the built-in population models.
//! - [`cmdline()`] for the usage of the default command line interface.

use crate::record::Key;
use rand::RngCore;
use std::fmt;

/// The strategy deciding which previously written key a synthetic read targets.
///
/// A model is fed with every key that is written (in write order) and is asked for a read target
/// whenever a read event fires. Models are strictly single-threaded: `record_write` is only called
/// from the write replay path and `sample` only from the read path of the same loop.
pub trait PopulationModel {
    /// Remember a key that has just been written.
    fn record_write(&mut self, key: Key);

    /// Pick the target of a read, or `None` if the model cannot produce one (e.g., nothing has
    /// been written yet, or a strict range does not fit).
    fn sample(&self, rng: &mut dyn RngCore) -> Option<ReadTarget>;

    /// Number of keys currently retained by the model.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a read command asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadTarget {
    /// A single key.
    Point(Key),

    /// An inclusive range of keys, `(low, high)`.
    Range(Key, Key),
}

/// The key space a read command is issued against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySpace {
    Primary,
    Secondary,
}

impl KeySpace {
    /// The command tag of a read in this key space.
    pub fn tag(&self) -> &'static str {
        match self {
            KeySpace::Primary => "rp",
            KeySpace::Secondary => "rs",
        }
    }
}

/// A single command of the output trace.
///
/// Its [`Display`](fmt::Display) implementation is the on-disk format: fields are separated by
/// tabs, and the first field is the scaled timestamp zero-padded to 8 digits.
///
/// ```txt
/// 00000000	w	{"CreationTime": 1000, "ID": 1, "UserID": 7}
/// 00000012	rp	1
/// 00000015	rs	3	9
/// ```
#[derive(Debug, PartialEq)]
pub enum TraceLine<'a> {
    /// Replay of a corpus record, `payload` is the original JSON line.
    Write { time: u64, payload: &'a str },

    /// A synthetic read.
    Read {
        time: u64,
        space: KeySpace,
        target: &'a ReadTarget,
    },
}

impl fmt::Display for TraceLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceLine::Write { time, payload } => write!(f, "{:08}\tw\t{}", time, payload),
            TraceLine::Read {
                time,
                space,
                target,
            } => match target {
                ReadTarget::Point(key) => write!(f, "{:08}\t{}\t{}", time, space.tag(), key),
                ReadTarget::Range(low, high) => {
                    write!(f, "{:08}\t{}\t{}\t{}", time, space.tag(), low, high)
                }
            },
        }
    }
}

/// Errors that abort a run.
///
/// Malformed lines and records with missing key fields are not errors at this level; they are
/// skipped locally (see [`record::RecordError`]).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Disk full, permission denied, missing temporary directory and the like.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration value is missing, malformed or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The corpus cannot parameterize a simulation (no records, or a zero-length time span).
    #[error("degenerate corpus: {0}")]
    DegenerateCorpus(String),
}

pub mod bench;
mod cmdline;
pub mod models;
pub mod record;
pub mod sort;
pub mod stats;
pub mod trace;

pub use cmdline::cmdline;

pub extern crate inventory;
pub extern crate toml;
