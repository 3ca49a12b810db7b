//! Recency-weighted sampling over a fixed-size ring of recently written keys.
//!
//! ## Configuration Format
//!
//! ``` toml
//! [model]
//! name = "recency"
//! capacity = 5000 # number of most recent keys retained (default: 5000)
//! freshness = 0.0 # bias towards newer keys, 0 means uniform (default: 0.0)
//! ```
//!
//! The n-th written key gets the log-weight `freshness * n / capacity`, so with `freshness = f`
//! the newest key of a full ring is `e^f` times more likely to be read than the oldest one.
//!
//! ## Weighting
//!
//! [`WeightedRecencyBuffer`] keeps a running sum of (rescaled) weights per slot. Sampling draws a
//! threshold uniformly between the cumulative weight just before the oldest live slot and the
//! cumulative weight of the newest one, then binary searches the live slots in insertion order.
//! Every time the write cursor wraps around, the whole ring is shifted and rescaled relative to the
//! newest weight, so the running sums never overflow no matter how long the run is.

use crate::models::{parse_opt, Registry};
use crate::record::Key;
use crate::*;
use log::debug;
use rand::Rng;
use serde::Deserialize;
use std::num::NonZeroUsize;

/// A ring buffer of the `capacity` most recently inserted items, each sampled with probability
/// proportional to `exp(log_weight)` relative to the other live items.
#[derive(Debug)]
pub struct WeightedRecencyBuffer<T> {
    items: Vec<T>,
    /// Running sums of scaled weights, indexed like `items`.
    cum: Vec<f64>,
    capacity: usize,
    /// Physical slot of the next insertion; also the oldest live slot once wrapped.
    cursor: usize,
    wrapped: bool,
    /// Running sum right before the oldest live slot.
    prob_zero: f64,
    /// Log-domain offset subtracted from every incoming log-weight.
    log_zero: f64,
    /// Scaled weight of the newest item.
    last_weight: f64,
}

impl<T> WeightedRecencyBuffer<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            items: Vec::with_capacity(capacity),
            cum: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
            wrapped: false,
            prob_zero: 0.0,
            log_zero: 0.0,
            last_weight: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert an item, evicting the oldest one if the ring is full.
    pub fn insert(&mut self, item: T, log_weight: f64) {
        let weight = (log_weight - self.log_zero).exp();
        let prev = if self.items.is_empty() {
            0.0
        } else {
            self.cum[(self.cursor + self.capacity - 1) % self.capacity]
        };
        if self.wrapped {
            self.prob_zero = self.cum[self.cursor];
            self.items[self.cursor] = item;
            self.cum[self.cursor] = prev + weight;
        } else {
            self.items.push(item);
            self.cum.push(prev + weight);
        }
        self.last_weight = weight;
        self.cursor += 1;
        if self.cursor == self.capacity {
            self.cursor = 0;
            self.wrapped = true;
            self.rebase();
        }
    }

    /// Shift the running sums so the oldest live slot starts at zero, and rescale everything so the
    /// newest weight becomes 1.
    fn rebase(&mut self) {
        let ratio = self.last_weight;
        if !(ratio.is_finite() && ratio > 0.0) {
            debug!("Skipping rebase of recency buffer, newest weight {}", ratio);
            return;
        }
        let base = self.prob_zero;
        for c in self.cum.iter_mut() {
            *c = (*c - base) / ratio;
        }
        self.prob_zero = 0.0;
        self.log_zero += ratio.ln();
        self.last_weight = 1.0;
    }

    /// Draw one live item, or `None` if nothing has been inserted yet.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&T> {
        let len = self.items.len();
        if len == 0 {
            return None;
        }
        let oldest = if self.wrapped { self.cursor } else { 0 };
        let slot = |i: usize| (oldest + i) % self.capacity;
        let total = self.cum[slot(len - 1)];
        let threshold = self.prob_zero + rng.random::<f64>() * (total - self.prob_zero);

        // first live slot (in insertion order) whose running sum reaches the threshold
        let (mut lo, mut hi) = (0usize, len - 1);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.cum[slot(mid)] < threshold {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Some(&self.items[slot(lo)])
    }
}

const MAX_FRESHNESS: f64 = 600.0;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct RecencyModelOpt {
    pub capacity: Option<usize>,
    pub freshness: Option<f64>,
}

pub struct RecencyModel {
    buffer: WeightedRecencyBuffer<Key>,
    freshness: f64,
    writes: u64,
}

impl RecencyModel {
    pub fn new(capacity: NonZeroUsize, freshness: f64) -> Self {
        Self {
            buffer: WeightedRecencyBuffer::new(capacity),
            freshness,
            writes: 0,
        }
    }

    pub fn new_model(opt: &toml::Table) -> Result<Box<dyn PopulationModel>, Error> {
        let opt: RecencyModelOpt = parse_opt(opt)?;
        let capacity = NonZeroUsize::new(opt.capacity.unwrap_or(5000))
            .ok_or_else(|| Error::Config("recency capacity must be positive".to_string()))?;
        let freshness = opt.freshness.unwrap_or(0.0);
        // e^freshness is the weight spread inside one window and must stay representable
        if !(0.0..=MAX_FRESHNESS).contains(&freshness) {
            return Err(Error::Config(format!(
                "recency freshness must be within [0, {}], got {}",
                MAX_FRESHNESS,
                freshness
            )));
        }
        Ok(Box::new(Self::new(capacity, freshness)))
    }
}

impl PopulationModel for RecencyModel {
    fn record_write(&mut self, key: Key) {
        let log_weight = self.freshness * self.writes as f64 / self.buffer.capacity() as f64;
        self.writes += 1;
        self.buffer.insert(key, log_weight);
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Option<ReadTarget> {
        self.buffer.sample(rng).cloned().map(ReadTarget::Point)
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }
}

inventory::submit! {
    Registry::new("recency", RecencyModel::new_model)
}
