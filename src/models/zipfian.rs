//! Zipf-distributed reads over a bounded list of recently written keys.
//!
//! ## Configuration Format
//!
//! ``` toml
//! [model]
//! name = "zipfian"
//! capacity = 5000 # number of most recent keys retained (default: 5000)
//! theta = 1.0 # skewness of the rank distribution, 0 means uniform (default: 1.0)
//! ```
//!
//! The newest key has rank 1, the one written before it rank 2, and so on. A read draws a rank
//! from a Zipf distribution over the retained keys.

use crate::models::{parse_opt, Registry};
use crate::record::Key;
use crate::*;
use rand_distr::{Distribution, Zipf};
use serde::Deserialize;
use std::collections::VecDeque;
use std::num::NonZeroUsize;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ZipfianModelOpt {
    pub capacity: Option<usize>,
    pub theta: Option<f64>,
}

pub struct ZipfianModel {
    recent: VecDeque<Key>,
    capacity: usize,
    theta: f64,
}

impl ZipfianModel {
    pub fn new(capacity: NonZeroUsize, theta: f64) -> Self {
        let capacity = capacity.get();
        Self {
            recent: VecDeque::with_capacity(capacity),
            capacity,
            theta,
        }
    }

    pub fn new_model(opt: &toml::Table) -> Result<Box<dyn PopulationModel>, Error> {
        let opt: ZipfianModelOpt = parse_opt(opt)?;
        let capacity = NonZeroUsize::new(opt.capacity.unwrap_or(5000))
            .ok_or_else(|| Error::Config("zipfian capacity must be positive".to_string()))?;
        let theta = opt.theta.unwrap_or(1.0);
        if !(theta.is_finite() && theta >= 0.0) {
            return Err(Error::Config(format!(
                "zipfian theta must be a non-negative number, got {}",
                theta
            )));
        }
        Ok(Box::new(Self::new(capacity, theta)))
    }
}

impl PopulationModel for ZipfianModel {
    fn record_write(&mut self, key: Key) {
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(key);
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Option<ReadTarget> {
        let len = self.recent.len();
        if len == 0 {
            return None;
        }
        let zipf = Zipf::new(len as f64, self.theta).ok()?;
        let rank = (zipf.sample(rng) as usize).clamp(1, len); // zipf starts at 1
        self.recent.get(len - rank).cloned().map(ReadTarget::Point)
    }

    fn len(&self) -> usize {
        self.recent.len()
    }
}

inventory::submit! {
    Registry::new("zipfian", ZipfianModel::new_model)
}
