//! Range reads over an ordered index of every written key.
//!
//! ## Configuration Format
//!
//! ``` toml
//! [model]
//! name = "range"
//! width = 1 # distance (in indexed keys) between the low and high end of a range (default: 1)
//! strict = false # give up on ranges that run past the largest key (default: false)
//! ```
//!
//! A read picks a uniformly random indexed key as its low end, and the key `width` positions after
//! it as its high end. Near the end of the index the high end is clamped to the largest key, unless
//! `strict` is set, in which case no read is produced at all.
//!
//! Unlike [`super::recency`], this model never forgets a key, so its memory grows with the number
//! of distinct writes.

use crate::models::{parse_opt, Registry};
use crate::record::Key;
use crate::*;
use rand::Rng;
use serde::Deserialize;

/// All inserted keys, sorted ascending. Duplicates are kept.
#[derive(Debug, Default)]
pub struct RangeKeyIndex {
    keys: Vec<Key>,
}

impl RangeKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Insert a key at its sorted position, after any equal keys.
    pub fn insert(&mut self, key: Key) {
        match self.keys.last() {
            Some(last) if *last > key => {
                let at = self.keys.partition_point(|k| *k <= key);
                self.keys.insert(at, key);
            }
            _ => self.keys.push(key),
        }
    }

    /// Draw `(low, high)` where `low` is uniformly random and `high` is `width` positions later.
    pub fn sample_range<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        width: usize,
        strict: bool,
    ) -> Option<(&Key, &Key)> {
        let n = self.keys.len();
        if n == 0 {
            return None;
        }
        let i = rng.random_range(0..n);
        match i.checked_add(width).filter(|&j| j < n) {
            Some(j) => Some((&self.keys[i], &self.keys[j])),
            None if strict => None,
            None => Some((&self.keys[i], &self.keys[n - 1])),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct RangeModelOpt {
    pub width: Option<usize>,
    pub strict: Option<bool>,
}

pub struct RangeModel {
    index: RangeKeyIndex,
    width: usize,
    strict: bool,
}

impl RangeModel {
    pub fn new(width: usize, strict: bool) -> Self {
        Self {
            index: RangeKeyIndex::new(),
            width,
            strict,
        }
    }

    pub fn new_model(opt: &toml::Table) -> Result<Box<dyn PopulationModel>, Error> {
        let opt: RangeModelOpt = parse_opt(opt)?;
        let width = opt.width.unwrap_or(1);
        if width == 0 {
            return Err(Error::Config("range width must be positive".to_string()));
        }
        Ok(Box::new(Self::new(width, opt.strict.unwrap_or(false))))
    }
}

impl PopulationModel for RangeModel {
    fn record_write(&mut self, key: Key) {
        self.index.insert(key);
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Option<ReadTarget> {
        self.index
            .sample_range(rng, self.width, self.strict)
            .map(|(low, high)| ReadTarget::Range(low.clone(), high.clone()))
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

inventory::submit! {
    Registry::new("range", RangeModel::new_model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn index(keys: &[i128]) -> RangeKeyIndex {
        let mut index = RangeKeyIndex::new();
        for &k in keys {
            index.insert(Key::Number(k));
        }
        index
    }

    #[test]
    fn insert_keeps_order_and_duplicates() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut keys: Vec<i128> = (0..200).chain(50..80).collect();
        keys.shuffle(&mut rng);
        let index = index(&keys);
        keys.sort();
        let expected: Vec<Key> = keys.into_iter().map(Key::Number).collect();
        assert_eq!(index.keys(), &expected[..]);
    }

    #[test]
    fn insert_text_keys() {
        let mut index = RangeKeyIndex::new();
        for k in ["b", "a", "c", "b"] {
            index.insert(Key::Text(k.to_string()));
        }
        let keys: Vec<String> = index.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["a", "b", "b", "c"]);
    }

    #[test]
    fn empty_index() {
        let mut rng = StdRng::seed_from_u64(2);
        assert!(RangeKeyIndex::new()
            .sample_range(&mut rng, 1, false)
            .is_none());
    }

    #[test]
    fn ranges_are_ordered_and_bounded() {
        let mut rng = StdRng::seed_from_u64(4);
        let index = index(&[10, 20, 30, 40, 50]);
        let (mut clamped, mut full) = (0, 0);
        for _ in 0..1000 {
            let (low, high) = index.sample_range(&mut rng, 2, false).unwrap();
            assert!(low <= high);
            let (Key::Number(l), Key::Number(h)) = (low, high) else {
                panic!("unexpected keys {} {}", low, high);
            };
            if *h == l + 20 {
                full += 1;
            } else {
                assert_eq!(*h, 50);
                clamped += 1;
            }
        }
        assert!(full > 0 && clamped > 0);
    }

    #[test]
    fn strict_ranges_never_clamp() {
        let mut rng = StdRng::seed_from_u64(4);
        let index = index(&[10, 20, 30, 40, 50]);
        let (mut some, mut none) = (0, 0);
        for _ in 0..1000 {
            match index.sample_range(&mut rng, 2, true) {
                Some((Key::Number(l), Key::Number(h))) => {
                    assert_eq!(*h, l + 20);
                    some += 1;
                }
                None => none += 1,
                other => panic!("unexpected range {:?}", other),
            }
        }
        assert!(some > 0 && none > 0);
        assert!(index.sample_range(&mut rng, 5, true).is_none());
        assert!(index.sample_range(&mut rng, usize::MAX, true).is_none());
        let (_, h) = index.sample_range(&mut rng, usize::MAX, false).unwrap();
        assert_eq!(*h, Key::Number(50));
    }
}
