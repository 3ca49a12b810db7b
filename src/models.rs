//! Population models for read targets.
//!
//! ## Built-in Models
//!
//! - [`recency`]: a fixed-size ring of recently written keys, sampled by recency-weighted
//! probability. This is the default.
//! - [`range`]: an ordered index of every written key, sampled as random contiguous ranges.
//! - [`zipfian`]: a bounded list of recently written keys, sampled by Zipf-distributed rank.
//!
//! The usage of built-in models can be found in their module-level documentations. A model is
//! selected by the `name` of the `[model]` section; every other option in that section is handed to
//! the model's constructor:
//!
//! ```toml
//! [model]
//! name = "recency"
//! capacity = 5000
//! freshness = 2.0
//! ```
//!
//! Two instances are created per run, one for the primary and one for the secondary key space.
//!
//! ## Registering New Models
//!
//! A model from another crate implements [`PopulationModel`], provides a constructor function with
//! a signature of `fn(&toml::Table) -> Result<Box<dyn PopulationModel>, Error>`, and registers it
//! (along with its name) using [`inventory`]. A minimal example would be:
//! `inventory::submit! { Registry::new("name", constructor_fn) };`.

use crate::*;
use hashbrown::HashMap;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::Table;

type Constructor = fn(&Table) -> Result<Box<dyn PopulationModel>, Error>;

/// The centralized registry that maps the name of a population model to its constructor function.
pub struct Registry<'a> {
    pub(crate) name: &'a str,
    constructor: Constructor,
}

impl<'a> Registry<'a> {
    pub const fn new(name: &'a str, constructor: Constructor) -> Self {
        Self { name, constructor }
    }
}

inventory::collect!(Registry<'static>);

/// Names of all registered models, sorted.
pub fn registered() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = inventory::iter::<Registry>
        .into_iter()
        .map(|r| r.name)
        .collect();
    names.sort_unstable();
    names
}

/// The `[model]` section: a model name plus the model's own options.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ModelOpt {
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(flatten)]
    pub opt: Table,
}

fn default_model_name() -> String {
    "recency".to_string()
}

impl Default for ModelOpt {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            opt: Table::new(),
        }
    }
}

impl ModelOpt {
    /// Create a fresh, empty instance of the configured model.
    pub fn build(&self) -> Result<Box<dyn PopulationModel>, Error> {
        let mut registered: HashMap<&'static str, Constructor> = HashMap::new();
        for r in inventory::iter::<Registry> {
            debug!("Adding supported population model: {}", r.name);
            assert!(registered.insert(r.name, r.constructor).is_none()); // no existing name
        }
        let f = registered.get(self.name.as_str()).ok_or_else(|| {
            Error::Config(format!(
                "population model {} not found in registry",
                self.name
            ))
        })?;
        f(&self.opt)
    }
}

/// Deserialize a model's own options out of the `[model]` table.
pub(crate) fn parse_opt<T: DeserializeOwned>(opt: &Table) -> Result<T, Error> {
    toml::Value::Table(opt.clone())
        .try_into()
        .map_err(|e| Error::Config(format!("invalid model options: {}", e)))
}

pub mod range;
pub mod recency;
pub mod zipfian;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Key;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model(text: &str) -> Result<Box<dyn PopulationModel>, Error> {
        let opt: ModelOpt = toml::from_str(text).unwrap();
        opt.build()
    }

    fn _model_test(mut model: Box<dyn PopulationModel>) {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(model.len(), 0);
        assert!(model.sample(&mut rng).is_none());
        for i in 0..100 {
            model.record_write(Key::Number(i));
        }
        assert!(model.len() > 0);
        for _ in 0..1000 {
            match model.sample(&mut rng) {
                Some(ReadTarget::Point(Key::Number(k))) => assert!((0..100).contains(&k)),
                Some(ReadTarget::Range(Key::Number(lo), Key::Number(hi))) => {
                    assert!(lo <= hi && (0..100).contains(&lo) && (0..100).contains(&hi))
                }
                other => panic!("unexpected sample {:?}", other),
            }
        }
    }

    #[test]
    fn builtin_models_are_registered() {
        assert_eq!(registered(), vec!["range", "recency", "zipfian"]);
    }

    #[test]
    fn default_model() {
        assert_eq!(ModelOpt::default().name, "recency");
        _model_test(ModelOpt::default().build().unwrap());
    }

    #[test]
    fn recency() {
        _model_test(model("name = \"recency\"\ncapacity = 10\nfreshness = 3").unwrap());
    }

    #[test]
    fn range() {
        _model_test(model("name = \"range\"\nwidth = 5\nstrict = false").unwrap());
    }

    #[test]
    fn zipfian() {
        _model_test(model("name = \"zipfian\"\ncapacity = 50\ntheta = 0.99").unwrap());
    }

    #[test]
    fn model_name_defaults_to_recency() {
        let opt: ModelOpt = toml::from_str("capacity = 10").unwrap();
        assert_eq!(opt.name, "recency");
        _model_test(opt.build().unwrap());
    }

    #[test]
    fn unknown_model() {
        assert!(matches!(model("name = \"lottery\""), Err(Error::Config(_))));
    }

    #[test]
    fn invalid_model_options() {
        assert!(matches!(
            model("name = \"recency\"\ncapacity = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            model("name = \"recency\"\nfreshness = \"high\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            model("name = \"range\"\nwidth = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            model("name = \"zipfian\"\ntheta = -1.0"),
            Err(Error::Config(_))
        ));
    }
}
