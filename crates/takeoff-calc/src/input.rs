use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use takeoff_units::{Quantity, Unit};

/// Named input values supplied for one calculation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputSet {
    values: BTreeMap<String, Quantity>,
}

impl InputSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: f64, unit: Unit) -> Self {
        self.insert(name, Quantity::new(value, unit));
        self
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, quantity: Quantity) -> Option<Quantity> {
        self.values.insert(name.into(), quantity)
    }

    pub fn get(&self, name: &str) -> Option<&Quantity> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Quantity)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Quantity)> for InputSet {
    fn from_iter<I: IntoIterator<Item = (String, Quantity)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl From<InputSet> for BTreeMap<String, Quantity> {
    fn from(inputs: InputSet) -> Self {
        inputs.values
    }
}
