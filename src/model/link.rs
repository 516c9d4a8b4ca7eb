//! Link sets and per-link delay grids.

use std::collections::{BTreeSet, HashMap};

use crate::util::{Error, Result};

/// Declared links of a container, in declaration order.
///
/// Names are non-empty and distinct, and the set itself is never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSet {
    names: Vec<String>,
}

impl LinkSet {
    /// Validate and collect link names.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(Error::validation("at least one link name is required"));
        }
        let mut seen = BTreeSet::new();
        for name in &names {
            if name.is_empty() {
                return Err(Error::validation("link names must not be empty"));
            }
            if name.contains('/') {
                return Err(Error::validation(format!("link name '{}' contains '/'", name)));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::validation(format!("duplicate link name '{}'", name)));
            }
        }
        Ok(Self { names })
    }

    /// Link names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Check that the keys of `map` are exactly the declared links.
    pub fn check_keys<V>(&self, map: &HashMap<String, V>, what: &str) -> Result<()> {
        if let Some(missing) = self.names.iter().find(|n| !map.contains_key(n.as_str())) {
            return Err(Error::validation(format!("{}: missing entry for link '{}'", what, missing)));
        }
        if let Some(extra) = map.keys().find(|k| !self.contains(k)) {
            return Err(Error::validation(format!("{}: unknown link '{}'", what, extra)));
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a LinkSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.iter()
    }
}

/// Uniform delay grid of a discrete-delay link.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DelayGrid {
    /// Number of delay bins.
    pub size: usize,
    /// Delay of bin 0, seconds.
    pub min_delay: f64,
    /// Bins per second.
    pub sample_rate: f64,
}

impl DelayGrid {
    pub fn new(size: usize, min_delay: f64, sample_rate: f64) -> Self {
        Self {
            size,
            min_delay,
            sample_rate,
        }
    }

    /// Delay of bin `k`.
    #[inline]
    pub fn delay_at(&self, k: usize) -> f64 {
        self.min_delay + k as f64 / self.sample_rate
    }

    /// Delays of all bins.
    pub fn axis(&self) -> Vec<f64> {
        (0..self.size).map(|k| self.delay_at(k)).collect()
    }

    /// Delay of the last bin.
    pub fn max_delay(&self) -> f64 {
        self.delay_at(self.size.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_set_validation() {
        assert!(LinkSet::new(["tx-rx1", "tx-rx2"]).is_ok());
        assert!(matches!(LinkSet::new(Vec::<String>::new()), Err(Error::Validation(_))));
        assert!(matches!(LinkSet::new(["a", ""]), Err(Error::Validation(_))));
        assert!(matches!(LinkSet::new(["a", "a"]), Err(Error::Validation(_))));
    }

    #[test]
    fn test_check_keys() {
        let links = LinkSet::new(["a", "b"]).unwrap();
        let mut map = HashMap::new();
        map.insert("a".to_string(), 1.0);
        let err = links.check_keys(&map, "reference delays").unwrap_err();
        assert!(err.to_string().contains("'b'"));

        map.insert("b".to_string(), 2.0);
        assert!(links.check_keys(&map, "reference delays").is_ok());

        map.insert("c".to_string(), 3.0);
        assert!(links.check_keys(&map, "reference delays").is_err());
    }

    #[test]
    fn test_delay_grid_axis() {
        let grid = DelayGrid::new(4, 1e-6, 1e8);
        let axis = grid.axis();
        assert_eq!(axis.len(), 4);
        assert_eq!(axis[0], 1e-6);
        assert!((axis[3] - 1.03e-6).abs() < 1e-15);
        assert_eq!(grid.max_delay(), axis[3]);
    }
}
