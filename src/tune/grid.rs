use crate::algorithm::Params;
use crate::errors::ConformalError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered parameter names, each with the values to try.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ParameterGrid {
    params: Vec<(String, Vec<String>)>,
}

impl ParameterGrid {
    pub fn new() -> Self {
        ParameterGrid::default()
    }

    /// Add a parameter, or replace the values of one already in the grid.
    pub fn add<T: ToString>(mut self, name: &str, values: &[T]) -> Result<Self, ConformalError> {
        if values.is_empty() {
            return Err(ConformalError::InvalidInput(format!(
                "no values given for grid parameter {}",
                name
            )));
        }
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = values,
            None => self.params.push((name.to_string(), values)),
        }
        Ok(self)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(n, _)| n.as_str())
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.params.iter().map(|(_, v)| v.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination, in insertion order with the last parameter varying
    /// fastest. A grid without parameters has the single empty point.
    pub fn points(&self) -> Vec<GridPoint> {
        let mut points = vec![GridPoint::default()];
        for (name, values) in &self.params {
            points = points
                .into_iter()
                .flat_map(|p| {
                    values.iter().map(move |v| {
                        let mut next = p.clone();
                        next.values.push((name.clone(), v.clone()));
                        next
                    })
                })
                .collect();
        }
        points
    }
}

/// One combination of parameter values, in grid order.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GridPoint {
    values: Vec<(String, String)>,
}

impl GridPoint {
    pub fn values(&self) -> &[(String, String)] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> Params {
        self.values.iter().cloned().collect()
    }
}

impl fmt::Display for GridPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|(n, v)| format!("{}={}", n, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
