//! Append-only history of accepted solutions.
//!
//! Keys are ordered by field, then time index, then adaptivity index. Per
//! field, every new key must be greater than all keys already stored.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mesh::Mesh;
use crate::sim::field::FieldId;

/// Position of a solution in the solve timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnalysisStep {
    pub field: FieldId,
    pub time_index: usize,
    pub adaptivity_index: usize,
}

impl AnalysisStep {
    pub fn new(field: FieldId, time_index: usize, adaptivity_index: usize) -> Self {
        Self {
            field,
            time_index,
            adaptivity_index,
        }
    }
}

/// An accepted solution. Immutable once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub key: AnalysisStep,
    /// Simulation time (0 for steady state).
    pub time: f64,
    /// Mesh snapshot the coefficients belong to.
    pub mesh: Arc<Mesh>,
    pub coefficients: Vec<f64>,
    /// Estimated discretization error (%), if adaptivity was active.
    pub error_percent: Option<f64>,
    /// Nonlinear iterations used.
    pub iterations: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("solution {0:?} is already stored")]
    Duplicate(AnalysisStep),
    #[error("solution {key:?} is not after the latest stored step {latest:?}")]
    NonMonotonic {
        key: AnalysisStep,
        latest: AnalysisStep,
    },
}

/// Thread-safe solution store. Reads run concurrently, writes are serialized.
#[derive(Debug, Default)]
pub struct SolutionStore {
    solutions: RwLock<BTreeMap<AnalysisStep, Arc<Solution>>>,
}

fn field_range(field: FieldId) -> std::ops::RangeInclusive<AnalysisStep> {
    AnalysisStep::new(field, 0, 0)..=AnalysisStep::new(field, usize::MAX, usize::MAX)
}

impl SolutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, solution: Solution) -> Result<Arc<Solution>, StoreError> {
        let key = solution.key;
        let mut solutions = self.solutions.write();
        if solutions.contains_key(&key) {
            return Err(StoreError::Duplicate(key));
        }
        if let Some((&latest, _)) = solutions.range(field_range(key.field)).next_back()
            && latest > key
        {
            return Err(StoreError::NonMonotonic { key, latest });
        }
        let solution = Arc::new(solution);
        solutions.insert(key, solution.clone());
        Ok(solution)
    }

    pub fn get(&self, key: AnalysisStep) -> Option<Arc<Solution>> {
        self.solutions.read().get(&key).cloned()
    }

    /// Most recent solution of a field.
    pub fn latest(&self, field: FieldId) -> Option<Arc<Solution>> {
        self.solutions
            .read()
            .range(field_range(field))
            .next_back()
            .map(|(_, s)| s.clone())
    }

    /// All solutions of a field in timeline order.
    pub fn field_history(&self, field: FieldId) -> Vec<Arc<Solution>> {
        self.solutions
            .read()
            .range(field_range(field))
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// Final (highest adaptivity index) solution of every time step of a field.
    pub fn time_history(&self, field: FieldId) -> Vec<Arc<Solution>> {
        let mut out: Vec<Arc<Solution>> = Vec::new();
        for s in self.field_history(field) {
            match out.last_mut() {
                Some(last) if last.key.time_index == s.key.time_index => *last = s,
                _ => out.push(s),
            }
        }
        out
    }

    /// Snapshot of all keys in order.
    pub fn keys(&self) -> Vec<AnalysisStep> {
        self.solutions.read().keys().copied().collect()
    }

    /// Snapshot of all solutions in key order.
    pub fn iter(&self) -> impl Iterator<Item = Arc<Solution>> {
        let snapshot: Vec<Arc<Solution>> = self.solutions.read().values().cloned().collect();
        snapshot.into_iter()
    }

    pub fn len(&self) -> usize {
        self.solutions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.read().is_empty()
    }

    /// Removes all solutions of a field; returns how many were removed.
    pub fn purge_field(&self, field: FieldId) -> usize {
        let mut solutions = self.solutions.write();
        let keys: Vec<AnalysisStep> = solutions.range(field_range(field)).map(|(k, _)| *k).collect();
        for k in &keys {
            solutions.remove(k);
        }
        keys.len()
    }

    pub fn clear(&self) {
        self.solutions.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Element, MeshBackend};

    fn solution(field: usize, time_index: usize, adaptivity_index: usize) -> Solution {
        Solution {
            key: AnalysisStep::new(FieldId(field), time_index, adaptivity_index),
            time: time_index as f64,
            mesh: Arc::new(Mesh::new(
                MeshBackend::Triangle,
                vec![Element::new("air", 1.0, 1)],
            )),
            coefficients: vec![0.0; 3],
            error_percent: None,
            iterations: 1,
        }
    }

    #[test]
    fn test_insert_and_query() {
        let store = SolutionStore::new();
        store.insert(solution(0, 0, 0)).unwrap();
        store.insert(solution(0, 1, 0)).unwrap();
        store.insert(solution(0, 1, 1)).unwrap();
        store.insert(solution(1, 0, 0)).unwrap();

        assert_eq!(store.len(), 4);
        assert_eq!(
            store.latest(FieldId(0)).unwrap().key,
            AnalysisStep::new(FieldId(0), 1, 1)
        );
        assert_eq!(store.field_history(FieldId(0)).len(), 3);
        let times: Vec<usize> = store
            .time_history(FieldId(0))
            .iter()
            .map(|s| s.key.adaptivity_index)
            .collect();
        assert_eq!(times, vec![0, 1]);
        assert!(store.get(AnalysisStep::new(FieldId(1), 0, 0)).is_some());
    }

    #[test]
    fn test_duplicate_and_non_monotonic_keys() {
        let store = SolutionStore::new();
        store.insert(solution(0, 2, 0)).unwrap();
        assert_eq!(
            store.insert(solution(0, 2, 0)),
            Err(StoreError::Duplicate(AnalysisStep::new(FieldId(0), 2, 0)))
        );
        assert!(matches!(
            store.insert(solution(0, 1, 3)),
            Err(StoreError::NonMonotonic { .. })
        ));
        // Other fields are independent
        assert!(store.insert(solution(1, 0, 0)).is_ok());
    }

    #[test]
    fn test_purge_field() {
        let store = SolutionStore::new();
        store.insert(solution(0, 0, 0)).unwrap();
        store.insert(solution(1, 0, 0)).unwrap();
        store.insert(solution(1, 1, 0)).unwrap();
        assert_eq!(store.purge_field(FieldId(1)), 2);
        assert_eq!(store.keys(), vec![AnalysisStep::new(FieldId(0), 0, 0)]);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_readers() {
        let store = Arc::new(SolutionStore::new());
        for t in 0..10 {
            store.insert(solution(0, t, 0)).unwrap();
        }
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.iter().count())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 10);
        }
    }
}
