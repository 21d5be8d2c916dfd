//! Decoded state paths.

use std::collections::HashMap;

use crate::traits::PathReceiver;

/// A state path in sequence order.
///
/// Tracebacks push states last-position-first; [`PathReceiver::finish`]
/// reverses them once the walk completes. Re-run the traceback to get a
/// fresh path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TracebackPath {
    states: Vec<usize>,
    score: Option<f64>,
}

impl TracebackPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(len: usize) -> Self {
        Self {
            states: Vec::with_capacity(len),
            score: None,
        }
    }

    pub fn states(&self) -> &[usize] {
        &self.states
    }

    pub fn into_states(self) -> Vec<usize> {
        self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Log score of the path, when the sweep that produced it knows it.
    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub(crate) fn set_score(&mut self, score: f64) {
        self.score = Some(score);
    }

    /// Maps state indices through `names` (e.g. state names or labels).
    pub fn labels<'a, T: ?Sized>(&self, names: impl Fn(usize) -> &'a T) -> Vec<&'a T> {
        self.states.iter().map(|&s| names(s)).collect()
    }
}

impl PathReceiver for TracebackPath {
    fn push_state(&mut self, state: usize) {
        self.states.push(state);
    }

    fn finish(&mut self) {
        self.states.reverse();
    }
}

/// Distinct paths drawn by repeated tracebacks, with how often each was drawn.
#[derive(Clone, Debug, Default)]
pub struct MultiTraceback {
    index: HashMap<Vec<usize>, usize>,
    paths: Vec<(Vec<usize>, usize)>,
    total: usize,
}

impl MultiTraceback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one drawn path.
    pub fn record(&mut self, path: TracebackPath) {
        let states = path.into_states();
        self.total += 1;
        match self.index.get(&states) {
            Some(&slot) => self.paths[slot].1 += 1,
            None => {
                self.index.insert(states.clone(), self.paths.len());
                self.paths.push((states, 1));
            }
        }
    }

    /// Number of paths recorded, duplicates included.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of distinct paths.
    pub fn distinct(&self) -> usize {
        self.paths.len()
    }

    pub fn count(&self, states: &[usize]) -> usize {
        self.index
            .get(states)
            .map_or(0, |&slot| self.paths[slot].1)
    }

    /// Distinct paths with counts, most frequent first. Ties keep first-drawn order.
    pub fn by_frequency(&self) -> Vec<(&[usize], usize)> {
        let mut out: Vec<(&[usize], usize)> = self
            .paths
            .iter()
            .map(|(states, n)| (states.as_slice(), *n))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }

    /// Fraction of draws that visited `state` at `position`.
    pub fn state_frequency(&self, position: usize, state: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let hits: usize = self
            .paths
            .iter()
            .filter(|(states, _)| states.get(position) == Some(&state))
            .map(|(_, n)| n)
            .sum();
        hits as f64 / self.total as f64
    }
}
