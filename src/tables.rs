//! Dynamic-programming storage shared by the sweeps.
//!
//! Every table is a flat, row-major buffer indexed by `(position, state)`.
//! Allocation goes through [`try_filled`] so that an oversized trellis
//! reports [`TrellisError::Allocation`] instead of aborting.

use crate::error::{Result, TrellisError};

/// Allocates `len` copies of `value`, reporting failure as an error.
pub(crate) fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| TrellisError::Allocation { cells: len })?;
    v.resize(len, value);
    Ok(v)
}

fn cells(positions: usize, states: usize) -> Result<usize> {
    positions
        .checked_mul(states)
        .ok_or(TrellisError::Allocation { cells: usize::MAX })
}

/// Log scores for every `(position, state)` cell.
#[derive(Clone, Debug)]
pub struct ScoreTable {
    positions: usize,
    states: usize,
    data: Vec<f64>,
}

impl ScoreTable {
    /// A table with every cell at `-inf`.
    pub fn new(positions: usize, states: usize) -> Result<Self> {
        Ok(Self {
            positions,
            states,
            data: try_filled(cells(positions, states)?, f64::NEG_INFINITY)?,
        })
    }

    /// Reuses `old` when it has the requested shape, otherwise allocates.
    pub fn recycle(old: Option<Self>, positions: usize, states: usize) -> Result<Self> {
        match old {
            Some(mut t) if t.positions == positions && t.states == states => {
                t.data.fill(f64::NEG_INFINITY);
                Ok(t)
            }
            _ => Self::new(positions, states),
        }
    }

    #[inline]
    pub fn positions(&self) -> usize {
        self.positions
    }

    #[inline]
    pub fn states(&self) -> usize {
        self.states
    }

    #[inline]
    pub fn get(&self, position: usize, state: usize) -> f64 {
        self.data[position * self.states + state]
    }

    #[inline]
    pub fn set(&mut self, position: usize, state: usize, value: f64) {
        self.data[position * self.states + state] = value;
    }

    /// All states at `position`.
    #[inline]
    pub fn row(&self, position: usize) -> &[f64] {
        let start = position * self.states;
        &self.data[start..start + self.states]
    }

    #[inline]
    pub fn row_mut(&mut self, position: usize) -> &mut [f64] {
        let start = position * self.states;
        &mut self.data[start..start + self.states]
    }
}

/// Two owned score rows for sweeps that only look one position back.
///
/// `previous` holds position `p - 1` while `current` is being filled for
/// `p`; [`RowPair::advance`] swaps them and clears the new current row.
#[derive(Clone, Debug)]
pub struct RowPair {
    pub previous: Vec<f64>,
    pub current: Vec<f64>,
}

impl RowPair {
    pub fn new(states: usize) -> Result<Self> {
        Ok(Self {
            previous: try_filled(states, f64::NEG_INFINITY)?,
            current: try_filled(states, f64::NEG_INFINITY)?,
        })
    }

    /// Makes the freshly filled row the previous one.
    #[inline]
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.current);
    }

    /// Swaps, then resets `current` to `-inf`.
    #[inline]
    pub fn advance(&mut self) {
        self.swap();
        self.current.fill(f64::NEG_INFINITY);
    }
}

/// Best predecessor of every cell. `None` at position 0 means INIT; `None`
/// later means the cell is unreachable.
#[derive(Clone, Debug)]
pub struct TracebackTable {
    states: usize,
    data: Vec<Option<usize>>,
}

impl TracebackTable {
    pub fn new(positions: usize, states: usize) -> Result<Self> {
        Ok(Self {
            states,
            data: try_filled(cells(positions, states)?, None)?,
        })
    }

    pub fn recycle(old: Option<Self>, positions: usize, states: usize) -> Result<Self> {
        match old {
            Some(mut t) if t.states == states && t.data.len() == positions * states => {
                t.data.fill(None);
                Ok(t)
            }
            _ => Self::new(positions, states),
        }
    }

    #[inline]
    pub fn get(&self, position: usize, state: usize) -> Option<usize> {
        self.data[position * self.states + state]
    }

    #[inline]
    pub fn row_mut(&mut self, position: usize) -> &mut [Option<usize>] {
        let start = position * self.states;
        &mut self.data[start..start + self.states]
    }
}

/// One retained candidate in an N-best cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NthEntry {
    pub score: f64,
    /// Predecessor state, `None` for INIT.
    pub prev: Option<usize>,
    /// Rank of the predecessor's entry this candidate extends.
    pub prev_rank: usize,
}

/// Up to `k` best entries per cell, best first.
#[derive(Clone, Debug)]
pub struct NthTable {
    states: usize,
    k: usize,
    data: Vec<Vec<NthEntry>>,
}

impl NthTable {
    pub fn new(positions: usize, states: usize, k: usize) -> Result<Self> {
        Ok(Self {
            states,
            k,
            data: try_filled(cells(positions, states)?, Vec::new())?,
        })
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn cell(&self, position: usize, state: usize) -> &[NthEntry] {
        &self.data[position * self.states + state]
    }

    #[inline]
    pub fn row_mut(&mut self, position: usize) -> &mut [Vec<NthEntry>] {
        let start = position * self.states;
        &mut self.data[start..start + self.states]
    }

    /// Splits out the finished row `position - 1` and the row being filled.
    pub fn rows_split(&mut self, position: usize) -> (&[Vec<NthEntry>], &mut [Vec<NthEntry>]) {
        let start = position * self.states;
        let (before, after) = self.data.split_at_mut(start);
        (&before[start - self.states..], &mut after[..self.states])
    }
}
