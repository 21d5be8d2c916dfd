//! Stochastic traceback table.
//!
//! A stochastic sweep records, for every reachable `(position, state)` cell,
//! one entry per predecessor carrying the unnormalized log weight of arriving
//! from it. Normalization is deferred to [`StochTable::finalize`], which turns
//! each `(position, state)` group into a categorical distribution over
//! predecessors and links every entry to its predecessor's group in the
//! previous bucket. [`StochTable::traceback`] then draws a whole path by
//! walking buckets from last to first, one uniform draw per position.
//!
//! Lifecycle: pushes, then exactly one `finalize`, then any number of
//! tracebacks. Tracebacks take `&self`, so a finalized table may be shared
//! across threads for independent draws.

use std::fmt;
use std::ops::Range;

use rand::Rng;

use crate::error::StochError;
use crate::logspace::LogSum;
use crate::traits::PathReceiver;

/// One predecessor candidate for a `(position, state)` cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StochEntry {
    pub state: usize,
    /// Predecessor state; `None` means INIT.
    pub prev: Option<usize>,
    /// Log weight before finalize, probability after.
    pub prob: f64,
    /// Group of `prev` in the previous bucket, resolved by finalize.
    prev_group: Option<usize>,
}

/// Contiguous run of entries sharing a state id within one bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Group {
    state: usize,
    start: usize,
    end: usize,
}

impl Group {
    fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Append-only, position-bucketed store of predecessor weights.
#[derive(Clone, Debug, Default)]
pub struct StochTable {
    entries: Vec<StochEntry>,
    /// First entry of each bucket; bucket `b` ends where `b + 1` starts.
    bucket_starts: Vec<usize>,
    groups: Vec<Group>,
    /// First group of each bucket, plus a trailing sentinel once finalized.
    group_starts: Vec<usize>,
    finalized: bool,
}

impl StochTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sizes for `positions` buckets and `entries` pushes, failing with
    /// [`StochError::Allocation`] instead of aborting.
    pub fn try_with_capacity(positions: usize, entries: usize) -> Result<Self, StochError> {
        let mut table = Self::default();
        table
            .entries
            .try_reserve_exact(entries)
            .map_err(|_| StochError::Allocation { entries })?;
        table
            .bucket_starts
            .try_reserve_exact(positions)
            .map_err(|_| StochError::Allocation { entries: positions })?;
        Ok(table)
    }

    /// Records that `state` at `position` may be reached from `prev` with
    /// unnormalized log weight `log_weight`.
    ///
    /// Positions must be non-decreasing; moving to a later position closes
    /// the current bucket. Skipped positions become empty buckets. INIT
    /// (`prev == None`) is the only predecessor allowed at position 0, and
    /// only at position 0.
    pub fn push(
        &mut self,
        position: usize,
        state: usize,
        prev: Option<usize>,
        log_weight: f64,
    ) -> Result<(), StochError> {
        if self.finalized {
            return Err(StochError::Finalized);
        }
        if let Some(current) = self.bucket_starts.len().checked_sub(1) {
            if position < current {
                return Err(StochError::PositionOrder { position, current });
            }
        }
        match (position, prev) {
            (0, Some(prev)) => return Err(StochError::PredecessorAtStart { prev }),
            (position, None) if position > 0 => {
                return Err(StochError::InitAfterStart { position })
            }
            _ => {}
        }
        let opened = (position + 1).saturating_sub(self.bucket_starts.len());
        self.bucket_starts
            .try_reserve(opened)
            .map_err(|_| StochError::Allocation { entries: position + 1 })?;
        let wanted = self.entries.len() + 1;
        self.entries
            .try_reserve(1)
            .map_err(|_| StochError::Allocation { entries: wanted })?;
        while self.bucket_starts.len() <= position {
            self.bucket_starts.push(self.entries.len());
        }
        self.entries.push(StochEntry {
            state,
            prev,
            prob: log_weight,
            prev_group: None,
        });
        Ok(())
    }

    /// Normalizes every `(position, state)` group and links entries to their
    /// predecessor groups. The table is read-only afterwards.
    ///
    /// Pass 1 walks buckets in order: it groups each bucket by state id
    /// (stable, so predecessor order is kept) and resolves each entry's
    /// predecessor against the groups of the bucket before it, a scan bounded
    /// by the state count. Pass 2 replaces each log weight by
    /// `exp(w - logsum(group))`. A failed pass 1 leaves every weight untouched.
    pub fn finalize(&mut self) -> Result<(), StochError> {
        if self.finalized {
            return Err(StochError::Finalized);
        }
        let buckets = self.bucket_starts.len();
        self.groups.clear();
        self.group_starts.clear();

        for b in 0..buckets {
            let range = self.bucket_range(b);
            self.entries[range.clone()].sort_by_key(|e| e.state);

            let first_group = self.groups.len();
            self.group_starts.push(first_group);
            let mut start = range.start;
            for i in range.clone() {
                if i + 1 == range.end || self.entries[i + 1].state != self.entries[i].state {
                    self.groups.push(Group {
                        state: self.entries[i].state,
                        start,
                        end: i + 1,
                    });
                    start = i + 1;
                }
            }

            if b == 0 {
                continue;
            }
            let prev_groups = self.group_starts[b - 1]..first_group;
            for i in range {
                let Some(prev) = self.entries[i].prev else {
                    continue;
                };
                let found = self.groups[prev_groups.clone()]
                    .iter()
                    .position(|g| g.state == prev)
                    .map(|offset| prev_groups.start + offset);
                match found {
                    Some(g) => self.entries[i].prev_group = Some(g),
                    None => return Err(StochError::MissingPredecessor { position: b, prev }),
                }
            }
        }
        self.group_starts.push(self.groups.len());

        for group in &self.groups {
            let cells = &mut self.entries[group.range()];
            let total: LogSum = cells.iter().map(|e| e.prob).collect();
            let total = total.value();
            for e in cells.iter_mut() {
                e.prob = if total == f64::NEG_INFINITY {
                    0.0
                } else {
                    (e.prob - total).exp()
                };
            }
        }

        self.finalized = true;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            entries = self.entries.len(),
            buckets,
            groups = self.groups.len(),
            "stochastic table finalized"
        );
        Ok(())
    }

    /// Draws one path, pushing predecessor states into `receiver` from the
    /// last position back to the first, then calls `finish`.
    ///
    /// Each position consumes one uniform draw `u ∈ [0, 1)`; the first entry
    /// whose cumulative probability exceeds `u` is chosen, falling back to
    /// the last entry scanned when rounding leaves the total just under `u`.
    pub fn traceback<R, P>(&self, rng: &mut R, receiver: &mut P) -> Result<(), StochError>
    where
        R: Rng + ?Sized,
        P: PathReceiver + ?Sized,
    {
        if !self.finalized {
            return Err(StochError::NotFinalized);
        }
        if self.entries.is_empty() {
            return Err(StochError::Empty);
        }
        let last = self.bucket_starts.len() - 1;
        let terminal = self.group_starts[last]..self.group_starts[last + 1];
        if terminal.len() != 1 {
            return Err(StochError::TerminalGroups {
                groups: terminal.len(),
            });
        }

        let mut group = self.groups[terminal.start];
        loop {
            let entry = &self.entries[self.draw(rng, group.range())];
            let Some(prev) = entry.prev else {
                break;
            };
            receiver.push_state(prev);
            match entry.prev_group {
                Some(g) => group = self.groups[g],
                None => break,
            }
        }
        receiver.finish();
        Ok(())
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R, range: Range<usize>) -> usize {
        let u: f64 = rng.gen();
        let mut cumulative = 0.0;
        for i in range.clone() {
            cumulative += self.entries[i].prob;
            if cumulative > u {
                return i;
            }
        }
        range.end - 1
    }

    fn bucket_range(&self, bucket: usize) -> Range<usize> {
        let start = self.bucket_starts[bucket];
        let end = self
            .bucket_starts
            .get(bucket + 1)
            .copied()
            .unwrap_or(self.entries.len());
        start..end
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Number of entries pushed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of position buckets opened so far.
    pub fn bucket_count(&self) -> usize {
        self.bucket_starts.len()
    }

    /// Entries of one position bucket.
    pub fn bucket(&self, position: usize) -> &[StochEntry] {
        &self.entries[self.bucket_range(position)]
    }

    /// `(state, entries)` for each state group of a finalized bucket.
    pub fn groups(&self, position: usize) -> impl Iterator<Item = (usize, &[StochEntry])> + '_ {
        let range = if self.finalized {
            self.group_starts[position]..self.group_starts[position + 1]
        } else {
            0..0
        };
        self.groups[range]
            .iter()
            .map(move |g| (g.state, &self.entries[g.range()]))
    }
}

impl fmt::Display for StochTable {
    /// One line per bucket: `state:prev : prob` cells separated by tabs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in 0..self.bucket_starts.len() {
            for e in &self.entries[self.bucket_range(b)] {
                match e.prev {
                    Some(p) => write!(f, "{}:{} : {}\t", e.state, p, e.prob)?,
                    None => write!(f, "{}:INIT : {}\t", e.state, e.prob)?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
