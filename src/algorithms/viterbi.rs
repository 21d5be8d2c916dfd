//! Viterbi decoding: best(p, s) = max over s' of best(p-1, s') + t(s'→s, p) + e(s, p).
//!
//! Ties keep the first predecessor in index order that reaches the maximum,
//! so decoding is reproducible. The same pass also produces the run-length
//! table used by duration transitions, and feeds the stochastic Viterbi
//! sweep when given a [`StochTable`].

use crate::error::Result;
use crate::stoch::StochTable;
use crate::tables::{try_filled, RowPair, ScoreTable, TracebackTable};
use crate::trellis::{fill_row, Ending, SweepMode, Trellis};

/// Everything one Viterbi recursion produces.
pub(crate) struct ViterbiPass {
    pub scores: Option<ScoreTable>,
    pub traceback: TracebackTable,
    pub run_lengths: Option<Vec<usize>>,
    pub ending: Ending,
}

impl<'m> Trellis<'m> {
    /// Runs the Viterbi sweep and returns the best path's log score.
    ///
    /// The score is `-inf` when no path explains the sequence; a traceback
    /// then reports [`TrellisError::NoPath`](crate::TrellisError::NoPath).
    pub fn viterbi(&mut self) -> Result<f64> {
        self.begin()?;
        #[cfg(feature = "tracing")]
        let _span = self.sweep_span(SweepMode::Viterbi).entered();

        let reuse_scores = self.viterbi_score.take();
        let reuse_tb = self.traceback_table.take();
        let pass = self.viterbi_pass(reuse_scores, reuse_tb, None)?;
        Ok(self.store_viterbi(pass, SweepMode::Viterbi))
    }

    pub(crate) fn store_viterbi(&mut self, pass: ViterbiPass, mode: SweepMode) -> f64 {
        self.viterbi_score = pass.scores;
        self.traceback_table = Some(pass.traceback);
        if pass.run_lengths.is_some() {
            self.run_lengths = pass.run_lengths;
        }
        self.ending_viterbi = pass.ending;
        self.complete(mode, pass.ending.score)
    }

    /// Run lengths along dominant predecessors, computing them with a
    /// Viterbi pass if the model needs them and they are not yet known.
    pub(crate) fn ensure_run_lengths(&mut self) -> Result<()> {
        if !self.model.has_duration() || self.run_lengths.is_some() {
            return Ok(());
        }
        let pass = self.viterbi_pass(None, None, None)?;
        self.run_lengths = pass.run_lengths;
        Ok(())
    }

    /// One Viterbi recursion over the whole sequence.
    ///
    /// Scores roll through two rows; the full table is kept only with
    /// `store_values`. With `stoch`, every finite predecessor term
    /// `best(p-1, s') + t(s'→s, p)` is pushed, followed by a terminal bucket
    /// at position `len` keyed by `state_count()`.
    pub(crate) fn viterbi_pass(
        &self,
        reuse_scores: Option<ScoreTable>,
        reuse_tb: Option<TracebackTable>,
        mut stoch: Option<&mut StochTable>,
    ) -> Result<ViterbiPass> {
        let len = self.len();
        let n = self.model.state_count();
        let mut rows = RowPair::new(n)?;
        let mut traceback = TracebackTable::recycle(reuse_tb, len, n)?;
        let mut scores = if self.options.store_values {
            Some(ScoreTable::recycle(reuse_scores, len, n)?)
        } else {
            None
        };
        let mut runs = if self.model.has_duration() {
            Some(try_filled(len * n, 1usize)?)
        } else {
            None
        };
        let mut cells = try_filled(n, (f64::NEG_INFINITY, None))?;

        for s in 0..n {
            let v = self.init_cell(s);
            rows.current[s] = v;
            if let Some(table) = stoch.as_deref_mut() {
                if v > f64::NEG_INFINITY {
                    table.push(0, s, None, v)?;
                }
            }
        }
        if let Some(t) = scores.as_mut() {
            t.row_mut(0).copy_from_slice(&rows.current);
        }

        for p in 1..len {
            rows.advance();
            let prev = &rows.previous;
            let prev_runs = runs.as_deref().map(|r| &r[(p - 1) * n..p * n]);

            fill_row(&mut cells, |s| {
                let emit = self.emission(s, p);
                if emit == f64::NEG_INFINITY {
                    return (f64::NEG_INFINITY, None);
                }
                let mut best = f64::NEG_INFINITY;
                let mut arg = None;
                for &edge in self.model.incoming(s) {
                    let from = prev[edge.from];
                    if from == f64::NEG_INFINITY {
                        continue;
                    }
                    let cand = from + self.edge_score(edge, p, prev_runs);
                    if cand > best {
                        best = cand;
                        arg = Some(edge.from);
                    }
                }
                (best + emit, arg)
            });

            if let Some(table) = stoch.as_deref_mut() {
                for s in 0..n {
                    if self.emission(s, p) == f64::NEG_INFINITY {
                        continue;
                    }
                    for &edge in self.model.incoming(s) {
                        let w = prev[edge.from] + self.edge_score(edge, p, prev_runs);
                        if w > f64::NEG_INFINITY {
                            table.push(p, s, Some(edge.from), w)?;
                        }
                    }
                }
            }

            let tb_row = traceback.row_mut(p);
            for (s, &(score, arg)) in cells.iter().enumerate() {
                rows.current[s] = score;
                tb_row[s] = arg;
            }
            if let Some(r) = runs.as_mut() {
                let (before, after) = r.split_at_mut(p * n);
                let prev_run = &before[(p - 1) * n..];
                for (s, run) in after[..n].iter_mut().enumerate() {
                    *run = match cells[s].1 {
                        Some(a) if a == s => prev_run[s] + 1,
                        _ => 1,
                    };
                }
            }
            if let Some(t) = scores.as_mut() {
                t.row_mut(p).copy_from_slice(&rows.current);
            }
        }

        let mut ending = Ending::UNREACHABLE;
        for (s, &v) in rows.current.iter().enumerate() {
            let cand = v + self.model.end_score(s);
            if cand > ending.score {
                ending = Ending {
                    score: cand,
                    state: Some(s),
                };
            }
            if let Some(table) = stoch.as_deref_mut() {
                if cand > f64::NEG_INFINITY {
                    table.push(len, n, Some(s), cand)?;
                }
            }
        }

        Ok(ViterbiPass {
            scores,
            traceback,
            run_lengths: runs,
            ending,
        })
    }
}
