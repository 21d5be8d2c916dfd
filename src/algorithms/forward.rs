//! Sum-product sweeps: Forward, Backward, Forward-Viterbi and Posterior.
//!
//! These replace Viterbi's max with a stable log-sum-exp. Duration
//! transitions are keyed by the dominant-path run lengths (see
//! [`Trellis::ensure_run_lengths`]), so Forward and Backward agree on the
//! total likelihood.

use super::viterbi::ViterbiPass;
use crate::error::Result;
use crate::logspace::LogSum;
use crate::stoch::StochTable;
use crate::tables::{try_filled, ScoreTable, TracebackTable};
use crate::trellis::{fill_row, Ending, SweepMode, Trellis};

/// Tables a Forward-Viterbi sweep may recycle: max scores, backpointers.
pub(crate) type ViterbiReuse = (Option<ScoreTable>, Option<TracebackTable>);

/// Forward and, optionally, Viterbi values of one cell.
#[derive(Clone, Copy, Debug)]
struct ForwardCell {
    sum: f64,
    max: f64,
    arg: Option<usize>,
}

impl ForwardCell {
    const UNREACHABLE: ForwardCell = ForwardCell {
        sum: f64::NEG_INFINITY,
        max: f64::NEG_INFINITY,
        arg: None,
    };
}

pub(crate) struct ForwardPass {
    pub scores: ScoreTable,
    pub total: f64,
    /// Max-product results, when the Viterbi recursion ran alongside.
    pub viterbi: Option<ViterbiPass>,
}

impl<'m> Trellis<'m> {
    /// Runs the forward recursion and returns the total log-likelihood.
    pub fn forward(&mut self) -> Result<f64> {
        self.begin()?;
        #[cfg(feature = "tracing")]
        let _span = self.sweep_span(SweepMode::Forward).entered();

        self.ensure_run_lengths()?;
        let reuse = self.forward_score.take();
        let pass = self.forward_pass(reuse, None, None)?;
        self.forward_score = Some(pass.scores);
        self.ending_forward = pass.total;
        Ok(self.complete(SweepMode::Forward, pass.total))
    }

    /// Runs the backward recursion and returns the total log-likelihood.
    pub fn backward(&mut self) -> Result<f64> {
        self.begin()?;
        #[cfg(feature = "tracing")]
        let _span = self.sweep_span(SweepMode::Backward).entered();

        self.ensure_run_lengths()?;
        let reuse = self.backward_score.take();
        let (scores, total) = self.backward_pass(reuse)?;
        self.backward_score = Some(scores);
        self.ending_backward = total;
        Ok(self.complete(SweepMode::Backward, total))
    }

    /// One sweep filling the forward table together with Viterbi
    /// backpointers, plus the Viterbi score table under `store_values`.
    /// Returns the forward total; the best path's score is available from
    /// [`Trellis::viterbi_score`].
    pub fn forward_viterbi(&mut self) -> Result<f64> {
        self.begin()?;
        #[cfg(feature = "tracing")]
        let _span = self.sweep_span(SweepMode::ForwardViterbi).entered();

        self.ensure_run_lengths()?;
        let reuse_scores = self.forward_score.take();
        let reuse_viterbi = (self.viterbi_score.take(), self.traceback_table.take());
        let pass = self.forward_pass(reuse_scores, Some(reuse_viterbi), None)?;
        self.forward_score = Some(pass.scores);
        self.ending_forward = pass.total;
        if let Some(viterbi) = pass.viterbi {
            self.viterbi_score = viterbi.scores;
            self.traceback_table = Some(viterbi.traceback);
            self.ending_viterbi = viterbi.ending;
        }
        Ok(self.complete(SweepMode::ForwardViterbi, pass.total))
    }

    /// Forward, then Backward, then `post(p, s) = f(p, s) + b(p, s) - total`.
    ///
    /// Returns the total log-likelihood. When it is `-inf` every posterior
    /// cell is `-inf` as well.
    pub fn posterior(&mut self) -> Result<f64> {
        self.begin()?;
        #[cfg(feature = "tracing")]
        let _span = self.sweep_span(SweepMode::Posterior).entered();

        self.ensure_run_lengths()?;
        let (reuse_fwd, reuse_bwd) = (self.forward_score.take(), self.backward_score.take());
        let fwd = self.forward_pass(reuse_fwd, None, None)?;
        let (bwd, bwd_total) = self.backward_pass(reuse_bwd)?;
        let total = fwd.total;

        let len = self.len();
        let n = self.model.state_count();
        let mut post = ScoreTable::recycle(self.posterior_score.take(), len, n)?;
        if total > f64::NEG_INFINITY {
            for p in 0..len {
                let (f, b) = (fwd.scores.row(p), bwd.row(p));
                for (s, out) in post.row_mut(p).iter_mut().enumerate() {
                    *out = f[s] + b[s] - total;
                }
            }
        }

        self.forward_score = Some(fwd.scores);
        self.backward_score = Some(bwd);
        self.posterior_score = Some(post);
        self.ending_forward = total;
        self.ending_backward = bwd_total;
        Ok(self.complete(SweepMode::Posterior, total))
    }

    /// Forward recursion over the full table.
    ///
    /// With `with_viterbi`, the max-product recursion runs in the same loop
    /// over its own rows, keeping a full max table under `store_values`.
    /// With `stoch`, every finite term
    /// `f(p-1, s') + t(s'→s, p)` is pushed, then the terminal bucket.
    pub(crate) fn forward_pass(
        &self,
        reuse_scores: Option<ScoreTable>,
        with_viterbi: Option<ViterbiReuse>,
        mut stoch: Option<&mut StochTable>,
    ) -> Result<ForwardPass> {
        let len = self.len();
        let n = self.model.state_count();
        let mut scores = ScoreTable::recycle(reuse_scores, len, n)?;
        let mut viterbi = match with_viterbi {
            Some((reuse_max, reuse_tb)) => {
                let stored = if self.options.store_values {
                    Some(ScoreTable::recycle(reuse_max, len, n)?)
                } else {
                    None
                };
                Some((
                    TracebackTable::recycle(reuse_tb, len, n)?,
                    try_filled(n, f64::NEG_INFINITY)?,
                    stored,
                ))
            }
            None => None,
        };
        let mut cells = try_filled(n, ForwardCell::UNREACHABLE)?;

        for s in 0..n {
            let v = self.init_cell(s);
            scores.set(0, s, v);
            if let Some((_, best, stored)) = viterbi.as_mut() {
                best[s] = v;
                if let Some(t) = stored.as_mut() {
                    t.set(0, s, v);
                }
            }
            if let Some(table) = stoch.as_deref_mut() {
                if v > f64::NEG_INFINITY {
                    table.push(0, s, None, v)?;
                }
            }
        }

        for p in 1..len {
            let prev = scores.row(p - 1);
            let prev_best = viterbi.as_ref().map(|(_, best, _)| best.as_slice());
            let runs = self.runs_at(p - 1);

            fill_row(&mut cells, |s| {
                let emit = self.emission(s, p);
                if emit == f64::NEG_INFINITY {
                    return ForwardCell::UNREACHABLE;
                }
                let mut acc = LogSum::new();
                let mut max = f64::NEG_INFINITY;
                let mut arg = None;
                for &edge in self.model.incoming(s) {
                    let w = self.edge_score(edge, p, runs);
                    acc.add(prev[edge.from] + w);
                    if let Some(best) = prev_best {
                        let cand = best[edge.from] + w;
                        if cand > max {
                            max = cand;
                            arg = Some(edge.from);
                        }
                    }
                }
                ForwardCell {
                    sum: acc.value() + emit,
                    max: max + emit,
                    arg,
                }
            });

            if let Some(table) = stoch.as_deref_mut() {
                for s in 0..n {
                    if self.emission(s, p) == f64::NEG_INFINITY {
                        continue;
                    }
                    for &edge in self.model.incoming(s) {
                        let w = prev[edge.from] + self.edge_score(edge, p, runs);
                        if w > f64::NEG_INFINITY {
                            table.push(p, s, Some(edge.from), w)?;
                        }
                    }
                }
            }

            for (out, cell) in scores.row_mut(p).iter_mut().zip(&cells) {
                *out = cell.sum;
            }
            if let Some((traceback, best, stored)) = viterbi.as_mut() {
                let tb_row = traceback.row_mut(p);
                for (s, cell) in cells.iter().enumerate() {
                    best[s] = cell.max;
                    tb_row[s] = cell.arg;
                }
                if let Some(t) = stored.as_mut() {
                    t.row_mut(p).copy_from_slice(best.as_slice());
                }
            }
        }

        let last = scores.row(len - 1);
        let mut total = LogSum::new();
        for (s, &v) in last.iter().enumerate() {
            let w = v + self.model.end_score(s);
            total.add(w);
            if let Some(table) = stoch.as_deref_mut() {
                if w > f64::NEG_INFINITY {
                    table.push(len, n, Some(s), w)?;
                }
            }
        }

        let viterbi = viterbi.map(|(traceback, best, stored)| {
            let mut ending = Ending::UNREACHABLE;
            for (s, &v) in best.iter().enumerate() {
                let cand = v + self.model.end_score(s);
                if cand > ending.score {
                    ending = Ending {
                        score: cand,
                        state: Some(s),
                    };
                }
            }
            ViterbiPass {
                scores: stored,
                traceback,
                run_lengths: None,
                ending,
            }
        });

        Ok(ForwardPass {
            scores,
            total: total.value(),
            viterbi,
        })
    }

    /// Backward recursion: `b(len-1, s) = end(s)` and
    /// `b(p, s) = logsum over s→t of t(s→t, p+1) + e(t, p+1) + b(p+1, t)`.
    /// Returns the table and `logsum_s init(s) + e(s, 0) + b(0, s)`.
    pub(crate) fn backward_pass(&self, reuse: Option<ScoreTable>) -> Result<(ScoreTable, f64)> {
        let len = self.len();
        let n = self.model.state_count();
        let mut scores = ScoreTable::recycle(reuse, len, n)?;
        let mut row = try_filled(n, f64::NEG_INFINITY)?;

        for (s, out) in scores.row_mut(len - 1).iter_mut().enumerate() {
            *out = self.model.end_score(s);
        }

        for p in (0..len - 1).rev() {
            let next = scores.row(p + 1);
            let runs = self.runs_at(p);
            fill_row(&mut row, |s| {
                let run = runs.map_or(1, |r| r[s]);
                let symbol = self.symbols[p];
                let mut acc = LogSum::new();
                for t in &self.model.state(s).transitions {
                    let tail = next[t.to];
                    if tail == f64::NEG_INFINITY {
                        continue;
                    }
                    acc.add(t.score(run, symbol) + self.emission(t.to, p + 1) + tail);
                }
                acc.value()
            });
            scores.row_mut(p).copy_from_slice(&row);
        }

        let total: LogSum = (0..n)
            .map(|s| self.init_cell(s) + scores.get(0, s))
            .collect();
        Ok((scores, total.value()))
    }
}
