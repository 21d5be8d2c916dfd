//! N-best Viterbi: every cell keeps up to `k` entries instead of one.
//!
//! An entry is `(score, predecessor state, predecessor rank)`, so distinct
//! entries always describe distinct partial paths. Candidates are gathered
//! in predecessor index order, then rank order, and stably sorted by
//! descending score; with `k = 1` this is exactly the Viterbi tie-break.

use crate::error::{Result, TrellisError};
use crate::tables::{NthEntry, NthTable};
use crate::trellis::{fill_row, SweepMode, Trellis};

fn keep_best(candidates: &mut Vec<NthEntry>, k: usize) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(k);
}

impl<'m> Trellis<'m> {
    /// Keeps the `k` best partial paths per cell and returns the best total
    /// score. Read the paths back with [`Trellis::nth_traceback`].
    pub fn nth_viterbi(&mut self, k: usize) -> Result<f64> {
        if k == 0 {
            return Err(TrellisError::InvalidOption("nth_viterbi needs k >= 1".into()));
        }
        self.begin()?;
        #[cfg(feature = "tracing")]
        let _span = self.sweep_span(SweepMode::NthViterbi(k)).entered();

        self.ensure_run_lengths()?;
        let len = self.len();
        let n = self.model.state_count();
        let mut table = NthTable::new(len, n, k)?;

        for (s, cell) in table.row_mut(0).iter_mut().enumerate() {
            let score = self.init_cell(s);
            if score > f64::NEG_INFINITY {
                cell.push(NthEntry {
                    score,
                    prev: None,
                    prev_rank: 0,
                });
            }
        }

        for p in 1..len {
            let runs = self.runs_at(p - 1);
            let (prev, current) = table.rows_split(p);
            fill_row(current, |s| {
                let emit = self.emission(s, p);
                if emit == f64::NEG_INFINITY {
                    return Vec::new();
                }
                let mut candidates = Vec::new();
                for &edge in self.model.incoming(s) {
                    let w = self.edge_score(edge, p, runs);
                    if w == f64::NEG_INFINITY {
                        continue;
                    }
                    for (rank, entry) in prev[edge.from].iter().enumerate() {
                        candidates.push(NthEntry {
                            score: entry.score + w,
                            prev: Some(edge.from),
                            prev_rank: rank,
                        });
                    }
                }
                candidates.retain(|c| c.score > f64::NEG_INFINITY);
                // Rank on arrival scores, as Viterbi does, then emit once.
                keep_best(&mut candidates, k);
                for c in &mut candidates {
                    c.score += emit;
                }
                candidates
            });
        }

        let mut ending = Vec::new();
        for s in 0..n {
            let end = self.model.end_score(s);
            for (rank, entry) in table.cell(len - 1, s).iter().enumerate() {
                let score = entry.score + end;
                if score > f64::NEG_INFINITY {
                    ending.push(NthEntry {
                        score,
                        prev: Some(s),
                        prev_rank: rank,
                    });
                }
            }
        }
        keep_best(&mut ending, k);

        let best = ending.first().map_or(f64::NEG_INFINITY, |e| e.score);
        self.nth_table = Some(table);
        self.ending_nth = ending;
        Ok(self.complete(SweepMode::NthViterbi(k), best))
    }

    /// [`Trellis::nth_viterbi`] with `k` from [`TrellisOptions::nbest`](crate::TrellisOptions).
    pub fn nth_viterbi_default(&mut self) -> Result<f64> {
        self.nth_viterbi(self.options.nbest)
    }
}
