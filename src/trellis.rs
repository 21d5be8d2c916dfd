//! The trellis: dynamic-programming tables over one model × sequence pair.
//!
//! A [`Trellis`] runs exactly one sweep at a time. The sweep records its
//! [`SweepMode`]; every result query checks that mode, so asking for an
//! N-best path after a plain Viterbi sweep is a [`TrellisError::WrongMode`]
//! rather than a read of stale storage. [`Trellis::reset`] returns the
//! trellis to idle while keeping its allocations for the next sweep.
//!
//! The sweeps themselves live in the `algorithms` module; this one owns the
//! storage, the shared cell helpers, tracebacks and the debug export.

use std::io::Write;

use rand::Rng;

use crate::builder::TrellisOptions;
use crate::error::{Result, TrellisError};
use crate::model::{Incoming, Model};
use crate::path::{MultiTraceback, TracebackPath};
use crate::stoch::StochTable;
use crate::tables::{NthEntry, NthTable, ScoreTable, TracebackTable};
use crate::traits::{DigitizedSequence, PathReceiver};

/// Which algorithm filled the tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepMode {
    Viterbi,
    Forward,
    Backward,
    ForwardViterbi,
    Posterior,
    StochasticViterbi,
    StochasticForward,
    /// N-best Viterbi retaining `k` entries per cell.
    NthViterbi(usize),
}

impl SweepMode {
    /// Whether the sweep leaves single-best Viterbi backpointers.
    fn has_backpointers(self) -> bool {
        matches!(
            self,
            SweepMode::Viterbi | SweepMode::ForwardViterbi | SweepMode::StochasticViterbi
        )
    }

    fn has_forward(self) -> bool {
        matches!(
            self,
            SweepMode::Forward
                | SweepMode::ForwardViterbi
                | SweepMode::Posterior
                | SweepMode::StochasticForward
        )
    }

    fn has_backward(self) -> bool {
        matches!(self, SweepMode::Backward | SweepMode::Posterior)
    }

    fn is_stochastic(self) -> bool {
        matches!(
            self,
            SweepMode::StochasticViterbi | SweepMode::StochasticForward
        )
    }
}

/// Best terminal cell of a Viterbi-style sweep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Ending {
    pub score: f64,
    /// Final state of the best path; `None` when nothing can end.
    pub state: Option<usize>,
}

impl Ending {
    pub(crate) const UNREACHABLE: Ending = Ending {
        score: f64::NEG_INFINITY,
        state: None,
    };
}

/// Dynamic-programming tables for one model and one digitized sequence.
pub struct Trellis<'m> {
    pub(crate) model: &'m Model,
    pub(crate) symbols: Vec<usize>,
    pub(crate) options: TrellisOptions,
    pub(crate) mode: Option<SweepMode>,

    pub(crate) viterbi_score: Option<ScoreTable>,
    pub(crate) traceback_table: Option<TracebackTable>,
    pub(crate) ending_viterbi: Ending,

    pub(crate) forward_score: Option<ScoreTable>,
    pub(crate) backward_score: Option<ScoreTable>,
    pub(crate) posterior_score: Option<ScoreTable>,
    pub(crate) ending_forward: f64,
    pub(crate) ending_backward: f64,

    pub(crate) nth_table: Option<NthTable>,
    pub(crate) ending_nth: Vec<NthEntry>,

    pub(crate) stoch_table: Option<StochTable>,

    /// Run length of each cell along its dominant predecessor chain;
    /// only built for models with duration transitions.
    pub(crate) run_lengths: Option<Vec<usize>>,
}

impl<'m> Trellis<'m> {
    /// Creates an idle trellis with default options.
    ///
    /// Fails on an empty sequence or a symbol outside the model's alphabet.
    pub fn new<S>(model: &'m Model, seq: &S) -> Result<Self>
    where
        S: DigitizedSequence + ?Sized,
    {
        Self::with_options(model, seq, TrellisOptions::default())
    }

    pub fn with_options<S>(model: &'m Model, seq: &S, options: TrellisOptions) -> Result<Self>
    where
        S: DigitizedSequence + ?Sized,
    {
        if seq.is_empty() {
            return Err(TrellisError::EmptySequence);
        }
        let alphabet = model.alphabet_size();
        let symbols = (0..seq.len())
            .map(|position| {
                let symbol = seq.symbol(position);
                if symbol < alphabet {
                    Ok(symbol)
                } else {
                    Err(TrellisError::SymbolOutOfRange {
                        position,
                        symbol,
                        alphabet,
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            model,
            symbols,
            options,
            mode: None,
            viterbi_score: None,
            traceback_table: None,
            ending_viterbi: Ending::UNREACHABLE,
            forward_score: None,
            backward_score: None,
            posterior_score: None,
            ending_forward: f64::NEG_INFINITY,
            ending_backward: f64::NEG_INFINITY,
            nth_table: None,
            ending_nth: Vec::new(),
            stoch_table: None,
            run_lengths: None,
        })
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn options(&self) -> TrellisOptions {
        self.options
    }

    /// Sequence length.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false: empty sequences are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn state_count(&self) -> usize {
        self.model.state_count()
    }

    /// The completed sweep, if any.
    pub fn mode(&self) -> Option<SweepMode> {
        self.mode
    }

    /// Returns to idle. Table storage is kept and reused by the next sweep.
    pub fn reset(&mut self) {
        self.mode = None;
        self.ending_viterbi = Ending::UNREACHABLE;
        self.ending_forward = f64::NEG_INFINITY;
        self.ending_backward = f64::NEG_INFINITY;
        self.ending_nth.clear();
        self.nth_table = None;
        self.stoch_table = None;
    }

    pub(crate) fn begin(&self) -> Result<()> {
        match self.mode {
            Some(mode) => Err(TrellisError::SweepInProgress(mode)),
            None => Ok(()),
        }
    }

    pub(crate) fn complete(&mut self, mode: SweepMode, total: f64) -> f64 {
        self.mode = Some(mode);
        #[cfg(feature = "tracing")]
        tracing::debug!(?mode, total, "sweep complete");
        total
    }

    #[cfg(feature = "tracing")]
    pub(crate) fn sweep_span(&self, mode: SweepMode) -> tracing::Span {
        tracing::debug_span!(
            "sweep",
            ?mode,
            len = self.symbols.len(),
            states = self.model.state_count()
        )
    }

    fn require(&self, query: &'static str, ok: impl Fn(SweepMode) -> bool) -> Result<SweepMode> {
        match self.mode {
            None => Err(TrellisError::NoSweep),
            Some(mode) if ok(mode) => Ok(mode),
            Some(found) => Err(TrellisError::WrongMode { query, found }),
        }
    }

    // ---------------------------------------------------------------------
    // Cell helpers shared by the sweeps
    // ---------------------------------------------------------------------

    /// Emission score of `state` for the symbol at `position`.
    #[inline]
    pub(crate) fn emission(&self, state: usize, position: usize) -> f64 {
        self.model.emission_score(state, self.symbols[position])
    }

    /// INIT weight plus first emission.
    #[inline]
    pub(crate) fn init_cell(&self, state: usize) -> f64 {
        let init = self.model.init_score(state);
        if init == f64::NEG_INFINITY {
            return init;
        }
        init + self.emission(state, 0)
    }

    /// Weight of `edge` into `position`, keyed by the source's run length at
    /// `position - 1` and the symbol there.
    #[inline]
    pub(crate) fn edge_score(
        &self,
        edge: Incoming,
        position: usize,
        runs: Option<&[usize]>,
    ) -> f64 {
        let run = runs.map_or(1, |r| r[edge.from]);
        self.model
            .edge(edge)
            .score(run, self.symbols[position - 1])
    }

    /// Run lengths at `position`, when tracked.
    #[inline]
    pub(crate) fn runs_at(&self, position: usize) -> Option<&[usize]> {
        let n = self.model.state_count();
        self.run_lengths
            .as_deref()
            .map(|r| &r[position * n..(position + 1) * n])
    }

    // ---------------------------------------------------------------------
    // Scores
    // ---------------------------------------------------------------------

    /// Total log score of the best path.
    pub fn viterbi_score(&self) -> Result<f64> {
        let mode = self.require("viterbi score", |m| {
            m.has_backpointers() || matches!(m, SweepMode::NthViterbi(_))
        })?;
        Ok(match mode {
            SweepMode::NthViterbi(_) => self
                .ending_nth
                .first()
                .map_or(f64::NEG_INFINITY, |e| e.score),
            _ => self.ending_viterbi.score,
        })
    }

    /// Total log-likelihood from the forward recursion.
    pub fn forward_score(&self) -> Result<f64> {
        self.require("forward score", SweepMode::has_forward)?;
        Ok(self.ending_forward)
    }

    /// Total log-likelihood from the backward recursion.
    pub fn backward_score(&self) -> Result<f64> {
        self.require("backward score", SweepMode::has_backward)?;
        Ok(self.ending_backward)
    }

    /// Full Viterbi score table; requires `store_values`.
    pub fn viterbi_table(&self) -> Result<&ScoreTable> {
        self.require("viterbi table", SweepMode::has_backpointers)?;
        self.viterbi_score.as_ref().ok_or_else(|| {
            TrellisError::InvalidOption("viterbi scores are only kept with store_values".into())
        })
    }

    pub fn forward_table(&self) -> Result<&ScoreTable> {
        self.require("forward table", SweepMode::has_forward)?;
        self.forward_score.as_ref().ok_or(TrellisError::NoSweep)
    }

    pub fn backward_table(&self) -> Result<&ScoreTable> {
        self.require("backward table", SweepMode::has_backward)?;
        self.backward_score.as_ref().ok_or(TrellisError::NoSweep)
    }

    /// Log posterior of every cell.
    pub fn posterior_table(&self) -> Result<&ScoreTable> {
        self.require("posterior table", |m| m == SweepMode::Posterior)?;
        self.posterior_score.as_ref().ok_or(TrellisError::NoSweep)
    }

    /// Posterior probability of `state` at `position`.
    pub fn posterior_prob(&self, position: usize, state: usize) -> Result<f64> {
        Ok(self.posterior_table()?.get(position, state).exp())
    }

    pub fn stoch_table(&self) -> Result<&StochTable> {
        self.require("stochastic table", SweepMode::is_stochastic)?;
        self.stoch_table.as_ref().ok_or(TrellisError::NoSweep)
    }

    // ---------------------------------------------------------------------
    // Tracebacks
    // ---------------------------------------------------------------------

    /// Best path in sequence order, with its score.
    pub fn traceback(&self) -> Result<TracebackPath> {
        let mut path = TracebackPath::with_capacity(self.len());
        self.traceback_into(&mut path)?;
        path.set_score(self.viterbi_score()?);
        Ok(path)
    }

    /// Pushes the best path into `receiver`, last position first.
    pub fn traceback_into<P: PathReceiver + ?Sized>(&self, receiver: &mut P) -> Result<()> {
        let mode = self.require("traceback", |m| {
            m.has_backpointers() || matches!(m, SweepMode::NthViterbi(_))
        })?;
        if let SweepMode::NthViterbi(_) = mode {
            let best = self.ending_nth.first().ok_or(TrellisError::NoPath)?;
            return self.nth_walk(best, receiver);
        }

        let table = self.traceback_table.as_ref().ok_or(TrellisError::NoSweep)?;
        let mut state = self.ending_viterbi.state.ok_or(TrellisError::NoPath)?;
        let mut position = self.len() - 1;
        loop {
            receiver.push_state(state);
            if position == 0 {
                break;
            }
            state = table.get(position, state).ok_or(TrellisError::NoPath)?;
            position -= 1;
        }
        receiver.finish();
        Ok(())
    }

    /// Up to `k` distinct paths from an N-best sweep, best first.
    pub fn nth_traceback(&self) -> Result<Vec<TracebackPath>> {
        self.require("nth traceback", |m| matches!(m, SweepMode::NthViterbi(_)))?;
        if self.ending_nth.is_empty() {
            return Err(TrellisError::NoPath);
        }
        self.ending_nth
            .iter()
            .map(|ending| {
                let mut path = TracebackPath::with_capacity(self.len());
                self.nth_walk(ending, &mut path)?;
                path.set_score(ending.score);
                Ok(path)
            })
            .collect()
    }

    fn nth_walk<P: PathReceiver + ?Sized>(&self, ending: &NthEntry, receiver: &mut P) -> Result<()> {
        let table = self.nth_table.as_ref().ok_or(TrellisError::NoSweep)?;
        let mut state = ending.prev.ok_or(TrellisError::NoPath)?;
        let mut rank = ending.prev_rank;
        let mut position = self.len() - 1;
        loop {
            receiver.push_state(state);
            let entry = table
                .cell(position, state)
                .get(rank)
                .ok_or(TrellisError::NoPath)?;
            match entry.prev {
                Some(prev) if position > 0 => {
                    state = prev;
                    rank = entry.prev_rank;
                    position -= 1;
                }
                _ => break,
            }
        }
        receiver.finish();
        Ok(())
    }

    /// Draws one path from a stochastic sweep's table.
    ///
    /// After a stochastic forward sweep the draw follows the exact path
    /// posterior; after a stochastic Viterbi sweep predecessors are weighted
    /// by their best-path scores.
    pub fn stochastic_traceback<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<TracebackPath> {
        let table = self.stoch_table()?;
        if self.stochastic_total() == f64::NEG_INFINITY {
            return Err(TrellisError::NoPath);
        }
        let mut path = TracebackPath::with_capacity(self.len());
        table.traceback(rng, &mut path)?;
        path.set_score(self.model.path_score(&self.symbols, path.states()));
        Ok(path)
    }

    /// Draws `reps` independent paths and tallies the distinct ones.
    pub fn stochastic_tracebacks<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        reps: usize,
    ) -> Result<MultiTraceback> {
        let mut multi = MultiTraceback::new();
        for _ in 0..reps {
            multi.record(self.stochastic_traceback(rng)?);
        }
        Ok(multi)
    }

    fn stochastic_total(&self) -> f64 {
        match self.mode {
            Some(SweepMode::StochasticForward) => self.ending_forward,
            _ => self.ending_viterbi.score,
        }
    }

    /// Most probable state at every position, from a posterior sweep.
    pub fn posterior_path(&self) -> Result<TracebackPath> {
        let table = self.posterior_table()?;
        if self.ending_forward == f64::NEG_INFINITY {
            return Err(TrellisError::NoPath);
        }
        let mut path = TracebackPath::with_capacity(self.len());
        for position in (0..self.len()).rev() {
            let row = table.row(position);
            let mut best = 0;
            for (state, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = state;
                }
            }
            path.push_state(best);
        }
        path.finish();
        path.set_score(self.model.path_score(&self.symbols, path.states()));
        Ok(path)
    }

    // ---------------------------------------------------------------------
    // Debug export
    // ---------------------------------------------------------------------

    /// Writes every table the completed sweep retained: a `# name` header,
    /// a column header of state names, then one row per position with one
    /// tab-separated column per state. A diagnostic aid only.
    pub fn export_tables<W: Write>(&self, mut out: W) -> Result<()> {
        let mode = self.require("export", |_| true)?;
        let mut tables: Vec<(&str, &ScoreTable)> = Vec::new();
        if mode.has_backpointers() {
            if let Some(t) = &self.viterbi_score {
                tables.push(("viterbi", t));
            }
        }
        if mode.has_forward() {
            if let Some(t) = &self.forward_score {
                tables.push(("forward", t));
            }
        }
        if mode.has_backward() {
            if let Some(t) = &self.backward_score {
                tables.push(("backward", t));
            }
        }
        if mode == SweepMode::Posterior {
            if let Some(t) = &self.posterior_score {
                tables.push(("posterior", t));
            }
        }

        for (name, table) in tables {
            writeln!(out, "# {name}")?;
            write!(out, "position")?;
            for state in self.model.states() {
                write!(out, "\t{}", state.name)?;
            }
            writeln!(out)?;
            for position in 0..table.positions() {
                write!(out, "{position}")?;
                for v in table.row(position) {
                    write!(out, "\t{v}")?;
                }
                writeln!(out)?;
            }
        }
        if let (true, Some(stoch)) = (mode.is_stochastic(), &self.stoch_table) {
            writeln!(out, "# stochastic")?;
            write!(out, "{stoch}")?;
        }
        Ok(())
    }
}

/// Fills `out[s] = cell(s)` for every state of one position.
///
/// Cells of one position only read the previous position, so with the
/// `parallel` feature the states are filled concurrently.
pub(crate) fn fill_row<T, F>(out: &mut [T], cell: F)
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        out.par_iter_mut()
            .enumerate()
            .for_each(|(state, slot)| *slot = cell(state));
    }
    #[cfg(not(feature = "parallel"))]
    for (state, slot) in out.iter_mut().enumerate() {
        *slot = cell(state);
    }
}
