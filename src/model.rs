//! In-memory HMM consumed by the trellis.
//!
//! A [`Model`] is an INIT pseudo-state plus a dense vector of emitting
//! states. INIT only carries transitions; every other state carries ordered
//! outgoing transitions, an optional END weight and one or more emission
//! tables. All weights are stored as log-probabilities once [`ModelBuilder::build`]
//! has run, so raw counts never reach a sweep.

use std::collections::HashMap;

use crate::error::{Result, TrellisError};
use crate::logspace::to_log;
use crate::traits::DigitizedSequence;

/// How the numbers handed to the builder are to be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// Plain probabilities in `[0, 1]`.
    Probability,
    /// Natural-log probabilities.
    LogProb,
    /// Raw counts, normalized per source state at build time.
    Counts,
}

impl ValueKind {
    fn to_log(self, value: f64) -> f64 {
        match self {
            ValueKind::Probability => to_log(value),
            ValueKind::LogProb => value,
            // Counts are resolved by `normalize_counts` before this is reached.
            ValueKind::Counts => to_log(value),
        }
    }
}

/// Converts a table of values into log-probabilities, normalizing counts.
fn table_to_log(kind: ValueKind, values: &[f64]) -> Result<Vec<f64>> {
    if values.iter().any(|v| v.is_nan()) {
        return Err(TrellisError::InvalidModel("NaN weight in table".into()));
    }
    match kind {
        ValueKind::Counts => {
            if values.iter().any(|&v| v < 0.0) {
                return Err(TrellisError::InvalidModel("negative count".into()));
            }
            let total: f64 = values.iter().sum();
            if total <= 0.0 {
                return Err(TrellisError::InvalidModel(
                    "count table sums to zero".into(),
                ));
            }
            Ok(values.iter().map(|&v| to_log(v / total)).collect())
        }
        _ => Ok(values.iter().map(|&v| kind.to_log(v)).collect()),
    }
}

/// Log weights keyed by how long the source state has been occupied.
#[derive(Clone, Debug, PartialEq)]
pub struct DurationTable {
    /// `log_probs[d - 1]` is the weight after a run of `d` positions.
    log_probs: Vec<f64>,
}

impl DurationTable {
    pub fn new(kind: ValueKind, values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(TrellisError::InvalidModel("empty duration table".into()));
        }
        Ok(Self {
            log_probs: table_to_log(kind, values)?,
        })
    }

    /// Weight for a run of `run_length` positions. Runs longer than the
    /// table reuse its last entry.
    #[inline]
    pub fn score(&self, run_length: usize) -> f64 {
        let idx = run_length.max(1) - 1;
        match self.log_probs.get(idx) {
            Some(&w) => w,
            None => self.log_probs[self.log_probs.len() - 1],
        }
    }
}

/// Log weights keyed by the symbol emitted just before the transition.
#[derive(Clone, Debug, PartialEq)]
pub struct LexicalTable {
    log_probs: Vec<f64>,
}

impl LexicalTable {
    pub fn new(kind: ValueKind, values: &[f64]) -> Result<Self> {
        Ok(Self {
            log_probs: table_to_log(kind, values)?,
        })
    }

    #[inline]
    pub fn score(&self, symbol: usize) -> f64 {
        self.log_probs
            .get(symbol)
            .copied()
            .unwrap_or(f64::NEG_INFINITY)
    }

    pub fn width(&self) -> usize {
        self.log_probs.len()
    }
}

/// How a transition's weight is evaluated at a position.
#[derive(Clone, Debug, PartialEq)]
pub enum TransitionKind {
    /// Fixed log weight.
    Standard(f64),
    /// Weight depends on the run length of the source state.
    Duration(DurationTable),
    /// Weight depends on the symbol emitted by the source state.
    Lexical(LexicalTable),
}

/// Outgoing edge of a state.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Destination state index.
    pub to: usize,
    pub kind: TransitionKind,
}

impl Transition {
    /// Log weight of taking this edge into position `p`, given the source's
    /// run length ending at `p - 1` and the symbol at `p - 1`.
    #[inline]
    pub fn score(&self, run_length: usize, prev_symbol: usize) -> f64 {
        match &self.kind {
            TransitionKind::Standard(w) => *w,
            TransitionKind::Duration(table) => table.score(run_length),
            TransitionKind::Lexical(table) => table.score(prev_symbol),
        }
    }
}

/// One emission sub-model: a log-probability per alphabet symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct Emission {
    log_probs: Vec<f64>,
}

impl Emission {
    pub fn new(kind: ValueKind, values: &[f64]) -> Result<Self> {
        Ok(Self {
            log_probs: table_to_log(kind, values)?,
        })
    }

    #[inline]
    pub fn score(&self, symbol: usize) -> f64 {
        self.log_probs[symbol]
    }

    pub fn width(&self) -> usize {
        self.log_probs.len()
    }
}

/// An emitting state.
#[derive(Clone, Debug)]
pub struct State {
    pub name: String,
    pub label: Option<String>,
    pub transitions: Vec<Transition>,
    /// Log weight of terminating from this state.
    pub end: f64,
    pub emissions: Vec<Emission>,
}

/// Reference to one incoming edge: `states[from].transitions[transition]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Incoming {
    pub from: usize,
    pub transition: usize,
}

/// A finalized model. Immutable for the lifetime of any trellis using it.
#[derive(Clone, Debug)]
pub struct Model {
    alphabet_size: usize,
    init: Vec<f64>,
    states: Vec<State>,
    /// Incoming edges per destination, sorted by source index.
    incoming: Vec<Vec<Incoming>>,
    has_duration: bool,
}

impl Model {
    #[inline]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, idx: usize) -> &State {
        &self.states[idx]
    }

    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|s| s.name == name)
    }

    /// Log weight of INIT → `state`.
    #[inline]
    pub fn init_score(&self, state: usize) -> f64 {
        self.init[state]
    }

    /// Log weight of `state` → END.
    #[inline]
    pub fn end_score(&self, state: usize) -> f64 {
        self.states[state].end
    }

    /// Incoming edges of `state` in predecessor index order.
    #[inline]
    pub fn incoming(&self, state: usize) -> &[Incoming] {
        &self.incoming[state]
    }

    #[inline]
    pub fn edge(&self, edge: Incoming) -> &Transition {
        &self.states[edge.from].transitions[edge.transition]
    }

    /// Sum of the state's emission sub-model scores for `symbol`.
    #[inline]
    pub fn emission_score(&self, state: usize, symbol: usize) -> f64 {
        self.states[state]
            .emissions
            .iter()
            .map(|e| e.score(symbol))
            .sum()
    }

    /// Whether any transition is keyed by run length.
    #[inline]
    pub fn has_duration(&self) -> bool {
        self.has_duration
    }

    /// Log weight of `from` → `to` into `position >= 1`, or `-inf` if no such edge.
    pub fn transition_score<S>(
        &self,
        seq: &S,
        from: usize,
        to: usize,
        position: usize,
        run_length: usize,
    ) -> f64
    where
        S: DigitizedSequence + ?Sized,
    {
        self.states[from]
            .transitions
            .iter()
            .find(|t| t.to == to)
            .map_or(f64::NEG_INFINITY, |t| {
                t.score(run_length, seq.symbol(position - 1))
            })
    }

    /// Recomputes the log score of `path` over `seq`: INIT weight, every
    /// transition and emission, and the END weight of the final state.
    ///
    /// Run lengths are taken along the path itself. An empty path or a
    /// length mismatch scores `-inf`.
    pub fn path_score<S>(&self, seq: &S, path: &[usize]) -> f64
    where
        S: DigitizedSequence + ?Sized,
    {
        if path.is_empty() || path.len() != seq.len() {
            return f64::NEG_INFINITY;
        }
        let mut score = self.init_score(path[0]) + self.emission_score(path[0], seq.symbol(0));
        let mut run = 1usize;
        for p in 1..path.len() {
            let (prev, cur) = (path[p - 1], path[p]);
            score += self.transition_score(seq, prev, cur, p, run);
            score += self.emission_score(cur, seq.symbol(p));
            run = if prev == cur { run + 1 } else { 1 };
        }
        score + self.end_score(path[path.len() - 1])
    }
}

#[derive(Clone, Debug)]
enum EdgeSpec {
    Standard(ValueKind, f64),
    Duration(ValueKind, Vec<f64>),
    Lexical(ValueKind, Vec<f64>),
}

/// Declaration of one emitting state, resolved by [`ModelBuilder::build`].
#[derive(Clone, Debug)]
pub struct StateSpec {
    name: String,
    label: Option<String>,
    edges: Vec<(String, EdgeSpec)>,
    end: Option<(ValueKind, f64)>,
    emissions: Vec<(ValueKind, Vec<f64>)>,
}

impl StateSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            edges: Vec::new(),
            end: None,
            emissions: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn transition(mut self, to: impl Into<String>, kind: ValueKind, value: f64) -> Self {
        self.edges.push((to.into(), EdgeSpec::Standard(kind, value)));
        self
    }

    pub fn duration(mut self, to: impl Into<String>, kind: ValueKind, values: Vec<f64>) -> Self {
        self.edges.push((to.into(), EdgeSpec::Duration(kind, values)));
        self
    }

    pub fn lexical(mut self, to: impl Into<String>, kind: ValueKind, values: Vec<f64>) -> Self {
        self.edges.push((to.into(), EdgeSpec::Lexical(kind, values)));
        self
    }

    pub fn end(mut self, kind: ValueKind, value: f64) -> Self {
        self.end = Some((kind, value));
        self
    }

    pub fn emission(mut self, kind: ValueKind, values: Vec<f64>) -> Self {
        self.emissions.push((kind, values));
        self
    }
}

/// Assembles and validates a [`Model`].
#[derive(Clone, Debug)]
pub struct ModelBuilder {
    alphabet_size: usize,
    init: Vec<(String, ValueKind, f64)>,
    states: Vec<StateSpec>,
}

impl ModelBuilder {
    pub fn new(alphabet_size: usize) -> Self {
        Self {
            alphabet_size,
            init: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Adds an INIT → `to` transition.
    pub fn init_transition(mut self, to: impl Into<String>, kind: ValueKind, value: f64) -> Self {
        self.init.push((to.into(), kind, value));
        self
    }

    pub fn state(mut self, spec: StateSpec) -> Self {
        self.states.push(spec);
        self
    }

    pub fn build(self) -> Result<Model> {
        if self.alphabet_size == 0 {
            return Err(TrellisError::InvalidModel("alphabet is empty".into()));
        }
        if self.states.is_empty() {
            return Err(TrellisError::InvalidModel("model has no states".into()));
        }

        let mut index = HashMap::with_capacity(self.states.len());
        for (i, spec) in self.states.iter().enumerate() {
            if spec.name == "INIT" || spec.name == "END" {
                return Err(TrellisError::InvalidModel(format!(
                    "{} is reserved",
                    spec.name
                )));
            }
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(TrellisError::InvalidModel(format!(
                    "duplicate state {}",
                    spec.name
                )));
            }
        }
        let resolve = |name: &str, from: &str| -> Result<usize> {
            index.get(name).copied().ok_or_else(|| {
                TrellisError::InvalidModel(format!("{from} transitions to unknown state {name}"))
            })
        };

        let n = self.states.len();
        let init_edges = self
            .init
            .iter()
            .map(|(to, kind, value)| Ok((resolve(to, "INIT")?, *kind, *value)))
            .collect::<Result<Vec<_>>>()?;
        let init_logs = normalize_counts(
            init_edges.iter().map(|&(_, kind, value)| (kind, value)),
            None,
        )?
        .0;
        let mut init = vec![f64::NEG_INFINITY; n];
        let mut seen = vec![false; n];
        for (&(to, _, _), w) in init_edges.iter().zip(init_logs) {
            if std::mem::replace(&mut seen[to], true) {
                return Err(TrellisError::InvalidModel(format!(
                    "duplicate transition INIT -> {}",
                    self.states[to].name
                )));
            }
            init[to] = w;
        }

        let declares_end = self.states.iter().any(|s| s.end.is_some());
        let mut states = Vec::with_capacity(n);
        let mut has_duration = false;
        for spec in &self.states {
            if spec.emissions.is_empty() {
                return Err(TrellisError::InvalidModel(format!(
                    "state {} has no emission",
                    spec.name
                )));
            }
            let emissions = spec
                .emissions
                .iter()
                .map(|(kind, values)| {
                    if values.len() != self.alphabet_size {
                        return Err(TrellisError::InvalidModel(format!(
                            "state {} emission has {} symbols, alphabet has {}",
                            spec.name,
                            values.len(),
                            self.alphabet_size
                        )));
                    }
                    Emission::new(*kind, values)
                })
                .collect::<Result<Vec<_>>>()?;

            let standard = spec.edges.iter().filter_map(|(_, e)| match e {
                EdgeSpec::Standard(kind, value) => Some((*kind, *value)),
                _ => None,
            });
            let (mut standard_logs, end_log) = normalize_counts(standard, spec.end)?;
            standard_logs.reverse();

            let mut transitions: Vec<Transition> = Vec::with_capacity(spec.edges.len());
            for (to_name, edge) in &spec.edges {
                let to = resolve(to_name, &spec.name)?;
                if transitions.iter().any(|t| t.to == to) {
                    return Err(TrellisError::InvalidModel(format!(
                        "duplicate transition {} -> {}",
                        spec.name, to_name
                    )));
                }
                let kind = match edge {
                    EdgeSpec::Standard(..) => {
                        TransitionKind::Standard(standard_logs.pop().unwrap_or(f64::NEG_INFINITY))
                    }
                    EdgeSpec::Duration(kind, values) => {
                        has_duration = true;
                        TransitionKind::Duration(DurationTable::new(*kind, values)?)
                    }
                    EdgeSpec::Lexical(kind, values) => {
                        if values.len() != self.alphabet_size {
                            return Err(TrellisError::InvalidModel(format!(
                                "lexical transition {} -> {} has {} symbols, alphabet has {}",
                                spec.name,
                                to_name,
                                values.len(),
                                self.alphabet_size
                            )));
                        }
                        TransitionKind::Lexical(LexicalTable::new(*kind, values)?)
                    }
                };
                transitions.push(Transition { to, kind });
            }

            let end = match end_log {
                Some(w) => w,
                None if declares_end => f64::NEG_INFINITY,
                None => 0.0,
            };
            states.push(State {
                name: spec.name.clone(),
                label: spec.label.clone(),
                transitions,
                end,
                emissions,
            });
        }

        let mut incoming = vec![Vec::new(); n];
        for (from, state) in states.iter().enumerate() {
            for (transition, t) in state.transitions.iter().enumerate() {
                incoming[t.to].push(Incoming { from, transition });
            }
        }

        Ok(Model {
            alphabet_size: self.alphabet_size,
            init,
            states,
            incoming,
            has_duration,
        })
    }
}

/// Converts a state's fixed weights (and optional END weight) to log space.
///
/// Count-valued entries are normalized together, END included when it is
/// itself a count; other kinds convert independently.
fn normalize_counts<I>(
    weights: I,
    end: Option<(ValueKind, f64)>,
) -> Result<(Vec<f64>, Option<f64>)>
where
    I: Iterator<Item = (ValueKind, f64)>,
{
    let weights: Vec<(ValueKind, f64)> = weights.collect();
    let all = weights.iter().chain(end.iter());
    let mut count_total = 0.0;
    for &(kind, value) in all {
        if value.is_nan() {
            return Err(TrellisError::InvalidModel("NaN transition weight".into()));
        }
        if kind == ValueKind::Counts {
            if value < 0.0 {
                return Err(TrellisError::InvalidModel("negative count".into()));
            }
            count_total += value;
        }
    }
    let convert = |(kind, value): (ValueKind, f64)| -> f64 {
        match kind {
            ValueKind::Counts if count_total > 0.0 => to_log(value / count_total),
            ValueKind::Counts => f64::NEG_INFINITY,
            other => other.to_log(value),
        }
    };
    let logs = weights.into_iter().map(convert).collect();
    Ok((logs, end.map(convert)))
}
