//! Stochastic sweeps: fill a [`StochTable`] alongside the usual recursion so
//! that paths can later be sampled with [`Trellis::stochastic_traceback`].
//!
//! Both sweeps push, for every reachable cell `(p, s)`, one entry per
//! predecessor `s'` weighted by `score(p-1, s') + t(s'→s, p)`. The emission
//! at `(p, s)` is shared by the whole group and cancels on normalization.
//! A final bucket at position `len` weighs each last state by its score
//! plus its END weight.

use crate::error::Result;
use crate::stoch::StochTable;
use crate::trellis::{SweepMode, Trellis};

impl<'m> Trellis<'m> {
    /// Viterbi sweep that also records max-product predecessor weights.
    ///
    /// Returns the best path's log score. Sampled paths favour predecessors
    /// in proportion to the best score through them.
    pub fn stochastic_viterbi(&mut self) -> Result<f64> {
        self.begin()?;
        #[cfg(feature = "tracing")]
        let _span = self.sweep_span(SweepMode::StochasticViterbi).entered();

        let mut table = self.fresh_stoch_table()?;
        let reuse_scores = self.viterbi_score.take();
        let reuse_tb = self.traceback_table.take();
        let pass = self.viterbi_pass(reuse_scores, reuse_tb, Some(&mut table))?;
        table.finalize()?;
        self.stoch_table = Some(table);
        Ok(self.store_viterbi(pass, SweepMode::StochasticViterbi))
    }

    /// Forward sweep that records sum-product predecessor weights.
    ///
    /// Returns the total log-likelihood. Sampled paths follow the exact
    /// posterior distribution over paths.
    pub fn stochastic_forward(&mut self) -> Result<f64> {
        self.begin()?;
        #[cfg(feature = "tracing")]
        let _span = self.sweep_span(SweepMode::StochasticForward).entered();

        self.ensure_run_lengths()?;
        let mut table = self.fresh_stoch_table()?;
        let reuse = self.forward_score.take();
        let pass = self.forward_pass(reuse, None, Some(&mut table))?;
        table.finalize()?;
        self.stoch_table = Some(table);
        self.forward_score = Some(pass.scores);
        self.ending_forward = pass.total;
        Ok(self.complete(SweepMode::StochasticForward, pass.total))
    }

    /// Reserves one entry per edge per position up front.
    fn fresh_stoch_table(&self) -> Result<StochTable> {
        let len = self.len();
        let edges: usize = (0..self.model.state_count())
            .map(|s| self.model.incoming(s).len())
            .sum();
        Ok(StochTable::try_with_capacity(
            len + 1,
            len.saturating_mul(edges),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::model::{ModelBuilder, StateSpec, ValueKind};
    use crate::{SweepMode, Trellis, TrellisError};

    /// Two states that can each follow the other, emitting one symbol.
    fn coin() -> crate::Model {
        ModelBuilder::new(1)
            .init_transition("H", ValueKind::Probability, 0.5)
            .init_transition("T", ValueKind::Probability, 0.5)
            .state(
                StateSpec::new("H")
                    .transition("H", ValueKind::Probability, 0.75)
                    .transition("T", ValueKind::Probability, 0.25)
                    .emission(ValueKind::Probability, vec![1.0]),
            )
            .state(
                StateSpec::new("T")
                    .transition("H", ValueKind::Probability, 0.25)
                    .transition("T", ValueKind::Probability, 0.75)
                    .emission(ValueKind::Probability, vec![1.0]),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn forward_samples_follow_path_posterior() {
        let model = coin();
        let obs = vec![0usize; 2];
        let mut t = Trellis::new(&model, &obs).unwrap();
        let total = t.stochastic_forward().unwrap();
        assert!(total.abs() < 1e-12);

        // P(HH) = 0.5 * 0.75
        let mut rng = StdRng::seed_from_u64(5);
        let multi = t.stochastic_tracebacks(&mut rng, 20_000).unwrap();
        let freq = multi.count(&[0, 0]) as f64 / multi.total() as f64;
        assert!((freq - 0.375).abs() < 0.02, "HH drawn with frequency {freq}");
        assert_eq!(multi.distinct(), 4);
    }

    #[test]
    fn viterbi_sweep_keeps_best_path_queries() {
        let model = coin();
        let obs = vec![0usize; 3];
        let mut t = Trellis::new(&model, &obs).unwrap();
        let score = t.stochastic_viterbi().unwrap();
        assert_eq!(t.viterbi_score().unwrap(), score);
        assert_eq!(t.traceback().unwrap().states(), &[0, 0, 0]);

        let mut rng = StdRng::seed_from_u64(9);
        let path = t.stochastic_traceback(&mut rng).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.score(), Some(model.path_score(&obs, path.states())));
        assert!(t.stoch_table().unwrap().is_finalized());
    }

    #[test]
    fn sampling_requires_a_stochastic_sweep() {
        let model = coin();
        let obs = vec![0usize; 2];
        let mut t = Trellis::new(&model, &obs).unwrap();
        t.forward().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            t.stochastic_traceback(&mut rng),
            Err(TrellisError::WrongMode {
                found: SweepMode::Forward,
                ..
            })
        ));
    }

    #[test]
    fn unexplained_sequence_has_no_sample() {
        let model = ModelBuilder::new(2)
            .init_transition("A", ValueKind::Probability, 1.0)
            .state(
                StateSpec::new("A")
                    .transition("A", ValueKind::Probability, 1.0)
                    .emission(ValueKind::Probability, vec![1.0, 0.0]),
            )
            .build()
            .unwrap();
        let obs = vec![1usize, 1];
        let mut t = Trellis::new(&model, &obs).unwrap();
        assert_eq!(t.stochastic_forward().unwrap(), f64::NEG_INFINITY);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            t.stochastic_traceback(&mut rng),
            Err(TrellisError::NoPath)
        ));
    }
}
