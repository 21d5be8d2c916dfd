use crate::error::{Result, TrellisError};
use crate::model::Model;
use crate::traits::DigitizedSequence;
use crate::Trellis;

/// Knobs shared by every sweep of a [`Trellis`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrellisOptions {
    /// Keep the full Viterbi score table instead of two rolling rows.
    pub store_values: bool,
    /// Paths retained per cell by [`Trellis::nth_viterbi_default`].
    pub nbest: usize,
}

impl Default for TrellisOptions {
    fn default() -> Self {
        Self {
            store_values: false,
            nbest: 1,
        }
    }
}

pub struct TrellisBuilder {
    options: TrellisOptions,
}

impl TrellisBuilder {
    pub fn new() -> Self {
        Self {
            options: TrellisOptions::default(),
        }
    }
    pub fn store_values(mut self, store: bool) -> Self {
        self.options.store_values = store;
        self
    }
    pub fn nbest(mut self, k: usize) -> Self {
        self.options.nbest = k;
        self
    }
    pub fn options(&self) -> TrellisOptions {
        self.options
    }
    pub fn build<'m, S>(self, model: &'m Model, seq: &S) -> Result<Trellis<'m>>
    where
        S: DigitizedSequence + ?Sized,
    {
        if self.options.nbest == 0 {
            return Err(TrellisError::InvalidOption("nbest must be positive".into()));
        }
        Trellis::with_options(model, seq, self.options)
    }
}

impl Default for TrellisBuilder {
    fn default() -> Self {
        Self::new()
    }
}
