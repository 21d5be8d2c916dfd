//! Sweep implementations, one file per family. Each adds methods to
//! [`Trellis`](crate::Trellis) and shares its storage and cell helpers.

pub(crate) mod forward;
pub(crate) mod nth;
pub(crate) mod stochastic;
pub(crate) mod viterbi;
