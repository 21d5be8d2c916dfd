//! Stochastic trellis decoding for generalized hidden Markov models.
//!
//! This crate decodes a digitized symbol sequence against an HMM whose
//! transitions may be plain weights, run-length (duration) tables or
//! symbol-keyed (lexical) tables. All arithmetic is in natural-log space.
//!
//! ## Core idea
//! 1. Describe the model with [`ModelBuilder`] and [`StateSpec`].
//! 2. Wrap the model and a sequence in a [`Trellis`].
//! 3. Run one sweep ([`Trellis::viterbi`], [`Trellis::forward`],
//!    [`Trellis::posterior`], [`Trellis::stochastic_forward`],
//!    [`Trellis::nth_viterbi`], ...), then query its results.
//!
//! A trellis holds the tables of exactly one sweep. Queries that do not
//! match the completed [`SweepMode`] fail with [`TrellisError::WrongMode`];
//! call [`Trellis::reset`] before the next sweep.
//!
//! ## Quick start
//! ```
//! use stoch_trellis::{ModelBuilder, StateSpec, Trellis, ValueKind};
//!
//! let model = ModelBuilder::new(2)
//!     .init_transition("A", ValueKind::Probability, 1.0)
//!     .state(
//!         StateSpec::new("A")
//!             .transition("B", ValueKind::Probability, 1.0)
//!             .emission(ValueKind::Probability, vec![0.8, 0.2]),
//!     )
//!     .state(
//!         StateSpec::new("B")
//!             .transition("B", ValueKind::Probability, 1.0)
//!             .end(ValueKind::Probability, 1.0)
//!             .emission(ValueKind::Probability, vec![0.3, 0.7]),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let seq = vec![0usize, 1, 1, 0];
//! let mut trellis = Trellis::new(&model, &seq).unwrap();
//! let score = trellis.viterbi().unwrap();
//! let path = trellis.traceback().unwrap();
//! assert_eq!(path.states(), &[0, 1, 1, 1]);
//! let expected = 0.8f64.ln() + 0.7f64.ln() + 0.7f64.ln() + 0.3f64.ln();
//! assert!((score - expected).abs() < 1e-12);
//! ```
//!
//! ## Sampling
//! The stochastic sweeps fill a [`StochTable`] that compactly stores, for
//! every cell, the normalized distribution over its predecessors. Paths are
//! then drawn with any [`rand::Rng`]:
//! ```
//! # use stoch_trellis::{ModelBuilder, StateSpec, Trellis, ValueKind};
//! use rand::{rngs::StdRng, SeedableRng};
//! # let model = ModelBuilder::new(1)
//! #     .init_transition("A", ValueKind::Probability, 1.0)
//! #     .state(StateSpec::new("A")
//! #         .transition("A", ValueKind::Probability, 1.0)
//! #         .emission(ValueKind::Probability, vec![1.0]))
//! #     .build()
//! #     .unwrap();
//! let seq = vec![0usize; 3];
//! let mut trellis = Trellis::new(&model, &seq).unwrap();
//! trellis.stochastic_forward().unwrap();
//! let mut rng = StdRng::seed_from_u64(42);
//! let path = trellis.stochastic_traceback(&mut rng).unwrap();
//! assert_eq!(path.states(), &[0, 0, 0]);
//! ```

mod algorithms;
pub mod builder;
pub mod error;
pub mod logspace;
pub mod model;
pub mod path;
pub mod stoch;
pub mod tables;
pub mod traits;
pub mod trellis;

pub use crate::builder::{TrellisBuilder, TrellisOptions};
pub use crate::error::{Result, StochError, TrellisError};
pub use crate::model::{Model, ModelBuilder, StateSpec, ValueKind};
pub use crate::path::{MultiTraceback, TracebackPath};
pub use crate::stoch::StochTable;
pub use crate::traits::{DigitizedSequence, PathReceiver};
pub use crate::trellis::{SweepMode, Trellis};
