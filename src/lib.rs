//! Decoding engine for sequence-generation models.
//!
//! Given a scoring model that, at each step, produces a log-probability
//! distribution over a fixed vocabulary conditioned on decoder state and prior
//! output, the strategies in [`decoding`] produce one or more output token
//! sequences: greedy argmax decoding, beam search with length normalization,
//! and categorical sampling. The model itself stays behind the
//! [`scorer::StepScorer`] trait and is never inspected by the search core.

pub mod decoding;
pub mod error;
pub mod inference;
pub mod scorer;
pub mod vocab;

pub use error::{Error, Result};
