use burn::prelude::{Backend, Tensor};

/// Score record of a hypothesis.
///
/// The normalized value ranks hypotheses of possibly different lengths against
/// each other; the unnormalized value is the raw summed log-probability, kept
/// for exact-match debugging against a training loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HypScore {
    pub normalized: f32,
    pub unnormalized: f32,
}

impl HypScore {
    /// Score with no distinct raw value: unnormalized defaults to normalized.
    pub fn new(normalized: f32) -> Self {
        Self {
            normalized,
            unnormalized: normalized,
        }
    }

    pub fn with_unnormalized(normalized: f32, unnormalized: f32) -> Self {
        Self {
            normalized,
            unnormalized,
        }
    }
}

/// Final result of one search, handed to the caller.
///
/// Built once when `generate` finishes and never mutated afterwards.
#[derive(Debug)]
pub struct SearchOutput<B: Backend, S> {
    /// Generated token ids, one sequence per batch element. Beam search
    /// results always carry a single sequence.
    pub token_ids: Vec<Vec<u32>>,
    /// Attention per step, shape = (n_batch, src_len) each.
    pub attentions: Vec<Tensor<B, 2>>,
    /// One score per batch element.
    pub scores: Vec<HypScore>,
    /// Log-probability of the chosen token per step, per batch element.
    pub log_probs: Vec<Vec<f32>>,
    /// Detached decoder-state snapshot per step.
    pub states: Vec<S>,
    /// Validity mask per step, per batch element: 1 for a real token, 0 for
    /// padding after the element produced end-of-sequence. The entry for step
    /// 0 is always all ones. Empty for beam search results, which are never
    /// padded.
    pub masks: Vec<Vec<u8>>,
}
