use burn::prelude::{Backend, Tensor};

use crate::error::Result;

/// Everything the model produces for a single decode step.
pub struct StepOutput<B: Backend, S> {
    /// Decoder state after consuming the previous token.
    pub state: S,
    /// Log-probability distribution over the vocabulary, shape = (n_batch, vocab_size).
    pub log_probs: Tensor<B, 2>,
    /// Attention over the source sequence, shape = (n_batch, src_len).
    pub attention: Tensor<B, 2>,
}

/// The scoring model driven by a search strategy.
///
/// A search strategy calls [`StepScorer::step`] once per generated token and
/// never looks inside the decoder state; it only threads the state through
/// successive calls and keeps references around for backtracing.
pub trait StepScorer<B: Backend> {
    /// Opaque decoder state. Created by the scorer, held by the search core
    /// for the lifetime of a hypothesis.
    type State: Clone;

    /// Compute the next token distribution.
    ///
    /// ## Args
    /// - `prev_tokens` : the tokens chosen at the previous step, one per batch
    ///   element. `None` only for the very first call. Greedy and sampling
    ///   search pass full batches; beam search calls with a single element per
    ///   active hypothesis.
    /// - `state` : decoder state produced by the previous call (or the initial
    ///   state supplied to `generate`).
    ///
    /// ## Returns
    /// The new state, the log-probability distribution and the attention
    /// vector for this step. Errors are propagated unchanged out of
    /// `generate`; the search core never retries a failed step.
    fn step(&self, prev_tokens: Option<&[u32]>, state: &Self::State) -> Result<StepOutput<B, Self::State>>;

    /// Detached snapshot of `state`, cut off from any autodiff graph.
    ///
    /// Recorded per step in `SearchOutput::states` for auxiliary training
    /// signals (e.g. reinforce baselines); never used for generation itself.
    fn detach_state(&self, state: &Self::State) -> Self::State;
}
