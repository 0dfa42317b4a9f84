use burn::prelude::Backend;
use serde::{Deserialize, Serialize};

use crate::decoding::{SearchOutput, SearchStrategy};
use crate::error::{Error, Result};
use crate::scorer::StepScorer;

/// What to do with the reference targets during decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferenceMode {
    /// Free decoding, keep the strategy's best hypotheses.
    OneBest,
    /// Teacher-forced decoding along the reference target.
    Forced,
    /// Forced decoding, plus a consistency check of the reconstructed score
    /// against an externally computed reference loss.
    ForcedDebug,
}

/// One pre-encoded source sentence handed to [`SimpleInference::run`].
///
/// Corpus reading, tokenization and detokenization happen outside this crate;
/// by the time a sentence arrives here it is an initial decoder state plus
/// optional reference data.
pub struct InferenceItem<S> {
    /// Decoder state produced by encoding the source sentence.
    pub initial_state: S,
    /// Source length, for normalization schemes that scale by it.
    pub src_length: Option<usize>,
    /// Reference target ids; required by the forced modes.
    pub reference: Option<Vec<u32>>,
    /// Externally computed reference score for `ForcedDebug` (the negated
    /// training loss of the reference under the same model).
    pub ref_score: Option<f32>,
}

impl<S> InferenceItem<S> {
    pub fn new(initial_state: S) -> Self {
        Self {
            initial_state,
            src_length: None,
            reference: None,
            ref_score: None,
        }
    }

    pub fn with_reference(mut self, reference: Vec<u32>) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_src_length(mut self, src_length: usize) -> Self {
        self.src_length = Some(src_length);
        self
    }

    pub fn with_ref_score(mut self, ref_score: f32) -> Self {
        self.ref_score = Some(ref_score);
        self
    }
}

/// Drives a search strategy over a sequence of sentences.
pub struct SimpleInference {
    pub mode: InferenceMode,
    /// When set, warn about reference targets longer than this; forcing past
    /// the strategy's step cap truncates the reconstructed score.
    pub max_len: Option<usize>,
}

impl SimpleInference {
    pub fn new(mode: InferenceMode) -> Self {
        Self {
            mode,
            max_len: None,
        }
    }

    pub fn with_max_len(mode: InferenceMode, max_len: usize) -> Self {
        Self {
            mode,
            max_len: Some(max_len),
        }
    }

    /// Decode every item with `strategy`, in order.
    ///
    /// In the forced modes the reference target of each item overrides token
    /// choice. In `ForcedDebug`, each reconstructed raw score is compared to
    /// the item's `ref_score` with a relative tolerance of 1e-5; mismatches
    /// are logged, not raised, so one bad sentence cannot abort a run.
    pub fn run<B, T>(
        &self,
        scorer: &T,
        strategy: &dyn SearchStrategy<B, T>,
        items: Vec<InferenceItem<T::State>>,
    ) -> Result<Vec<Vec<SearchOutput<B, T::State>>>>
    where
        B: Backend,
        T: StepScorer<B>,
    {
        if let Some(max_len) = self.max_len {
            let too_long = items
                .iter()
                .any(|item| item.reference.as_ref().is_some_and(|r| r.len() > max_len));
            if too_long {
                log::warn!(
                    "forced decoding with some targets longer than max_len {max_len}; \
                     increase max_len to avoid unexpected behavior"
                );
            }
        }

        let forced_mode = matches!(self.mode, InferenceMode::Forced | InferenceMode::ForcedDebug);
        let mut results = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let forced: Option<Vec<Vec<u32>>> = if forced_mode {
                match item.reference {
                    Some(reference) => Some(vec![reference]),
                    None => {
                        return Err(Error::Config {
                            reason: format!("{:?} mode requires a reference target for every sentence", self.mode),
                        })
                    }
                }
            } else {
                None
            };

            let outputs = strategy.generate(scorer, item.initial_state, item.src_length, forced.as_deref())?;
            if self.mode == InferenceMode::ForcedDebug {
                if let (Some(output), Some(ref_score)) = (outputs.first(), item.ref_score) {
                    if let Some(score) = output.scores.first() {
                        let got = score.unnormalized;
                        if ((got - ref_score) / ref_score).abs() > 1e-5 {
                            log::error!(
                                "forced decoding score {got} and loss {ref_score} do not match at sentence {i}"
                            );
                        }
                    }
                }
            }
            results.push(outputs);
        }
        Ok(results)
    }
}
