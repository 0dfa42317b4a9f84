pub mod beam;
pub mod greedy;
pub mod length_norm;
pub mod output;
pub mod sampling;

#[cfg(test)]
pub(crate) mod testing;

pub use beam::BeamSearch;
pub use greedy::GreedySearch;
pub use length_norm::{
    AdditiveNormalization, HypView, LengthNormalization, NoNormalization, PolynomialNormalization,
};
pub use output::{HypScore, SearchOutput};
pub use sampling::SamplingSearch;

use burn::prelude::{Backend, Tensor};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scorer::StepScorer;

/// A strategy for generating output sequences from a step-wise scoring model.
///
/// One entry point, polymorphic over the greedy, beam and sampling variants.
pub trait SearchStrategy<B: Backend, T: StepScorer<B>> {
    /// Generate output sequences.
    ///
    /// ## Args
    /// - `scorer` : the scoring model ("the translator").
    /// - `initial_state` : decoder state before any token has been produced.
    /// - `src_length` : length of the source sequence, required only by
    ///   normalization schemes that scale by it.
    /// - `forced_tokens` : optional target sequences, one per batch element.
    ///   When given, token choice is overridden by the forced value at every
    ///   step, but the model's score for that token is still recorded.
    ///
    /// ## Returns
    /// A non-empty list of [`SearchOutput`]: one entry for greedy and one-best
    /// beam search, up to beam-width or sample-count otherwise. Scorer errors
    /// are propagated unchanged; there is no retry.
    fn generate(
        &self,
        scorer: &T,
        initial_state: T::State,
        src_length: Option<usize>,
        forced_tokens: Option<&[Vec<u32>]>,
    ) -> Result<Vec<SearchOutput<B, T::State>>>;
}

/// Declarative description of a search strategy, the way a decoding run is
/// configured from the outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchConfig {
    Greedy {
        #[serde(default = "default_max_len")]
        max_len: usize,
    },
    Beam {
        #[serde(default = "default_beam_size")]
        beam_size: usize,
        #[serde(default = "default_max_len")]
        max_len: usize,
        #[serde(default)]
        len_norm: LengthNormConfig,
        #[serde(default = "default_one_best")]
        one_best: bool,
    },
    Sampling {
        #[serde(default = "default_max_len")]
        max_len: usize,
        #[serde(default = "default_sample_size")]
        sample_size: usize,
        #[serde(default)]
        seed: u64,
    },
}

/// Declarative description of a [`LengthNormalization`] scheme.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LengthNormConfig {
    #[default]
    None,
    Additive {
        penalty: f32,
    },
    Polynomial {
        m: f32,
        apply_during_search: bool,
    },
}

fn default_max_len() -> usize {
    100
}

fn default_beam_size() -> usize {
    1
}

fn default_one_best() -> bool {
    true
}

fn default_sample_size() -> usize {
    5
}

impl LengthNormConfig {
    pub fn build(&self) -> Box<dyn LengthNormalization> {
        match *self {
            LengthNormConfig::None => Box::new(NoNormalization),
            LengthNormConfig::Additive { penalty } => Box::new(AdditiveNormalization { penalty }),
            LengthNormConfig::Polynomial {
                m,
                apply_during_search,
            } => Box::new(PolynomialNormalization::new(m, apply_during_search)),
        }
    }
}

impl SearchConfig {
    /// Build the runtime strategy this config describes.
    pub fn build<B, T>(&self) -> Box<dyn SearchStrategy<B, T>>
    where
        B: Backend,
        T: StepScorer<B>,
    {
        match self {
            SearchConfig::Greedy { max_len } => Box::new(GreedySearch::new(*max_len)),
            SearchConfig::Beam {
                beam_size,
                max_len,
                len_norm,
                one_best,
            } => Box::new(BeamSearch::new(
                *beam_size,
                *max_len,
                len_norm.build(),
                *one_best,
            )),
            SearchConfig::Sampling {
                max_len,
                sample_size,
                seed,
            } => Box::new(SamplingSearch::new(*max_len, *sample_size, *seed)),
        }
    }
}

/// Pull a (n_rows, n_cols) tensor off the device into per-row f32 vectors.
pub(crate) fn tensor_rows<B: Backend>(t: &Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [n_rows, n_cols] = t.dims();
    let data = t.clone().into_data().value;
    (0..n_rows)
        .map(|r| {
            data[r * n_cols..(r + 1) * n_cols]
                .iter()
                .map(|x| x.to_f32().unwrap())
                .collect()
        })
        .collect()
}

/// Index of the largest value; ties go to the lowest index.
pub(crate) fn argmax(row: &[f32]) -> u32 {
    let mut best = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in row.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best as u32
}

/// Per-step token lists, rearranged into one sequence per batch element.
pub(crate) fn transpose_steps(steps: &[Vec<u32>], n_batch: usize) -> Vec<Vec<u32>> {
    (0..n_batch)
        .map(|i| steps.iter().map(|step| step[i]).collect())
        .collect()
}
