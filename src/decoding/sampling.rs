use burn::prelude::{Backend, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::decoding::output::{HypScore, SearchOutput};
use crate::decoding::{tensor_rows, transpose_steps, SearchStrategy};
use crate::error::{Error, Result};
use crate::scorer::StepScorer;
use crate::vocab::Vocab;

/// Draws tokens from the model's categorical distribution instead of taking
/// the argmax, repeated `sample_size` times to produce independent samples.
///
/// A forced target, when given, is honored only for sample 0; the remaining
/// samples explore freely. This yields one forced trajectory's score alongside
/// free samples in a single call.
pub struct SamplingSearch {
    /// Hard cap on the number of generated tokens per sample.
    pub max_len: usize,
    /// Number of independent samples to draw.
    pub sample_size: usize,
    /// Seed for the categorical draws. A fresh generator is built from it at
    /// the top of every `generate` call, so repeated calls are reproducible
    /// and the strategy stays free of shared mutable state.
    pub seed: u64,
}

impl SamplingSearch {
    pub fn new(max_len: usize, sample_size: usize, seed: u64) -> Self {
        Self {
            max_len,
            sample_size,
            seed,
        }
    }

    fn sample_one<B, T>(
        &self,
        scorer: &T,
        initial_state: T::State,
        forced_tokens: Option<&[Vec<u32>]>,
        rng: &mut StdRng,
    ) -> Result<SearchOutput<B, T::State>>
    where
        B: Backend,
        T: StepScorer<B>,
    {
        let mut samples: Vec<Vec<u32>> = Vec::new();
        let mut attentions: Vec<Tensor<B, 2>> = Vec::new();
        let mut log_probs: Vec<Vec<f32>> = Vec::new();
        let mut states: Vec<T::State> = Vec::new();
        let mut masks: Vec<Vec<u8>> = Vec::new();
        let mut done: Option<Vec<bool>> = None;
        let mut state = initial_state;

        for length in 0..self.max_len {
            let prev = if length > 0 {
                Some(samples[length - 1].as_slice())
            } else {
                None
            };
            let output = scorer.step(prev, &state)?;
            state = output.state.clone();

            let rows = tensor_rows(&output.log_probs);
            let n_batch = rows.len();
            let mut words: Vec<u32> = match forced_tokens {
                Some(forced) => {
                    if forced.len() != n_batch {
                        return Err(Error::Config {
                            reason: format!(
                                "{} forced sequences for a batch of {n_batch}",
                                forced.len()
                            ),
                        });
                    }
                    (0..n_batch)
                        .map(|i| forced[i].get(length).copied().unwrap_or(Vocab::ES))
                        .collect()
                }
                None => rows
                    .iter()
                    .map(|row| sample_categorical(rng, row))
                    .collect(),
            };

            let mut picked: Vec<f32> = words
                .iter()
                .zip(rows.iter())
                .map(|(&w, row)| row[w as usize])
                .collect();
            if let Some(done) = &done {
                let mask: Vec<u8> = done.iter().map(|&d| u8::from(!d)).collect();
                for i in 0..n_batch {
                    if done[i] {
                        words[i] = Vocab::ES;
                        picked[i] = 0.0;
                    }
                }
                masks.push(mask);
            }

            log_probs.push(picked);
            attentions.push(output.attention);
            states.push(scorer.detach_state(&state));

            let finished: Vec<bool> = words.iter().map(|&w| w == Vocab::ES).collect();
            samples.push(words);
            let all_done = finished.iter().all(|&d| d);
            done = Some(finished);
            if all_done {
                break;
            }
        }

        let n_batch = done.as_ref().map_or(0, Vec::len);
        masks.insert(0, vec![1; n_batch]);

        let mut scores = vec![0.0f32; n_batch];
        for step in &log_probs {
            for (total, s) in scores.iter_mut().zip(step) {
                *total += s;
            }
        }

        Ok(SearchOutput {
            token_ids: transpose_steps(&samples, n_batch),
            attentions,
            scores: scores.into_iter().map(HypScore::new).collect(),
            log_probs,
            states,
            masks,
        })
    }
}

impl Default for SamplingSearch {
    fn default() -> Self {
        Self::new(100, 5, 0)
    }
}

impl<B: Backend, T: StepScorer<B>> SearchStrategy<B, T> for SamplingSearch {
    fn generate(
        &self,
        scorer: &T,
        initial_state: T::State,
        _src_length: Option<usize>,
        forced_tokens: Option<&[Vec<u32>]>,
    ) -> Result<Vec<SearchOutput<B, T::State>>> {
        if self.max_len == 0 {
            return Err(Error::Config {
                reason: "max_len must be positive".to_owned(),
            });
        }
        if self.sample_size == 0 {
            return Err(Error::Config {
                reason: "sample_size must be positive".to_owned(),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut outputs = Vec::with_capacity(self.sample_size);
        for k in 0..self.sample_size {
            let forced = if k == 0 { forced_tokens } else { None };
            outputs.push(self.sample_one(scorer, initial_state.clone(), forced, &mut rng)?);
        }
        Ok(outputs)
    }
}

/// Draw one index from the categorical distribution `exp(log_probs)`.
fn sample_categorical<R: Rng>(rng: &mut R, log_probs: &[f32]) -> u32 {
    let draw: f32 = rng.gen();
    let mut acc = 0.0f32;
    for (i, lp) in log_probs.iter().enumerate() {
        acc += lp.exp();
        if draw < acc {
            return i as u32;
        }
    }
    // Rounding can leave the accumulated mass a hair below the draw.
    (log_probs.len() - 1) as u32
}
