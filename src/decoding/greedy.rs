use burn::prelude::{Backend, Tensor};

use crate::decoding::output::{HypScore, SearchOutput};
use crate::decoding::{argmax, tensor_rows, transpose_steps, SearchStrategy};
use crate::error::{Error, Result};
use crate::scorer::StepScorer;
use crate::vocab::Vocab;

/// Greedy search: the argmax token at every step, batched.
///
/// Equivalent to beam search with beam size 1, but runs all batch elements
/// through the scorer together. Elements that already produced
/// end-of-sequence keep emitting it with a zero-masked score contribution
/// until the whole batch has finished or `max_len` is reached.
pub struct GreedySearch {
    /// Hard cap on the number of generated tokens.
    pub max_len: usize,
}

impl GreedySearch {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Default for GreedySearch {
    fn default() -> Self {
        Self::new(100)
    }
}

impl<B: Backend, T: StepScorer<B>> SearchStrategy<B, T> for GreedySearch {
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

        let mut word_ids: Vec<Vec<u32>> = Vec::new();
        let mut attentions: Vec<Tensor<B, 2>> = Vec::new();
        let mut step_scores: Vec<Vec<f32>> = Vec::new();
        let mut log_probs: Vec<Vec<f32>> = Vec::new();
        let mut states: Vec<T::State> = Vec::new();
        let mut masks: Vec<Vec<u8>> = Vec::new();
        let mut done: Option<Vec<bool>> = None;
        let mut state = initial_state;

        for length in 0..self.max_len {
            let prev = if length > 0 {
                Some(word_ids[length - 1].as_slice())
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
                None => rows.iter().map(|row| argmax(row)).collect(),
            };

            // Score of the chosen word, before the done-override below.
            let mut masked: Vec<f32> = words
                .iter()
                .zip(rows.iter())
                .map(|(&w, row)| row[w as usize])
                .collect();
            if let Some(done) = &done {
                let mask: Vec<u8> = done.iter().map(|&d| u8::from(!d)).collect();
                for i in 0..n_batch {
                    if done[i] {
                        words[i] = Vocab::ES;
                        masked[i] = 0.0;
                    }
                }
                masks.push(mask);
            }

            step_scores.push(masked);
            log_probs.push(
                words
                    .iter()
                    .zip(rows.iter())
                    .map(|(&w, row)| row[w as usize])
                    .collect(),
            );
            attentions.push(output.attention);
            states.push(scorer.detach_state(&state));

            let finished: Vec<bool> = words.iter().map(|&w| w == Vocab::ES).collect();
            word_ids.push(words);
            let all_done = finished.iter().all(|&d| d);
            done = Some(finished);
            if all_done {
                break;
            }
        }

        let n_batch = done.as_ref().map_or(0, Vec::len);
        masks.insert(0, vec![1; n_batch]);

        let mut scores = vec![0.0f32; n_batch];
        for step in &step_scores {
            for (total, s) in scores.iter_mut().zip(step) {
                *total += s;
            }
        }

        Ok(vec![SearchOutput {
            token_ids: transpose_steps(&word_ids, n_batch),
            attentions,
            scores: scores.into_iter().map(HypScore::new).collect(),
            log_probs,
            states,
            masks,
        }])
    }
}

#[cfg(test)]
mod test {
    use super::GreedySearch;
    use crate::decoding::testing::{FailingScorer, PeakScorer, StaggeredScorer};
    use crate::decoding::SearchStrategy;
    use crate::error::Error;
    use crate::vocab::Vocab;

    #[test]
    fn follows_the_peak_until_end_of_sequence() {
        // Peak at id 3 on step 0, at ES from step 1 on.
        let scorer = PeakScorer::new(5, 3, 1);
        let outputs = GreedySearch::new(10).generate(&scorer, 0, None, None).unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].token_ids, vec![vec![3, Vocab::ES]]);
        let expected = scorer.log_prob_of(0, 3) + scorer.log_prob_of(1, Vocab::ES);
        assert!((outputs[0].scores[0].unnormalized - expected).abs() < 1e-6);
        assert_eq!(outputs[0].masks, vec![vec![1], vec![1]]);
        assert_eq!(outputs[0].states.len(), 2);
    }

    #[test]
    fn stops_at_max_len_without_end_of_sequence() {
        let scorer = PeakScorer::new(5, 3, 1000);
        let outputs = GreedySearch::new(7).generate(&scorer, 0, None, None).unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].token_ids[0].len(), 7);
        assert_eq!(outputs[0].masks.len(), 7);
        assert!(outputs[0].masks.iter().all(|m| m == &vec![1]));
    }

    #[test]
    fn finished_batch_elements_are_padded_and_masked() {
        // Element 0 hits ES at step 1, element 1 at step 3.
        let scorer = StaggeredScorer::new(5, vec![1, 3]);
        let outputs = GreedySearch::new(10).generate(&scorer, 0, None, None).unwrap();
        let out = &outputs[0];

        assert_eq!(out.token_ids[0], vec![3, Vocab::ES, Vocab::ES, Vocab::ES]);
        assert_eq!(out.token_ids[1], vec![3, 3, 3, Vocab::ES]);
        // Once element 0 finished at step 1, every later step is masked out.
        assert_eq!(out.masks, vec![vec![1, 1], vec![1, 1], vec![0, 1], vec![0, 1]]);
        // Masked steps contribute nothing to the score.
        let expected0 = scorer.log_prob_of(0, 0, 3) + scorer.log_prob_of(1, 0, Vocab::ES);
        assert!((out.scores[0].unnormalized - expected0).abs() < 1e-6);
    }

    #[test]
    fn forced_decoding_reproduces_the_target() {
        let scorer = PeakScorer::new(5, 3, 1000);
        let forced = vec![vec![4, 2, Vocab::ES]];
        let outputs = GreedySearch::new(10)
            .generate(&scorer, 0, None, Some(&forced))
            .unwrap();

        assert_eq!(outputs[0].token_ids, vec![vec![4, 2, Vocab::ES]]);
        let expected = scorer.log_prob_of(0, 4) + scorer.log_prob_of(1, 2) + scorer.log_prob_of(2, Vocab::ES);
        assert!((outputs[0].scores[0].unnormalized - expected).abs() < 1e-6);
    }

    #[test]
    fn forced_batch_width_must_match() {
        let scorer = PeakScorer::new(5, 3, 1);
        let forced = vec![vec![3, Vocab::ES], vec![3, Vocab::ES]];
        let err = GreedySearch::new(10)
            .generate(&scorer, 0, None, Some(&forced))
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn zero_max_len_is_a_config_error() {
        let scorer = PeakScorer::new(5, 3, 1);
        let err = GreedySearch::new(0).generate(&scorer, 0, None, None).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn scorer_errors_propagate() {
        let scorer = FailingScorer::new(PeakScorer::new(5, 3, 1000), 2);
        let err = GreedySearch::new(10).generate(&scorer, 0, None, None).unwrap_err();
        assert!(matches!(err, Error::Scorer(_)));
    }
}
