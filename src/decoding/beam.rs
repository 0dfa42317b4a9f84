use std::cmp::Ordering;
use std::rc::Rc;

use burn::prelude::Backend;

use crate::decoding::length_norm::{HypView, LengthNormalization, NoNormalization};
use crate::decoding::output::{HypScore, SearchOutput};
use crate::decoding::{tensor_rows, SearchStrategy};
use crate::error::{Error, Result};
use crate::scorer::{StepOutput, StepScorer};
use crate::vocab::Vocab;

/// One node in the hypothesis tree.
///
/// Nodes live in an append-only arena and are never mutated after creation;
/// `parent` is an arena index, so siblings can share a parent without any
/// pointer aliasing. Sibling candidates expanded from the same scorer call
/// share that call's [`StepOutput`] through an `Rc`.
struct Hypothesis<B: Backend, S> {
    /// Running normalized score.
    score: f32,
    /// Running raw summed log-probability.
    unnormalized: f32,
    /// Token chosen at this step; `None` only for the root.
    word: Option<u32>,
    /// Log-probability of that token under the parent's distribution.
    word_log_prob: f32,
    /// The step output that produced this node; `None` only for the root.
    output: Option<Rc<StepOutput<B, S>>>,
    /// Arena index of the parent; `None` only for the root.
    parent: Option<usize>,
    /// Generation step count, equal to the length of the parent chain.
    len: usize,
}

impl<B: Backend, S> Hypothesis<B, S> {
    fn root() -> Self {
        Self {
            score: 0.0,
            unnormalized: 0.0,
            word: None,
            word_log_prob: 0.0,
            output: None,
            parent: None,
            len: 0,
        }
    }
}

/// Beam search over a bounded frontier of partial hypotheses.
///
/// Each step expands every active hypothesis by its `beam_size` best next
/// tokens, re-ranks all candidates together and keeps the top `beam_size`.
/// Hypotheses that produced end-of-sequence move to the completed set and are
/// never expanded again.
pub struct BeamSearch {
    pub beam_size: usize,
    /// Hard cap on the number of generated tokens.
    pub max_len: usize,
    pub len_norm: Box<dyn LengthNormalization>,
    /// Return only the top hypothesis instead of all completed ones.
    pub one_best: bool,
}

impl BeamSearch {
    pub fn new(
        beam_size: usize,
        max_len: usize,
        len_norm: Box<dyn LengthNormalization>,
        one_best: bool,
    ) -> Self {
        Self {
            beam_size,
            max_len,
            len_norm,
            one_best,
        }
    }
}

impl Default for BeamSearch {
    fn default() -> Self {
        Self::new(1, 100, Box::new(NoNormalization), true)
    }
}

impl<B: Backend, T: StepScorer<B>> SearchStrategy<B, T> for BeamSearch {
    fn generate(
        &self,
        scorer: &T,
        initial_state: T::State,
        src_length: Option<usize>,
        forced_tokens: Option<&[Vec<u32>]>,
    ) -> Result<Vec<SearchOutput<B, T::State>>> {
        if self.beam_size == 0 {
            return Err(Error::Config {
                reason: "beam_size must be positive".to_owned(),
            });
        }
        if self.max_len == 0 {
            return Err(Error::Config {
                reason: "max_len must be positive".to_owned(),
            });
        }
        // Mixing a real beam with a forced target is not well-defined.
        let forced = match forced_tokens {
            None => None,
            Some(seqs) => {
                if self.beam_size != 1 {
                    return Err(Error::Config {
                        reason: format!(
                            "forced decoding requires beam_size 1, got {}",
                            self.beam_size
                        ),
                    });
                }
                if seqs.len() != 1 {
                    return Err(Error::Config {
                        reason: format!(
                            "beam search decodes a single sequence, got {} forced targets",
                            seqs.len()
                        ),
                    });
                }
                Some(seqs[0].as_slice())
            }
        };

        let mut arena: Vec<Hypothesis<B, T::State>> = vec![Hypothesis::root()];
        let mut active: Vec<usize> = vec![0];
        let mut completed: Vec<usize> = Vec::new();

        for length in 0..self.max_len {
            // Expanding further cannot improve the returned set.
            if completed.len() >= self.beam_size {
                break;
            }

            let mut candidates: Vec<usize> = Vec::new();
            for &hyp_idx in &active {
                let (prev_word, parent_score, parent_raw, parent_output) = {
                    let hyp = &arena[hyp_idx];
                    (hyp.word, hyp.score, hyp.unnormalized, hyp.output.clone())
                };
                // Finished hypotheses never reopen.
                if prev_word == Some(Vocab::ES) {
                    completed.push(hyp_idx);
                    continue;
                }

                let step_out = match (&prev_word, &parent_output) {
                    (Some(word), Some(output)) => {
                        Rc::new(scorer.step(Some(std::slice::from_ref(word)), &output.state)?)
                    }
                    _ => Rc::new(scorer.step(None, &initial_state)?),
                };
                let rows = tensor_rows(&step_out.log_probs);
                let row = &rows[0];

                let next_words: Vec<u32> = match forced {
                    Some(target) => vec![target.get(length).copied().unwrap_or(Vocab::ES)],
                    None => top_k(row, self.beam_size),
                };
                for word in next_words {
                    let log_prob = row[word as usize];
                    arena.push(Hypothesis {
                        score: self.len_norm.normalize_partial(parent_score, log_prob, length + 1),
                        unnormalized: parent_raw + log_prob,
                        word: Some(word),
                        word_log_prob: log_prob,
                        output: Some(Rc::clone(&step_out)),
                        parent: Some(hyp_idx),
                        len: length + 1,
                    });
                    candidates.push(arena.len() - 1);
                }
            }

            // New frontier: best candidates across all expansions this step.
            candidates.sort_by(|&a, &b| {
                arena[b]
                    .score
                    .partial_cmp(&arena[a].score)
                    .unwrap_or(Ordering::Equal)
            });
            candidates.truncate(self.beam_size);
            active = candidates;
            if active.is_empty() {
                break;
            }
        }

        // No hypothesis reached end-of-sequence: the cutoff frontier counts
        // as completed so the result is never empty.
        if completed.is_empty() {
            completed = active;
        }

        let views: Vec<HypView> = completed
            .iter()
            .map(|&i| HypView {
                score: arena[i].score,
                unnormalized: arena[i].unnormalized,
                len: arena[i].len,
            })
            .collect();
        let final_scores = self.len_norm.normalize_completed(&views, src_length);
        let mut ranked: Vec<(usize, f32)> = completed.into_iter().zip(final_scores).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        // A single step can complete several frontier hypotheses at once, so
        // the completed set may briefly overshoot the beam width; never return
        // more than beam_size results.
        ranked.truncate(if self.one_best { 1 } else { self.beam_size });

        let mut results = Vec::with_capacity(ranked.len());
        for (leaf, final_score) in ranked {
            let mut words = Vec::new();
            let mut attentions = Vec::new();
            let mut log_probs = Vec::new();
            let mut states = Vec::new();
            let mut cursor = leaf;
            while let Some(parent) = arena[cursor].parent {
                let hyp = &arena[cursor];
                if let (Some(word), Some(output)) = (hyp.word, hyp.output.as_ref()) {
                    words.push(word);
                    attentions.push(output.attention.clone());
                    log_probs.push(vec![hyp.word_log_prob]);
                    states.push(scorer.detach_state(&output.state));
                }
                cursor = parent;
            }
            words.reverse();
            attentions.reverse();
            log_probs.reverse();
            states.reverse();

            results.push(SearchOutput {
                token_ids: vec![words],
                attentions,
                scores: vec![HypScore::with_unnormalized(
                    final_score,
                    arena[leaf].unnormalized,
                )],
                log_probs,
                states,
                masks: Vec::new(),
            });
        }
        Ok(results)
    }
}

/// Indices of the `k` largest values, by partial selection rather than a full
/// sort of the vocabulary. The order among equal scores is unspecified but
/// deterministic for a given input.
fn top_k(row: &[f32], k: usize) -> Vec<u32> {
    let k = k.min(row.len());
    let mut indices: Vec<usize> = (0..row.len()).collect();
    if k < indices.len() {
        indices.select_nth_unstable_by(k - 1, |&a, &b| {
            row[b].partial_cmp(&row[a]).unwrap_or(Ordering::Equal)
        });
        indices.truncate(k);
    }
    indices.into_iter().map(|i| i as u32).collect()
}
