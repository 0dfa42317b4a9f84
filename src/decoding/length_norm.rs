/// Read-only view of a completed hypothesis handed to
/// [`LengthNormalization::normalize_completed`].
#[derive(Debug, Clone, Copy)]
pub struct HypView {
    /// Running normalized score.
    pub score: f32,
    /// Raw summed log-probability.
    pub unnormalized: f32,
    /// Number of generated tokens.
    pub len: usize,
}

/// Makes scores of hypotheses with different lengths comparable.
///
/// `normalize_partial` maintains the running score while a hypothesis is still
/// being extended; `normalize_completed` produces the final comparable scores
/// once the beam has finished. The two need not agree: a scheme may accumulate
/// plainly during search and apply its penalty once at the end.
pub trait LengthNormalization: Send + Sync {
    /// Running score of a partial hypothesis extended by one token of
    /// log-probability `score_to_add`, giving it length `new_len`.
    fn normalize_partial(&self, score_so_far: f32, score_to_add: f32, _new_len: usize) -> f32 {
        score_so_far + score_to_add
    }

    /// Final comparable scores, one per hypothesis, same order.
    fn normalize_completed(&self, hyps: &[HypView], src_length: Option<usize>) -> Vec<f32>;
}

/// Plain summed log-probabilities, no correction. The default.
pub struct NoNormalization;

impl LengthNormalization for NoNormalization {
    fn normalize_completed(&self, hyps: &[HypView], _src_length: Option<usize>) -> Vec<f32> {
        hyps.iter().map(|h| h.score).collect()
    }
}

/// Adds a constant reward per generated token, favoring longer outputs when
/// the penalty is positive.
pub struct AdditiveNormalization {
    pub penalty: f32,
}

impl LengthNormalization for AdditiveNormalization {
    fn normalize_completed(&self, hyps: &[HypView], _src_length: Option<usize>) -> Vec<f32> {
        hyps.iter()
            .map(|h| h.score + self.penalty * h.len as f32)
            .collect()
    }
}

/// Divides the score by `len^m` (the "alpha" length penalty of Google NMT).
///
/// With `apply_during_search` the running score is kept normalized at every
/// step, so partial hypotheses of different lengths compare fairly inside the
/// beam; otherwise the division happens once on the completed set.
pub struct PolynomialNormalization {
    pub m: f32,
    pub apply_during_search: bool,
}

impl PolynomialNormalization {
    pub fn new(m: f32, apply_during_search: bool) -> Self {
        Self {
            m,
            apply_during_search,
        }
    }
}

impl LengthNormalization for PolynomialNormalization {
    fn normalize_partial(&self, score_so_far: f32, score_to_add: f32, new_len: usize) -> f32 {
        if self.apply_during_search {
            let len = new_len as f32;
            (score_so_far * (len - 1.0).powf(self.m) + score_to_add) / len.powf(self.m)
        } else {
            score_so_far + score_to_add
        }
    }

    fn normalize_completed(&self, hyps: &[HypView], _src_length: Option<usize>) -> Vec<f32> {
        if self.apply_during_search {
            hyps.iter().map(|h| h.score).collect()
        } else {
            hyps.iter()
                .map(|h| h.score / (h.len as f32).powf(self.m))
                .collect()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn view(score: f32, len: usize) -> HypView {
        HypView {
            score,
            unnormalized: score,
            len,
        }
    }

    #[test]
    fn no_normalization_is_identity() {
        let norm = NoNormalization;
        assert_eq!(norm.normalize_partial(-1.0, -0.5, 3), -1.5);
        let scores = norm.normalize_completed(&[view(-1.5, 3), view(-2.0, 1)], None);
        assert_eq!(scores, vec![-1.5, -2.0]);
    }

    #[test]
    fn additive_rewards_length() {
        let norm = AdditiveNormalization { penalty: 0.1 };
        let scores = norm.normalize_completed(&[view(-2.0, 4), view(-2.0, 1)], Some(5));
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn polynomial_during_search_matches_final_division() {
        // Accumulating with the running rule must land on sum / len^m.
        let during = PolynomialNormalization::new(1.0, true);
        let step_scores = [-0.3f32, -0.9, -0.2];
        let mut running = 0.0;
        for (i, s) in step_scores.iter().enumerate() {
            running = during.normalize_partial(running, *s, i + 1);
        }
        let sum: f32 = step_scores.iter().sum();
        assert!((running - sum / 3.0).abs() < 1e-6);

        let at_end = PolynomialNormalization::new(1.0, false);
        let finals = at_end.normalize_completed(&[view(sum, 3)], None);
        assert!((finals[0] - running).abs() < 1e-6);
    }
}
