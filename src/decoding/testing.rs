//! Deterministic scorers for exercising the strategies without a real model.

use std::cell::RefCell;

use burn::prelude::{Backend, Tensor};
use burn::tensor::Data;

use crate::error::{Error, Result};
use crate::scorer::{StepOutput, StepScorer};
use crate::vocab::Vocab;

cfg_if::cfg_if! {
    if #[cfg(feature = "ndarray-backend")] {
        pub type TestBackend = burn::backend::ndarray::NdArray<f32>;
    } else if #[cfg(feature = "wgpu-backend")] {
        pub type TestBackend = burn_wgpu::Wgpu<burn_wgpu::AutoGraphicsApi, f32, i32>;
    } else {
        pub type TestBackend = burn_tch::LibTorch<f32>;
    }
}

pub type TestDevice = <TestBackend as Backend>::Device;

pub fn test_device() -> TestDevice {
    TestDevice::default()
}

/// Log-probabilities putting 0.7 on `peak`. End-of-sequence stays strictly
/// least likely unless it is the peak, so top-k ties never promote it.
fn peaked_row(vocab_size: usize, peak: usize) -> Vec<f32> {
    let es = Vocab::ES as usize;
    let mut probs = vec![0.0f32; vocab_size];
    probs[es] = 0.01;
    probs[peak] = 0.7;
    let rest = if peak == es {
        0.3 / (vocab_size - 1) as f32
    } else {
        0.29 / (vocab_size - 2) as f32
    };
    for (i, p) in probs.iter_mut().enumerate() {
        if i != peak && i != es {
            *p = rest;
        }
    }
    probs.iter().map(|p| p.ln()).collect()
}

fn rows_to_output(rows: Vec<Vec<f32>>, state: usize, device: &TestDevice) -> StepOutput<TestBackend, usize> {
    let n_batch = rows.len();
    let vocab_size = rows[0].len();
    let values: Vec<f32> = rows.into_iter().flatten().collect();
    let log_probs = Tensor::from_floats(Data::new(values, [n_batch, vocab_size].into()), device);
    let attention = Tensor::zeros([n_batch, 4], device);
    StepOutput {
        state,
        log_probs,
        attention,
    }
}

/// Peaks at `peak` until `flip_step`, then at end-of-sequence. The state is
/// the step index.
pub struct PeakScorer {
    pub vocab_size: usize,
    pub peak: u32,
    pub flip_step: usize,
    device: TestDevice,
}

impl PeakScorer {
    pub fn new(vocab_size: usize, peak: u32, flip_step: usize) -> Self {
        Self {
            vocab_size,
            peak,
            flip_step,
            device: test_device(),
        }
    }

    fn row(&self, step: usize) -> Vec<f32> {
        let peak = if step >= self.flip_step {
            Vocab::ES as usize
        } else {
            self.peak as usize
        };
        peaked_row(self.vocab_size, peak)
    }

    /// Log-probability this scorer assigns `token` at `step`.
    pub fn log_prob_of(&self, step: usize, token: u32) -> f32 {
        self.row(step)[token as usize]
    }
}

impl StepScorer<TestBackend> for PeakScorer {
    type State = usize;

    fn step(&self, prev_tokens: Option<&[u32]>, state: &usize) -> Result<StepOutput<TestBackend, usize>> {
        let n_batch = prev_tokens.map_or(1, <[u32]>::len);
        let rows = vec![self.row(*state); n_batch];
        Ok(rows_to_output(rows, state + 1, &self.device))
    }

    fn detach_state(&self, state: &usize) -> usize {
        *state
    }
}

/// Batched scorer where element `i` sees an end-of-sequence peak from step
/// `ends[i]` on, and a peak at token 3 before that.
pub struct StaggeredScorer {
    pub vocab_size: usize,
    pub ends: Vec<usize>,
    device: TestDevice,
}

impl StaggeredScorer {
    pub fn new(vocab_size: usize, ends: Vec<usize>) -> Self {
        Self {
            vocab_size,
            ends,
            device: test_device(),
        }
    }

    fn row(&self, step: usize, elem: usize) -> Vec<f32> {
        let peak = if step >= self.ends[elem] {
            Vocab::ES as usize
        } else {
            3
        };
        peaked_row(self.vocab_size, peak)
    }

    /// Log-probability assigned to `token` for batch element `elem` at `step`.
    pub fn log_prob_of(&self, step: usize, elem: usize, token: u32) -> f32 {
        self.row(step, elem)[token as usize]
    }
}

impl StepScorer<TestBackend> for StaggeredScorer {
    type State = usize;

    fn step(&self, prev_tokens: Option<&[u32]>, state: &usize) -> Result<StepOutput<TestBackend, usize>> {
        let n_batch = prev_tokens.map_or(self.ends.len(), <[u32]>::len);
        let rows = (0..n_batch).map(|i| self.row(*state, i)).collect();
        Ok(rows_to_output(rows, state + 1, &self.device))
    }

    fn detach_state(&self, state: &usize) -> usize {
        *state
    }
}

/// Records every `prev_tokens` argument it is called with.
pub struct RecordingScorer {
    pub inner: PeakScorer,
    pub calls: RefCell<Vec<Option<Vec<u32>>>>,
}

impl RecordingScorer {
    pub fn new(inner: PeakScorer) -> Self {
        Self {
            inner,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl StepScorer<TestBackend> for RecordingScorer {
    type State = usize;

    fn step(&self, prev_tokens: Option<&[u32]>, state: &usize) -> Result<StepOutput<TestBackend, usize>> {
        self.calls.borrow_mut().push(prev_tokens.map(<[u32]>::to_vec));
        self.inner.step(prev_tokens, state)
    }

    fn detach_state(&self, state: &usize) -> usize {
        *state
    }
}

/// Fails on the step whose state index equals `fail_at`.
pub struct FailingScorer {
    pub inner: PeakScorer,
    pub fail_at: usize,
}

impl FailingScorer {
    pub fn new(inner: PeakScorer, fail_at: usize) -> Self {
        Self { inner, fail_at }
    }
}

impl StepScorer<TestBackend> for FailingScorer {
    type State = usize;

    fn step(&self, prev_tokens: Option<&[u32]>, state: &usize) -> Result<StepOutput<TestBackend, usize>> {
        if *state == self.fail_at {
            return Err(Error::Scorer("scripted scorer failure".into()));
        }
        self.inner.step(prev_tokens, state)
    }

    fn detach_state(&self, state: &usize) -> usize {
        *state
    }
}
