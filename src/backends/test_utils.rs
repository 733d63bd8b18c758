//! Test utilities and mock backends for testing inference functionality
//!
//! Mock implementations of the `InferenceBackend` trait so pipeline and
//! server tests can run without model files.

use crate::{
    error::{PredictionError, Result},
    inference::InferenceBackend,
};
use ndarray::{Array2, Array4};
use std::sync::{Arc, Mutex};

/// What the mock does when `infer` is called
#[derive(Debug, Clone)]
enum MockBehavior {
    /// Always return the same logits
    Fixed(Vec<f32>),
    /// Return the logits for the first `n` calls, NaN afterwards
    NanAfter(usize, Vec<f32>),
    /// Fail with an inference error
    Fail,
    /// Panic inside the forward pass
    Panic,
    /// Block the calling thread before answering
    Slow(std::time::Duration, Vec<f32>),
}

/// Mock backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    input_shape: (usize, usize, usize, usize),
    behavior: MockBehavior,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    /// Mock returning the same logits for every input
    #[must_use]
    pub fn with_logits(input_shape: (usize, usize, usize, usize), logits: Vec<f32>) -> Self {
        Self {
            input_shape,
            behavior: MockBehavior::Fixed(logits),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mock whose outputs turn into NaN after `calls` successful passes
    #[must_use]
    pub fn with_nan_after(
        input_shape: (usize, usize, usize, usize),
        logits: Vec<f32>,
        calls: usize,
    ) -> Self {
        let mut backend = Self::with_logits(input_shape, Vec::new());
        backend.behavior = MockBehavior::NanAfter(calls, logits);
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference(input_shape: (usize, usize, usize, usize)) -> Self {
        let mut backend = Self::with_logits(input_shape, Vec::new());
        backend.behavior = MockBehavior::Fail;
        backend
    }

    /// Create a mock backend that panics during inference
    #[must_use]
    pub fn new_panicking(input_shape: (usize, usize, usize, usize)) -> Self {
        let mut backend = Self::with_logits(input_shape, Vec::new());
        backend.behavior = MockBehavior::Panic;
        backend
    }

    /// Create a mock backend that sleeps before every forward pass
    #[must_use]
    pub fn new_slow(
        input_shape: (usize, usize, usize, usize),
        logits: Vec<f32>,
        delay: std::time::Duration,
    ) -> Self {
        let mut backend = Self::with_logits(input_shape, Vec::new());
        backend.behavior = MockBehavior::Slow(delay, logits);
        backend
    }

    /// Shared handle to the call history, usable after the mock is boxed
    pub fn call_history_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    /// Record a method call and return how many `infer` calls came before it
    fn record_call(&self, method: &str) -> usize {
        match self.call_history.lock() {
            Ok(mut history) => {
                let previous = history.iter().filter(|m| *m == "infer").count();
                history.push(method.to_string());
                previous
            },
            Err(_) => 0,
        }
    }
}

impl InferenceBackend for MockBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array2<f32>> {
        let previous_calls = self.record_call("infer");
        let batch = input.dim().0;

        let logits = match &self.behavior {
            MockBehavior::Fixed(logits) => logits.clone(),
            MockBehavior::NanAfter(limit, logits) => {
                if previous_calls < *limit {
                    logits.clone()
                } else {
                    vec![f32::NAN; logits.len()]
                }
            },
            MockBehavior::Fail => {
                return Err(PredictionError::inference("Mock backend inference failed"));
            },
            MockBehavior::Panic => panic!("mock backend panicked during inference"),
            MockBehavior::Slow(delay, logits) => {
                std::thread::sleep(*delay);
                logits.clone()
            },
        };

        let row_len = logits.len();
        let data: Vec<f32> = logits.iter().copied().cycle().take(batch * row_len).collect();
        Array2::from_shape_vec((batch, row_len), data)
            .map_err(|e| PredictionError::inference(format!("Mock output shape: {e}")))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.input_shape
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls() {
        let backend = MockBackend::with_logits((1, 3, 4, 4), vec![0.1, 0.9]);
        let history = backend.call_history_handle();
        let input = Array4::zeros((1, 3, 4, 4));

        let out = backend.infer(&input).unwrap();
        assert_eq!(out.shape(), &[1, 2]);
        backend.infer(&input).unwrap();
        assert_eq!(history.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_mock_nan_after_limit() {
        let backend = MockBackend::with_nan_after((1, 3, 4, 4), vec![0.0, 1.0], 1);
        let input = Array4::zeros((1, 3, 4, 4));
        assert!(backend.infer(&input).unwrap().iter().all(|v| v.is_finite()));
        assert!(backend.infer(&input).unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_mock_failure() {
        let backend = MockBackend::new_failing_inference((1, 3, 4, 4));
        assert!(backend.infer(&Array4::zeros((1, 3, 4, 4))).is_err());
    }
}
