use crate::Token;
use ndarray::{Array2, ArrayView1};
use std::error::Error;
use std::fmt;

/// Failure reported by a [`SequenceModel`]. Decoders pass it through untouched.
#[derive(Debug)]
pub struct ModelError(Box<dyn Error + Send + Sync>);

impl ModelError {
    pub fn new(error: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self(error.into())
    }

    pub fn into_inner(self) -> Box<dyn Error + Send + Sync> {
        self.0
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sequence model failed: {}", self.0)
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// Unnormalized per-position token scores, shape `(positions, vocab_size)`.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenLogits {
    scores: Array2<f32>,
}

impl TokenLogits {
    pub fn new(scores: Array2<f32>) -> Self {
        Self { scores }
    }

    /// Same scores at every position.
    pub fn broadcast(positions: usize, row: &[f32]) -> Self {
        let scores = Array2::from_shape_fn((positions, row.len()), |(_, token)| row[token]);
        Self { scores }
    }

    pub fn positions(&self) -> usize {
        self.scores.nrows()
    }

    pub fn vocab_size(&self) -> usize {
        self.scores.ncols()
    }

    pub fn position(&self, position: usize) -> Option<ArrayView1<'_, f32>> {
        (position < self.positions()).then(|| self.scores.row(position))
    }

    pub fn scores(&self) -> &Array2<f32> {
        &self.scores
    }
}

/// The trained network, seen only through its prediction interface.
///
/// `predict` receives a token context and returns scores for every context
/// position. Row `p` describes position `p` given the tokens before it: a
/// causal implementation treats token 0 as the start marker and shifts its
/// input right by one.
pub trait SequenceModel {
    /// Number of token classes in every output row.
    fn vocab_size(&self) -> usize;

    fn predict(&mut self, context: &[Token], prompt: Option<&str>) -> Result<TokenLogits, ModelError>;
}

impl<M: SequenceModel + ?Sized> SequenceModel for &mut M {
    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }

    fn predict(&mut self, context: &[Token], prompt: Option<&str>) -> Result<TokenLogits, ModelError> {
        (**self).predict(context, prompt)
    }
}

impl<M: SequenceModel + ?Sized> SequenceModel for Box<M> {
    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }

    fn predict(&mut self, context: &[Token], prompt: Option<&str>) -> Result<TokenLogits, ModelError> {
        (**self).predict(context, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_repeats_the_row() {
        let logits = TokenLogits::broadcast(3, &[0.5, 1.5, -2.0]);
        assert_eq!(logits.positions(), 3);
        assert_eq!(logits.vocab_size(), 3);
        let row = logits.position(2).unwrap();
        assert_eq!(row.to_vec(), vec![0.5, 1.5, -2.0]);
        assert!(logits.position(3).is_none());
    }

    #[test]
    fn model_error_keeps_its_source() {
        let error = ModelError::new("out of memory");
        assert_eq!(error.to_string(), "sequence model failed: out of memory");
        assert!(error.source().is_some());
    }
}
