//! Deterministic stand-ins for a trained network.

use crate::model::{ModelError, SequenceModel, TokenLogits};
use crate::Token;
use ndarray::Array2;

/// Returns the same row of scores at every position.
pub struct FixedLogitsModel {
    row: Vec<f32>,
}

impl FixedLogitsModel {
    pub fn new(row: Vec<f32>) -> Self {
        Self { row }
    }
}

impl SequenceModel for FixedLogitsModel {
    fn vocab_size(&self) -> usize {
        self.row.len()
    }

    fn predict(&mut self, context: &[Token], _prompt: Option<&str>) -> Result<TokenLogits, ModelError> {
        Ok(TokenLogits::broadcast(context.len(), &self.row))
    }
}

/// Causal model whose row `p` peaks at a hash of `context[..=p]`. Records every query.
pub struct PrefixRecordingModel {
    vocab_size: usize,
    pub contexts: Vec<Vec<Token>>,
    pub prompts: Vec<Option<String>>,
}

impl PrefixRecordingModel {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            contexts: Vec::new(),
            prompts: Vec::new(),
        }
    }

    pub fn next_token_for(prefix: &[Token], vocab_size: usize) -> Token {
        let hash = prefix.iter().fold(17u64, |acc, &token| {
            acc.wrapping_mul(31).wrapping_add(u64::from(token) + 7)
        });
        (hash % vocab_size as u64) as Token
    }
}

impl SequenceModel for PrefixRecordingModel {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn predict(&mut self, context: &[Token], prompt: Option<&str>) -> Result<TokenLogits, ModelError> {
        self.contexts.push(context.to_vec());
        self.prompts.push(prompt.map(str::to_string));
        let peaks: Vec<Token> = (0..context.len())
            .map(|p| Self::next_token_for(&context[..=p], self.vocab_size))
            .collect();
        let scores = Array2::from_shape_fn((context.len(), self.vocab_size), |(p, token)| {
            if peaks[p] as usize == token {
                1.0
            } else {
                0.0
            }
        });
        Ok(TokenLogits::new(scores))
    }
}

/// Full-grid model that always favours one token and records each context it sees.
/// Optionally fails a single query once a number of successful queries has been served.
pub struct SweepTrackingModel {
    vocab_size: usize,
    favoured: Token,
    fail_after: Option<usize>,
    pub contexts: Vec<Vec<Token>>,
}

impl SweepTrackingModel {
    pub fn new(vocab_size: usize, favoured: Token) -> Self {
        Self {
            vocab_size,
            favoured,
            fail_after: None,
            contexts: Vec::new(),
        }
    }

    pub fn failing_after(vocab_size: usize, favoured: Token, successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Self::new(vocab_size, favoured)
        }
    }
}

impl SequenceModel for SweepTrackingModel {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn predict(&mut self, context: &[Token], _prompt: Option<&str>) -> Result<TokenLogits, ModelError> {
        if self.fail_after.is_some_and(|limit| self.contexts.len() >= limit) {
            self.fail_after = None;
            return Err(ModelError::new("accelerator unavailable"));
        }
        self.contexts.push(context.to_vec());
        let mut row = vec![0.0; self.vocab_size];
        row[self.favoured as usize] = 50.0;
        Ok(TokenLogits::broadcast(context.len(), &row))
    }
}
