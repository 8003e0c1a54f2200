use crate::config::GeneratorConfig;
use crate::grid::TokenGrid;
use crate::model::{SequenceModel, TokenLogits};
use crate::sampling::argmax;
use crate::{GenerationError, Token, UNSET_TOKEN};
use web_time::Instant;

/// How a full structure is decoded from an empty context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecodeMode {
    /// One model query per position over the growing prefix.
    Causal,
    /// A single query over the all-start buffer, argmax at every position at once.
    OneShot,
}

impl DecodeMode {
    pub fn from_autoregressive(autoregressive: bool) -> Self {
        if autoregressive {
            Self::Causal
        } else {
            Self::OneShot
        }
    }
}

/// Integer cube root of `volume`, if `volume` is a perfect cube.
pub fn cube_edge(volume: usize) -> Option<usize> {
    if volume == 0 {
        return None;
    }
    let mut edge = (volume as f64).cbrt().round() as usize;
    // Correct float rounding near large cubes.
    while edge.saturating_mul(edge).saturating_mul(edge) > volume {
        edge -= 1;
    }
    while (edge + 1).saturating_mul(edge + 1).saturating_mul(edge + 1) <= volume {
        edge += 1;
    }
    (edge * edge * edge == volume).then_some(edge)
}

pub(crate) fn check_vocab_size(model: &impl SequenceModel, config: &GeneratorConfig) -> Result<(), GenerationError> {
    if model.vocab_size() != config.vocab_size {
        return Err(GenerationError::VocabularyMismatch {
            configured: config.vocab_size,
            model: model.vocab_size(),
        });
    }
    Ok(())
}

pub(crate) fn check_logits(
    logits: &TokenLogits,
    expected_positions: usize,
    expected_vocab: usize,
) -> Result<(), GenerationError> {
    if logits.positions() != expected_positions || logits.vocab_size() != expected_vocab {
        return Err(GenerationError::MalformedLogits {
            expected_positions,
            expected_vocab,
            actual_positions: logits.positions(),
            actual_vocab: logits.vocab_size(),
        });
    }
    Ok(())
}

/// Generates a complete cubic structure from nothing but a prompt.
pub struct FullSequenceGenerator<M> {
    model: M,
    max_sequence_length: usize,
    edge: usize,
    mode: DecodeMode,
}

impl<M: SequenceModel> FullSequenceGenerator<M> {
    pub fn new(model: M, config: &GeneratorConfig) -> Result<Self, GenerationError> {
        check_vocab_size(&model, config)?;
        let edge = cube_edge(config.max_sequence_length)
            .ok_or(GenerationError::NonCubicSequenceLength(config.max_sequence_length))?;
        Ok(Self {
            model,
            max_sequence_length: config.max_sequence_length,
            edge,
            mode: DecodeMode::from_autoregressive(config.autoregressive),
        })
    }

    /// Edge length of generated cubes.
    pub fn edge(&self) -> usize {
        self.edge
    }

    /// Mode picked by the configuration's `autoregressive` flag.
    pub fn decode_mode(&self) -> DecodeMode {
        self.mode
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// [`generate`](Self::generate) in the configured [`decode_mode`](Self::decode_mode).
    pub fn generate_configured(&mut self, prompt: Option<&str>) -> Result<TokenGrid, GenerationError> {
        self.generate(prompt, self.mode)
    }

    /// Decode `edge³` tokens and shape them into an `(edge, edge, edge)` grid.
    pub fn generate(&mut self, prompt: Option<&str>, mode: DecodeMode) -> Result<TokenGrid, GenerationError> {
        let started = Instant::now();
        let seq_len = self.max_sequence_length + 1;
        let vocab_size = self.model.vocab_size();
        log::info!(
            "generating {0}x{0}x{0} structure ({mode:?}, {seq_len} buffer positions)",
            self.edge
        );

        // Position 0 stays the start marker.
        let mut buffer: Vec<Token> = vec![UNSET_TOKEN; seq_len];
        match mode {
            DecodeMode::Causal => {
                for i in 1..seq_len {
                    let logits = self.model.predict(&buffer[..i], prompt)?;
                    check_logits(&logits, i, vocab_size)?;
                    buffer[i] = argmax(logits.scores().row(i - 1));
                    log::trace!("position {i} -> token {}", buffer[i]);
                }
            }
            DecodeMode::OneShot => {
                let logits = self.model.predict(&buffer, prompt)?;
                check_logits(&logits, seq_len, vocab_size)?;
                for (slot, row) in buffer.iter_mut().zip(logits.scores().rows()) {
                    *slot = argmax(row);
                }
            }
        }

        buffer.remove(0);
        let grid = TokenGrid::cube(self.edge, buffer).map_err(|_| {
            GenerationError::NonCubicSequenceLength(self.max_sequence_length)
        })?;
        log::info!(
            "generated structure in {:.2?} ({} known cells)",
            started.elapsed(),
            grid.state_counts().known
        );
        Ok(grid)
    }
}
