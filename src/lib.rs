//! Voxel structure tokenization and model-driven structure generation.
//!
//! Structures are sparse `(x, y, z)` containers of [`Block`]s. The
//! [`codec`] turns them into dense `(z, y, x)` [`TokenGrid`]s through a
//! caller-owned [`TokenCatalog`]; the [`generate`] and [`infill`] decoders
//! turn the output of an injected [`SequenceModel`] back into grids.

pub mod block;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod generate;
pub mod grid;
pub mod infill;
pub mod model;
pub mod sampling;
pub mod structure;

#[cfg(test)]
mod testkit;

pub use block::{Block, BlockParseError};
pub use catalog::{CatalogEntry, CatalogError, TokenCatalog};
pub use codec::{decode, encode, CodecError};
pub use config::{load_config, save_config, ConfigError, GeneratorConfig};
pub use generate::{DecodeMode, FullSequenceGenerator};
pub use grid::{CellState, GridError, TokenGrid};
pub use infill::{frontier, FillOrder, FilledCell, InfillGenerator, InfillReport, InfillSession};
pub use model::{ModelError, SequenceModel, TokenLogits};
pub use structure::{Structure, StructureError, MAX_STRUCTURE_VOLUME};

/// Dense integer encoding of a [`Block`].
pub type Token = u32;

/// Reserved start marker; marks a cell whose content is not decided yet.
pub const UNSET_TOKEN: Token = 0;
/// Resolved but empty content (air in a fresh catalog). Never grows the infill frontier.
pub const EMPTY_TOKEN: Token = 1;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("unsupported fill order {0:?}, expected \"bottom_up\" or \"random\"")]
    UnsupportedFillOrder(String),
    #[error("configured vocab size {configured} does not match the model's {model}")]
    VocabularyMismatch { configured: usize, model: usize },
    #[error("max sequence length {0} is not the volume of a cube")]
    NonCubicSequenceLength(usize),
    #[error(
        "model returned logits of shape ({actual_positions}, {actual_vocab}), expected ({expected_positions}, {expected_vocab})"
    )]
    MalformedLogits {
        expected_positions: usize,
        expected_vocab: usize,
        actual_positions: usize,
        actual_vocab: usize,
    },
    #[error("no token has non-zero probability at linear position {position}")]
    DegenerateDistribution { position: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
}
