//! Structure ↔ token grid conversion.
//!
//! Structures are addressed `(x, y, z)` with dimensions `(length, height,
//! width)`; grids are addressed `[z, y, x]`, so a structure of dimensions
//! `(L, H, W)` becomes a grid of shape `[W, H, L]`.

use crate::block::Block;
use crate::catalog::TokenCatalog;
use crate::grid::TokenGrid;
use crate::structure::{Structure, StructureError};
use crate::Token;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("grid shape {grid_shape:?} does not match structure dimensions {structure_dims:?} (expected grid shape {expected:?})")]
    DimensionMismatch {
        grid_shape: [usize; 3],
        structure_dims: (usize, usize, usize),
        expected: [usize; 3],
    },
    #[error("cell ({x}, {y}, {z}) holds token {token}, which no block is bound to")]
    UnknownToken {
        token: Token,
        x: usize,
        y: usize,
        z: usize,
    },
    #[error(transparent)]
    Structure(#[from] StructureError),
}

/// Grid shape `[z, y, x]` for a structure.
pub fn grid_shape_for(structure: &Structure) -> [usize; 3] {
    let (length, height, width) = structure.dimensions();
    [width, height, length]
}

/// Tokenize a structure. Unset cells become the air token; blocks the catalog
/// has not seen are registered (or degrade to its placeholder when frozen).
pub fn encode(structure: &Structure, catalog: &mut TokenCatalog) -> TokenGrid {
    let air_token = catalog.block_to_token(&Block::air());
    let mut grid = TokenGrid::filled(grid_shape_for(structure), air_token);
    for ([x, y, z], block) in structure.occupied() {
        let token = catalog.block_to_token(block);
        grid.set(z, y, x, token);
    }
    grid
}

/// Turn a grid back into blocks, writing into `template` when given.
pub fn decode(
    grid: &TokenGrid,
    catalog: &TokenCatalog,
    template: Option<Structure>,
) -> Result<Structure, CodecError> {
    let [depth, height, length] = grid.shape();
    let mut structure = match template {
        Some(template) => {
            let expected = grid_shape_for(&template);
            if expected != grid.shape() {
                return Err(CodecError::DimensionMismatch {
                    grid_shape: grid.shape(),
                    structure_dims: template.dimensions(),
                    expected,
                });
            }
            template
        }
        None => Structure::new(length, height, depth)?,
    };

    let positions: Vec<[usize; 3]> = structure.positions().collect();
    for [x, y, z] in positions {
        let token = grid.get(z, y, x).unwrap_or(crate::UNSET_TOKEN);
        let block = catalog
            .token_to_block(token)
            .map_err(|_| CodecError::UnknownToken { token, x, y, z })?;
        structure.set_block(x, y, z, block.clone())?;
    }
    Ok(structure)
}
