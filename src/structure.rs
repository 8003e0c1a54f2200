use crate::block::Block;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::Path;

/// Index 0 of the palette is the implicit fill (air / unset).
const EMPTY_PALETTE_INDEX: u32 = 0;
/// Largest cell count a structure may allocate.
pub const MAX_STRUCTURE_VOLUME: usize = 1 << 27;

#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    #[error("position ({x}, {y}, {z}) is outside a {length}x{height}x{width} structure")]
    OutOfBounds {
        x: usize,
        y: usize,
        z: usize,
        length: usize,
        height: usize,
        width: usize,
    },
    #[error("a {length}x{height}x{width} structure exceeds {max} cells", max = MAX_STRUCTURE_VOLUME)]
    TooLarge {
        length: usize,
        height: usize,
        width: usize,
    },
    #[error("structure io: {0}")]
    Io(#[from] io::Error),
    #[error("structure json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Bounded 3D container of blocks addressed as `(x, y, z)`.
///
/// Dimensions are `(length, height, width)` along `x`, `y` and `z`. Cells
/// hold an index into a block palette; unset cells and air share palette
/// slot 0, so writing air clears a cell.
#[derive(Clone, Debug)]
pub struct Structure {
    length: usize,
    height: usize,
    width: usize,
    palette: Vec<Block>,
    palette_lookup: HashMap<Block, u32>,
    cells: Vec<u32>,
}

impl PartialEq for Structure {
    fn eq(&self, other: &Self) -> bool {
        self.dimensions() == other.dimensions()
            && self
                .positions()
                .all(|[x, y, z]| self.get_block(x, y, z) == other.get_block(x, y, z))
    }
}

impl Eq for Structure {}

impl Structure {
    /// Empty (all air) structure. Fails when the volume exceeds
    /// [`MAX_STRUCTURE_VOLUME`].
    pub fn new(length: usize, height: usize, width: usize) -> Result<Self, StructureError> {
        let volume = length
            .checked_mul(height)
            .and_then(|area| area.checked_mul(width))
            .filter(|&volume| volume <= MAX_STRUCTURE_VOLUME)
            .ok_or(StructureError::TooLarge {
                length,
                height,
                width,
            })?;
        let air = Block::air();
        Ok(Self {
            length,
            height,
            width,
            palette: vec![air.clone()],
            palette_lookup: HashMap::from([(air, EMPTY_PALETTE_INDEX)]),
            cells: vec![EMPTY_PALETTE_INDEX; volume],
        })
    }

    /// `(length, height, width)`.
    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.length, self.height, self.width)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn volume(&self) -> usize {
        self.cells.len()
    }

    pub fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        x < self.length && y < self.height && z < self.width
    }

    #[inline]
    fn cell_index(&self, x: usize, y: usize, z: usize) -> usize {
        (y * self.width + z) * self.length + x
    }

    fn check_bounds(&self, x: usize, y: usize, z: usize) -> Result<usize, StructureError> {
        if !self.contains(x, y, z) {
            return Err(StructureError::OutOfBounds {
                x,
                y,
                z,
                length: self.length,
                height: self.height,
                width: self.width,
            });
        }
        Ok(self.cell_index(x, y, z))
    }

    /// Every coordinate in the bounds: `y` outermost, then `z`, then `x`.
    pub fn positions(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).flat_map(move |z| (0..self.length).map(move |x| [x, y, z]))
        })
    }

    /// Non-air cells in iteration order.
    pub fn occupied(&self) -> impl Iterator<Item = ([usize; 3], &Block)> + '_ {
        self.positions().filter_map(|[x, y, z]| {
            self.get_block(x, y, z).map(|block| ([x, y, z], block))
        })
    }

    /// The block at a position, or `None` for air, unset and out-of-range cells.
    pub fn get_block(&self, x: usize, y: usize, z: usize) -> Option<&Block> {
        if !self.contains(x, y, z) {
            return None;
        }
        match self.cells[self.cell_index(x, y, z)] {
            EMPTY_PALETTE_INDEX => None,
            idx => self.palette.get(idx as usize),
        }
    }

    pub fn set_block(&mut self, x: usize, y: usize, z: usize, block: Block) -> Result<(), StructureError> {
        let idx = self.check_bounds(x, y, z)?;
        self.cells[idx] = self.intern_block(block);
        Ok(())
    }

    pub fn clear_block(&mut self, x: usize, y: usize, z: usize) -> Result<(), StructureError> {
        let idx = self.check_bounds(x, y, z)?;
        self.cells[idx] = EMPTY_PALETTE_INDEX;
        Ok(())
    }

    /// Distinct blocks ever written; slot 0 is air.
    pub fn palette(&self) -> &[Block] {
        &self.palette
    }

    fn intern_block(&mut self, block: Block) -> u32 {
        if let Some(&idx) = self.palette_lookup.get(&block) {
            return idx;
        }
        let idx = self.palette.len() as u32;
        self.palette_lookup.insert(block.clone(), idx);
        self.palette.push(block);
        idx
    }

    // -----------------------------------------------------------------------
    // JSON file form
    // -----------------------------------------------------------------------

    pub fn from_json_bytes(json: &[u8]) -> Result<Self, StructureError> {
        let parsed: StructureFile = serde_json::from_slice(json)?;
        let mut structure = Self::new(parsed.length, parsed.height, parsed.width)?;
        for voxel in parsed.blocks {
            let [x, y, z] = voxel.pos;
            structure.set_block(x, y, z, voxel.block)?;
        }
        Ok(structure)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, StructureError> {
        let file = StructureFile {
            length: self.length,
            height: self.height,
            width: self.width,
            blocks: self
                .occupied()
                .map(|(pos, block)| StructureVoxel {
                    pos,
                    block: block.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }

    pub fn load_json(path: &Path) -> Result<Self, StructureError> {
        let raw = std::fs::read(path)?;
        Self::from_json_bytes(&raw)
    }

    pub fn save_json(&self, path: &Path) -> Result<(), StructureError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json_bytes()?)?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StructureFile {
    length: usize,
    height: usize,
    width: usize,
    #[serde(default)]
    blocks: Vec<StructureVoxel>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StructureVoxel {
    pos: [usize; 3],
    block: Block,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_cover_bounds_in_fixed_order() {
        let structure = Structure::new(2, 2, 3).unwrap();
        let positions: Vec<_> = structure.positions().collect();
        assert_eq!(positions.len(), structure.volume());
        assert_eq!(positions[0], [0, 0, 0]);
        assert_eq!(positions[1], [1, 0, 0]);
        assert_eq!(positions[2], [0, 0, 1]);
        assert_eq!(positions[6], [0, 1, 0]);
        assert_eq!(*positions.last().unwrap(), [1, 1, 2]);
    }

    #[test]
    fn set_get_and_clear() {
        let mut structure = Structure::new(3, 2, 1).unwrap();
        let stone = Block::new("stone");
        structure.set_block(2, 1, 0, stone.clone()).unwrap();
        assert_eq!(structure.get_block(2, 1, 0), Some(&stone));
        assert_eq!(structure.get_block(0, 0, 0), None);

        structure.clear_block(2, 1, 0).unwrap();
        assert_eq!(structure.get_block(2, 1, 0), None);
    }

    #[test]
    fn writing_air_clears_the_cell() {
        let mut structure = Structure::new(1, 1, 1).unwrap();
        structure.set_block(0, 0, 0, Block::new("dirt")).unwrap();
        structure.set_block(0, 0, 0, Block::air()).unwrap();
        assert_eq!(structure.get_block(0, 0, 0), None);
        assert_eq!(structure, Structure::new(1, 1, 1).unwrap());
    }

    #[test]
    fn out_of_bounds_writes_fail() {
        let mut structure = Structure::new(2, 2, 2).unwrap();
        assert!(matches!(
            structure.set_block(0, 2, 0, Block::new("stone")),
            Err(StructureError::OutOfBounds { y: 2, .. })
        ));
        assert_eq!(structure.get_block(5, 5, 5), None);
    }

    #[test]
    fn equality_ignores_palette_order() {
        let mut a = Structure::new(2, 1, 1).unwrap();
        a.set_block(0, 0, 0, Block::new("stone")).unwrap();
        a.set_block(1, 0, 0, Block::new("dirt")).unwrap();

        let mut b = Structure::new(2, 1, 1).unwrap();
        b.set_block(1, 0, 0, Block::new("dirt")).unwrap();
        b.set_block(0, 0, 0, Block::new("stone")).unwrap();

        assert_ne!(a.palette(), b.palette());
        assert_eq!(a, b);
    }

    #[test]
    fn json_form_roundtrips() {
        let mut structure = Structure::new(3, 2, 2).unwrap();
        structure
            .set_block(1, 1, 1, Block::new("oak_stairs").with_property("facing", "east"))
            .unwrap();
        structure.set_block(0, 0, 0, Block::new("stone")).unwrap();

        let bytes = structure.to_json_bytes().unwrap();
        let restored = Structure::from_json_bytes(&bytes).unwrap();
        assert_eq!(restored, structure);
    }

    #[test]
    fn json_rejects_out_of_range_voxels() {
        let json = br#"{"length": 1, "height": 1, "width": 1, "blocks": [{"pos": [0, 3, 0], "block": "minecraft:stone"}]}"#;
        assert!(matches!(
            Structure::from_json_bytes(json),
            Err(StructureError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let huge = usize::MAX / 2;
        assert!(matches!(
            Structure::new(huge, huge, 2),
            Err(StructureError::TooLarge { .. })
        ));
        assert!(matches!(
            Structure::new(MAX_STRUCTURE_VOLUME, 2, 1),
            Err(StructureError::TooLarge { .. })
        ));

        let json = br#"{"length": 4294967295, "height": 4294967295, "width": 4294967295, "blocks": []}"#;
        assert!(matches!(
            Structure::from_json_bytes(json),
            Err(StructureError::TooLarge { .. })
        ));
    }
}
