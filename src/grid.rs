use crate::{Token, EMPTY_TOKEN, UNSET_TOKEN};
use bytemuck::{Pod, Zeroable};
use ndarray::Array3;
use std::borrow::Cow;
use std::io::{self, Read, Write};

const GRID_FILE_MAGIC: [u8; 4] = *b"VXTG";
const GRID_FILE_VERSION: u32 = 1;

/// Resolution state of one grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellState {
    /// Token 0: nothing decided yet.
    Unset,
    /// Token 1: resolved as empty. Counts as decided but never extends the frontier.
    KnownEmpty,
    /// Any other token.
    Known,
}

impl CellState {
    #[inline]
    pub fn of(token: Token) -> Self {
        match token {
            UNSET_TOKEN => Self::Unset,
            EMPTY_TOKEN => Self::KnownEmpty,
            _ => Self::Known,
        }
    }

    pub fn is_resolved(self) -> bool {
        self != Self::Unset
    }
}

/// Per-state cell counts of a grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub unset: usize,
    pub known_empty: usize,
    pub known: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("{actual} tokens cannot fill a grid of shape {shape:?}")]
    ShapeMismatch { shape: [usize; 3], actual: usize },
    #[error("not a token grid file (bad magic)")]
    BadMagic,
    #[error("unsupported token grid file version {0}")]
    UnsupportedVersion(u32),
    #[error("token grid file is truncated")]
    Truncated,
    #[error("token grid of shape {shape:?} is too large")]
    TooLarge { shape: [usize; 3] },
    #[error("token grid io: {0}")]
    Io(#[from] io::Error),
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GridFileHeader {
    magic: [u8; 4],
    version: u32,
    shape: [u32; 3],
}

/// Dense token array indexed `[z, y, x]`.
///
/// Storage is always row-major, so the linear position of `(z, y, x)` in the
/// flattened model context is `(z * height + y) * length + x`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrid {
    cells: Array3<Token>,
}

impl TokenGrid {
    /// Grid of shape `(depth, height, length)` = `(z, y, x)` extents, every cell `fill`.
    pub fn filled(shape: [usize; 3], fill: Token) -> Self {
        Self {
            cells: Array3::from_elem(shape, fill),
        }
    }

    /// Grid with every cell unset.
    pub fn unset(shape: [usize; 3]) -> Self {
        Self::filled(shape, UNSET_TOKEN)
    }

    /// Build from a row-major token sequence.
    pub fn from_tokens(shape: [usize; 3], tokens: Vec<Token>) -> Result<Self, GridError> {
        let actual = tokens.len();
        let cells = Array3::from_shape_vec(shape, tokens)
            .map_err(|_| GridError::ShapeMismatch { shape, actual })?;
        Ok(Self { cells })
    }

    /// Cube of edge `edge` from a row-major token sequence.
    pub fn cube(edge: usize, tokens: Vec<Token>) -> Result<Self, GridError> {
        Self::from_tokens([edge; 3], tokens)
    }

    /// `[depth, height, length]`, i.e. the `(z, y, x)` extents.
    pub fn shape(&self) -> [usize; 3] {
        let dims = self.cells.dim();
        [dims.0, dims.1, dims.2]
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, z: usize, y: usize, x: usize) -> bool {
        let [d, h, w] = self.shape();
        z < d && y < h && x < w
    }

    pub fn get(&self, z: usize, y: usize, x: usize) -> Option<Token> {
        self.cells.get([z, y, x]).copied()
    }

    /// Write a token; returns `false` if the position is out of range.
    pub fn set(&mut self, z: usize, y: usize, x: usize, token: Token) -> bool {
        match self.cells.get_mut([z, y, x]) {
            Some(cell) => {
                *cell = token;
                true
            }
            None => false,
        }
    }

    pub fn state(&self, z: usize, y: usize, x: usize) -> Option<CellState> {
        self.get(z, y, x).map(CellState::of)
    }

    #[inline]
    pub fn linear_index(&self, z: usize, y: usize, x: usize) -> usize {
        let [_, h, w] = self.shape();
        (z * h + y) * w + x
    }

    pub fn position_of(&self, linear: usize) -> [usize; 3] {
        let [_, h, w] = self.shape();
        [linear / (h * w), (linear / w) % h, linear % w]
    }

    /// The grid as a linear model context.
    pub fn flatten(&self) -> Cow<'_, [Token]> {
        match self.cells.as_slice() {
            Some(tokens) => Cow::Borrowed(tokens),
            None => Cow::Owned(self.cells.iter().copied().collect()),
        }
    }

    pub fn into_tokens(self) -> Vec<Token> {
        if self.cells.is_standard_layout() {
            let (tokens, _offset) = self.cells.into_raw_vec_and_offset();
            return tokens;
        }
        self.cells.iter().copied().collect()
    }

    pub fn array(&self) -> &Array3<Token> {
        &self.cells
    }

    /// `([z, y, x], token)` for every cell in row-major order.
    pub fn indexed_cells(&self) -> impl Iterator<Item = ([usize; 3], Token)> + '_ {
        self.cells
            .indexed_iter()
            .map(|((z, y, x), &token)| ([z, y, x], token))
    }

    pub fn state_counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for &token in self.cells.iter() {
            match CellState::of(token) {
                CellState::Unset => counts.unset += 1,
                CellState::KnownEmpty => counts.known_empty += 1,
                CellState::Known => counts.known += 1,
            }
        }
        counts
    }

    /// Copy of the grid with every cell for which `keep(z, y, x)` is false reset to unset.
    ///
    /// This is how partially specified inputs for infill are built.
    pub fn masked(&self, mut keep: impl FnMut(usize, usize, usize) -> bool) -> Self {
        let mut cells = self.cells.clone();
        for ((z, y, x), cell) in cells.indexed_iter_mut() {
            if !keep(z, y, x) {
                *cell = UNSET_TOKEN;
            }
        }
        Self { cells }
    }

    // -----------------------------------------------------------------------
    // Binary file form: header, then little-endian u32 tokens in row-major order.
    // -----------------------------------------------------------------------

    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), GridError> {
        let [d, h, w] = self.shape();
        let header = GridFileHeader {
            magic: GRID_FILE_MAGIC,
            version: GRID_FILE_VERSION.to_le(),
            shape: [(d as u32).to_le(), (h as u32).to_le(), (w as u32).to_le()],
        };
        writer.write_all(bytemuck::bytes_of(&header))?;
        let tokens: Vec<u32> = self.flatten().iter().map(|token| token.to_le()).collect();
        writer.write_all(bytemuck::cast_slice(&tokens))?;
        Ok(())
    }

    pub fn read_from(reader: &mut impl Read) -> Result<Self, GridError> {
        let mut header_bytes = [0u8; std::mem::size_of::<GridFileHeader>()];
        read_exact_or_truncated(reader, &mut header_bytes)?;
        let header: GridFileHeader = bytemuck::pod_read_unaligned(&header_bytes);
        if header.magic != GRID_FILE_MAGIC {
            return Err(GridError::BadMagic);
        }
        let version = u32::from_le(header.version);
        if version != GRID_FILE_VERSION {
            return Err(GridError::UnsupportedVersion(version));
        }
        let shape = header.shape.map(|extent| u32::from_le(extent) as usize);
        let byte_len = shape
            .iter()
            .try_fold(std::mem::size_of::<Token>(), |acc, &extent| acc.checked_mul(extent))
            .ok_or(GridError::TooLarge { shape })?;

        // Sized by the bytes actually present, not by the header's claim.
        let mut token_bytes = Vec::new();
        Read::take(reader, byte_len as u64).read_to_end(&mut token_bytes)?;
        if token_bytes.len() != byte_len {
            return Err(GridError::Truncated);
        }
        let tokens: Vec<Token> = token_bytes
            .chunks_exact(4)
            .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            .collect();
        Self::from_tokens(shape, tokens)
    }
}

fn read_exact_or_truncated(reader: &mut impl Read, buf: &mut [u8]) -> Result<(), GridError> {
    reader.read_exact(buf).map_err(|error| match error.kind() {
        io::ErrorKind::UnexpectedEof => GridError::Truncated,
        _ => GridError::Io(error),
    })
}
