//! Frontier-ordered infill of partially specified grids.
//!
//! A sweep computes the frontier (unset cells touching at least one known,
//! non-empty cell among their 26 neighbours), orders it, and then samples the
//! candidates one by one. Every sample is written into the grid before the
//! next candidate is queried, so later candidates of the same sweep see it.
//! The frontier itself is only recomputed between sweeps.

use crate::config::GeneratorConfig;
use crate::generate::{check_logits, check_vocab_size};
use crate::grid::{CellState, TokenGrid};
use crate::model::SequenceModel;
use crate::sampling::sample_token;
use crate::{GenerationError, Token, UNSET_TOKEN};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use web_time::Instant;

/// Tokens never sampled during infill; sampling them would leave the cell unset.
const NEVER_SAMPLED: [Token; 1] = [UNSET_TOKEN];

/// Order in which the candidates of one sweep are visited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FillOrder {
    /// Non-decreasing `y`; cells sharing a layer keep row-major order.
    BottomUp,
    /// Uniform shuffle.
    Random,
}

impl FillOrder {
    pub fn name(self) -> &'static str {
        match self {
            Self::BottomUp => "bottom_up",
            Self::Random => "random",
        }
    }

    /// Reorder one sweep's candidates in place.
    pub fn apply(self, candidates: &mut [[usize; 3]], rng: &mut StdRng) {
        match self {
            // Stable, so equal layers stay in frontier order.
            Self::BottomUp => candidates.sort_by_key(|&[_, y, _]| y),
            Self::Random => candidates.shuffle(rng),
        }
    }
}

impl fmt::Display for FillOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FillOrder {
    type Err = GenerationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "bottom_up" => Ok(Self::BottomUp),
            "random" => Ok(Self::Random),
            other => Err(GenerationError::UnsupportedFillOrder(other.to_string())),
        }
    }
}

impl TryFrom<String> for FillOrder {
    type Error = GenerationError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<FillOrder> for String {
    fn from(order: FillOrder) -> Self {
        order.name().to_string()
    }
}

/// Unset cells with at least one known neighbour, as `[z, y, x]` in row-major order.
///
/// Out-of-range neighbours and known-empty neighbours never qualify a cell.
pub fn frontier(grid: &TokenGrid) -> Vec<[usize; 3]> {
    let shape = grid.shape();
    let mut candidates = Vec::new();
    for ([z, y, x], token) in grid.indexed_cells() {
        if CellState::of(token) != CellState::Unset {
            continue;
        }
        let touches_known = neighbours(z, y, x, shape)
            .any(|[nz, ny, nx]| grid.state(nz, ny, nx) == Some(CellState::Known));
        if touches_known {
            candidates.push([z, y, x]);
        }
    }
    candidates
}

/// In-range positions of the 3×3×3 block around a cell, centre excluded.
fn neighbours(z: usize, y: usize, x: usize, shape: [usize; 3]) -> impl Iterator<Item = [usize; 3]> {
    const OFFSETS: [isize; 3] = [-1, 0, 1];
    OFFSETS.into_iter().flat_map(move |dz| {
        OFFSETS.into_iter().flat_map(move |dy| {
            OFFSETS.into_iter().filter_map(move |dx| {
                if dz == 0 && dy == 0 && dx == 0 {
                    return None;
                }
                let nz = z.checked_add_signed(dz)?;
                let ny = y.checked_add_signed(dy)?;
                let nx = x.checked_add_signed(dx)?;
                (nz < shape[0] && ny < shape[1] && nx < shape[2]).then_some([nz, ny, nx])
            })
        })
    })
}

/// One resolved cell, yielded by [`InfillSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilledCell {
    pub token: Token,
    pub z: usize,
    pub y: usize,
    pub x: usize,
}

/// Summary of a drained session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InfillReport {
    pub cells_filled: usize,
    pub sweeps: usize,
}

/// Completes partially specified grids with samples from a [`SequenceModel`].
pub struct InfillGenerator<M> {
    model: M,
    temperature: f32,
    fill_order: FillOrder,
    rng: StdRng,
}

impl<M: SequenceModel> InfillGenerator<M> {
    /// Fails when the configured vocab size differs from the model's.
    pub fn new(model: M, config: &GeneratorConfig) -> Result<Self, GenerationError> {
        check_vocab_size(&model, config)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            model,
            temperature: config.temperature,
            fill_order: config.fill_order,
            rng,
        })
    }

    pub fn with_fill_order(mut self, fill_order: FillOrder) -> Self {
        self.fill_order = fill_order;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn fill_order(&self) -> FillOrder {
        self.fill_order
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Start a session over `grid`. The grid is mutated in place as cells are
    /// pulled from the returned iterator; dropping the iterator early leaves a
    /// valid partial grid that can be submitted again.
    pub fn fill_structure<'a>(
        &'a mut self,
        grid: &'a mut TokenGrid,
        prompt: Option<&'a str>,
    ) -> InfillSession<'a, M> {
        log::info!(
            "infill session over {:?} grid ({} order, temperature {})",
            grid.shape(),
            self.fill_order,
            self.temperature
        );
        InfillSession {
            model: &mut self.model,
            rng: &mut self.rng,
            grid,
            prompt,
            temperature: self.temperature,
            fill_order: self.fill_order,
            pending: VecDeque::new(),
            report: InfillReport::default(),
            started: Instant::now(),
            finished: false,
        }
    }

    /// Drain a session over `grid`, filling it in place.
    ///
    /// On error every cell resolved before the failure stays written, so the
    /// same grid can be passed in again to resume.
    pub fn complete_structure(
        &mut self,
        grid: &mut TokenGrid,
        prompt: Option<&str>,
    ) -> Result<InfillReport, GenerationError> {
        let mut session = self.fill_structure(grid, prompt);
        for filled in session.by_ref() {
            filled?;
        }
        Ok(session.report())
    }
}

/// Pull-based infill of one grid. Each `next()` resolves exactly one cell.
///
/// The session borrows the grid exclusively until it is dropped. After the
/// frontier runs dry or an error is returned, it yields `None` forever.
pub struct InfillSession<'a, M> {
    model: &'a mut M,
    rng: &'a mut StdRng,
    grid: &'a mut TokenGrid,
    prompt: Option<&'a str>,
    temperature: f32,
    fill_order: FillOrder,
    pending: VecDeque<[usize; 3]>,
    report: InfillReport,
    started: Instant,
    finished: bool,
}

impl<M: SequenceModel> InfillSession<'_, M> {
    pub fn report(&self) -> InfillReport {
        self.report
    }

    /// The grid as the session currently sees it.
    pub fn grid(&self) -> &TokenGrid {
        &*self.grid
    }

    /// Candidates left in the current sweep.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn begin_sweep(&mut self) -> bool {
        let mut candidates = frontier(self.grid);
        if candidates.is_empty() {
            return false;
        }
        self.fill_order.apply(&mut candidates, self.rng);
        self.report.sweeps += 1;
        log::debug!(
            "sweep {}: {} frontier cells",
            self.report.sweeps,
            candidates.len()
        );
        self.pending = candidates.into();
        true
    }

    fn resolve(&mut self, [z, y, x]: [usize; 3]) -> Result<FilledCell, GenerationError> {
        let vocab_size = self.model.vocab_size();
        let cell_count = self.grid.len();
        let position = self.grid.linear_index(z, y, x);

        let logits = self.model.predict(&self.grid.flatten(), self.prompt)?;
        check_logits(&logits, cell_count, vocab_size)?;
        let token = sample_token(
            logits.scores().row(position),
            self.temperature,
            &NEVER_SAMPLED,
            &mut *self.rng,
        )
        .ok_or(GenerationError::DegenerateDistribution { position })?;

        self.grid.set(z, y, x, token);
        self.report.cells_filled += 1;
        log::trace!("({z}, {y}, {x}) -> token {token}");
        Ok(FilledCell { token, z, y, x })
    }

    fn finish(&mut self) {
        self.finished = true;
        self.pending.clear();
        log::info!(
            "infill session finished: {} cells over {} sweeps in {:.2?}",
            self.report.cells_filled,
            self.report.sweeps,
            self.started.elapsed()
        );
    }
}

impl<M: SequenceModel> Iterator for InfillSession<'_, M> {
    type Item = Result<FilledCell, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.pending.is_empty() && !self.begin_sweep() {
            self.finish();
            return None;
        }
        let cell = self.pending.pop_front()?;
        match self.resolve(cell) {
            Ok(filled) => Some(Ok(filled)),
            Err(error) => {
                log::warn!("infill stopped at {cell:?}: {error}");
                self.finish();
                Some(Err(error))
            }
        }
    }
}

impl<M: SequenceModel> std::iter::FusedIterator for InfillSession<'_, M> {}
