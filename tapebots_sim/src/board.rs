// Dense 2D board for the bot world.
//
// The board is stored as a flat `Vec<Occupant>` indexed by
// `row * cols + col`, giving O(1) read/write access, with a parallel
// occupancy bitmap for the hot "is this cell free" checks. Out-of-row reads
// return `Empty`; out-of-row writes are no-ops. Columns always wrap.
//
// Change tracking: every write marks its cell dirty. The dirty bitmap and the
// `patch` list move together (`dirty[i]` is true exactly when `i` appears
// once in `patch`), so a renderer can either scan the bitmap or drain the
// patch with `pull_patch()` and redraw only what changed. Tracking has no
// influence on the simulation itself.
//
// A neighbour table precomputed at construction maps each cell to its 8
// clockwise neighbours (`None` above the top row / below the bottom row), so
// `find_empty_pos_around` never redoes wrap arithmetic in the hot loop.
//
// See also: `occupant.rs` for the cell variants, `sim.rs` which owns the
// `Board` as part of `SimState`.

use crate::occupant::Occupant;
use crate::types::{BotId, Direction, GridDims, Position};
use tapebots_prng::GameRng;

/// The world grid.
#[derive(Clone, Debug)]
pub struct Board {
    dims: GridDims,
    cells: Vec<Occupant>,
    occupied: Vec<bool>,
    dirty: Vec<bool>,
    patch: Vec<usize>,
    neighbours: Vec<[Option<u32>; 8]>,
}

impl Board {
    /// Create an all-empty board. Wall rows are not placed here; world
    /// generation fills them in.
    pub fn new(dims: GridDims) -> Self {
        let total = dims.cells();
        Self {
            dims,
            cells: vec![Occupant::Empty; total],
            occupied: vec![false; total],
            dirty: vec![false; total],
            patch: Vec::new(),
            neighbours: build_neighbour_table(dims),
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// Read a cell. Returns `Empty` for rows off the board.
    pub fn at(&self, pos: Position) -> Occupant {
        if !self.dims.contains_row(pos) {
            return Occupant::Empty;
        }
        self.cells[self.dims.index(pos)]
    }

    /// Write a cell. No-op for rows off the board.
    pub fn set(&mut self, pos: Position, occupant: Occupant) {
        if !self.dims.contains_row(pos) {
            return;
        }
        let i = self.dims.index(pos);
        self.occupied[i] = !occupant.is_empty();
        self.cells[i] = occupant;
        self.mark_dirty(i);
    }

    /// Empty a cell. No-op for rows off the board.
    pub fn clear(&mut self, pos: Position) {
        self.set(pos, Occupant::Empty);
    }

    /// True for on-board cells holding nothing.
    pub fn is_empty(&self, pos: Position) -> bool {
        self.dims.contains_row(pos) && !self.occupied[self.dims.index(pos)]
    }

    /// Rows off the board and the two border rows are walls.
    pub fn is_wall(&self, pos: Position) -> bool {
        !self.dims.contains_row(pos) || pos.row == 0 || pos.row == self.dims.rows - 1
    }

    /// The bot standing on `pos`, if any.
    pub fn bot_at(&self, pos: Position) -> Option<BotId> {
        self.at(pos).bot()
    }

    /// Cell that is empty or holds a bot, excluding the wall rows.
    pub fn is_empty_or_bot(&self, pos: Position) -> bool {
        self.dims.is_inner_row(pos) && matches!(self.at(pos), Occupant::Empty | Occupant::Bot(_))
    }

    /// True when none of the four cardinal neighbours is empty.
    pub fn is_surrounded(&self, pos: Position) -> bool {
        Direction::CARDINAL
            .iter()
            .all(|&d| !self.is_empty(self.dims.step(pos, d)))
    }

    /// First free neighbour in clockwise order, starting from a random offset
    /// so repeated calls carry no directional bias. `None` if all 8 are taken.
    pub fn find_empty_pos_around(&self, pos: Position, rng: &mut GameRng) -> Option<Position> {
        if !self.dims.contains_row(pos) {
            return None;
        }
        let table = &self.neighbours[self.dims.index(pos)];
        let start = rng.range_usize(0, 8);
        (0..8)
            .filter_map(|k| table[(start + k) & 7])
            .map(|n| n as usize)
            .find(|&n| !self.occupied[n])
            .map(|n| self.dims.position_of(n))
    }

    /// Flag a cell for redraw. Idempotent.
    pub fn mark_dirty(&mut self, i: usize) {
        if !self.dirty[i] {
            self.dirty[i] = true;
            self.patch.push(i);
        }
    }

    /// Acknowledge a single redrawn cell.
    pub fn mark_clean(&mut self, i: usize) {
        if self.dirty[i] {
            self.dirty[i] = false;
            self.patch.retain(|&p| p != i);
        }
    }

    pub fn dirty_bitmap(&self) -> &[bool] {
        &self.dirty
    }

    /// Drain every pending change. Afterwards the bitmap is all-false.
    pub fn pull_patch(&mut self) -> Vec<usize> {
        let patch = std::mem::take(&mut self.patch);
        for &i in &patch {
            self.dirty[i] = false;
        }
        patch
    }

    /// Iterate `(position, occupant)` over every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (Position, Occupant)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, o)| (self.dims.position_of(i), *o))
    }
}

fn build_neighbour_table(dims: GridDims) -> Vec<[Option<u32>; 8]> {
    (0..dims.cells())
        .map(|i| {
            let pos = dims.position_of(i);
            let mut row = [None; 8];
            for (slot, dir) in row.iter_mut().zip(Direction::CLOCKWISE) {
                let n = dims.step(pos, dir);
                if dims.contains_row(n) {
                    *slot = Some(dims.index(n) as u32);
                }
            }
            row
        })
        .collect()
}
