// Core types shared across the simulation.
//
// Defines grid coordinates (`Position`), the board geometry (`GridDims`)
// that owns all wrap-aware arithmetic, the 8-way `Direction` compass, bot
// colors, and the typed slot-map handles for bots, colonies and tasks.
//
// Geometry convention: rows are bounded (`0..rows`, with rows 0 and
// `rows - 1` being permanent wall rows) while columns wrap, so the world is a
// horizontal cylinder. Row 0 is the top of the board; `Direction::Up`
// decreases the row.
//
// **Invariant:** every `Position` produced by `GridDims` has its column
// normalized into `0..cols`. Rows are left as computed so callers can detect
// (and treat as wall) anything that falls off the top or bottom.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;
use tapebots_prng::GameRng;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A cell on the board.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Manhattan distance ignoring the column wrap. Used as the A* heuristic.
    pub fn manhattan_distance(self, other: Self) -> u32 {
        (self.row - other.row).unsigned_abs() + (self.col - other.col).unsigned_abs()
    }

    /// Squared Euclidean distance ignoring the column wrap. Used to rank
    /// colony members for task assignment.
    pub fn squared_distance(self, other: Self) -> i64 {
        let dr = (self.row - other.row) as i64;
        let dc = (self.col - other.col) as i64;
        dr * dr + dc * dc
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(r{}, c{})", self.row, self.col)
    }
}

/// Board dimensions plus all wrap-aware position arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDims {
    pub rows: i32,
    pub cols: i32,
}

impl GridDims {
    pub const fn new(rows: i32, cols: i32) -> Self {
        Self { rows, cols }
    }

    /// Total number of cells.
    pub fn cells(self) -> usize {
        (self.rows as usize) * (self.cols as usize)
    }

    /// Build a position, wrapping the column.
    pub fn pos(self, row: i32, col: i32) -> Position {
        Position::new(row, col.rem_euclid(self.cols))
    }

    /// `pos` shifted by `(dr, dc)`, column wrapped, row unclamped.
    pub fn offset(self, pos: Position, dr: i32, dc: i32) -> Position {
        self.pos(pos.row + dr, pos.col + dc)
    }

    /// The neighbouring cell in direction `dir`.
    pub fn step(self, pos: Position, dir: Direction) -> Position {
        let (dr, dc) = dir.delta();
        self.offset(pos, dr, dc)
    }

    /// Whether the row lies on the board (walls included).
    pub fn contains_row(self, pos: Position) -> bool {
        pos.row >= 0 && pos.row < self.rows
    }

    /// Whether the row lies strictly between the two wall rows.
    pub fn is_inner_row(self, pos: Position) -> bool {
        pos.row >= 1 && pos.row < self.rows - 1
    }

    /// Flat index of an on-board position. Panics if the row is off the board.
    pub fn index(self, pos: Position) -> usize {
        assert!(self.contains_row(pos), "index: row {} off the board", pos.row);
        (pos.row as usize) * (self.cols as usize) + pos.col.rem_euclid(self.cols) as usize
    }

    /// Inverse of `index`.
    pub fn position_of(self, index: usize) -> Position {
        let cols = self.cols as usize;
        Position::new((index / cols) as i32, (index % cols) as i32)
    }

    /// Chebyshev-style radius check with a toroidal delta on both axes.
    pub fn in_radius(self, pos: Position, center: Position, radius: i32) -> bool {
        let dr = toroidal_delta(pos.row, center.row, self.rows);
        let dc = toroidal_delta(pos.col, center.col, self.cols);
        dr <= radius && dc <= radius
    }

    /// A uniformly random position between the wall rows.
    pub fn random_inner_pos(self, rng: &mut GameRng) -> Position {
        let row = rng.range_i32(1, (self.rows - 1).max(2));
        let col = rng.range_i32(0, self.cols);
        Position::new(row, col)
    }
}

fn toroidal_delta(a: i32, b: i32, size: i32) -> i32 {
    let d = (a - b).abs();
    d.min(size - d)
}

// ---------------------------------------------------------------------------
// Directions
// ---------------------------------------------------------------------------

/// The 8 compass directions in clockwise order starting at `Up`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
}

impl Direction {
    /// Clockwise order; a cell's neighbour table follows the same order.
    pub const CLOCKWISE: [Direction; 8] = [
        Direction::Up,
        Direction::UpRight,
        Direction::Right,
        Direction::DownRight,
        Direction::Down,
        Direction::DownLeft,
        Direction::Left,
        Direction::UpLeft,
    ];

    /// The four directions used for connectivity, A* and flow fields.
    pub const CARDINAL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    /// `(row delta, col delta)`.
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (-1, 0),
            Direction::UpRight => (-1, 1),
            Direction::Right => (0, 1),
            Direction::DownRight => (1, 1),
            Direction::Down => (1, 0),
            Direction::DownLeft => (1, -1),
            Direction::Left => (0, -1),
            Direction::UpLeft => (-1, -1),
        }
    }

    /// Decode a genome value into a direction (`value mod 8`, never negative).
    pub fn from_gene(value: i32) -> Self {
        Self::CLOCKWISE[value.rem_euclid(8) as usize]
    }

    /// A random cardinal direction, used as the facing of new bots.
    pub fn random_cardinal(rng: &mut GameRng) -> Self {
        Self::CARDINAL[rng.range_usize(0, 4)]
    }
}

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

/// Display color as linear RGB in `[0, 1]`. Only the renderer reads it; the
/// sim recolors bots to expose colony state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color(pub [f32; 3]);

impl Color {
    pub const RED: Color = Color([1.0, 0.0, 0.0]);
    pub const YELLOW: Color = Color([1.0, 1.0, 0.0]);
    pub const CYAN: Color = Color([0.0, 1.0, 1.0]);
    pub const GREEN: Color = Color([0.0, 1.0, 0.0]);

    pub fn random(rng: &mut GameRng) -> Self {
        Color([rng.next_f32(), rng.next_f32(), rng.next_f32()])
    }

    /// Nudge each channel by up to `strength` in either direction, clamped.
    pub fn mutated(self, strength: f32, rng: &mut GameRng) -> Self {
        let mut out = self.0;
        for channel in &mut out {
            let delta = (rng.next_f32() * 2.0 - 1.0) * strength;
            *channel = (*channel + delta).clamp(0.0, 1.0);
        }
        Color(out)
    }

    /// Shift toward one channel, used by the optional resource-based tinting.
    pub fn tinted(self, channel: usize, delta: f32) -> Self {
        let mut out = self.0;
        for (i, c) in out.iter_mut().enumerate() {
            let d = if i == channel { delta } else { -delta };
            *c = (*c + d).clamp(0.0, 1.0);
        }
        Color(out)
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

new_key_type! {
    /// Generational handle into the bot arena. A handle to a dead bot never
    /// resolves to the bot that later reuses its slot.
    pub struct BotId;

    /// Handle to a colony.
    pub struct ColonyId;

    /// Handle to a task inside its colony's task table.
    pub struct TaskId;
}
