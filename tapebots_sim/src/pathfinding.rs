// Grid pathfinding: A* between two cells and multi-source BFS flow fields.
//
// Both searches are 4-directional over the wrapped board: columns wrap, rows
// outside the board are never expanded. Passability is a caller-supplied
// predicate because it varies by call site (task walking only crosses empty
// cells, connection planning may cross any bot).
//
// A* uses a `BinaryHeap` (min-heap via reversed ordering) with `g_score`,
// `came_from` and `closed` stored in `Vec`s indexed by flat cell index for
// O(1) access and deterministic behavior (no `HashMap`). The heuristic is
// Manhattan distance *without* the column wrap, so paths that cross the
// seam are found but not favoured.
//
// `FlowField` stores a `u16` distance per cell to the nearest source, with
// `FlowField::UNREACHABLE` for cells the BFS never reached. Bots that lose
// their A* path step "downhill" on it toward the colony's water line.
//
// See also: `tasking.rs` (connection planning), `vm.rs` (task-bound
// movement), `board.rs` for the passability queries.

use crate::types::{Direction, GridDims, Position};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

/// Entry in the A* open set (min-heap via reversed ordering).
#[derive(PartialEq, Eq)]
struct OpenEntry {
    index: usize,
    f_score: u32,
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score is "greatest".
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Find a shortest 4-directional path from `start` to `goal`.
///
/// The returned path excludes `start` and ends at `goal`; every cell before
/// `goal` satisfies `passable`. `goal` itself is always enterable. Returns
/// `Some(vec![])` when `start == goal`, and `None` when no path exists,
/// including the cheap rejection of a start with no enterable neighbour.
pub fn astar(
    dims: GridDims,
    start: Position,
    goal: Position,
    passable: impl Fn(Position) -> bool,
) -> Option<Vec<Position>> {
    if !dims.contains_row(start) || !dims.contains_row(goal) {
        return None;
    }
    let start = dims.pos(start.row, start.col);
    let goal = dims.pos(goal.row, goal.col);
    if start == goal {
        return Some(Vec::new());
    }

    let enterable = |p: Position| dims.contains_row(p) && (p == goal || passable(p));

    if !Direction::CARDINAL
        .iter()
        .any(|&d| enterable(dims.step(start, d)))
    {
        return None;
    }

    let n = dims.cells();
    let start_i = dims.index(start);
    let goal_i = dims.index(goal);

    let mut g_score = vec![u32::MAX; n];
    let mut came_from: Vec<Option<usize>> = vec![None; n];
    let mut closed = vec![false; n];

    g_score[start_i] = 0;

    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        index: start_i,
        f_score: start.manhattan_distance(goal),
    });

    while let Some(current) = open.pop() {
        let ci = current.index;
        if ci == goal_i {
            return Some(reconstruct_path(dims, &came_from, start_i, goal_i));
        }
        if closed[ci] {
            continue;
        }
        closed[ci] = true;

        let current_pos = dims.position_of(ci);
        let tentative_g = g_score[ci] + 1;

        for dir in Direction::CARDINAL {
            let next = dims.step(current_pos, dir);
            if !enterable(next) {
                continue;
            }
            let ni = dims.index(next);
            if closed[ni] {
                continue;
            }
            if tentative_g < g_score[ni] {
                g_score[ni] = tentative_g;
                came_from[ni] = Some(ci);
                open.push(OpenEntry {
                    index: ni,
                    f_score: tentative_g + next.manhattan_distance(goal),
                });
            }
        }
    }

    None
}

/// Walk `came_from` back from the goal. The start cell is not included.
fn reconstruct_path(
    dims: GridDims,
    came_from: &[Option<usize>],
    start: usize,
    goal: usize,
) -> Vec<Position> {
    let mut path = Vec::new();
    let mut current = goal;
    while current != start {
        path.push(dims.position_of(current));
        match came_from[current] {
            Some(prev) => current = prev,
            None => break,
        }
    }
    path.reverse();
    path
}

// ---------------------------------------------------------------------------
// Flow field
// ---------------------------------------------------------------------------

/// Per-cell BFS distance to the nearest of a set of source cells.
#[derive(Clone, Debug)]
pub struct FlowField {
    dims: GridDims,
    dist: Vec<u16>,
}

impl FlowField {
    /// Distance stored for cells the search never reached.
    pub const UNREACHABLE: u16 = u16::MAX;

    /// Multi-source BFS. Sources get distance 0 regardless of `passable`;
    /// every other reached cell satisfies it. Off-board sources are ignored.
    pub fn compute(
        dims: GridDims,
        sources: &[Position],
        passable: impl Fn(Position) -> bool,
    ) -> Self {
        let mut dist = vec![Self::UNREACHABLE; dims.cells()];
        let mut queue = VecDeque::with_capacity(sources.len());
        for &src in sources {
            if !dims.contains_row(src) {
                continue;
            }
            let i = dims.index(src);
            if dist[i] != 0 {
                dist[i] = 0;
                queue.push_back(i);
            }
        }

        let mut last = 0;
        while let Some(i) = queue.pop_front() {
            let d = dist[i];
            debug_assert!(d >= last, "flow field popped {d} after {last}");
            last = d;
            // Saturate one below the sentinel so reached cells never alias it.
            if d >= Self::UNREACHABLE - 1 {
                continue;
            }
            let pos = dims.position_of(i);
            for dir in Direction::CARDINAL {
                let next = dims.step(pos, dir);
                if !dims.contains_row(next) || !passable(next) {
                    continue;
                }
                let ni = dims.index(next);
                if dist[ni] > d + 1 {
                    dist[ni] = d + 1;
                    queue.push_back(ni);
                }
            }
        }

        Self { dims, dist }
    }

    /// `UNREACHABLE` for rows off the board as well as unreached cells.
    pub fn distance(&self, pos: Position) -> u16 {
        if !self.dims.contains_row(pos) {
            return Self::UNREACHABLE;
        }
        self.dist[self.dims.index(pos)]
    }

    /// The cardinal neighbour with the smallest distance strictly below
    /// `pos`'s own, if any. Ties resolve in `Direction::CARDINAL` order.
    pub fn downhill(&self, pos: Position) -> Option<Position> {
        let here = self.distance(pos);
        let mut best: Option<(u16, Position)> = None;
        for dir in Direction::CARDINAL {
            let next = self.dims.step(pos, dir);
            let d = self.distance(next);
            if d < here && best.is_none_or(|(bd, _)| d < bd) {
                best = Some((d, next));
            }
        }
        best.map(|(_, p)| p)
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// Raw distances in row-major order, for debug overlays.
    pub fn distances(&self) -> &[u16] {
        &self.dist
    }
}
