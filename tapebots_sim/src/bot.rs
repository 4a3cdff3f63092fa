// Bots: the genome-driven agents that live on the board.
//
// Bots are stored in a generational slot arena (`BotArena`, a
// `slotmap::SlotMap`). Population churn is high, so freed slots are reused by
// the next birth, but every birth inserts a freshly constructed `Bot` and a
// stale `BotId` for the dead occupant fails lookup instead of resolving to
// the newcomer.
//
// All links between bots and colonies are handles: `parent` and `offspring`
// form the lineage tree, `colony` points at the owning colony, and
// `current_task` names a task inside that colony's task table. None of these
// are edited ad hoc: lineage links go through `link_child` / `unlink`, task
// ownership through `colony::assign_task` / `colony::unassign_task`.
//
// See also: `genome.rs` for the VM state each bot carries, `sim.rs` for
// birth and death bookkeeping, `colony.rs` for task ownership.

use crate::genome::Genome;
use crate::types::{BotId, ColonyId, Color, Direction, Position, TaskId};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use smallvec::SmallVec;
use std::collections::VecDeque;

pub type BotArena = SlotMap<BotId, Bot>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bot {
    pub pos: Position,
    pub facing: Direction,
    pub genome: Genome,
    pub inventory: i32,
    pub hp: i32,
    pub color: Color,
    pub colony: Option<ColonyId>,
    /// Reached by the last connectivity flood-fill of `colony`.
    pub connected: bool,
    pub parent: Option<BotId>,
    pub offspring: SmallVec<[BotId; 4]>,
    pub current_task: Option<TaskId>,
    /// Remaining steps of the A* path toward the current task, next first.
    pub path: VecDeque<Position>,
    /// Tick before which the bot may not take a new task.
    pub cooldown_until: u64,
}

impl Bot {
    pub fn new(pos: Position, facing: Direction, genome: Genome, hp: i32, color: Color) -> Self {
        Self {
            pos,
            facing,
            genome,
            inventory: 0,
            hp,
            color,
            colony: None,
            connected: false,
            parent: None,
            offspring: SmallVec::new(),
            current_task: None,
            path: VecDeque::new(),
            cooldown_until: 0,
        }
    }

    pub fn has_cooldown(&self, now: u64) -> bool {
        now < self.cooldown_until
    }

    pub fn start_cooldown(&mut self, now: u64, ticks: u64) {
        self.cooldown_until = now + ticks;
    }

    pub fn is_free(&self, now: u64) -> bool {
        self.current_task.is_none() && !self.has_cooldown(now)
    }

    pub fn same_colony(&self, other: &Bot) -> bool {
        self.colony.is_some() && self.colony == other.colony
    }
}

/// Record `child` as an offspring of `parent`.
pub fn link_child(bots: &mut BotArena, parent: BotId, child: BotId) {
    if let Some(c) = bots.get_mut(child) {
        c.parent = Some(parent);
    }
    if let Some(p) = bots.get_mut(parent) {
        p.offspring.push(child);
    }
}

/// Cut every lineage link that points at `id`: its parent's offspring entry
/// and its children's parent field. Called before the slot is freed.
pub fn unlink(bots: &mut BotArena, id: BotId) {
    let Some(bot) = bots.get_mut(id) else {
        return;
    };
    let parent = bot.parent.take();
    let children = std::mem::take(&mut bot.offspring);
    if let Some(p) = parent.and_then(|p| bots.get_mut(p)) {
        p.offspring.retain(|c| *c != id);
    }
    for child in children {
        if let Some(c) = bots.get_mut(child) {
            c.parent = None;
        }
    }
}

/// Number of bots in the living lineage rooted at `root` (itself included).
/// Iterative, so deep lineages cannot overflow the stack.
pub fn lineage_size(bots: &BotArena, root: BotId) -> usize {
    if !bots.contains_key(root) {
        return 0;
    }
    let mut count = 0;
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(bot) = bots.get(id) else {
            continue;
        };
        count += 1;
        stack.extend(bot.offspring.iter().copied());
    }
    count
}
