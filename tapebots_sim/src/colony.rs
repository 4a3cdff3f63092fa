// Colonies and their tasks.
//
// A colony is founded when a bot builds a `Controller`. It owns its member
// list, its flags, the water bodies its members have sighted, and a task
// table (`SlotMap<TaskId, ColonyTask>`). Tasks are how a colony turns a
// sighting into a line of stationed bots:
//
// - `FindWater` is a marker task that stays open until the first sighting.
// - `ConnectToPosition` asks the planner for a path from the controller to a
//   sighted water tile (see `tasking.rs`).
// - `MaintainConnection` is one per tile of that path. Its owner walks to the
//   tile and, once there, the task is done and the bot stays on station as a
//   connectivity conduit.
//
// Task status is the boolean `done` plus an optional owner. Ownership is a
// two-sided link (`ColonyTask::owner` and `Bot::current_task`) and only
// `assign_task` / `unassign_task` / `release_task_of_dead` touch it, so
// the two sides never disagree.
//
// See also: `tasking.rs` for the per-tick scheduling policy, `sim.rs` for
// the controller phase that drives it, `bot.rs` for the bot side.
//
// **Invariant:** a task has at most one owner, a bot has at most one task,
// and `bot.current_task == Some(t)` iff `tasks[t].owner == Some(bot)`.
// Violations panic.

use crate::bot::{Bot, BotArena};
use crate::pathfinding::FlowField;
use crate::types::{BotId, ColonyId, Color, Position, TaskId};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

pub type ColonyArena = SlotMap<ColonyId, Colony>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    FindWater,
    ConnectToPosition,
    MaintainConnection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColonyTask {
    pub kind: TaskKind,
    pub pos: Position,
    pub owner: Option<BotId>,
    pub done: bool,
    /// Planning passes spent on a `ConnectToPosition` task.
    pub attempts: u32,
    /// Tick after which an owner that has not finished is relieved.
    pub expires_at: u64,
}

impl ColonyTask {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at < now
    }
}

/// A water tile a member has looked at, tagged with its water body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterSighting {
    pub pos: Position,
    pub group: u32,
}

#[derive(Clone, Debug)]
pub struct Colony {
    /// Position of the controller.
    pub center: Position,
    pub color: Color,
    pub members: Vec<BotId>,
    pub flags: Vec<Position>,
    pub tasks: SlotMap<TaskId, ColonyTask>,
    pub water: Vec<WaterSighting>,
    /// Cells between the controller and the connection target, controller
    /// side first, target excluded.
    pub path_to_water: Vec<Position>,
    pub flow_field: Option<FlowField>,
    /// Tasks with an owner, kept in step with the owner links.
    pub assigned_tasks: usize,
    /// Ticks of bookkeeping run so far.
    pub age: u64,
}

impl Colony {
    pub fn new(center: Position, color: Color) -> Self {
        Self {
            center,
            color,
            members: Vec::new(),
            flags: Vec::new(),
            tasks: SlotMap::with_key(),
            water: Vec::new(),
            path_to_water: Vec::new(),
            flow_field: None,
            assigned_tasks: 0,
            age: 0,
        }
    }

    pub fn add_member(&mut self, id: BotId) {
        if !self.members.contains(&id) {
            self.members.push(id);
        }
    }

    pub fn remove_member(&mut self, id: BotId) {
        if let Some(i) = self.members.iter().position(|m| *m == id) {
            self.members.swap_remove(i);
        }
    }

    pub fn knows_water_group(&self, group: u32) -> bool {
        self.water.iter().any(|w| w.group == group)
    }

    /// Remember a sighting unless its water body is already known. Returns
    /// whether it was new.
    pub fn add_water_sighting(&mut self, pos: Position, group: u32) -> bool {
        if self.knows_water_group(group) {
            return false;
        }
        self.water.push(WaterSighting { pos, group });
        true
    }

    pub fn has_task_of(&self, kind: TaskKind) -> bool {
        self.tasks.values().any(|t| t.kind == kind)
    }

    pub fn add_task(&mut self, kind: TaskKind, pos: Position, expires_at: u64) -> TaskId {
        self.tasks.insert(ColonyTask {
            kind,
            pos,
            owner: None,
            done: false,
            attempts: 0,
            expires_at,
        })
    }

    /// Owned tasks that are not yet done.
    pub fn busy_task_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.owner.is_some() && !t.done)
            .count()
    }

    /// Clear the owner of a task whose owner just died. A finished
    /// `MaintainConnection` tile reopens so another member can take over.
    pub fn release_task_of_dead(&mut self, task: TaskId, dead: BotId) {
        let Some(t) = self.tasks.get_mut(task) else {
            return;
        };
        assert_eq!(t.owner, Some(dead), "dead bot does not own task {task:?}");
        t.owner = None;
        if t.kind == TaskKind::MaintainConnection {
            t.done = false;
        }
        self.assigned_tasks -= 1;
    }
}

/// Resolve the task a bot currently holds.
pub fn current_task<'a>(colonies: &'a ColonyArena, bot: &Bot) -> Option<&'a ColonyTask> {
    let task = bot.current_task?;
    colonies.get(bot.colony?)?.tasks.get(task)
}

/// A bot whose `MaintainConnection` task is still open always walks.
pub fn is_walking_to_station(colonies: &ColonyArena, bot: &Bot) -> bool {
    current_task(colonies, bot)
        .is_some_and(|t| t.kind == TaskKind::MaintainConnection && !t.done)
}

/// A bot on a finished `MaintainConnection` tile holds still.
pub fn is_stationed(colonies: &ColonyArena, bot: &Bot) -> bool {
    current_task(colonies, bot).is_some_and(|t| t.kind == TaskKind::MaintainConnection && t.done)
}

/// Give `task` to `bot`. Both must be free. Resets the task's expiry window
/// and drops any stale path the bot was following.
pub fn assign_task(
    colony: &mut Colony,
    bots: &mut BotArena,
    bot_id: BotId,
    task_id: TaskId,
    expires_at: u64,
) {
    let bot = bots.get_mut(bot_id).expect("assign_task: bot is not alive");
    let task = colony
        .tasks
        .get_mut(task_id)
        .expect("assign_task: task does not belong to this colony");
    assert!(bot.current_task.is_none(), "assign_task: bot already has a task");
    assert!(task.owner.is_none(), "assign_task: task already has an owner");

    task.owner = Some(bot_id);
    task.expires_at = expires_at;
    bot.current_task = Some(task_id);
    bot.path.clear();
    colony.assigned_tasks += 1;
}

/// Take the current task away from `bot` and start its cooldown. The task
/// keeps its `done` flag.
pub fn unassign_task(
    colony: &mut Colony,
    bots: &mut BotArena,
    bot_id: BotId,
    now: u64,
    expires_at: u64,
    cooldown_ticks: u64,
) {
    let bot = bots.get_mut(bot_id).expect("unassign_task: bot is not alive");
    let task_id = bot
        .current_task
        .take()
        .expect("unassign_task: bot has no task");
    let task = colony
        .tasks
        .get_mut(task_id)
        .expect("unassign_task: task does not belong to this colony");
    assert_eq!(task.owner, Some(bot_id), "unassign_task: owner link broken");

    task.owner = None;
    task.expires_at = expires_at;
    bot.path.clear();
    bot.start_cooldown(now, cooldown_ticks);
    colony.assigned_tasks -= 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::Genome;
    use crate::types::Direction;
    use tapebots_prng::GameRng;

    fn setup() -> (Colony, BotArena, BotId, TaskId) {
        let mut rng = GameRng::new(1);
        let mut bots = BotArena::with_key();
        let id = bots.insert(Bot::new(
            Position::new(2, 2),
            Direction::Up,
            Genome::random(8, &mut rng),
            100,
            Color::RED,
        ));
        let mut colony = Colony::new(Position::new(1, 1), Color::RED);
        colony.add_member(id);
        let task = colony.add_task(TaskKind::MaintainConnection, Position::new(3, 3), 0);
        (colony, bots, id, task)
    }

    #[test]
    fn assign_links_both_sides() {
        let (mut colony, mut bots, id, task) = setup();
        assign_task(&mut colony, &mut bots, id, task, 40);
        assert_eq!(colony.tasks[task].owner, Some(id));
        assert_eq!(colony.tasks[task].expires_at, 40);
        assert_eq!(bots[id].current_task, Some(task));
        assert_eq!(colony.assigned_tasks, 1);
        assert_eq!(colony.busy_task_count(), 1);
    }

    #[test]
    fn unassign_clears_both_sides_and_starts_cooldown() {
        let (mut colony, mut bots, id, task) = setup();
        assign_task(&mut colony, &mut bots, id, task, 40);
        unassign_task(&mut colony, &mut bots, id, 10, 60, 5);
        assert_eq!(colony.tasks[task].owner, None);
        assert_eq!(bots[id].current_task, None);
        assert!(bots[id].has_cooldown(14));
        assert_eq!(colony.assigned_tasks, 0);
    }

    #[test]
    #[should_panic(expected = "task already has an owner")]
    fn double_assignment_panics() {
        let (mut colony, mut bots, id, task) = setup();
        assign_task(&mut colony, &mut bots, id, task, 40);
        bots[id].current_task = None;
        assign_task(&mut colony, &mut bots, id, task, 40);
    }

    #[test]
    #[should_panic(expected = "bot has no task")]
    fn unassigning_a_free_bot_panics() {
        let (mut colony, mut bots, id, _) = setup();
        unassign_task(&mut colony, &mut bots, id, 0, 0, 0);
    }

    #[test]
    fn dead_owner_reopens_a_finished_station() {
        let (mut colony, mut bots, id, task) = setup();
        assign_task(&mut colony, &mut bots, id, task, 40);
        colony.tasks[task].done = true;
        colony.release_task_of_dead(task, id);
        assert_eq!(colony.tasks[task].owner, None);
        assert!(!colony.tasks[task].done);
        assert_eq!(colony.assigned_tasks, 0);
    }

    #[test]
    fn water_sightings_dedupe_by_group() {
        let mut colony = Colony::new(Position::new(1, 1), Color::RED);
        assert!(colony.add_water_sighting(Position::new(4, 4), 7));
        assert!(!colony.add_water_sighting(Position::new(4, 5), 7));
        assert!(colony.add_water_sighting(Position::new(9, 9), 2));
        assert_eq!(colony.water.len(), 2);
        assert!(colony.knows_water_group(2));
    }

    #[test]
    fn station_predicates_follow_done_flag() {
        let (mut colony, mut bots, id, task) = setup();
        let mut colonies = ColonyArena::with_key();
        assign_task(&mut colony, &mut bots, id, task, 40);
        let cid = colonies.insert(colony);
        bots[id].colony = Some(cid);
        assert!(is_walking_to_station(&colonies, &bots[id]));
        assert!(!is_stationed(&colonies, &bots[id]));
        colonies[cid].tasks[task].done = true;
        assert!(is_stationed(&colonies, &bots[id]));
    }
}
