// Per-tick task scheduling for one colony.
//
// Called from the controller phase in `sim.rs` after connectivity and
// resource distribution. Works on one colony at a time and only touches that
// colony, the bot arena (for ownership links) and a read-only board.
//
// Three passes, in order:
//
// 1. Every `flow_field_interval` ticks of colony age, rebuild the flow field
//    toward the cached `path_to_water`.
// 2. Plan each open `ConnectToPosition`: A* from the controller to the
//    target, crossing empty cells and any bot. A path becomes one
//    `MaintainConnection` task per intermediate tile. No path is retried up
//    to `connect_max_attempts` planning passes, then abandoned (marked done
//    with no owner).
// 3. Schedule each open `MaintainConnection`: a member already standing on
//    the tile drops any other task (cooldown included), takes this one and
//    is done at once; an owner past its expiry is relieved with a
//    cooldown; an ownerless tile goes to the nearest free member.
//
// See also: `colony.rs` for the task table and the assign/unassign pair,
// `pathfinding.rs` for A* and the flow field, `vm.rs` for how owners walk.

use crate::board::Board;
use crate::bot::BotArena;
use crate::colony::{self, Colony, TaskKind};
use crate::config::ColonyParams;
use crate::event::{SimEventKind, StepResult};
use crate::pathfinding::{FlowField, astar};
use crate::types::{BotId, ColonyId, Position, TaskId};
use tracing::debug;

/// Run scheduling for `colony` at tick `now`.
pub fn process_colony_tasks(
    colony_id: ColonyId,
    colony: &mut Colony,
    bots: &mut BotArena,
    board: &Board,
    params: &ColonyParams,
    now: u64,
    out: &mut StepResult,
) {
    if colony.age % params.flow_field_interval == 0 {
        refresh_flow_field(colony, board);
    }
    plan_connections(colony_id, colony, board, params, now, out);
    schedule_maintenance(colony_id, colony, bots, board, params, now, out);
}

/// Rebuild the flow field toward the path to water, or drop it when there
/// is no path.
pub fn refresh_flow_field(colony: &mut Colony, board: &Board) {
    colony.flow_field = if colony.path_to_water.is_empty() {
        None
    } else {
        Some(FlowField::compute(board.dims(), &colony.path_to_water, |p| {
            board.is_empty(p)
        }))
    };
}

fn open_tasks(colony: &Colony, kind: TaskKind) -> Vec<TaskId> {
    colony
        .tasks
        .iter()
        .filter(|(_, t)| t.kind == kind && !t.done)
        .map(|(id, _)| id)
        .collect()
}

fn plan_connections(
    colony_id: ColonyId,
    colony: &mut Colony,
    board: &Board,
    params: &ColonyParams,
    now: u64,
    out: &mut StepResult,
) {
    for task_id in open_tasks(colony, TaskKind::ConnectToPosition) {
        let task = &mut colony.tasks[task_id];
        task.attempts += 1;
        let (target, attempts) = (task.pos, task.attempts);

        let Some(mut path) = astar(board.dims(), colony.center, target, |p| {
            board.is_empty_or_bot(p)
        }) else {
            if attempts >= params.connect_max_attempts {
                colony.tasks[task_id].done = true;
                debug!(tick = now, colony = ?colony_id, %target, attempts, "connection abandoned");
                out.push(
                    now,
                    SimEventKind::ConnectionAbandoned {
                        colony: colony_id,
                        target,
                        attempts,
                    },
                );
            }
            continue;
        };

        if path.last() == Some(&target) {
            path.pop();
        }
        let expires_at = now + params.task_expiry_ticks;
        for &tile in &path {
            colony.add_task(TaskKind::MaintainConnection, tile, expires_at);
        }
        let tiles = path.len();
        colony.path_to_water = path;
        refresh_flow_field(colony, board);
        colony.tasks[task_id].done = true;

        debug!(tick = now, colony = ?colony_id, %target, tiles, "connection planned");
        out.push(
            now,
            SimEventKind::ConnectionPlanned {
                colony: colony_id,
                target,
                tiles,
            },
        );
    }
}

fn schedule_maintenance(
    colony_id: ColonyId,
    colony: &mut Colony,
    bots: &mut BotArena,
    board: &Board,
    params: &ColonyParams,
    now: u64,
    out: &mut StepResult,
) {
    let expires_at = now + params.task_expiry_ticks;
    for task_id in open_tasks(colony, TaskKind::MaintainConnection) {
        let task = &colony.tasks[task_id];
        let (pos, owner, expired) = (task.pos, task.owner, task.is_expired(now));

        match owner {
            Some(owner) => {
                if expired {
                    colony::unassign_task(colony, bots, owner, now, expires_at, params.cooldown_ticks);
                    debug!(tick = now, colony = ?colony_id, bot = ?owner, %pos, "task expired");
                    out.push(
                        now,
                        SimEventKind::TaskExpired {
                            colony: colony_id,
                            bot: owner,
                            pos,
                        },
                    );
                }
            }
            None => {
                if let Some(standing) = member_on(colony_id, bots, board, pos) {
                    if bots[standing].current_task.is_some() {
                        colony::unassign_task(
                            colony,
                            bots,
                            standing,
                            now,
                            expires_at,
                            params.cooldown_ticks,
                        );
                    }
                    colony::assign_task(colony, bots, standing, task_id, expires_at);
                    colony.tasks[task_id].done = true;
                } else if let Some(nearest) = nearest_free_member(colony, bots, pos, now) {
                    colony::assign_task(colony, bots, nearest, task_id, expires_at);
                }
            }
        }
    }
}

/// The colony member standing on `pos`, if any.
fn member_on(colony_id: ColonyId, bots: &BotArena, board: &Board, pos: Position) -> Option<BotId> {
    board
        .bot_at(pos)
        .filter(|id| bots.get(*id).is_some_and(|b| b.colony == Some(colony_id)))
}

/// The free member with the smallest squared distance to `pos`. The first
/// member in list order wins ties.
fn nearest_free_member(colony: &Colony, bots: &BotArena, pos: Position, now: u64) -> Option<BotId> {
    colony
        .members
        .iter()
        .filter_map(|&id| bots.get(id).map(|b| (id, b)))
        .filter(|(_, b)| b.is_free(now))
        .min_by_key(|(_, b)| b.pos.squared_distance(pos))
        .map(|(id, _)| id)
}
