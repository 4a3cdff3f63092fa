// Bot virtual machine: one bounded turn of genome execution.
//
// A second `impl SimState` block (the tick loop lives in `sim.rs`). Each
// turn fetches the value under the bot's instruction pointer, decodes it to
// an `Opcode` and dispatches. Every handler moves the pointer itself and
// reports whether the turn goes on:
//
// - `Step::Next`: a free instruction (sensing, branching, register work).
//   The loop fetches again, up to `max_instructions_per_turn` dispatches.
// - `Step::Yield`: an action that touched the world. The turn ends.
//
// A value that is not an opcode jumps by itself and yields. Jump distances
// double as the sensor vocabulary: `Look` jumps by a per-occupant constant,
// `Grab` and `Build` by a per-outcome one, so genomes branch on what they
// saw. `last_result` records the most recent sensor or outcome value for
// `SetReg`.
//
// A bot walking to a `MaintainConnection` tile ignores its tape and always
// executes `Move`, which follows the cached A* path (see `move_to_station`).
//
// See also: `genome.rs` for the tape and opcode table, `sim.rs` for birth
// and death bookkeeping, `colony.rs` for task ownership.
//
// **Invariant:** the bot being run is alive when a handler starts. Handlers
// that can kill the target of an attack never kill the acting bot.

use crate::colony;
use crate::config::GrabParams;
use crate::event::{SimEventKind, StepResult};
use crate::genome::{BuildKind, Opcode};
use crate::occupant::{Controller, Occupant};
use crate::pathfinding::astar;
use crate::sim::SimState;
use crate::types::{BotId, ColonyId, Direction, Position};
use std::cmp::Ordering;
use tracing::debug;

/// Whether a dispatch ends the bot's turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Next,
    Yield,
}

// Look distances per occupant.
const LOOK_KIN: i32 = 20;
const LOOK_BOT: i32 = 13;
const LOOK_BUILDING: i32 = 4;
const LOOK_WALL: i32 = 8;
const LOOK_RESOURCE: i32 = 11;
const LOOK_CONTROLLER: i32 = 50;
const LOOK_SPAWNER: i32 = 61;
const LOOK_FARM: i32 = 7;
const LOOK_FOOD: i32 = 9;
const LOOK_POISON: i32 = 14;
const LOOK_WATER: i32 = 15;
const LOOK_ORGANICS: i32 = 3;
const LOOK_MINE: i32 = 16;
const LOOK_FLAG: i32 = 17;
const LOOK_EMPTY: i32 = 12;

impl SimState {
    /// Run one turn of `id`'s genome.
    pub(crate) fn run_bot_turn(&mut self, id: BotId, out: &mut StepResult) {
        for _ in 0..self.config.genome.max_instructions_per_turn {
            let Some(bot) = self.bots.get(id) else {
                return;
            };
            let op = if colony::is_walking_to_station(&self.colonies, bot) {
                Some(Opcode::Move)
            } else {
                Opcode::decode(bot.genome.current())
            };
            let step = match op {
                Some(op) => self.dispatch(id, op, out),
                None => {
                    self.bots[id].genome.jump_by_current();
                    Step::Yield
                }
            };
            if step == Step::Yield {
                return;
            }
        }
    }

    fn dispatch(&mut self, id: BotId, op: Opcode, out: &mut StepResult) -> Step {
        match op {
            Opcode::Move => {
                self.try_move(id);
                self.jump(id, 1);
                Step::Yield
            }
            Opcode::MoveAbs => {
                let dir = self.bots[id].genome.arg_dir(1);
                self.bots[id].facing = dir;
                self.try_move(id);
                self.jump(id, 2);
                Step::Yield
            }
            Opcode::Turn => {
                let dir = self.bots[id].genome.arg_dir(1);
                self.bots[id].facing = dir;
                self.jump(id, 2);
                Step::Next
            }
            Opcode::Look => self.look(id, out),
            Opcode::CheckHp => {
                let hp = self.bots[id].hp;
                self.bots[id].genome.last_result = hp;
                self.jump(id, if hp > self.config.bot.initial_hp { 3 } else { 5 });
                Step::Next
            }
            Opcode::CheckInventory => {
                let inventory = self.bots[id].inventory;
                self.bots[id].genome.last_result = inventory;
                self.jump(id, if inventory > 70 { 1 } else { 2 });
                Step::Next
            }
            Opcode::CheckConnection => {
                let n = if self.bots[id].connected { 1 } else { 2 };
                self.branch(id, n);
                Step::Next
            }
            Opcode::CheckIfBro => {
                let n = match self.neighbour_bot(id) {
                    None => 1,
                    Some(other) => {
                        let me = &self.bots[id];
                        let them = &self.bots[other];
                        let kin = me
                            .genome
                            .is_kin(&them.genome, self.config.genome.kin_max_differences);
                        if kin || (them.connected && me.same_colony(them)) {
                            2
                        } else {
                            3
                        }
                    }
                };
                self.jump(id, n);
                Step::Next
            }
            Opcode::CheckColony => {
                let n = match self.neighbour_bot(id) {
                    None => 1,
                    Some(other) if self.bots[id].same_colony(&self.bots[other]) => 2,
                    Some(_) => 3,
                };
                self.jump(id, n);
                Step::Next
            }
            Opcode::HpToResource => {
                let units = self.bots[id].genome.arg(1).rem_euclid(4);
                let bot = &mut self.bots[id];
                let n = if bot.hp < units * 10 {
                    3
                } else {
                    bot.hp -= units * 10;
                    bot.inventory = bot.inventory.saturating_add(units);
                    2
                };
                self.jump(id, n);
                Step::Yield
            }
            Opcode::Grab => self.grab(id, out),
            Opcode::EatOrganics => {
                let facing = self.bots[id].facing;
                self.eat_organics(id, facing)
            }
            Opcode::EatOrganicsAbs => {
                let dir = self.bots[id].genome.arg_dir(1);
                self.eat_organics(id, dir)
            }
            Opcode::Photo => {
                self.photo(id);
                self.jump(id, 1);
                Step::Yield
            }
            Opcode::EatOther => self.eat_other(id, out),
            Opcode::Attack => self.attack(id, out),
            Opcode::Build => self.build(id, out),
            Opcode::ShareHp => self.share_hp(id),
            Opcode::ShareInventory => self.share_inventory(id),
            Opcode::Divide => self.divide(id, out),
            Opcode::CheckSignal => {
                let genome = &mut self.bots[id].genome;
                let signal = std::mem::take(&mut genome.signal);
                genome.jump_by(signal + 1);
                Step::Next
            }
            Opcode::SendSignal => {
                let value = self.bots[id].genome.arg(2).rem_euclid(4);
                if let Some(other) = self.neighbour_bot(id) {
                    self.bots[other].genome.signal = value;
                }
                self.jump(id, 3);
                Step::Next
            }
            Opcode::ExecuteInstr => {
                let n = self.bots[id].genome.arg(1);
                self.jump(id, n);
                Step::Next
            }
            Opcode::SetReg => {
                let genome = &mut self.bots[id].genome;
                let r = genome.arg_reg(1);
                genome.registers[r] = genome.last_result;
                genome.jump_by(3);
                Step::Yield
            }
            Opcode::IncReg | Opcode::DecReg => {
                let genome = &mut self.bots[id].genome;
                let r = genome.arg_reg(1);
                genome.registers[r] = if op == Opcode::IncReg {
                    genome.registers[r].wrapping_add(1)
                } else {
                    genome.registers[r].wrapping_sub(1)
                };
                genome.jump_by(2);
                Step::Next
            }
            Opcode::CmpReg => {
                let genome = &mut self.bots[id].genome;
                let a = genome.registers[genome.arg_reg(1)];
                let b = genome.registers[genome.arg_reg(2)];
                genome.jump_by(match a.cmp(&b) {
                    Ordering::Equal => 3,
                    Ordering::Less => 4,
                    Ordering::Greater => 5,
                });
                Step::Next
            }
            Opcode::JumpIfZero => {
                let genome = &mut self.bots[id].genome;
                let n = if genome.registers[genome.arg_reg(1)] == 0 {
                    3i32.saturating_add(genome.arg(2))
                } else {
                    3
                };
                genome.jump_by(n);
                Step::Next
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn jump(&mut self, id: BotId, n: i32) {
        self.bots[id].genome.jump_by(n);
    }

    /// Record `n` as the sensor result and jump by it.
    fn branch(&mut self, id: BotId, n: i32) {
        let genome = &mut self.bots[id].genome;
        genome.last_result = n;
        genome.jump_by(n);
    }

    fn faced_cell(&self, id: BotId) -> Position {
        let bot = &self.bots[id];
        self.dims().step(bot.pos, bot.facing)
    }

    /// The bot in the direction named by argument 1.
    fn neighbour_bot(&self, id: BotId) -> Option<BotId> {
        let bot = &self.bots[id];
        self.board.bot_at(self.dims().step(bot.pos, bot.genome.arg_dir(1)))
    }

    /// Shift one color channel if resource coloring is on.
    fn tint(&mut self, id: BotId, channel: usize) {
        if self.config.bot.resource_color_change {
            let color = self.bots[id].color.tinted(channel, self.config.bot.color_delta);
            self.set_bot_color(id, color);
        }
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    fn try_move(&mut self, id: BotId) {
        if colony::is_walking_to_station(&self.colonies, &self.bots[id]) {
            self.move_to_station(id);
            return;
        }
        let to = self.faced_cell(id);
        if self.board.is_empty(to) {
            self.move_bot(id, to);
        }
    }

    /// One step toward the bot's `MaintainConnection` tile. Arriving marks
    /// the task done; a bot that can neither plan a path nor descend the
    /// flow field gives the task back.
    fn move_to_station(&mut self, id: BotId) {
        let bot = &self.bots[id];
        let (Some(colony_id), Some(task_id)) = (bot.colony, bot.current_task) else {
            return;
        };
        let pos = bot.pos;
        let target = self.colonies[colony_id].tasks[task_id].pos;
        if pos == target {
            self.colonies[colony_id].tasks[task_id].done = true;
            self.bots[id].path.clear();
            return;
        }

        if self.bots[id].path.is_empty() {
            let board = &self.board;
            let planned = if board.is_surrounded(pos) {
                None
            } else {
                astar(self.dims(), pos, target, |p| board.is_empty(p))
            };
            match planned {
                Some(path) => self.bots[id].path = path.into(),
                None => {
                    self.descend_or_release(id, colony_id);
                    return;
                }
            }
        }

        let Some(&next) = self.bots[id].path.front() else {
            return;
        };
        if self.board.is_empty(next) {
            self.bots[id].path.pop_front();
            self.move_bot(id, next);
        } else {
            // Blocked; replan next turn.
            self.bots[id].path.clear();
        }
    }

    fn descend_or_release(&mut self, id: BotId, colony_id: ColonyId) {
        let pos = self.bots[id].pos;
        let step = self.colonies[colony_id]
            .flow_field
            .as_ref()
            .and_then(|field| field.downhill(pos))
            .filter(|&p| self.board.is_empty(p));
        if let Some(next) = step {
            self.move_bot(id, next);
            return;
        }
        let now = self.tick;
        let params = &self.config.colony;
        colony::unassign_task(
            &mut self.colonies[colony_id],
            &mut self.bots,
            id,
            now,
            now + params.task_expiry_ticks,
            params.cooldown_ticks,
        );
    }

    // -----------------------------------------------------------------------
    // Sensing
    // -----------------------------------------------------------------------

    fn look(&mut self, id: BotId, out: &mut StepResult) -> Step {
        let bot = &self.bots[id];
        let target = self.dims().step(bot.pos, bot.genome.arg_dir(1));
        let n = match self.board.at(target) {
            Occupant::Bot(other) => {
                let kin = bot.genome.is_kin(
                    &self.bots[other].genome,
                    self.config.genome.kin_max_differences,
                );
                if kin { LOOK_KIN } else { LOOK_BOT }
            }
            Occupant::Building { .. } => LOOK_BUILDING,
            Occupant::Wall => LOOK_WALL,
            Occupant::Resource { .. } => LOOK_RESOURCE,
            Occupant::Controller(_) => LOOK_CONTROLLER,
            Occupant::Spawner { .. } => LOOK_SPAWNER,
            Occupant::Farm { .. } => LOOK_FARM,
            Occupant::Food { .. } => LOOK_FOOD,
            Occupant::Poison => LOOK_POISON,
            Occupant::Water { group, .. } => {
                self.report_water(id, target, group, out);
                LOOK_WATER
            }
            Occupant::Organics { .. } => LOOK_ORGANICS,
            Occupant::Mine { .. } => LOOK_MINE,
            Occupant::ColonyFlag { .. } => LOOK_FLAG,
            Occupant::Empty => LOOK_EMPTY,
        };
        self.branch(id, n);
        Step::Next
    }

    fn report_water(&mut self, id: BotId, pos: Position, group: u32, out: &mut StepResult) {
        let Some(colony_id) = self.bots[id].colony else {
            return;
        };
        let Some(colony) = self.colonies.get_mut(colony_id) else {
            return;
        };
        if colony.add_water_sighting(pos, group) {
            debug!(tick = self.tick, colony = ?colony_id, %pos, group, "water discovered");
            out.push(
                self.tick,
                SimEventKind::WaterDiscovered {
                    colony: colony_id,
                    pos,
                    group,
                },
            );
        }
    }

    // -----------------------------------------------------------------------
    // Feeding
    // -----------------------------------------------------------------------

    fn eat_organics(&mut self, id: BotId, dir: Direction) -> Step {
        let target = self.dims().step(self.bots[id].pos, dir);
        let Occupant::Organics { amount } = self.board.at(target) else {
            self.jump(id, 2);
            return Step::Next;
        };
        self.bots[id].hp += amount;
        self.board.clear(target);
        self.jump(id, 1);
        Step::Yield
    }

    /// Latitude-banded photosynthesis: the top tenth of the board always
    /// succeeds, the next bands 80 % and 50 %, the rest 25 %.
    fn photo(&mut self, id: BotId) {
        let rows = self.dims().rows;
        let row = self.bots[id].pos.row;
        let percent = if row < rows / 10 {
            100
        } else if row < rows * 2 / 10 {
            80
        } else if row < rows * 3 / 10 {
            50
        } else {
            25
        };
        if self.rng.chance(percent, 100) {
            self.bots[id].hp += self.config.bot.photo_hp_gain;
            self.tint(id, 1);
        }
    }

    fn eat_other(&mut self, id: BotId, out: &mut StepResult) -> Step {
        let dir = self.bots[id].genome.arg_dir(1);
        let target = self.dims().step(self.bots[id].pos, dir);
        let Some(other) = self.board.bot_at(target) else {
            self.jump(id, 2);
            return Step::Yield;
        };
        let me = &self.bots[id];
        let them = &self.bots[other];
        if me.same_colony(them) {
            self.jump(id, 1);
            return Step::Yield;
        }
        if me.hp >= them.hp {
            let gain = them.hp;
            self.bots[id].hp += gain;
            self.tint(id, 0);
            self.kill_bot(other, false, out);
        }
        self.jump(id, 2);
        Step::Yield
    }

    fn attack(&mut self, id: BotId, out: &mut StepResult) -> Step {
        let Some(other) = self.neighbour_bot(id) else {
            self.jump(id, 1);
            return Step::Next;
        };
        let me = &self.bots[id];
        let them = &self.bots[other];
        if me.hp > them.hp && !me.same_colony(them) {
            let (cost, loot) = (them.hp, them.inventory);
            let bot = &mut self.bots[id];
            bot.hp -= cost;
            bot.inventory = bot.inventory.saturating_add(loot);
            self.kill_bot(other, false, out);
        }
        self.jump(id, 2);
        Step::Yield
    }

    // -----------------------------------------------------------------------
    // Sharing
    // -----------------------------------------------------------------------

    fn share_hp(&mut self, id: BotId) -> Step {
        let bot = &self.bots[id];
        if bot.hp < 20 {
            self.jump(id, 6);
            return Step::Next;
        }
        let amount = bot.genome.arg(2).max(0);
        if bot.hp < amount {
            self.jump(id, 5);
            return Step::Next;
        }
        let Some(other) = self.neighbour_bot(id) else {
            self.jump(id, 4);
            return Step::Next;
        };
        self.bots[id].hp -= amount;
        self.bots[other].hp += amount;
        self.jump(id, 3);
        Step::Yield
    }

    fn share_inventory(&mut self, id: BotId) -> Step {
        let bot = &self.bots[id];
        if bot.inventory < 5 {
            self.jump(id, 5);
            return Step::Next;
        }
        let amount = bot.genome.arg(2).clamp(0, bot.inventory);
        let Some(other) = self.neighbour_bot(id) else {
            self.jump(id, 3);
            return Step::Next;
        };
        self.bots[id].inventory -= amount;
        let them = &mut self.bots[other];
        them.inventory = them.inventory.saturating_add(amount);
        self.jump(id, 2);
        Step::Yield
    }

    // -----------------------------------------------------------------------
    // Reproduction
    // -----------------------------------------------------------------------

    fn divide(&mut self, id: BotId, out: &mut StepResult) -> Step {
        let bot = &self.bots[id];
        let min_hp = if bot.colony.is_some() {
            self.config.bot.colony_division_min_hp
        } else {
            self.config.bot.division_min_hp
        };
        if bot.hp < min_hp {
            self.jump(id, 5);
            return Step::Yield;
        }
        let Some(pos) = self.board.find_empty_pos_around(bot.pos, &mut self.rng) else {
            self.jump(id, 4);
            return Step::Next;
        };
        self.spawn_child(id, pos, out);
        self.bots[id].hp -= self.config.bot.division_cost;
        self.jump(id, 6);
        Step::Yield
    }

    // -----------------------------------------------------------------------
    // Grab
    // -----------------------------------------------------------------------

    /// Interact with the faced cell. Always ends the turn. Some outcomes
    /// leave the pointer in place so the bot grabs again next turn.
    fn grab(&mut self, id: BotId, out: &mut StepResult) -> Step {
        let target = self.faced_cell(id);
        let params = self.config.grab.clone();
        let n = match self.board.at(target) {
            Occupant::Building { owner, .. } => {
                if owner == Some(id) {
                    0
                } else {
                    let bot = &mut self.bots[id];
                    bot.inventory = bot.inventory.saturating_add(params.building_gain);
                    bot.hp += params.building_hp_gain;
                    self.board.clear(target);
                    1
                }
            }
            Occupant::Spawner { .. } => {
                let pos = self.bots[id].pos;
                if self.bots[id].inventory < params.spawner_cost {
                    0
                } else if let Some(child_pos) = self.board.find_empty_pos_around(pos, &mut self.rng)
                {
                    self.bots[id].inventory -= params.spawner_cost;
                    self.spawn_child(id, child_pos, out);
                    2
                } else {
                    0
                }
            }
            Occupant::Farm { owner, amount } => {
                if owner != Some(id) {
                    self.bots[id].inventory = 0;
                    self.board.clear(target);
                    0
                } else if self.bots[id].inventory >= params.farm_cost {
                    self.bots[id].inventory -= params.farm_cost;
                    self.board.set(
                        target,
                        Occupant::Farm {
                            owner,
                            amount: amount + 1,
                        },
                    );
                    3
                } else {
                    0
                }
            }
            Occupant::Food { .. } => {
                self.bots[id].hp += params.food_hp_gain;
                self.board.clear(target);
                0
            }
            Occupant::Poison => {
                self.bots[id].hp = 0;
                self.board.clear(target);
                4
            }
            Occupant::Controller(ctrl) => self.grab_controller(id, target, ctrl, &params),
            Occupant::Resource { amount } => {
                let bot = &mut self.bots[id];
                bot.inventory = bot.inventory.saturating_add(params.resource_gain);
                bot.hp += params.resource_hp_gain;
                let left = amount - params.resource_depletion;
                if left <= 0 {
                    self.board.clear(target);
                } else {
                    self.board.set(target, Occupant::Resource { amount: left });
                }
                self.tint(id, 2);
                6
            }
            Occupant::Mine { .. } if self.bots[id].hp >= params.mine_hp_cost => {
                let bot = &mut self.bots[id];
                bot.inventory = bot.inventory.saturating_add(params.mine_gain);
                bot.hp -= params.mine_hp_cost;
                7
            }
            _ => 8,
        };
        self.branch(id, n);
        Step::Yield
    }

    fn grab_controller(
        &mut self,
        id: BotId,
        target: Position,
        mut ctrl: Controller,
        params: &GrabParams,
    ) -> i32 {
        if self.bots[id].colony != Some(ctrl.colony) {
            // The colony notices at its next bookkeeping pass and dissolves.
            self.board.clear(target);
            return 10;
        }
        let bot = &mut self.bots[id];
        if bot.inventory < params.controller_cost {
            return 8;
        }
        bot.inventory -= params.controller_cost;
        bot.hp += params.controller_hp_gain;
        ctrl.amount += 1;
        self.board.set(target, Occupant::Controller(ctrl));
        5
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    fn build(&mut self, id: BotId, out: &mut StepResult) -> Step {
        let genome = &self.bots[id].genome;
        let dir = genome.arg_dir(1);
        let kind = BuildKind::from_gene(genome.arg(2));
        let target = self.dims().step(self.bots[id].pos, dir);
        let n = if self.board.is_empty(target) {
            self.build_on(id, kind, target, out)
        } else {
            10
        };
        self.branch(id, n);
        Step::Yield
    }

    fn build_on(&mut self, id: BotId, kind: BuildKind, target: Position, out: &mut StepResult) -> i32 {
        let params = self.config.build.clone();
        match kind {
            BuildKind::Wall => {
                let bot = &mut self.bots[id];
                if bot.inventory < params.wall_cost {
                    return 2;
                }
                bot.inventory -= params.wall_cost;
                bot.hp += params.wall_hp_gain;
                self.board.set(
                    target,
                    Occupant::Building {
                        owner: Some(id),
                        hp: params.wall_hp,
                    },
                );
                1
            }
            BuildKind::ColonyFlag => {
                let bot = &self.bots[id];
                let Some(colony_id) = bot.colony.filter(|_| bot.connected) else {
                    return 2;
                };
                let Some(colony) = self.colonies.get_mut(colony_id) else {
                    return 2;
                };
                if colony.flags.len() >= params.max_flags {
                    return 2;
                }
                colony.flags.push(target);
                self.board.set(target, Occupant::ColonyFlag { colony: colony_id });
                1
            }
            BuildKind::Controller => {
                if self.bots[id].colony.is_some() {
                    return 6;
                }
                if self.found_colony(id, target, out).is_none() {
                    return 6;
                }
                self.bots[id].hp += params.controller_hp_gain;
                3
            }
            BuildKind::Mine => {
                let bot = &mut self.bots[id];
                if bot.inventory < params.mine_cost {
                    return 7;
                }
                bot.inventory -= params.mine_cost;
                self.board.set(
                    target,
                    Occupant::Mine {
                        owner: Some(id),
                        amount: 0,
                    },
                );
                4
            }
            BuildKind::Farm => {
                if !params.farms_enabled {
                    return 9;
                }
                let bot = &mut self.bots[id];
                if bot.inventory < params.farm_cost {
                    return 8;
                }
                bot.inventory -= params.farm_cost;
                bot.hp += params.farm_hp_gain;
                self.board.set(
                    target,
                    Occupant::Farm {
                        owner: Some(id),
                        amount: params.farm_initial_amount,
                    },
                );
                5
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::colony::TaskKind;
    use crate::config::GameConfig;
    use crate::event::{SimEventKind, StepResult};
    use crate::genome::{BuildKind, Genome, Opcode};
    use crate::occupant::Occupant;
    use crate::pathfinding::FlowField;
    use crate::sim::SimState;
    use crate::types::{BotId, ColonyId, Direction, Position, TaskId};

    const IDLE: i32 = 100;

    fn sim() -> SimState {
        let mut config = GameConfig::default();
        config.world.rows = 12;
        config.world.cols = 12;
        config.world.new_gen_threshold = 0;
        config.world.reseed_extinct = false;
        config.genome.mutation_chance_percent = 0;
        config.genome.de_novo_per_mille = 0;
        SimState::new(config, 3)
    }

    /// A 16-cell tape starting with `prefix`, idle elsewhere.
    fn tape(prefix: &[i32]) -> Genome {
        let mut cells = vec![IDLE; 16];
        cells[..prefix.len()].copy_from_slice(prefix);
        Genome::from_tape(cells, 0)
    }

    fn place(sim: &mut SimState, pos: Position, facing: Direction, prefix: &[i32]) -> BotId {
        sim.spawn_bot(pos, facing, tape(prefix)).unwrap()
    }

    fn turn(sim: &mut SimState, id: BotId) -> StepResult {
        let mut out = StepResult::default();
        sim.run_bot_turn(id, &mut out);
        out
    }

    #[test]
    fn move_steps_into_an_empty_cell() {
        let mut sim = sim();
        let id = place(&mut sim, Position::new(5, 5), Direction::Right, &[Opcode::Move.code()]);
        turn(&mut sim, id);
        assert_eq!(sim.bots[id].pos, Position::new(5, 6));
        assert_eq!(sim.board.bot_at(Position::new(5, 6)), Some(id));
        assert!(sim.board.is_empty(Position::new(5, 5)));
        assert_eq!(sim.bots[id].genome.pointer(), 1);
    }

    #[test]
    fn move_wraps_columns_and_stops_at_walls() {
        let mut sim = sim();
        let a = place(&mut sim, Position::new(5, 11), Direction::Right, &[Opcode::Move.code()]);
        let b = place(&mut sim, Position::new(1, 3), Direction::Up, &[Opcode::Move.code()]);
        turn(&mut sim, a);
        turn(&mut sim, b);
        assert_eq!(sim.bots[a].pos, Position::new(5, 0));
        assert_eq!(sim.bots[b].pos, Position::new(1, 3));
    }

    #[test]
    fn blocked_move_stays_put_and_still_ends_the_turn() {
        let mut sim = sim();
        let two_moves = [Opcode::Move.code(), Opcode::Move.code()];
        let a = place(&mut sim, Position::new(5, 5), Direction::Right, &two_moves);
        let other = place(&mut sim, Position::new(5, 6), Direction::Up, &[]);
        let b = place(&mut sim, Position::new(8, 5), Direction::Down, &two_moves);
        sim.board.set(Position::new(9, 5), Occupant::Resource { amount: 3 });

        turn(&mut sim, a);
        turn(&mut sim, b);
        assert_eq!(sim.bots[a].pos, Position::new(5, 5));
        assert_eq!(sim.bots[a].genome.pointer(), 1);
        assert_eq!(sim.board.bot_at(Position::new(5, 6)), Some(other));
        assert_eq!(sim.bots[b].pos, Position::new(8, 5));
        assert_eq!(sim.bots[b].genome.pointer(), 1);
        assert_eq!(sim.board.at(Position::new(9, 5)), Occupant::Resource { amount: 3 });
    }

    #[test]
    fn free_instructions_chain_until_the_budget() {
        let mut sim = sim();
        // Turn(Right) is free and jumps 2, so five of them in a row never
        // reach the Move at index 10.
        let turn_right = [
            Opcode::Turn.code(),
            Direction::Right as i32,
            Opcode::Turn.code(),
            Direction::Right as i32,
            Opcode::Turn.code(),
            Direction::Right as i32,
            Opcode::Turn.code(),
            Direction::Right as i32,
            Opcode::Turn.code(),
            Direction::Right as i32,
            Opcode::Move.code(),
        ];
        let id = place(&mut sim, Position::new(5, 5), Direction::Up, &turn_right);
        turn(&mut sim, id);
        assert_eq!(sim.bots[id].genome.pointer(), 10);
        assert_eq!(sim.bots[id].pos, Position::new(5, 5));
        turn(&mut sim, id);
        assert_eq!(sim.bots[id].pos, Position::new(5, 6));
    }

    #[test]
    fn non_opcode_jumps_by_itself_and_yields() {
        let mut sim = sim();
        let id = place(&mut sim, Position::new(5, 5), Direction::Up, &[40]);
        turn(&mut sim, id);
        assert_eq!(sim.bots[id].genome.pointer(), 40 % 16);
    }

    #[test]
    fn look_reports_water_to_the_colony_once() {
        let mut sim = sim();
        let founder = place(&mut sim, Position::new(5, 5), Direction::Up, &[]);
        let mut out = StepResult::default();
        let cid = sim.found_colony(founder, Position::new(5, 4), &mut out).unwrap();
        let looker = place(
            &mut sim,
            Position::new(7, 7),
            Direction::Up,
            &[Opcode::Look.code(), Direction::Right as i32],
        );
        sim.bots[looker].colony = Some(cid);
        sim.colonies[cid].add_member(looker);
        sim.board.set(Position::new(7, 8), Occupant::Water { group: 4, amount: 10 });

        let out = turn(&mut sim, looker);
        assert_eq!(sim.bots[looker].genome.last_result, 15);
        assert_eq!(sim.colonies[cid].water.len(), 1);
        assert!(out
            .events
            .iter()
            .any(|e| matches!(e.kind, SimEventKind::WaterDiscovered { group: 4, .. })));
    }

    #[test]
    fn grab_resource_depletes_and_pays() {
        let mut sim = sim();
        let id = place(&mut sim, Position::new(5, 5), Direction::Right, &[Opcode::Grab.code()]);
        sim.board.set(Position::new(5, 6), Occupant::Resource { amount: 1 });
        let hp = sim.bots[id].hp;
        turn(&mut sim, id);
        assert_eq!(sim.bots[id].inventory, 5);
        assert_eq!(sim.bots[id].hp, hp + 5);
        assert!(sim.board.is_empty(Position::new(5, 6)));
        assert_eq!(sim.bots[id].genome.last_result, 6);
    }

    #[test]
    fn grab_poison_zeroes_hp() {
        let mut sim = sim();
        let id = place(&mut sim, Position::new(5, 5), Direction::Down, &[Opcode::Grab.code()]);
        sim.board.set(Position::new(6, 5), Occupant::Poison);
        turn(&mut sim, id);
        assert_eq!(sim.bots[id].hp, 0);
        assert!(sim.board.is_empty(Position::new(6, 5)));
        // Still standing until upkeep.
        assert_eq!(sim.board.bot_at(Position::new(5, 5)), Some(id));
    }

    #[test]
    fn grab_food_leaves_the_pointer_in_place() {
        let mut sim = sim();
        let id = place(&mut sim, Position::new(5, 5), Direction::Left, &[Opcode::Grab.code()]);
        sim.board.set(Position::new(5, 4), Occupant::Food { amount: 1 });
        turn(&mut sim, id);
        assert_eq!(sim.bots[id].hp, 100 + 250);
        assert_eq!(sim.bots[id].genome.pointer(), 0);
    }

    #[test]
    fn grabbing_a_foreign_controller_destroys_it() {
        let mut sim = sim();
        let founder = place(&mut sim, Position::new(5, 5), Direction::Up, &[]);
        let mut out = StepResult::default();
        sim.found_colony(founder, Position::new(4, 5), &mut out).unwrap();
        let raider = place(&mut sim, Position::new(3, 5), Direction::Down, &[Opcode::Grab.code()]);
        turn(&mut sim, raider);
        assert!(sim.board.is_empty(Position::new(4, 5)));
        assert_eq!(sim.bots[raider].genome.last_result, 10);
    }

    #[test]
    fn build_controller_founds_a_colony() {
        let mut sim = sim();
        let code = [
            Opcode::Build.code(),
            Direction::Up as i32,
            BuildKind::Controller as i32,
        ];
        let id = place(&mut sim, Position::new(5, 5), Direction::Up, &code);
        let out = turn(&mut sim, id);
        let cid = sim.bots[id].colony.expect("founder joined");
        assert!(matches!(
            sim.board.at(Position::new(4, 5)),
            Occupant::Controller(c) if c.colony == cid
        ));
        assert!(out
            .events
            .iter()
            .any(|e| matches!(e.kind, SimEventKind::ColonyFounded { .. })));
        assert_eq!(sim.bots[id].genome.last_result, 3);
    }

    #[test]
    fn build_wall_needs_inventory() {
        let mut sim = sim();
        let code = [Opcode::Build.code(), Direction::Right as i32, BuildKind::Wall as i32];
        let id = place(&mut sim, Position::new(5, 5), Direction::Up, &code);
        turn(&mut sim, id);
        assert_eq!(sim.bots[id].genome.last_result, 2);
        assert!(sim.board.is_empty(Position::new(5, 6)));

        let id2 = place(&mut sim, Position::new(8, 5), Direction::Up, &code);
        sim.bots[id2].inventory = 3;
        turn(&mut sim, id2);
        assert!(matches!(
            sim.board.at(Position::new(8, 6)),
            Occupant::Building { owner: Some(o), .. } if o == id2
        ));
        assert_eq!(sim.bots[id2].inventory, 2);
    }

    #[test]
    fn attack_spares_colony_mates() {
        let mut sim = sim();
        let attack_right = [Opcode::Attack.code(), Direction::Right as i32];
        let a = place(&mut sim, Position::new(5, 5), Direction::Up, &attack_right);
        let b = place(&mut sim, Position::new(5, 6), Direction::Up, &[]);
        let mut out = StepResult::default();
        let cid = sim.found_colony(a, Position::new(4, 5), &mut out).unwrap();
        sim.bots[b].colony = Some(cid);
        sim.colonies[cid].add_member(b);
        sim.bots[a].hp = 500;
        turn(&mut sim, a);
        assert!(sim.bot(b).is_some());

        sim.bots[b].colony = None;
        sim.colonies[cid].remove_member(b);
        sim.bots[a].genome = tape(&attack_right);
        sim.bots[b].inventory = 9;
        turn(&mut sim, a);
        assert!(sim.bot(b).is_none());
        assert_eq!(sim.bots[a].hp, 400);
        assert_eq!(sim.bots[a].inventory, 9);
        assert!(sim.board.is_empty(Position::new(5, 6)));
    }

    #[test]
    fn eat_other_absorbs_weaker_bots() {
        let mut sim = sim();
        let a = place(
            &mut sim,
            Position::new(5, 5),
            Direction::Up,
            &[Opcode::EatOther.code(), Direction::Down as i32],
        );
        let b = place(&mut sim, Position::new(6, 5), Direction::Up, &[]);
        sim.bots[b].hp = 40;
        turn(&mut sim, a);
        assert!(sim.bot(b).is_none());
        assert_eq!(sim.bots[a].hp, 140);
    }

    #[test]
    fn eat_other_spares_colony_mates() {
        let mut sim = sim();
        let a = place(
            &mut sim,
            Position::new(5, 5),
            Direction::Up,
            &[Opcode::EatOther.code(), Direction::Down as i32],
        );
        let b = place(&mut sim, Position::new(6, 5), Direction::Up, &[]);
        let mut out = StepResult::default();
        let cid = sim.found_colony(a, Position::new(4, 5), &mut out).unwrap();
        sim.bots[b].colony = Some(cid);
        sim.colonies[cid].add_member(b);
        sim.bots[b].hp = 40;

        let out = turn(&mut sim, a);
        assert!(sim.bot(b).is_some());
        assert_eq!(out.deaths, 0);
        assert_eq!(sim.bots[a].hp, 100);
        assert_eq!(sim.bots[a].genome.pointer(), 1);
    }

    #[test]
    fn share_hp_and_inventory_target_the_argument_direction() {
        let mut sim = sim();
        let giver = place(
            &mut sim,
            Position::new(5, 5),
            Direction::Up,
            &[Opcode::ShareHp.code(), Direction::Left as i32, 30],
        );
        let taker = place(&mut sim, Position::new(5, 4), Direction::Up, &[]);
        turn(&mut sim, giver);
        assert_eq!(sim.bots[giver].hp, 70);
        assert_eq!(sim.bots[taker].hp, 130);
        assert_eq!(sim.bots[giver].genome.pointer(), 3);

        sim.bots[giver].genome = tape(&[Opcode::ShareInventory.code(), Direction::Left as i32, 4]);
        sim.bots[giver].inventory = 10;
        turn(&mut sim, giver);
        assert_eq!(sim.bots[giver].inventory, 6);
        assert_eq!(sim.bots[taker].inventory, 4);
    }

    #[test]
    fn check_if_bro_reads_the_argument_direction() {
        let mut sim = sim();
        let prefix = [Opcode::CheckIfBro.code(), Direction::Left as i32];
        let id = place(&mut sim, Position::new(5, 5), Direction::Right, &prefix);
        // A stranger straight ahead, a clone to the left.
        let stranger: Vec<i32> = (1..=16).collect();
        place(&mut sim, Position::new(5, 6), Direction::Up, &stranger);
        place(&mut sim, Position::new(5, 4), Direction::Up, &prefix);
        turn(&mut sim, id);
        // Kin: +2 onto the first idle cell.
        assert_eq!(sim.bots[id].genome.pointer(), (2 + IDLE as usize) % 16);
    }

    #[test]
    fn check_colony_reads_the_argument_direction() {
        let mut sim = sim();
        // Faces Up at an empty cell; the argument points Right at a bot.
        let id = place(
            &mut sim,
            Position::new(5, 5),
            Direction::Up,
            &[Opcode::CheckColony.code(), Direction::Right as i32],
        );
        place(&mut sim, Position::new(5, 6), Direction::Up, &[]);
        turn(&mut sim, id);
        // Not in a colony together: +3 onto the first idle cell, which
        // then jumps by 100 and yields.
        assert_eq!(sim.bots[id].genome.pointer(), (3 + IDLE as usize) % 16);
    }

    #[test]
    fn divide_spawns_a_linked_child() {
        let mut sim = sim();
        let id = place(&mut sim, Position::new(5, 5), Direction::Up, &[Opcode::Divide.code()]);
        let out = turn(&mut sim, id);
        assert_eq!(out.births, 1);
        assert_eq!(sim.bots[id].hp, 60);
        let child = sim.bots[id].offspring[0];
        assert_eq!(sim.bots[child].parent, Some(id));
        assert_eq!(sim.bots[child].genome.tape(), sim.bots[id].genome.tape());
        assert!(sim.dims().in_radius(sim.bots[child].pos, Position::new(5, 5), 1));
    }

    #[test]
    fn divide_below_threshold_does_nothing() {
        let mut sim = sim();
        let id = place(&mut sim, Position::new(5, 5), Direction::Up, &[Opcode::Divide.code()]);
        sim.bots[id].hp = 50;
        let out = turn(&mut sim, id);
        assert_eq!(out.births, 0);
        assert_eq!(sim.bots[id].genome.pointer(), 5);
    }

    #[test]
    fn signals_pass_between_neighbours() {
        let mut sim = sim();
        let sender = place(
            &mut sim,
            Position::new(5, 5),
            Direction::Up,
            &[Opcode::SendSignal.code(), Direction::Right as i32, 6],
        );
        let receiver = place(&mut sim, Position::new(5, 6), Direction::Up, &[Opcode::CheckSignal.code()]);
        turn(&mut sim, sender);
        assert_eq!(sim.bots[receiver].genome.signal, 2);
        turn(&mut sim, receiver);
        assert_eq!(sim.bots[receiver].genome.signal, 0);
    }

    #[test]
    fn registers_compare_and_branch() {
        let mut sim = sim();
        let code = [
            Opcode::IncReg.code(),
            0,
            Opcode::CmpReg.code(),
            0,
            1,
            IDLE,
            IDLE,
            Opcode::Photo.code(),
        ];
        let id = place(&mut sim, Position::new(5, 5), Direction::Up, &code);
        turn(&mut sim, id);
        assert_eq!(sim.bots[id].genome.registers[0], 1);
        // r0 > r1, so CmpReg jumps 5 from index 2 onto the Photo.
        assert_eq!(sim.bots[id].genome.pointer(), 8);
    }

    #[test]
    fn walking_bot_ignores_its_tape_and_reaches_the_tile() {
        let mut sim = sim();
        let founder = place(&mut sim, Position::new(5, 2), Direction::Up, &[]);
        let mut out = StepResult::default();
        let cid = sim.found_colony(founder, Position::new(5, 1), &mut out).unwrap();
        let walker = place(&mut sim, Position::new(5, 5), Direction::Up, &[Opcode::Photo.code()]);
        sim.bots[walker].colony = Some(cid);
        sim.colonies[cid].add_member(walker);
        let task = sim.colonies[cid].add_task(TaskKind::MaintainConnection, Position::new(5, 8), 0);
        crate::colony::assign_task(&mut sim.colonies[cid], &mut sim.bots, walker, task, 1000);

        for _ in 0..3 {
            turn(&mut sim, walker);
        }
        assert_eq!(sim.bots[walker].pos, Position::new(5, 8));
        turn(&mut sim, walker);
        assert!(sim.colonies[cid].tasks[task].done);
        assert_eq!(sim.colonies[cid].tasks[task].owner, Some(walker));
    }

    #[test]
    fn stranded_walker_gives_its_task_back() {
        let mut sim = sim();
        let founder = place(&mut sim, Position::new(5, 2), Direction::Up, &[]);
        let mut out = StepResult::default();
        let cid = sim.found_colony(founder, Position::new(5, 1), &mut out).unwrap();
        let walker = place(&mut sim, Position::new(8, 8), Direction::Up, &[]);
        sim.bots[walker].colony = Some(cid);
        sim.colonies[cid].add_member(walker);
        for d in Direction::CARDINAL {
            let p = sim.dims().step(Position::new(8, 8), d);
            sim.board.set(p, Occupant::Wall);
        }
        let task = sim.colonies[cid].add_task(TaskKind::MaintainConnection, Position::new(3, 3), 0);
        crate::colony::assign_task(&mut sim.colonies[cid], &mut sim.bots, walker, task, 1000);

        turn(&mut sim, walker);
        assert_eq!(sim.bots[walker].current_task, None);
        assert_eq!(sim.colonies[cid].tasks[task].owner, None);
        assert!(sim.bots[walker].has_cooldown(sim.tick));
    }

    /// A colony with its controller at (5, 1) and a member at (8, 8) that
    /// owns a station at (3, 8) walled off from every side.
    fn walker_with_unreachable_station(sim: &mut SimState) -> (ColonyId, BotId, TaskId) {
        let founder = place(sim, Position::new(5, 2), Direction::Up, &[]);
        let mut out = StepResult::default();
        let cid = sim.found_colony(founder, Position::new(5, 1), &mut out).unwrap();
        let walker = place(sim, Position::new(8, 8), Direction::Up, &[]);
        sim.bots[walker].colony = Some(cid);
        sim.colonies[cid].add_member(walker);
        let station = Position::new(3, 8);
        for d in Direction::CARDINAL {
            let p = sim.dims().step(station, d);
            sim.board.set(p, Occupant::Wall);
        }
        let task = sim.colonies[cid].add_task(TaskKind::MaintainConnection, station, 0);
        crate::colony::assign_task(&mut sim.colonies[cid], &mut sim.bots, walker, task, 1000);
        sim.colonies[cid].flow_field = Some(FlowField::compute(
            sim.dims(),
            &[Position::new(8, 3)],
            |_| true,
        ));
        (cid, walker, task)
    }

    #[test]
    fn walker_without_a_path_steps_down_the_flow_field() {
        let mut sim = sim();
        let (cid, walker, task) = walker_with_unreachable_station(&mut sim);
        turn(&mut sim, walker);
        assert_eq!(sim.bots[walker].pos, Position::new(8, 7));
        assert_eq!(sim.board.bot_at(Position::new(8, 7)), Some(walker));
        assert_eq!(sim.colonies[cid].tasks[task].owner, Some(walker));
        assert!(!sim.bots[walker].has_cooldown(sim.tick));
    }

    #[test]
    fn walker_with_a_blocked_downhill_step_gives_the_task_back() {
        let mut sim = sim();
        let (cid, walker, task) = walker_with_unreachable_station(&mut sim);
        sim.board.set(Position::new(8, 7), Occupant::Poison);
        turn(&mut sim, walker);
        assert_eq!(sim.bots[walker].pos, Position::new(8, 8));
        assert_eq!(sim.bots[walker].current_task, None);
        assert_eq!(sim.colonies[cid].tasks[task].owner, None);
        assert!(sim.bots[walker].has_cooldown(sim.tick));
    }

    #[test]
    fn colony_flags_stop_at_the_cap() {
        let mut sim = sim();
        let code = [
            Opcode::Build.code(),
            Direction::Right as i32,
            BuildKind::ColonyFlag as i32,
        ];
        let id = place(&mut sim, Position::new(5, 5), Direction::Up, &code);
        let mut out = StepResult::default();
        let cid = sim.found_colony(id, Position::new(4, 5), &mut out).unwrap();
        sim.bots[id].connected = true;
        sim.colonies[cid].flags = vec![Position::new(2, 2), Position::new(2, 4)];

        turn(&mut sim, id);
        assert_eq!(sim.bots[id].genome.last_result, 1);
        assert_eq!(
            sim.board.at(Position::new(5, 6)),
            Occupant::ColonyFlag { colony: cid }
        );
        assert_eq!(sim.colonies[cid].flags.len(), sim.config.build.max_flags);

        sim.board.clear(Position::new(5, 6));
        sim.bots[id].genome = tape(&code);
        turn(&mut sim, id);
        assert_eq!(sim.bots[id].genome.last_result, 2);
        assert!(sim.board.is_empty(Position::new(5, 6)));
        assert_eq!(sim.colonies[cid].flags.len(), 3);
    }
}
