// Core simulation state and tick loop.
//
// `SimState` is the single source of truth for the bot world. It owns the
// board, the bot and colony arenas, the PRNG and the config. Each call to
// `tick()` runs one discrete step and returns a `StepResult` with the
// tick's narrative events.
//
// ## Tick phases
//
// 1. **Reseed check.** If the live population has dropped to a nonzero
//    `new_gen_threshold`, or to zero with `reseed_extinct` set, the board is
//    repopulated with fresh bots, resources and poison (organics are swept,
//    structures survive) and the tick ends there.
// 2. **Environment.** Organics decay by one unit; farms with stock drop one
//    `Food` next to themselves.
// 3. **Bots.** For each bot alive at the start of the tick (children born
//    this tick act next tick): pay the population-scaled upkeep, cap hp,
//    die at hp <= 0, skip if stationed on a finished maintenance tile, and
//    otherwise run a bounded VM turn (`vm.rs`).
// 4. **Colonies.** Each colony dissolves if its controller or founder is
//    gone; otherwise it flood-fills connectivity from the controller,
//    distributes resources, discovers tasks and runs task scheduling
//    (`tasking.rs`).
//
// ## Death bookkeeping
//
// `kill_bot` releases everything that points at a bot before its slot is
// freed: its task (a finished station reopens), its colony membership, its
// parent's offspring entry and its children's parent links. No handle to a
// dead bot survives the call.
//
// See also: `vm.rs` for the per-bot instruction loop (a second `impl
// SimState` block), `tasking.rs` for task scheduling, `colony.rs` for the
// ownership operations, `board.rs` for the grid, `config.rs` for every
// tunable.

use crate::board::Board;
use crate::bot::{self, Bot, BotArena};
use crate::colony::{self, Colony, ColonyArena, TaskKind};
use crate::config::GameConfig;
use crate::event::{SimEventKind, StepResult};
use crate::genome::{Genome, Inheritance};
use crate::occupant::{Controller, Occupant};
use crate::tasking;
use crate::types::{BotId, ColonyId, Color, Direction, GridDims, Position};
use rustc_hash::FxHashSet;
use tapebots_prng::GameRng;
use tracing::{debug, trace};

/// Top-level simulation state.
#[derive(Clone, Debug)]
pub struct SimState {
    /// Ticks completed so far.
    pub tick: u64,
    pub rng: GameRng,
    /// Game configuration (immutable after initialization).
    pub config: GameConfig,
    pub board: Board,
    pub bots: BotArena,
    pub colonies: ColonyArena,
    /// Tape copied into every freshly seeded bot instead of a random one.
    pub initial_genome: Option<Genome>,
}

impl SimState {
    /// An empty world: wall rows in place, nothing else. Call
    /// `generate_world` to populate it.
    pub fn new(config: GameConfig, seed: u64) -> Self {
        let dims = GridDims::new(config.world.rows, config.world.cols);
        let mut board = Board::new(dims);
        for col in 0..dims.cols {
            board.set(Position::new(0, col), Occupant::Wall);
            board.set(Position::new(dims.rows - 1, col), Occupant::Wall);
        }
        Self {
            tick: 0,
            rng: GameRng::new(seed),
            config,
            board,
            bots: BotArena::with_key(),
            colonies: ColonyArena::with_key(),
            initial_genome: None,
        }
    }

    pub fn with_initial_genome(mut self, genome: Genome) -> Self {
        self.initial_genome = Some(genome);
        self
    }

    pub fn dims(&self) -> GridDims {
        self.board.dims()
    }

    /// Advance one tick.
    pub fn tick(&mut self) -> StepResult {
        let mut out = StepResult::default();
        let live = self.bots.len();
        let world = &self.config.world;
        let extinct = live == 0 && world.reseed_extinct;
        let threshold = world.new_gen_threshold;

        if extinct || (threshold > 0 && live <= threshold) {
            self.reseed(&mut out);
        } else {
            self.environment_phase();
            self.bot_phase(live, &mut out);
            self.colony_phase(&mut out);
        }

        self.tick += 1;
        out
    }

    // -----------------------------------------------------------------------
    // World generation
    // -----------------------------------------------------------------------

    /// Place water bodies, the initial population, resources and poison.
    pub fn generate_world(&mut self) {
        self.generate_water();
        self.seed_population();
        self.scatter_resources();
    }

    /// Elongated blobs of water, each tagged with its own group id.
    fn generate_water(&mut self) {
        let dims = self.dims();
        for group in 0..self.config.world.water_bodies {
            let center = dims.random_inner_pos(&mut self.rng);
            let radius = self.rng.range_i32(1, 5);
            for dr in -radius..=radius {
                for dc in -radius..=radius + 15 {
                    if !self.rng.chance(60, 100) {
                        continue;
                    }
                    let pos = dims.offset(center, dr, dc);
                    if dims.is_inner_row(pos) && self.board.is_empty(pos) {
                        self.board.set(
                            pos,
                            Occupant::Water {
                                group,
                                amount: self.config.world.water_amount,
                            },
                        );
                    }
                }
            }
        }
    }

    /// Roll `bot_chance_percent` on every empty inner cell. Returns the
    /// number of bots placed.
    fn seed_population(&mut self) -> usize {
        let dims = self.dims();
        let mut spawned = 0;
        for i in 0..dims.cells() {
            let pos = dims.position_of(i);
            if !dims.is_inner_row(pos) || !self.board.is_empty(pos) {
                continue;
            }
            if !self.rng.chance(self.config.world.bot_chance_percent, 100) {
                continue;
            }
            let genome = match &self.initial_genome {
                Some(g) => Genome::from_tape(g.tape().to_vec(), g.family),
                None => Genome::random(self.config.genome.length, &mut self.rng),
            };
            let facing = Direction::random_cardinal(&mut self.rng);
            if self.spawn_bot(pos, facing, genome).is_some() {
                spawned += 1;
            }
        }
        spawned
    }

    fn scatter_resources(&mut self) {
        let dims = self.dims();
        let world = &self.config.world;
        for i in 0..dims.cells() {
            let pos = dims.position_of(i);
            if !dims.is_inner_row(pos) || !self.board.is_empty(pos) {
                continue;
            }
            if self.rng.chance(world.poison_per_mille, 1000) {
                self.board.set(pos, Occupant::Poison);
            } else if self.rng.chance(world.resource_chance_percent, 100) {
                self.board.set(
                    pos,
                    Occupant::Resource {
                        amount: world.resource_amount,
                    },
                );
            }
        }
    }

    /// Sweep organics and leftover resources, then repopulate.
    fn reseed(&mut self, out: &mut StepResult) {
        let dims = self.dims();
        for i in 0..dims.cells() {
            let pos = dims.position_of(i);
            let occupant = self.board.at(pos);
            if !occupant.is_preserved() && occupant.bot().is_none() && !occupant.is_empty() {
                self.board.clear(pos);
            }
        }
        let survivors = self.bots.len();
        let spawned = self.seed_population();
        self.scatter_resources();
        out.births += spawned;
        debug!(tick = self.tick, survivors, spawned, "population reseeded");
        out.push(self.tick, SimEventKind::PopulationReseeded { survivors, spawned });
    }

    // -----------------------------------------------------------------------
    // Environment phase
    // -----------------------------------------------------------------------

    fn environment_phase(&mut self) {
        let dims = self.dims();
        for i in 0..dims.cells() {
            let pos = dims.position_of(i);
            match self.board.at(pos) {
                Occupant::Organics { amount } => {
                    if amount <= 1 {
                        self.board.clear(pos);
                    } else {
                        self.board.set(pos, Occupant::Organics { amount: amount - 1 });
                    }
                }
                Occupant::Farm { owner, amount } if amount > 0 => {
                    let Some(food_pos) = self.board.find_empty_pos_around(pos, &mut self.rng)
                    else {
                        continue;
                    };
                    self.board.set(food_pos, Occupant::Food { amount: 1 });
                    self.board.set(
                        pos,
                        Occupant::Farm {
                            owner,
                            amount: amount - 1,
                        },
                    );
                }
                _ => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Bot phase
    // -----------------------------------------------------------------------

    fn bot_phase(&mut self, live: usize, out: &mut StepResult) {
        let upkeep = self.config.upkeep_for(live);
        let max_hp = self.config.bot.max_hp;
        let ids: Vec<BotId> = self.bots.keys().collect();

        for id in ids {
            let Some(bot) = self.bots.get_mut(id) else {
                // Killed earlier this tick.
                continue;
            };
            bot.hp = (bot.hp - upkeep).min(max_hp);
            if bot.hp <= 0 {
                let remnant = self
                    .rng
                    .chance(self.config.bot.organics_remnant_percent, 100);
                self.kill_bot(id, remnant, out);
                continue;
            }
            if colony::is_stationed(&self.colonies, &self.bots[id]) {
                continue;
            }
            self.run_bot_turn(id, out);
        }
    }

    /// Place a new bot on an empty inner cell. Returns `None` if the cell is
    /// taken or on a wall row.
    pub fn spawn_bot(&mut self, pos: Position, facing: Direction, genome: Genome) -> Option<BotId> {
        let dims = self.dims();
        let pos = dims.pos(pos.row, pos.col);
        if !dims.is_inner_row(pos) || !self.board.is_empty(pos) {
            return None;
        }
        let color = Color::random(&mut self.rng);
        let bot = Bot::new(pos, facing, genome, self.config.bot.initial_hp, color);
        let id = self.bots.insert(bot);
        self.board.set(pos, Occupant::Bot(id));
        Some(id)
    }

    /// Reproduction: place a child of `parent` on `pos`. The child inherits
    /// the parent's colony and a derived genome; see `Genome::child`.
    pub(crate) fn spawn_child(&mut self, parent: BotId, pos: Position, out: &mut StepResult) -> BotId {
        let params = &self.config.genome;
        let p = &self.bots[parent];
        let (genome, inheritance) = p.genome.child(params, &mut self.rng);
        let color = match inheritance {
            Inheritance::DeNovo => Color::random(&mut self.rng),
            Inheritance::Mutated if params.mutate_color => {
                p.color.mutated(params.color_mutation_strength, &mut self.rng)
            }
            Inheritance::Mutated | Inheritance::Copied => p.color,
        };
        let colony_id = p.colony;
        let facing = Direction::random_cardinal(&mut self.rng);

        let mut child = Bot::new(pos, facing, genome, self.config.bot.initial_hp, color);
        child.colony = colony_id;
        let id = self.bots.insert(child);
        bot::link_child(&mut self.bots, parent, id);
        if let Some(colony) = colony_id.and_then(|c| self.colonies.get_mut(c)) {
            colony.add_member(id);
        }
        self.board.set(pos, Occupant::Bot(id));
        out.births += 1;
        trace!(tick = self.tick, ?parent, child = ?id, ?inheritance, "bot born");
        id
    }

    /// Remove a bot and every link to it. With `remnant`, its cell becomes
    /// `Organics`; otherwise it is cleared.
    pub(crate) fn kill_bot(&mut self, id: BotId, remnant: bool, out: &mut StepResult) {
        let Some(bot) = self.bots.get(id) else {
            return;
        };
        let pos = bot.pos;
        let colony_id = bot.colony;
        let task = bot.current_task;

        if let Some(colony) = colony_id.and_then(|c| self.colonies.get_mut(c)) {
            if let Some(task) = task {
                colony.release_task_of_dead(task, id);
            }
            colony.remove_member(id);
        }
        bot::unlink(&mut self.bots, id);
        self.bots.remove(id);

        if self.board.bot_at(pos) == Some(id) {
            if remnant {
                let amount = self.config.bot.organics_initial_amount;
                self.board.set(pos, Occupant::Organics { amount });
            } else {
                self.board.clear(pos);
            }
        }
        out.deaths += 1;
        trace!(tick = self.tick, bot = ?id, %pos, "bot died");
    }

    /// Relocate a bot to an empty cell.
    pub(crate) fn move_bot(&mut self, id: BotId, to: Position) {
        let from = self.bots[id].pos;
        self.board.clear(from);
        self.board.set(to, Occupant::Bot(id));
        self.bots[id].pos = to;
    }

    /// Recolor a bot and flag its cell for redraw.
    pub(crate) fn set_bot_color(&mut self, id: BotId, color: Color) {
        let bot = &mut self.bots[id];
        if bot.color != color {
            bot.color = color;
            let i = self.board.dims().index(bot.pos);
            self.board.mark_dirty(i);
        }
    }

    // -----------------------------------------------------------------------
    // Colonies
    // -----------------------------------------------------------------------

    /// Found a colony whose controller stands on `center`. The founder and
    /// its direct offspring that have no colony of their own join it.
    /// Returns `None` if the founder already belongs to a colony or `center`
    /// is not an empty inner cell.
    pub fn found_colony(
        &mut self,
        founder: BotId,
        center: Position,
        out: &mut StepResult,
    ) -> Option<ColonyId> {
        let dims = self.dims();
        let center = dims.pos(center.row, center.col);
        let bot = self.bots.get(founder)?;
        if bot.colony.is_some() || !dims.is_inner_row(center) || !self.board.is_empty(center) {
            return None;
        }

        let color = Color::random(&mut self.rng);
        let mut colony = Colony::new(center, color);
        colony.add_member(founder);
        let joiners: Vec<BotId> = bot
            .offspring
            .iter()
            .copied()
            .filter(|c| self.bots.get(*c).is_some_and(|b| b.colony.is_none()))
            .collect();
        for &c in &joiners {
            colony.add_member(c);
        }
        let colony_id = self.colonies.insert(colony);

        self.bots[founder].colony = Some(colony_id);
        for &c in &joiners {
            self.bots[c].colony = Some(colony_id);
        }
        self.set_bot_color(founder, color);
        self.board.set(
            center,
            Occupant::Controller(Controller {
                colony: colony_id,
                owner: founder,
                amount: self.config.build.controller_initial_amount,
            }),
        );

        let members = joiners.len() + 1;
        debug!(tick = self.tick, colony = ?colony_id, %center, members, "colony founded");
        out.push(
            self.tick,
            SimEventKind::ColonyFounded {
                colony: colony_id,
                founder,
                center,
                members,
            },
        );
        Some(colony_id)
    }

    fn colony_phase(&mut self, out: &mut StepResult) {
        let ids: Vec<ColonyId> = self.colonies.keys().collect();
        for id in ids {
            let Some(controller) = self.live_controller(id) else {
                self.dissolve_colony(id, out);
                continue;
            };
            self.flood_fill(id);
            self.distribute_resources(id, controller);
            self.discover_tasks(id);

            let Self {
                colonies,
                bots,
                board,
                config,
                tick,
                ..
            } = self;
            tasking::process_colony_tasks(id, &mut colonies[id], bots, board, &config.colony, *tick, out);
            colonies[id].age += 1;
        }
    }

    /// The colony's controller, if it still stands on the colony's center
    /// and its founder is alive and still a member.
    fn live_controller(&self, id: ColonyId) -> Option<Controller> {
        let colony = self.colonies.get(id)?;
        let Occupant::Controller(ctrl) = self.board.at(colony.center) else {
            return None;
        };
        let owner = self.bots.get(ctrl.owner)?;
        (ctrl.colony == id && owner.colony == Some(id)).then_some(ctrl)
    }

    /// Release every member, remove the flags and the controller.
    fn dissolve_colony(&mut self, id: ColonyId, out: &mut StepResult) {
        let Some(colony) = self.colonies.remove(id) else {
            return;
        };
        for &m in &colony.members {
            if let Some(bot) = self.bots.get_mut(m) {
                bot.colony = None;
                bot.connected = false;
                bot.current_task = None;
                bot.path.clear();
            }
        }
        for &flag in &colony.flags {
            if matches!(self.board.at(flag), Occupant::ColonyFlag { colony } if colony == id) {
                self.board.clear(flag);
            }
        }
        if matches!(self.board.at(colony.center), Occupant::Controller(c) if c.colony == id) {
            self.board.clear(colony.center);
        }
        debug!(tick = self.tick, colony = ?id, members = colony.members.len(), "colony dissolved");
        out.push(
            self.tick,
            SimEventKind::ColonyDissolved {
                colony: id,
                members: colony.members.len(),
            },
        );
    }

    /// Mark exactly the members reachable from the controller through a
    /// 4-connected chain of same-colony bots as connected. Iterative DFS.
    fn flood_fill(&mut self, id: ColonyId) {
        let dims = self.dims();
        let colony = &self.colonies[id];
        let center = colony.center;
        let colony_color = colony.color;
        for &m in &colony.members {
            if let Some(bot) = self.bots.get_mut(m) {
                bot.connected = false;
            }
        }

        let is_member_at = |board: &Board, bots: &BotArena, pos: Position| {
            board
                .bot_at(pos)
                .filter(|b| bots.get(*b).is_some_and(|bot| bot.colony == Some(id)))
        };

        let mut visited: FxHashSet<BotId> = FxHashSet::default();
        let mut reached = Vec::new();
        let mut stack: Vec<Position> = Direction::CARDINAL
            .iter()
            .map(|&d| dims.step(center, d))
            .collect();
        while let Some(pos) = stack.pop() {
            let Some(bid) = is_member_at(&self.board, &self.bots, pos) else {
                continue;
            };
            if !visited.insert(bid) {
                continue;
            }
            self.bots[bid].connected = true;
            reached.push((bid, pos));
            stack.extend(Direction::CARDINAL.iter().map(|&d| dims.step(pos, d)));
        }

        for (bid, pos) in reached {
            if self.bots[bid].current_task.is_some() {
                continue;
            }
            let on_border = Direction::CARDINAL
                .iter()
                .any(|&d| is_member_at(&self.board, &self.bots, dims.step(pos, d)).is_none());
            let color = if on_border { Color::YELLOW } else { colony_color };
            self.set_bot_color(bid, color);
        }
    }

    /// Trade controller stock for member hp, pay task holders, and apply
    /// the flag bonus.
    fn distribute_resources(&mut self, id: ColonyId, mut ctrl: Controller) {
        let params = self.config.colony.clone();
        let upkeep = self.config.upkeep_for(self.bots.len());
        let colony = &self.colonies[id];
        let members = colony.members.clone();
        let flags = colony.flags.clone();
        let center = colony.center;
        let dims = self.dims();
        let before = ctrl;

        for m in members {
            let Some(bot) = self.bots.get_mut(m) else {
                continue;
            };
            if bot.connected {
                if ctrl.amount == 0 && bot.inventory > 0 {
                    ctrl.amount += 1;
                    bot.inventory -= 1;
                }
                bot.hp += if bot.inventory > 0 {
                    params.heal_with_inventory
                } else {
                    params.heal_without_inventory
                };
                if ctrl.amount > 0 {
                    ctrl.amount -= 1;
                }
            }
            for &flag in &flags {
                if dims.in_radius(bot.pos, flag, params.flag_radius) {
                    bot.hp += upkeep;
                }
            }
            let task_done = colony::current_task(&self.colonies, bot).map(|t| t.done);
            if let Some(done) = task_done {
                bot.hp += params.task_holder_hp;
                let color = if done { Color::GREEN } else { Color::CYAN };
                self.set_bot_color(m, color);
            }
        }

        if ctrl != before {
            self.board.set(center, Occupant::Controller(ctrl));
        }
    }

    /// Open `FindWater` until the first sighting, then a single
    /// `ConnectToPosition` toward it.
    fn discover_tasks(&mut self, id: ColonyId) {
        let expires_at = self.tick + self.config.colony.task_expiry_ticks;
        let colony = &mut self.colonies[id];
        let Some(first) = colony.water.first().copied() else {
            if !colony.has_task_of(TaskKind::FindWater) {
                colony.add_task(TaskKind::FindWater, colony.center, expires_at);
            }
            return;
        };
        for task in colony.tasks.values_mut() {
            if task.kind == TaskKind::FindWater {
                task.done = true;
            }
        }
        if !colony.has_task_of(TaskKind::ConnectToPosition) {
            colony.add_task(TaskKind::ConnectToPosition, first.pos, expires_at);
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn bot(&self, id: BotId) -> Option<&Bot> {
        self.bots.get(id)
    }

    /// The bot standing on `pos`, with its handle.
    pub fn bot_at(&self, pos: Position) -> Option<(BotId, &Bot)> {
        let id = self.board.bot_at(pos)?;
        self.bots.get(id).map(|b| (id, b))
    }

    pub fn live_bot_count(&self) -> usize {
        self.bots.len()
    }

    pub fn colony(&self, id: ColonyId) -> Option<&Colony> {
        self.colonies.get(id)
    }

    pub fn colony_mut(&mut self, id: ColonyId) -> Option<&mut Colony> {
        self.colonies.get_mut(id)
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Mutable board access for renderers draining the patch.
    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    /// Size of the living lineage rooted at `id`.
    pub fn lineage_size(&self, id: BotId) -> usize {
        bot::lineage_size(&self.bots, id)
    }

    /// The lineage root (a bot with no living parent) with the most living
    /// descendants.
    pub fn largest_lineage(&self) -> Option<BotId> {
        self.bots
            .iter()
            .filter(|(_, b)| b.parent.is_none())
            .map(|(id, _)| (id, self.lineage_size(id)))
            .max_by_key(|&(_, size)| size)
            .map(|(id, _)| id)
    }
}
