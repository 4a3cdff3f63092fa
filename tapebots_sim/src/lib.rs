// tapebots_sim: the bot world simulation library.
//
// This crate contains all simulation logic for tapebots: the toroidal board,
// bots driven by genome tapes, colonies and their connection tasks,
// pathfinding, and the tick orchestrator. It has no rendering or I/O beyond
// genome CSV files and can be tested, benchmarked, and run headless.
//
// Module overview:
// - `sim.rs`:         Top-level SimState, world generation, tick phases, colony bookkeeping.
// - `vm.rs`:          Per-bot genome interpreter (a second `impl SimState` block).
// - `tasking.rs`:     Per-colony task scheduling: connection planning, station assignment, expiry.
// - `board.rs`:       Dense occupant grid with dirty tracking for renderers.
// - `occupant.rs`:    The closed set of things a cell can hold.
// - `genome.rs`:      Genome tapes, opcodes, mutation, CSV persistence.
// - `bot.rs`:         Bot records, the bot arena, lineage links.
// - `colony.rs`:      Colony records, the task table, the assign/unassign pair.
// - `pathfinding.rs`: A* and multi-source BFS flow fields over the wrapped grid.
// - `event.rs`:       Narrative SimEvents and the per-tick StepResult.
// - `config.rs`:      GameConfig, every tunable, loadable from JSON.
// - `error.rs`:       ConfigError and GenomeError.
// - `types.rs`:       Position, GridDims, Direction, Color, arena handles.
// - `prng`:           Re-exported from `tapebots_prng`: xoshiro256++ PRNG with SplitMix64 seeding.
//
// The simulation is single-threaded and runs one full tick before any
// caller reads state. All randomness flows through the one `GameRng` held
// by `SimState`, so a seed plus a config reproduces a run.

pub mod board;
pub mod bot;
pub mod colony;
pub mod config;
pub mod error;
pub mod event;
pub mod genome;
pub mod occupant;
pub mod pathfinding;
pub use tapebots_prng as prng;
pub mod sim;
pub mod tasking;
pub mod types;
mod vm;

pub use config::GameConfig;
pub use event::{SimEvent, SimEventKind, StepResult};
pub use genome::Genome;
pub use sim::SimState;
