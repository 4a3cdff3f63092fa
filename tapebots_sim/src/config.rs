// Data-driven simulation configuration.
//
// All tunable parameters live here in `GameConfig`, loaded from JSON by the
// headless binary and passed into `SimState::new`. The sim never uses magic
// numbers for balance; costs, gains, chances and timings are read from the
// config. Parameters are grouped into nested structs by the subsystem that
// reads them: `WorldParams` (board size and generation), `GenomeParams`
// (VM budget and mutation), `BotParams` (hp economy and reproduction),
// `GrabParams` / `BuildParams` (the VM's interaction tables) and
// `ColonyParams` (bookkeeping and task scheduling).
//
// Every struct is `#[serde(default)]`, so a config file only needs to name
// the values it overrides.
//
// Chances are integers: `_percent` fields roll out of 100, `_per_mille`
// fields out of 1000 (see `GameRng::chance`).
//
// See also: `sim.rs` which owns the `GameConfig` as part of `SimState`,
// `vm.rs` for the grab and build tables.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Parameter groups
// ---------------------------------------------------------------------------

/// Board size and world generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldParams {
    pub rows: i32,
    pub cols: i32,
    /// Chance per empty inner cell of a fresh bot at (re)seed time.
    pub bot_chance_percent: u32,
    pub resource_chance_percent: u32,
    /// Amount in a freshly placed `Resource`.
    pub resource_amount: i32,
    pub poison_per_mille: u32,
    /// Number of water bodies generated at world creation.
    pub water_bodies: u32,
    pub water_amount: i32,
    /// Reseed the population once the live count drops to this. Zero
    /// disables the threshold check.
    pub new_gen_threshold: usize,
    /// Reseed a board with no live bots even when the threshold is zero.
    pub reseed_extinct: bool,
}

impl Default for WorldParams {
    fn default() -> Self {
        Self {
            rows: 280,
            cols: 420,
            bot_chance_percent: 5,
            resource_chance_percent: 5,
            resource_amount: 1,
            poison_per_mille: 3,
            water_bodies: 20,
            water_amount: 10_000,
            new_gen_threshold: 5,
            reseed_extinct: true,
        }
    }
}

/// Genome shape, VM budget and mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenomeParams {
    pub length: usize,
    pub max_instructions_per_turn: u32,
    pub mutation_chance_percent: u32,
    /// Cells overwritten when a mutation triggers.
    pub mutation_rate: usize,
    /// Chance of a child getting a brand-new random genome.
    pub de_novo_per_mille: u32,
    /// Two bots are kin when their tapes differ in at most this many cells.
    pub kin_max_differences: usize,
    pub mutate_color: bool,
    pub color_mutation_strength: f32,
}

impl Default for GenomeParams {
    fn default() -> Self {
        Self {
            length: 256,
            max_instructions_per_turn: 5,
            mutation_chance_percent: 25,
            mutation_rate: 4,
            de_novo_per_mille: 5,
            kin_max_differences: 3,
            mutate_color: true,
            color_mutation_strength: 0.05,
        }
    }
}

/// Hp economy and reproduction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotParams {
    pub initial_hp: i32,
    pub max_hp: i32,
    pub division_min_hp: i32,
    /// Lower threshold for bots that belong to a colony.
    pub colony_division_min_hp: i32,
    pub division_cost: i32,
    pub photo_hp_gain: i32,
    /// Amount left in an `Organics` remnant when a bot dies.
    pub organics_initial_amount: i32,
    pub organics_remnant_percent: u32,
    /// Tint bots toward red when they eat others and toward green when they
    /// photosynthesize.
    pub resource_color_change: bool,
    pub color_delta: f32,
}

impl Default for BotParams {
    fn default() -> Self {
        Self {
            initial_hp: 100,
            max_hp: 500,
            division_min_hp: 90,
            colony_division_min_hp: 80,
            division_cost: 40,
            photo_hp_gain: 1,
            organics_initial_amount: 10,
            organics_remnant_percent: 33,
            resource_color_change: false,
            color_delta: 0.01,
        }
    }
}

/// Deltas applied by the `Grab` opcode, per occupant kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabParams {
    pub food_hp_gain: i32,
    pub resource_gain: i32,
    pub resource_hp_gain: i32,
    pub resource_depletion: i32,
    pub controller_cost: i32,
    pub controller_hp_gain: i32,
    pub spawner_cost: i32,
    pub building_gain: i32,
    pub building_hp_gain: i32,
    pub farm_cost: i32,
    pub mine_gain: i32,
    pub mine_hp_cost: i32,
}

impl Default for GrabParams {
    fn default() -> Self {
        Self {
            food_hp_gain: 250,
            resource_gain: 5,
            resource_hp_gain: 5,
            resource_depletion: 10,
            controller_cost: 1,
            controller_hp_gain: 1,
            spawner_cost: 20,
            building_gain: 1,
            building_hp_gain: 5,
            farm_cost: 1,
            mine_gain: 300,
            mine_hp_cost: 10,
        }
    }
}

/// Costs and results of the `Build` opcode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildParams {
    pub wall_cost: i32,
    pub wall_hp_gain: i32,
    pub wall_hp: i32,
    pub farms_enabled: bool,
    pub farm_cost: i32,
    pub farm_hp_gain: i32,
    pub farm_initial_amount: i32,
    pub mine_cost: i32,
    pub controller_initial_amount: i32,
    pub controller_hp_gain: i32,
    pub max_flags: usize,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            wall_cost: 1,
            wall_hp_gain: 5,
            wall_hp: 20,
            farms_enabled: true,
            farm_cost: 2,
            farm_hp_gain: 1,
            farm_initial_amount: 0,
            mine_cost: 1,
            controller_initial_amount: 1000,
            controller_hp_gain: 1,
            max_flags: 3,
        }
    }
}

/// Colony bookkeeping and task scheduling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColonyParams {
    pub flag_radius: i32,
    pub heal_with_inventory: i32,
    pub heal_without_inventory: i32,
    /// Extra hp per tick for members holding a task.
    pub task_holder_hp: i32,
    /// Ticks an owner gets to reach its task before being relieved.
    pub task_expiry_ticks: u64,
    /// Ticks a relieved bot must wait before taking another task.
    pub cooldown_ticks: u64,
    /// Planning passes before an unreachable connection target is abandoned.
    pub connect_max_attempts: u32,
    /// Ticks between flow field recomputations.
    pub flow_field_interval: u64,
}

impl Default for ColonyParams {
    fn default() -> Self {
        Self {
            flag_radius: 5,
            heal_with_inventory: 5,
            heal_without_inventory: 3,
            task_holder_hp: 1,
            task_expiry_ticks: 500,
            cooldown_ticks: 100,
            connect_max_attempts: 2,
            flow_field_interval: 5,
        }
    }
}

/// One row of the population-scaled upkeep table: while more than `above`
/// bots are alive, every bot loses `hp_cost` per tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpkeepTier {
    pub above: usize,
    pub hp_cost: i32,
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Wall-clock pacing for `--realtime` runs. The sim itself counts ticks.
    pub tick_duration_ms: u32,
    pub world: WorldParams,
    pub genome: GenomeParams,
    pub bot: BotParams,
    pub grab: GrabParams,
    pub build: BuildParams,
    pub colony: ColonyParams,
    /// Tiers in descending `above` order; the first match wins.
    pub upkeep: Vec<UpkeepTier>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_duration_ms: 16,
            world: WorldParams::default(),
            genome: GenomeParams::default(),
            bot: BotParams::default(),
            grab: GrabParams::default(),
            build: BuildParams::default(),
            colony: ColonyParams::default(),
            upkeep: vec![
                UpkeepTier { above: 20_000, hp_cost: 15 },
                UpkeepTier { above: 5_000, hp_cost: 13 },
                UpkeepTier { above: 3_000, hp_cost: 2 },
                UpkeepTier { above: 0, hp_cost: 1 },
            ],
        }
    }
}

impl GameConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.rows < 3 {
            return Err(ConfigError::Invalid(format!(
                "world.rows must be at least 3 (two wall rows and one open row), got {}",
                self.world.rows
            )));
        }
        if self.world.cols < 1 {
            return Err(ConfigError::Invalid(format!(
                "world.cols must be positive, got {}",
                self.world.cols
            )));
        }
        if self.genome.length == 0 {
            return Err(ConfigError::Invalid("genome.length must be positive".into()));
        }
        if self.genome.max_instructions_per_turn == 0 {
            return Err(ConfigError::Invalid(
                "genome.max_instructions_per_turn must be positive".into(),
            ));
        }
        if self.colony.flow_field_interval == 0 {
            return Err(ConfigError::Invalid(
                "colony.flow_field_interval must be positive".into(),
            ));
        }
        if self.upkeep.is_empty() {
            return Err(ConfigError::Invalid("upkeep table must not be empty".into()));
        }
        Ok(())
    }

    /// Per-tick hp cost for a population of `live` bots. Falls back to the
    /// last tier when no tier matches.
    pub fn upkeep_for(&self, live: usize) -> i32 {
        self.upkeep
            .iter()
            .find(|tier| live > tier.above)
            .or(self.upkeep.last())
            .map_or(0, |tier| tier.hp_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = GameConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let restored: GameConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "world": { "rows": 40, "cols": 60 },
            "grab": { "food_hp_gain": 7 }
        }"#;
        let config = GameConfig::from_json(json).unwrap();
        assert_eq!(config.world.rows, 40);
        assert_eq!(config.world.cols, 60);
        assert_eq!(config.world.bot_chance_percent, 5);
        assert_eq!(config.grab.food_hp_gain, 7);
        assert_eq!(config.grab.resource_gain, 5);
        assert_eq!(config.genome.length, 256);
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let err = GameConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn validate_rejects_degenerate_boards() {
        let err = GameConfig::from_json(r#"{ "world": { "rows": 2 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut config = GameConfig::default();
        config.genome.length = 0;
        assert!(config.validate().is_err());

        let mut config = GameConfig::default();
        config.upkeep.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn upkeep_tiers() {
        let config = GameConfig::default();
        assert_eq!(config.upkeep_for(25_000), 15);
        assert_eq!(config.upkeep_for(6_000), 13);
        assert_eq!(config.upkeep_for(3_001), 2);
        assert_eq!(config.upkeep_for(3_000), 1);
        assert_eq!(config.upkeep_for(0), 1);
    }
}
