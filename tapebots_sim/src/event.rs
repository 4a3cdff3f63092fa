// Narrative events emitted by the simulation.
//
// Each call to `SimState::tick` returns a `StepResult` holding the events
// that happened during that tick, in the order they happened, plus birth and
// death counts. The headless binary logs them; tests use them to observe
// colony and task transitions without poking at internal state.
//
// Births and deaths are counted rather than listed, since a busy board sees
// thousands per tick.
//
// See also: `sim.rs` for the tick loop that produces these.

use crate::types::{BotId, ColonyId, Position};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimEventKind {
    ColonyFounded {
        colony: ColonyId,
        founder: BotId,
        center: Position,
        members: usize,
    },
    ColonyDissolved {
        colony: ColonyId,
        members: usize,
    },
    /// A member looked at a water body the colony did not know yet.
    WaterDiscovered {
        colony: ColonyId,
        pos: Position,
        group: u32,
    },
    /// A connection path was planned and its maintenance tasks created.
    ConnectionPlanned {
        colony: ColonyId,
        target: Position,
        tiles: usize,
    },
    /// A connection target stayed unreachable for every planning attempt.
    ConnectionAbandoned {
        colony: ColonyId,
        target: Position,
        attempts: u32,
    },
    /// An owner ran out of time and was relieved of its task.
    TaskExpired {
        colony: ColonyId,
        bot: BotId,
        pos: Position,
    },
    PopulationReseeded {
        survivors: usize,
        spawned: usize,
    },
}

/// Output of one tick.
#[derive(Clone, Debug, Default)]
pub struct StepResult {
    pub events: Vec<SimEvent>,
    pub births: usize,
    pub deaths: usize,
}

impl StepResult {
    pub fn push(&mut self, tick: u64, kind: SimEventKind) {
        self.events.push(SimEvent { tick, kind });
    }
}
