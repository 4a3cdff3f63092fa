// Cell contents.
//
// Every board cell holds exactly one `Occupant`. The set is closed and every
// reader matches it exhaustively, so adding a variant forces each call site
// (the VM's look/grab tables, the environment phase, world generation) to
// decide what it means.
//
// Owner fields are plain `BotId` handles and do not keep the bot alive; a
// building whose owner has died simply has an owner that no longer resolves.

use crate::types::{BotId, ColonyId};
use serde::{Deserialize, Serialize};

/// The anchor structure of a colony. Lives on the board at `Colony::center`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    pub colony: ColonyId,
    /// The founding bot. The colony dissolves once this bot is gone.
    pub owner: BotId,
    /// Resource buffer traded with connected members for hp.
    pub amount: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occupant {
    #[default]
    Empty,
    Wall,
    Resource {
        amount: i32,
    },
    /// `group` identifies the connected body of water this tile was
    /// generated in; colonies remember groups, not individual tiles.
    Water {
        group: u32,
        amount: i32,
    },
    /// Remains of a dead bot. Decays one unit per tick.
    Organics {
        amount: i32,
    },
    Food {
        amount: i32,
    },
    /// Produces one `Food` per tick around itself while `amount > 0`.
    Farm {
        owner: Option<BotId>,
        amount: i32,
    },
    Spawner {
        owner: Option<BotId>,
        amount: i32,
    },
    Mine {
        owner: Option<BotId>,
        amount: i32,
    },
    Controller(Controller),
    Building {
        owner: Option<BotId>,
        hp: i32,
    },
    Poison,
    Bot(BotId),
    ColonyFlag {
        colony: ColonyId,
    },
}

impl Occupant {
    pub fn is_empty(&self) -> bool {
        matches!(self, Occupant::Empty)
    }

    pub fn bot(&self) -> Option<BotId> {
        match self {
            Occupant::Bot(id) => Some(*id),
            _ => None,
        }
    }

    /// Structures that survive a population reseed.
    pub fn is_preserved(&self) -> bool {
        match self {
            Occupant::Controller(_)
            | Occupant::Farm { .. }
            | Occupant::Food { .. }
            | Occupant::Poison
            | Occupant::Building { .. }
            | Occupant::Water { .. }
            | Occupant::Spawner { .. }
            | Occupant::Mine { .. }
            | Occupant::ColonyFlag { .. }
            | Occupant::Wall => true,
            Occupant::Empty
            | Occupant::Resource { .. }
            | Occupant::Organics { .. }
            | Occupant::Bot(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn default_is_empty() {
        assert!(Occupant::default().is_empty());
        assert!(!Occupant::Wall.is_empty());
    }

    #[test]
    fn bot_accessor() {
        let mut arena: SlotMap<BotId, ()> = SlotMap::with_key();
        let id = arena.insert(());
        assert_eq!(Occupant::Bot(id).bot(), Some(id));
        assert_eq!(Occupant::Poison.bot(), None);
    }

    #[test]
    fn organics_and_resources_are_not_preserved() {
        assert!(!Occupant::Organics { amount: 3 }.is_preserved());
        assert!(!Occupant::Resource { amount: 1 }.is_preserved());
        assert!(Occupant::Water { group: 0, amount: 10 }.is_preserved());
    }

    #[test]
    fn controller_serializes_colony_owner_and_stock() {
        let mut colonies: SlotMap<ColonyId, ()> = SlotMap::with_key();
        let mut bots: SlotMap<BotId, ()> = SlotMap::with_key();
        let ctrl = Controller {
            colony: colonies.insert(()),
            owner: bots.insert(()),
            amount: 7,
        };
        let value = serde_json::to_value(ctrl).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["amount", "colony", "owner"]);
        assert_eq!(value["amount"], 7);
    }
}
