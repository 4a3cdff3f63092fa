// Genome: a bot's instruction tape plus its tiny VM state.
//
// The tape is a fixed-length `Vec<i32>`. A cell whose value is an opcode
// index (see `Opcode::decode`) executes that instruction; the cells after it
// are its arguments. Any other value is a relative jump by that value. The
// instruction pointer is circular: every move is `(pointer + n) mod len`
// with Euclidean modulo, so negative jumps wrap backwards.
//
// Alongside the tape the genome carries four general registers, the result
// of the most recent look/check (`last_result`, consumed by `SetReg`), a
// one-slot signal mailbox written by neighbours, and a `family` tag that is
// inherited unchanged and only re-rolled for de-novo genomes.
//
// Mutation happens only when a child genome is derived at reproduction
// (`Genome::child`). The CSV form is the persistence format used to seed and
// snapshot populations: comma-separated decimal integers, one per cell, each
// followed by a comma.
//
// See also: `vm.rs` for opcode semantics, `bot.rs` for the owning `Bot`.
//
// **Invariant:** `pointer < tape.len()` at all times. A violation is a core
// logic bug and panics.

use crate::config::GenomeParams;
use crate::error::GenomeError;
use crate::types::Direction;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tapebots_prng::GameRng;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

/// Instruction set. The discriminant is the tape value that selects it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Move,
    MoveAbs,
    CheckIfBro,
    CheckColony,
    Turn,
    Look,
    CheckHp,
    CheckInventory,
    HpToResource,
    Grab,
    EatOrganics,
    EatOrganicsAbs,
    Photo,
    EatOther,
    Build,
    ShareHp,
    ShareInventory,
    Attack,
    Divide,
    CheckSignal,
    SendSignal,
    ExecuteInstr,
    SetReg,
    IncReg,
    DecReg,
    JumpIfZero,
    CmpReg,
    CheckConnection,
}

impl Opcode {
    pub const ALL: [Opcode; 28] = [
        Opcode::Move,
        Opcode::MoveAbs,
        Opcode::CheckIfBro,
        Opcode::CheckColony,
        Opcode::Turn,
        Opcode::Look,
        Opcode::CheckHp,
        Opcode::CheckInventory,
        Opcode::HpToResource,
        Opcode::Grab,
        Opcode::EatOrganics,
        Opcode::EatOrganicsAbs,
        Opcode::Photo,
        Opcode::EatOther,
        Opcode::Build,
        Opcode::ShareHp,
        Opcode::ShareInventory,
        Opcode::Attack,
        Opcode::Divide,
        Opcode::CheckSignal,
        Opcode::SendSignal,
        Opcode::ExecuteInstr,
        Opcode::SetReg,
        Opcode::IncReg,
        Opcode::DecReg,
        Opcode::JumpIfZero,
        Opcode::CmpReg,
        Opcode::CheckConnection,
    ];

    /// `None` for values that are plain jumps.
    pub fn decode(value: i32) -> Option<Opcode> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// What a `Build` instruction places, selected by `arg2 mod 5`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildKind {
    Wall,
    Farm,
    Controller,
    Mine,
    ColonyFlag,
}

impl BuildKind {
    pub const ALL: [BuildKind; 5] = [
        BuildKind::Wall,
        BuildKind::Farm,
        BuildKind::Controller,
        BuildKind::Mine,
        BuildKind::ColonyFlag,
    ];

    pub fn from_gene(value: i32) -> Self {
        Self::ALL[value.rem_euclid(Self::ALL.len() as i32) as usize]
    }
}

// ---------------------------------------------------------------------------
// Genome
// ---------------------------------------------------------------------------

/// How a child genome was derived from its parent's.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inheritance {
    Copied,
    Mutated,
    DeNovo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genome {
    tape: Vec<i32>,
    pointer: usize,
    pub registers: [i32; 4],
    pub last_result: i32,
    pub signal: i32,
    pub family: u32,
}

impl Genome {
    /// Wrap an existing tape with fresh VM state. Panics on an empty tape.
    pub fn from_tape(tape: Vec<i32>, family: u32) -> Self {
        assert!(!tape.is_empty(), "genome tape must not be empty");
        Self {
            tape,
            pointer: 0,
            registers: [0; 4],
            last_result: 0,
            signal: 0,
            family,
        }
    }

    /// A random tape of `len` cells with a new family tag.
    pub fn random(len: usize, rng: &mut GameRng) -> Self {
        let tape = (0..len).map(|_| random_gene(len, rng)).collect();
        Self::from_tape(tape, rng.next_u32())
    }

    pub fn len(&self) -> usize {
        self.tape.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tape.is_empty()
    }

    pub fn tape(&self) -> &[i32] {
        &self.tape
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// The value under the instruction pointer.
    pub fn current(&self) -> i32 {
        self.tape[self.pointer]
    }

    /// The cell `offset` places after the pointer, wrapping.
    pub fn arg(&self, offset: usize) -> i32 {
        self.tape[(self.pointer + offset) % self.tape.len()]
    }

    pub fn arg_dir(&self, offset: usize) -> Direction {
        Direction::from_gene(self.arg(offset))
    }

    /// Register selected by argument `offset` (`value mod 4`).
    pub fn arg_reg(&self, offset: usize) -> usize {
        self.arg(offset).rem_euclid(4) as usize
    }

    /// Advance the pointer by `n` cells, wrapping in either direction.
    pub fn jump_by(&mut self, n: i32) {
        let len = self.tape.len();
        assert!(
            self.pointer < len,
            "instruction pointer {} outside tape of {len}",
            self.pointer
        );
        self.pointer = (self.pointer as i64 + n as i64).rem_euclid(len as i64) as usize;
    }

    /// Jump by the value of the current cell (the non-opcode fallback).
    pub fn jump_by_current(&mut self) {
        self.jump_by(self.current());
    }

    /// Kinship: same length and at most `max_differences` differing cells.
    pub fn is_kin(&self, other: &Genome, max_differences: usize) -> bool {
        if self.tape.len() != other.tape.len() {
            return false;
        }
        let mut differences = 0;
        for (a, b) in self.tape.iter().zip(&other.tape) {
            if a != b {
                differences += 1;
                if differences > max_differences {
                    return false;
                }
            }
        }
        true
    }

    /// Overwrite `rate` randomly chosen cells with fresh random values.
    /// Picks may repeat, so at most `rate` cells change.
    pub fn mutate(&mut self, rate: usize, rng: &mut GameRng) {
        let len = self.tape.len();
        for _ in 0..rate {
            let i = rng.range_usize(0, len);
            self.tape[i] = random_gene(len, rng);
        }
    }

    /// Derive a child genome. VM state is always reset; the tape is either a
    /// brand-new random one, a mutated copy, or an exact copy.
    pub fn child(&self, params: &GenomeParams, rng: &mut GameRng) -> (Genome, Inheritance) {
        if rng.chance(params.de_novo_per_mille, 1000) {
            return (Genome::random(self.tape.len(), rng), Inheritance::DeNovo);
        }
        let mut child = Genome::from_tape(self.tape.clone(), self.family);
        if rng.chance(params.mutation_chance_percent, 100) {
            child.mutate(params.mutation_rate, rng);
            (child, Inheritance::Mutated)
        } else {
            (child, Inheritance::Copied)
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(self.tape.len() * 4);
        for v in &self.tape {
            // Writing to a String cannot fail.
            let _ = write!(out, "{v},");
        }
        out
    }

    /// Parse the CSV form. A trailing comma and surrounding whitespace are
    /// accepted; the cell count must equal `expected_len`.
    pub fn parse_csv(text: &str, expected_len: usize) -> Result<Genome, GenomeError> {
        let trimmed = text.trim();
        let body = trimmed.strip_suffix(',').unwrap_or(trimmed);
        let tape = if body.is_empty() {
            Vec::new()
        } else {
            body.split(',')
                .enumerate()
                .map(|(index, cell)| {
                    let cell = cell.trim();
                    cell.parse::<i32>().map_err(|_| GenomeError::InvalidCell {
                        index,
                        text: cell.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        if tape.len() != expected_len || tape.is_empty() {
            return Err(GenomeError::WrongLength {
                expected: expected_len,
                found: tape.len(),
            });
        }
        Ok(Genome::from_tape(tape, 0))
    }
}

/// Load a genome saved with [`save`].
pub fn load(path: impl AsRef<Path>, expected_len: usize) -> Result<Genome, GenomeError> {
    let text = std::fs::read_to_string(path)?;
    Genome::parse_csv(&text, expected_len)
}

pub fn save(genome: &Genome, path: impl AsRef<Path>) -> Result<(), GenomeError> {
    std::fs::write(path, genome.to_csv())?;
    Ok(())
}

/// A random cell value in `[0, len - 1)`.
fn random_gene(len: usize, rng: &mut GameRng) -> i32 {
    let upper = (len.saturating_sub(1)).max(1) as u64;
    rng.range_u64(0, upper) as i32
}
