//! Tagged instruction variants for both the source (stack) VM and the
//! target (register) VM.
//!
//! Register fields are accessed uniformly through [`RegisterInstr::registers_mut`]
//! instead of reflection (`getattr(instr, "dest", None)` in the original),
//! so the peephole passes can stay exhaustiveness-checked `match`es.

use crate::opcode::{Opcode, Reg};

/// Dense, stable index of a basic block within one VM's block list. Source
/// and register blocks at the same `BlockId` correspond to one another
/// (invariant 4 in `spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

/// A jump's destination, before or after linearization resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    /// Byte offset into the original `co_code`. Transient: discarded once
    /// [`JumpTarget::Block`] is known.
    Address(u32),
    /// The destination block, once resolved.
    Block(BlockId),
}

impl JumpTarget {
    #[must_use]
    pub fn as_block(self) -> Option<BlockId> {
        match self {
            Self::Block(b) => Some(b),
            Self::Address(_) => None,
        }
    }
}

/// One instruction belonging to a stack-VM (`Source`) block.
#[derive(Debug, Clone)]
pub struct SourceInstr {
    pub op: Opcode,
    pub line_number: Option<u32>,
    pub body: SourceBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceBody {
    /// Any source-VM opcode carrying its `EXTENDED_ARG`-folded operand.
    Raw { oparg: u32 },
    /// Any source-VM jump.
    Jump { target: JumpTarget },
}

impl SourceInstr {
    #[must_use]
    pub fn is_jump(&self) -> bool {
        matches!(self.body, SourceBody::Jump { .. })
    }

    /// The folded oparg, for non-jump instructions. Jump instructions carry
    /// their operand in `target` instead.
    #[must_use]
    pub fn oparg(&self) -> Option<u32> {
        match self.body {
            SourceBody::Raw { oparg } => Some(oparg),
            SourceBody::Jump { .. } => None,
        }
    }
}

/// One instruction belonging to a register-VM block.
#[derive(Debug, Clone)]
pub struct RegisterInstr {
    pub line_number: Option<u32>,
    pub body: RegisterBody,
}

/// Register-VM instruction bodies. Variants whose source family covers more
/// than one concrete opcode (`UnaryOpReg`, `BinOpReg`, `BuildSeqReg`,
/// `JumpAbsReg`, `JumpIfReg`) carry their own `op` field so serialization
/// knows which mnemonic to emit; variants with exactly one underlying
/// opcode (loads, stores, calls, compare, return) don't need one.
#[derive(Debug, Clone)]
pub enum RegisterBody {
    /// Placeholder used by the peephole passes; never reaches the emitter.
    Nop,
    LoadFastReg { dest: Reg, source1: Reg, protected: bool },
    LoadConstReg { dest: Reg, name1: u8 },
    LoadGlobalReg { dest: Reg, name1: u8 },
    StoreFastReg { dest: Reg, source1: Reg },
    StoreGlobalReg { name1: u8, source1: Reg },
    UnaryOpReg { op: Opcode, dest: Reg, source1: Reg },
    BinOpReg { op: Opcode, dest: Reg, source1: Reg, source2: Reg },
    CompareOpReg { dest: Reg, source1: Reg, source2: Reg, compare_op: u8 },
    BuildSeqReg { op: Opcode, dest: Reg, length: u8 },
    ExtendSeqReg { dest: Reg, source1: Reg },
    CallReg { dest: Reg, nargs: u8 },
    CallKwReg { dest: Reg, nreg: Reg, nargs: u8 },
    JumpAbsReg { op: Opcode, target: JumpTarget },
    JumpIfReg { op: Opcode, target: JumpTarget, source1: Reg },
    ReturnReg { source1: Reg },
}

/// A mutable view over the register fields a [`RegisterBody`] variant
/// defines and reads, for the peephole passes to rewrite uniformly.
pub struct RegisterRefs<'a> {
    pub dest: Option<&'a mut Reg>,
    pub source1: Option<&'a mut Reg>,
    pub source2: Option<&'a mut Reg>,
}

impl RegisterBody {
    /// Mutable access to this instruction's register operands, classified by
    /// role (`dest` is written, `source1`/`source2` are read). Non-register
    /// numeric fields (`name1`, `length`, `nargs`, `nreg`, `compare_op`) are
    /// immediate operands, not register references, and are excluded.
    pub fn registers_mut(&mut self) -> RegisterRefs<'_> {
        match self {
            Self::Nop => RegisterRefs {
                dest: None,
                source1: None,
                source2: None,
            },
            Self::LoadConstReg { dest, .. } | Self::LoadGlobalReg { dest, .. } => RegisterRefs {
                dest: Some(dest),
                source1: None,
                source2: None,
            },
            Self::StoreGlobalReg { source1, .. } => RegisterRefs {
                dest: None,
                source1: Some(source1),
                source2: None,
            },
            Self::LoadFastReg { dest, source1, .. } => RegisterRefs {
                dest: Some(dest),
                source1: Some(source1),
                source2: None,
            },
            Self::StoreFastReg { dest, source1 } => RegisterRefs {
                dest: Some(dest),
                source1: Some(source1),
                source2: None,
            },
            Self::UnaryOpReg { dest, source1, .. } => RegisterRefs {
                dest: Some(dest),
                source1: Some(source1),
                source2: None,
            },
            Self::BinOpReg {
                dest,
                source1,
                source2,
                ..
            } => RegisterRefs {
                dest: Some(dest),
                source1: Some(source1),
                source2: Some(source2),
            },
            Self::CompareOpReg {
                dest,
                source1,
                source2,
                ..
            } => RegisterRefs {
                dest: Some(dest),
                source1: Some(source1),
                source2: Some(source2),
            },
            Self::BuildSeqReg { dest, .. } => RegisterRefs {
                dest: Some(dest),
                source1: None,
                source2: None,
            },
            Self::ExtendSeqReg { dest, source1 } => RegisterRefs {
                dest: Some(dest),
                source1: Some(source1),
                source2: None,
            },
            Self::CallReg { dest, .. } => RegisterRefs {
                dest: Some(dest),
                source1: None,
                source2: None,
            },
            Self::CallKwReg { dest, .. } => RegisterRefs {
                dest: Some(dest),
                source1: None,
                source2: None,
            },
            Self::JumpAbsReg { .. } => RegisterRefs {
                dest: None,
                source1: None,
                source2: None,
            },
            Self::JumpIfReg { source1, .. } => RegisterRefs {
                dest: None,
                source1: Some(source1),
                source2: None,
            },
            Self::ReturnReg { source1 } => RegisterRefs {
                dest: None,
                source1: Some(source1),
                source2: None,
            },
        }
    }

    /// This instruction's destination register, if it writes one.
    #[must_use]
    pub fn dest(&self) -> Option<Reg> {
        match self {
            Self::LoadFastReg { dest, .. }
            | Self::LoadConstReg { dest, .. }
            | Self::LoadGlobalReg { dest, .. }
            | Self::StoreFastReg { dest, .. }
            | Self::UnaryOpReg { dest, .. }
            | Self::BinOpReg { dest, .. }
            | Self::CompareOpReg { dest, .. }
            | Self::BuildSeqReg { dest, .. }
            | Self::ExtendSeqReg { dest, .. }
            | Self::CallReg { dest, .. }
            | Self::CallKwReg { dest, .. } => Some(*dest),
            Self::Nop
            | Self::StoreGlobalReg { .. }
            | Self::JumpAbsReg { .. }
            | Self::JumpIfReg { .. }
            | Self::ReturnReg { .. } => None,
        }
    }

    #[must_use]
    pub fn is_jump(&self) -> bool {
        matches!(self, Self::JumpAbsReg { .. } | Self::JumpIfReg { .. })
    }

    #[must_use]
    pub fn is_nop(&self) -> bool {
        matches!(self, Self::Nop)
    }

    /// The canonical oparg tuple: `dest` first (when present), then the
    /// remaining fields in the order they're declared on each variant (see
    /// `spec.md` §4.B / §6). Each entry is exactly one byte; all but the
    /// last are emitted as `EXTENDED_ARG` prefixes by the encoder.
    #[must_use]
    pub fn opargs(&self) -> Vec<u8> {
        match self {
            Self::Nop => vec![0],
            Self::LoadFastReg { dest, source1, .. } => vec![dest.0, source1.0],
            Self::LoadConstReg { dest, name1 } | Self::LoadGlobalReg { dest, name1 } => {
                vec![dest.0, *name1]
            }
            Self::StoreFastReg { dest, source1 } => vec![dest.0, source1.0],
            Self::StoreGlobalReg { name1, source1 } => vec![*name1, source1.0],
            Self::UnaryOpReg { dest, source1, .. } => vec![dest.0, source1.0],
            Self::BinOpReg {
                dest,
                source1,
                source2,
                ..
            } => vec![dest.0, source1.0, source2.0],
            Self::CompareOpReg {
                dest,
                source1,
                source2,
                compare_op,
            } => vec![dest.0, source1.0, source2.0, *compare_op],
            Self::BuildSeqReg { dest, length, .. } => vec![dest.0, *length],
            Self::ExtendSeqReg { dest, source1 } => vec![dest.0, source1.0],
            Self::CallReg { dest, nargs } => vec![dest.0, *nargs],
            Self::CallKwReg { dest, nreg, nargs } => vec![dest.0, nreg.0, *nargs],
            // The real target byte is filled in by `emit::serialize` once
            // block addresses are known; this only fixes the oparg tuple's
            // arity (1 for JumpAbsReg, 2 for JumpIfReg per the target-then-
            // source1 order) so `encoded_len` stays correct.
            Self::JumpAbsReg { .. } => vec![0],
            Self::JumpIfReg { source1, .. } => vec![0, source1.0],
            Self::ReturnReg { source1 } => vec![source1.0],
        }
    }

    /// Byte length this instruction occupies once serialized: `2 + 2*(k-1)`
    /// where `k` is the oparg tuple length (`spec.md` §3).
    #[must_use]
    pub fn encoded_len(&self) -> u32 {
        let k = self.opargs().len() as u32;
        2 + 2 * (k - 1)
    }
}

/// Either half of the converter: one instruction, from either VM's block
/// list. `Block` stores these uniformly so the CFG and linearizer code
/// doesn't need two parallel implementations.
#[derive(Debug, Clone)]
pub enum Instruction {
    Source(SourceInstr),
    Register(RegisterInstr),
}

impl Instruction {
    #[must_use]
    pub fn line_number(&self) -> Option<u32> {
        match self {
            Self::Source(i) => i.line_number,
            Self::Register(i) => i.line_number,
        }
    }

    #[must_use]
    pub fn is_jump(&self) -> bool {
        match self {
            Self::Source(i) => i.is_jump(),
            Self::Register(i) => i.body.is_jump(),
        }
    }

    #[must_use]
    pub fn is_nop(&self) -> bool {
        matches!(self, Self::Register(i) if i.body.is_nop())
    }

    /// Byte length once serialized. Only meaningful for register
    /// instructions; source instructions are never re-emitted, so this
    /// returns `2` (their decoded, non-`EXTENDED_ARG`-folded form) for them.
    #[must_use]
    pub fn encoded_len(&self) -> u32 {
        match self {
            Self::Source(_) => 2,
            Self::Register(i) => i.body.encoded_len(),
        }
    }

    #[must_use]
    pub fn as_register_mut(&mut self) -> Option<&mut RegisterInstr> {
        match self {
            Self::Register(i) => Some(i),
            Self::Source(_) => None,
        }
    }

    #[must_use]
    pub fn as_register(&self) -> Option<&RegisterInstr> {
        match self {
            Self::Register(i) => Some(i),
            Self::Source(_) => None,
        }
    }

    #[must_use]
    pub fn as_source(&self) -> Option<&SourceInstr> {
        match self {
            Self::Source(i) => Some(i),
            Self::Register(_) => None,
        }
    }
}
