//! Read-only oracle over a VM's opcode set.
//!
//! The catalog only needs what the converter needs: name↔number, which
//! opcodes are relative or absolute jumps, and which opcode is
//! `EXTENDED_ARG`/`NOP`. Everything else about an opcode set (its execution
//! semantics) belongs to the host runtime, not here.

use std::collections::HashMap;

/// A small non-negative integer naming an instruction within some VM's
/// opcode set. Source-VM and register-VM opcodes are both `Opcode`s, but a
/// given catalog only ever hands out opcodes that belong to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Opcode(pub u8);

/// A register index into the shared locals+stack register file.
/// Always `< 128` (see `spec.md` §6, "Register-file layout").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reg(pub u8);

impl Reg {
    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Read-only, value-semantic table describing one VM's opcode set.
#[derive(Debug, Clone)]
pub struct OpcodeCatalog {
    names: HashMap<Opcode, &'static str>,
    by_name: HashMap<&'static str, Opcode>,
    rel_jumps: Vec<Opcode>,
    abs_jumps: Vec<Opcode>,
    extended_arg: Opcode,
    nop: Opcode,
}

impl OpcodeCatalog {
    /// Build a catalog from host-supplied tables. Intended to be called once
    /// per process per VM (source or register); the host runtime owns the
    /// actual opcode assignment.
    #[must_use]
    pub fn new(
        names: &[(&'static str, u8)],
        rel_jumps: &[u8],
        abs_jumps: &[u8],
        extended_arg: u8,
        nop: u8,
    ) -> Self {
        let mut name_table = HashMap::with_capacity(names.len());
        let mut by_name = HashMap::with_capacity(names.len());
        for &(name, op) in names {
            name_table.insert(Opcode(op), name);
            by_name.insert(name, Opcode(op));
        }
        Self {
            names: name_table,
            by_name,
            rel_jumps: rel_jumps.iter().copied().map(Opcode).collect(),
            abs_jumps: abs_jumps.iter().copied().map(Opcode).collect(),
            extended_arg: Opcode(extended_arg),
            nop: Opcode(nop),
        }
    }

    /// Human-readable name for an opcode. Panics if the catalog doesn't know
    /// this opcode: a missing name means the converter is being driven by
    /// the wrong catalog, which is a programming error, not recoverable
    /// input.
    #[must_use]
    pub fn opname(&self, op: Opcode) -> &'static str {
        self.names
            .get(&op)
            .unwrap_or_else(|| panic!("opcode {} is not in this catalog", op.0))
    }

    /// Opcode for a mnemonic, if this catalog defines one.
    #[must_use]
    pub fn opcode(&self, name: &str) -> Option<Opcode> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn is_rel_jump(&self, op: Opcode) -> bool {
        self.rel_jumps.contains(&op)
    }

    #[must_use]
    pub fn is_abs_jump(&self, op: Opcode) -> bool {
        self.abs_jumps.contains(&op)
    }

    #[must_use]
    pub fn is_jump(&self, op: Opcode) -> bool {
        self.is_rel_jump(op) || self.is_abs_jump(op)
    }

    #[must_use]
    pub fn is_ext_arg(&self, op: Opcode) -> bool {
        op == self.extended_arg
    }

    #[must_use]
    pub fn extended_arg(&self) -> Opcode {
        self.extended_arg
    }

    #[must_use]
    pub fn nop(&self) -> Opcode {
        self.nop
    }
}
