//! Turns a flat wordcode byte string into a list of source-VM basic blocks
//! with resolved jump targets.
//!
//! Grounded in `examples/original_source/Lib/rattlesnake/converter.py`'s
//! `findlabels`/`find_blocks`/`convert_jump_targets_to_blocks`. The original
//! asserts a jump's target address lands on a discovered block boundary;
//! here that becomes `LinearizeError::DanglingJumpTarget`.

use std::collections::BTreeSet;

use crate::block::{Block, Vm};
use crate::code_unit::CodeUnit;
use crate::error::LinearizeError;
use crate::instruction::{BlockId, Instruction, JumpTarget, SourceBody, SourceInstr};
use crate::opcode::{Opcode, OpcodeCatalog};

/// Line numbers for a code unit, queried by byte offset.
#[derive(Debug, Clone, Copy)]
pub struct LineTable<'a> {
    first_line_number: u32,
    starts: &'a [(u32, u32)],
}

impl<'a> LineTable<'a> {
    #[must_use]
    pub fn new(first_line_number: u32, starts: &'a [(u32, u32)]) -> Self {
        Self {
            first_line_number,
            starts,
        }
    }

    /// The line active at `offset`: the line of the latest entry at or
    /// before `offset`, or `first_line_number` if `offset` precedes every
    /// entry.
    #[must_use]
    pub fn lookup(&self, offset: u32) -> u32 {
        self.starts
            .iter()
            .rev()
            .find(|(at, _)| *at <= offset)
            .map_or(self.first_line_number, |(_, line)| *line)
    }
}

/// Every byte offset a jump (relative or absolute) in `code` can target,
/// plus offset 0 (the function's own entry point). Mirrors `findlabels`.
fn find_labels(code: &[u8], catalog: &OpcodeCatalog) -> Result<BTreeSet<u32>, LinearizeError> {
    if code.len() % 2 != 0 {
        return Err(LinearizeError::OddLength(code.len()));
    }
    let mut labels = BTreeSet::new();
    labels.insert(0);
    let mut carry: u32 = 0;
    let mut offset = 0u32;
    for pair in code.chunks_exact(2) {
        let (op, oparg) = (Opcode(pair[0]), u32::from(pair[1]));
        carry = (carry << 8) | oparg;
        if !catalog.is_ext_arg(op) {
            let folded = carry;
            carry = 0;
            if catalog.is_rel_jump(op) {
                labels.insert(offset + folded);
            } else if catalog.is_abs_jump(op) {
                labels.insert(folded);
            }
        }
        offset += 2;
    }
    Ok(labels)
}

/// Decode `code_unit.code` into source-VM blocks, `EXTENDED_ARG`-folding
/// opargs and resolving jump targets to block numbers.
pub fn linearize(code_unit: &CodeUnit<'_>, catalog: &OpcodeCatalog) -> Result<Vec<Block>, LinearizeError> {
    let labels = find_labels(code_unit.code, catalog)?;
    let lines = LineTable::new(code_unit.first_line_number, code_unit.line_starts);

    let mut blocks: Vec<Block> = Vec::new();
    let mut addr_to_block: Vec<(u32, BlockId)> = Vec::new();
    let mut ext_oparg: u32 = 0;
    let mut offset = 0u32;

    for pair in code_unit.code.chunks_exact(2) {
        if labels.contains(&offset) {
            let number = BlockId(blocks.len() as u32);
            addr_to_block.push((offset, number));
            let mut block = Block::new(Vm::Source, number);
            block.address = Some(offset);
            blocks.push(block);
        }
        let (op, raw_oparg) = (Opcode(pair[0]), u32::from(pair[1]));
        if catalog.is_ext_arg(op) {
            ext_oparg = (ext_oparg << 8) | raw_oparg;
            offset += 2;
            continue;
        }
        let oparg = (ext_oparg << 8) | raw_oparg;
        ext_oparg = 0;
        let line_number = Some(lines.lookup(offset));
        let body = if catalog.is_jump(op) {
            let target_addr = if catalog.is_rel_jump(op) { offset + oparg } else { oparg };
            SourceBody::Jump {
                target: JumpTarget::Address(target_addr),
            }
        } else {
            SourceBody::Raw { oparg }
        };
        let block = blocks
            .last_mut()
            .expect("offset 0 is always a label, so a block always exists here");
        block.push(Instruction::Source(SourceInstr {
            op,
            line_number,
            body,
        }));
        offset += 2;
    }

    resolve_jump_targets(&mut blocks, &addr_to_block)?;
    Ok(blocks)
}

fn resolve_jump_targets(blocks: &mut [Block], addr_to_block: &[(u32, BlockId)]) -> Result<(), LinearizeError> {
    for block in blocks.iter_mut() {
        let jump_at = block.address.unwrap_or(0);
        for instr in &mut block.instructions {
            let Instruction::Source(src) = instr else {
                continue;
            };
            if let SourceBody::Jump {
                target: target @ JumpTarget::Address(addr),
            } = &mut src.body
            {
                let resolved = addr_to_block
                    .iter()
                    .find(|(a, _)| *a == *addr)
                    .map(|(_, b)| *b)
                    .ok_or(LinearizeError::DanglingJumpTarget {
                        at: jump_at,
                        target: *addr,
                    })?;
                *target = JumpTarget::Block(resolved);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::stack_vm_catalog;

    fn code_unit(code: &[u8]) -> CodeUnit<'_> {
        CodeUnit::new(code, 1, 2, 1, &[])
    }

    #[test]
    fn single_block_with_no_jumps() {
        let catalog = stack_vm_catalog();
        let load = catalog.opcode("LOAD_FAST").unwrap();
        let ret = catalog.opcode("RETURN_VALUE").unwrap();
        let code = [load.0, 0, ret.0, 0];
        let unit = code_unit(&code);
        let blocks = linearize(&unit, &catalog).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].instructions.len(), 2);
    }

    #[test]
    fn forward_jump_splits_into_two_blocks() {
        let catalog = stack_vm_catalog();
        let load = catalog.opcode("LOAD_FAST").unwrap();
        let popjump = catalog.opcode("POP_JUMP_IF_FALSE").unwrap();
        let konst = catalog.opcode("LOAD_CONST").unwrap();
        let ret = catalog.opcode("RETURN_VALUE").unwrap();
        // 0: LOAD_FAST 0
        // 2: POP_JUMP_IF_FALSE -> 6
        // 4: LOAD_CONST 0 ; RETURN_VALUE
        // 6: LOAD_CONST 1 ; RETURN_VALUE
        let code = [
            load.0, 0, popjump.0, 6, konst.0, 0, ret.0, 0, konst.0, 1, ret.0, 0,
        ];
        let unit = code_unit(&code);
        let blocks = linearize(&unit, &catalog).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].address, Some(0));
        assert_eq!(blocks[1].address, Some(6));
        let Instruction::Source(jump) = &blocks[0].instructions[1] else {
            panic!("expected source instruction")
        };
        assert_eq!(
            jump.body,
            SourceBody::Jump {
                target: JumpTarget::Block(BlockId(1))
            }
        );
    }

    #[test]
    fn dangling_jump_target_is_an_error() {
        let catalog = stack_vm_catalog();
        let jump = catalog.opcode("JUMP_ABSOLUTE").unwrap();
        // JUMP_ABSOLUTE targeting an odd offset never on a block boundary.
        let code = [jump.0, 3];
        let unit = code_unit(&code);
        let err = linearize(&unit, &catalog).unwrap_err();
        assert!(matches!(err, LinearizeError::DanglingJumpTarget { .. }));
    }
}
