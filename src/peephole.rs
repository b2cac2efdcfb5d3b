//! The two register-elision passes plus the protected-load pre-pass and NOP
//! cleanup they depend on.
//!
//! Grounded in `examples/original_source/Lib/rattlesnake/converter.py`'s
//! `mark_protected_loads`, `forward_propagate_fast_loads`,
//! `backward_propagate_fast_stores`, `delete_nops`, and `mark_dirty`. Dirty
//! tracking there resets an address to a `-1` sentinel for later recompute;
//! here it's folded directly into a `reflow` call over the affected suffix
//! (`spec.md` §9, "Address cache coherence").

use std::collections::HashMap;

use crate::block::{reflow, Block};
use crate::instruction::{Instruction, RegisterBody};
use crate::opcode::Reg;

/// Marks `LOAD_FAST_REG` instructions whose destination register is read
/// implicitly by a later `BUILD_*_REG`/`CALL*_REG` instruction's contiguous
/// register range, so forward propagation skips them.
///
/// For each instruction with an implicit contiguous input range
/// (`dest..dest+length` for a sequence build, `dest..dest+nargs` for a
/// call), walks backward from it and protects the most recent
/// `LOAD_FAST_REG` writing each register in that range.
pub fn mark_protected_loads(blocks: &mut [Block]) {
    for block in blocks {
        let len = block.instructions.len();
        for i in 0..len {
            let range = implicit_input_range(&block.instructions[i]);
            let Some((first, last)) = range else { continue };
            let mut saved: Vec<bool> = vec![false; (last - first) as usize];
            'backward: for j in (0..i).rev() {
                let Some(dest) = register_dest(&block.instructions[j]) else {
                    continue;
                };
                if dest.0 < first || dest.0 >= last {
                    continue;
                }
                let slot = (dest.0 - first) as usize;
                if saved[slot] {
                    continue;
                }
                if let Instruction::Register(instr) = &mut block.instructions[j] {
                    if let RegisterBody::LoadFastReg { protected, .. } = &mut instr.body {
                        *protected = true;
                        saved[slot] = true;
                    }
                }
                if saved.iter().all(|&s| s) {
                    break 'backward;
                }
            }
        }
    }
}

fn implicit_input_range(instr: &Instruction) -> Option<(u8, u8)> {
    let Instruction::Register(instr) = instr else {
        return None;
    };
    match &instr.body {
        RegisterBody::BuildSeqReg { dest, length, .. } => Some((dest.0, dest.0 + length)),
        RegisterBody::CallReg { dest, nargs } => Some((dest.0, dest.0 + nargs)),
        RegisterBody::CallKwReg { dest, nargs, .. } => Some((dest.0, dest.0 + nargs)),
        _ => None,
    }
}

fn register_dest(instr: &Instruction) -> Option<Reg> {
    match instr {
        Instruction::Register(instr) => instr.body.dest(),
        Instruction::Source(_) => None,
    }
}

/// Replaces every unprotected `LOAD_FAST_REG` with a `Nop` and substitutes
/// its destination register with its source everywhere downstream, until
/// the destination is itself overwritten. Runs [`mark_protected_loads`]
/// first. `prop_dict` is shared across the whole block list, in block
/// order, matching the original's single continuous dictionary.
///
/// Returns the index of the first modified block, if any, for the caller to
/// [`reflow`] from.
pub fn forward_propagate_fast_loads(blocks: &mut [Block]) -> Option<usize> {
    mark_protected_loads(blocks);
    let mut prop_dict: HashMap<u8, Reg> = HashMap::new();
    let mut dirty: Option<usize> = None;

    for (block_index, block) in blocks.iter_mut().enumerate() {
        for instr in &mut block.instructions {
            let Instruction::Register(reg_instr) = instr else {
                continue;
            };
            if let RegisterBody::LoadFastReg {
                dest,
                source1,
                protected,
            } = &reg_instr.body
            {
                if !*protected {
                    prop_dict.insert(dest.0, *source1);
                    reg_instr.body = RegisterBody::Nop;
                    dirty.get_or_insert(block_index);
                    continue;
                }
            }
            let refs = reg_instr.body.registers_mut();
            if let Some(source1) = refs.source1 {
                if let Some(&mapped) = prop_dict.get(&source1.0) {
                    *source1 = mapped;
                }
            }
            if let Some(source2) = refs.source2 {
                if let Some(&mapped) = prop_dict.get(&source2.0) {
                    *source2 = mapped;
                }
            }
            if let Some(dest) = refs.dest {
                prop_dict.remove(&dest.0);
            }
        }
    }
    if let Some(d) = dirty {
        reflow(blocks, d);
    }
    dirty
}

/// Replaces every `STORE_FAST_REG` with a `Nop`, remapping its source
/// register to its destination in every instruction *preceding* it (within
/// the same backward sweep) until that register is produced as a
/// destination. Walks blocks forward but each block's own instructions in
/// reverse, exactly as the original does (`enumerate_reversed`).
pub fn backward_propagate_fast_stores(blocks: &mut [Block]) -> Option<usize> {
    let mut prop_dict: HashMap<u8, Reg> = HashMap::new();
    let mut dirty: Option<usize> = None;

    for (block_index, block) in blocks.iter_mut().enumerate() {
        for instr in block.instructions.iter_mut().rev() {
            let Instruction::Register(reg_instr) = instr else {
                continue;
            };
            if let RegisterBody::StoreFastReg { dest, source1 } = &reg_instr.body {
                prop_dict.insert(source1.0, *dest);
                reg_instr.body = RegisterBody::Nop;
                dirty = Some(dirty.map_or(block_index, |d| d.min(block_index)));
                continue;
            }
            let mut refs = reg_instr.body.registers_mut();
            if let Some(dest) = refs.dest.take() {
                if let Some(&mapped) = prop_dict.get(&dest.0) {
                    *dest = mapped;
                }
            }
            if let Some(source1) = refs.source1 {
                prop_dict.remove(&source1.0);
            }
            if let Some(source2) = refs.source2 {
                prop_dict.remove(&source2.0);
            }
        }
    }
    if let Some(d) = dirty {
        reflow(blocks, d);
    }
    dirty
}

/// Deletes every `Nop` left behind by the two propagation passes, then
/// reflows addresses from the earliest affected block.
pub fn delete_nops(blocks: &mut [Block]) {
    let mut dirty: Option<usize> = None;
    for (block_index, block) in blocks.iter_mut().enumerate() {
        let before = block.instructions.len();
        block.delete_nops();
        if block.instructions.len() != before {
            dirty = Some(dirty.map_or(block_index, |d| d.min(block_index)));
        }
    }
    if let Some(d) = dirty {
        reflow(blocks, d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Vm;
    use crate::instruction::{BlockId, RegisterInstr};

    fn block_of(bodies: Vec<RegisterBody>) -> Block {
        let mut block = Block::new(Vm::Register, BlockId(0));
        for body in bodies {
            block.push(Instruction::Register(RegisterInstr {
                line_number: None,
                body,
            }));
        }
        block
    }

    #[test]
    fn forward_propagation_elides_unprotected_load() {
        let mut blocks = vec![block_of(vec![
            RegisterBody::LoadFastReg {
                dest: Reg(2),
                source1: Reg(0),
                protected: false,
            },
            RegisterBody::ReturnReg { source1: Reg(2) },
        ])];
        forward_propagate_fast_loads(&mut blocks);
        assert!(blocks[0].instructions[0].is_nop());
        let Instruction::Register(ret) = &blocks[0].instructions[1] else {
            panic!()
        };
        assert!(matches!(ret.body, RegisterBody::ReturnReg { source1: Reg(0) }));
    }

    #[test]
    fn protected_load_survives_propagation() {
        let mut blocks = vec![block_of(vec![
            RegisterBody::LoadFastReg {
                dest: Reg(3),
                source1: Reg(0),
                protected: false,
            },
            RegisterBody::LoadFastReg {
                dest: Reg(4),
                source1: Reg(1),
                protected: false,
            },
            RegisterBody::BuildSeqReg {
                op: crate::opcode::Opcode(38),
                dest: Reg(3),
                length: 2,
            },
        ])];
        forward_propagate_fast_loads(&mut blocks);
        assert!(!blocks[0].instructions[0].is_nop());
        assert!(!blocks[0].instructions[1].is_nop());
    }

    #[test]
    fn backward_propagation_elides_store_and_remaps_destination() {
        let mut blocks = vec![block_of(vec![
            RegisterBody::BinOpReg {
                op: crate::opcode::Opcode(11),
                dest: Reg(2),
                source1: Reg(0),
                source2: Reg(1),
            },
            RegisterBody::StoreFastReg {
                dest: Reg(0),
                source1: Reg(2),
            },
        ])];
        backward_propagate_fast_stores(&mut blocks);
        assert!(blocks[0].instructions[1].is_nop());
        let Instruction::Register(bin) = &blocks[0].instructions[0] else {
            panic!()
        };
        assert!(matches!(bin.body, RegisterBody::BinOpReg { dest: Reg(0), .. }));
    }

    #[test]
    fn delete_nops_compacts_block() {
        let mut blocks = vec![block_of(vec![
            RegisterBody::Nop,
            RegisterBody::ReturnReg { source1: Reg(0) },
        ])];
        delete_nops(&mut blocks);
        assert_eq!(blocks[0].instructions.len(), 1);
    }
}
