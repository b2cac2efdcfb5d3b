//! Serializes lowered, peephole-cleaned register blocks back into a flat
//! wordcode byte string, plus the accompanying line-number table.
//!
//! Grounded in `examples/original_source/Lib/rattlesnake/converter.py`'s
//! `InstructionSetConverter.__bytes__` and `get_lnotab`.

use crate::block::Block;
use crate::instruction::{BlockId, Instruction, JumpTarget, RegisterBody};
use crate::opcode::{Opcode, OpcodeCatalog};

fn opcode_for(body: &RegisterBody, catalog: &OpcodeCatalog) -> Opcode {
    match body {
        RegisterBody::UnaryOpReg { op, .. }
        | RegisterBody::BinOpReg { op, .. }
        | RegisterBody::BuildSeqReg { op, .. }
        | RegisterBody::JumpAbsReg { op, .. }
        | RegisterBody::JumpIfReg { op, .. } => *op,
        RegisterBody::Nop => catalog.nop(),
        RegisterBody::LoadFastReg { .. } => fixed(catalog, "LOAD_FAST_REG"),
        RegisterBody::LoadConstReg { .. } => fixed(catalog, "LOAD_CONST_REG"),
        RegisterBody::LoadGlobalReg { .. } => fixed(catalog, "LOAD_GLOBAL_REG"),
        RegisterBody::StoreFastReg { .. } => fixed(catalog, "STORE_FAST_REG"),
        RegisterBody::StoreGlobalReg { .. } => fixed(catalog, "STORE_GLOBAL_REG"),
        RegisterBody::CompareOpReg { .. } => fixed(catalog, "COMPARE_OP_REG"),
        RegisterBody::ExtendSeqReg { .. } => fixed(catalog, "LIST_EXTEND_REG"),
        RegisterBody::CallReg { .. } => fixed(catalog, "CALL_FUNCTION_REG"),
        RegisterBody::CallKwReg { .. } => fixed(catalog, "CALL_FUNCTION_KW_REG"),
        RegisterBody::ReturnReg { .. } => fixed(catalog, "RETURN_VALUE_REG"),
    }
}

fn fixed(catalog: &OpcodeCatalog, name: &str) -> Opcode {
    catalog
        .opcode(name)
        .unwrap_or_else(|| panic!("register catalog has no entry for {name}"))
}

/// Resolves a jump's `target` block to the oparg byte the emitted wordcode
/// carries: the target block's own (post-reflow) absolute address, for
/// every jump variant, relative source-VM jumps included. `jump_convert`
/// turns every register-VM jump (`JUMP_FORWARD` among them) into an
/// instruction whose `opargs` reads `self.target.address` directly; there
/// is no relative-oparg register-VM jump to emit.
fn resolve_target(target: JumpTarget, blocks: &[Block]) -> u8 {
    let block_id = target
        .as_block()
        .expect("jump targets must be resolved to a block before emission");
    let BlockId(idx) = block_id;
    let target_addr = blocks[idx as usize]
        .address
        .expect("block addresses must be reflowed before emission");
    target_addr as u8
}

/// Appends one instruction's wordcode to `out`: every oparg byte but the
/// last is prefixed with `EXTENDED_ARG`, and the last pairs with the real
/// opcode (`spec.md` §6, "Register-VM instructions with multiple opargs...").
/// Jump variants resolve their target against `blocks` instead of reading
/// `body.opargs()`'s placeholder target byte.
fn serialize_into(body: &RegisterBody, catalog: &OpcodeCatalog, blocks: &[Block], out: &mut Vec<u8>) {
    let op = opcode_for(body, catalog);
    let ext = catalog.extended_arg();
    match body {
        RegisterBody::JumpAbsReg { target, .. } => {
            let byte = resolve_target(*target, blocks);
            out.push(op.0);
            out.push(byte);
        }
        RegisterBody::JumpIfReg { target, source1, .. } => {
            let byte = resolve_target(*target, blocks);
            out.push(ext.0);
            out.push(byte);
            out.push(op.0);
            out.push(source1.0);
        }
        _ => {
            let opargs = body.opargs();
            let (prefix, last) = opargs.split_at(opargs.len() - 1);
            for &byte in prefix {
                out.push(ext.0);
                out.push(byte);
            }
            out.push(op.0);
            out.push(last[0]);
        }
    }
}

/// Concatenates every register block's serialized instructions, in block
/// order.
#[must_use]
pub fn serialize(blocks: &[Block], catalog: &OpcodeCatalog) -> Vec<u8> {
    let mut out = Vec::new();
    for block in blocks {
        for instr in &block.instructions {
            let Instruction::Register(instr) = instr else {
                unreachable!("register blocks only ever hold RegisterInstr")
            };
            serialize_into(&instr.body, catalog, blocks, &mut out);
        }
    }
    out
}

/// Reconstructs the line-number table: alternating `(address_delta,
/// line_delta)` byte pairs, emitted only when the line number strictly
/// increases (`spec.md` §7, `get_lnotab`).
#[must_use]
pub fn build_lnotab(blocks: &[Block], first_line_number: u32) -> Vec<u8> {
    let mut lnotab = Vec::new();
    let mut last_line = first_line_number;
    let mut last_address = 0u32;
    let mut address = 0u32;

    for block in blocks {
        for instr in &block.instructions {
            let line = instr.line_number().unwrap_or(last_line);
            if line > last_line {
                lnotab.push((address - last_address) as u8);
                lnotab.push((line - last_line) as u8);
                last_line = line;
                last_address = address;
            }
            address += instr.encoded_len();
        }
    }
    lnotab
}
