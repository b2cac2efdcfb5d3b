//! Stack→register lowering: walks each source block in order, simulating
//! the stack-VM operand stack as a window onto the shared register file,
//! and emits the equivalent register-VM instruction for each source
//! instruction.
//!
//! Grounded in `examples/original_source/Lib/rattlesnake/converter.py`'s
//! `InstructionSetConverter` dispatch methods (`unary_convert`,
//! `binary_convert`, `compare_convert`, `load_convert`, `store_convert`,
//! `seq_convert`, `function_convert`, `jump_convert`). The commented-out
//! dispatch families in that file (attribute access, subscript store/
//! delete, `POP_TOP`/`ROT_*`, `IMPORT_NAME`, `UNPACK_SEQUENCE`,
//! `PRINT_EXPR`) are out of scope here too; any source opcode without an
//! entry below raises [`LowerError::UnhandledOpcode`].

use tracing::{debug, warn};

use crate::block::{Block, Vm};
use crate::error::{LowerError, StackSizeOverflow};
use crate::instruction::{
    BlockId, Instruction, JumpTarget, RegisterBody, RegisterInstr, SourceBody, SourceInstr,
};
use crate::observer::ConvertObserver;
use crate::opcode::{Opcode, OpcodeCatalog, Reg};

/// The operand-stack simulator. The stack occupies register indices
/// `[nlocals, max_stacklevel)`; locals occupy `[0, nlocals)`. One instance
/// is shared across every block in a single lowering pass: stack depth at
/// a block's entry is whatever the immediately preceding block (in list
/// order) left it at, exactly as in the original's single continuous
/// `self.stacklevel` counter.
struct Stack {
    level: u16,
    nlocals: u16,
    max_stacklevel: u16,
}

impl Stack {
    /// Reserve and return the next writable register.
    ///
    /// Per bpo-40315 (Serhiy Storchaka): CPython's frame line-number setter
    /// depends on instructions that may lie in unreachable code to find
    /// block boundaries, so the compiler deliberately leaves such code in
    /// rather than deleting it. The practical upshot here is that a
    /// `LOAD_*` conversion can legitimately run out of register space when
    /// simulating code no execution ever reaches; callers of `push` from a
    /// `LOAD_*` dispatch catch that overflow and stop lowering the rest of
    /// the block instead of treating it as a real error.
    fn push(&mut self) -> Result<Reg, StackSizeOverflow> {
        self.level += 1;
        if self.level > self.max_stacklevel {
            return Err(StackSizeOverflow::Overflow {
                stacklevel: self.level,
                max_stacklevel: self.max_stacklevel,
            });
        }
        Ok(Reg((self.level - 1) as u8))
    }

    fn pop(&mut self) -> Result<Reg, StackSizeOverflow> {
        self.level -= 1;
        if self.level < self.nlocals {
            return Err(StackSizeOverflow::Underflow {
                stacklevel: i32::from(self.level),
                nlocals: self.nlocals,
            });
        }
        Ok(Reg(self.level as u8))
    }

    fn peek(&self, n: u32) -> Result<Reg, StackSizeOverflow> {
        let level = i32::from(self.level) - n as i32;
        if level < i32::from(self.nlocals) {
            return Err(StackSizeOverflow::Underflow {
                stacklevel: level,
                nlocals: self.nlocals,
            });
        }
        Ok(Reg(level as u8))
    }

    fn top(&self) -> u16 {
        self.level
    }
}

/// Lowers every source block into its register-block counterpart, in block
/// order, sharing one [`Stack`] simulator across the whole pass.
pub fn lower_blocks(
    source_blocks: &[Block],
    source_catalog: &OpcodeCatalog,
    register_catalog: &OpcodeCatalog,
    nlocals: u16,
    stacksize: u16,
    observer: &dyn ConvertObserver,
) -> Result<Vec<Block>, LowerError> {
    let mut stack = Stack {
        level: nlocals,
        nlocals,
        max_stacklevel: nlocals + stacksize,
    };
    let mut register_blocks: Vec<Block> = source_blocks
        .iter()
        .map(|b| Block::new(Vm::Register, b.number))
        .collect();

    for source_block in source_blocks {
        let idx = source_block.number.0 as usize;
        for instr in &source_block.instructions {
            let Instruction::Source(src) = instr else {
                unreachable!("source blocks only ever hold SourceInstr")
            };
            let lowered = lower_one(
                src,
                source_catalog,
                register_catalog,
                &mut stack,
                &mut register_blocks,
                observer,
            )?;
            match lowered {
                Some(body) => register_blocks[idx].push(Instruction::Register(RegisterInstr {
                    line_number: src.line_number,
                    body,
                })),
                None => {
                    observer.unreachable_tail(source_block.number);
                    debug!(block = idx, "unreachable tail: stopped lowering this block");
                    break;
                }
            }
        }
    }
    Ok(register_blocks)
}

fn set_block_entry_stacklevel(blocks: &mut [Block], target: BlockId, level: u16, observer: &dyn ConvertObserver) {
    let block = &mut blocks[target.0 as usize];
    if let Some(previous) = block.entry_stack_level {
        if previous != level {
            observer.block_entry_stacklevel_conflict(target, previous, level);
            warn!(
                block = target.0,
                previous, level, "conflicting entry stack level, keeping the latest"
            );
        }
    }
    block.entry_stack_level = Some(level);
}

#[allow(clippy::too_many_lines)]
fn lower_one(
    src: &SourceInstr,
    source_catalog: &OpcodeCatalog,
    register_catalog: &OpcodeCatalog,
    stack: &mut Stack,
    register_blocks: &mut [Block],
    observer: &dyn ConvertObserver,
) -> Result<Option<RegisterBody>, LowerError> {
    let name = source_catalog.opname(src.op);
    let reg_op = |suffix: &str| -> Opcode {
        register_catalog
            .opcode(suffix)
            .unwrap_or_else(|| panic!("register catalog has no entry for {suffix}"))
    };

    let body = match name {
        "UNARY_INVERT" | "UNARY_POSITIVE" | "UNARY_NEGATIVE" | "UNARY_NOT" => {
            let op = reg_op(&format!("{name}_REG"));
            let source1 = stack.pop()?;
            let dest = stack.push()?;
            Some(RegisterBody::UnaryOpReg { op, dest, source1 })
        }

        "BINARY_POWER" | "BINARY_MULTIPLY" | "BINARY_MATRIX_MULTIPLY" | "BINARY_TRUE_DIVIDE"
        | "BINARY_FLOOR_DIVIDE" | "BINARY_MODULO" | "BINARY_ADD" | "BINARY_SUBTRACT"
        | "BINARY_LSHIFT" | "BINARY_RSHIFT" | "BINARY_AND" | "BINARY_XOR" | "BINARY_OR"
        | "BINARY_SUBSCR" | "INPLACE_POWER" | "INPLACE_MULTIPLY" | "INPLACE_MATRIX_MULTIPLY"
        | "INPLACE_TRUE_DIVIDE" | "INPLACE_FLOOR_DIVIDE" | "INPLACE_MODULO" | "INPLACE_ADD"
        | "INPLACE_SUBTRACT" | "INPLACE_LSHIFT" | "INPLACE_RSHIFT" | "INPLACE_AND"
        | "INPLACE_XOR" | "INPLACE_OR" => {
            let op = reg_op(&format!("{name}_REG"));
            let source2 = stack.pop()?;
            let source1 = stack.pop()?;
            let dest = stack.push()?;
            Some(RegisterBody::BinOpReg {
                op,
                dest,
                source1,
                source2,
            })
        }

        "COMPARE_OP" => {
            let compare_op = src.oparg().expect("non-jump instruction") as u8;
            let source2 = stack.pop()?;
            let source1 = stack.pop()?;
            let dest = stack.push()?;
            Some(RegisterBody::CompareOpReg {
                dest,
                source1,
                source2,
                compare_op,
            })
        }

        "LOAD_FAST" | "LOAD_CONST" | "LOAD_GLOBAL" => {
            let oparg = src.oparg().expect("non-jump instruction");
            match stack.push() {
                Ok(dest) => Some(match name {
                    "LOAD_FAST" => RegisterBody::LoadFastReg {
                        dest,
                        source1: Reg(oparg as u8),
                        protected: false,
                    },
                    "LOAD_CONST" => RegisterBody::LoadConstReg {
                        dest,
                        name1: oparg as u8,
                    },
                    _ => RegisterBody::LoadGlobalReg {
                        dest,
                        name1: oparg as u8,
                    },
                }),
                Err(_overflow) => None,
            }
        }

        "STORE_FAST" => {
            let oparg = src.oparg().expect("non-jump instruction");
            let source1 = stack.pop()?;
            Some(RegisterBody::StoreFastReg {
                dest: Reg(oparg as u8),
                source1,
            })
        }
        "STORE_GLOBAL" => {
            let oparg = src.oparg().expect("non-jump instruction");
            let source1 = stack.pop()?;
            Some(RegisterBody::StoreGlobalReg {
                name1: oparg as u8,
                source1,
            })
        }

        "BUILD_LIST" | "BUILD_TUPLE" | "BUILD_MAP" => {
            let op = reg_op(&format!("{name}_REG"));
            let n = src.oparg().expect("non-jump instruction");
            let eltlen = if name == "BUILD_MAP" { 2 } else { 1 };
            for _ in 0..(n * eltlen) {
                stack.pop()?;
            }
            let dest = stack.push()?;
            Some(RegisterBody::BuildSeqReg {
                op,
                dest,
                length: n as u8,
            })
        }
        "LIST_EXTEND" => {
            let n = src.oparg().expect("non-jump instruction");
            let source1 = stack.pop()?;
            let dest = stack.peek(n)?;
            Some(RegisterBody::ExtendSeqReg { dest, source1 })
        }

        "CALL_FUNCTION" => {
            let nargs = src.oparg().expect("non-jump instruction");
            let dest = Reg((stack.top() as i32 - nargs as i32 - 1) as u8);
            for _ in 0..nargs {
                stack.pop()?;
            }
            Some(RegisterBody::CallReg {
                dest,
                nargs: nargs as u8,
            })
        }
        "CALL_FUNCTION_KW" => {
            let nargs = src.oparg().expect("non-jump instruction");
            let nreg = Reg((stack.top() - 1) as u8);
            let dest = Reg((stack.top() as i32 - nargs as i32 - 2) as u8);
            for _ in 0..=nargs {
                stack.pop()?;
            }
            Some(RegisterBody::CallKwReg {
                dest,
                nreg,
                nargs: nargs as u8,
            })
        }

        "RETURN_VALUE" => {
            let source1 = stack.pop()?;
            Some(RegisterBody::ReturnReg { source1 })
        }
        "POP_JUMP_IF_FALSE" | "POP_JUMP_IF_TRUE" => {
            let target = jump_target(src);
            let suffix = &name[4..]; // drop "POP_"
            let op = reg_op(&format!("{suffix}_REG"));
            // Records the pre-pop `top()`, matching `jump_convert` in the
            // original, which records stacklevel before the pop that follows.
            // `entry_stack_level` is bookkeeping only (nothing reads it back),
            // so this has no behavioral effect either way.
            if let JumpTarget::Block(block) = target {
                set_block_entry_stacklevel(register_blocks, block, stack.top(), observer);
            }
            let source1 = stack.pop()?;
            Some(RegisterBody::JumpIfReg { op, target, source1 })
        }
        "JUMP_FORWARD" | "JUMP_ABSOLUTE" => {
            let target = jump_target(src);
            let op = reg_op(name);
            Some(RegisterBody::JumpAbsReg { op, target })
        }

        other => {
            let diagnostic = format!(
                "no register-VM dispatch entry for {other} (opcode {})",
                src.op.0
            );
            observer.unhandled_opcode(src.op, other);
            return Err(LowerError::UnhandledOpcode {
                opcode: src.op,
                name: other.to_string(),
                diagnostic,
            });
        }
    };
    Ok(body)
}

fn jump_target(src: &SourceInstr) -> JumpTarget {
    match &src.body {
        SourceBody::Jump { target } => *target,
        SourceBody::Raw { .. } => unreachable!("jump_target called on a non-jump instruction"),
    }
}
