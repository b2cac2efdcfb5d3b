//! Converts stack-based VM bytecode into an equivalent register-based VM's
//! wordcode, one code unit at a time.
//!
//! The converter borrows a [`CodeUnit`] (flat wordcode plus the handful of
//! integers needed to size a register file) and an [`OpcodeCatalog`] for
//! each of the source and target opcode sets, and returns the converted
//! wordcode plus its line-number table. It does not disassemble, execute,
//! allocate registers beyond trivial stack-slot assignment, or do type
//! inference/constant folding/dead-store elimination beyond the two
//! peephole passes it implements, those stay the host runtime's job.
//!
//! Pipeline, per [`Converter::convert`] call:
//!
//! 1. [`linearize::linearize`]: flat wordcode to basic blocks, resolving
//!    jump targets.
//! 2. [`lower::lower_blocks`]: simulate the operand stack as a window onto
//!    the register file, emitting one register instruction per source
//!    instruction (or none, for code a `LOAD_*`'s unreachable-tail recovery
//!    silently drops).
//! 3. [`peephole::forward_propagate_fast_loads`] /
//!    [`peephole::backward_propagate_fast_stores`] /
//!    [`peephole::delete_nops`]: elide registers that only ever move a
//!    value, never compute with it.
//! 4. [`emit::serialize`] / [`emit::build_lnotab`]: back to bytes.

pub mod block;
pub mod catalog;
pub mod code_unit;
pub mod convert;
pub mod emit;
pub mod error;
pub mod instruction;
pub mod linearize;
pub mod lower;
pub mod observer;
pub mod opcode;
pub mod peephole;

pub use catalog::{register_vm_catalog, stack_vm_catalog};
pub use code_unit::{CodeUnit, ConvertedCode};
pub use convert::Converter;
pub use error::{ConvertError, LinearizeError, LowerError, StackSizeOverflow};
pub use observer::{ConvertObserver, ConvertOptions, NullObserver};
pub use opcode::{Opcode, OpcodeCatalog, Reg};
