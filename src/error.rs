//! Error types for every fallible stage of the converter.

use std::{error, fmt};

use crate::opcode::Opcode;

/// Errors raised while turning a flat wordcode byte string into basic blocks.
#[derive(Debug, Clone)]
pub enum LinearizeError {
    /// A jump instruction's target byte address did not land on any
    /// discovered block boundary.
    DanglingJumpTarget {
        /// Byte offset of the jump instruction itself.
        at: u32,
        /// The byte address the jump claims to target.
        target: u32,
    },
    /// `co_code` did not have an even length.
    OddLength(usize),
}

impl fmt::Display for LinearizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingJumpTarget { at, target } => write!(
                f,
                "jump at byte {at} targets byte {target}, which is not a block boundary"
            ),
            Self::OddLength(n) => write!(f, "code string has odd length {n}"),
        }
    }
}

impl error::Error for LinearizeError {}

/// Errors raised while lowering stack-VM blocks into register-VM blocks.
#[derive(Debug, Clone)]
pub enum LowerError {
    /// No dispatch entry exists for this source opcode.
    UnhandledOpcode {
        opcode: Opcode,
        name: String,
        diagnostic: String,
    },
    /// The stack/register-file simulator bound was violated somewhere other
    /// than inside a `LOAD_*` conversion's unreachable-tail recovery path.
    StackSizeOverflow(StackSizeOverflow),
}

/// Raised by the operand-stack simulator when `push`/`pop`/`peek` would
/// breach `[nlocals, max_stacklevel)`. Recoverable only from inside a
/// `LOAD_*` dispatch (see `spec.md` §4.E, §7).
#[derive(Debug, Clone, Copy)]
pub enum StackSizeOverflow {
    /// `push()` would exceed `max_stacklevel`.
    Overflow { stacklevel: u16, max_stacklevel: u16 },
    /// `pop()`/`peek()` would read below `nlocals`.
    Underflow { stacklevel: i32, nlocals: u16 },
}

impl fmt::Display for StackSizeOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow {
                stacklevel,
                max_stacklevel,
            } => write!(
                f,
                "overran the allocated stack/register space: {stacklevel} > {max_stacklevel}"
            ),
            Self::Underflow { stacklevel, nlocals } => write!(
                f,
                "stack slammed into locals: {stacklevel} < {nlocals}"
            ),
        }
    }
}

impl error::Error for StackSizeOverflow {}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnhandledOpcode { name, opcode, .. } => {
                write!(f, "unhandled source opcode {name} ({})", opcode.0)
            }
            Self::StackSizeOverflow(err) => err.fmt(f),
        }
    }
}

impl error::Error for LowerError {}

impl From<StackSizeOverflow> for LowerError {
    fn from(err: StackSizeOverflow) -> Self {
        Self::StackSizeOverflow(err)
    }
}

/// Top-level error union returned by `Converter::convert`.
#[derive(Debug, Clone)]
pub enum ConvertError {
    /// `nlocals + stacksize` does not fit in the register file.
    RegisterFileTooLarge { nlocals: u16, stacksize: u16 },
    Linearize(LinearizeError),
    Lower(LowerError),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegisterFileTooLarge { nlocals, stacksize } => write!(
                f,
                "locals ({nlocals}) + stack ({stacksize}) exceed the 128-register file"
            ),
            Self::Linearize(err) => err.fmt(f),
            Self::Lower(err) => err.fmt(f),
        }
    }
}

impl error::Error for ConvertError {}

impl From<LinearizeError> for ConvertError {
    fn from(err: LinearizeError) -> Self {
        Self::Linearize(err)
    }
}

impl From<LowerError> for ConvertError {
    fn from(err: LowerError) -> Self {
        Self::Lower(err)
    }
}
