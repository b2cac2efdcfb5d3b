//! The converter's only input type: a single compiled code unit.
//!
//! Mirrors the fields `OptimizeFilter.__init__` pulls off a CPython code
//! object (`co_code`, `co_varnames`, `co_names`, `co_consts`, `co_nlocals`,
//! `co_stacksize`, `co_firstlineno`) in
//! `examples/original_source/Lib/rattlesnake/converter.py`. Everything here
//! is borrowed, read-only input; the converter never mutates a `CodeUnit`.

/// A single function/module body's stack-VM bytecode plus the metadata the
/// converter needs to interpret it. Construction (disassembly, constant pool
/// layout, etc.) is the host runtime's job.
#[derive(Debug, Clone, Copy)]
pub struct CodeUnit<'a> {
    /// Flat wordcode: `(opcode, oparg)` byte pairs.
    pub code: &'a [u8],
    /// Number of local variable slots. These occupy register indices
    /// `[0, nlocals)` in the register file.
    pub nlocals: u16,
    /// Maximum stack-VM operand-stack depth the source VM computed for this
    /// unit. Register indices `[nlocals, nlocals + stacksize)` are reserved
    /// for operand-stack values.
    pub stacksize: u16,
    /// Line number of the first instruction, used as the line-table's
    /// baseline (`spec.md` §7).
    pub first_line_number: u32,
    /// Decoded line-number table: one entry per `co_code` byte offset that
    /// starts a new source line, in ascending offset order.
    pub line_starts: &'a [(u32, u32)],
}

impl<'a> CodeUnit<'a> {
    #[must_use]
    pub fn new(
        code: &'a [u8],
        nlocals: u16,
        stacksize: u16,
        first_line_number: u32,
        line_starts: &'a [(u32, u32)],
    ) -> Self {
        Self {
            code,
            nlocals,
            stacksize,
            first_line_number,
            line_starts,
        }
    }
}

/// Output of a successful conversion: the register-VM wordcode plus its
/// line-number table, ready for the host runtime to attach to a new code
/// object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedCode {
    pub wordcode: Vec<u8>,
    pub lnotab: Vec<u8>,
}
