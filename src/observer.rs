//! Injectable diagnostics, replacing the original's process-global per-opcode
//! counters and its `display_blocks` debug dump
//! (`examples/original_source/Lib/rattlesnake/converter.py::display_blocks`).

use crate::block::Block;
use crate::instruction::BlockId;
use crate::opcode::Opcode;

/// Sink for converter diagnostics a host can attach to watch a conversion
/// without the converter itself touching global state or stdout.
///
/// Every method has a no-op default so callers only override what they care
/// about, the same role `tracing`'s subscriber layering plays for the
/// `tracing::debug!`/`tracing::warn!` events the converter also emits
/// alongside these calls.
pub trait ConvertObserver {
    /// A target block's recorded entry stack level was overwritten by a
    /// second, differing jump into it (`spec.md` §9 open question 1:
    /// resolved as last-writer-wins).
    fn block_entry_stacklevel_conflict(&self, _block: BlockId, _previous: u16, _new: u16) {}

    /// Lowering hit a source opcode with no dispatch entry.
    fn unhandled_opcode(&self, _opcode: Opcode, _name: &str) {}

    /// `push()` overflowed inside a `LOAD_*` conversion; the rest of this
    /// block's instructions are unreachable and won't be lowered (see
    /// `Converter::push`'s doc comment for why this is expected).
    fn unreachable_tail(&self, _block: BlockId) {}

    /// Full block dump, equivalent to `display_blocks`. Default no-op; a
    /// host wanting the old text dump can implement this with `eprintln!`.
    fn dump_blocks(&self, _varnames: &[&str], _names: &[&str], _blocks: &[Block]) {}
}

/// An observer that does nothing. The converter's default when the caller
/// doesn't attach one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ConvertObserver for NullObserver {}

/// Which peephole passes run, and whether diagnostics are attached.
/// Standing in for the config layer `spec.md`'s ambient-concerns table
/// calls for; the converter takes no file, network, or environment input, so
/// this is a plain struct built by the caller, the way `BitStreamReader` is
/// constructed directly rather than loaded from a config file.
#[derive(Debug, Clone, Copy)]
pub struct ConvertOptions {
    /// Also runs the protected-load pre-pass; the two are not independently
    /// useful, so there's no separate toggle for it.
    pub forward_load_propagation: bool,
    pub backward_store_propagation: bool,
    pub delete_nops: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            forward_load_propagation: true,
            backward_store_propagation: true,
            delete_nops: true,
        }
    }
}
