//! Top-level entry point: wires the linearizer, lowering pass, peephole
//! passes, and emitter together into one `convert` call.
//!
//! Grounded in `examples/original_source/Lib/rattlesnake/converter.py`'s
//! `InstructionSetConverter.__init__`/`gen_rvm` (the `max_stacklevel <= 127`
//! assertion becomes [`ConvertError::RegisterFileTooLarge`] here instead of
//! panicking).

use tracing::{debug, info, instrument};

use crate::block::reflow;
use crate::code_unit::{CodeUnit, ConvertedCode};
use crate::emit::{build_lnotab, serialize};
use crate::error::ConvertError;
use crate::linearize::linearize;
use crate::lower::lower_blocks;
use crate::observer::{ConvertObserver, ConvertOptions, NullObserver};
use crate::opcode::OpcodeCatalog;
use crate::peephole::{backward_propagate_fast_stores, delete_nops, forward_propagate_fast_loads};

/// The register file has 128 slots; `nlocals + stacksize` must leave room
/// for at least one stack slot's worth of headroom below that, matching the
/// original's `max_stacklevel <= 127` assertion.
const MAX_STACKLEVEL: u16 = 127;

/// Converts one stack-VM code unit into register-VM wordcode. Stateless
/// across calls: build one per code unit, or reuse across many since it
/// only borrows its catalogs and observer.
pub struct Converter<'a> {
    source_catalog: &'a OpcodeCatalog,
    register_catalog: &'a OpcodeCatalog,
    options: ConvertOptions,
    observer: &'a dyn ConvertObserver,
}

impl<'a> Converter<'a> {
    #[must_use]
    pub fn new(source_catalog: &'a OpcodeCatalog, register_catalog: &'a OpcodeCatalog) -> Self {
        Self {
            source_catalog,
            register_catalog,
            options: ConvertOptions::default(),
            observer: &NullObserver,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn ConvertObserver) -> Self {
        self.observer = observer;
        self
    }

    #[instrument(skip_all, fields(nlocals = code_unit.nlocals, stacksize = code_unit.stacksize))]
    pub fn convert(&self, code_unit: &CodeUnit<'_>) -> Result<ConvertedCode, ConvertError> {
        let max_stacklevel = code_unit.nlocals + code_unit.stacksize;
        if max_stacklevel > MAX_STACKLEVEL {
            return Err(ConvertError::RegisterFileTooLarge {
                nlocals: code_unit.nlocals,
                stacksize: code_unit.stacksize,
            });
        }

        let source_blocks = linearize(code_unit, self.source_catalog)?;
        debug!(blocks = source_blocks.len(), "linearized source blocks");

        let mut register_blocks = lower_blocks(
            &source_blocks,
            self.source_catalog,
            self.register_catalog,
            code_unit.nlocals,
            code_unit.stacksize,
            self.observer,
        )?;
        reflow(&mut register_blocks, 0);

        if self.options.forward_load_propagation {
            forward_propagate_fast_loads(&mut register_blocks);
        }
        if self.options.backward_store_propagation {
            backward_propagate_fast_stores(&mut register_blocks);
        }
        if self.options.delete_nops {
            delete_nops(&mut register_blocks);
        }

        let wordcode = serialize(&register_blocks, self.register_catalog);
        let lnotab = build_lnotab(&register_blocks, code_unit.first_line_number);
        info!(bytes = wordcode.len(), "conversion complete");
        Ok(ConvertedCode { wordcode, lnotab })
    }
}
