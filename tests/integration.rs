//! End-to-end scenarios exercising `Converter::convert` against the
//! `stack_vm_catalog()`/`register_vm_catalog()` fixtures.
//!
//! Expected wordcode below accounts for every register-VM instruction with
//! more than one oparg field getting an `EXTENDED_ARG` prefix per field but
//! the last, including jump instructions' resolved target byte (`target`
//! comes first in `JumpIfReg`'s oparg tuple, `source1` last).

use stackreg_convert::catalog::{register_vm_catalog, stack_vm_catalog};
use stackreg_convert::code_unit::CodeUnit;
use stackreg_convert::convert::Converter;
use stackreg_convert::error::ConvertError;
use stackreg_convert::observer::ConvertOptions;
use stackreg_convert::opcode::OpcodeCatalog;

fn op(cat: &OpcodeCatalog, name: &str) -> u8 {
    cat.opcode(name).unwrap().0
}

/// S1: trivial return: `LOAD_CONST 0; RETURN_VALUE` with no locals lowers
/// to the two-instruction register form; nothing is available to propagate
/// into, so both instructions survive untouched.
#[test]
fn s1_trivial_return() {
    let src = stack_vm_catalog();
    let reg = register_vm_catalog(&src);
    let code = [op(&src, "LOAD_CONST"), 0, op(&src, "RETURN_VALUE"), 0];
    let unit = CodeUnit::new(&code, 0, 1, 1, &[]);
    let converter = Converter::new(&src, &reg);
    let out = converter.convert(&unit).unwrap();

    let ext = reg.extended_arg().0;
    let load_const_reg = op(&reg, "LOAD_CONST_REG");
    let return_reg = op(&reg, "RETURN_VALUE_REG");
    // LOAD_CONST_REG dest=0 name1=0 (2 opargs: EXTENDED_ARG prefix then primary).
    // RETURN_VALUE_REG source1=0 (1 oparg: no prefix needed).
    assert_eq!(out.wordcode, vec![ext, 0, load_const_reg, 0, return_reg, 0]);
}

/// S2: add two locals: both loads are unprotected and propagate away,
/// leaving only the add (reading the locals directly) and the return.
#[test]
fn s2_add_two_locals_propagates_both_loads() {
    let src = stack_vm_catalog();
    let reg = register_vm_catalog(&src);
    let code = [
        op(&src, "LOAD_FAST"),
        0,
        op(&src, "LOAD_FAST"),
        1,
        op(&src, "BINARY_ADD"),
        0,
        op(&src, "RETURN_VALUE"),
        0,
    ];
    let unit = CodeUnit::new(&code, 2, 2, 1, &[]);
    let converter = Converter::new(&src, &reg);
    let out = converter.convert(&unit).unwrap();

    let ext = reg.extended_arg().0;
    let add_reg = op(&reg, "BINARY_ADD_REG");
    let return_reg = op(&reg, "RETURN_VALUE_REG");
    // BINARY_ADD_REG dest=r2 source1=r0 source2=r1 (3 opargs: two EXTENDED_ARG
    // prefixes then the primary); RETURN_VALUE_REG source1=r2.
    assert_eq!(
        out.wordcode,
        vec![ext, 2, ext, 0, add_reg, 1, return_reg, 2]
    );
}

/// S3: protected build: all three loads feed `BUILD_LIST_REG`'s contiguous
/// input range and must survive forward propagation.
#[test]
fn s3_protected_build_keeps_all_loads() {
    let src = stack_vm_catalog();
    let reg = register_vm_catalog(&src);
    let code = [
        op(&src, "LOAD_CONST"),
        0,
        op(&src, "LOAD_FAST"),
        0,
        op(&src, "LOAD_FAST"),
        1,
        op(&src, "BUILD_LIST"),
        3,
        op(&src, "RETURN_VALUE"),
        0,
    ];
    let unit = CodeUnit::new(&code, 2, 3, 1, &[]);
    let converter = Converter::new(&src, &reg);
    let out = converter.convert(&unit).unwrap();

    let ext = reg.extended_arg().0;
    let load_const_reg = op(&reg, "LOAD_CONST_REG");
    let load_fast_reg = op(&reg, "LOAD_FAST_REG");
    let build_list_reg = op(&reg, "BUILD_LIST_REG");
    let return_reg = op(&reg, "RETURN_VALUE_REG");
    assert_eq!(
        out.wordcode,
        vec![
            ext, 2, load_const_reg, 0, // dest=r2 name1=0
            ext, 3, load_fast_reg, 0, // dest=r3 source1=r0
            ext, 4, load_fast_reg, 1, // dest=r4 source1=r1
            ext, 2, build_list_reg, 3, // dest=r2 length=3
            return_reg, 2,
        ]
    );
}

/// S4: conditional: two blocks emitted (the linearizer only splits at
/// discovered jump targets, so the fallthrough `LOAD_CONST 0` stays in the
/// first block alongside the branch); the branch's own `LOAD_FAST` load
/// propagates away, and the branch references the propagated register.
#[test]
fn s4_conditional_lowers_both_arms() {
    let src = stack_vm_catalog();
    let reg = register_vm_catalog(&src);
    // 0: LOAD_FAST 0
    // 2: POP_JUMP_IF_FALSE -> 6
    // 4: LOAD_CONST 0
    // 6: RETURN_VALUE          <- block boundary (jump target)
    // 8: LOAD_CONST 1
    // 10: RETURN_VALUE
    let code = [
        op(&src, "LOAD_FAST"),
        0,
        op(&src, "POP_JUMP_IF_FALSE"),
        6,
        op(&src, "LOAD_CONST"),
        0,
        op(&src, "RETURN_VALUE"),
        0,
        op(&src, "LOAD_CONST"),
        1,
        op(&src, "RETURN_VALUE"),
        0,
    ];
    let unit = CodeUnit::new(&code, 1, 1, 1, &[]);
    let converter = Converter::new(&src, &reg);
    let out = converter.convert(&unit).unwrap();

    let ext = reg.extended_arg().0;
    let jump_if_false_reg = op(&reg, "JUMP_IF_FALSE_REG");
    let load_const_reg = op(&reg, "LOAD_CONST_REG");
    let return_reg = op(&reg, "RETURN_VALUE_REG");
    assert_eq!(
        out.wordcode,
        vec![
            ext, 8, jump_if_false_reg, 0, // target=block1 @8, source1=r0 (propagated)
            ext, 1, load_const_reg, 0, // dest=r1 name1=0
            return_reg, 1,
            ext, 1, load_const_reg, 1, // dest=r1 name1=1
            return_reg, 1,
        ]
    );
}

/// S5: jump target patched after peephole shrink: eliding the branch's own
/// `LOAD_FAST` drops block 0 from 10 bytes to 8, so the emitted target must
/// be block 1's post-deletion address (8), not its pre-deletion one (10).
#[test]
fn s5_jump_target_reflects_post_reflow_address() {
    let src = stack_vm_catalog();
    let reg = register_vm_catalog(&src);
    let code = [
        op(&src, "LOAD_FAST"),
        0,
        op(&src, "POP_JUMP_IF_FALSE"),
        6,
        op(&src, "LOAD_CONST"),
        0,
        op(&src, "RETURN_VALUE"),
        0,
        op(&src, "LOAD_CONST"),
        1,
        op(&src, "RETURN_VALUE"),
        0,
    ];
    let unit = CodeUnit::new(&code, 1, 1, 1, &[]);
    let converter = Converter::new(&src, &reg);
    let out = converter.convert(&unit).unwrap();

    let ext = reg.extended_arg().0;
    assert_eq!(out.wordcode[0], ext);
    assert_eq!(out.wordcode[1], 8, "branch target is the post-reflow address of block 1, not its pre-deletion one (10)");
}

/// S6: unreachable tail: a `RETURN_VALUE` followed by more `LOAD_FAST`s
/// that overflow the register file; lowering stops at the overflow but
/// conversion still succeeds, dropping the dead tail.
#[test]
fn s6_unreachable_tail_is_dropped_without_error() {
    let src = stack_vm_catalog();
    let reg = register_vm_catalog(&src);
    let code = [
        op(&src, "LOAD_FAST"),
        0,
        op(&src, "RETURN_VALUE"),
        0,
        op(&src, "LOAD_FAST"),
        0,
        op(&src, "LOAD_FAST"),
        0,
    ];
    // nlocals=1, stacksize=1: the first LOAD_FAST/RETURN_VALUE round-trips
    // fine, but the dead tail's second LOAD_FAST overflows max_stacklevel (2).
    let unit = CodeUnit::new(&code, 1, 1, 1, &[]);
    let converter = Converter::new(&src, &reg);
    let out = converter.convert(&unit).unwrap();
    assert!(!out.wordcode.is_empty());
}

/// Invariant: `nlocals + stacksize` exceeding the 128-register file is
/// rejected before any linearization happens.
#[test]
fn register_file_overflow_is_rejected_up_front() {
    let src = stack_vm_catalog();
    let reg = register_vm_catalog(&src);
    let code: [u8; 0] = [];
    let unit = CodeUnit::new(&code, 100, 50, 1, &[]);
    let converter = Converter::new(&src, &reg);
    let err = converter.convert(&unit).unwrap_err();
    assert!(matches!(err, ConvertError::RegisterFileTooLarge { .. }));
}

/// Invariant: a dangling jump target (one that doesn't land on any
/// discovered block boundary) is a `LinearizeError`, not a panic.
#[test]
fn dangling_jump_is_reported_not_panicked() {
    let src = stack_vm_catalog();
    let reg = register_vm_catalog(&src);
    let code = [op(&src, "JUMP_ABSOLUTE"), 3];
    let unit = CodeUnit::new(&code, 0, 0, 1, &[]);
    let converter = Converter::new(&src, &reg);
    let err = converter.convert(&unit).unwrap_err();
    assert!(matches!(err, ConvertError::Linearize(_)));
}

/// Invariant: an opcode with no dispatch entry is a `LowerError`, surfaced
/// through `ConvertError::Lower`.
#[test]
fn unhandled_opcode_surfaces_as_lower_error() {
    let src = stack_vm_catalog();
    let reg = register_vm_catalog(&src);
    let code = [op(&src, "POP_TOP"), 0];
    let unit = CodeUnit::new(&code, 0, 1, 1, &[]);
    let converter = Converter::new(&src, &reg);
    let err = converter.convert(&unit).unwrap_err();
    assert!(matches!(err, ConvertError::Lower(_)));
}

/// With every peephole pass disabled, S2's two loads survive untouched.
#[test]
fn disabling_propagation_keeps_loads_intact() {
    let src = stack_vm_catalog();
    let reg = register_vm_catalog(&src);
    let code = [
        op(&src, "LOAD_FAST"),
        0,
        op(&src, "LOAD_FAST"),
        1,
        op(&src, "BINARY_ADD"),
        0,
        op(&src, "RETURN_VALUE"),
        0,
    ];
    let unit = CodeUnit::new(&code, 2, 2, 1, &[]);
    let converter = Converter::new(&src, &reg).with_options(ConvertOptions {
        forward_load_propagation: false,
        backward_store_propagation: false,
        delete_nops: false,
    });
    let out = converter.convert(&unit).unwrap();
    let ext = reg.extended_arg().0;
    let load_fast_reg = op(&reg, "LOAD_FAST_REG");
    // Both LOAD_FAST_REGs survive as the first two instructions.
    assert_eq!(&out.wordcode[0..4], [ext, 2, load_fast_reg, 0]);
    assert_eq!(&out.wordcode[4..8], [ext, 3, load_fast_reg, 1]);
}

/// `lnotab` only records strictly-increasing line numbers, and address
/// deltas reflect the real encoded length of the preceding instructions.
#[test]
fn lnotab_tracks_line_increases_across_a_real_conversion() {
    let src = stack_vm_catalog();
    let reg = register_vm_catalog(&src);
    let code = [op(&src, "LOAD_CONST"), 0, op(&src, "RETURN_VALUE"), 0];
    let unit = CodeUnit::new(&code, 0, 1, 1, &[(0, 1), (2, 3)]);
    let converter = Converter::new(&src, &reg);
    let out = converter.convert(&unit).unwrap();
    // LOAD_CONST_REG (line 1) is 4 bytes; RETURN_VALUE_REG (line 3) follows.
    assert_eq!(out.lnotab, vec![4, 2]);
}
