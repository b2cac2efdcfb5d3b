//! Concrete opcode tables standing in for "the host runtime's opcode set".
//!
//! `spec.md` treats the opcode catalog as a collaborator the converter is
//! handed, not something it defines. These two constructors give this
//! crate's own tests and doctests something real to hand it, modeled on the
//! CPython 3.8 wordcode mnemonics `rattlesnake` targets
//! (`examples/original_source/Lib/rattlesnake/converter.py`).

use crate::opcode::{Opcode, OpcodeCatalog};

const STACK_VM_NAMES: &[(&str, u8)] = &[
    ("UNARY_INVERT", 1),
    ("UNARY_POSITIVE", 2),
    ("UNARY_NEGATIVE", 3),
    ("UNARY_NOT", 4),
    ("BINARY_POWER", 5),
    ("BINARY_MULTIPLY", 6),
    ("BINARY_MATRIX_MULTIPLY", 7),
    ("BINARY_TRUE_DIVIDE", 8),
    ("BINARY_FLOOR_DIVIDE", 9),
    ("BINARY_MODULO", 10),
    ("BINARY_ADD", 11),
    ("BINARY_SUBTRACT", 12),
    ("BINARY_LSHIFT", 13),
    ("BINARY_RSHIFT", 14),
    ("BINARY_AND", 15),
    ("BINARY_XOR", 16),
    ("BINARY_OR", 17),
    ("BINARY_SUBSCR", 18),
    ("INPLACE_POWER", 19),
    ("INPLACE_MULTIPLY", 20),
    ("INPLACE_MATRIX_MULTIPLY", 21),
    ("INPLACE_TRUE_DIVIDE", 22),
    ("INPLACE_FLOOR_DIVIDE", 23),
    ("INPLACE_MODULO", 24),
    ("INPLACE_ADD", 25),
    ("INPLACE_SUBTRACT", 26),
    ("INPLACE_LSHIFT", 27),
    ("INPLACE_RSHIFT", 28),
    ("INPLACE_AND", 29),
    ("INPLACE_XOR", 30),
    ("INPLACE_OR", 31),
    ("COMPARE_OP", 32),
    ("LOAD_FAST", 33),
    ("LOAD_CONST", 34),
    ("LOAD_GLOBAL", 35),
    ("STORE_FAST", 36),
    ("STORE_GLOBAL", 37),
    ("BUILD_LIST", 38),
    ("BUILD_TUPLE", 39),
    ("BUILD_MAP", 40),
    ("LIST_EXTEND", 41),
    ("CALL_FUNCTION", 42),
    ("CALL_FUNCTION_KW", 43),
    ("POP_JUMP_IF_FALSE", 44),
    ("POP_JUMP_IF_TRUE", 45),
    ("JUMP_FORWARD", 46),
    ("JUMP_ABSOLUTE", 47),
    ("RETURN_VALUE", 48),
    ("NOP", 49),
    // Present in the catalog (a real stack-VM opcode) but deliberately
    // undispatched, standing in for the families `converter.py` leaves
    // commented out (`POP_TOP`, `ROT_*`, `IMPORT_NAME`, `UNPACK_SEQUENCE`,
    // `PRINT_EXPR`, attribute/subscript access): lowering such an opcode
    // must hit `LowerError::UnhandledOpcode`, not panic on an unknown name.
    ("POP_TOP", 50),
    ("EXTENDED_ARG", 144),
];

const STACK_VM_REL_JUMPS: &[u8] = &[46]; // JUMP_FORWARD
const STACK_VM_ABS_JUMPS: &[u8] = &[44, 45, 47]; // POP_JUMP_IF_{FALSE,TRUE}, JUMP_ABSOLUTE
const STACK_VM_EXTENDED_ARG: u8 = 144;
const STACK_VM_NOP: u8 = 49;

/// The stack-VM opcode set this crate's tests and fixtures target.
#[must_use]
pub fn stack_vm_catalog() -> OpcodeCatalog {
    OpcodeCatalog::new(
        STACK_VM_NAMES,
        STACK_VM_REL_JUMPS,
        STACK_VM_ABS_JUMPS,
        STACK_VM_EXTENDED_ARG,
        STACK_VM_NOP,
    )
}

/// Derives the register-VM catalog from the stack-VM one by the `_REG`
/// mnemonic convention (`spec.md` §4.E), except `JUMP_FORWARD` and
/// `JUMP_ABSOLUTE`, which keep their stack-VM opcode number and name
/// unchanged: they already address a block directly once lowered and gain
/// nothing from renaming. `POP_JUMP_IF_FALSE`/`POP_JUMP_IF_TRUE` drop their
/// `POP_` prefix before the suffix is added (`f"{opname}_REG"[4:]` in
/// `converter.py::jump_convert`), since the register form pops nothing
/// explicitly: the operand is already named.
#[must_use]
pub fn register_vm_catalog(source: &OpcodeCatalog) -> OpcodeCatalog {
    let mut names: Vec<(&'static str, u8)> = Vec::with_capacity(STACK_VM_NAMES.len());
    for &(name, op) in STACK_VM_NAMES {
        if name == "JUMP_FORWARD" || name == "JUMP_ABSOLUTE" || name == "EXTENDED_ARG" || name == "NOP" {
            names.push((name, op));
            continue;
        }
        if name == "POP_JUMP_IF_FALSE" {
            names.push(("JUMP_IF_FALSE_REG", op));
            continue;
        }
        if name == "POP_JUMP_IF_TRUE" {
            names.push(("JUMP_IF_TRUE_REG", op));
            continue;
        }
        names.push((reg_name(name), op));
    }
    debug_assert!(source.opname(Opcode(32)) == "COMPARE_OP");
    OpcodeCatalog::new(
        &names,
        STACK_VM_REL_JUMPS,
        STACK_VM_ABS_JUMPS,
        STACK_VM_EXTENDED_ARG,
        STACK_VM_NOP,
    )
}

fn reg_name(name: &'static str) -> &'static str {
    // Leaked once per distinct mnemonic at catalog-construction time; the
    // catalog itself is built once and kept for a process's lifetime, so
    // this isn't a growing leak in practice.
    Box::leak(format!("{name}_REG").into_boxed_str())
}
