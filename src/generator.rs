//! # Code Word Generator
//!
//! Low-level emitters for the 32-bit opcode words consumed by the engine's
//! script interpreter. Everything the code generator and the extensions
//! registry write into a code vector goes through this module.
//!
//! ## Word Format
//!
//! ```text
//! segment 0:  00oooooo aaaaaaaa aaaaaaaa aaaaaaaa   6-bit op, 24-bit immediate
//! segment 3:  01oooooo oooooooo aaaaaaaa aaaaaaaa   14-bit op, 16-bit immediate
//! segment 5:  10oooooo oooooooo oooooooo oooooooo   30-bit op, no immediate
//! ```
//!
//! Segment 0 carries literal-pool indices and jump offsets, segment 3 the
//! registry-assigned builtin opcodes (immediate = filled optional-argument
//! count), segment 5 the fixed zero-operand operations.
//!
//! Jump offsets are signed (24-bit two's complement) and relative to the
//! jump word itself: `new_pc = jump_pc + offset`. Values are typed by tag
//! characters `'l'` (integer) and `'f'` (float); shorts are widened to
//! longs before emission.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::literals::Literals;

/// Failure while emitting code (bad type tag, immediate overflow)
#[derive(Debug, Clone, PartialEq)]
pub struct EmitError {
    pub message: String,
}

impl EmitError {
    fn new(message: String) -> Self {
        EmitError { message }
    }
}

impl core::fmt::Display for EmitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}

// --- segment 0 opcodes ---
const OP_PUSH_INT: u32 = 0x01;
const OP_PUSH_FLOAT: u32 = 0x02;
const OP_PUSH_STRING: u32 = 0x03;
const OP_JUMP: u32 = 0x04;
const OP_JUMP_ZERO: u32 = 0x05;
const OP_MESSAGE_BOX: u32 = 0x06;
const OP_FETCH_LOCAL_SHORT: u32 = 0x10;
const OP_FETCH_LOCAL_LONG: u32 = 0x11;
const OP_FETCH_LOCAL_FLOAT: u32 = 0x12;

// --- segment 5 opcodes ---
const OP_STORE_LOCAL_SHORT: u32 = 0x01;
const OP_STORE_LOCAL_LONG: u32 = 0x02;
const OP_STORE_LOCAL_FLOAT: u32 = 0x03;
const OP_FETCH_GLOBAL_SHORT: u32 = 0x04;
const OP_FETCH_GLOBAL_LONG: u32 = 0x05;
const OP_FETCH_GLOBAL_FLOAT: u32 = 0x06;
const OP_STORE_GLOBAL_SHORT: u32 = 0x07;
const OP_STORE_GLOBAL_LONG: u32 = 0x08;
const OP_STORE_GLOBAL_FLOAT: u32 = 0x09;
const OP_FETCH_MEMBER_SHORT: u32 = 0x0A;
const OP_FETCH_MEMBER_LONG: u32 = 0x0B;
const OP_FETCH_MEMBER_FLOAT: u32 = 0x0C;
const OP_FETCH_MEMBER_GLOBAL_SHORT: u32 = 0x0D;
const OP_FETCH_MEMBER_GLOBAL_LONG: u32 = 0x0E;
const OP_FETCH_MEMBER_GLOBAL_FLOAT: u32 = 0x0F;
const OP_STORE_MEMBER_SHORT: u32 = 0x10;
const OP_STORE_MEMBER_LONG: u32 = 0x11;
const OP_STORE_MEMBER_FLOAT: u32 = 0x12;
const OP_STORE_MEMBER_GLOBAL_SHORT: u32 = 0x13;
const OP_STORE_MEMBER_GLOBAL_LONG: u32 = 0x14;
const OP_STORE_MEMBER_GLOBAL_FLOAT: u32 = 0x15;
const OP_INT_TO_FLOAT: u32 = 0x16;
const OP_FLOAT_TO_INT: u32 = 0x17;
const OP_INT_TO_FLOAT_1: u32 = 0x18;
const OP_FLOAT_TO_INT_1: u32 = 0x19;
const OP_ADD_INT: u32 = 0x1A;
const OP_ADD_FLOAT: u32 = 0x1B;
const OP_SUB_INT: u32 = 0x1C;
const OP_SUB_FLOAT: u32 = 0x1D;
const OP_MUL_INT: u32 = 0x1E;
const OP_MUL_FLOAT: u32 = 0x1F;
const OP_DIV_INT: u32 = 0x20;
const OP_DIV_FLOAT: u32 = 0x21;
const OP_NEGATE_INT: u32 = 0x22;
const OP_NEGATE_FLOAT: u32 = 0x23;
const OP_EQ_INT: u32 = 0x24;
const OP_NEQ_INT: u32 = 0x25;
const OP_LT_INT: u32 = 0x26;
const OP_LTE_INT: u32 = 0x27;
const OP_GT_INT: u32 = 0x28;
const OP_GTE_INT: u32 = 0x29;
const OP_EQ_FLOAT: u32 = 0x2A;
const OP_NEQ_FLOAT: u32 = 0x2B;
const OP_LT_FLOAT: u32 = 0x2C;
const OP_LTE_FLOAT: u32 = 0x2D;
const OP_GT_FLOAT: u32 = 0x2E;
const OP_GTE_FLOAT: u32 = 0x2F;
const OP_RETURN: u32 = 0x30;
const OP_REPORT: u32 = 0x31;
const OP_MENU_MODE: u32 = 0x32;
const OP_RANDOM: u32 = 0x33;
const OP_SCRIPT_RUNNING: u32 = 0x34;
const OP_STOP_SCRIPT: u32 = 0x35;
const OP_GET_SECONDS_PASSED: u32 = 0x36;
const OP_GET_SQUARE_ROOT: u32 = 0x37;
const OP_START_SCRIPT: u32 = 0x38;
const OP_START_SCRIPT_EXPLICIT: u32 = 0x39;
const OP_GET_DISTANCE: u32 = 0x3A;
const OP_GET_DISTANCE_EXPLICIT: u32 = 0x3B;
const OP_GET_DISABLED: u32 = 0x3C;
const OP_GET_DISABLED_EXPLICIT: u32 = 0x3D;
const OP_ENABLE: u32 = 0x3E;
const OP_ENABLE_EXPLICIT: u32 = 0x3F;
const OP_DISABLE: u32 = 0x40;
const OP_DISABLE_EXPLICIT: u32 = 0x41;

const ARG24_MAX: u32 = 0x00FF_FFFF;
const ARG16_MAX: u32 = 0x0000_FFFF;

/// Encode a segment-0 word (6-bit op, 24-bit immediate)
pub fn seg0(op: u32, arg: u32) -> u32 {
    debug_assert!(op <= 0x3F);
    debug_assert!(arg <= ARG24_MAX);
    (op << 24) | (arg & ARG24_MAX)
}

/// Encode a segment-3 word (14-bit op, 16-bit immediate)
pub fn seg3(op: u32, arg: u32) -> u32 {
    debug_assert!(op <= 0x3FFF);
    debug_assert!(arg <= ARG16_MAX);
    0x4000_0000 | (op << 16) | (arg & ARG16_MAX)
}

/// Encode a segment-5 word (30-bit op, no immediate)
pub fn seg5(op: u32) -> u32 {
    debug_assert!(op <= 0x3FFF_FFFF);
    0x8000_0000 | op
}

fn pool_index(index: usize, what: &str) -> Result<u32, EmitError> {
    if index as u32 > ARG24_MAX {
        Err(EmitError::new(format!("{} literal pool overflow", what)))
    } else {
        Ok(index as u32)
    }
}

/// Push an integer literal
pub fn push_int(code: &mut Vec<u32>, literals: &mut Literals, value: i32) -> Result<(), EmitError> {
    let index = pool_index(literals.add_int(value), "integer")?;
    code.push(seg0(OP_PUSH_INT, index));
    Ok(())
}

/// Push a float literal
pub fn push_float(
    code: &mut Vec<u32>,
    literals: &mut Literals,
    value: f32,
) -> Result<(), EmitError> {
    let index = pool_index(literals.add_float(value), "float")?;
    code.push(seg0(OP_PUSH_FLOAT, index));
    Ok(())
}

/// Push a string literal
pub fn push_string(
    code: &mut Vec<u32>,
    literals: &mut Literals,
    value: &str,
) -> Result<(), EmitError> {
    let index = pool_index(literals.add_string(value), "string")?;
    code.push(seg0(OP_PUSH_STRING, index));
    Ok(())
}

fn signed_arg24(offset: i32) -> Result<u32, EmitError> {
    if offset > 0x007F_FFFF || offset < -0x0080_0000 {
        return Err(EmitError::new(format!("jump offset {} out of range", offset)));
    }
    Ok((offset as u32) & ARG24_MAX)
}

/// Unconditional jump. The offset is relative to the jump word itself and
/// may be negative (back jump).
pub fn jump(code: &mut Vec<u32>, offset: i32) -> Result<(), EmitError> {
    if offset == 0 {
        return Err(EmitError::new(String::from("jump with zero offset")));
    }
    code.push(seg0(OP_JUMP, signed_arg24(offset)?));
    Ok(())
}

/// Jump when the value on top of the stack is zero
pub fn jump_on_zero(code: &mut Vec<u32>, offset: i32) -> Result<(), EmitError> {
    code.push(seg0(OP_JUMP_ZERO, signed_arg24(offset)?));
    Ok(())
}

/// Overwrite previously emitted words (branch patching). The replacement
/// must have been generated by the same emitter so its length matches.
pub fn replace_code(code: &mut [u32], index: usize, replacement: &[u32]) {
    code[index..index + replacement.len()].copy_from_slice(replacement);
}

fn local_fetch_op(type_tag: char) -> Result<u32, EmitError> {
    match type_tag {
        's' => Ok(OP_FETCH_LOCAL_SHORT),
        'l' => Ok(OP_FETCH_LOCAL_LONG),
        'f' => Ok(OP_FETCH_LOCAL_FLOAT),
        _ => Err(EmitError::new(format!("invalid local type tag '{}'", type_tag))),
    }
}

/// Fetch a local by table index
pub fn fetch_local(code: &mut Vec<u32>, type_tag: char, index: usize) -> Result<(), EmitError> {
    let op = local_fetch_op(type_tag)?;
    code.push(seg0(op, pool_index(index, "local")?));
    Ok(())
}

/// Store into a local; stack holds the table index, then the value
pub fn store_local(code: &mut Vec<u32>, type_tag: char) -> Result<(), EmitError> {
    let op = match type_tag {
        's' => OP_STORE_LOCAL_SHORT,
        'l' => OP_STORE_LOCAL_LONG,
        'f' => OP_STORE_LOCAL_FLOAT,
        _ => {
            return Err(EmitError::new(format!(
                "invalid local type tag '{}'",
                type_tag
            )))
        }
    };
    code.push(seg5(op));
    Ok(())
}

/// Fetch an engine global by name
pub fn fetch_global(
    code: &mut Vec<u32>,
    literals: &mut Literals,
    type_tag: char,
    name: &str,
) -> Result<(), EmitError> {
    push_string(code, literals, name)?;
    let op = match type_tag {
        's' => OP_FETCH_GLOBAL_SHORT,
        'l' => OP_FETCH_GLOBAL_LONG,
        'f' => OP_FETCH_GLOBAL_FLOAT,
        _ => {
            return Err(EmitError::new(format!(
                "invalid global type tag '{}'",
                type_tag
            )))
        }
    };
    code.push(seg5(op));
    Ok(())
}

/// Store into an engine global; stack holds the name, then the value
pub fn store_global(code: &mut Vec<u32>, type_tag: char) -> Result<(), EmitError> {
    let op = match type_tag {
        's' => OP_STORE_GLOBAL_SHORT,
        'l' => OP_STORE_GLOBAL_LONG,
        'f' => OP_STORE_GLOBAL_FLOAT,
        _ => {
            return Err(EmitError::new(format!(
                "invalid global type tag '{}'",
                type_tag
            )))
        }
    };
    code.push(seg5(op));
    Ok(())
}

/// Fetch a member variable of another script
pub fn fetch_member(
    code: &mut Vec<u32>,
    literals: &mut Literals,
    type_tag: char,
    name: &str,
    module: &str,
    global: bool,
) -> Result<(), EmitError> {
    push_string(code, literals, name)?;
    push_string(code, literals, module)?;
    let op = match (type_tag, global) {
        ('s', false) => OP_FETCH_MEMBER_SHORT,
        ('l', false) => OP_FETCH_MEMBER_LONG,
        ('f', false) => OP_FETCH_MEMBER_FLOAT,
        ('s', true) => OP_FETCH_MEMBER_GLOBAL_SHORT,
        ('l', true) => OP_FETCH_MEMBER_GLOBAL_LONG,
        ('f', true) => OP_FETCH_MEMBER_GLOBAL_FLOAT,
        _ => {
            return Err(EmitError::new(format!(
                "invalid member type tag '{}'",
                type_tag
            )))
        }
    };
    code.push(seg5(op));
    Ok(())
}

/// Store into a member variable; stack holds name, module, then the value
pub fn store_member(code: &mut Vec<u32>, type_tag: char, global: bool) -> Result<(), EmitError> {
    let op = match (type_tag, global) {
        ('s', false) => OP_STORE_MEMBER_SHORT,
        ('l', false) => OP_STORE_MEMBER_LONG,
        ('f', false) => OP_STORE_MEMBER_FLOAT,
        ('s', true) => OP_STORE_MEMBER_GLOBAL_SHORT,
        ('l', true) => OP_STORE_MEMBER_GLOBAL_LONG,
        ('f', true) => OP_STORE_MEMBER_GLOBAL_FLOAT,
        _ => {
            return Err(EmitError::new(format!(
                "invalid member type tag '{}'",
                type_tag
            )))
        }
    };
    code.push(seg5(op));
    Ok(())
}

/// Convert the value on top of the stack between integer and float
pub fn convert(code: &mut Vec<u32>, from: char, to: char) -> Result<(), EmitError> {
    match (from, to) {
        ('l', 'f') => code.push(seg5(OP_INT_TO_FLOAT)),
        ('f', 'l') => code.push(seg5(OP_FLOAT_TO_INT)),
        _ => {
            return Err(EmitError::new(format!(
                "invalid conversion '{}' to '{}'",
                from, to
            )))
        }
    }
    Ok(())
}

/// Unify a mixed int/float operand pair to float. `t1` is second from the
/// top of the stack, `t2` on top. Returns the common type tag.
fn unify_operands(code: &mut Vec<u32>, t1: char, t2: char) -> Result<char, EmitError> {
    match (t1, t2) {
        ('l', 'l') => Ok('l'),
        ('f', 'f') => Ok('f'),
        ('l', 'f') => {
            code.push(seg5(OP_INT_TO_FLOAT_1));
            Ok('f')
        }
        ('f', 'l') => {
            code.push(seg5(OP_INT_TO_FLOAT));
            Ok('f')
        }
        _ => Err(EmitError::new(format!(
            "invalid operand type tags '{}', '{}'",
            t1, t2
        ))),
    }
}

/// Binary add; operands are on the stack, left below right
pub fn add(code: &mut Vec<u32>, t1: char, t2: char) -> Result<(), EmitError> {
    let common = unify_operands(code, t1, t2)?;
    code.push(seg5(if common == 'l' { OP_ADD_INT } else { OP_ADD_FLOAT }));
    Ok(())
}

/// Binary subtract
pub fn sub(code: &mut Vec<u32>, t1: char, t2: char) -> Result<(), EmitError> {
    let common = unify_operands(code, t1, t2)?;
    code.push(seg5(if common == 'l' { OP_SUB_INT } else { OP_SUB_FLOAT }));
    Ok(())
}

/// Binary multiply
pub fn mul(code: &mut Vec<u32>, t1: char, t2: char) -> Result<(), EmitError> {
    let common = unify_operands(code, t1, t2)?;
    code.push(seg5(if common == 'l' { OP_MUL_INT } else { OP_MUL_FLOAT }));
    Ok(())
}

/// Binary divide
pub fn div(code: &mut Vec<u32>, t1: char, t2: char) -> Result<(), EmitError> {
    let common = unify_operands(code, t1, t2)?;
    code.push(seg5(if common == 'l' { OP_DIV_INT } else { OP_DIV_FLOAT }));
    Ok(())
}

/// Negate the value on top of the stack
pub fn negate(code: &mut Vec<u32>, type_tag: char) -> Result<(), EmitError> {
    match type_tag {
        'l' => code.push(seg5(OP_NEGATE_INT)),
        'f' => code.push(seg5(OP_NEGATE_FLOAT)),
        _ => {
            return Err(EmitError::new(format!(
                "invalid negate type tag '{}'",
                type_tag
            )))
        }
    }
    Ok(())
}

/// Comparison; `op` is one of `e n l L g G` (==, !=, <, <=, >, >=)
pub fn compare(code: &mut Vec<u32>, op: char, t1: char, t2: char) -> Result<(), EmitError> {
    let common = unify_operands(code, t1, t2)?;
    let word = match (op, common) {
        ('e', 'l') => OP_EQ_INT,
        ('n', 'l') => OP_NEQ_INT,
        ('l', 'l') => OP_LT_INT,
        ('L', 'l') => OP_LTE_INT,
        ('g', 'l') => OP_GT_INT,
        ('G', 'l') => OP_GTE_INT,
        ('e', 'f') => OP_EQ_FLOAT,
        ('n', 'f') => OP_NEQ_FLOAT,
        ('l', 'f') => OP_LT_FLOAT,
        ('L', 'f') => OP_LTE_FLOAT,
        ('g', 'f') => OP_GT_FLOAT,
        ('G', 'f') => OP_GTE_FLOAT,
        _ => return Err(EmitError::new(format!("invalid comparison op '{}'", op))),
    };
    code.push(seg5(word));
    Ok(())
}

/// End script execution
pub fn exit(code: &mut Vec<u32>) {
    code.push(seg5(OP_RETURN));
}

/// Report the value on top of the stack through the given printf-like
/// format (console echo of expression statements)
pub fn report(code: &mut Vec<u32>, literals: &mut Literals, format: &str) -> Result<(), EmitError> {
    push_string(code, literals, format)?;
    code.push(seg5(OP_REPORT));
    Ok(())
}

/// MessageBox call; format and arguments are already on the stack
pub fn message_box(code: &mut Vec<u32>, optionals: usize) -> Result<(), EmitError> {
    code.push(seg0(OP_MESSAGE_BOX, pool_index(optionals, "message box")?));
    Ok(())
}

fn explicit_pair(
    code: &mut Vec<u32>,
    literals: &mut Literals,
    explicit: &str,
    plain: u32,
    with_ref: u32,
) -> Result<(), EmitError> {
    if explicit.is_empty() {
        code.push(seg5(plain));
    } else {
        push_string(code, literals, explicit)?;
        code.push(seg5(with_ref));
    }
    Ok(())
}

/// True while the game is in a menu
pub fn menu_mode(code: &mut Vec<u32>) {
    code.push(seg5(OP_MENU_MODE));
}

/// Random number in [0, 100)
pub fn random(code: &mut Vec<u32>) {
    code.push(seg5(OP_RANDOM));
}

/// Start the named global script
pub fn start_script(
    code: &mut Vec<u32>,
    literals: &mut Literals,
    explicit: &str,
) -> Result<(), EmitError> {
    explicit_pair(
        code,
        literals,
        explicit,
        OP_START_SCRIPT,
        OP_START_SCRIPT_EXPLICIT,
    )
}

/// Stop the running script
pub fn stop_script(code: &mut Vec<u32>) {
    code.push(seg5(OP_STOP_SCRIPT));
}

/// Query whether the named script runs
pub fn script_running(code: &mut Vec<u32>) {
    code.push(seg5(OP_SCRIPT_RUNNING));
}

/// Distance from the (explicit or implicit) reference to a target
pub fn get_distance(
    code: &mut Vec<u32>,
    literals: &mut Literals,
    explicit: &str,
) -> Result<(), EmitError> {
    explicit_pair(
        code,
        literals,
        explicit,
        OP_GET_DISTANCE,
        OP_GET_DISTANCE_EXPLICIT,
    )
}

/// Frame time in seconds
pub fn get_seconds_passed(code: &mut Vec<u32>) {
    code.push(seg5(OP_GET_SECONDS_PASSED));
}

/// Disabled state of the reference
pub fn get_disabled(
    code: &mut Vec<u32>,
    literals: &mut Literals,
    explicit: &str,
) -> Result<(), EmitError> {
    explicit_pair(
        code,
        literals,
        explicit,
        OP_GET_DISABLED,
        OP_GET_DISABLED_EXPLICIT,
    )
}

/// Enable the reference
pub fn enable(
    code: &mut Vec<u32>,
    literals: &mut Literals,
    explicit: &str,
) -> Result<(), EmitError> {
    explicit_pair(code, literals, explicit, OP_ENABLE, OP_ENABLE_EXPLICIT)
}

/// Disable the reference
pub fn disable(
    code: &mut Vec<u32>,
    literals: &mut Literals,
    explicit: &str,
) -> Result<(), EmitError> {
    explicit_pair(code, literals, explicit, OP_DISABLE, OP_DISABLE_EXPLICIT)
}

/// Square root of the value on top of the stack
pub fn square_root(code: &mut Vec<u32>) {
    code.push(seg5(OP_GET_SQUARE_ROOT));
}
