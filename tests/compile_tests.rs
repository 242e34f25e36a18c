//! End-to-end compilation scenarios through the driver facade.

mod common;

use common::{jump_offset, op_of, world};
use emberscript::{generator, Compiler, CompilerOptions, Severity, WarningMode};
use pretty_assertions::assert_eq;

#[test]
fn declared_short_assignment() {
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());
    let result = compiler.compile("short x\nset x to 5\n", "scenario");

    assert!(result.success);
    let locals: Vec<(String, char)> = result
        .output
        .locals()
        .iter()
        .map(|(n, t)| (n.to_string(), t))
        .collect();
    assert_eq!(locals, vec![("x".to_string(), 's')]);

    // index push, value push, store to local 0
    let code = result.output.code();
    assert_eq!(code.len(), 3);
    assert_eq!(result.output.literals().ints(), &[0, 5]);
    assert_eq!(code[2], generator::seg5(0x01));
}

#[test]
fn undeclared_set_target_fails_in_strict_mode() {
    let ctx = world();
    let compiler = Compiler::new(
        &ctx,
        CompilerOptions {
            warning_mode: WarningMode::Strict,
            console: false,
        },
    );
    let result = compiler.compile("set x to 1.5\n", "scenario");

    assert!(!result.success);
    assert!(result.output.code().is_empty());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Error
            && (d.message.contains("Unknown target in set statement")
                || d.message.contains("Unable to determine name"))));
}

#[test]
fn undeclared_set_target_is_ignored_in_normal_mode() {
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());
    let result = compiler.compile("set x to 1.5\n", "scenario");

    // the statement is reported and dropped; no store is emitted
    assert!(result.success);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("Unknown target in set statement")));
    assert!(!result
        .output
        .code()
        .iter()
        .any(|w| *w == generator::seg5(0x01)
            || *w == generator::seg5(0x02)
            || *w == generator::seg5(0x03)));
}

#[test]
fn conditional_jump_lands_after_call() {
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());
    let result = compiler.compile(
        "short x\nif ( x == 1 )\nmessagebox \"hi\"\nendif\n",
        "scenario",
    );
    assert!(result.success);

    let code = result.output.code();
    let jz = code.iter().position(|w| op_of(*w) == 0x05).unwrap();
    let end_jump = code.iter().position(|w| op_of(*w) == 0x04).unwrap();

    // the conditional jump skips the call body and the end jump
    assert_eq!(jz + jump_offset(code[jz]) as usize, end_jump + 1);
    // the end jump lands on the first instruction after the block
    assert_eq!(
        end_jump + jump_offset(code[end_jump]) as usize,
        code.len()
    );
    // the message box call sits between the two jumps
    let mb = code.iter().position(|w| op_of(*w) == 0x06).unwrap();
    assert!(jz < mb && mb < end_jump);
}

#[test]
fn message_box_synthesized_arity() {
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());
    let result = compiler.compile("MessageBox \"score %g\", 42\n", "scenario");
    assert!(result.success);

    // both required arguments land in the pools; no optionals beyond the
    // required two, so the arity immediate is zero
    assert!(result
        .output
        .literals()
        .strings()
        .iter()
        .any(|s| s == "score %g"));
    assert_eq!(result.output.literals().ints(), &[42]);
    assert!(result
        .output
        .code()
        .iter()
        .any(|w| *w == generator::seg0(0x06, 0)));
}

#[test]
fn explicit_reference_is_retained() {
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());
    let result = compiler.compile("Player->GetDistance Rat\n", "scenario");
    assert!(result.success);

    // the target argument is pushed, then the explicit reference and the
    // explicit form of the opcode
    let strings = result.output.literals().strings();
    assert!(strings.iter().any(|s| s == "rat"));
    assert!(strings.iter().any(|s| s == "player"));
    assert_eq!(
        *result.output.code().last().unwrap(),
        generator::seg5(0x3B)
    );
}

#[test]
fn float_arithmetic_widens_without_warning() {
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());
    let result = compiler.compile("short x\n3.14 + x\n", "scenario");

    assert!(result.success);
    assert!(result.diagnostics.is_empty());

    let code = result.output.code();
    let floats = result.output.literals().floats();
    assert!(floats.iter().any(|f| (*f - 3.14).abs() < 1e-6));
    // the short operand is widened on the stack, then added as float
    assert!(code.contains(&generator::seg5(0x16)));
    assert!(code.contains(&generator::seg5(0x1B)));
}

#[test]
fn journal_read_and_update() {
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());
    let result = compiler.compile(
        "short stage\nset stage to quest_rats\nJournal quest_rats 10\n",
        "scenario",
    );
    assert!(result.success);

    let code = result.output.code();
    assert!(code.contains(&generator::seg3(common::OP_GET_JOURNAL_INDEX, 0)));
    assert!(code.contains(&generator::seg3(common::OP_JOURNAL, 0)));
}

#[test]
fn optional_argument_arity_reaches_opcode() {
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());

    // required args only
    let bare = compiler.compile("PlaceAt rat 1 2\n", "scenario");
    assert!(bare.success);
    assert!(bare
        .output
        .code()
        .contains(&generator::seg3(common::OP_PLACE_AT, 0)));

    // one optional filled
    let filled = compiler.compile("PlaceAt rat 1 2 3\n", "scenario");
    assert!(filled.success);
    assert!(filled
        .output
        .code()
        .contains(&generator::seg3(common::OP_PLACE_AT, 1)));
}

#[test]
fn console_mode_reports_expression_results() {
    let ctx = world();
    let quiet = Compiler::new(&ctx, CompilerOptions::default())
        .compile("GetHealth\n", "scenario");
    let chatty = Compiler::new(
        &ctx,
        CompilerOptions {
            warning_mode: WarningMode::Normal,
            console: true,
        },
    )
    .compile("GetHealth\n", "scenario");

    assert!(quiet.success && chatty.success);
    assert!(chatty.output.code().len() > quiet.output.code().len());
    assert!(chatty.output.literals().strings().iter().any(|s| s == "%f"));
    assert!(!quiet.output.literals().strings().iter().any(|s| s == "%f"));
}

#[test]
fn batch_compile_reports_counts() {
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());
    let scripts = [
        ("intro", "short x\nset x to 1\n"),
        ("broken", "if (\n"),
        ("banned", "short y\n"),
        ("outro", "MessageBox \"bye\"\n"),
    ];
    let blacklist = [String::from("Banned")];
    let (total, succeeded) = compiler.compile_all(scripts.iter().copied(), &blacklist);
    assert_eq!(total, 3);
    assert_eq!(succeeded, 2);
}

#[test]
fn quest_script_end_to_end() {
    let source = "\
short stage\n\
float timer\n\
\n\
if ( stage == 0 )\n\
set stage to 1\n\
Journal quest_rats 10\n\
elseif ( stage == 1 )\n\
set timer to timer + GetSecondsPassed\n\
if ( timer > 5 )\n\
MessageBox \"the rats are closing in, %g left\", stage\n\
set timer to 0\n\
endif\n\
else\n\
return\n\
endif\n";

    // GetSecondsPassed has a dedicated opcode but still needs a registry
    // entry so the analyzer can type it
    let mut ctx = world();
    let mut ext = emberscript::Extensions::new();
    ext.register_instruction("MessageBox", "S", common::OP_MESSAGE_BOX_REG, None);
    ext.register_instruction("Journal", "cl", common::OP_JOURNAL, None);
    ext.register_function("GetSecondsPassed", 'f', "", 0x1009, None);
    ctx.set_extensions(ext);
    ctx.add_journal("quest_rats");

    let compiler = Compiler::new(&ctx, CompilerOptions::default());
    let result = compiler.compile(source, "quest_rats_script");
    assert!(
        result.success,
        "quest script failed: {:?}",
        result.diagnostics
    );
    assert!(!result.output.code().is_empty());
    assert_eq!(result.output.locals().len(), 2);
}
