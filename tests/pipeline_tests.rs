//! Pipeline invariants: warning-mode monotonicity, locals closure, branch
//! well-formedness, the reverse argument push law and MessageBox format
//! idempotence.

mod common;

use common::{jump_offset, op_of, world};
use emberscript::semantic::format_message_box;
use emberscript::{generator, Compiler, CompilerOptions, ErrorLog, Severity, WarningMode};
use pretty_assertions::assert_eq;

fn compile_with_mode(source: &str, mode: WarningMode) -> emberscript::CompileResult {
    let ctx = world();
    let compiler = Compiler::new(
        &ctx,
        CompilerOptions {
            warning_mode: mode,
            console: false,
        },
    );
    compiler.compile(source, "invariant")
}

#[test]
fn warning_mode_monotonicity() {
    // one warning (precision loss) and nothing else
    let source = "short x\nset x to GameHour\n";

    let ignore = compile_with_mode(source, WarningMode::Ignore);
    let normal = compile_with_mode(source, WarningMode::Normal);
    let strict = compile_with_mode(source, WarningMode::Strict);

    assert!(ignore.diagnostics.len() <= normal.diagnostics.len());
    assert!(normal.diagnostics.len() <= strict.diagnostics.len());

    let errors = |r: &emberscript::CompileResult| {
        r.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    };
    assert!(errors(&ignore) <= errors(&normal));
    assert!(errors(&normal) <= errors(&strict));

    // ignore and normal still compile; strict rejects
    assert!(ignore.success);
    assert!(normal.success);
    assert!(!strict.success);
}

#[test]
fn locals_closure() {
    // forward reference: the use precedes the declaration
    let source = "set counter to counter + 1\nshort counter\nfloat pace\n";
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());

    let result = compiler.compile(source, "invariant");
    assert!(result.success, "diagnostics: {:?}", result.diagnostics);

    // the locals query and the full compile agree on the table
    let mut errors = ErrorLog::new(WarningMode::Normal);
    let scanned = compiler.get_locals(source, "invariant", &mut errors).unwrap();
    assert_eq!(&scanned, result.output.locals());
    assert_eq!(scanned.get_index("counter"), Some(0));
    assert_eq!(scanned.get_index("pace"), Some(1));
}

#[test]
fn branch_targets_stay_inside_the_code() {
    let source = "\
short x\n\
short y\n\
while ( x < 10 )\n\
if ( y == 0 )\n\
set y to 1\n\
else\n\
set y to 0\n\
endif\n\
set x to x + 1\n\
endwhile\n";
    let ctx = world();
    let result = Compiler::new(&ctx, CompilerOptions::default()).compile(source, "invariant");
    assert!(result.success, "diagnostics: {:?}", result.diagnostics);

    let code = result.output.code();
    for (pc, word) in code.iter().enumerate() {
        let op = op_of(*word);
        if op == 0x04 || op == 0x05 {
            let offset = jump_offset(*word);
            assert_ne!(offset, 0, "unpatched jump at {}", pc);
            let target = pc as i64 + i64::from(offset);
            assert!(
                target >= 0 && target <= code.len() as i64,
                "jump at {} lands outside the code ({})",
                pc,
                target
            );
        }
    }
}

#[test]
fn while_back_jump_lands_on_condition_entry() {
    let source = "short x\nwhile ( x < 3 )\nset x to x + 1\nendwhile\nreturn\n";
    let ctx = world();
    let result = Compiler::new(&ctx, CompilerOptions::default()).compile(source, "invariant");
    assert!(result.success);

    let code = result.output.code();
    let back = code.iter().rposition(|w| op_of(*w) == 0x04).unwrap();
    let jz = code.iter().position(|w| op_of(*w) == 0x05).unwrap();

    // condition starts at 0 here; the back jump returns exactly there
    assert_eq!(back as i64 + i64::from(jump_offset(code[back])), 0);
    // the exit jump lands right behind the back jump
    assert_eq!(jz + jump_offset(code[jz]) as usize, back + 1);
}

#[test]
fn reverse_push_law() {
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());

    // zero arguments: just the callee
    let none = compiler.compile("GetHealth\n", "invariant");
    assert!(none.success);
    assert_eq!(none.output.code().len(), 1);

    // three arguments: rightmost value lands in the pool first
    let three = compiler.compile("PlaceAt rat 1 2\n", "invariant");
    assert!(three.success);
    assert_eq!(three.output.literals().ints(), &[2, 1]);
    // the leftmost argument (the id string) is pushed last, right before
    // the callee opcode
    let code = three.output.code();
    assert_eq!(code[code.len() - 2], generator::seg0(0x03, 0));
    assert_eq!(
        code[code.len() - 1],
        generator::seg3(common::OP_PLACE_AT, 0)
    );
}

#[test]
fn message_box_format_idempotence() {
    let canonical = format_message_box("%g rats and %f seconds, %s");
    assert_eq!(format_message_box(&canonical), canonical);

    let empty = format_message_box("");
    assert_eq!(format_message_box(&empty), empty);
}

#[test]
fn message_box_specifier_mapping() {
    let sig = format_message_box("%s %S %g %G %f %F %.3f %.12g %%");
    let required: String = sig.chars().take_while(|c| *c != '/').collect();
    assert_eq!(required, "SSSllfffl");
}

#[test]
fn compile_reuses_cleanly_across_calls() {
    // one compiler instance, several scripts; no state leaks between
    // compilations
    let ctx = world();
    let compiler = Compiler::new(&ctx, CompilerOptions::default());

    let bad = compiler.compile("if (\n", "first");
    assert!(!bad.success);

    let good = compiler.compile("short x\nset x to 1\n", "second");
    assert!(good.success);
    assert!(good.diagnostics.is_empty());

    let good_again = compiler.compile("short x\nset x to 1\n", "third");
    assert_eq!(good.output.code(), good_again.output.code());
}
