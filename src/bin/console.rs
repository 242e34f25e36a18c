/// Emberscript Console
/// Interactive shell for compiling script lines against a demo world and
/// inspecting the emitted code words.
use emberscript::{Compiler, CompilerOptions, ErrorLog, Extensions, TableContext, WarningMode};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result};

const WELCOME_MESSAGE: &str = r#"
Emberscript console
Type a script line to compile it, :help for help, :quit to exit.
"#;

const HELP_MESSAGE: &str = r#"
Emberscript console commands:

  :help         Show this help message
  :quit, :exit  Exit the console
  :clear        Clear the screen
  :strict      Promote warnings to errors
  :normal      Report warnings normally

Anything else is compiled as a script. Multi-line blocks work by ending a
line with if/while and closing them on later lines:

  short stage
  set stage to 10
  MessageBox "stage is %g", stage

The emitted code words and the literal pool are printed on success.
"#;

/// A small demo world so the console has something to resolve names
/// against.
fn demo_context() -> TableContext {
    let mut ext = Extensions::new();
    ext.register_instruction("MessageBox", "S", 0x1001, None);
    ext.register_instruction("Journal", "cl", 0x1002, None);
    ext.register_instruction("PlaceAt", "cll/l", 0x1003, Some(0x1103));
    ext.register_function("GetDistance", 'f', "c", 0x1004, Some(0x1104));
    ext.register_function("GetHealth", 'f', "", 0x1005, Some(0x1105));
    ext.register_function("GetSquareRoot", 'f', "f", 0x1006, None);
    ext.register_function("GetJournalIndex", 'l', "j", 0x1007, None);
    ext.register_function("Random", 'l', "l", 0x1008, None);

    let mut context = TableContext::with_extensions(ext);
    context.add_global("GameHour", 'f');
    context.add_global("Day", 'l');
    context.add_id("player");
    context.add_id("rat");
    context.add_journal("quest_rats");
    context.add_member("guild_ledger", "strength", 's', false);
    context
}

fn compile_and_print(compiler: &Compiler<'_>, mode: WarningMode, source: &str, counter: u32) {
    let name = format!("console_{}", counter);
    let mut errors = ErrorLog::new(mode);
    let output = compiler.compile_string(source, &name, &mut errors);

    for diagnostic in errors.diagnostics() {
        println!("{}", diagnostic);
    }

    match output {
        Some(output) => {
            let words: Vec<String> = output
                .code()
                .iter()
                .map(|w| format!("{:08x}", w))
                .collect();
            println!("code:    [{}]", words.join(" "));
            if !output.literals().is_empty() {
                println!(
                    "pool:    ints {:?}  floats {:?}  strings {:?}",
                    output.literals().ints(),
                    output.literals().floats(),
                    output.literals().strings()
                );
            }
            if !output.locals().is_empty() {
                let locals: Vec<String> = output
                    .locals()
                    .iter()
                    .map(|(name, tag)| format!("{}:{}", name, tag))
                    .collect();
                println!("locals:  [{}]", locals.join(" "));
            }
        }
        None => println!("compilation failed."),
    }
}

fn needs_more_input(source: &str) -> bool {
    let mut depth = 0i32;
    for line in source.lines() {
        let first = line
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_lowercase();
        match first.as_str() {
            "if" | "while" => depth += 1,
            "endif" | "endwhile" => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}

fn main() -> Result<()> {
    println!("{}", WELCOME_MESSAGE);

    let mut rl = DefaultEditor::new()?;

    let history_file = dirs::data_local_dir().map(|mut p| {
        p.push("emberscript");
        std::fs::create_dir_all(&p).ok();
        p.push("history.txt");
        p
    });

    if let Some(ref history_path) = history_file {
        let _ = rl.load_history(history_path);
    }

    let context = demo_context();
    let compiler = Compiler::new(
        &context,
        CompilerOptions {
            warning_mode: WarningMode::Normal,
            console: true,
        },
    );

    let mut mode = WarningMode::Normal;
    let mut buffer = String::new();
    let mut counter = 1u32;

    loop {
        let prompt = if buffer.is_empty() {
            format!("ember[{}]> ", counter)
        } else {
            String::from("     ...> ")
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                if buffer.is_empty() && line.trim().starts_with(':') {
                    match line.trim() {
                        ":quit" | ":exit" => break,
                        ":help" => {
                            println!("{}", HELP_MESSAGE);
                            continue;
                        }
                        ":clear" => {
                            print!("\x1B[2J\x1B[1;1H");
                            continue;
                        }
                        ":strict" => {
                            mode = WarningMode::Strict;
                            println!("warnings are now errors.");
                            continue;
                        }
                        ":normal" => {
                            mode = WarningMode::Normal;
                            println!("warnings are back to warnings.");
                            continue;
                        }
                        cmd => {
                            println!("unknown command: {}", cmd);
                            continue;
                        }
                    }
                }

                rl.add_history_entry(line.as_str())?;

                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(&line);

                if needs_more_input(&buffer) {
                    continue;
                }

                buffer.push('\n');
                compile_and_print(&compiler, mode, &buffer, counter);
                buffer.clear();
                counter += 1;
            }
            Err(ReadlineError::Interrupted) => {
                if !buffer.is_empty() {
                    println!("^C");
                    buffer.clear();
                }
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("error: {:?}", err);
                break;
            }
        }
    }

    if let Some(ref history_path) = history_file {
        let _ = rl.save_history(history_path);
    }

    Ok(())
}
