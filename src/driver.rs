//! # Compiler Driver
//!
//! The façade over the pipeline: scanner, parser, local scan, semantic
//! analysis and code generation, in that order. On any stage failure the
//! driver reports through the error handler and returns nothing.
//!
//! Compilation is synchronous and per-unit; to compile in parallel,
//! instantiate one [`Compiler`] per thread over the same read-only
//! context. The batch entry point walks a script collection serially and
//! keeps going past failures.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::codegen;
use crate::context::Context;
use crate::error::{Diagnostic, ErrorHandler, ErrorLog, NullErrorHandler, WarningMode};
use crate::lexer::Lexer;
use crate::locals::Locals;
use crate::output::Output;
use crate::parser::Parser;
use crate::scan_locals;
use crate::semantic;
#[cfg(feature = "std")]
use crate::token::TokenLoc;

/// Options fixed at pipeline construction
#[derive(Debug, Clone, Copy, Default)]
pub struct CompilerOptions {
    /// How warnings are treated by [`Compiler::compile`]
    pub warning_mode: WarningMode,
    /// Echo the result of value-typed expression statements (interactive
    /// console behavior)
    pub console: bool,
}

/// Result of [`Compiler::compile`]
#[derive(Debug, Clone, Default)]
pub struct CompileResult {
    pub success: bool,
    /// Empty when `success` is false
    pub output: Output,
    pub diagnostics: Vec<Diagnostic>,
}

/// The compiler pipeline
pub struct Compiler<'a> {
    context: &'a dyn Context,
    options: CompilerOptions,
}

impl<'a> Compiler<'a> {
    pub fn new(context: &'a dyn Context, options: CompilerOptions) -> Self {
        Compiler { context, options }
    }

    /// Compile one script, collecting diagnostics under the configured
    /// warning mode.
    pub fn compile(&self, source: &str, name: &str) -> CompileResult {
        let mut errors = ErrorLog::new(self.options.warning_mode);
        let output = self.compile_string(source, name, &mut errors);
        CompileResult {
            success: output.is_some(),
            output: output.unwrap_or_default(),
            diagnostics: errors.take_diagnostics(),
        }
    }

    /// Compile one script against a caller-supplied error handler. The
    /// handler must be in its reset state; stage gates read
    /// [`ErrorHandler::is_good`].
    pub fn compile_string(
        &self,
        source: &str,
        name: &str,
        errors: &mut dyn ErrorHandler,
    ) -> Option<Output> {
        log::debug!("compiling script: {}", name);

        let tokens = Lexer::new(source, name).tokenize(errors);
        if !errors.is_good() {
            return None;
        }

        let mut module = Parser::parse(tokens, name, errors)?;

        let mut locals = Locals::new();
        scan_locals::scan(&module, &mut locals, errors);

        semantic::analyze(&mut module, self.context, &locals, errors);
        if !errors.is_good() {
            return None;
        }

        let mut output = Output::new(locals);
        match codegen::generate(&module, self.context, &mut output, self.options.console) {
            Ok(()) => Some(output),
            Err(fault) => {
                errors.error(&format!("Serious error: {}", fault.message), &fault.loc);
                None
            }
        }
    }

    /// Compile from a byte stream (reads it fully before scanning)
    #[cfg(feature = "std")]
    pub fn compile_stream<R: std::io::Read>(
        &self,
        mut stream: R,
        name: &str,
        errors: &mut dyn ErrorHandler,
    ) -> Option<Output> {
        let mut source = String::new();
        if stream.read_to_string(&mut source).is_err() {
            errors.error(
                "Unable to read source stream.",
                &TokenLoc::new(0, 0, name, ""),
            );
            return None;
        }
        self.compile_string(&source, name, errors)
    }

    /// Compile a script file; the file name becomes the unit name
    #[cfg(feature = "std")]
    pub fn compile_file(&self, path: &str, errors: &mut dyn ErrorHandler) -> Option<Output> {
        match std::fs::File::open(path) {
            Ok(file) => self.compile_stream(file, path, errors),
            Err(_) => {
                errors.error("Unable to open source file.", &TokenLoc::new(0, 0, path, ""));
                None
            }
        }
    }

    /// Scan a script's local declarations without compiling it. Runs only
    /// the scanner, parser and local-scan pass.
    pub fn get_locals(
        &self,
        source: &str,
        name: &str,
        errors: &mut dyn ErrorHandler,
    ) -> Option<Locals> {
        let tokens = Lexer::new(source, name).tokenize(errors);
        let module = Parser::parse(tokens, name, errors)?;
        let mut locals = Locals::new();
        scan_locals::scan(&module, &mut locals, errors);
        Some(locals)
    }

    /// Compile every `(name, source)` pair not on the blacklist. Returns
    /// `(total, succeeded)`; failures are logged and skipped, never
    /// aborting the batch. Blacklist matching is case-insensitive.
    pub fn compile_all<'s, I>(&self, scripts: I, blacklist: &[String]) -> (usize, usize)
    where
        I: IntoIterator<Item = (&'s str, &'s str)>,
    {
        let blacklist: Vec<String> = blacklist.iter().map(|s| s.to_lowercase()).collect();

        let mut total = 0;
        let mut succeeded = 0;
        for (name, source) in scripts {
            if blacklist.contains(&name.to_lowercase()) {
                continue;
            }
            total += 1;
            let mut errors = NullErrorHandler::new();
            if self.compile_string(source, name, &mut errors).is_some() {
                succeeded += 1;
            } else {
                log::debug!("failed to compile script: {}", name);
            }
        }
        (total, succeeded)
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }
}

/// Convenience constructor for the common one-shot case
pub fn compile(
    context: &dyn Context,
    source: &str,
    name: &str,
    warning_mode: WarningMode,
) -> CompileResult {
    Compiler::new(
        context,
        CompilerOptions {
            warning_mode,
            console: false,
        },
    )
    .compile(source, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TableContext;
    use crate::extensions::Extensions;

    fn world() -> TableContext {
        let mut ext = Extensions::new();
        ext.register_instruction("MessageBox", "S", 0x220, None);
        ext.register_function("GetJournalIndex", 'l', "j", 0x205, None);
        TableContext::with_extensions(ext)
    }

    #[test]
    fn test_compile_success() {
        let ctx = world();
        let compiler = Compiler::new(&ctx, CompilerOptions::default());
        let result = compiler.compile("short x\nset x to 5\n", "unit");
        assert!(result.success);
        assert!(!result.output.code().is_empty());
        assert_eq!(result.output.locals().get_type("x"), 's');
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_compile_failure_has_no_output() {
        let ctx = world();
        let compiler = Compiler::new(&ctx, CompilerOptions::default());
        let result = compiler.compile("set x to +\n", "unit");
        assert!(!result.success);
        assert!(result.output.code().is_empty());
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn test_get_locals_without_full_compile() {
        let ctx = world();
        let compiler = Compiler::new(&ctx, CompilerOptions::default());
        let mut errors = ErrorLog::new(WarningMode::Normal);
        // the set statement would not survive analysis, but locals
        // scanning does not care
        let locals = compiler
            .get_locals("short a\nfloat b\nset nowhere to 1\n", "unit", &mut errors)
            .unwrap();
        assert_eq!(locals.len(), 2);
        assert_eq!(locals.get_type("b"), 'f');
    }

    #[test]
    fn test_compile_all_counts_and_blacklist() {
        let ctx = world();
        let compiler = Compiler::new(&ctx, CompilerOptions::default());
        let scripts = [
            ("good_one", "short x\nset x to 1\n"),
            ("bad_one", "set x to +\n"),
            ("skipped", "short y\n"),
        ];
        let blacklist = [String::from("SKIPPED")];
        let (total, succeeded) =
            compiler.compile_all(scripts.iter().copied(), &blacklist);
        assert_eq!(total, 2);
        assert_eq!(succeeded, 1);
    }

    #[test]
    #[cfg(feature = "std")]
    fn test_compile_stream() {
        let ctx = world();
        let compiler = Compiler::new(&ctx, CompilerOptions::default());
        let mut errors = ErrorLog::new(WarningMode::Normal);
        let source = "short x\nset x to 2\n";
        let output = compiler
            .compile_stream(source.as_bytes(), "stream", &mut errors)
            .unwrap();
        assert!(!output.code().is_empty());
    }
}
