//! # Emberscript
//!
//! Compiler for the legacy quest-scripting language of the Ember engine.
//! Scripts are case-insensitive and line-oriented; the compiler turns them
//! into the stack-machine code words consumed by the engine's interpreter,
//! together with a literal pool and a locals table.
//!
//! The language predates the compiler and is gloriously ambiguous: bare
//! words may be locals, globals, journal ids, numbers or builtins; calls
//! need no parentheses; `a.b` is a member access or a float depending on
//! what `a` and `b` turn out to be. The pipeline therefore parses
//! permissively and resolves everything in a dedicated semantic pass.
//!
//! ## Pipeline
//!
//! ```text
//! source -> lexer -> parser -> scan_locals -> semantic -> codegen -> Output
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use emberscript::{Compiler, CompilerOptions, TableContext};
//!
//! let context = TableContext::with_extensions(engine_extensions());
//! let compiler = Compiler::new(&context, CompilerOptions::default());
//! let result = compiler.compile("short stage\nset stage to 10\n", "intro");
//! assert!(result.success);
//! ```
//!
//! ## Modules
//!
//! - [`token`]: Token definitions for the scanner
//! - [`lexer`]: Tokenizer for Emberscript source code
//! - [`ast`]: Abstract syntax tree and type signatures
//! - [`parser`]: Permissive parser with deferred diagnostics
//! - [`scan_locals`]: Pre-analysis local declaration scan
//! - [`semantic`]: Identifier classification, call recovery, coercion
//! - [`codegen`]: Code word emission and branch patching
//! - [`generator`]: Word encodings and primitive emitters
//! - [`extensions`]: The engine's builtin registry
//! - [`context`]: Read-only compilation oracle
//! - [`driver`]: The compile/compile_all/get_locals façade

// Declare as no_std by default, but allow std feature to enable standard library
#![cfg_attr(not(feature = "std"), no_std)]

// When std feature is enabled, provide alloc via std
// Import macros (format!, vec!) from alloc
#[cfg(feature = "std")]
#[macro_use]
extern crate std as alloc;

// When std feature is disabled, use the real alloc crate for heap allocations
// Import macros (format!, vec!) from alloc
#[cfg(not(feature = "std"))]
#[macro_use]
extern crate alloc;

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod scan_locals;
pub mod semantic;
pub mod codegen;
pub mod generator;
pub mod extensions;
pub mod context;
pub mod locals;
pub mod literals;
pub mod output;
pub mod error;
pub mod driver;

// Re-export commonly used types
pub use ast::{ArgsSig, BinOp, Expr, ExprKind, Module, Primitive, Stmt, TypeSig};
pub use context::{Context, TableContext};
pub use driver::{compile, CompileResult, Compiler, CompilerOptions};
pub use error::{Diagnostic, ErrorHandler, ErrorLog, NullErrorHandler, Severity, WarningMode};
pub use extensions::{Extensions, Keyword};
pub use lexer::Lexer;
pub use literals::Literals;
pub use locals::Locals;
pub use output::Output;
pub use parser::Parser;
pub use token::{Token, TokenKind, TokenLoc};
