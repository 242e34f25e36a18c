//! # Local Declaration Scan
//!
//! Collects every `short`/`long`/`float` declaration into the locals table
//! before semantic analysis runs.
//!
//! The language permits an identifier to be used before its declaration
//! appears in source order, so name resolution needs the complete table
//! first. The same walk also backs the driver's locals query, which stops
//! after this pass.

use crate::ast::{Module, Stmt};
use crate::error::ErrorHandler;
use crate::locals::Locals;

/// Walk a module and declare every local found
pub fn scan(module: &Module, locals: &mut Locals, errors: &mut dyn ErrorHandler) {
    for stmt in &module.stmts {
        scan_stmt(stmt, locals, errors);
    }
}

fn scan_stmt(stmt: &Stmt, locals: &mut Locals, errors: &mut dyn ErrorHandler) {
    match stmt {
        Stmt::TypeDecl {
            loc,
            decl_type,
            name,
        } => {
            if !locals.declare(decl_type.type_char(), name) {
                errors.warning(
                    &alloc::format!("Local variable '{}' is already declared.", name),
                    loc,
                );
            }
        }
        Stmt::If {
            true_body,
            false_body,
            ..
        } => {
            for s in true_body {
                scan_stmt(s, locals, errors);
            }
            for s in false_body {
                scan_stmt(s, locals, errors);
            }
        }
        Stmt::While { body, .. } => {
            for s in body {
                scan_stmt(s, locals, errors);
            }
        }
        Stmt::Set { .. } | Stmt::Return { .. } | Stmt::Expr { .. } | Stmt::NoOp { .. } => {}
    }
}
