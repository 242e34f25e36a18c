//! # Code Generator
//!
//! Post-order emission of the analyzed AST into interpreter code words.
//!
//! Control flow uses forward-reference patching: conditional jumps are
//! emitted with a placeholder offset and overwritten once the branch
//! target is known. Jump words are fixed-size, so patching is in-place.
//! Call arguments are pushed in reverse source order (the callee expects
//! the leftmost argument on top of the stack).
//!
//! Shorts and longs share a runtime representation, so casts between them
//! are elided here even though the analyzer keeps them in the AST for
//! type bookkeeping.
//!
//! The analyzer runs first and must have left no errors; anything
//! inconsistent found at this stage is an internal fault that aborts the
//! compilation unit without panicking.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::ast::{BinOp, Expr, ExprKind, Module, Stmt, TypeSig};
use crate::context::Context;
use crate::generator::{self, EmitError};
use crate::output::Output;
use crate::token::TokenLoc;

/// Internal inconsistency detected during emission
#[derive(Debug, Clone, PartialEq)]
pub struct CodegenFault {
    pub message: String,
    pub loc: TokenLoc,
}

impl CodegenFault {
    fn new(message: &str, loc: &TokenLoc) -> Self {
        CodegenFault {
            message: String::from(message),
            loc: loc.clone(),
        }
    }

    fn emit(error: EmitError, loc: &TokenLoc) -> Self {
        CodegenFault {
            message: error.message,
            loc: loc.clone(),
        }
    }
}

/// Widen shorts to longs; the interpreter has one integer width
fn coerce_short(tag: char) -> char {
    if tag == 's' {
        'l'
    } else {
        tag
    }
}

fn sig_char(e: &Expr) -> char {
    e.sig.as_ref().map_or(' ', |s| s.type_char())
}

/// Generate code for an analyzed module into the output. `console`
/// enables the automatic result echo after value-typed expression
/// statements.
pub fn generate(
    module: &Module,
    context: &dyn Context,
    output: &mut Output,
    console: bool,
) -> Result<(), CodegenFault> {
    let mut codegen = Codegen {
        context,
        output,
        console,
    };
    for stmt in &module.stmts {
        codegen.gen_stmt(stmt)?;
    }
    Ok(())
}

struct Codegen<'a> {
    context: &'a dyn Context,
    output: &'a mut Output,
    console: bool,
}

impl<'a> Codegen<'a> {
    fn code_len(&self) -> usize {
        self.output.code().len()
    }

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenFault> {
        match stmt {
            // Declarations live in the locals table, not in code
            Stmt::TypeDecl { .. } | Stmt::NoOp { .. } => Ok(()),
            Stmt::Return { loc: _ } => {
                generator::exit(self.output.code_mut());
                Ok(())
            }
            Stmt::Set {
                loc,
                target,
                expr,
                valid,
            } => self.gen_set(loc, target, expr, *valid),
            Stmt::While { loc, cond, body } => self.gen_while(loc, cond, body),
            Stmt::If {
                loc,
                cond,
                true_body,
                false_body,
            } => self.gen_if(loc, cond, true_body, false_body),
            Stmt::Expr { loc, expr } => {
                let stmt_type = sig_char(expr);
                self.gen_expr(expr, false)?;
                if self.console {
                    let (code, literals) = self.output.emission_targets();
                    match stmt_type {
                        's' | 'l' => generator::report(code, literals, "%g")
                            .map_err(|e| CodegenFault::emit(e, loc))?,
                        'f' => generator::report(code, literals, "%f")
                            .map_err(|e| CodegenFault::emit(e, loc))?,
                        _ => {}
                    }
                }
                Ok(())
            }
        }
    }

    fn gen_set(
        &mut self,
        loc: &TokenLoc,
        target: &Expr,
        expr: &Expr,
        valid: bool,
    ) -> Result<(), CodegenFault> {
        let target_type = sig_char(target);

        if valid {
            self.gen_expr(target, true)?;
        }
        self.gen_expr(expr, false)?;
        if !valid {
            return Ok(());
        }

        match &target.kind {
            ExprKind::GlobalVar(_) => generator::store_global(self.output.code_mut(), target_type)
                .map_err(|e| CodegenFault::emit(e, loc)),
            ExprKind::MemberVar { .. } => {
                let global = match target.sig.as_ref() {
                    Some(TypeSig::Primitive { global_member, .. }) => *global_member,
                    _ => false,
                };
                generator::store_member(self.output.code_mut(), target_type, global)
                    .map_err(|e| CodegenFault::emit(e, loc))
            }
            ExprKind::LocalVar(_) => generator::store_local(self.output.code_mut(), target_type)
                .map_err(|e| CodegenFault::emit(e, loc)),
            _ => Err(CodegenFault::new("Set target is not a variable.", loc)),
        }
    }

    fn gen_while(&mut self, loc: &TokenLoc, cond: &Expr, body: &[Stmt]) -> Result<(), CodegenFault> {
        let start = self.code_len();
        self.gen_expr(cond, false)?;

        let cond_jump_at = self.code_len();
        generator::jump_on_zero(self.output.code_mut(), -1)
            .map_err(|e| CodegenFault::emit(e, loc))?;
        let cond_jump_end = self.code_len();

        for stmt in body {
            self.gen_stmt(stmt)?;
        }

        let back_jump_at = self.code_len();
        let back_len = start as i64 - back_jump_at as i64;
        if back_len >= 0 {
            return Err(CodegenFault::new("loop back-jump is not negative.", loc));
        }
        generator::jump(self.output.code_mut(), back_len as i32)
            .map_err(|e| CodegenFault::emit(e, loc))?;
        let back_jump_end = self.code_len();

        let cond_len = back_jump_end as i64 - cond_jump_end as i64 + 1;
        if cond_len <= 0 {
            return Err(CodegenFault::new("loop exit jump is not positive.", loc));
        }
        let mut patched = Vec::new();
        generator::jump_on_zero(&mut patched, cond_len as i32)
            .map_err(|e| CodegenFault::emit(e, loc))?;
        generator::replace_code(self.output.code_mut(), cond_jump_at, &patched);
        Ok(())
    }

    fn gen_if(
        &mut self,
        loc: &TokenLoc,
        cond: &Expr,
        true_body: &[Stmt],
        false_body: &[Stmt],
    ) -> Result<(), CodegenFault> {
        self.gen_expr(cond, false)?;

        let false_jump_at = self.code_len();
        generator::jump_on_zero(self.output.code_mut(), 1)
            .map_err(|e| CodegenFault::emit(e, loc))?;
        let false_jump_end = self.code_len();

        for stmt in true_body {
            self.gen_stmt(stmt)?;
        }

        let end_jump_at = self.code_len();
        generator::jump(self.output.code_mut(), 1).map_err(|e| CodegenFault::emit(e, loc))?;
        let end_jump_end = self.code_len();

        let false_len = end_jump_end as i64 - false_jump_end as i64 + 1;
        if false_len <= 0 {
            return Err(CodegenFault::new("branch jump is not positive.", loc));
        }
        let mut patched = Vec::new();
        generator::jump_on_zero(&mut patched, false_len as i32)
            .map_err(|e| CodegenFault::emit(e, loc))?;
        generator::replace_code(self.output.code_mut(), false_jump_at, &patched);

        for stmt in false_body {
            self.gen_stmt(stmt)?;
        }

        let end_of_false = self.code_len();
        let end_len = end_of_false as i64 - end_jump_end as i64 + 1;
        if end_len <= 0 {
            return Err(CodegenFault::new("branch end jump is not positive.", loc));
        }
        let mut patched = Vec::new();
        generator::jump(&mut patched, end_len as i32).map_err(|e| CodegenFault::emit(e, loc))?;
        generator::replace_code(self.output.code_mut(), end_jump_at, &patched);
        Ok(())
    }

    fn gen_expr(&mut self, e: &Expr, lhs: bool) -> Result<(), CodegenFault> {
        match &e.kind {
            ExprKind::Cast(inner) => {
                let to = coerce_short(sig_char(e));
                let from = coerce_short(sig_char(inner));
                self.gen_expr(inner, lhs)?;
                if to != from {
                    generator::convert(self.output.code_mut(), from, to)
                        .map_err(|err| CodegenFault::emit(err, &e.loc))?;
                }
                Ok(())
            }
            ExprKind::GlobalVar(name) => {
                let tag = sig_char(e);
                let (code, literals) = self.output.emission_targets();
                if lhs {
                    generator::push_string(code, literals, name)
                } else {
                    generator::fetch_global(code, literals, tag, name)
                }
                .map_err(|err| CodegenFault::emit(err, &e.loc))
            }
            ExprKind::LocalVar(name) => {
                let lower = name.to_lowercase();
                let index = self
                    .output
                    .locals()
                    .get_index(&lower)
                    .ok_or_else(|| CodegenFault::new("local variable is missing from the table.", &e.loc))?;
                let tag = self.output.locals().get_type(&lower);
                let (code, literals) = self.output.emission_targets();
                if lhs {
                    generator::push_int(code, literals, index as i32)
                } else {
                    generator::fetch_local(code, tag, index)
                }
                .map_err(|err| CodegenFault::emit(err, &e.loc))
            }
            ExprKind::Journal(name) => {
                let ext = self
                    .context
                    .extensions()
                    .ok_or_else(|| CodegenFault::new("extensions registry is missing.", &e.loc))?;
                let keyword = ext.search_keyword("getjournalindex").ok_or_else(|| {
                    CodegenFault::new("getjournalindex is not registered.", &e.loc)
                })?;
                let (code, literals) = self.output.emission_targets();
                generator::push_string(code, literals, name)
                    .map_err(|err| CodegenFault::emit(err, &e.loc))?;
                ext.generate_function(keyword, code, literals, "", 0)
                    .map_err(|err| CodegenFault::emit(err, &e.loc))
            }
            ExprKind::MemberVar { module, name } => {
                let (tag, global) = self.context.member_type(name, module);
                let (code, literals) = self.output.emission_targets();
                if lhs {
                    generator::push_string(code, literals, name)
                        .and_then(|_| generator::push_string(code, literals, module))
                } else {
                    generator::fetch_member(code, literals, tag, name, module, global)
                }
                .map_err(|err| CodegenFault::emit(err, &e.loc))
            }
            ExprKind::FloatLit(value) => {
                let (code, literals) = self.output.emission_targets();
                generator::push_float(code, literals, *value)
                    .map_err(|err| CodegenFault::emit(err, &e.loc))
            }
            ExprKind::LongLit(value) => {
                let (code, literals) = self.output.emission_targets();
                generator::push_int(code, literals, *value)
                    .map_err(|err| CodegenFault::emit(err, &e.loc))
            }
            ExprKind::StringLit(value) => {
                let (code, literals) = self.output.emission_targets();
                generator::push_string(code, literals, value)
                    .map_err(|err| CodegenFault::emit(err, &e.loc))
            }
            ExprKind::Logic { op, left, right } => {
                let op_char = op.logic_char().ok_or_else(|| {
                    CodegenFault::new("invalid comparison operator.", &e.loc)
                })?;
                let lt = coerce_short(sig_char(left));
                let rt = coerce_short(sig_char(right));
                self.gen_expr(left, lhs)?;
                self.gen_expr(right, lhs)?;
                generator::compare(self.output.code_mut(), op_char, lt, rt)
                    .map_err(|err| CodegenFault::emit(err, &e.loc))
            }
            ExprKind::Math { op, left, right } => {
                let lt = coerce_short(sig_char(left));
                let rt = coerce_short(sig_char(right));
                self.gen_expr(left, lhs)?;
                self.gen_expr(right, lhs)?;
                let code = self.output.code_mut();
                match op {
                    BinOp::Plus => generator::add(code, lt, rt),
                    BinOp::Minus => generator::sub(code, lt, rt),
                    BinOp::Mult => generator::mul(code, lt, rt),
                    BinOp::Divide => generator::div(code, lt, rt),
                    _ => {
                        return Err(CodegenFault::new(
                            "invalid arithmetic operator.",
                            &e.loc,
                        ))
                    }
                }
                .map_err(|err| CodegenFault::emit(err, &e.loc))
            }
            ExprKind::Negate(inner) => {
                let tag = coerce_short(sig_char(e));
                self.gen_expr(inner, lhs)?;
                generator::negate(self.output.code_mut(), tag)
                    .map_err(|err| CodegenFault::emit(err, &e.loc))
            }
            ExprKind::Items(_) => Err(CodegenFault::new(
                "unresolved expression list reached code generation.",
                &e.loc,
            )),
            ExprKind::Call { callee, args } => {
                // reverse push: the callee expects its leftmost argument
                // on top of the stack
                for arg in args.iter().rev() {
                    self.gen_expr(arg, lhs)?;
                }
                self.gen_expr(callee, lhs)
            }
            ExprKind::Ref { .. } => self.gen_ref(e),
        }
    }

    /// Emit the callable a reference resolved to. A handful of core
    /// keywords have dedicated opcodes; everything else defers to the
    /// extensions registry.
    fn gen_ref(&mut self, e: &Expr) -> Result<(), CodegenFault> {
        let (base, offset) = match &e.kind {
            ExprKind::Ref { base, offset, .. } => (base, offset),
            _ => return Err(CodegenFault::new("not a reference.", &e.loc)),
        };

        let sig = e
            .sig
            .as_ref()
            .filter(|s| s.is_callable())
            .ok_or_else(|| {
                CodegenFault::new("reference without a callable signature.", &e.loc)
            })?;
        let optionals = sig.args().map_or(0, |a| a.optionals);
        let is_function = matches!(sig, TypeSig::Function { .. });

        let rstr = offset.coerce_string().ok_or_else(|| {
            CodegenFault::new("reference member is not a string.", &e.loc)
        })?;
        let lstr = base
            .as_ref()
            .and_then(|b| b.coerce_string())
            .unwrap_or_default();

        let rstr_lower = rstr.to_lowercase();
        let lstr_lower = lstr.to_lowercase();

        let ext = self
            .context
            .extensions()
            .ok_or_else(|| CodegenFault::new("extensions registry is missing.", &e.loc))?;

        let (code, literals) = self.output.emission_targets();
        let result = match rstr_lower.as_str() {
            "menumode" => {
                generator::menu_mode(code);
                Ok(())
            }
            "random" => {
                generator::random(code);
                Ok(())
            }
            "startscript" => generator::start_script(code, literals, &lstr_lower),
            "stopscript" => {
                generator::stop_script(code);
                Ok(())
            }
            "scriptrunning" => {
                generator::script_running(code);
                Ok(())
            }
            "getdistance" => generator::get_distance(code, literals, &lstr_lower),
            "getsecondspassed" => {
                generator::get_seconds_passed(code);
                Ok(())
            }
            "getdisabled" => generator::get_disabled(code, literals, &lstr_lower),
            "enable" => generator::enable(code, literals, &lstr_lower),
            "disable" => generator::disable(code, literals, &lstr_lower),
            "messagebox" => generator::message_box(code, optionals),
            "getsquareroot" => {
                generator::square_root(code);
                Ok(())
            }
            _ => {
                let keyword = ext.search_keyword(&rstr_lower).ok_or_else(|| {
                    CodegenFault::new(
                        &format!("unknown keyword '{}'.", rstr_lower),
                        &e.loc,
                    )
                })?;
                if is_function {
                    ext.generate_function(keyword, code, literals, &lstr_lower, optionals)
                } else {
                    ext.generate_instruction(keyword, code, literals, &lstr_lower, optionals)
                }
            }
        };
        result.map_err(|err| CodegenFault::emit(err, &e.loc))
    }
}
