//! # Semantic Analyzer
//!
//! Resolves a parsed module into a typed one.
//!
//! The surface language is untyped and ambiguous: a bare word may be a
//! local, a global, a journal id, a numeric literal, or a callable; calls
//! need no parentheses; `a.b` is either a member access or a float. The
//! analyzer settles all of it after parsing:
//!
//! - **Classification**: string atoms become variable references,
//!   literals or callables (in that priority order).
//! - **Reference resolution**: dotted and arrowed forms become member
//!   variables, float literals or explicitly-targeted builtins.
//! - **Call recovery**: adjacent atoms are matched against the leading
//!   callable's signature string and rebuilt as [`ExprKind::Call`] nodes,
//!   with MessageBox synthesizing its signature from its format string.
//! - **Coercion**: numeric arguments and assignment sources get
//!   [`ExprKind::Cast`] wrappers, with precision-loss warnings.
//!
//! Every expression ends up with a [`TypeSig`]. Node rewrites are
//! committed by assigning into the parent's `&mut Expr` slot; in immutable
//! mode (used to peek at a call head's type) only the signature is copied
//! back and the node is left alone.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::ast::{ArgsSig, BinOp, Expr, ExprKind, Module, Primitive, Stmt, TypeSig};
use crate::context::Context;
use crate::error::ErrorHandler;
use crate::locals::Locals;
use crate::token::TokenLoc;

/// Analyze a module in place. Diagnostics go to the handler; the caller
/// decides afterwards whether code generation may proceed.
pub fn analyze(
    module: &mut Module,
    context: &dyn Context,
    locals: &Locals,
    errors: &mut dyn ErrorHandler,
) {
    let mut analysis = ModuleAnalysis {
        context,
        locals,
        errors,
    };
    for stmt in &mut module.stmts {
        analysis.check_stmt(stmt);
    }
}

/// Per-visit behavior switches. These replace the visitor subclasses of a
/// classic double-dispatch design: one visit function, one context struct.
#[derive(Debug, Clone, Copy, Default)]
struct ExprFlags {
    /// Do not classify atoms as functions
    ignore_functions: bool,
    /// Do not classify atoms as instructions
    ignore_instructions: bool,
    /// Compute signatures only; never rewrite nodes
    immutable: bool,
}

impl ExprFlags {
    fn with_ignore_instructions(self) -> Self {
        ExprFlags {
            ignore_instructions: true,
            ..self
        }
    }

    fn with_ignore_calls(self) -> Self {
        ExprFlags {
            ignore_functions: true,
            ignore_instructions: true,
            ..self
        }
    }

    fn with_immutable(self) -> Self {
        ExprFlags {
            immutable: true,
            ..self
        }
    }
}

fn undefined() -> TypeSig {
    TypeSig::primitive(Primitive::Undefined)
}

fn is_number_str(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit())
}

fn parse_int_atom(s: &str) -> i32 {
    if s.is_empty() {
        return 0;
    }
    s.parse::<i64>()
        .map(|v| v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
        .unwrap_or(i32::MAX)
}

/// Synthesize a MessageBox signature from its printf-like format string:
/// the format itself, one slot per specifier, then 256 optional buttons.
/// `%f` keeps floats, `%g` takes integers, `%s` takes raw strings; `%%`
/// is a literal percent and precision is only recognized before `f`/`g`.
pub fn format_message_box(format: &str) -> String {
    let chars: Vec<char> = format.chars().collect();
    let mut result = String::from("S");
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            i += 1;
            continue;
        }
        let after = i + 1;
        if chars.get(after) == Some(&'%') {
            i = after + 1;
            continue;
        }
        // optional ".NN" precision, valid only before f/g
        let mut spec = after;
        if chars.get(spec) == Some(&'.') {
            let mut digits = spec + 1;
            while chars.get(digits).map_or(false, |c| c.is_ascii_digit()) {
                digits += 1;
            }
            if digits > spec + 1 {
                spec = digits;
            }
        }
        match chars.get(spec) {
            Some('f') | Some('F') => {
                result.push('f');
                i = spec + 1;
            }
            Some('g') | Some('G') => {
                result.push('l');
                i = spec + 1;
            }
            Some('s') | Some('S') if spec == after => {
                result.push('S');
                i = spec + 1;
            }
            _ => i = after,
        }
    }

    result.push('/');
    for _ in 0..256 {
        result.push('S');
    }
    result
}

struct ModuleAnalysis<'a> {
    context: &'a dyn Context,
    locals: &'a Locals,
    errors: &'a mut dyn ErrorHandler,
}

impl<'a> ModuleAnalysis<'a> {
    // === Statements ===

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            // Declarations were collected by the local-scan pass
            Stmt::TypeDecl { .. } => {}
            Stmt::NoOp { .. } | Stmt::Return { .. } => {}
            Stmt::Expr { expr, .. } => {
                self.check_expr(expr, ExprFlags::default());
            }
            Stmt::Set {
                loc,
                target,
                expr,
                valid,
            } => {
                // A bare identifier on the left is a variable, never a call
                self.check_expr(target, ExprFlags::default().with_ignore_calls());
                self.check_expr(expr, ExprFlags::default());

                let prim_l = target.sig_prim();
                let prim_r = expr.sig_prim();
                if prim_l.is_none() || prim_l == Some(Primitive::Undefined) {
                    self.errors
                        .error("Invalid set target. Must be a primitive.", loc);
                } else if prim_r.is_none() || prim_r == Some(Primitive::Undefined) {
                    self.errors
                        .error("Invalid set expression. Result must be a primitive.", loc);
                } else if prim_l == Some(Primitive::String) {
                    if target.coerce_string().is_some() {
                        self.errors.warning("Unknown target in set statement.", loc);
                    } else {
                        self.errors
                            .error("Unable to determine name for set statement.", loc);
                    }
                    *valid = false;
                } else if prim_l != prim_r {
                    let tag = prim_l.map_or(' ', |p| p.type_char());
                    self.arg_coerce(tag, expr);
                }
            }
            Stmt::If {
                loc,
                cond,
                true_body,
                false_body,
            } => {
                self.check_expr(cond, ExprFlags::default());
                if cond.sig_prim() != Some(Primitive::Bool) {
                    self.errors
                        .warning("Using non-boolean result for condition in if.", loc);
                }
                for s in true_body {
                    self.check_stmt(s);
                }
                for s in false_body {
                    self.check_stmt(s);
                }
            }
            Stmt::While { loc, cond, body } => {
                self.check_expr(cond, ExprFlags::default());
                if cond.sig_prim() != Some(Primitive::Bool) {
                    self.errors
                        .warning("Using non-boolean result for condition in while.", loc);
                }
                for s in body {
                    self.check_stmt(s);
                }
            }
        }
    }

    // === Expressions ===

    /// Analyze a binary/unary operand. A bare callable in operand
    /// position is a parenthesis-free call supplying the value, so it goes
    /// through call recovery.
    fn resolve_operand(&mut self, e: &mut Expr, flags: ExprFlags) {
        self.check_expr(e, flags);
        if e.sig_callable() {
            let items = Expr::new(e.loc.clone(), ExprKind::Items(alloc::vec![e.clone()]));
            self.commit(e, items, flags);
        }
    }

    /// Commit a candidate node into the slot: analyze it with the same
    /// flags, then either replace the slot or (immutable mode) copy the
    /// resulting signature back.
    fn commit(&mut self, slot: &mut Expr, mut candidate: Expr, flags: ExprFlags) {
        self.check_expr(&mut candidate, flags);
        if flags.immutable {
            slot.sig = candidate.sig;
        } else {
            *slot = candidate;
        }
    }

    fn check_expr(&mut self, e: &mut Expr, flags: ExprFlags) {
        match &mut e.kind {
            ExprKind::FloatLit(_) => {
                e.sig = Some(TypeSig::primitive(Primitive::Float));
            }
            ExprKind::LongLit(value) => {
                // Small integers pass as shorts; the split matters only
                // for coercion warnings, the runtime width is shared.
                let prim = if *value > -(1 << 16) && *value < (1 << 16) {
                    Primitive::Short
                } else {
                    Primitive::Long
                };
                e.sig = Some(TypeSig::primitive(prim));
            }
            ExprKind::Journal(_) => {
                e.sig = Some(TypeSig::primitive(Primitive::Short));
            }
            ExprKind::GlobalVar(_) => self.check_global(e),
            ExprKind::LocalVar(_) => self.check_local(e),
            ExprKind::MemberVar { .. } => self.check_member(e),
            ExprKind::Cast(_) => {
                // Cast nodes are born with their target signature
                if e.sig.is_none() {
                    self.errors
                        .error("Serious error: cast without a target type.", &e.loc);
                    e.sig = Some(undefined());
                }
            }
            ExprKind::Math { left, right, .. } => {
                let sub = flags.with_ignore_instructions();
                self.resolve_operand(left, sub);
                self.resolve_operand(right, sub);
                let sig = self.bin_coerce(left, right);
                e.sig = Some(sig);
            }
            ExprKind::Logic { left, right, .. } => {
                let sub = flags.with_ignore_instructions();
                self.resolve_operand(left, sub);
                self.resolve_operand(right, sub);
                // operand check only; comparisons always yield BOOL
                self.bin_coerce(left, right);
                e.sig = Some(TypeSig::primitive(Primitive::Bool));
            }
            ExprKind::Negate(inner) => {
                let sub = flags.with_ignore_instructions();
                self.resolve_operand(inner, sub);
                if !inner.sig.as_ref().map_or(false, |s| s.is_numeric()) {
                    self.errors.error("Negation of non-numeric type.", &e.loc);
                }
                e.sig = inner.sig.clone();
            }
            ExprKind::StringLit(_) => self.check_string_atom(e, flags),
            ExprKind::Ref { .. } => self.check_ref(e, flags),
            ExprKind::Items(_) => self.check_items(e, flags),
            ExprKind::Call { .. } => self.check_call(e, flags),
        }
    }

    fn check_global(&mut self, e: &mut Expr) {
        if e.sig.is_some() {
            return;
        }
        let name = match &e.kind {
            ExprKind::GlobalVar(name) => name.clone(),
            _ => return,
        };
        let tag = self.context.global_type(&name);
        if tag == ' ' {
            self.errors
                .error("Serious error: global variable not found.", &e.loc);
            e.sig = Some(undefined());
        } else {
            e.sig = Some(TypeSig::from_char(tag));
        }
    }

    fn check_local(&mut self, e: &mut Expr) {
        if e.sig.is_some() {
            return;
        }
        let name = match &e.kind {
            ExprKind::LocalVar(name) => name.clone(),
            _ => return,
        };
        let tag = self.locals.get_type(&name);
        if tag == ' ' {
            self.errors
                .error("Serious error: local variable not found.", &e.loc);
            e.sig = Some(undefined());
        } else {
            e.sig = Some(TypeSig::from_char(tag));
        }
    }

    fn check_member(&mut self, e: &mut Expr) {
        let (module, name) = match &e.kind {
            ExprKind::MemberVar { module, name } => (module.clone(), name.clone()),
            _ => return,
        };
        let (tag, global) = self.context.member_type(&name, &module);
        e.sig = Some(TypeSig::Primitive {
            prim: Primitive::from_char(tag),
            global_member: global,
        });
    }

    /// Classify a bare string atom. Order: extension keyword, local,
    /// global, numeric literal, journal id; otherwise it stays a string.
    fn check_string_atom(&mut self, e: &mut Expr, flags: ExprFlags) {
        let value = match &e.kind {
            ExprKind::StringLit(s) => s.clone(),
            _ => return,
        };
        let ctx = self.context;
        let ext = match ctx.extensions() {
            Some(ext) => ext,
            None => {
                e.sig = Some(undefined());
                return;
            }
        };

        let lower = value.to_lowercase();
        if let Some(keyword) = ext.search_keyword(&lower) {
            if !flags.ignore_functions {
                if let Some(f) = ext.function(keyword) {
                    e.sig = Some(TypeSig::Function {
                        args: ArgsSig::new(f.args),
                        ret: f.ret,
                    });
                    return;
                }
            }
            if !flags.ignore_instructions {
                if let Some(i) = ext.instruction(keyword) {
                    let args = if lower == "messagebox" {
                        ArgsSig::message_box(i.args)
                    } else {
                        ArgsSig::new(i.args)
                    };
                    e.sig = Some(TypeSig::Instruction { args });
                    return;
                }
            }
        }

        if self.locals.get_type(&lower) != ' ' {
            let candidate = Expr::new(e.loc.clone(), ExprKind::LocalVar(lower));
            self.commit(e, candidate, flags);
        } else if ctx.global_type(&value) != ' ' {
            let candidate = Expr::new(e.loc.clone(), ExprKind::GlobalVar(lower));
            self.commit(e, candidate, flags);
        } else if is_number_str(&value) {
            let candidate = Expr::new(e.loc.clone(), ExprKind::LongLit(parse_int_atom(&value)));
            self.commit(e, candidate, flags);
        } else if ctx.is_journal_id(&value) {
            let candidate = Expr::new(e.loc.clone(), ExprKind::Journal(value));
            self.commit(e, candidate, flags);
        } else {
            e.sig = Some(TypeSig::primitive(Primitive::String));
        }
    }

    /// Resolve a `base op offset` reference (or the implicit form).
    fn check_ref(&mut self, e: &mut Expr, flags: ExprFlags) {
        let loc = e.loc.clone();
        let (op, base, offset) = match &e.kind {
            ExprKind::Ref { op, base, offset } => (
                *op,
                base.as_ref().map(|b| (b.coerce_string(), b.loc.clone())),
                (offset.coerce_string(), offset.loc.clone(), (**offset).clone()),
            ),
            _ => return,
        };
        let (offset_str, offset_loc, offset_expr) = offset;

        let rstr = match offset_str {
            Some(s) => s,
            None => {
                self.errors.error("Not a string type.", &offset_loc);
                e.sig = Some(undefined());
                return;
            }
        };

        let ctx = self.context;

        // Implicit form: a single atom that may name a builtin
        let (lstr, base_loc) = match base {
            None => {
                let ext = match ctx.extensions() {
                    Some(ext) => ext,
                    None => {
                        self.errors.error("Missing extensions registry.", &loc);
                        e.sig = Some(undefined());
                        return;
                    }
                };
                let lower = rstr.to_lowercase();
                match ext.search_keyword(&lower) {
                    None => self.commit(e, offset_expr, flags),
                    Some(keyword) => {
                        if !flags.ignore_functions {
                            if let Some(f) = ext.function(keyword) {
                                e.sig = Some(TypeSig::Function {
                                    args: ArgsSig::new(f.args),
                                    ret: f.ret,
                                });
                                return;
                            }
                        }
                        if !flags.ignore_instructions {
                            if let Some(i) = ext.instruction(keyword) {
                                if lower == "messagebox" && e.sig.is_some() {
                                    // keep a synthesized MessageBox
                                    // signature from a previous pass
                                    return;
                                }
                                let args = if lower == "messagebox" {
                                    ArgsSig::message_box(i.args)
                                } else {
                                    ArgsSig::new(i.args)
                                };
                                e.sig = Some(TypeSig::Instruction { args });
                                return;
                            }
                        }
                        self.commit(e, offset_expr, flags);
                    }
                }
                return;
            }
            Some((base_str, base_loc)) => match base_str {
                Some(s) => (s, base_loc),
                None => {
                    self.errors.error("Not a string type.", &offset_loc);
                    e.sig = Some(undefined());
                    return;
                }
            },
        };

        match op {
            BinOp::Dot => {
                let (member_tag, _) = ctx.member_type(&rstr, &lstr);
                if member_tag != ' ' {
                    let candidate = Expr::new(
                        loc,
                        ExprKind::MemberVar {
                            module: lstr,
                            name: rstr,
                        },
                    );
                    self.commit(e, candidate, flags);
                } else if is_number_str(&lstr) && is_number_str(&rstr) {
                    // not a member at all: a floating-point literal split
                    // across the dot
                    let text = alloc::format!("{}.{}", lstr, rstr);
                    let value = text.parse::<f32>().unwrap_or(0.0);
                    let candidate = Expr::new(loc, ExprKind::FloatLit(value));
                    self.commit(e, candidate, flags);
                } else {
                    self.errors.error("Invalid member reference.", &base_loc);
                    e.sig = Some(undefined());
                }
            }
            BinOp::Arrow => {
                let ext = match ctx.extensions() {
                    Some(ext) => ext,
                    None => {
                        self.errors.error("Missing extensions registry.", &base_loc);
                        e.sig = Some(undefined());
                        return;
                    }
                };
                if !ctx.is_id(&lstr) {
                    self.errors
                        .error("Unknown id on left side of '->'.", &base_loc);
                    e.sig = Some(undefined());
                    return;
                }
                let keyword = match ext.search_keyword(&rstr.to_lowercase()) {
                    Some(keyword) => keyword,
                    None => {
                        self.errors
                            .error("Unknown keyword on right side of '->'.", &offset_loc);
                        e.sig = Some(undefined());
                        return;
                    }
                };
                if let Some(f) = ext.function(keyword) {
                    let needs_explicit = f.needs_explicit;
                    e.sig = Some(TypeSig::Function {
                        args: ArgsSig::new(f.args),
                        ret: f.ret,
                    });
                    if !needs_explicit {
                        self.discard_explicit_base(e, &loc);
                    }
                } else if let Some(i) = ext.instruction(keyword) {
                    let needs_explicit = i.needs_explicit;
                    e.sig = Some(TypeSig::Instruction {
                        args: ArgsSig::new(i.args),
                    });
                    if !needs_explicit {
                        self.discard_explicit_base(e, &loc);
                    }
                } else {
                    self.errors.error("Unknown reference type.", &loc);
                    e.sig = Some(undefined());
                }
            }
            _ => {
                self.errors.error("Unhandled expression reference.", &loc);
                e.sig = Some(undefined());
            }
        }
    }

    fn discard_explicit_base(&mut self, e: &mut Expr, loc: &TokenLoc) {
        self.errors
            .warning("Discarding unneeded explicit reference.", loc);
        if let ExprKind::Ref { base, .. } = &mut e.kind {
            *base = None;
        }
    }

    /// Rewrite an item list into a call (or a single expression).
    fn check_items(&mut self, e: &mut Expr, flags: ExprFlags) {
        let mut items = match &mut e.kind {
            ExprKind::Items(items) => core::mem::take(items),
            _ => return,
        };
        if items.is_empty() {
            self.errors.error("Unable to parse expression.", &e.loc);
            e.sig = Some(undefined());
            return;
        }

        let mut pos = 0;
        match self.process_fn(&mut items, &mut pos, flags, true) {
            Some(mut resolved) => {
                self.check_expr(&mut resolved, flags);
                if flags.immutable {
                    if let ExprKind::Items(slot) = &mut e.kind {
                        *slot = items;
                    }
                    e.sig = resolved.sig;
                } else {
                    *e = resolved;
                }
            }
            None => {
                let at = items
                    .get(pos)
                    .map(|i| i.loc.clone())
                    .unwrap_or_else(|| e.loc.clone());
                self.errors.error("Unable to parse expression.", &at);
                if let ExprKind::Items(slot) = &mut e.kind {
                    *slot = items;
                }
                e.sig = Some(undefined());
            }
        }
    }

    /// Call-shape recovery. Walks the item list with one cursor and the
    /// head's signature string with another; consumed items become the
    /// call's arguments. At top level a remainder may continue as an
    /// implicit subtraction (`<call> -x` parses as a negated atom).
    fn process_fn(
        &mut self,
        items: &mut Vec<Expr>,
        pos: &mut usize,
        flags: ExprFlags,
        toplevel: bool,
    ) -> Option<Expr> {
        // Peek at the head's type without committing any rewrite
        self.check_expr(&mut items[*pos], flags.with_immutable());

        let mut new_expr: Option<Expr> = None;
        let mut remainder = false;

        if items[*pos].sig_callable() {
            let is_message_box = items[*pos]
                .sig
                .as_ref()
                .and_then(|s| s.args())
                .map_or(false, |a| a.message_box);
            if is_message_box && *pos + 1 < items.len() {
                if let Some(format) = items[*pos + 1].coerce_string() {
                    if let Some(args) = items[*pos].sig.as_mut().and_then(|s| s.args_mut()) {
                        args.args = format_message_box(&format);
                    }
                }
            }

            let sig_args: String = items[*pos]
                .sig
                .as_ref()
                .and_then(|s| s.args())
                .map(|a| a.args.clone())
                .unwrap_or_default();

            let mut sub_pos = *pos + 1;
            let mut sig_pos = 0usize;
            let mut optional = false;
            let consumed =
                self.process_args(items, &mut sub_pos, &sig_args, &mut sig_pos, &mut optional, flags);

            let head = items[*pos].clone();
            let call = Expr::new(
                head.loc.clone(),
                ExprKind::Call {
                    callee: Box::new(head),
                    args: consumed,
                },
            );

            if (sig_pos == sig_args.len() || optional) && (!toplevel || sub_pos == items.len()) {
                *pos = sub_pos;
                return Some(call);
            }
            // signature not satisfied, or items left over at top level
            *pos = sub_pos;
            new_expr = Some(call);
            remainder = true;
        }

        if *pos >= items.len() {
            return new_expr;
        }

        let next_is_negate = matches!(items[*pos].kind, ExprKind::Negate(_));
        if (remainder && next_is_negate) || !remainder {
            if !remainder {
                new_expr = Some(items[*pos].clone());
                *pos += 1;
            }
            if *pos < items.len() {
                let loc = items[*pos].loc.clone();
                if let ExprKind::Negate(inner) = items[*pos].kind.clone() {
                    // `a -b` is a subtraction whose right side hides in
                    // the negation
                    items[*pos] = *inner;
                    match self.process_fn(items, pos, flags, false) {
                        Some(right) => {
                            if let Some(left) = new_expr.take() {
                                new_expr = Some(Expr::new(
                                    loc,
                                    ExprKind::Math {
                                        op: BinOp::Minus,
                                        left: Box::new(left),
                                        right: Box::new(right),
                                    },
                                ));
                            }
                        }
                        None => return new_expr,
                    }
                } else {
                    // leftover atoms with no way to attach them
                    return new_expr;
                }
                *pos += 1;
            }
        } else {
            let at = items
                .get(*pos)
                .map(|i| i.loc.clone())
                .unwrap_or_default();
            self.errors
                .error("Call does not begin with an instruction or function.", &at);
        }

        new_expr
    }

    /// Consume items to fill one signature string. Returns the consumed
    /// arguments; cursors are advanced for the caller.
    fn process_args(
        &mut self,
        items: &mut Vec<Expr>,
        pos: &mut usize,
        sig: &str,
        sig_pos: &mut usize,
        optional: &mut bool,
        flags: ExprFlags,
    ) -> Vec<Expr> {
        let bytes = sig.as_bytes();
        let mut out = Vec::new();

        // catch a leading optional marker even when no optional item
        // follows
        if bytes.get(*sig_pos) == Some(&b'/') {
            *optional = true;
        }

        while *sig_pos < bytes.len() && *pos < items.len() {
            match bytes[*sig_pos] {
                b'/' => {
                    *optional = true;
                }
                b'c' | b'S' => {
                    // strings are taken literally; no callable returns one
                    out.push(items[*pos].clone());
                    *pos += 1;
                }
                b'f' | b'l' | b's' => {
                    self.check_expr(&mut items[*pos], flags);
                    let mut arg = if items[*pos].sig_callable() {
                        // a nested parenthesis-free call supplies this
                        // argument
                        let fallback = items[*pos].clone();
                        match self.process_fn(items, pos, flags, false) {
                            Some(mut call) => {
                                self.check_expr(&mut call, flags);
                                call
                            }
                            None => fallback,
                        }
                    } else {
                        let arg = items[*pos].clone();
                        *pos += 1;
                        arg
                    };
                    self.arg_coerce(bytes[*sig_pos] as char, &mut arg);
                    out.push(arg);
                }
                b'x' | b'X' | b'z' => {
                    // ignored filler, consumed without analysis
                    out.push(items[*pos].clone());
                    *pos += 1;
                }
                b'j' => {
                    // journal slot: filled by the runtime, takes no item
                }
                _ => {}
            }
            *sig_pos += 1;
        }

        // trailing filler and optional markers need no items
        while *sig_pos < bytes.len() {
            match bytes[*sig_pos] {
                b'x' | b'X' | b'z' => *sig_pos += 1,
                b'/' => {
                    *optional = true;
                    *sig_pos += 1;
                }
                _ => break,
            }
        }

        out
    }

    /// Validate a recovered call against its signature: string arguments
    /// are frozen (and lowercased for `c`), numeric arguments coerced,
    /// extras reported, optionals counted onto the callee's signature.
    fn check_call(&mut self, e: &mut Expr, flags: ExprFlags) {
        let loc = e.loc.clone();
        let (mut callee, mut items) = match &mut e.kind {
            ExprKind::Call { callee, args } => (
                core::mem::replace(
                    &mut **callee,
                    Expr::new(TokenLoc::default(), ExprKind::Items(Vec::new())),
                ),
                core::mem::take(args),
            ),
            _ => return,
        };

        self.check_expr(&mut callee, flags);

        if !callee.sig_callable() {
            if items.is_empty() {
                // not a call after all: collapse to the callee
                if flags.immutable {
                    e.sig = callee.sig.clone();
                    e.kind = ExprKind::Call {
                        callee: Box::new(callee),
                        args: items,
                    };
                } else {
                    *e = callee;
                }
            } else {
                if flags.ignore_instructions {
                    self.errors
                        .error("Invalid context for instruction call.", &loc);
                } else {
                    self.errors.error("Unknown instruction or function call.", &loc);
                }
                e.kind = ExprKind::Call {
                    callee: Box::new(callee),
                    args: items,
                };
                e.sig = Some(undefined());
            }
            return;
        }

        let sig_args: String = callee
            .sig
            .as_ref()
            .and_then(|s| s.args())
            .map(|a| a.args.clone())
            .unwrap_or_default();
        let bytes = sig_args.as_bytes();

        let mut final_items: Vec<Expr> = Vec::new();
        let mut optionals = 0usize;
        let mut entered_optionals = false;
        let mut sig_pos = 0usize;
        let mut it = 0usize;

        while it < items.len() && sig_pos < bytes.len() {
            let mut c = bytes[sig_pos];
            if c == b'/' {
                entered_optionals = true;
                sig_pos += 1;
                match bytes.get(sig_pos) {
                    Some(next) => c = *next,
                    None => break,
                }
            }
            match c {
                b'c' | b'S' => {
                    if entered_optionals {
                        optionals += 1;
                    }
                    match items[it].coerce_string() {
                        None => {
                            self.errors
                                .error("Argument is not a string.", &items[it].loc);
                        }
                        Some(value) => {
                            let value = if c == b'c' {
                                value.to_lowercase()
                            } else {
                                value
                            };
                            // freeze as a plain string literal; it must
                            // not be reclassified
                            items[it] = Expr::with_sig(
                                items[it].loc.clone(),
                                TypeSig::primitive(Primitive::String),
                                ExprKind::StringLit(value),
                            );
                        }
                    }
                    final_items.push(items[it].clone());
                }
                b'x' | b'X' | b'j' | b'z' => {
                    self.errors
                        .warning("Extra argument is ignored.", &items[it].loc);
                    items[it].sig = Some(undefined());
                }
                b'f' | b's' | b'l' => {
                    if entered_optionals {
                        optionals += 1;
                    }
                    self.check_expr(&mut items[it], flags);
                    self.arg_coerce(c as char, &mut items[it]);
                    final_items.push(items[it].clone());
                }
                _ => {}
            }
            it += 1;
            sig_pos += 1;
        }

        while it < items.len() {
            if !entered_optionals {
                self.errors.error("Extra argument is ignored.", &loc);
            } else {
                self.errors.warning("Extra argument is ignored.", &loc);
                optionals += 1;
            }
            items[it].sig = Some(undefined());
            it += 1;
        }

        while sig_pos < bytes.len() {
            match bytes[sig_pos] {
                b'/' => entered_optionals = true,
                b'z' | b'x' | b'X' | b'j' => {}
                _ => {
                    if !entered_optionals {
                        self.errors.error("Missing required argument.", &loc);
                    }
                }
            }
            sig_pos += 1;
        }

        if let Some(args) = callee.sig.as_mut().and_then(|s| s.args_mut()) {
            args.optionals = optionals;
        }

        let result_sig = match callee.sig.as_ref() {
            Some(TypeSig::Function { ret, .. }) => TypeSig::from_char(*ret),
            _ => undefined(),
        };

        e.kind = ExprKind::Call {
            callee: Box::new(callee),
            args: final_items,
        };
        e.sig = Some(result_sig);
    }

    // === Coercion ===

    /// Numeric type lattice for binary operands: float wins, then long,
    /// then short. Non-numeric operands are errors.
    fn bin_coerce(&mut self, e1: &Expr, e2: &Expr) -> TypeSig {
        let (p1, p2) = match (e1.sig_prim(), e2.sig_prim()) {
            (Some(p1), Some(p2)) => (p1, p2),
            _ => {
                if e1.sig.is_none() || e2.sig.is_none() {
                    self.errors
                        .error("Unable to type check expression.", &e1.loc);
                } else {
                    self.errors
                        .error("Non-numeric operand in binary expression.", &e1.loc);
                }
                return undefined();
            }
        };
        if !p1.is_numeric() || !p2.is_numeric() {
            self.errors
                .error("Non-numeric operand in binary expression.", &e1.loc);
            return undefined();
        }
        let prim = if p1 == p2 {
            p1
        } else if p1 == Primitive::Float || p2 == Primitive::Float {
            Primitive::Float
        } else if p1 == Primitive::Long || p2 == Primitive::Long {
            Primitive::Long
        } else {
            Primitive::Short
        };
        TypeSig::primitive(prim)
    }

    /// Coerce an expression to the numeric type demanded by a signature
    /// character, inserting a cast node when the types differ.
    fn arg_coerce(&mut self, c: char, e: &mut Expr) {
        match c {
            'f' | 'l' | 's' => {
                let target = Primitive::from_char(c);
                match e.sig_prim() {
                    None => {
                        self.errors
                            .error("Non-primitive type passed as argument.", &e.loc);
                    }
                    Some(p) if p == target => {}
                    Some(Primitive::String) | Some(Primitive::Undefined) => {
                        self.errors.error(
                            "String or undefined type cannot be cast to a number.",
                            &e.loc,
                        );
                    }
                    Some(from) => {
                        self.cast_warning(target, from, &e.loc);
                        let loc = e.loc.clone();
                        let inner = core::mem::replace(
                            e,
                            Expr::new(loc.clone(), ExprKind::Items(Vec::new())),
                        );
                        *e = Expr::with_sig(
                            loc,
                            TypeSig::primitive(target),
                            ExprKind::Cast(Box::new(inner)),
                        );
                    }
                }
            }
            // strings are already in their final form
            'c' | 'S' => {}
            _ => {}
        }
    }

    fn cast_warning(&mut self, to: Primitive, from: Primitive, loc: &TokenLoc) {
        if !to.is_numeric() || !from.is_numeric() {
            self.errors.error("Cast of non-numeric type.", loc);
        } else if to == from || to == Primitive::Float {
            // widening or identity: no warning
        } else if (to == Primitive::Long || to == Primitive::Short) && from == Primitive::Float {
            self.errors.warning(
                "Casting float to long/short. Possible loss of precision.",
                loc,
            );
        } else if to == Primitive::Short
            && (from == Primitive::Float || from == Primitive::Long)
        {
            self.errors.warning(
                "Casting long/float to short. Possible loss of precision.",
                loc,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TableContext;
    use crate::error::{ErrorLog, WarningMode};
    use crate::extensions::Extensions;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::scan_locals;

    fn world() -> TableContext {
        let mut ext = Extensions::new();
        ext.register_instruction("MessageBox", "S", 0x220, None);
        ext.register_instruction("Journal", "cl", 0x221, None);
        ext.register_function("GetDistance", 'f', "c", 0x200, Some(0x201));
        ext.register_function("GetSquareRoot", 'f', "f", 0x202, None);
        ext.register_function("GetHealth", 'f', "", 0x203, Some(0x204));
        ext.register_function("GetJournalIndex", 'l', "j", 0x205, None);
        ext.register_instruction("PlaceAt", "cll/l", 0x222, Some(0x223));

        let mut ctx = TableContext::with_extensions(ext);
        ctx.add_global("GameHour", 'f');
        ctx.add_global("Day", 'l');
        ctx.add_member("guild_ledger", "strength", 's', false);
        ctx.add_journal("quest_rats");
        ctx.add_id("player");
        ctx.add_id("rat");
        ctx
    }

    fn analyze_source(source: &str) -> (Module, ErrorLog) {
        let ctx = world();
        let mut errors = ErrorLog::new(WarningMode::Normal);
        let tokens = Lexer::new(source, "test").tokenize(&mut errors);
        let mut module = Parser::parse(tokens, "test", &mut errors).expect("parse failed");
        let mut locals = Locals::new();
        scan_locals::scan(&module, &mut locals, &mut errors);
        analyze(&mut module, &ctx, &locals, &mut errors);
        (module, errors)
    }

    fn stmt_expr(module: &Module, index: usize) -> &Expr {
        match &module.stmts[index] {
            Stmt::Expr { expr, .. } => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_format_message_box() {
        let sig = format_message_box("score %g of %.2f for %s, %d%% done");
        assert!(sig.starts_with("SlfS/"));
        assert_eq!(sig.len(), "SlfS/".len() + 256);
        assert!(sig.ends_with("SSS"));
    }

    #[test]
    fn test_format_message_box_idempotent_on_canonical() {
        let canonical = format_message_box("plain text");
        assert_eq!(format_message_box(&canonical), canonical);
    }

    #[test]
    fn test_local_classification() {
        let (module, errors) = analyze_source("short x\nset x to 5\n");
        assert!(errors.is_good());
        match &module.stmts[1] {
            Stmt::Set { target, expr, .. } => {
                assert!(matches!(&target.kind, ExprKind::LocalVar(n) if n == "x"));
                assert_eq!(target.sig_prim(), Some(Primitive::Short));
                assert!(matches!(&expr.kind, ExprKind::LongLit(5)));
            }
            other => panic!("expected set, got {:?}", other),
        }
    }

    #[test]
    fn test_global_classification() {
        let (module, errors) = analyze_source("set GameHour to 10\n");
        assert!(errors.is_good());
        match &module.stmts[0] {
            Stmt::Set { target, expr, .. } => {
                assert!(matches!(&target.kind, ExprKind::GlobalVar(n) if n == "gamehour"));
                assert_eq!(target.sig_prim(), Some(Primitive::Float));
                // short literal cast up to float
                assert!(matches!(&expr.kind, ExprKind::Cast(_)));
                assert_eq!(expr.sig_prim(), Some(Primitive::Float));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_local_shadows_global() {
        let ctx = {
            let mut c = world();
            c.add_global("stage", 'l');
            c
        };
        let mut errors = ErrorLog::new(WarningMode::Normal);
        let tokens = Lexer::new("short stage\nset stage to 1\n", "test").tokenize(&mut errors);
        let mut module = Parser::parse(tokens, "test", &mut errors).unwrap();
        let mut locals = Locals::new();
        scan_locals::scan(&module, &mut locals, &mut errors);
        analyze(&mut module, &ctx, &locals, &mut errors);
        match &module.stmts[1] {
            Stmt::Set { target, .. } => {
                assert!(matches!(&target.kind, ExprKind::LocalVar(_)));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_journal_id_classification() {
        let (module, errors) = analyze_source("short x\nset x to quest_rats\n");
        assert!(errors.is_good());
        match &module.stmts[1] {
            Stmt::Set { expr, .. } => {
                assert!(matches!(&expr.kind, ExprKind::Journal(_)));
                assert_eq!(expr.sig_prim(), Some(Primitive::Short));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_undeclared_set_target_is_reported_and_ignored() {
        let (module, errors) = analyze_source("set x to 1.5\n");
        assert!(errors
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("Unknown target in set statement")));
        match &module.stmts[0] {
            Stmt::Set { valid, .. } => assert!(!*valid),
            _ => unreachable!(),
        }
        // strict mode turns the same diagnostic into a failure
        let ctx = world();
        let mut strict = ErrorLog::new(WarningMode::Strict);
        let tokens = Lexer::new("set x to 1.5\n", "test").tokenize(&mut strict);
        let mut module = Parser::parse(tokens, "test", &mut strict).unwrap();
        let mut locals = Locals::new();
        scan_locals::scan(&module, &mut locals, &mut strict);
        analyze(&mut module, &ctx, &locals, &mut strict);
        assert!(!strict.is_good());
    }

    #[test]
    fn test_unknown_string_target_is_warning_and_ignored() {
        // a plain name target demotes to a warning and the statement is
        // marked invalid
        let (module, errors) = analyze_source("set nowhere to 5\n");
        assert!(errors.is_good());
        assert!(errors
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("Unknown target in set statement")));
        match &module.stmts[0] {
            Stmt::Set { valid, .. } => assert!(!*valid),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_float_literal_recovery() {
        let (module, errors) = analyze_source("float f\nset f to 3.14\n");
        assert!(errors.is_good());
        match &module.stmts[1] {
            Stmt::Set { expr, .. } => {
                match &expr.kind {
                    ExprKind::FloatLit(v) => assert!((*v - 3.14).abs() < 1e-6),
                    other => panic!("expected float literal, got {:?}", other),
                }
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_member_reference() {
        let (module, errors) = analyze_source("short x\nset x to guild_ledger.strength\n");
        assert!(errors.is_good());
        match &module.stmts[1] {
            Stmt::Set { expr, .. } => {
                assert!(matches!(&expr.kind, ExprKind::MemberVar { .. }));
                assert_eq!(expr.sig_prim(), Some(Primitive::Short));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_invalid_member_reference() {
        let (_, errors) = analyze_source("short x\nset x to guild_ledger.missing\n");
        assert!(!errors.is_good());
        assert!(errors
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("Invalid member reference")));
    }

    #[test]
    fn test_arrow_explicit_retained() {
        let (module, errors) = analyze_source("Player->GetDistance Rat\n");
        assert!(errors.is_good());
        let expr = stmt_expr(&module, 0);
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                assert_eq!(args.len(), 1);
                match &callee.kind {
                    ExprKind::Ref { base, .. } => assert!(base.is_some()),
                    other => panic!("expected ref callee, got {:?}", other),
                }
                assert!(matches!(
                    callee.sig,
                    Some(TypeSig::Function { .. })
                ));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_arrow_unneeded_explicit_dropped() {
        let (module, errors) = analyze_source("short x\nset x to Player->GetSquareRoot 25\n");
        assert!(errors.is_good());
        assert!(errors
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("Discarding unneeded explicit reference")));
        match &module.stmts[1] {
            Stmt::Set { expr, .. } => match &expr.kind {
                ExprKind::Cast(inner) => match &inner.kind {
                    ExprKind::Call { callee, .. } => match &callee.kind {
                        ExprKind::Ref { base, .. } => assert!(base.is_none()),
                        other => panic!("expected ref callee, got {:?}", other),
                    },
                    other => panic!("expected call, got {:?}", other),
                },
                other => panic!("expected cast of call, got {:?}", other),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_arrow_unknown_id_is_error() {
        let (_, errors) = analyze_source("Ghost->GetDistance Rat\n");
        assert!(!errors.is_good());
        assert!(errors
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("Unknown id on left side")));
    }

    #[test]
    fn test_message_box_signature_synthesis() {
        let (module, errors) = analyze_source("MessageBox \"score %g\", 42\n");
        assert!(errors.is_good());
        let expr = stmt_expr(&module, 0);
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                assert_eq!(args.len(), 2);
                let sig = callee.sig.as_ref().unwrap().args().unwrap();
                assert!(sig.args.starts_with("Sl/"));
                assert_eq!(sig.optionals, 0);
                // the format is frozen as a raw string, the value coerced
                // to long
                assert!(matches!(&args[0].kind, ExprKind::StringLit(s) if s == "score %g"));
                assert!(matches!(&args[1].kind, ExprKind::Cast(_)));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_message_box_buttons_count_as_optionals() {
        let (module, errors) = analyze_source("MessageBox \"pick\", \"a\", \"b\"\n");
        assert!(errors.is_good());
        let expr = stmt_expr(&module, 0);
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                assert_eq!(args.len(), 3);
                let sig = callee.sig.as_ref().unwrap().args().unwrap();
                assert_eq!(sig.optionals, 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_call_with_optional_unfilled() {
        let (module, errors) = analyze_source("PlaceAt rat 1 2\n");
        assert!(errors.is_good());
        let expr = stmt_expr(&module, 0);
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                assert_eq!(args.len(), 3);
                let sig = callee.sig.as_ref().unwrap().args().unwrap();
                assert_eq!(sig.optionals, 0);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_missing_required_argument() {
        let (_, errors) = analyze_source("PlaceAt rat\n");
        assert!(!errors.is_good());
        assert!(errors
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("Missing required argument")));
    }

    #[test]
    fn test_nested_call_argument() {
        let (module, errors) = analyze_source("float f\nset f to GetSquareRoot GetHealth\n");
        assert!(errors.is_good());
        match &module.stmts[1] {
            Stmt::Set { expr, .. } => match &expr.kind {
                ExprKind::Call { args, .. } => {
                    assert_eq!(args.len(), 1);
                    assert!(matches!(&args[0].kind, ExprKind::Call { .. }));
                }
                other => panic!("expected call, got {:?}", other),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_math_coercion_widening_no_warning() {
        let (module, errors) = analyze_source("short x\nfloat f\nset f to 3.14 + x\n");
        assert!(errors.is_good());
        assert_eq!(errors.warning_count(), 0);
        match &module.stmts[2] {
            Stmt::Set { expr, .. } => {
                assert_eq!(expr.sig_prim(), Some(Primitive::Float));
                assert!(matches!(&expr.kind, ExprKind::Math { .. }));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_precision_loss_warning() {
        let (_, errors) = analyze_source("short x\nset x to GameHour\n");
        assert!(errors.is_good());
        assert!(errors
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("Possible loss of precision")));
    }

    #[test]
    fn test_condition_bool_check() {
        let (_, errors) = analyze_source("short x\nif ( x == 1 )\nreturn\nendif\n");
        assert!(errors.is_good());
        assert_eq!(errors.warning_count(), 0);

        let (_, errors) = analyze_source("short x\nif x\nreturn\nendif\n");
        assert!(errors.is_good());
        assert!(errors
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("non-boolean result for condition in if")));
    }

    #[test]
    fn test_string_in_arithmetic_is_error() {
        let (_, errors) = analyze_source("short x\nset x to \"word\" + 1\n");
        assert!(!errors.is_good());
        assert!(errors
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("Non-numeric operand")));
    }

    #[test]
    fn test_negate_numeric() {
        let (module, errors) = analyze_source("short x\nset x to -5\n");
        assert!(errors.is_good());
        match &module.stmts[1] {
            Stmt::Set { expr, .. } => {
                assert!(matches!(&expr.kind, ExprKind::Negate(_)));
                assert_eq!(expr.sig_prim(), Some(Primitive::Short));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_long_short_literal_split() {
        let (module, _) = analyze_source("long y\nset y to 100000\n");
        match &module.stmts[1] {
            Stmt::Set { expr, .. } => {
                assert_eq!(expr.sig_prim(), Some(Primitive::Long));
                assert!(matches!(&expr.kind, ExprKind::LongLit(100000)));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_call_followed_by_subtraction() {
        let (module, errors) = analyze_source("float f\nset f to GetHealth -1\n");
        assert!(errors.is_good());
        match &module.stmts[1] {
            Stmt::Set { expr, .. } => match &expr.kind {
                ExprKind::Math {
                    op: BinOp::Minus,
                    left,
                    ..
                } => {
                    assert!(matches!(&left.kind, ExprKind::Call { .. }));
                }
                other => panic!("expected subtraction continuation, got {:?}", other),
            },
            _ => unreachable!(),
        }
    }
}
