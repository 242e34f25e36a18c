//! # Abstract Syntax Tree (AST)
//!
//! Defines the structure of parsed Emberscript modules.
//!
//! The parser is deliberately permissive: bare identifiers become implicit
//! [`ExprKind::Ref`] nodes and adjacent expressions pile up in
//! [`ExprKind::Items`] lists. The semantic analyzer rewrites those into
//! explicit variable references and calls, and stamps every expression with
//! a [`TypeSig`]. Ownership is single-parent-downward; the analyzer
//! replaces a child by assigning a new node into its parent's slot, so no
//! cycles can form.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::token::TokenLoc;

/// Binary operators (including the reference operators, which only appear
/// inside [`ExprKind::Ref`] nodes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
    Plus,
    Minus,
    Mult,
    Divide,
    /// `.` member access (or float split, resolved by the analyzer)
    Dot,
    /// `->` explicit reference
    Arrow,
    /// Placeholder for implicit references
    None,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Gt => ">",
            BinOp::Gte => ">=",
            BinOp::Lt => "<",
            BinOp::Lte => "<=",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Plus => "+",
            BinOp::Minus => "-",
            BinOp::Mult => "*",
            BinOp::Divide => "/",
            BinOp::Dot => ".",
            BinOp::Arrow => "->",
            BinOp::None => "NONE",
        }
    }

    /// Comparison operators collapse to a single character for the code
    /// generator's compare emitter.
    pub fn logic_char(&self) -> Option<char> {
        match self {
            BinOp::Eq => Some('e'),
            BinOp::Neq => Some('n'),
            BinOp::Lt => Some('l'),
            BinOp::Lte => Some('L'),
            BinOp::Gt => Some('g'),
            BinOp::Gte => Some('G'),
            _ => Option::None,
        }
    }
}

/// Primitive types of the language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// No type assigned yet, or no value produced. Reaching the code
    /// generator with this in a value position is a bug.
    Undefined,
    Float,
    Long,
    Short,
    String,
    Bool,
}

impl Primitive {
    /// The single-character type tag used by locals tables and argument
    /// signature strings. Returns `' '` for types without a tag.
    pub fn type_char(&self) -> char {
        match self {
            Primitive::Float => 'f',
            Primitive::Long => 'l',
            Primitive::Short => 's',
            _ => ' ',
        }
    }

    /// Map a signature/locals type tag back to a primitive. `c` and `S`
    /// are both string-typed; anything else is undefined.
    pub fn from_char(c: char) -> Primitive {
        match c {
            'f' => Primitive::Float,
            'l' => Primitive::Long,
            's' => Primitive::Short,
            'c' | 'S' => Primitive::String,
            _ => Primitive::Undefined,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Primitive::Float | Primitive::Long | Primitive::Short)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Undefined => "UNDEFINED",
            Primitive::Float => "FLOAT",
            Primitive::Long => "LONG",
            Primitive::Short => "SHORT",
            Primitive::String => "STRING",
            Primitive::Bool => "BOOL",
        }
    }
}

/// Argument signature shared by function and instruction type signatures.
///
/// `args` is a string over the alphabet `f l s c S x X z j /`; everything
/// after `/` is optional. `optionals` records how many optional slots a
/// particular call actually filled, so the emitted opcode can encode its
/// variadic arity.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgsSig {
    pub args: String,
    pub message_box: bool,
    pub optionals: usize,
}

impl ArgsSig {
    pub fn new(args: &str) -> Self {
        ArgsSig {
            args: String::from(args),
            message_box: false,
            optionals: 0,
        }
    }

    pub fn message_box(args: &str) -> Self {
        ArgsSig {
            args: String::from(args),
            message_box: true,
            optionals: 0,
        }
    }
}

/// Type signature assigned to expressions by the semantic analyzer
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSig {
    /// A plain value. `global_member` marks member variables that live on
    /// a global target rather than a placed reference.
    Primitive {
        prim: Primitive,
        global_member: bool,
    },
    /// A callable returning a value
    Function { args: ArgsSig, ret: char },
    /// A callable returning nothing
    Instruction { args: ArgsSig },
}

impl TypeSig {
    pub fn primitive(prim: Primitive) -> Self {
        TypeSig::Primitive {
            prim,
            global_member: false,
        }
    }

    /// Build a primitive signature from a type tag
    pub fn from_char(c: char) -> Self {
        TypeSig::primitive(Primitive::from_char(c))
    }

    /// The primitive kind, if this is a primitive signature
    pub fn prim(&self) -> Option<Primitive> {
        match self {
            TypeSig::Primitive { prim, .. } => Some(*prim),
            _ => Option::None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, TypeSig::Function { .. } | TypeSig::Instruction { .. })
    }

    pub fn args(&self) -> Option<&ArgsSig> {
        match self {
            TypeSig::Function { args, .. } | TypeSig::Instruction { args } => Some(args),
            TypeSig::Primitive { .. } => Option::None,
        }
    }

    pub fn args_mut(&mut self) -> Option<&mut ArgsSig> {
        match self {
            TypeSig::Function { args, .. } | TypeSig::Instruction { args } => Some(args),
            TypeSig::Primitive { .. } => Option::None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.prim().map_or(false, |p| p.is_numeric())
    }

    /// The emitter's type tag for this signature (`' '` if not primitive)
    pub fn type_char(&self) -> char {
        self.prim().map_or(' ', |p| p.type_char())
    }
}

/// An expression node: position, assigned type, and the variant payload
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub loc: TokenLoc,
    /// Assigned by the semantic analyzer; immutable once set
    pub sig: Option<TypeSig>,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Floating-point literal (only created by the analyzer, from `a.b`)
    FloatLit(f32),
    /// Integer literal (created by the analyzer from digit atoms)
    LongLit(i32),
    /// String atom: quoted strings, and bare words until classified
    StringLit(String),
    /// Reference to an engine global variable
    GlobalVar(String),
    /// Reference to a script local
    LocalVar(String),
    /// Member variable on another script's target
    MemberVar { module: String, name: String },
    /// Journal (quest log) id, typed SHORT
    Journal(String),
    /// Arithmetic expression
    Math {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Comparison expression, typed BOOL
    Logic {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary minus
    Negate(Box<Expr>),
    /// Numeric conversion inserted by the analyzer; the target type is the
    /// node's signature
    Cast(Box<Expr>),
    /// `base op offset` reference. Base and offset are always string
    /// atoms; base is absent in the implicit form.
    Ref {
        op: BinOp,
        base: Option<Box<Expr>>,
        offset: Box<Expr>,
    },
    /// Adjacent atoms awaiting call-shape recovery
    Items(Vec<Expr>),
    /// Resolved call: callee carries the signature, args are the consumed
    /// arguments in source order
    Call { callee: Box<Expr>, args: Vec<Expr> },
}

impl Expr {
    pub fn new(loc: TokenLoc, kind: ExprKind) -> Self {
        Expr {
            loc,
            sig: None,
            kind,
        }
    }

    pub fn with_sig(loc: TokenLoc, sig: TypeSig, kind: ExprKind) -> Self {
        Expr {
            loc,
            sig: Some(sig),
            kind,
        }
    }

    /// Extract the plain string a node stands for, if any: string atoms
    /// themselves, implicit references (their offset), and single-item
    /// lists. Used wherever the language wants a name rather than a value.
    pub fn coerce_string(&self) -> Option<String> {
        match &self.kind {
            ExprKind::StringLit(s) => Some(s.clone()),
            ExprKind::Ref { base, offset, .. } => {
                if base.is_none() {
                    offset.coerce_string()
                } else {
                    None
                }
            }
            ExprKind::Items(items) => {
                if items.len() == 1 {
                    items[0].coerce_string()
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// The primitive kind of the assigned signature, if any
    pub fn sig_prim(&self) -> Option<Primitive> {
        self.sig.as_ref().and_then(|s| s.prim())
    }

    /// True if the assigned signature is a function or instruction
    pub fn sig_callable(&self) -> bool {
        self.sig.as_ref().map_or(false, |s| s.is_callable())
    }
}

/// A statement node
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `short x` / `long y` / `float z`
    TypeDecl {
        loc: TokenLoc,
        decl_type: Primitive,
        name: String,
    },
    /// `set <target> to <expr>`. `valid` is cleared by the analyzer when
    /// the target is unknown; the statement then emits nothing.
    Set {
        loc: TokenLoc,
        target: Expr,
        expr: Expr,
        valid: bool,
    },
    /// `if <cond> ... [elseif/else ...] endif`. Chained `elseif` branches
    /// nest as a single `If` inside the false branch.
    If {
        loc: TokenLoc,
        cond: Expr,
        true_body: Vec<Stmt>,
        false_body: Vec<Stmt>,
    },
    /// `while <cond> ... endwhile`
    While {
        loc: TokenLoc,
        cond: Expr,
        body: Vec<Stmt>,
    },
    /// `return`
    Return { loc: TokenLoc },
    /// A bare expression line (usually an instruction call)
    Expr { loc: TokenLoc, expr: Expr },
    /// Empty line or stray terminator
    NoOp { loc: TokenLoc },
}

impl Stmt {
    pub fn loc(&self) -> &TokenLoc {
        match self {
            Stmt::TypeDecl { loc, .. }
            | Stmt::Set { loc, .. }
            | Stmt::If { loc, .. }
            | Stmt::While { loc, .. }
            | Stmt::Return { loc }
            | Stmt::Expr { loc, .. }
            | Stmt::NoOp { loc } => loc,
        }
    }
}

/// Root of a parsed compilation unit
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub loc: TokenLoc,
    pub name: String,
    pub stmts: Vec<Stmt>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    fn loc() -> TokenLoc {
        TokenLoc::default()
    }

    #[test]
    fn test_type_chars_round_trip() {
        assert_eq!(Primitive::Float.type_char(), 'f');
        assert_eq!(Primitive::from_char('l'), Primitive::Long);
        assert_eq!(Primitive::from_char('S'), Primitive::String);
        assert_eq!(Primitive::from_char('?'), Primitive::Undefined);
        assert_eq!(Primitive::String.type_char(), ' ');
    }

    #[test]
    fn test_logic_chars() {
        assert_eq!(BinOp::Eq.logic_char(), Some('e'));
        assert_eq!(BinOp::Gte.logic_char(), Some('G'));
        assert_eq!(BinOp::Plus.logic_char(), None);
    }

    #[test]
    fn test_callable_signatures() {
        let f = TypeSig::Function {
            args: ArgsSig::new("ll/S"),
            ret: 'f',
        };
        assert!(f.is_callable());
        assert_eq!(f.args().unwrap().args, "ll/S");
        assert_eq!(f.prim(), None);

        let p = TypeSig::primitive(Primitive::Short);
        assert!(!p.is_callable());
        assert!(p.is_numeric());
        assert_eq!(p.type_char(), 's');
    }

    #[test]
    fn test_coerce_string() {
        let lit = Expr::new(loc(), ExprKind::StringLit("rat".to_string()));
        assert_eq!(lit.coerce_string(), Some("rat".to_string()));

        let implicit = Expr::new(
            loc(),
            ExprKind::Ref {
                op: BinOp::None,
                base: None,
                offset: Box::new(lit.clone()),
            },
        );
        assert_eq!(implicit.coerce_string(), Some("rat".to_string()));

        let explicit = Expr::new(
            loc(),
            ExprKind::Ref {
                op: BinOp::Arrow,
                base: Some(Box::new(lit.clone())),
                offset: Box::new(lit.clone()),
            },
        );
        assert_eq!(explicit.coerce_string(), None);

        let single = Expr::new(loc(), ExprKind::Items(vec![lit.clone()]));
        assert_eq!(single.coerce_string(), Some("rat".to_string()));

        let many = Expr::new(loc(), ExprKind::Items(vec![lit.clone(), lit]));
        assert_eq!(many.coerce_string(), None);
    }
}
