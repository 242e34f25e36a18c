//! # Extensions Registry
//!
//! The engine's catalogue of script-callable builtins: functions (return a
//! value) and instructions (do not). Each entry owns its argument
//! signature string and the interpreter opcode(s) to emit for it; entries
//! that support an explicit reference target carry a second opcode for the
//! explicit form.
//!
//! The registry is filled once by the host at startup and read-only
//! afterwards; the compiler only queries and emits.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::generator::{self, EmitError};
use crate::literals::Literals;

/// Opaque keyword id handed out by the registry
pub type Keyword = u32;

#[derive(Debug, Clone)]
struct FunctionEntry {
    ret: char,
    args: String,
    code: u32,
    code_explicit: Option<u32>,
}

#[derive(Debug, Clone)]
struct InstructionEntry {
    args: String,
    code: u32,
    code_explicit: Option<u32>,
}

/// A function's queryable shape
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSig<'a> {
    pub ret: char,
    pub args: &'a str,
    /// True when the builtin has an explicit-reference form
    pub needs_explicit: bool,
}

/// An instruction's queryable shape
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionSig<'a> {
    pub args: &'a str,
    pub needs_explicit: bool,
}

/// Keyword registry mapping lowercased names to builtins
#[derive(Debug, Clone, Default)]
pub struct Extensions {
    keywords: BTreeMap<String, Keyword>,
    functions: BTreeMap<Keyword, FunctionEntry>,
    instructions: BTreeMap<Keyword, InstructionEntry>,
    next_keyword: Keyword,
}

impl Extensions {
    pub fn new() -> Self {
        Extensions {
            keywords: BTreeMap::new(),
            functions: BTreeMap::new(),
            instructions: BTreeMap::new(),
            next_keyword: 1,
        }
    }

    fn allocate(&mut self, name: &str) -> Keyword {
        let keyword = self.next_keyword;
        self.next_keyword += 1;
        self.keywords.insert(name.to_lowercase(), keyword);
        keyword
    }

    /// Register a function. `ret` is its return tag, `args` its signature
    /// string, `code` the segment-3 opcode; `code_explicit` the opcode of
    /// the explicit-reference form, if the function has one.
    pub fn register_function(
        &mut self,
        name: &str,
        ret: char,
        args: &str,
        code: u32,
        code_explicit: Option<u32>,
    ) -> Keyword {
        let keyword = self.allocate(name);
        self.functions.insert(
            keyword,
            FunctionEntry {
                ret,
                args: String::from(args),
                code,
                code_explicit,
            },
        );
        keyword
    }

    /// Register an instruction
    pub fn register_instruction(
        &mut self,
        name: &str,
        args: &str,
        code: u32,
        code_explicit: Option<u32>,
    ) -> Keyword {
        let keyword = self.allocate(name);
        self.instructions.insert(
            keyword,
            InstructionEntry {
                args: String::from(args),
                code,
                code_explicit,
            },
        );
        keyword
    }

    /// Look up a keyword id by name (case folded)
    pub fn search_keyword(&self, name: &str) -> Option<Keyword> {
        self.keywords.get(&name.to_lowercase()).copied()
    }

    /// Query a keyword as a function
    pub fn function(&self, keyword: Keyword) -> Option<FunctionSig<'_>> {
        self.functions.get(&keyword).map(|f| FunctionSig {
            ret: f.ret,
            args: &f.args,
            needs_explicit: f.code_explicit.is_some(),
        })
    }

    /// Query a keyword as an instruction
    pub fn instruction(&self, keyword: Keyword) -> Option<InstructionSig<'_>> {
        self.instructions.get(&keyword).map(|i| InstructionSig {
            args: &i.args,
            needs_explicit: i.code_explicit.is_some(),
        })
    }

    /// Emit the call opcode of a function. `explicit` names the reference
    /// target for the explicit form (empty for none); `optionals` is the
    /// filled optional-argument count, encoded in the opcode immediate.
    pub fn generate_function(
        &self,
        keyword: Keyword,
        code: &mut Vec<u32>,
        literals: &mut Literals,
        explicit: &str,
        optionals: usize,
    ) -> Result<(), EmitError> {
        let entry = self.functions.get(&keyword).ok_or_else(|| EmitError {
            message: String::from("unknown function keyword"),
        })?;
        Self::emit_entry(
            code,
            literals,
            explicit,
            optionals,
            entry.code,
            entry.code_explicit,
        )
    }

    /// Emit the call opcode of an instruction
    pub fn generate_instruction(
        &self,
        keyword: Keyword,
        code: &mut Vec<u32>,
        literals: &mut Literals,
        explicit: &str,
        optionals: usize,
    ) -> Result<(), EmitError> {
        let entry = self.instructions.get(&keyword).ok_or_else(|| EmitError {
            message: String::from("unknown instruction keyword"),
        })?;
        Self::emit_entry(
            code,
            literals,
            explicit,
            optionals,
            entry.code,
            entry.code_explicit,
        )
    }

    fn emit_entry(
        code: &mut Vec<u32>,
        literals: &mut Literals,
        explicit: &str,
        optionals: usize,
        plain: u32,
        with_ref: Option<u32>,
    ) -> Result<(), EmitError> {
        let arg = optionals as u32 & 0xFFFF;
        match (explicit.is_empty(), with_ref) {
            (false, Some(op)) => {
                generator::push_string(code, literals, explicit)?;
                code.push(generator::seg3(op, arg));
            }
            // An explicit target on a builtin without an explicit form has
            // already been discarded (with a warning) by the analyzer.
            _ => code.push(generator::seg3(plain, arg)),
        }
        Ok(())
    }
}
