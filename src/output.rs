//! # Compiler Output
//!
//! The product of a successful compile: the emitted code words, the
//! literal pool and the finalized locals table. The output outlives the
//! AST it was generated from.

use alloc::vec::Vec;

use crate::literals::Literals;
use crate::locals::Locals;

/// Code, literals and locals of one compiled script
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Output {
    code: Vec<u32>,
    literals: Literals,
    locals: Locals,
}

impl Output {
    pub fn new(locals: Locals) -> Self {
        Output {
            code: Vec::new(),
            literals: Literals::new(),
            locals,
        }
    }

    pub fn code(&self) -> &[u32] {
        &self.code
    }

    pub fn code_mut(&mut self) -> &mut Vec<u32> {
        &mut self.code
    }

    /// Copy the code words into a caller-owned vector, the way host
    /// engines store `(code, locals)` pairs per script.
    pub fn get_code(&self, out: &mut Vec<u32>) {
        out.clear();
        out.extend_from_slice(&self.code);
    }

    pub fn literals(&self) -> &Literals {
        &self.literals
    }

    pub fn literals_mut(&mut self) -> &mut Literals {
        &mut self.literals
    }

    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut Locals {
        &mut self.locals
    }

    /// Split both emission targets out at once; the code generator writes
    /// words and literals in the same call.
    pub fn emission_targets(&mut self) -> (&mut Vec<u32>, &mut Literals) {
        (&mut self.code, &mut self.literals)
    }
}
