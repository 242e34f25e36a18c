//! # Literal Pool
//!
//! Out-of-band tables of integers, floats and strings referenced by index
//! from the emitted code.
//!
//! The pools are append-only; an index handed out never moves. The
//! serialized layout is a length-prefixed UTF-8 string table followed by a
//! 32-bit integer table and a 32-bit float table, all little-endian.

use alloc::string::String;
use alloc::vec::Vec;

/// The three literal pools of a compiled script
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Literals {
    ints: Vec<i32>,
    floats: Vec<f32>,
    strings: Vec<String>,
}

impl Literals {
    pub fn new() -> Self {
        Literals::default()
    }

    /// Append an integer literal and return its index
    pub fn add_int(&mut self, value: i32) -> usize {
        self.ints.push(value);
        self.ints.len() - 1
    }

    /// Append a float literal and return its index
    pub fn add_float(&mut self, value: f32) -> usize {
        self.floats.push(value);
        self.floats.len() - 1
    }

    /// Append a string literal and return its index
    pub fn add_string(&mut self, value: &str) -> usize {
        self.strings.push(String::from(value));
        self.strings.len() - 1
    }

    pub fn ints(&self) -> &[i32] {
        &self.ints
    }

    pub fn floats(&self) -> &[f32] {
        &self.floats
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.floats.is_empty() && self.strings.is_empty()
    }

    pub fn clear(&mut self) {
        self.ints.clear();
        self.floats.clear();
        self.strings.clear();
    }

    /// Serialize the pool: string table (count, then per-string byte
    /// length and UTF-8 bytes), integer table, float table.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
        for s in &self.strings {
            let bytes = s.as_bytes();
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(bytes);
        }

        out.extend_from_slice(&(self.ints.len() as u32).to_le_bytes());
        for v in &self.ints {
            out.extend_from_slice(&v.to_le_bytes());
        }

        out.extend_from_slice(&(self.floats.len() as u32).to_le_bytes());
        for v in &self.floats {
            out.extend_from_slice(&v.to_le_bytes());
        }

        out
    }
}
