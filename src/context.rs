//! # Compilation Context
//!
//! The read-only oracle a compilation runs against: which globals exist
//! and with what type, which scripts expose which member variables, what
//! counts as a journal id, and which ids are placeable references. The
//! host engine implements [`Context`] over its object store; the compiler
//! never mutates it.
//!
//! [`TableContext`] is a table-backed implementation for embedders,
//! fixtures and the interactive console.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;

use crate::extensions::Extensions;

/// Global symbol oracle consulted by the semantic analyzer
pub trait Context {
    /// Type tag of a global variable, or `' '` if unknown
    fn global_type(&self, name: &str) -> char;

    /// Type tag of a member variable on the named owner, plus whether the
    /// owner is a global target. `(' ', false)` if unknown.
    fn member_type(&self, member: &str, owner: &str) -> (char, bool);

    /// True if the name is a journal (quest log) id
    fn is_journal_id(&self, name: &str) -> bool;

    /// True if the name is a placeable reference id
    fn is_id(&self, name: &str) -> bool;

    /// The builtin registry, if one is installed
    fn extensions(&self) -> Option<&Extensions>;
}

/// Table-backed [`Context`] implementation. All lookups fold case.
#[derive(Debug, Default)]
pub struct TableContext {
    globals: BTreeMap<String, char>,
    members: BTreeMap<(String, String), (char, bool)>,
    journals: BTreeSet<String>,
    ids: BTreeSet<String>,
    extensions: Option<Extensions>,
}

impl TableContext {
    pub fn new() -> Self {
        TableContext::default()
    }

    pub fn with_extensions(extensions: Extensions) -> Self {
        TableContext {
            extensions: Some(extensions),
            ..TableContext::default()
        }
    }

    pub fn add_global(&mut self, name: &str, type_tag: char) {
        self.globals.insert(name.to_lowercase(), type_tag);
    }

    pub fn add_member(&mut self, owner: &str, member: &str, type_tag: char, global: bool) {
        self.members.insert(
            (owner.to_lowercase(), member.to_lowercase()),
            (type_tag, global),
        );
    }

    pub fn add_journal(&mut self, name: &str) {
        self.journals.insert(name.to_lowercase());
    }

    pub fn add_id(&mut self, name: &str) {
        self.ids.insert(name.to_lowercase());
    }

    pub fn set_extensions(&mut self, extensions: Extensions) {
        self.extensions = Some(extensions);
    }
}

impl Context for TableContext {
    fn global_type(&self, name: &str) -> char {
        self.globals
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or(' ')
    }

    fn member_type(&self, member: &str, owner: &str) -> (char, bool) {
        self.members
            .get(&(owner.to_lowercase(), member.to_lowercase()))
            .copied()
            .unwrap_or((' ', false))
    }

    fn is_journal_id(&self, name: &str) -> bool {
        self.journals.contains(&name.to_lowercase())
    }

    fn is_id(&self, name: &str) -> bool {
        self.ids.contains(&name.to_lowercase())
    }

    fn extensions(&self) -> Option<&Extensions> {
        self.extensions.as_ref()
    }
}
