//! Style collector capability.
//!
//! Executed modules report styling side effects through the `StyleAdapter`
//! trait: appended style records, registered class names, and composition
//! registration/usage. The concrete `StyleCollector` is single-slot mutable
//! state for one compilation pass: `reset()` must run before each module's
//! pass, and exactly one scope stack is active at a time. Nested sibling
//! executions push onto the same stack; they complete before the outer
//! module's own registration resumes.

use crate::error::{Result, VexError};
use crate::ident::{generate_identifier, IdentifierMode};
use crate::scope::FileScope;
use crate::value::ObjectMap;
use std::collections::{HashMap, HashSet};

/// A named, reusable grouping of class names. `class_list` is the full
/// space-separated list, identifier first.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub identifier: String,
    pub class_list: String,
}

/// One collected style record, minus the scope it is filed under.
#[derive(Debug, Clone, PartialEq)]
pub enum CssRecordKind {
    /// A scoped rule targeting a single generated class (no leading dot).
    Rule { selector: String, rule: ObjectMap },
    /// A rule with an author-written global selector.
    GlobalRule { selector: String, rule: ObjectMap },
    /// `@font-face`; the rule already carries its `fontFamily`.
    FontFace { rule: ObjectMap },
    /// `@keyframes <name>`.
    Keyframes { name: String, frames: ObjectMap },
    /// `@property --<name>`.
    Property { name: String, rule: ObjectMap },
}

/// Capability surface consumed by executed modules (via the builtins).
pub trait StyleAdapter {
    fn append_css(&mut self, record: CssRecordKind) -> Result<()>;
    fn register_class_name(&mut self, name: &str);
    fn register_composition(&mut self, composition: Composition);
    fn mark_composition_used(&mut self, identifier: &str);
    /// Fresh identifier under the currently open scope.
    fn generate_scoped_identifier(&mut self, debug_id: Option<&str>) -> Result<String>;
    fn ident_mode(&self) -> &IdentifierMode;
    fn begin_scope(&mut self, scope: FileScope);
    fn end_scope(&mut self);
    fn current_scope(&self) -> Option<&FileScope>;
}

/// Per-pass accumulation of everything the executed modules reported.
#[derive(Debug)]
pub struct StyleCollector {
    identifier: IdentifierMode,
    scope_stack: Vec<FileScope>,
    /// Records bucketed by serialized scope, in first-encounter order.
    css_by_scope: Vec<(String, Vec<CssRecordKind>)>,
    local_class_names: HashSet<String>,
    compositions: Vec<Composition>,
    used_compositions: HashSet<String>,
    ident_counters: HashMap<String, u32>,
}

impl StyleCollector {
    pub fn new(identifier: IdentifierMode) -> Self {
        Self {
            identifier,
            scope_stack: Vec::new(),
            css_by_scope: Vec::new(),
            local_class_names: HashSet::new(),
            compositions: Vec::new(),
            used_compositions: HashSet::new(),
            ident_counters: HashMap::new(),
        }
    }

    /// Clear all accumulated state. Must be called before each module's
    /// execution pass; leftover records would leak into the next module's
    /// output.
    pub fn reset(&mut self) {
        self.scope_stack.clear();
        self.css_by_scope.clear();
        self.local_class_names.clear();
        self.compositions.clear();
        self.used_compositions.clear();
        self.ident_counters.clear();
    }

    /// Serialized scopes that received at least one record, in
    /// first-encounter order.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.css_by_scope.iter().map(|(k, _)| k.as_str())
    }

    pub fn records_for(&self, serialized_scope: &str) -> &[CssRecordKind] {
        self.css_by_scope
            .iter()
            .find(|(k, _)| k == serialized_scope)
            .map(|(_, records)| records.as_slice())
            .unwrap_or(&[])
    }

    pub fn local_class_names(&self) -> &HashSet<String> {
        &self.local_class_names
    }

    pub fn compositions(&self) -> &[Composition] {
        &self.compositions
    }

    pub fn used_compositions(&self) -> &HashSet<String> {
        &self.used_compositions
    }

    pub fn unused_compositions(&self) -> Vec<&str> {
        self.compositions
            .iter()
            .filter(|c| !self.used_compositions.contains(&c.identifier))
            .map(|c| c.identifier.as_str())
            .collect()
    }
}

impl StyleAdapter for StyleCollector {
    fn append_css(&mut self, record: CssRecordKind) -> Result<()> {
        let scope = self
            .scope_stack
            .last()
            .ok_or_else(|| VexError::ScopeNotFound("no open file scope".to_string()))?;
        let key = scope.stringify();
        if let Some((_, records)) = self.css_by_scope.iter_mut().find(|(k, _)| *k == key) {
            records.push(record);
        } else {
            self.css_by_scope.push((key, vec![record]));
        }
        Ok(())
    }

    fn register_class_name(&mut self, name: &str) {
        self.local_class_names.insert(name.to_string());
    }

    fn register_composition(&mut self, composition: Composition) {
        self.compositions.push(composition);
    }

    fn mark_composition_used(&mut self, identifier: &str) {
        self.used_compositions.insert(identifier.to_string());
    }

    fn generate_scoped_identifier(&mut self, debug_id: Option<&str>) -> Result<String> {
        let scope = self
            .scope_stack
            .last()
            .ok_or_else(|| VexError::ScopeNotFound("no open file scope".to_string()))?
            .clone();
        let key = scope.stringify();
        let counter = self.ident_counters.entry(key).or_insert(0);
        let index = *counter;
        *counter += 1;
        Ok(generate_identifier(&self.identifier, &scope, index, debug_id))
    }

    fn ident_mode(&self) -> &IdentifierMode {
        &self.identifier
    }

    fn begin_scope(&mut self, scope: FileScope) {
        self.scope_stack.push(scope);
    }

    fn end_scope(&mut self) {
        self.scope_stack.pop();
    }

    fn current_scope(&self) -> Option<&FileScope> {
        self.scope_stack.last()
    }
}
