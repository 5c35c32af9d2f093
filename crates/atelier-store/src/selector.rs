//! Field selectors for document queries
//!
//! A selector is a conjunction of per-field conditions: equality,
//! substring match, and numeric/lexicographic range. Unindexed fields
//! are permitted but unbounded in cost; hot paths are covered by each
//! kind's index set.

use atelier_model::EntityKind;
use serde_json::Value;

/// One condition on a single top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    /// Substring match on a string-valued field.
    Contains(String),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
}

/// A conjunction of field conditions. Empty selects everything.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    clauses: Vec<(String, Condition)>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector matching every document of one kind.
    pub fn kind(kind: EntityKind) -> Self {
        Self::new().eq("type", kind.as_str())
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Condition::Eq(value.into())));
        self
    }

    pub fn contains(mut self, field: impl Into<String>, substring: impl Into<String>) -> Self {
        self.clauses
            .push((field.into(), Condition::Contains(substring.into())));
        self
    }

    pub fn gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Condition::Gt(value.into())));
        self
    }

    pub fn gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses
            .push((field.into(), Condition::Gte(value.into())));
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Condition::Lt(value.into())));
        self
    }

    pub fn lte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses
            .push((field.into(), Condition::Lte(value.into())));
        self
    }

    pub fn clauses(&self) -> &[(String, Condition)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}
