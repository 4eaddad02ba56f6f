//! Typed, deduplicated variable table.
//!
//! Variables are stored in document order, so a [`VariableIndex`] stays valid
//! for the lifetime of the registry. A second index keeps them sorted by
//! `(base type, value reference, alias kind)` for binary search and for
//! deterministic iteration. Variables sharing the full key keep their
//! insertion order.

use std::collections::HashMap;
use std::ops::Range;

use crate::error::{RegistryError, Result};
use crate::variable::{BaseType, ValueReference, Variable, VariableIndex};

/// A canonical variable together with every alias that shares its
/// `(base type, value reference)`.
#[derive(Debug, Clone)]
pub struct CanonicalWithAliases<'a> {
    pub canonical: &'a Variable,
    pub aliases: Vec<&'a Variable>,
}

/// Owns every variable of a model.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    variables: Vec<Variable>,
    sorted: Vec<VariableIndex>,
    by_name: HashMap<String, VariableIndex>,
}

impl VariableRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable, returning its document-order index.
    ///
    /// Fails if the name is taken, or if the variable is canonical and its
    /// `(base type, value reference)` already has a canonical entry.
    pub fn insert(&mut self, variable: Variable) -> Result<VariableIndex> {
        if self.by_name.contains_key(&variable.name) {
            return Err(RegistryError::DuplicateName {
                name: variable.name,
            });
        }
        if variable.is_canonical() {
            if let Some(existing) = self.canonical(variable.base_type, variable.value_reference) {
                return Err(RegistryError::DuplicateKey {
                    base_type: variable.base_type,
                    value_reference: variable.value_reference,
                    existing: existing.name.clone(),
                    rejected: variable.name,
                });
            }
        }

        let index = VariableIndex(self.variables.len());
        let key = variable.sort_key();
        let position = self
            .sorted
            .partition_point(|i| self.variables[i.0].sort_key() <= key);
        self.sorted.insert(position, index);
        self.by_name.insert(variable.name.clone(), index);
        self.variables.push(variable);
        Ok(index)
    }

    /// Number of variables, aliases included.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Variable at a document-order index.
    pub fn get(&self, index: VariableIndex) -> Option<&Variable> {
        self.variables.get(index.0)
    }

    /// Look up a variable by its unique name.
    pub fn lookup_by_name(&self, name: &str) -> Option<&Variable> {
        self.index_of(name).map(|i| &self.variables[i.0])
    }

    /// Document-order index of a named variable.
    pub fn index_of(&self, name: &str) -> Option<VariableIndex> {
        self.by_name.get(name).copied()
    }

    /// The canonical variable for `(base type, value reference)`, if any.
    pub fn canonical(&self, base_type: BaseType, value_reference: ValueReference) -> Option<&Variable> {
        let range = self.key_range(base_type, value_reference);
        self.sorted[range]
            .first()
            .map(|i| &self.variables[i.0])
            .filter(|v| v.is_canonical())
    }

    /// The canonical variable and its aliases for `(base type, value reference)`.
    ///
    /// Returns `None` when the group has no canonical member.
    pub fn lookup_by_reference(
        &self,
        base_type: BaseType,
        value_reference: ValueReference,
    ) -> Option<CanonicalWithAliases<'_>> {
        let range = self.key_range(base_type, value_reference);
        let mut group = self.sorted[range].iter().map(|i| &self.variables[i.0]);
        let canonical = group.next().filter(|v| v.is_canonical())?;
        Some(CanonicalWithAliases {
            canonical,
            aliases: group.collect(),
        })
    }

    /// Iterate in `(base type, value reference, alias kind)` order.
    ///
    /// The iterator borrows the registry and can be cloned or recreated to
    /// restart from the beginning.
    pub fn ordered_iter(&self) -> impl Iterator<Item = &Variable> + Clone + '_ {
        self.sorted.iter().map(move |i| &self.variables[i.0])
    }

    /// Iterate in document order together with each variable's index.
    pub fn iter(&self) -> impl Iterator<Item = (VariableIndex, &Variable)> + '_ {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, v)| (VariableIndex(i), v))
    }

    /// Aliases whose `(base type, value reference)` has no canonical variable.
    pub fn unresolved_aliases(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.variables
            .iter()
            .filter(|v| !v.is_canonical())
            .filter(|v| self.canonical(v.base_type, v.value_reference).is_none())
    }

    /// Record the resolved direct dependencies of a variable.
    ///
    /// Dependencies may name variables declared later in the document, so
    /// they are attached after every variable has been inserted.
    pub fn set_direct_dependencies(&mut self, index: VariableIndex, dependencies: Vec<VariableIndex>) {
        if let Some(v) = self.variables.get_mut(index.0) {
            v.direct_dependencies = Some(dependencies);
        }
    }

    /// Record the state variable a derivative belongs to.
    pub fn set_derivative_of(&mut self, index: VariableIndex, state: VariableIndex) {
        if let Some(v) = self.variables.get_mut(index.0) {
            v.derivative_of = Some(state);
        }
    }

    fn key_range(&self, base_type: BaseType, value_reference: ValueReference) -> Range<usize> {
        let key = (base_type, value_reference);
        let key_of = |i: &VariableIndex| {
            let v = &self.variables[i.0];
            (v.base_type, v.value_reference)
        };
        let start = self.sorted.partition_point(|i| key_of(i) < key);
        let end = self.sorted.partition_point(|i| key_of(i) <= key);
        start..end
    }
}
