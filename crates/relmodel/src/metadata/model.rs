//! The parsed metadata tree handed to the translator.

use std::collections::BTreeMap;

use super::types::TypeDecl;

/// A set of type declarations, keyed by qualified name.
#[derive(Debug, Clone, Default)]
pub struct Model {
    types: BTreeMap<String, TypeDecl>,
}

impl Model {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type declaration. A later declaration replaces an earlier one
    /// of the same name.
    pub fn with_type(mut self, decl: TypeDecl) -> Self {
        self.insert(decl);
        self
    }

    /// Add a type declaration in place.
    pub fn insert(&mut self, decl: TypeDecl) {
        self.types.insert(decl.name.clone(), decl);
    }

    /// Get a type declaration by qualified name.
    pub fn get(&self, name: &str) -> Option<&TypeDecl> {
        self.types.get(name)
    }

    /// All type declarations in name order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.types.values()
    }

    /// Number of declared types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the model declares no types.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Inheritance chain of a type, from the root base type to the type
    /// itself. Unknown base types end the chain; a repeated type stops it.
    pub fn linearize<'a>(&'a self, decl: &'a TypeDecl) -> Vec<&'a TypeDecl> {
        let mut chain = vec![decl];
        let mut current = decl;
        while let Some(base) = current.base.as_deref().and_then(|b| self.get(b)) {
            if chain.iter().any(|d| d.name == base.name) {
                break;
            }
            chain.push(base);
            current = base;
        }
        chain.reverse();
        chain
    }
}
