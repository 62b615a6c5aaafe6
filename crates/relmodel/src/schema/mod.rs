//! The translated schema model.
//!
//! Everything here is produced once by the translator and never mutated
//! afterwards; extraction and reconstitution only read it.

mod constraint;
mod entity;
mod field;
mod table;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

pub use constraint::{Bound, Constraint, ConstraintSet, CustomCheck, Discreteness};
pub use entity::{Entity, PreDefinedInstance};
pub use field::{
    leaves_of, Aggregate, Conversion, Creator, DataType, Field, FieldKind, Leaf, Reference,
    Relation, Representation,
};
pub use table::{CandidateKey, Column, ForeignKey, KeySource, PrimaryKey, Table, TableKind};

/// A translated set of entities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    entities: BTreeMap<String, Arc<Entity>>,
}

impl Schema {
    pub(crate) fn new(entities: impl IntoIterator<Item = Arc<Entity>>) -> Self {
        Self {
            entities: entities
                .into_iter()
                .map(|e| (e.name.clone(), e))
                .collect(),
        }
    }

    /// Get an entity by qualified name.
    pub fn entity(&self, name: &str) -> Option<&Arc<Entity>> {
        self.entities.get(name)
    }

    /// All entities in name order.
    pub fn entities(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.values()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the schema has no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All tables, principal tables first within each entity.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.entities.values().flat_map(|e| e.tables())
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables().find(|t| t.name == name)
    }

    /// Get a pre-defined instance.
    pub fn instance(&self, entity: &str, name: &str) -> Option<&PreDefinedInstance> {
        self.entity(entity)?.instance(name)
    }

    /// Serialize the schema to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
