//! Translated entities.

use serde::Serialize;

use super::field::{Creator, Field, FieldKind};
use super::table::{PrimaryKey, Table};
use crate::metadata::short_name;
use crate::value::{Object, Value};

/// A named instance of a pre-defined entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreDefinedInstance {
    /// Name of the instance.
    pub name: String,
    /// Primary-key values.
    pub key: Vec<Value>,
    /// Principal-table row.
    pub row: Vec<Value>,
    /// The instance itself.
    pub value: Object,
}

/// An entity type mapped to one principal table.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    /// Qualified type name.
    pub name: String,
    /// Principal table.
    pub table: Table,
    /// Fields, in column order.
    pub fields: Vec<Field>,
    /// Relation tables, in field order.
    pub relation_tables: Vec<Table>,
    /// How instances are rebuilt.
    pub creator: Creator,
    /// Whether the entity's extension is a fixed instance set.
    pub pre_defined: bool,
    /// Pre-defined instances.
    pub instances: Vec<PreDefinedInstance>,
}

impl Entity {
    /// Type name without its namespace prefix.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    /// Primary key of the principal table.
    pub fn primary_key(&self) -> &PrimaryKey {
        &self.table.primary_key
    }

    /// Get a top-level field by original member name.
    pub fn field(&self, member: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.member == member)
    }

    /// Get a relation table by name.
    pub fn relation_table(&self, name: &str) -> Option<&Table> {
        self.relation_tables.iter().find(|t| t.name == name)
    }

    /// All tables of the entity, principal first.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        std::iter::once(&self.table).chain(self.relation_tables.iter())
    }

    /// Get a pre-defined instance by name.
    pub fn instance(&self, name: &str) -> Option<&PreDefinedInstance> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Get a pre-defined instance by primary-key values.
    pub fn instance_by_key(&self, key: &[Value]) -> Option<&PreDefinedInstance> {
        self.instances.iter().find(|i| {
            i.key.len() == key.len() && i.key.iter().zip(key).all(|(a, b)| a.same(b))
        })
    }

    /// Entities referenced from the principal table.
    pub fn referenced_entities(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_references(&self.fields, &mut out);
        out
    }
}

fn collect_references<'a>(fields: &'a [Field], out: &mut Vec<&'a str>) {
    for field in fields {
        match &field.kind {
            FieldKind::Reference(r) => {
                if !out.contains(&r.target.as_str()) {
                    out.push(&r.target);
                }
            }
            FieldKind::Aggregate(a) => collect_references(&a.fields, out),
            _ => {}
        }
    }
}
