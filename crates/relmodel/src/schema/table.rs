//! Tables, columns and keys.

use serde::Serialize;

use super::constraint::Constraint;
use super::field::DataType;
use crate::value::Value;

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Stored data type.
    pub data_type: DataType,
    /// Whether the column admits null.
    pub nullable: bool,
    /// Default value.
    pub default: Option<Value>,
    /// Integrity constraints.
    pub constraints: Vec<Constraint>,
}

/// What a table stores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TableKind {
    /// Principal table of an entity.
    Principal,
    /// Relation table of one or more collection fields.
    Relation {
        /// Qualified owner entity name.
        owner: String,
        /// Relation field paths stored in the table.
        fields: Vec<String>,
    },
}

/// A foreign key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKey {
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub target_table: String,
    /// Referenced columns.
    pub target_columns: Vec<String>,
}

/// A set of columns unique per row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateKey {
    /// Key name, if declared.
    pub name: Option<String>,
    /// Key columns.
    pub columns: Vec<String>,
}

/// How a primary key was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeySource {
    /// Explicit primary-key markers.
    Declared,
    /// `Id` / `<Entity>Id` naming convention.
    Naming,
    /// The only candidate key with no nullable column.
    CandidateKey,
    /// The only non-nullable field.
    SoleNonNullable,
    /// Owner key plus collection discriminator.
    Relation,
}

/// A primary key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimaryKey {
    /// Key columns, in column order.
    pub columns: Vec<String>,
    /// How the key was determined.
    pub source: KeySource,
}

/// A table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// What the table stores.
    pub kind: TableKind,
    /// Columns, in order.
    pub columns: Vec<Column>,
    /// Primary key.
    pub primary_key: PrimaryKey,
    /// Candidate keys.
    pub candidate_keys: Vec<CandidateKey>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column names, in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Check if this is a relation table.
    pub fn is_relation(&self) -> bool {
        matches!(self.kind, TableKind::Relation { .. })
    }
}
