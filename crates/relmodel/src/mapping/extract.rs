//! Object to row extraction.

use tracing::trace;

use super::{join_path, Row};
use crate::error::MappingError;
use crate::schema::{Entity, Field, FieldKind, Leaf, Relation, Schema};
use crate::translate::{INDEX, ITEM, KEY, OWNER, SOURCE, VALUE};
use crate::value::{Collection, Entry, EntryState, Object, Value};

/// Row changes of one relation field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelationChanges {
    /// Relation table.
    pub table: String,
    /// Member path of the relation field.
    pub source: String,
    /// Rows of new entries.
    pub insertions: Vec<Row>,
    /// Rows of modified entries.
    pub modifications: Vec<Row>,
    /// Rows of deleted entries.
    pub deletions: Vec<Row>,
}

impl RelationChanges {
    /// Check if there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.modifications.is_empty() && self.deletions.is_empty()
    }
}

/// Rows extracted from one object.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Qualified entity name.
    pub entity: String,
    /// Principal table.
    pub table: String,
    /// Principal-table row.
    pub row: Row,
    /// Changes of every relation whose collection is not clean.
    pub relations: Vec<RelationChanges>,
}

/// Turns objects into rows.
#[derive(Debug, Clone, Copy)]
pub struct Extractor<'s> {
    schema: &'s Schema,
}

impl<'s> Extractor<'s> {
    /// Create an extractor over a schema.
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    fn entity_of(&self, object: &Object) -> Result<&'s Entity, MappingError> {
        self.schema
            .entity(&object.type_name)
            .map(|e| e.as_ref())
            .ok_or_else(|| MappingError::UnknownEntity(object.type_name.clone()))
    }

    /// Extract the principal row and the relation changes of an object.
    pub fn extract(&self, object: &Object) -> Result<Extraction, MappingError> {
        let entity = self.entity_of(object)?;
        let row = principal_row(&entity.fields, object)?;

        let mut relations = Vec::new();
        collect_relations(&entity.fields, Some(object), object, "", &mut relations)?;

        trace!(
            entity = %entity.name,
            cells = row.len(),
            relations = relations.len(),
            "object extracted"
        );
        Ok(Extraction {
            entity: entity.name.clone(),
            table: entity.table.name.clone(),
            row,
            relations,
        })
    }

    /// Primary-key cells of an object, as stored.
    pub fn key_values(&self, object: &Object) -> Result<Vec<Value>, MappingError> {
        let entity = self.entity_of(object)?;
        let row = principal_row(&entity.fields, object)?;
        Ok(key_cells(entity, &row))
    }
}

/// Primary-key cells of a principal-table row.
pub(crate) fn key_cells(entity: &Entity, row: &[Value]) -> Vec<Value> {
    entity
        .primary_key()
        .columns
        .iter()
        .filter_map(|c| entity.table.column_index(c))
        .filter_map(|i| row.get(i).cloned())
        .collect()
}

/// Flatten an object into a row of the table holding `fields`.
pub(crate) fn principal_row(fields: &[Field], object: &Object) -> Result<Row, MappingError> {
    let mut row = Row::new();
    flatten_object(fields, Some(object), "", &mut row)?;
    Ok(row)
}

/// Flatten the inline fields of an object; `None` stands for a null parent.
fn flatten_object(
    fields: &[Field],
    object: Option<&Object>,
    prefix: &str,
    out: &mut Row,
) -> Result<(), MappingError> {
    for field in fields.iter().filter(|f| f.is_inline()) {
        let path = join_path(prefix, &field.member);
        let value = match object {
            Some(object) => Some(
                object
                    .get(&field.member)
                    .ok_or_else(|| MappingError::MissingMember(path.clone()))?,
            ),
            None => None,
        };
        flatten_field(field, value, &path, out)?;
    }
    Ok(())
}

fn flatten_field(field: &Field, value: Option<&Value>, path: &str, out: &mut Row) -> Result<(), MappingError> {
    let value = match value {
        Some(Value::Null) if !field.nullable => {
            return Err(MappingError::InvalidValue {
                field: path.to_string(),
                reason: "null in a non-nullable field".to_string(),
            })
        }
        Some(Value::Null) | None => {
            out.extend(std::iter::repeat(Value::Null).take(field.leaves().len()));
            return Ok(());
        }
        Some(value) => value,
    };

    match &field.kind {
        FieldKind::Scalar(leaf) | FieldKind::Enumeration(leaf) => out.push(store(leaf, value, path)?),
        FieldKind::Aggregate(a) => {
            let object = expect_object(value, &a.type_name, path)?;
            flatten_object(&a.fields, Some(object), path, out)?;
        }
        FieldKind::Reference(r) => {
            let object = expect_object(value, &r.target, path)?;
            flatten_object(&r.fields, Some(object), path, out)?;
        }
        FieldKind::Relation(_) => {}
    }
    Ok(())
}

fn store(leaf: &Leaf, value: &Value, path: &str) -> Result<Value, MappingError> {
    leaf.store(value).map_err(|reason| match &leaf.conversion {
        Some(conversion) => MappingError::Conversion {
            converter: conversion.name.clone(),
            field: path.to_string(),
            reason,
        },
        None => MappingError::InvalidValue {
            field: path.to_string(),
            reason,
        },
    })
}

fn expect_object<'v>(value: &'v Value, type_name: &str, path: &str) -> Result<&'v Object, MappingError> {
    let object = value.as_object().ok_or_else(|| MappingError::InvalidValue {
        field: path.to_string(),
        reason: format!("expected an instance of '{}', got {}", type_name, value),
    })?;
    if object.type_name != type_name {
        return Err(MappingError::TypeMismatch {
            expected: type_name.to_string(),
            found: object.type_name.clone(),
        });
    }
    Ok(object)
}

/// Walk the relation fields of an object, through non-null aggregates.
fn collect_relations(
    fields: &[Field],
    object: Option<&Object>,
    owner: &Object,
    prefix: &str,
    out: &mut Vec<RelationChanges>,
) -> Result<(), MappingError> {
    let Some(object) = object else {
        return Ok(());
    };
    for field in fields {
        let path = join_path(prefix, &field.member);
        let value = object
            .get(&field.member)
            .ok_or_else(|| MappingError::MissingMember(path.clone()))?;
        match &field.kind {
            FieldKind::Aggregate(a) => {
                collect_relations(&a.fields, value.as_object(), owner, &path, out)?;
            }
            FieldKind::Relation(relation) => {
                let collection = match value {
                    Value::Null => continue,
                    Value::Collection(c) => c,
                    other => {
                        return Err(MappingError::InvalidValue {
                            field: path,
                            reason: format!("expected a collection, got {}", other),
                        })
                    }
                };
                if collection.is_clean() {
                    continue;
                }
                out.push(relation_changes(relation, collection, owner, &path)?);
            }
            _ => {}
        }
    }
    Ok(())
}

fn relation_changes(
    relation: &Relation,
    collection: &Collection,
    owner: &Object,
    path: &str,
) -> Result<RelationChanges, MappingError> {
    if collection.kind() != relation.kind {
        return Err(MappingError::InvalidValue {
            field: path.to_string(),
            reason: format!("expected a {:?} collection, got a {:?}", relation.kind, collection.kind()),
        });
    }
    let mut changes = RelationChanges {
        table: relation.table.clone(),
        source: path.to_string(),
        ..RelationChanges::default()
    };
    for entry in collection.entries() {
        let bucket = match entry.state {
            EntryState::Saved => continue,
            EntryState::New => &mut changes.insertions,
            EntryState::Modified => &mut changes.modifications,
            EntryState::Deleted => &mut changes.deletions,
        };
        bucket.push(relation_row(relation, owner, path, entry)?);
    }
    Ok(changes)
}

fn relation_row(
    relation: &Relation,
    owner: &Object,
    path: &str,
    entry: &Entry,
) -> Result<Row, MappingError> {
    let mut row = Row::new();
    for field in &relation.fields {
        let field_path = join_path(path, &field.member);
        match field.member.as_str() {
            OWNER => flatten_object(field.children(), Some(owner), path, &mut row)?,
            SOURCE => row.push(Value::String(path.to_string())),
            INDEX => row.push(Value::UInt(entry.slot)),
            KEY => {
                let key = entry.key.as_ref().ok_or_else(|| MappingError::InvalidValue {
                    field: path.to_string(),
                    reason: "map entry without a key".to_string(),
                })?;
                flatten_field(field, Some(key), &field_path, &mut row)?;
            }
            ITEM | VALUE => flatten_field(field, Some(&entry.value), &field_path, &mut row)?,
            _ => {}
        }
    }
    Ok(row)
}
