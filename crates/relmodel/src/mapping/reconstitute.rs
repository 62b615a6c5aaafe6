//! Row to object reconstitution.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use super::extract::key_cells;
use super::{join_path, Row};
use crate::error::MappingError;
use crate::schema::{leaves_of, Creator, Entity, Field, FieldKind, Leaf, Relation, Schema};
use crate::translate::{INDEX, ITEM, KEY, OWNER, SOURCE, VALUE};
use crate::value::{Collection, Object, Value};

/// Relation-table rows available to reconstitution, by table name.
#[derive(Debug, Clone, Default)]
pub struct RelationRows {
    tables: HashMap<String, Vec<Row>>,
}

impl RelationRows {
    /// Create an empty row set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row of a relation table.
    pub fn add(&mut self, table: impl Into<String>, row: Row) {
        self.tables.entry(table.into()).or_default().push(row);
    }

    /// Rows of a relation table.
    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl From<&super::Extraction> for RelationRows {
    /// Rows an extraction would leave in the store: insertions and
    /// modifications.
    fn from(extraction: &super::Extraction) -> Self {
        let mut rows = Self::new();
        for changes in &extraction.relations {
            for row in changes.insertions.iter().chain(&changes.modifications) {
                rows.add(changes.table.clone(), row.clone());
            }
        }
        rows
    }
}

/// Supplies the entities referenced from a row being reconstituted.
pub trait ReferenceResolver {
    /// Find the instance of `entity` whose stored primary key is `key`.
    fn resolve(&self, entity: &str, key: &[Value]) -> Option<Object>;
}

impl<F> ReferenceResolver for F
where
    F: Fn(&str, &[Value]) -> Option<Object>,
{
    fn resolve(&self, entity: &str, key: &[Value]) -> Option<Object> {
        self(entity, key)
    }
}

/// Resolver over objects held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    objects: HashMap<String, Vec<(Vec<Value>, Object)>>,
}

impl MemoryResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object under its stored primary key.
    pub fn insert(&mut self, entity: impl Into<String>, key: Vec<Value>, object: Object) {
        self.objects.entry(entity.into()).or_default().push((key, object));
    }
}

impl ReferenceResolver for MemoryResolver {
    fn resolve(&self, entity: &str, key: &[Value]) -> Option<Object> {
        self.objects.get(entity)?.iter().find_map(|(k, object)| {
            (k.len() == key.len() && k.iter().zip(key).all(|(a, b)| a.same(b))).then(|| object.clone())
        })
    }
}

/// How to rebuild one entity instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Construction {
    /// Call a constructor, then assign the remaining members.
    Call {
        /// Qualified entity name.
        type_name: String,
        /// Constructor identifier.
        constructor: String,
        /// Argument values, by member, in parameter order.
        arguments: Vec<(String, Value)>,
        /// Values assigned after construction, by member.
        setters: Vec<(String, Value)>,
    },
    /// An existing pre-defined instance.
    Instance(Object),
}

impl Construction {
    /// Apply the construction to a plain object.
    pub fn into_object(self) -> Object {
        match self {
            Construction::Call {
                type_name,
                arguments,
                setters,
                ..
            } => {
                let mut object = Object::new(type_name);
                for (member, value) in arguments.into_iter().chain(setters) {
                    object.set(member, value);
                }
                object
            }
            Construction::Instance(object) => object,
        }
    }
}

/// Turns rows back into objects.
#[derive(Debug, Clone, Copy)]
pub struct Reconstitutor<'s> {
    schema: &'s Schema,
}

/// Inputs shared while loading one row.
struct Load<'a> {
    schema: &'a Schema,
    relations: &'a RelationRows,
    resolver: &'a dyn ReferenceResolver,
    owner_key: Vec<Value>,
}

/// Read position in a row.
struct Cells<'r> {
    table: &'r str,
    row: &'r [Value],
    at: usize,
}

impl<'r> Cells<'r> {
    fn new(table: &'r str, row: &'r [Value]) -> Self {
        Self { table, row, at: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'r [Value], MappingError> {
        let cells = self
            .row
            .get(self.at..self.at + n)
            .ok_or_else(|| MappingError::RowArity {
                table: self.table.to_string(),
                expected: self.at + n,
                found: self.row.len(),
            })?;
        self.at += n;
        Ok(cells)
    }

    fn next(&mut self) -> Result<&'r Value, MappingError> {
        Ok(&self.take(1)?[0])
    }
}

impl<'s> Reconstitutor<'s> {
    /// Create a reconstitutor over a schema.
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// Work out how to rebuild an instance from its principal row and the
    /// rows of its relation tables.
    pub fn construct(
        &self,
        entity: &str,
        row: &[Value],
        relations: &RelationRows,
        resolver: &dyn ReferenceResolver,
    ) -> Result<Construction, MappingError> {
        let entity = self
            .schema
            .entity(entity)
            .ok_or_else(|| MappingError::UnknownEntity(entity.to_string()))?;
        check_arity(&entity.table.name, leaves_of(&entity.fields).len(), row)?;

        if entity.pre_defined {
            return lookup(entity, row);
        }
        let Creator::Constructor { id, arguments, setters } = &entity.creator else {
            return lookup(entity, row);
        };

        let load = Load {
            schema: self.schema,
            relations,
            resolver,
            owner_key: key_cells(entity, row),
        };
        let mut cells = Cells::new(&entity.table.name, row);
        let mut members = load.fields(&entity.fields, &mut cells, "")?;

        let mut take = |member: &String| (member.clone(), members.remove(member).unwrap_or(Value::Null));
        let arguments: Vec<(String, Value)> = arguments.iter().map(&mut take).collect();
        let setters: Vec<(String, Value)> = setters.iter().map(&mut take).collect();

        trace!(
            entity = %entity.name,
            constructor = %id,
            arguments = arguments.len(),
            setters = setters.len(),
            "row reconstituted"
        );
        Ok(Construction::Call {
            type_name: entity.name.clone(),
            constructor: id.clone(),
            arguments,
            setters,
        })
    }

    /// Rebuild an instance as a plain object.
    pub fn reconstitute(
        &self,
        entity: &str,
        row: &[Value],
        relations: &RelationRows,
        resolver: &dyn ReferenceResolver,
    ) -> Result<Object, MappingError> {
        self.construct(entity, row, relations, resolver)
            .map(Construction::into_object)
    }
}

fn check_arity(table: &str, expected: usize, row: &[Value]) -> Result<(), MappingError> {
    if row.len() != expected {
        return Err(MappingError::RowArity {
            table: table.to_string(),
            expected,
            found: row.len(),
        });
    }
    Ok(())
}

fn lookup(entity: &Entity, row: &[Value]) -> Result<Construction, MappingError> {
    let key = key_cells(entity, row);
    entity
        .instance_by_key(&key)
        .map(|instance| Construction::Instance(instance.value.clone()))
        .ok_or_else(|| unresolved(&entity.name, &key))
}

fn unresolved(entity: &str, key: &[Value]) -> MappingError {
    MappingError::UnresolvedReference {
        entity: entity.to_string(),
        key: key.iter().map(Value::to_string).collect::<Vec<_>>().join(", "),
    }
}

impl Load<'_> {
    /// Load the members stored for a field list, consuming their cells.
    fn fields(
        &self,
        fields: &[Field],
        cells: &mut Cells<'_>,
        prefix: &str,
    ) -> Result<BTreeMap<String, Value>, MappingError> {
        let mut members = BTreeMap::new();
        for field in fields {
            let path = join_path(prefix, &field.member);
            let value = self.field(field, cells, &path)?;
            members.insert(field.member.clone(), value);
        }
        Ok(members)
    }

    fn field(&self, field: &Field, cells: &mut Cells<'_>, path: &str) -> Result<Value, MappingError> {
        match &field.kind {
            FieldKind::Scalar(leaf) | FieldKind::Enumeration(leaf) => load_leaf(leaf, cells.next()?, path),
            FieldKind::Aggregate(aggregate) => {
                let width = field.leaves().len();
                let stored = cells.take(width)?;
                if field.nullable && stored.iter().all(Value::is_null) {
                    return Ok(Value::Null);
                }
                let mut nested = Cells::new(cells.table, stored);
                let members = self.fields(&aggregate.fields, &mut nested, path)?;
                Ok(Object {
                    type_name: aggregate.type_name.clone(),
                    members,
                }
                .into())
            }
            FieldKind::Reference(reference) => {
                let key = cells.take(field.leaves().len())?;
                if key.iter().all(Value::is_null) {
                    return Ok(Value::Null);
                }
                let closed = self
                    .schema
                    .entity(&reference.target)
                    .filter(|target| target.pre_defined)
                    .and_then(|target| target.instance_by_key(key))
                    .map(|instance| instance.value.clone());
                closed
                    .or_else(|| self.resolver.resolve(&reference.target, key))
                    .map(Value::from)
                    .ok_or_else(|| unresolved(&reference.target, key))
            }
            FieldKind::Relation(relation) => self.relation(relation, path).map(Value::from),
        }
    }

    /// Gather the entries of a relation field owned by the current row.
    fn relation(&self, relation: &Relation, path: &str) -> Result<Collection, MappingError> {
        let width = leaves_of(&relation.fields).len();
        let owner_width = relation
            .fields
            .iter()
            .find(|f| f.member == OWNER)
            .map_or(0, |f| f.leaves().len());

        let mut entries: Vec<(u64, Option<Value>, Value)> = Vec::new();
        for row in self.relations.rows(&relation.table) {
            check_arity(&relation.table, width, row)?;
            let owned = row.len() >= owner_width
                && row[..owner_width].len() == self.owner_key.len()
                && row[..owner_width].iter().zip(&self.owner_key).all(|(a, b)| a.same(b));
            if !owned {
                continue;
            }

            let mut cells = Cells::new(&relation.table, row);
            let mut index = entries.len() as u64;
            let mut key = None;
            let mut value = Value::Null;
            let mut foreign = false;
            for field in &relation.fields {
                match field.member.as_str() {
                    OWNER => {
                        cells.take(owner_width)?;
                    }
                    SOURCE => {
                        foreign = cells.next()?.as_str() != Some(path);
                    }
                    INDEX => {
                        let cell = cells.next()?;
                        index = cell
                            .as_discrete()
                            .and_then(|i| u64::try_from(i).ok())
                            .ok_or_else(|| MappingError::InvalidValue {
                                field: join_path(path, INDEX),
                                reason: format!("{} is not a position", cell),
                            })?;
                    }
                    KEY => key = Some(self.field(field, &mut cells, &join_path(path, KEY))?),
                    ITEM | VALUE => value = self.field(field, &mut cells, &join_path(path, &field.member))?,
                    _ => {
                        cells.take(field.leaves().len())?;
                    }
                }
            }
            if !foreign {
                entries.push((index, key, value));
            }
        }

        if relation.kind.is_positional() {
            entries.sort_by_key(|(index, _, _)| *index);
        }
        Ok(Collection::restored(relation.kind, entries))
    }
}

fn load_leaf(leaf: &Leaf, cell: &Value, path: &str) -> Result<Value, MappingError> {
    leaf.load(cell).map_err(|reason| match &leaf.conversion {
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
