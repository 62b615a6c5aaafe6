//! Field trees of translated entities.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::constraint::ConstraintSet;
use crate::metadata::{Annotation, DataConverter, EnumDecl, TypeRef};
use crate::value::{CollectionKind, ScalarType, Value};

/// Data type of a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DataType {
    /// Built-in scalar.
    Scalar(ScalarType),
    /// Enumeration stored by variant.
    Enumeration {
        /// Qualified enumeration type name.
        name: String,
        /// Variants.
        decl: EnumDecl,
    },
}

impl DataType {
    /// Check if values of this type can be compared with an ordering.
    pub fn is_ordered(&self) -> bool {
        matches!(self, DataType::Scalar(s) if s.is_ordered())
    }

    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Scalar(s) if s.is_numeric())
    }

    /// Check if this type is textual.
    pub fn is_textual(&self) -> bool {
        matches!(self, DataType::Scalar(s) if s.is_textual())
    }

    /// Bring a non-null value into the canonical representation of this type.
    pub fn normalize(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (DataType::Scalar(s), v) => s.normalize(v),
            (DataType::Enumeration { decl, .. }, Value::Enum(literal)) => {
                decl.canonical(literal).map(Value::Enum)
            }
            _ => None,
        }
    }

    /// A representative non-null value of this type.
    pub fn probe(&self) -> Option<Value> {
        match self {
            DataType::Scalar(s) => Some(s.probe()),
            DataType::Enumeration { decl, .. } => {
                decl.variants.first().map(|v| Value::Enum(v.name.clone()))
            }
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Scalar(s) => write!(f, "{}", s),
            DataType::Enumeration { name, .. } => write!(f, "{}", name),
        }
    }
}

/// A bound data converter.
#[derive(Clone, Serialize)]
pub struct Conversion {
    /// Converter name.
    pub name: String,
    /// Declared type the converter accepts.
    pub source: TypeRef,
    /// Stored type the converter produces.
    pub target: TypeRef,
    #[serde(skip)]
    pub(crate) converter: Arc<dyn DataConverter>,
}

impl Conversion {
    pub(crate) fn new(name: impl Into<String>, converter: Arc<dyn DataConverter>) -> Self {
        Self {
            name: name.into(),
            source: converter.source(),
            target: converter.target(),
            converter,
        }
    }

    /// Convert a declared value to its stored form.
    pub fn convert(&self, value: &Value) -> Result<Value, String> {
        self.converter.convert(value)
    }

    /// Convert a stored value to its declared form.
    pub fn revert(&self, value: &Value) -> Result<Value, String> {
        self.converter.revert(value)
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversion")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

/// How an enumeration leaf is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Representation {
    /// By variant.
    Native,
    /// As the underlying integer.
    Numeric,
    /// As the variant name.
    Text,
}

/// A field stored in exactly one column.
#[derive(Debug, Clone, Serialize)]
pub struct Leaf {
    /// Final column name.
    pub column: String,
    /// Declared domain.
    pub domain: DataType,
    /// Stored domain, after conversion or representation change.
    pub data_type: DataType,
    /// Enumeration representation.
    pub representation: Representation,
    /// Bound converter.
    pub conversion: Option<Conversion>,
    /// Default, in the stored domain.
    pub default: Option<Value>,
    /// Constraints, in the stored domain.
    pub constraints: ConstraintSet,
}

impl Leaf {
    pub(crate) fn new(domain: DataType) -> Self {
        Self {
            column: String::new(),
            data_type: domain.clone(),
            domain,
            representation: Representation::Native,
            conversion: None,
            default: None,
            constraints: ConstraintSet::default(),
        }
    }

    /// Convert a declared value to its stored form. Null passes through.
    pub fn store(&self, value: &Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let declared = self
            .domain
            .normalize(value)
            .ok_or_else(|| format!("{} is not a value of {}", value, self.domain))?;
        let stored = match (&self.conversion, self.representation, &self.domain) {
            (Some(conversion), _, _) => conversion.convert(&declared)?,
            (None, Representation::Numeric, DataType::Enumeration { decl, .. }) => {
                let literal = enum_literal(&declared)?;
                decl.value_of(literal)
                    .map(Value::Int)
                    .ok_or_else(|| format!("'{}' is not a variant", literal))?
            }
            (None, Representation::Text, _) => Value::String(enum_literal(&declared)?.to_string()),
            (None, _, _) => declared,
        };
        if stored.is_null() {
            return Ok(stored);
        }
        self.data_type
            .normalize(&stored)
            .ok_or_else(|| format!("{} is not a value of {}", stored, self.data_type))
    }

    /// Convert a stored value to its declared form. Null passes through.
    pub fn load(&self, value: &Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match (&self.conversion, self.representation, &self.domain) {
            (Some(conversion), _, _) => conversion.revert(value),
            (None, Representation::Numeric, DataType::Enumeration { decl, .. }) => {
                let number = match value {
                    Value::Int(i) => *i,
                    Value::UInt(u) => *u as i64,
                    other => return Err(format!("{} is not an enumeration value", other)),
                };
                decl.literal_of(number)
                    .map(Value::Enum)
                    .ok_or_else(|| format!("{} is not a variant value", number))
            }
            (None, Representation::Text, _) => match value {
                Value::String(s) => Ok(Value::Enum(s.clone())),
                other => Err(format!("{} is not a variant name", other)),
            },
            (None, _, _) => Ok(value.clone()),
        }
    }
}

fn enum_literal(value: &Value) -> Result<&str, String> {
    match value {
        Value::Enum(literal) => Ok(literal),
        other => Err(format!("{} is not an enumeration value", other)),
    }
}

/// How a composite value is rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Creator {
    /// Call a constructor, then assign the remaining fields.
    Constructor {
        /// Constructor identifier.
        id: String,
        /// Fields passed as arguments, by member name, in parameter order.
        arguments: Vec<String>,
        /// Fields assigned after construction, by member name.
        setters: Vec<String>,
    },
    /// Look the instance up in the pre-defined instance registry.
    Lookup,
}

/// An embedded aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregate {
    /// Qualified aggregate type name.
    pub type_name: String,
    /// Nested fields.
    pub fields: Vec<Field>,
    /// How instances are rebuilt.
    pub creator: Creator,
}

/// A reference to another entity, stored as that entity's primary key.
#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    /// Qualified target entity name.
    pub target: String,
    /// Target principal table.
    pub table: String,
    /// Target primary-key fields, re-projected as local fields.
    pub fields: Vec<Field>,
}

/// A collection stored in its own table.
#[derive(Debug, Clone, Serialize)]
pub struct Relation {
    /// Collection semantics.
    pub kind: CollectionKind,
    /// Map key type, for maps.
    pub key: Option<TypeRef>,
    /// Element (or map value) type.
    pub element: TypeRef,
    /// Relation table name; empty until the relation table is built.
    pub table: String,
    /// Whether the table is shared with other relation fields.
    pub shared: bool,
    /// Relation table fields: owner, discriminator and element.
    pub fields: Vec<Field>,
    /// Markers addressed into the relation table, applied once it is built.
    #[serde(skip)]
    pub(crate) pending: Vec<Annotation>,
}

impl Relation {
    pub(crate) fn new(kind: CollectionKind, key: Option<TypeRef>, element: TypeRef) -> Self {
        Self {
            kind,
            key,
            element,
            table: String::new(),
            shared: false,
            fields: Vec::new(),
            pending: Vec::new(),
        }
    }
}

/// Shape-specific part of a field.
#[derive(Debug, Clone, Serialize)]
pub enum FieldKind {
    /// Built-in scalar.
    Scalar(Leaf),
    /// Enumeration.
    Enumeration(Leaf),
    /// Embedded value group.
    Aggregate(Aggregate),
    /// Reference to another entity.
    Reference(Reference),
    /// Collection relation.
    Relation(Relation),
}

/// A translated field.
#[derive(Debug, Clone, Serialize)]
pub struct Field {
    /// Original member name.
    pub member: String,
    /// Current name, after renames.
    pub name: String,
    /// Declared type.
    pub declared: TypeRef,
    /// Whether the field itself may be null.
    pub nullable: bool,
    /// Whether the field can be assigned after construction.
    pub settable: bool,
    /// Declared ordinal position among siblings.
    pub position: Option<usize>,
    /// Shape-specific part.
    pub kind: FieldKind,
}

impl Field {
    /// Short description of the field's kind.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            FieldKind::Scalar(_) => "scalar",
            FieldKind::Enumeration(_) => "enumeration",
            FieldKind::Aggregate(_) => "aggregate",
            FieldKind::Reference(_) => "reference",
            FieldKind::Relation(_) => "relation",
        }
    }

    /// Leaf part of a scalar or enumeration field.
    pub fn leaf(&self) -> Option<&Leaf> {
        match &self.kind {
            FieldKind::Scalar(leaf) | FieldKind::Enumeration(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub(crate) fn leaf_mut(&mut self) -> Option<&mut Leaf> {
        match &mut self.kind {
            FieldKind::Scalar(leaf) | FieldKind::Enumeration(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Relation part of a relation field.
    pub fn relation(&self) -> Option<&Relation> {
        match &self.kind {
            FieldKind::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    /// Nested fields stored in the same table (aggregates and references).
    pub fn children(&self) -> &[Field] {
        match &self.kind {
            FieldKind::Aggregate(a) => &a.fields,
            FieldKind::Reference(r) => &r.fields,
            _ => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<Field>> {
        match &mut self.kind {
            FieldKind::Aggregate(a) => Some(&mut a.fields),
            FieldKind::Reference(r) => Some(&mut r.fields),
            FieldKind::Relation(r) => Some(&mut r.fields),
            _ => None,
        }
    }

    /// Check if the field is stored in its owner's table.
    pub fn is_inline(&self) -> bool {
        !matches!(self.kind, FieldKind::Relation(_))
    }

    /// Leaves stored in the owner's table, depth-first, with their effective
    /// nullability (any nullable ancestor makes a leaf nullable).
    pub fn leaves(&self) -> Vec<(&Leaf, bool)> {
        let mut out = Vec::new();
        collect_leaves(std::slice::from_ref(self), false, &mut out);
        out
    }

    /// Check if every leaf of this field is nullable.
    pub fn all_leaves_nullable(&self) -> bool {
        self.leaves().iter().all(|(_, nullable)| *nullable)
    }
}

/// Leaves of a field list stored in one table, depth-first.
pub fn leaves_of(fields: &[Field]) -> Vec<(&Leaf, bool)> {
    let mut out = Vec::new();
    collect_leaves(fields, false, &mut out);
    out
}

fn collect_leaves<'a>(fields: &'a [Field], nullable: bool, out: &mut Vec<(&'a Leaf, bool)>) {
    for field in fields {
        let nullable = nullable || field.nullable;
        match &field.kind {
            FieldKind::Scalar(leaf) | FieldKind::Enumeration(leaf) => out.push((leaf, nullable)),
            FieldKind::Aggregate(a) => collect_leaves(&a.fields, nullable, out),
            FieldKind::Reference(r) => collect_leaves(&r.fields, nullable, out),
            FieldKind::Relation(_) => {}
        }
    }
}
