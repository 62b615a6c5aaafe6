//! Declarative markers attached to members.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::types::TypeRef;
use crate::schema::DataType;
use crate::value::Value;

/// A marker attached to a member.
///
/// Markers that target a nested field carry a `.`-separated path relative to
/// the annotated member.
#[derive(Debug, Clone)]
pub enum Annotation {
    /// Include the member even if default rules would exclude it.
    Include,
    /// Exclude the member from the data model.
    CodeOnly,
    /// Mark the member (or a nested field) as part of the primary key.
    PrimaryKey {
        /// Nested path.
        path: Option<String>,
    },
    /// Mark the member (or a nested field) as part of a candidate key.
    Unique {
        /// Key name; unnamed markers each form their own key.
        name: Option<String>,
        /// Nested path.
        path: Option<String>,
    },
    /// Override the name of the member (or a nested field).
    Name {
        /// New name.
        name: String,
        /// Nested path.
        path: Option<String>,
    },
    /// Override the table name of a relation.
    RelationTable {
        /// Table name.
        name: String,
        /// Path to a relation nested in an aggregate.
        path: Option<String>,
    },
    /// Default value of the member (or a nested field).
    Default {
        /// Default literal.
        value: Value,
        /// Nested path.
        path: Option<String>,
    },
    /// Integrity constraint on the member (or a nested field).
    Check {
        /// Constraint.
        constraint: ConstraintDecl,
        /// Nested path.
        path: Option<String>,
    },
    /// Data converter for the member.
    Convert(ConverterDecl),
    /// Store an enumeration as its underlying number.
    Numeric,
    /// Store an enumeration as its variant name.
    AsString,
    /// Ordinal position among sibling columns.
    Column(usize),
}

impl Annotation {
    /// Primary-key marker on the member itself.
    pub fn primary_key() -> Self {
        Annotation::PrimaryKey { path: None }
    }

    /// Primary-key marker on a nested field.
    pub fn primary_key_at(path: impl Into<String>) -> Self {
        Annotation::PrimaryKey {
            path: Some(path.into()),
        }
    }

    /// Unnamed candidate-key marker.
    pub fn unique() -> Self {
        Annotation::Unique {
            name: None,
            path: None,
        }
    }

    /// Named candidate-key marker.
    pub fn unique_named(name: impl Into<String>) -> Self {
        Annotation::Unique {
            name: Some(name.into()),
            path: None,
        }
    }

    /// Unnamed candidate-key marker on a nested field.
    pub fn unique_at(path: impl Into<String>) -> Self {
        Annotation::Unique {
            name: None,
            path: Some(path.into()),
        }
    }

    /// Name override.
    pub fn name(name: impl Into<String>) -> Self {
        Annotation::Name {
            name: name.into(),
            path: None,
        }
    }

    /// Name override of a nested field.
    pub fn name_at(name: impl Into<String>, path: impl Into<String>) -> Self {
        Annotation::Name {
            name: name.into(),
            path: Some(path.into()),
        }
    }

    /// Relation table name override.
    pub fn relation_table(name: impl Into<String>) -> Self {
        Annotation::RelationTable {
            name: name.into(),
            path: None,
        }
    }

    /// Default value.
    pub fn default_value(value: impl Into<Value>) -> Self {
        Annotation::Default {
            value: value.into(),
            path: None,
        }
    }

    /// Default value of a nested field.
    pub fn default_at(value: impl Into<Value>, path: impl Into<String>) -> Self {
        Annotation::Default {
            value: value.into(),
            path: Some(path.into()),
        }
    }

    /// Constraint.
    pub fn check(constraint: ConstraintDecl) -> Self {
        Annotation::Check {
            constraint,
            path: None,
        }
    }

    /// Constraint on a nested field.
    pub fn check_at(constraint: ConstraintDecl, path: impl Into<String>) -> Self {
        Annotation::Check {
            constraint,
            path: Some(path.into()),
        }
    }

    /// Nested path of the marker, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Annotation::PrimaryKey { path }
            | Annotation::Unique { path, .. }
            | Annotation::Name { path, .. }
            | Annotation::RelationTable { path, .. }
            | Annotation::Default { path, .. }
            | Annotation::Check { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    /// Copy of the marker retargeted to another path.
    pub fn with_path(&self, new_path: Option<String>) -> Self {
        let mut copy = self.clone();
        match &mut copy {
            Annotation::PrimaryKey { path }
            | Annotation::Unique { path, .. }
            | Annotation::Name { path, .. }
            | Annotation::RelationTable { path, .. }
            | Annotation::Default { path, .. }
            | Annotation::Check { path, .. } => *path = new_path,
            _ => {}
        }
        copy
    }

    /// Short marker name for diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Annotation::Include => "Include",
            Annotation::CodeOnly => "CodeOnly",
            Annotation::PrimaryKey { .. } => "PrimaryKey",
            Annotation::Unique { .. } => "Unique",
            Annotation::Name { .. } => "Name",
            Annotation::RelationTable { .. } => "RelationTable",
            Annotation::Default { .. } => "Default",
            Annotation::Check { .. } => "Check",
            Annotation::Convert(_) => "DataConverter",
            Annotation::Numeric => "Numeric",
            Annotation::AsString => "AsString",
            Annotation::Column(_) => "Column",
        }
    }
}

/// Sign requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Sign {
    /// Strictly greater than zero.
    Positive,
    /// Strictly less than zero.
    Negative,
    /// Different from zero.
    NonZero,
}

/// Comparison operator of a comparison constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ComparisonOp {
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessOrEqual,
}

impl ComparisonOp {
    /// Check if the operator bounds values from below.
    pub fn is_lower(&self) -> bool {
        matches!(self, ComparisonOp::GreaterThan | ComparisonOp::GreaterOrEqual)
    }

    /// Check if the bound itself is admitted.
    pub fn is_inclusive(&self) -> bool {
        matches!(self, ComparisonOp::GreaterOrEqual | ComparisonOp::LessOrEqual)
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::GreaterOrEqual => ">=",
            ComparisonOp::LessThan => "<",
            ComparisonOp::LessOrEqual => "<=",
        };
        write!(f, "{}", op)
    }
}

/// A declared integrity constraint.
#[derive(Clone)]
pub enum ConstraintDecl {
    /// Sign requirement on a numeric field.
    Sign(Sign),
    /// Comparison against an anchor literal.
    Compare(ComparisonOp, Value),
    /// Length bounds on a textual field.
    Length {
        /// Minimum length.
        min: Option<usize>,
        /// Maximum length.
        max: Option<usize>,
    },
    /// Values must be one of the listed literals.
    OneOf(Vec<Value>),
    /// Values must not be any of the listed literals.
    NotOneOf(Vec<Value>),
    /// Constraint produced by a user-supplied generator.
    Custom {
        /// Generator.
        generator: Arc<dyn CheckGenerator>,
        /// Generator arguments.
        args: Vec<Value>,
    },
}

impl ConstraintDecl {
    /// `> anchor`
    pub fn greater_than(anchor: impl Into<Value>) -> Self {
        ConstraintDecl::Compare(ComparisonOp::GreaterThan, anchor.into())
    }

    /// `>= anchor`
    pub fn greater_or_equal(anchor: impl Into<Value>) -> Self {
        ConstraintDecl::Compare(ComparisonOp::GreaterOrEqual, anchor.into())
    }

    /// `< anchor`
    pub fn less_than(anchor: impl Into<Value>) -> Self {
        ConstraintDecl::Compare(ComparisonOp::LessThan, anchor.into())
    }

    /// `<= anchor`
    pub fn less_or_equal(anchor: impl Into<Value>) -> Self {
        ConstraintDecl::Compare(ComparisonOp::LessOrEqual, anchor.into())
    }

    /// Minimum length.
    pub fn min_length(min: usize) -> Self {
        ConstraintDecl::Length {
            min: Some(min),
            max: None,
        }
    }

    /// Maximum length.
    pub fn max_length(max: usize) -> Self {
        ConstraintDecl::Length {
            min: None,
            max: Some(max),
        }
    }

    /// Allowed values.
    pub fn one_of(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        ConstraintDecl::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Disallowed values.
    pub fn not_one_of(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        ConstraintDecl::NotOneOf(values.into_iter().map(Into::into).collect())
    }

    /// Short constraint name for diagnostics.
    pub fn label(&self) -> String {
        match self {
            ConstraintDecl::Sign(sign) => format!("Is{:?}", sign),
            ConstraintDecl::Compare(op, anchor) => format!("{} {}", op, anchor),
            ConstraintDecl::Length { .. } => "StringLength".to_string(),
            ConstraintDecl::OneOf(_) => "IsOneOf".to_string(),
            ConstraintDecl::NotOneOf(_) => "IsNotOneOf".to_string(),
            ConstraintDecl::Custom { generator, .. } => generator.name().to_string(),
        }
    }
}

impl fmt::Debug for ConstraintDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintDecl::Sign(sign) => f.debug_tuple("Sign").field(sign).finish(),
            ConstraintDecl::Compare(op, anchor) => {
                f.debug_tuple("Compare").field(op).field(anchor).finish()
            }
            ConstraintDecl::Length { min, max } => f
                .debug_struct("Length")
                .field("min", min)
                .field("max", max)
                .finish(),
            ConstraintDecl::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            ConstraintDecl::NotOneOf(values) => f.debug_tuple("NotOneOf").field(values).finish(),
            ConstraintDecl::Custom { generator, args } => f
                .debug_struct("Custom")
                .field("generator", &generator.name())
                .field("args", args)
                .finish(),
        }
    }
}

/// A user-supplied generator of custom check constraints.
pub trait CheckGenerator: Send + Sync {
    /// Generator name.
    fn name(&self) -> &str;

    /// Produce a check expression for a column.
    ///
    /// Receives the final column name and its post-conversion data type.
    fn generate(&self, column: &str, data_type: &DataType, args: &[Value]) -> Result<String, String>;
}

/// A bidirectional value conversion between a declared type and its stored
/// representation.
pub trait DataConverter: Send + Sync {
    /// Type the converter accepts.
    fn source(&self) -> TypeRef;

    /// Type the converter produces.
    fn target(&self) -> TypeRef;

    /// Convert a declared value to its stored representation.
    fn convert(&self, value: &Value) -> Result<Value, String>;

    /// Convert a stored value back to its declared representation.
    fn revert(&self, value: &Value) -> Result<Value, String>;
}

type ConvertFn = dyn Fn(&Value) -> Result<Value, String> + Send + Sync;

/// A converter built from a pair of functions.
pub struct FnConverter {
    source: TypeRef,
    target: TypeRef,
    convert: Box<ConvertFn>,
    revert: Box<ConvertFn>,
}

impl FnConverter {
    /// Create a converter from conversion functions.
    pub fn new(
        source: TypeRef,
        target: TypeRef,
        convert: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
        revert: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            target,
            convert: Box::new(convert),
            revert: Box::new(revert),
        }
    }
}

impl DataConverter for FnConverter {
    fn source(&self) -> TypeRef {
        self.source.clone()
    }

    fn target(&self) -> TypeRef {
        self.target.clone()
    }

    fn convert(&self, value: &Value) -> Result<Value, String> {
        (self.convert)(value)
    }

    fn revert(&self, value: &Value) -> Result<Value, String> {
        (self.revert)(value)
    }
}

type ConstructFn = dyn Fn() -> Result<Arc<dyn DataConverter>, String> + Send + Sync;

/// A converter marker: names the converter and how to construct it.
#[derive(Clone)]
pub struct ConverterDecl {
    /// Converter name for diagnostics.
    pub name: String,
    construct: Arc<ConstructFn>,
}

impl ConverterDecl {
    /// Create a converter marker from a construction function.
    pub fn new(
        name: impl Into<String>,
        construct: impl Fn() -> Result<Arc<dyn DataConverter>, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            construct: Arc::new(construct),
        }
    }

    /// Create a converter marker around an already-constructed converter.
    pub fn of(name: impl Into<String>, converter: impl DataConverter + 'static) -> Self {
        let converter: Arc<dyn DataConverter> = Arc::new(converter);
        Self::new(name, move || Ok(converter.clone()))
    }

    /// Construct the converter.
    pub fn construct(&self) -> Result<Arc<dyn DataConverter>, String> {
        (self.construct)()
    }
}

impl fmt::Debug for ConverterDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterDecl")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
