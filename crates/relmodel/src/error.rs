//! Error types.

use std::fmt;

use thiserror::Error;

/// Category of a translation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Unsupported type, illegal nesting, too few fields.
    Shape,
    /// Duplicate or invalid names and paths.
    Naming,
    /// Primary and candidate keys.
    Key,
    /// Constraint domains and satisfiability, defaults.
    Constraint,
    /// Data converters and representation changes.
    Conversion,
    /// Reference cycles and illegal relation placement.
    Structural,
    /// Constructor resolution.
    Reconstitution,
    /// Pre-defined entities and their instances.
    PreDefined,
}

/// The rule a translation violated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // Shape
    /// Type referenced but not declared in the model.
    #[error("type '{0}' is not declared")]
    UnknownType(String),

    /// Type has no relational mapping.
    #[error("type '{ty}' is not supported: {reason}")]
    UnsupportedType {
        /// Offending type.
        ty: String,
        /// Why it is unsupported.
        reason: &'static str,
    },

    /// Root type is not an entity type.
    #[error("type '{0}' cannot be translated as an entity")]
    NotAnEntity(String),

    /// Too few fields.
    #[error("{found} field(s) found, at least {required} required")]
    TooFewFields {
        /// Fields found.
        found: usize,
        /// Fields required.
        required: usize,
    },

    /// Member is marked both included and code-only.
    #[error("member is marked both [Include] and [CodeOnly]")]
    IncludeAndCodeOnly,

    /// Nullable aggregate with no non-nullable nested column.
    #[error("nullable aggregate must contain at least one non-nullable field")]
    NullableAggregateWithoutRequiredField,

    // Naming
    /// Name is empty.
    #[error("name must not be empty")]
    EmptyName,

    /// Table name registered twice.
    #[error("table name '{name}' is already used by '{owner}'")]
    DuplicateTableName {
        /// Table name.
        name: String,
        /// Current holder of the name.
        owner: String,
    },

    /// Two columns of one table share a name.
    #[error("column name '{0}' is used more than once in the table")]
    DuplicateColumnName(String),

    /// Different names applied to one field at one site.
    #[error("field renamed to both '{first}' and '{second}'")]
    NameCardinality {
        /// First name.
        first: String,
        /// Conflicting name.
        second: String,
    },

    /// Path does not resolve.
    #[error("path '{0}' does not exist")]
    NonexistentPath(String),

    /// Marker on a composite field needs a path.
    #[error("[{0}] on a {1} field requires a path")]
    MissingPath(&'static str, &'static str),

    /// Ordinal column position out of range.
    #[error("column position {position} is out of range for {count} column(s)")]
    InvalidColumnPosition {
        /// Declared position.
        position: usize,
        /// Number of sibling fields.
        count: usize,
    },

    /// Ordinal column position declared twice.
    #[error("column position {0} is declared more than once")]
    DuplicateColumnPosition(usize),

    // Keys
    /// No rule deduces a primary key.
    #[error("primary key cannot be deduced")]
    UndeducibleKey,

    /// Primary key column is nullable.
    #[error("primary key column '{0}' is nullable")]
    NullableKeyMember(String),

    /// Primary key drawn from inside a relation.
    #[error("primary key cannot be drawn from a relation")]
    PrimaryKeyInRelation,

    /// Key marker on an aggregate member.
    #[error("[{0}] is not allowed on a member of an aggregate type")]
    KeyMarkerInAggregate(&'static str),

    // Constraints
    /// Constraint not applicable to the field's domain.
    #[error("constraint {constraint} is not applicable to {domain}")]
    InapplicableConstraint {
        /// Constraint label.
        constraint: String,
        /// Domain description.
        domain: String,
    },

    /// Constraint anchor outside the field's domain.
    #[error("anchor {anchor} of constraint {constraint} is not a value of {domain}")]
    InvalidAnchor {
        /// Anchor literal.
        anchor: String,
        /// Constraint label.
        constraint: String,
        /// Domain description.
        domain: String,
    },

    /// Constraint combination admits no value.
    #[error("constraints are unsatisfiable: {0}")]
    Unsatisfiable(String),

    /// Default literal not in the field's domain.
    #[error("default value {value} is not a value of {domain}")]
    InvalidDefault {
        /// Default literal.
        value: String,
        /// Domain description.
        domain: String,
    },

    /// Different defaults declared for one field at one site.
    #[error("field has conflicting defaults {first} and {second}")]
    ConflictingDefaults {
        /// First default.
        first: String,
        /// Conflicting default.
        second: String,
    },

    /// Null default on a non-nullable field.
    #[error("default value null on a non-nullable field")]
    NullDefaultOnNonNullable,

    /// Default violates a constraint.
    #[error("default value {value} violates constraint {constraint}")]
    DefaultContradictsConstraint {
        /// Default literal.
        value: String,
        /// Violated constraint.
        constraint: String,
    },

    /// Custom constraint generator failed.
    #[error("constraint generator '{generator}' failed: {reason}")]
    GeneratorFailed {
        /// Generator name.
        generator: String,
        /// Failure reason.
        reason: String,
    },

    // Conversion
    /// Converter source type differs from the declared type.
    #[error("converter '{converter}' accepts {expected}, field is {found}")]
    ConverterSourceMismatch {
        /// Converter name.
        converter: String,
        /// Converter source type.
        expected: String,
        /// Declared field type.
        found: String,
    },

    /// Converter target type has no scalar or enumeration mapping.
    #[error("converter '{converter}' produces unsupported type {target}")]
    ConverterTargetUnsupported {
        /// Converter name.
        converter: String,
        /// Converter target type.
        target: String,
    },

    /// Converter construction failed.
    #[error("converter '{converter}' could not be constructed: {reason}")]
    ConverterConstruction {
        /// Converter name.
        converter: String,
        /// Failure reason.
        reason: String,
    },

    /// Converter invocation failed.
    #[error("converter '{converter}' failed: {reason}")]
    ConverterInvocation {
        /// Converter name.
        converter: String,
        /// Failure reason.
        reason: String,
    },

    /// Converter on a non-scalar field.
    #[error("[{0}] cannot be applied to a {1} field")]
    InapplicableConverter(&'static str, &'static str),

    /// More than one converter or representation marker.
    #[error("field has more than one converter or representation marker")]
    ConflictingConverters,

    // Structural
    /// Reference cycle.
    #[error("reference cycle: {}", .0.join(" -> "))]
    ReferenceCycle(Vec<String>),

    /// Relation nested in a relation.
    #[error("relation nested inside a relation")]
    RelationInRelation,

    /// Relation nested in a localization value.
    #[error("relation nested inside a localization value")]
    RelationInLocalization,

    // Reconstitution
    /// No constructor can rebuild the type.
    #[error("no viable constructor")]
    NoViableConstructor,

    /// More than one viable constructor of greatest arity.
    #[error("constructors {} are equally viable", .0.join(", "))]
    AmbiguousConstructors(Vec<String>),

    /// Explicitly selected constructor is not viable.
    #[error("constructor '{0}' is not viable")]
    NonViableConstructor(String),

    /// More than one constructor selected explicitly.
    #[error("more than one constructor is marked for reconstitution")]
    MultipleSelectedConstructors,

    /// Field neither covered by the constructor nor settable.
    #[error("field '{0}' is not set by the constructor and has no setter")]
    NotSettable(String),

    // Pre-defined
    /// Pre-defined entity with fewer than two instances.
    #[error("pre-defined entity has {0} instance(s), at least 2 required")]
    TooFewInstances(usize),

    /// Pre-defined entity with a writable field.
    #[error("field '{0}' of a pre-defined entity is writable")]
    WritableField(String),

    /// Pre-defined entity with a public constructor.
    #[error("pre-defined entity has a public constructor '{0}'")]
    PublicConstructor(String),

    /// Customization marker on a pre-defined entity's member.
    #[error("[{marker}] is not allowed on member '{member}' of a pre-defined entity")]
    CustomizedMember {
        /// Member name.
        member: String,
        /// Marker label.
        marker: &'static str,
    },

    /// Instance not exposed through a public member.
    #[error("instance '{0}' is not publicly accessible")]
    InaccessibleInstance(String),

    /// Instance exposed through a writable member.
    #[error("instance '{0}' is exposed through a writable member")]
    MutableInstance(String),

    /// Instance value invalid or incomplete.
    #[error("instance '{instance}' is invalid: {reason}")]
    InvalidInstance {
        /// Instance name.
        instance: String,
        /// What is wrong.
        reason: String,
    },

    /// Two instances with the same key.
    #[error("instances '{first}' and '{second}' have the same primary key")]
    DuplicateInstanceKey {
        /// First instance.
        first: String,
        /// Second instance.
        second: String,
    },

    /// Pre-defined entity referencing a non-pre-defined entity.
    #[error("pre-defined entity references non-pre-defined entity '{0}'")]
    ReferenceToOpenEntity(String),
}

impl ErrorKind {
    /// Category of the violated rule.
    pub fn category(&self) -> ErrorCategory {
        use ErrorKind::*;
        match self {
            UnknownType(_)
            | UnsupportedType { .. }
            | NotAnEntity(_)
            | TooFewFields { .. }
            | IncludeAndCodeOnly
            | NullableAggregateWithoutRequiredField => ErrorCategory::Shape,
            EmptyName
            | DuplicateTableName { .. }
            | DuplicateColumnName(_)
            | NameCardinality { .. }
            | NonexistentPath(_)
            | MissingPath(..)
            | InvalidColumnPosition { .. }
            | DuplicateColumnPosition(_) => ErrorCategory::Naming,
            UndeducibleKey | NullableKeyMember(_) | PrimaryKeyInRelation | KeyMarkerInAggregate(_) => {
                ErrorCategory::Key
            }
            InapplicableConstraint { .. }
            | InvalidAnchor { .. }
            | Unsatisfiable(_)
            | InvalidDefault { .. }
            | ConflictingDefaults { .. }
            | NullDefaultOnNonNullable
            | DefaultContradictsConstraint { .. }
            | GeneratorFailed { .. } => ErrorCategory::Constraint,
            ConverterSourceMismatch { .. }
            | ConverterTargetUnsupported { .. }
            | ConverterConstruction { .. }
            | ConverterInvocation { .. }
            | InapplicableConverter(..)
            | ConflictingConverters => ErrorCategory::Conversion,
            ReferenceCycle(_) | RelationInRelation | RelationInLocalization => {
                ErrorCategory::Structural
            }
            NoViableConstructor
            | AmbiguousConstructors(_)
            | NonViableConstructor(_)
            | MultipleSelectedConstructors
            | NotSettable(_) => ErrorCategory::Reconstitution,
            TooFewInstances(_)
            | WritableField(_)
            | PublicConstructor(_)
            | CustomizedMember { .. }
            | InaccessibleInstance(_)
            | MutableInstance(_)
            | InvalidInstance { .. }
            | DuplicateInstanceKey { .. }
            | ReferenceToOpenEntity(_) => ErrorCategory::PreDefined,
        }
    }
}

/// A failed translation: which entity, which field, which rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct TranslationError {
    /// Qualified name of the entity being translated.
    pub entity: String,
    /// Dotted path of the offending field, in original member names.
    pub field: Option<String>,
    /// Violated rule.
    pub kind: ErrorKind,
}

impl TranslationError {
    /// Create an error concerning an entity as a whole.
    pub fn new(entity: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            entity: entity.into(),
            field: None,
            kind,
        }
    }

    /// Create an error concerning a field of an entity.
    pub fn at(entity: impl Into<String>, field: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            entity: entity.into(),
            field: Some(field.into()),
            kind,
        }
    }

    /// Category of the violated rule.
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "entity '{}', field '{}': {}", self.entity, field, self.kind),
            None => write!(f, "entity '{}': {}", self.entity, self.kind),
        }
    }
}

/// Failure at data-access time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    /// Entity not part of the schema.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// Object of the wrong type.
    #[error("expected an instance of '{expected}', got '{found}'")]
    TypeMismatch {
        /// Expected type.
        expected: String,
        /// Actual type.
        found: String,
    },

    /// Member missing from an object.
    #[error("member '{0}' is missing")]
    MissingMember(String),

    /// Value of the wrong shape for its field.
    #[error("value of field '{field}' is invalid: {reason}")]
    InvalidValue {
        /// Field path.
        field: String,
        /// What is wrong.
        reason: String,
    },

    /// Row with the wrong number of cells.
    #[error("row for table '{table}' has {found} value(s), expected {expected}")]
    RowArity {
        /// Table name.
        table: String,
        /// Expected cell count.
        expected: usize,
        /// Actual cell count.
        found: usize,
    },

    /// Referenced object not available.
    #[error("no '{entity}' instance with key ({key})")]
    UnresolvedReference {
        /// Referenced entity.
        entity: String,
        /// Key values.
        key: String,
    },

    /// Converter failed at data-access time.
    #[error("converter '{converter}' failed on field '{field}': {reason}")]
    Conversion {
        /// Converter name.
        converter: String,
        /// Field path.
        field: String,
        /// Failure reason.
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration value out of range.
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue {
        /// Setting name.
        key: &'static str,
        /// What is wrong.
        reason: String,
    },
}

/// Result type for translation.
pub type Result<T, E = TranslationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TranslationError::at(
            "Shop.Customer",
            "Address.City",
            ErrorKind::DuplicateColumnName("City".into()),
        );
        let text = err.to_string();
        assert!(text.contains("Shop.Customer"));
        assert!(text.contains("Address.City"));
        assert!(text.contains("'City'"));
        assert_eq!(err.category(), ErrorCategory::Naming);
    }

    #[test]
    fn test_cycle_display() {
        let kind = ErrorKind::ReferenceCycle(vec!["A".into(), "B".into(), "A".into()]);
        assert_eq!(kind.to_string(), "reference cycle: A -> B -> A");
        assert_eq!(kind.category(), ErrorCategory::Structural);
    }

    #[test]
    fn test_categories() {
        assert_eq!(ErrorKind::UndeducibleKey.category(), ErrorCategory::Key);
        assert_eq!(
            ErrorKind::Unsatisfiable("x".into()).category(),
            ErrorCategory::Constraint
        );
        assert_eq!(
            ErrorKind::AmbiguousConstructors(vec![]).category(),
            ErrorCategory::Reconstitution
        );
        assert_eq!(ErrorKind::TooFewInstances(1).category(), ErrorCategory::PreDefined);
    }
}
