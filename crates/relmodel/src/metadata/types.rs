//! Type references and type declarations.

use std::fmt;

use serde::Serialize;

use super::member::{ConstructorDecl, InstanceDecl, MemberDecl};
use crate::value::{CollectionKind, ScalarType};

/// A reference to a type, as written on a member or parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TypeRef {
    /// A built-in scalar.
    Scalar(ScalarType),
    /// A user-defined type declared in the model, by qualified name.
    Named(String),
    /// Optional wrapper.
    Nullable(Box<TypeRef>),
    /// List, set or ordered list of elements.
    Collection {
        /// Collection semantics.
        kind: CollectionKind,
        /// Element type.
        element: Box<TypeRef>,
    },
    /// Key/value map.
    Map {
        /// Key type.
        key: Box<TypeRef>,
        /// Value type.
        value: Box<TypeRef>,
    },
    /// Opaque localization wrapper around a value type.
    Localized(Box<TypeRef>),
    /// Dynamically-typed value.
    Dynamic,
    /// Raw pointer.
    Pointer(Box<TypeRef>),
    /// By-reference binding.
    ByRef(Box<TypeRef>),
    /// Unbound generic type parameter.
    GenericParam(String),
    /// Any other library type with no relational mapping.
    Unsupported(String),
}

impl TypeRef {
    /// Create a scalar type reference.
    pub fn scalar(scalar: ScalarType) -> Self {
        TypeRef::Scalar(scalar)
    }

    /// Create a reference to a declared type.
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// Wrap in a nullable wrapper. Already-nullable types are returned as is.
    pub fn nullable(self) -> Self {
        if self.is_nullable() {
            self
        } else {
            TypeRef::Nullable(Box::new(self))
        }
    }

    /// Create a list type.
    pub fn list(element: TypeRef) -> Self {
        TypeRef::Collection {
            kind: CollectionKind::List,
            element: Box::new(element),
        }
    }

    /// Create a set type.
    pub fn set(element: TypeRef) -> Self {
        TypeRef::Collection {
            kind: CollectionKind::Set,
            element: Box::new(element),
        }
    }

    /// Create an ordered list type.
    pub fn ordered_list(element: TypeRef) -> Self {
        TypeRef::Collection {
            kind: CollectionKind::OrderedList,
            element: Box::new(element),
        }
    }

    /// Create a map type.
    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        TypeRef::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// Wrap in the localization wrapper.
    pub fn localized(inner: TypeRef) -> Self {
        TypeRef::Localized(Box::new(inner))
    }

    /// Check if this type is nullable.
    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeRef::Nullable(_))
    }

    /// The type with any nullable wrapper removed.
    pub fn non_nullable(&self) -> &TypeRef {
        match self {
            TypeRef::Nullable(inner) => inner.non_nullable(),
            other => other,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Scalar(s) => write!(f, "{}", s),
            TypeRef::Named(n) => write!(f, "{}", n),
            TypeRef::Nullable(inner) => write!(f, "{}?", inner),
            TypeRef::Collection { kind, element } => write!(f, "{:?}<{}>", kind, element),
            TypeRef::Map { key, value } => write!(f, "Map<{}, {}>", key, value),
            TypeRef::Localized(inner) => write!(f, "Localized<{}>", inner),
            TypeRef::Dynamic => write!(f, "dynamic"),
            TypeRef::Pointer(inner) => write!(f, "{}*", inner),
            TypeRef::ByRef(inner) => write!(f, "ref {}", inner),
            TypeRef::GenericParam(p) => write!(f, "{}", p),
            TypeRef::Unsupported(n) => write!(f, "{}", n),
        }
    }
}

/// A variant of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EnumVariant {
    /// Variant name.
    pub name: String,
    /// Underlying numeric value.
    pub value: i64,
}

/// An enumeration declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EnumDecl {
    /// Declared variants, in declaration order.
    pub variants: Vec<EnumVariant>,
    /// Whether values are bit-flag combinations of variants.
    pub flags: bool,
    /// Underlying integer type.
    pub underlying: ScalarType,
}

impl EnumDecl {
    /// Create an enumeration whose variants are numbered from zero.
    pub fn new(variants: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            variants: variants
                .into_iter()
                .enumerate()
                .map(|(i, name)| EnumVariant {
                    name: name.into(),
                    value: i as i64,
                })
                .collect(),
            flags: false,
            underlying: ScalarType::Int32,
        }
    }

    /// Create a flags enumeration whose variants are successive powers of two.
    pub fn flags(variants: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            variants: variants
                .into_iter()
                .enumerate()
                .map(|(i, name)| EnumVariant {
                    name: name.into(),
                    value: 1i64 << i,
                })
                .collect(),
            flags: true,
            underlying: ScalarType::Int32,
        }
    }

    /// Set the underlying integer type.
    pub fn with_underlying(mut self, underlying: ScalarType) -> Self {
        self.underlying = underlying;
        self
    }

    /// Get a variant by name.
    pub fn variant(&self, name: &str) -> Option<&EnumVariant> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Numeric value of an enumeration literal, if it is valid.
    ///
    /// Flag enumerations accept `|`-separated combinations of variants.
    pub fn value_of(&self, literal: &str) -> Option<i64> {
        if self.flags {
            let mut total = 0i64;
            for part in literal.split('|') {
                total |= self.variant(part.trim())?.value;
            }
            Some(total)
        } else {
            self.variant(literal).map(|v| v.value)
        }
    }

    /// Enumeration literal for a numeric value, if it is valid.
    pub fn literal_of(&self, value: i64) -> Option<String> {
        if self.flags {
            let mut parts = Vec::new();
            let mut remaining = value;
            for variant in &self.variants {
                if variant.value != 0 && value & variant.value == variant.value {
                    parts.push(variant.name.clone());
                    remaining &= !variant.value;
                }
            }
            if remaining != 0 {
                return None;
            }
            if parts.is_empty() {
                return self
                    .variants
                    .iter()
                    .find(|v| v.value == 0)
                    .map(|v| v.name.clone());
            }
            Some(parts.join("|"))
        } else {
            self.variants
                .iter()
                .find(|v| v.value == value)
                .map(|v| v.name.clone())
        }
    }

    /// Canonical form of an enumeration literal, if it is valid.
    pub fn canonical(&self, literal: &str) -> Option<String> {
        self.value_of(literal).and_then(|v| self.literal_of(v))
    }
}

/// The shape of a declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeShape {
    /// Reference type with identity; translatable as an entity.
    Class,
    /// Value-group type without identity; embedded as an aggregate.
    Struct,
    /// Enumeration.
    Enum(EnumDecl),
    /// Capability contract.
    Interface,
}

/// A user-defined type declaration.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    /// Qualified name (namespace segments separated by `.`).
    pub name: String,
    /// Shape of the type.
    pub shape: TypeShape,
    /// Whether the type is abstract.
    pub is_abstract: bool,
    /// Unbound generic parameters; non-empty means an open generic type.
    pub generic_params: Vec<String>,
    /// Base type, by qualified name.
    pub base: Option<String>,
    /// Declared members, in declaration order.
    pub members: Vec<MemberDecl>,
    /// Declared constructors.
    pub constructors: Vec<ConstructorDecl>,
    /// Explicit principal table name.
    pub table_name: Option<String>,
    /// Whether the entity is pre-defined (closed).
    pub pre_defined: bool,
    /// Pre-defined instances.
    pub instances: Vec<InstanceDecl>,
}

impl TypeDecl {
    fn with_shape(name: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
            is_abstract: false,
            generic_params: Vec::new(),
            base: None,
            members: Vec::new(),
            constructors: Vec::new(),
            table_name: None,
            pre_defined: false,
            instances: Vec::new(),
        }
    }

    /// Create a class declaration.
    pub fn class(name: impl Into<String>) -> Self {
        Self::with_shape(name, TypeShape::Class)
    }

    /// Create a struct declaration.
    pub fn structure(name: impl Into<String>) -> Self {
        Self::with_shape(name, TypeShape::Struct)
    }

    /// Create an enumeration declaration.
    pub fn enumeration(name: impl Into<String>, decl: EnumDecl) -> Self {
        Self::with_shape(name, TypeShape::Enum(decl))
    }

    /// Create an interface declaration.
    pub fn interface(name: impl Into<String>) -> Self {
        Self::with_shape(name, TypeShape::Interface)
    }

    /// Mark as abstract.
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Add unbound generic parameters.
    pub fn with_generic_params(mut self, params: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.generic_params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Set the base type.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Add a member.
    pub fn with_member(mut self, member: MemberDecl) -> Self {
        self.members.push(member);
        self
    }

    /// Add multiple members.
    pub fn with_members(mut self, members: impl IntoIterator<Item = MemberDecl>) -> Self {
        self.members.extend(members);
        self
    }

    /// Add a constructor.
    pub fn with_constructor(mut self, constructor: ConstructorDecl) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Set the principal table name.
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Mark as pre-defined.
    pub fn pre_defined(mut self) -> Self {
        self.pre_defined = true;
        self
    }

    /// Add a pre-defined instance.
    pub fn with_instance(mut self, instance: InstanceDecl) -> Self {
        self.instances.push(instance);
        self
    }

    /// Type name without its namespace prefix.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    /// Enumeration declaration, if this is an enumeration.
    pub fn as_enum(&self) -> Option<&EnumDecl> {
        match &self.shape {
            TypeShape::Enum(decl) => Some(decl),
            _ => None,
        }
    }

    /// Get a declared member by name.
    pub fn member(&self, name: &str) -> Option<&MemberDecl> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Strip the namespace prefix from a qualified name.
pub fn short_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}
