//! Member, constructor and instance declarations.

use super::annotation::Annotation;
use super::types::TypeRef;
use crate::value::Object;

/// Accessibility of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Visibility {
    /// Visible to the declaring type only.
    Private,
    /// Visible to the declaring type and derived types.
    Protected,
    /// Visible within the declaring assembly.
    Internal,
    /// Visible everywhere.
    Public,
}

/// How a member relates to declarations of the same name in base types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A new, non-virtual declaration.
    Introduced,
    /// A new declaration that derived types may override.
    Virtual,
    /// Overrides a virtual declaration of a base type.
    Override,
    /// Hides a base declaration of the same name with a new one.
    Hides,
}

/// A declared data member (property or field).
#[derive(Debug, Clone)]
pub struct MemberDecl {
    /// Member name.
    pub name: String,
    /// Declared type.
    pub ty: TypeRef,
    /// Getter visibility; `None` for write-only members.
    pub getter: Option<Visibility>,
    /// Setter visibility; `None` for read-only members.
    pub setter: Option<Visibility>,
    /// Whether the member is static.
    pub is_static: bool,
    /// Whether the declaration is parameterized by its own generic arguments.
    pub generic: bool,
    /// Relationship to base-type declarations.
    pub dispatch: Dispatch,
    /// Capability contract this member explicitly implements.
    pub contract: Option<String>,
    /// Attached annotations, in declaration order.
    pub annotations: Vec<Annotation>,
}

impl MemberDecl {
    /// Create a public read/write property.
    pub fn property(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            getter: Some(Visibility::Public),
            setter: Some(Visibility::Public),
            is_static: false,
            generic: false,
            dispatch: Dispatch::Introduced,
            contract: None,
            annotations: Vec::new(),
        }
    }

    /// Remove the setter.
    pub fn read_only(mut self) -> Self {
        self.setter = None;
        self
    }

    /// Remove the getter.
    pub fn write_only(mut self) -> Self {
        self.getter = None;
        self
    }

    /// Set the getter visibility.
    pub fn with_getter(mut self, visibility: Visibility) -> Self {
        self.getter = Some(visibility);
        self
    }

    /// Set the setter visibility.
    pub fn with_setter(mut self, visibility: Visibility) -> Self {
        self.setter = Some(visibility);
        self
    }

    /// Make both accessors private.
    pub fn private(mut self) -> Self {
        self.getter = self.getter.map(|_| Visibility::Private);
        self.setter = self.setter.map(|_| Visibility::Private);
        self
    }

    /// Mark as static.
    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Mark as a generic-parameterized declaration.
    pub fn generic(mut self) -> Self {
        self.generic = true;
        self
    }

    /// Mark as virtual.
    pub fn virtual_member(mut self) -> Self {
        self.dispatch = Dispatch::Virtual;
        self
    }

    /// Mark as an override of a base declaration.
    pub fn overriding(mut self) -> Self {
        self.dispatch = Dispatch::Override;
        self
    }

    /// Mark as hiding a base declaration.
    pub fn hiding(mut self) -> Self {
        self.dispatch = Dispatch::Hides;
        self
    }

    /// Mark as an explicit implementation of a capability contract.
    pub fn implementing(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self.getter = self.getter.map(|_| Visibility::Private);
        self.setter = self.setter.map(|_| Visibility::Private);
        self
    }

    /// Attach an annotation.
    pub fn with(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Name under which the member is visible; contract-qualified for
    /// explicit contract implementations.
    pub fn visible_name(&self) -> String {
        match &self.contract {
            Some(contract) => format!("{}.{}", contract, self.name),
            None => self.name.clone(),
        }
    }

    /// Check if the member can be assigned after construction.
    pub fn is_settable(&self) -> bool {
        self.setter.is_some()
    }

    /// Check if the member is visible to consumers by default.
    pub fn is_public(&self) -> bool {
        self.getter == Some(Visibility::Public)
    }

    /// Check if any annotation matches a predicate.
    pub fn has(&self, predicate: impl Fn(&Annotation) -> bool) -> bool {
        self.annotations.iter().any(predicate)
    }
}

/// A constructor parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: TypeRef,
}

/// A declared constructor.
#[derive(Debug, Clone)]
pub struct ConstructorDecl {
    /// Identifier used to pin reconstitution to this constructor.
    pub id: String,
    /// Constructor visibility.
    pub visibility: Visibility,
    /// Parameters, in order.
    pub params: Vec<ParamDecl>,
    /// Explicit selection marker for reconstitution.
    pub reconstitute: bool,
}

impl ConstructorDecl {
    /// Create a public constructor with no parameters.
    pub fn public(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visibility: Visibility::Public,
            params: Vec::new(),
            reconstitute: false,
        }
    }

    /// Create a private constructor with no parameters.
    pub fn private(id: impl Into<String>) -> Self {
        Self {
            visibility: Visibility::Private,
            ..Self::public(id)
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            ty,
        });
        self
    }

    /// Pin reconstitution to this constructor.
    pub fn reconstitute_through(mut self) -> Self {
        self.reconstitute = true;
        self
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// A named instance of a pre-defined entity.
#[derive(Debug, Clone)]
pub struct InstanceDecl {
    /// Name of the static member exposing the instance.
    pub name: String,
    /// Visibility of that member.
    pub visibility: Visibility,
    /// Whether that member can be reassigned.
    pub writable: bool,
    /// Fully-populated instance value.
    pub value: Object,
}

impl InstanceDecl {
    /// Create a public, read-only instance.
    pub fn new(name: impl Into<String>, value: Object) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            writable: false,
            value,
        }
    }

    /// Set the visibility of the exposing member.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Make the exposing member writable.
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }
}
