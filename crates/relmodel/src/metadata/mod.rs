//! Metadata-description API.
//!
//! The translator consumes a fully-parsed metadata tree: a [`Model`] of type
//! declarations whose members carry [`Annotation`]s. Nothing here depends on
//! runtime reflection; producers build the tree with the builder methods.

mod annotation;
mod member;
mod model;
mod types;

pub use annotation::{
    Annotation, CheckGenerator, ComparisonOp, ConstraintDecl, ConverterDecl, DataConverter,
    FnConverter, Sign,
};
pub use member::{ConstructorDecl, Dispatch, InstanceDecl, MemberDecl, ParamDecl, Visibility};
pub use model::Model;
pub use types::{short_name, EnumDecl, EnumVariant, TypeDecl, TypeRef, TypeShape};
