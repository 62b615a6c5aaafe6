//! relmodel - Translation engine from annotated data-model types to a
//! relational schema.
//!
//! The translator consumes a [`Model`] of type declarations whose members
//! carry [`Annotation`]s, and produces a [`Schema`]: one principal table per
//! entity, one relation table per collection field, keys, defaults,
//! constraints and the mapping used to move objects in and out of rows.
//!
//! # Usage
//!
//! ```rust
//! use relmodel::{
//!     Extractor, MemberDecl, Model, Object, ScalarType, Translator, TypeDecl, TypeRef, Value,
//! };
//!
//! let model = Model::new().with_type(
//!     TypeDecl::class("Shop.Customer")
//!         .with_member(MemberDecl::property("Id", TypeRef::scalar(ScalarType::Int32)))
//!         .with_member(MemberDecl::property("Name", TypeRef::scalar(ScalarType::String))),
//! );
//!
//! let schema = Translator::default().translate(&model, &["Shop.Customer"]).unwrap();
//! let customer = schema.entity("Shop.Customer").unwrap();
//! assert_eq!(customer.table.column_names(), vec!["Id", "Name"]);
//! assert_eq!(customer.primary_key().columns, vec!["Id"]);
//!
//! let alice = Object::new("Shop.Customer").with("Id", 1).with("Name", "Alice");
//! let extraction = Extractor::new(&schema).extract(&alice).unwrap();
//! assert_eq!(extraction.row, vec![Value::Int(1), Value::string("Alice")]);
//! ```

pub mod config;
pub mod error;
pub mod mapping;
pub mod metadata;
pub mod schema;
pub mod translate;
pub mod value;

pub use config::{TableNaming, TranslatorConfig};
pub use error::{ConfigError, ErrorCategory, ErrorKind, MappingError, Result, TranslationError};
pub use mapping::{
    Construction, Extraction, Extractor, MemoryResolver, Reconstitutor, ReferenceResolver,
    RelationChanges, RelationRows, Row,
};
pub use metadata::{
    Annotation, ConstructorDecl, ConverterDecl, DataConverter, InstanceDecl, MemberDecl, Model,
    TypeDecl, TypeRef, TypeShape, Visibility,
};
pub use schema::{Column, Entity, Field, FieldKind, KeySource, Schema, Table, TableKind};
pub use translate::Translator;
pub use value::{Collection, CollectionKind, EntryState, Object, ScalarType, Value};
