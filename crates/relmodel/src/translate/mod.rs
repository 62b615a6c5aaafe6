//! The translation engine.
//!
//! Translation runs in three phases over the entities reachable from the
//! requested roots:
//!
//! 1. Every entity is analyzed into a principal table, in topological layers
//!    along reference edges so that referenced primary keys are known first.
//!    Entities of one layer are independent and analyzed in parallel.
//! 2. Relation tables are built once every primary key is known, which is
//!    what allows self-reference through relations.
//! 3. Pre-defined instances are harvested and the entities are frozen.
//!
//! Table names are claimed in one mutex-guarded registry shared by all
//! workers.

mod annotate;
mod classify;
mod constraints;
mod converters;
mod creator;
mod cycles;
mod defaults;
mod entity;
mod extract;
mod keys;
mod naming;
mod path;
mod predefined;
mod relations;

use std::sync::Arc;
use std::thread;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::TranslatorConfig;
use crate::error::{ConfigError, ErrorKind, Result, TranslationError};
use crate::metadata::{Annotation, Model, TypeShape};
use crate::schema::{Entity, Field, FieldKind, Schema};

use classify::{KeyProjection, Template};
use entity::Draft;
use naming::NameRegistry;
use path::{field_at_mut, resolve, Target};

pub(crate) use relations::{INDEX, ITEM, KEY, OWNER, SOURCE, VALUE};

/// A rule violation located by the original member names leading to it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Issue {
    pub(crate) path: Vec<String>,
    pub(crate) kind: ErrorKind,
}

impl Issue {
    /// Prefix the path with an enclosing member.
    pub(crate) fn within(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }

    pub(crate) fn into_error(self, entity: &str) -> TranslationError {
        if self.path.is_empty() {
            TranslationError::new(entity, self.kind)
        } else {
            TranslationError::at(entity, self.path.join("."), self.kind)
        }
    }
}

impl From<ErrorKind> for Issue {
    fn from(kind: ErrorKind) -> Self {
        Self {
            path: Vec::new(),
            kind,
        }
    }
}

/// Attach an enclosing member to the error of a result.
pub(crate) trait Within<T> {
    fn within(self, segment: &str) -> std::result::Result<T, Issue>;
}

impl<T> Within<T> for std::result::Result<T, Issue> {
    fn within(self, segment: &str) -> std::result::Result<T, Issue> {
        self.map_err(|issue| issue.within(segment))
    }
}

impl<T> Within<T> for std::result::Result<T, ErrorKind> {
    fn within(self, segment: &str) -> std::result::Result<T, Issue> {
        self.map_err(|kind| Issue::from(kind).within(segment))
    }
}

/// State shared by all workers of one translation.
pub(crate) struct Context<'m> {
    pub(crate) model: &'m Model,
    pub(crate) config: &'m TranslatorConfig,
    /// Aggregate field trees by struct type name.
    templates: DashMap<String, Arc<Template>>,
    /// Primary-key projections of translated entities.
    keys: DashMap<String, Arc<KeyProjection>>,
    names: Mutex<NameRegistry>,
}

impl<'m> Context<'m> {
    pub(crate) fn new(model: &'m Model, config: &'m TranslatorConfig) -> Self {
        Self {
            model,
            config,
            templates: DashMap::new(),
            keys: DashMap::new(),
            names: Mutex::new(NameRegistry::default()),
        }
    }

    /// Claim a table name in the global registry.
    pub(crate) fn register_table(&self, name: &str, owner: &str) -> std::result::Result<(), ErrorKind> {
        self.names.lock().register(name, owner)
    }

    /// Resolve the target of a marker attached to `fields[root]`, or to the
    /// whole field list when `root` is `None`.
    pub(crate) fn locate(
        &self,
        fields: &[Field],
        root: Option<usize>,
        path: Option<&str>,
    ) -> std::result::Result<Target, ErrorKind> {
        let separator = self.config.separator.as_str();
        match (root, path) {
            (Some(i), None) => Ok(Target::Field(vec![i])),
            (Some(i), Some(path)) => {
                let field = fields
                    .get(i)
                    .ok_or_else(|| ErrorKind::NonexistentPath(path.to_string()))?;
                if matches!(field.kind, FieldKind::Relation(_)) {
                    return Ok(Target::Relation {
                        at: vec![i],
                        rest: path.to_string(),
                    });
                }
                Ok(match resolve(field.children(), path, separator)? {
                    Target::Field(mut at) => {
                        at.insert(0, i);
                        Target::Field(at)
                    }
                    Target::Relation { mut at, rest } => {
                        at.insert(0, i);
                        Target::Relation { at, rest }
                    }
                })
            }
            (None, Some(path)) => resolve(fields, path, separator),
            (None, None) => Err(ErrorKind::NonexistentPath(String::new())),
        }
    }

    /// Park a marker addressed into a relation table until that table is built.
    pub(crate) fn defer(
        &self,
        fields: &mut [Field],
        at: &[usize],
        annotation: &Annotation,
        rest: String,
    ) -> std::result::Result<(), ErrorKind> {
        let field = field_at_mut(fields, at).ok_or_else(|| ErrorKind::NonexistentPath(rest.clone()))?;
        match &mut field.kind {
            FieldKind::Relation(relation) => {
                debug!(marker = annotation.label(), path = %rest, "marker deferred to relation table");
                relation.pending.push(annotation.with_path(Some(rest)));
                Ok(())
            }
            _ => Err(ErrorKind::NonexistentPath(rest)),
        }
    }
}

/// Translates annotated models into relational schemas.
#[derive(Debug, Clone, Default)]
pub struct Translator {
    config: TranslatorConfig,
}

impl Translator {
    /// Create a translator with a validated configuration.
    pub fn new(config: TranslatorConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The active configuration.
    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translate the entities reachable from the given root types.
    pub fn translate(&self, model: &Model, roots: &[&str]) -> Result<Schema> {
        let ctx = Context::new(model, &self.config);
        let plan = cycles::plan(model, roots)?;
        let workers = self.config.workers.max(1);

        let mut drafts: Vec<Draft<'_>> = Vec::new();
        for (depth, layer) in plan.layers.iter().enumerate() {
            debug!(layer = depth, entities = layer.len(), "translating layer");
            let results = run_parallel(workers, layer, |name| ctx.translate_entity(name));
            for result in results {
                drafts.push(result?);
            }
        }

        let results = run_parallel_mut(workers, &mut drafts, |draft| ctx.build_relations(draft));
        for result in results {
            result?;
        }

        let mut entities = Vec::with_capacity(drafts.len());
        for draft in drafts {
            entities.push(Arc::new(draft.finish()?));
        }
        let schema = Schema::new(entities);

        info!(
            entities = schema.len(),
            tables = ctx.names.lock().len(),
            "translation complete"
        );
        Ok(schema)
    }

    /// Translate every concrete class of a model.
    pub fn translate_all(&self, model: &Model) -> Result<Schema> {
        let roots: Vec<&str> = model
            .types()
            .filter(|t| {
                matches!(t.shape, TypeShape::Class) && !t.is_abstract && t.generic_params.is_empty()
            })
            .map(|t| t.name.as_str())
            .collect();
        self.translate(model, &roots)
    }

    /// Translate a single entity type, with everything it references.
    pub fn translate_entity(&self, model: &Model, name: &str) -> Result<Arc<Entity>> {
        let schema = self.translate(model, &[name])?;
        schema
            .entity(name)
            .cloned()
            .ok_or_else(|| TranslationError::new(name, ErrorKind::NotAnEntity(name.to_string())))
    }
}

/// Map items on up to `workers` scoped threads, preserving order.
fn run_parallel<T, R, F>(workers: usize, items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if workers <= 1 || items.len() <= 1 {
        return items.iter().map(f).collect();
    }
    let chunk = items.len().div_ceil(workers);
    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk)
            .map(|part| scope.spawn(move || part.iter().map(f).collect::<Vec<_>>()))
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}

/// Like [`run_parallel`], with mutable access to each item.
fn run_parallel_mut<T, R, F>(workers: usize, items: &mut [T], f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(&mut T) -> R + Sync,
{
    if workers <= 1 || items.len() <= 1 {
        return items.iter_mut().map(f).collect();
    }
    let chunk = items.len().div_ceil(workers);
    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks_mut(chunk)
            .map(|part| scope.spawn(move || part.iter_mut().map(f).collect::<Vec<_>>()))
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MemberDecl, TypeDecl, TypeRef};
    use crate::schema::{Aggregate, Creator, DataType, Leaf, Relation};
    use crate::value::{CollectionKind, ScalarType};

    fn leaf(member: &str) -> Field {
        Field {
            member: member.into(),
            name: member.into(),
            declared: TypeRef::scalar(ScalarType::Int32),
            nullable: false,
            settable: true,
            position: None,
            kind: FieldKind::Scalar(Leaf::new(DataType::Scalar(ScalarType::Int32))),
        }
    }

    fn fields() -> Vec<Field> {
        vec![
            leaf("Id"),
            Field {
                member: "Home".into(),
                name: "Home".into(),
                declared: TypeRef::named("Geo.Address"),
                nullable: false,
                settable: true,
                position: None,
                kind: FieldKind::Aggregate(Aggregate {
                    type_name: "Geo.Address".into(),
                    fields: vec![leaf("Zip")],
                    creator: Creator::Lookup,
                }),
            },
            Field {
                member: "Tags".into(),
                name: "Tags".into(),
                declared: TypeRef::list(TypeRef::scalar(ScalarType::String)),
                nullable: false,
                settable: true,
                position: None,
                kind: FieldKind::Relation(Relation::new(
                    CollectionKind::List,
                    None,
                    TypeRef::scalar(ScalarType::String),
                )),
            },
        ]
    }

    #[test]
    fn test_issue_paths() {
        let issue = Issue::from(ErrorKind::EmptyName).within("City").within("Address");
        let err = issue.into_error("Shop.Customer");
        assert_eq!(err.field.as_deref(), Some("Address.City"));
        assert_eq!(err.entity, "Shop.Customer");

        let bare: std::result::Result<(), ErrorKind> = Err(ErrorKind::UndeducibleKey);
        let issue = bare.within("Id").unwrap_err();
        assert_eq!(issue.path, vec!["Id".to_string()]);
    }

    #[test]
    fn test_locate_and_defer() {
        let model = Model::new();
        let config = TranslatorConfig::default();
        let ctx = Context::new(&model, &config);
        let mut fields = fields();

        assert_eq!(ctx.locate(&fields, Some(1), Some("Zip")), Ok(Target::Field(vec![1, 0])));
        assert_eq!(ctx.locate(&fields, Some(0), None), Ok(Target::Field(vec![0])));
        assert_eq!(
            ctx.locate(&fields, Some(2), Some("Item")),
            Ok(Target::Relation {
                at: vec![2],
                rest: "Item".into()
            })
        );
        assert!(ctx.locate(&fields, Some(0), Some("Inner")).is_err());

        let marker = Annotation::name_at("Label", "Tags.Item");
        ctx.defer(&mut fields, &[2], &marker, "Item".into()).unwrap();
        let pending = &fields[2].relation().unwrap().pending;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path(), Some("Item"));
    }

    #[test]
    fn test_run_parallel_preserves_order() {
        let items: Vec<usize> = (0..17).collect();
        let doubled = run_parallel(4, &items, |n| n * 2);
        assert_eq!(doubled, items.iter().map(|n| n * 2).collect::<Vec<_>>());

        let mut items = items;
        run_parallel_mut(3, &mut items, |n| *n += 1);
        assert_eq!(items.first(), Some(&1));
        assert_eq!(items.last(), Some(&17));
    }

    #[test]
    fn test_translator_rejects_invalid_config() {
        let config = TranslatorConfig::default().with_separator("");
        assert!(Translator::new(config).is_err());
    }

    #[test]
    fn test_translate_all_skips_abstract_types() {
        let model = Model::new()
            .with_type(
                TypeDecl::class("Zoo.Animal")
                    .abstract_type()
                    .with_member(MemberDecl::property("Id", TypeRef::scalar(ScalarType::Int32))),
            )
            .with_type(
                TypeDecl::class("Zoo.Keeper")
                    .with_member(MemberDecl::property("Id", TypeRef::scalar(ScalarType::Int32)))
                    .with_member(MemberDecl::property("Name", TypeRef::scalar(ScalarType::String))),
            );
        let schema = Translator::default().translate_all(&model).unwrap();
        assert_eq!(schema.len(), 1);
        assert!(schema.entity("Zoo.Keeper").is_some());
    }
}
