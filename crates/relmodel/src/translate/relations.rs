//! Relation tables.
//!
//! Every collection field gets its own table, keyed by the owner's primary
//! key plus a discriminator: the index for lists, the element for sets, the
//! key for maps. Relation fields of one entity that name the same table and
//! agree on kind and element type share it, with a `Source` column telling
//! them apart.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::annotate::Scope;
use super::constraints::finalize_leaves;
use super::entity::{check_nullable_aggregates, Draft};
use super::keys::{candidate_keys, drop_redundant, primary_key, resolve_marks, ColumnMark};
use super::naming::{assign_columns, build_columns};
use super::path::{field_at, field_at_mut};
use super::{Context, Issue};
use crate::error::{ErrorKind, TranslationError};
use crate::metadata::{Annotation, TypeRef};
use crate::schema::{
    DataType, Field, FieldKind, KeySource, Leaf, Reference, Relation, Table, TableKind,
};
use crate::value::{CollectionKind, ScalarType};

/// Owner reference field of a relation table.
pub(crate) const OWNER: &str = "Owner";
/// Relation field discriminator of a shared relation table.
pub(crate) const SOURCE: &str = "Source";
/// Element position of a list.
pub(crate) const INDEX: &str = "Index";
/// Map key.
pub(crate) const KEY: &str = "Key";
/// List or set element.
pub(crate) const ITEM: &str = "Item";
/// Map value.
pub(crate) const VALUE: &str = "Value";

/// A relation field of an entity, located in its field tree.
struct Site {
    /// Index path of the relation field.
    at: Vec<usize>,
    /// Original member names along the path.
    members: Vec<String>,
    /// Current names along the path.
    names: Vec<String>,
}

impl Site {
    fn source(&self) -> String {
        self.members.join(".")
    }

    fn fail(&self, entity: &str, issue: Issue) -> TranslationError {
        self.members
            .iter()
            .rev()
            .fold(issue, |issue, member| issue.within(member.as_str()))
            .into_error(entity)
    }
}

/// Relation fields stored in one table.
struct Group {
    table: String,
    sites: Vec<Site>,
}

fn collect_sites(fields: &[Field], at: &[usize], members: &[String], names: &[String], out: &mut Vec<Site>) {
    for (i, field) in fields.iter().enumerate() {
        let mut at = at.to_vec();
        at.push(i);
        let mut members = members.to_vec();
        members.push(field.member.clone());
        let mut names = names.to_vec();
        names.push(field.name.clone());
        match &field.kind {
            FieldKind::Relation(_) => out.push(Site { at, members, names }),
            FieldKind::Aggregate(a) => collect_sites(&a.fields, &at, &members, &names, out),
            _ => {}
        }
    }
}

fn same_shape(a: &Relation, b: &Relation) -> bool {
    a.kind == b.kind && a.key == b.key && a.element == b.element
}

fn discriminator(kind: CollectionKind) -> &'static str {
    match kind {
        CollectionKind::List | CollectionKind::OrderedList => INDEX,
        CollectionKind::Set => ITEM,
        CollectionKind::Map => KEY,
    }
}

fn system_field(member: &str, ty: ScalarType) -> Field {
    Field {
        member: member.to_string(),
        name: member.to_string(),
        declared: TypeRef::scalar(ty),
        nullable: false,
        settable: true,
        position: None,
        kind: FieldKind::Scalar(Leaf::new(DataType::Scalar(ty))),
    }
}

fn columns_of(fields: &[Field], member: &str) -> Vec<String> {
    fields
        .iter()
        .filter(|f| f.member == member)
        .flat_map(|f| f.leaves().into_iter().map(|(l, _)| l.column.clone()))
        .collect()
}

impl Context<'_> {
    /// Build the relation tables of an entity. Runs once every entity's
    /// primary key is known.
    #[instrument(skip_all, fields(entity = %draft.decl.name))]
    pub(crate) fn build_relations(&self, draft: &mut Draft<'_>) -> Result<(), TranslationError> {
        let entity = draft.decl.name.clone();
        let mut sites = Vec::new();
        collect_sites(&draft.fields, &[], &[], &[], &mut sites);
        if sites.is_empty() {
            return Ok(());
        }

        let owner = self
            .keys
            .get(&entity)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| TranslationError::new(&entity, ErrorKind::NotAnEntity(entity.clone())))?;

        let mut groups: Vec<Group> = Vec::new();
        for site in sites {
            let relation = relation_at(draft, &site)?;
            let explicit = !relation.table.is_empty();
            let table = if explicit {
                relation.table.clone()
            } else {
                format!(
                    "{}{}{}{}",
                    owner.table,
                    self.config.separator,
                    site.names.join(&self.config.separator),
                    self.config.relation_table_suffix
                )
            };

            match groups.iter_mut().find(|g| g.table == table) {
                Some(group) => {
                    let first = relation_at(draft, &group.sites[0])?;
                    if !explicit || first.table.is_empty() || !same_shape(first, relation) {
                        return Err(site.fail(
                            &entity,
                            ErrorKind::DuplicateTableName {
                                name: table,
                                owner: entity.clone(),
                            }
                            .into(),
                        ));
                    }
                    group.sites.push(site);
                }
                None => groups.push(Group {
                    table,
                    sites: vec![site],
                }),
            }
        }

        let mut tables = Vec::with_capacity(groups.len());
        for group in &groups {
            let (fields, marks) = self.relation_fields(draft, group, &owner.fields)?;
            let table = self.relation_table(draft, group, &fields, &marks)?;
            let shared = group.sites.len() > 1;
            for site in &group.sites {
                if let Some(FieldKind::Relation(relation)) =
                    field_at_mut(&mut draft.fields, &site.at).map(|f| &mut f.kind)
                {
                    relation.table = table.name.clone();
                    relation.shared = shared;
                    relation.fields = fields.clone();
                }
            }
            debug!(
                table = %table.name,
                shared,
                columns = table.columns.len(),
                "relation table built"
            );
            tables.push(table);
        }
        draft.relation_tables = tables;
        Ok(())
    }

    /// Field tree of a relation table, with the markers addressed into it
    /// applied.
    fn relation_fields(
        &self,
        draft: &Draft<'_>,
        group: &Group,
        owner_key: &[Field],
    ) -> Result<(Vec<Field>, Vec<ColumnMark>), TranslationError> {
        let entity = draft.decl.name.as_str();
        let site = &group.sites[0];
        let relation = relation_at(draft, site)?;

        let mut fields = vec![Field {
            member: OWNER.to_string(),
            name: draft.decl.short_name().to_string(),
            declared: TypeRef::named(entity),
            nullable: false,
            settable: true,
            position: None,
            kind: FieldKind::Reference(Reference {
                target: entity.to_string(),
                table: draft.table.name.clone(),
                fields: owner_key.to_vec(),
            }),
        }];
        if group.sites.len() > 1 {
            fields.push(system_field(SOURCE, ScalarType::String));
        }
        if relation.kind.is_positional() {
            fields.push(system_field(INDEX, ScalarType::UInt32));
        }

        let mut stack = Vec::new();
        if let Some(key) = &relation.key {
            let field = self
                .classify(KEY, key, true, &mut stack)
                .map_err(|issue| site.fail(entity, issue))?;
            fields.push(field);
        }
        let element = if relation.kind == CollectionKind::Map { VALUE } else { ITEM };
        let field = self
            .classify(element, &relation.element, true, &mut stack)
            .map_err(|issue| site.fail(entity, issue))?;
        fields.push(field);

        let mut marks = Vec::new();
        for site in &group.sites {
            let pending: Vec<Annotation> = relation_at(draft, site)?.pending.clone();
            self.annotate(&mut fields, None, &pending, Scope::RelationTable, &mut marks)
                .map_err(|issue| site.fail(entity, issue))?;
        }

        assign_columns(&mut fields, None, &self.config.separator);
        check_nullable_aggregates(&fields).map_err(|issue| site.fail(entity, issue))?;
        if draft.decl.pre_defined {
            self.check_closed_references(&fields)
                .map_err(|issue| site.fail(entity, issue))?;
        }
        finalize_leaves(&mut fields).map_err(|issue| site.fail(entity, issue))?;

        // Candidate keys of a relation table are unique per owner.
        let owner_columns = columns_of(&fields, OWNER);
        let unique: Vec<ColumnMark> = resolve_marks(&fields, &marks)
            .into_iter()
            .map(|mut mark| {
                let mut columns = owner_columns.clone();
                columns.append(&mut mark.columns);
                mark.columns = columns;
                mark
            })
            .collect();
        Ok((fields, unique))
    }

    fn relation_table(
        &self,
        draft: &Draft<'_>,
        group: &Group,
        fields: &[Field],
        marks: &[ColumnMark],
    ) -> Result<Table, TranslationError> {
        let entity = draft.decl.name.as_str();
        let site = &group.sites[0];
        let fail = |kind: ErrorKind| site.fail(entity, kind.into());
        let relation = relation_at(draft, site)?;

        let columns = build_columns(fields).map_err(fail)?;
        let mut key = columns_of(fields, OWNER);
        key.extend(columns_of(fields, SOURCE));
        key.extend(columns_of(fields, discriminator(relation.kind)));
        let primary_key = primary_key(key, KeySource::Relation, &columns).map_err(fail)?;

        let candidate_keys = drop_redundant(candidate_keys(&columns, marks), &primary_key);

        self.register_table(&group.table, entity).map_err(fail)?;
        Ok(Table {
            name: group.table.clone(),
            kind: TableKind::Relation {
                owner: entity.to_string(),
                fields: group.sites.iter().map(Site::source).collect(),
            },
            foreign_keys: self.foreign_keys(fields),
            columns,
            primary_key,
            candidate_keys,
        })
    }
}

fn relation_at<'d>(draft: &'d Draft<'_>, site: &Site) -> Result<&'d Relation, TranslationError> {
    field_at(&draft.fields, &site.at)
        .and_then(Field::relation)
        .ok_or_else(|| site.fail(&draft.decl.name, ErrorKind::NonexistentPath(site.source()).into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TableNaming, TranslatorConfig};
    use crate::metadata::{MemberDecl, Model, TypeDecl};

    fn id() -> MemberDecl {
        MemberDecl::property("Id", TypeRef::scalar(ScalarType::Int32))
    }

    fn strings() -> TypeRef {
        TypeRef::set(TypeRef::scalar(ScalarType::String))
    }

    /// Relation tables and fields of one entity.
    fn build(model: &Model, name: &str) -> Result<(Vec<Table>, Vec<Field>), TranslationError> {
        let config = TranslatorConfig::default().with_table_naming(TableNaming::Unqualified);
        let ctx = Context::new(model, &config);
        let mut draft = ctx.translate_entity(name)?;
        ctx.build_relations(&mut draft)?;
        Ok((draft.relation_tables, draft.fields))
    }

    #[test]
    fn test_relation_kinds() {
        let model = Model::new().with_type(
            TypeDecl::class("Shop.Order")
                .with_member(id())
                .with_member(MemberDecl::property(
                    "Lines",
                    TypeRef::list(TypeRef::scalar(ScalarType::String)),
                ))
                .with_member(MemberDecl::property("Tags", strings()))
                .with_member(MemberDecl::property(
                    "Totals",
                    TypeRef::map(TypeRef::scalar(ScalarType::String), TypeRef::scalar(ScalarType::Decimal)),
                )),
        );
        let (tables, fields) = build(&model, "Shop.Order").unwrap();
        let summary: Vec<(&str, Vec<&str>, Vec<String>)> = tables
            .iter()
            .map(|t| (t.name.as_str(), t.column_names(), t.primary_key.columns.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (
                    "Order.LinesTable",
                    vec!["Order.Id", "Index", "Item"],
                    vec!["Order.Id".to_string(), "Index".to_string()]
                ),
                (
                    "Order.TagsTable",
                    vec!["Order.Id", "Item"],
                    vec!["Order.Id".to_string(), "Item".to_string()]
                ),
                (
                    "Order.TotalsTable",
                    vec!["Order.Id", "Key", "Value"],
                    vec!["Order.Id".to_string(), "Key".to_string()]
                ),
            ]
        );
        let lines = tables[0].foreign_keys[0].clone();
        assert_eq!(lines.target_table, "Order");
        assert_eq!(lines.target_columns, vec!["Id"]);
        assert_eq!(fields[1].relation().unwrap().table, "Order.LinesTable");
    }

    #[test]
    fn test_shared_relation_table() {
        let model = Model::new().with_type(
            TypeDecl::class("Shop.Order")
                .with_member(id())
                .with_member(MemberDecl::property("Tags", strings()).with(Annotation::relation_table("Labels")))
                .with_member(MemberDecl::property("Flags", strings()).with(Annotation::relation_table("Labels"))),
        );
        let (tables, fields) = build(&model, "Shop.Order").unwrap();
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.column_names(), vec!["Order.Id", "Source", "Item"]);
        assert_eq!(table.primary_key.columns, vec!["Order.Id", "Source", "Item"]);
        assert_eq!(
            table.kind,
            TableKind::Relation {
                owner: "Shop.Order".into(),
                fields: vec!["Tags".into(), "Flags".into()],
            }
        );
        assert!(fields[1].relation().unwrap().shared);
    }

    #[test]
    fn test_colliding_relation_tables() {
        let model = Model::new().with_type(
            TypeDecl::class("Shop.Order")
                .with_member(id())
                .with_member(MemberDecl::property("Tags", strings()).with(Annotation::relation_table("Labels")))
                .with_member(
                    MemberDecl::property("Lines", TypeRef::list(TypeRef::scalar(ScalarType::String)))
                        .with(Annotation::relation_table("Labels")),
                ),
        );
        let err = build(&model, "Shop.Order").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DuplicateTableName { .. }));
        assert_eq!(err.field.as_deref(), Some("Lines"));

        let model = Model::new().with_type(
            TypeDecl::class("Shop.Order")
                .with_member(id())
                .with_member(MemberDecl::property("Tags", strings()).with(Annotation::relation_table("Order"))),
        );
        let err = build(&model, "Shop.Order").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::DuplicateTableName {
                name: "Order".into(),
                owner: "Shop.Order".into()
            }
        );
    }

    #[test]
    fn test_markers_into_relation_table() {
        let model = Model::new().with_type(
            TypeDecl::class("Shop.Order")
                .with_member(id())
                .with_member(
                    MemberDecl::property("Lines", TypeRef::list(TypeRef::scalar(ScalarType::String)))
                        .with(Annotation::name_at("Text", "Item"))
                        .with(Annotation::unique_at("Item")),
                ),
        );
        let (tables, _) = build(&model, "Shop.Order").unwrap();
        let table = &tables[0];
        assert_eq!(table.column_names(), vec!["Order.Id", "Index", "Text"]);
        assert_eq!(table.candidate_keys.len(), 1);
        assert_eq!(table.candidate_keys[0].columns, vec!["Order.Id", "Text"]);
    }

    #[test]
    fn test_nullable_set_element_cannot_be_key() {
        let model = Model::new().with_type(
            TypeDecl::class("Shop.Order").with_member(id()).with_member(MemberDecl::property(
                "Tags",
                TypeRef::set(TypeRef::scalar(ScalarType::String).nullable()),
            )),
        );
        let err = build(&model, "Shop.Order").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NullableKeyMember("Item".into()));
        assert_eq!(err.field.as_deref(), Some("Tags"));
    }
}
