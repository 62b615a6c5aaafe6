//! Per-entity translation into a principal table.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::annotate::Scope;
use super::classify::KeyProjection;
use super::constraints::finalize_leaves;
use super::creator::resolve_creator;
use super::extract::{extract_members, ENTITY_MIN_FIELDS};
use super::keys::{deduce_keys, resolve_marks};
use super::naming::{assign_columns, build_columns, order_by_position};
use super::predefined;
use super::{Context, Issue, Within};
use crate::error::{ErrorKind, TranslationError};
use crate::metadata::TypeDecl;
use crate::schema::{leaves_of, Creator, Entity, Field, FieldKind, Table, TableKind};

/// An entity whose principal table is complete, awaiting its relation
/// tables and pre-defined instances.
#[derive(Debug)]
pub(crate) struct Draft<'m> {
    pub(crate) decl: &'m TypeDecl,
    pub(crate) fields: Vec<Field>,
    pub(crate) table: Table,
    pub(crate) relation_tables: Vec<Table>,
    pub(crate) creator: Creator,
}

impl Draft<'_> {
    /// Harvest pre-defined instances and freeze the entity.
    pub(crate) fn finish(self) -> Result<Entity, TranslationError> {
        let name = self.decl.name.clone();
        let instances = if self.decl.pre_defined {
            predefined::harvest(self.decl, &self.fields, &self.table)
                .map_err(|kind| TranslationError::new(&name, kind))?
        } else {
            Vec::new()
        };
        debug!(entity = %name, instances = instances.len(), "entity finished");
        Ok(Entity {
            name,
            table: self.table,
            fields: self.fields,
            relation_tables: self.relation_tables,
            creator: self.creator,
            pre_defined: self.decl.pre_defined,
            instances,
        })
    }
}

impl<'m> Context<'m> {
    /// Translate one entity type into its principal table and publish its
    /// primary key for referencing entities.
    #[instrument(skip_all, fields(entity = %name))]
    pub(crate) fn translate_entity(&self, name: &str) -> Result<Draft<'m>, TranslationError> {
        let fail = |issue: Issue| issue.into_error(name);
        let whole = |kind: ErrorKind| TranslationError::new(name, kind);

        let decl = self
            .model
            .get(name)
            .ok_or_else(|| whole(ErrorKind::UnknownType(name.to_string())))?;
        let members = extract_members(self.model, decl, ENTITY_MIN_FIELDS).map_err(fail)?;
        if decl.pre_defined {
            predefined::check_declaration(decl, &members).map_err(fail)?;
        }

        let mut stack = Vec::new();
        let mut fields = Vec::with_capacity(members.len());
        for member in &members {
            let field = self
                .classify_member(member, &mut stack)
                .within(&member.name)
                .map_err(fail)?;
            fields.push(field);
        }

        let mut marks = Vec::new();
        for (i, member) in members.iter().enumerate() {
            self.annotate(&mut fields, Some(i), &member.annotations, Scope::Entity, &mut marks)
                .within(&member.name)
                .map_err(fail)?;
        }

        assign_columns(&mut fields, None, &self.config.separator);
        let marks = resolve_marks(&fields, &marks);
        check_nullable_aggregates(&fields).map_err(fail)?;
        let mut fields = order_by_position(fields).map_err(fail)?;
        finalize_leaves(&mut fields).map_err(fail)?;

        let columns = build_columns(&fields).map_err(whole)?;
        let (primary_key, candidate_keys) =
            deduce_keys(decl.short_name(), &fields, &columns, &marks).map_err(whole)?;

        let table_name = decl
            .table_name
            .clone()
            .unwrap_or_else(|| self.config.table_naming.table_name(&decl.name));
        self.register_table(&table_name, name).map_err(whole)?;

        let creator = if decl.pre_defined {
            self.check_closed_references(&fields).map_err(fail)?;
            Creator::Lookup
        } else {
            resolve_creator(decl, &fields).map_err(whole)?
        };

        let table = Table {
            name: table_name,
            kind: TableKind::Principal,
            foreign_keys: self.foreign_keys(&fields),
            columns,
            primary_key,
            candidate_keys,
        };
        self.keys.insert(
            name.to_string(),
            Arc::new(KeyProjection::new(
                name,
                &table.name,
                &fields,
                &table.primary_key.columns,
                decl.pre_defined,
            )),
        );

        debug!(
            table = %table.name,
            fields = fields.len(),
            columns = table.columns.len(),
            candidate_keys = table.candidate_keys.len(),
            "principal table built"
        );
        Ok(Draft {
            decl,
            fields,
            table,
            relation_tables: Vec::new(),
            creator,
        })
    }

    /// Pre-defined entities may only reference other pre-defined entities.
    pub(crate) fn check_closed_references(&self, fields: &[Field]) -> Result<(), Issue> {
        for field in fields {
            match &field.kind {
                FieldKind::Reference(r) => {
                    let closed = self.keys.get(&r.target).is_some_and(|p| p.pre_defined);
                    if !closed {
                        return Err(Issue::from(ErrorKind::ReferenceToOpenEntity(r.target.clone()))
                            .within(&field.member));
                    }
                }
                FieldKind::Aggregate(a) => self.check_closed_references(&a.fields).within(&field.member)?,
                _ => {}
            }
        }
        Ok(())
    }
}

/// Reject nullable aggregates whose null state cannot be told apart from an
/// instance with every nested column null.
pub(crate) fn check_nullable_aggregates(fields: &[Field]) -> Result<(), Issue> {
    for field in fields {
        let FieldKind::Aggregate(aggregate) = &field.kind else {
            continue;
        };
        if field.nullable && leaves_of(&aggregate.fields).iter().all(|(_, nullable)| *nullable) {
            return Err(Issue::from(ErrorKind::NullableAggregateWithoutRequiredField).within(&field.member));
        }
        check_nullable_aggregates(&aggregate.fields).within(&field.member)?;
    }
    Ok(())
}
