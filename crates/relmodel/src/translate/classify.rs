//! Type classification.
//!
//! Every field's declared type resolves to exactly one [`FieldKind`].
//! Aggregate field trees are built once per struct type and cached; entity
//! references are re-projections of the target's primary key, which is known
//! because referenced entities are translated in earlier layers.

use std::sync::Arc;

use tracing::debug;

use super::annotate::Scope;
use super::creator::resolve_creator;
use super::extract::{extract_members, AGGREGATE_MIN_FIELDS};
use super::naming::order_by_position;
use super::{Context, Issue, Within};
use crate::error::ErrorKind;
use crate::metadata::{MemberDecl, TypeDecl, TypeRef, TypeShape};
use crate::schema::{Aggregate, Creator, DataType, Field, FieldKind, Leaf, Reference, Relation};
use crate::value::CollectionKind;

/// Field tree of a struct type, before any embedding-site markers.
#[derive(Debug, Clone)]
pub(crate) struct Template {
    pub(crate) fields: Vec<Field>,
    pub(crate) creator: Creator,
}

/// The primary key of a translated entity, as referencing tables store it.
#[derive(Debug, Clone)]
pub(crate) struct KeyProjection {
    /// Qualified entity name.
    pub(crate) entity: String,
    /// Principal table name.
    pub(crate) table: String,
    /// Field tree pruned to the primary-key leaves.
    pub(crate) fields: Vec<Field>,
    /// Primary-key columns of the principal table, in order.
    pub(crate) columns: Vec<String>,
    /// Whether the entity is pre-defined.
    pub(crate) pre_defined: bool,
}

impl KeyProjection {
    /// Project the primary key out of an entity's field tree. Defaults and
    /// ordinal positions stay behind.
    pub(crate) fn new(
        entity: &str,
        table: &str,
        fields: &[Field],
        columns: &[String],
        pre_defined: bool,
    ) -> Self {
        Self {
            entity: entity.to_string(),
            table: table.to_string(),
            fields: prune(fields, columns),
            columns: columns.to_vec(),
            pre_defined,
        }
    }
}

fn prune(fields: &[Field], columns: &[String]) -> Vec<Field> {
    let mut out = Vec::new();
    for field in fields {
        let kept = match &field.kind {
            FieldKind::Scalar(leaf) | FieldKind::Enumeration(leaf) => {
                if !columns.contains(&leaf.column) {
                    continue;
                }
                let mut leaf = leaf.clone();
                leaf.default = None;
                let kind = match field.kind {
                    FieldKind::Scalar(_) => FieldKind::Scalar(leaf),
                    _ => FieldKind::Enumeration(leaf),
                };
                Field {
                    kind,
                    position: None,
                    ..field.clone()
                }
            }
            FieldKind::Aggregate(a) => {
                let nested = prune(&a.fields, columns);
                if nested.is_empty() {
                    continue;
                }
                Field {
                    member: field.member.clone(),
                    name: field.name.clone(),
                    declared: field.declared.clone(),
                    nullable: field.nullable,
                    settable: field.settable,
                    position: None,
                    kind: FieldKind::Aggregate(Aggregate {
                        type_name: a.type_name.clone(),
                        fields: nested,
                        creator: a.creator.clone(),
                    }),
                }
            }
            FieldKind::Reference(r) => {
                let nested = prune(&r.fields, columns);
                if nested.is_empty() {
                    continue;
                }
                Field {
                    member: field.member.clone(),
                    name: field.name.clone(),
                    declared: field.declared.clone(),
                    nullable: field.nullable,
                    settable: field.settable,
                    position: None,
                    kind: FieldKind::Reference(Reference {
                        target: r.target.clone(),
                        table: r.table.clone(),
                        fields: nested,
                    }),
                }
            }
            FieldKind::Relation(_) => continue,
        };
        out.push(kept);
    }
    out
}

/// Check if a field list holds a relation, at any aggregate depth.
pub(crate) fn has_relation(fields: &[Field]) -> bool {
    fields.iter().any(|f| match &f.kind {
        FieldKind::Relation(_) => true,
        FieldKind::Aggregate(a) => has_relation(&a.fields),
        _ => false,
    })
}

impl Context<'_> {
    /// Classify a declared member.
    pub(crate) fn classify_member(
        &self,
        member: &MemberDecl,
        stack: &mut Vec<String>,
    ) -> Result<Field, Issue> {
        self.classify(&member.name, &member.ty, member.is_settable(), stack)
    }

    /// Classify a field of a given type.
    pub(crate) fn classify(
        &self,
        member: &str,
        ty: &TypeRef,
        settable: bool,
        stack: &mut Vec<String>,
    ) -> Result<Field, Issue> {
        let kind = self.classify_kind(ty.non_nullable(), stack, false)?;
        Ok(Field {
            member: member.to_string(),
            name: member.to_string(),
            declared: ty.clone(),
            nullable: ty.is_nullable(),
            settable,
            position: None,
            kind,
        })
    }

    fn classify_kind(
        &self,
        ty: &TypeRef,
        stack: &mut Vec<String>,
        localized: bool,
    ) -> Result<FieldKind, Issue> {
        let unsupported = |reason: &'static str| ErrorKind::UnsupportedType {
            ty: ty.to_string(),
            reason,
        };
        let kind = match ty {
            TypeRef::Scalar(s) => FieldKind::Scalar(Leaf::new(DataType::Scalar(*s))),
            TypeRef::Nullable(inner) => return self.classify_kind(inner, stack, localized),
            TypeRef::Localized(inner) => return self.classify_kind(inner, stack, true),
            TypeRef::Collection { kind, element } => {
                if localized {
                    return Err(ErrorKind::RelationInLocalization.into());
                }
                self.check_element(element)?;
                FieldKind::Relation(Relation::new(*kind, None, (**element).clone()))
            }
            TypeRef::Map { key, value } => {
                if localized {
                    return Err(ErrorKind::RelationInLocalization.into());
                }
                self.check_element(key)?;
                self.check_element(value)?;
                FieldKind::Relation(Relation::new(
                    CollectionKind::Map,
                    Some((**key).clone()),
                    (**value).clone(),
                ))
            }
            TypeRef::Named(name) => {
                let decl = self
                    .model
                    .get(name)
                    .ok_or_else(|| ErrorKind::UnknownType(name.clone()))?;
                match &decl.shape {
                    TypeShape::Enum(e) => FieldKind::Enumeration(Leaf::new(DataType::Enumeration {
                        name: name.clone(),
                        decl: e.clone(),
                    })),
                    TypeShape::Struct => {
                        check_concrete(decl)?;
                        let template = self.template(decl, stack)?;
                        if localized && has_relation(&template.fields) {
                            return Err(ErrorKind::RelationInLocalization.into());
                        }
                        FieldKind::Aggregate(Aggregate {
                            type_name: name.clone(),
                            fields: template.fields.clone(),
                            creator: template.creator.clone(),
                        })
                    }
                    TypeShape::Class => {
                        check_concrete(decl)?;
                        let projection = self
                            .keys
                            .get(name)
                            .map(|p| Arc::clone(p.value()))
                            .ok_or_else(|| ErrorKind::NotAnEntity(name.clone()))?;
                        FieldKind::Reference(Reference {
                            target: projection.entity.clone(),
                            table: projection.table.clone(),
                            fields: projection.fields.clone(),
                        })
                    }
                    TypeShape::Interface => {
                        return Err(unsupported("interfaces have no relational mapping").into())
                    }
                }
            }
            TypeRef::Dynamic => return Err(unsupported("dynamically-typed values").into()),
            TypeRef::Pointer(_) => return Err(unsupported("raw pointers").into()),
            TypeRef::ByRef(_) => return Err(unsupported("by-reference bindings").into()),
            TypeRef::GenericParam(_) => return Err(unsupported("open generic parameters").into()),
            TypeRef::Unsupported(_) => {
                return Err(unsupported("no relational mapping for this library type").into())
            }
        };
        Ok(kind)
    }

    /// Reject relation elements that hold a relation, directly or through
    /// any number of aggregate layers.
    fn check_element(&self, ty: &TypeRef) -> Result<(), ErrorKind> {
        let mut visited = Vec::new();
        if self.holds_relation(ty, &mut visited) {
            return Err(ErrorKind::RelationInRelation);
        }
        Ok(())
    }

    fn holds_relation<'a>(&'a self, ty: &'a TypeRef, visited: &mut Vec<&'a str>) -> bool {
        match ty {
            TypeRef::Collection { .. } | TypeRef::Map { .. } => true,
            TypeRef::Nullable(inner) | TypeRef::Localized(inner) => self.holds_relation(inner, visited),
            TypeRef::Named(name) => {
                let Some(decl) = self.model.get(name) else {
                    return false;
                };
                if !matches!(decl.shape, TypeShape::Struct) || visited.contains(&name.as_str()) {
                    return false;
                }
                visited.push(name);
                extract_members(self.model, decl, 0)
                    .unwrap_or_default()
                    .into_iter()
                    .any(|m| self.holds_relation(&m.ty, visited))
            }
            _ => false,
        }
    }

    /// Field tree of a struct type, built on first use.
    fn template(&self, decl: &TypeDecl, stack: &mut Vec<String>) -> Result<Arc<Template>, Issue> {
        if let Some(template) = self.templates.get(&decl.name).map(|t| Arc::clone(t.value())) {
            return Ok(template);
        }
        if let Some(start) = stack.iter().position(|n| *n == decl.name) {
            let mut cycle = stack[start..].to_vec();
            cycle.push(decl.name.clone());
            return Err(ErrorKind::ReferenceCycle(cycle).into());
        }

        stack.push(decl.name.clone());
        let built = self.build_template(decl, stack);
        stack.pop();

        let template = Arc::new(built?);
        self.templates
            .insert(decl.name.clone(), Arc::clone(&template));
        Ok(template)
    }

    fn build_template(&self, decl: &TypeDecl, stack: &mut Vec<String>) -> Result<Template, Issue> {
        let members = extract_members(self.model, decl, AGGREGATE_MIN_FIELDS)?;
        let mut fields = Vec::with_capacity(members.len());
        for member in &members {
            fields.push(self.classify_member(member, stack).within(&member.name)?);
        }

        let mut marks = Vec::new();
        for (i, member) in members.iter().enumerate() {
            self.annotate(&mut fields, Some(i), &member.annotations, Scope::Aggregate, &mut marks)
                .within(&member.name)?;
        }

        let fields = order_by_position(fields)?;
        let creator = resolve_creator(decl, &fields)?;
        debug!(aggregate = %decl.name, fields = fields.len(), "aggregate template built");
        Ok(Template { fields, creator })
    }
}

fn check_concrete(decl: &TypeDecl) -> Result<(), ErrorKind> {
    let reason = if decl.is_abstract {
        "abstract types cannot be instantiated"
    } else if !decl.generic_params.is_empty() {
        "open generic types"
    } else {
        return Ok(());
    };
    Err(ErrorKind::UnsupportedType {
        ty: decl.name.clone(),
        reason,
    })
}
