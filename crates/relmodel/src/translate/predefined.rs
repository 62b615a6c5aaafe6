//! Pre-defined (closed) entities.
//!
//! The extension of a pre-defined entity is exactly its declared instances.
//! Declarations are checked before classification; instance rows are
//! harvested once the principal table is final.

use tracing::debug;

use super::creator::constructors;
use super::Issue;
use crate::error::ErrorKind;
use crate::mapping::principal_row;
use crate::metadata::{Annotation, MemberDecl, TypeDecl, Visibility};
use crate::schema::{leaves_of, Field, PreDefinedInstance, Table};

/// Minimum number of instances of a pre-defined entity.
pub(crate) const MIN_INSTANCES: usize = 2;

/// Check the declaration of a pre-defined entity for customization hooks
/// that closed entities may not have.
pub(crate) fn check_declaration(decl: &TypeDecl, members: &[&MemberDecl]) -> Result<(), Issue> {
    if decl.instances.len() < MIN_INSTANCES {
        return Err(ErrorKind::TooFewInstances(decl.instances.len()).into());
    }
    if let Some(public) = constructors(decl)
        .into_iter()
        .find(|c| c.visibility == Visibility::Public)
    {
        return Err(ErrorKind::PublicConstructor(public.id).into());
    }

    for member in members {
        if member.is_settable() {
            return Err(ErrorKind::WritableField(member.name.clone()).into());
        }
        let customized = member.annotations.iter().find(|a| {
            matches!(
                a,
                Annotation::Name { .. }
                    | Annotation::Default { .. }
                    | Annotation::Check { .. }
                    | Annotation::Column(_)
            )
        });
        if let Some(annotation) = customized {
            return Err(ErrorKind::CustomizedMember {
                member: member.name.clone(),
                marker: annotation.label(),
            }
            .into());
        }
    }

    for instance in &decl.instances {
        if instance.visibility != Visibility::Public {
            return Err(ErrorKind::InaccessibleInstance(instance.name.clone()).into());
        }
        if instance.writable {
            return Err(ErrorKind::MutableInstance(instance.name.clone()).into());
        }
    }
    Ok(())
}

/// Flatten every declared instance into a principal-table row and check it
/// against the table.
pub(crate) fn harvest(
    decl: &TypeDecl,
    fields: &[Field],
    table: &Table,
) -> Result<Vec<PreDefinedInstance>, ErrorKind> {
    let leaves = leaves_of(fields);
    let mut harvested: Vec<PreDefinedInstance> = Vec::with_capacity(decl.instances.len());

    for instance in &decl.instances {
        let invalid = |reason: String| ErrorKind::InvalidInstance {
            instance: instance.name.clone(),
            reason,
        };
        if instance.value.type_name != decl.name {
            return Err(invalid(format!("value is a '{}'", instance.value.type_name)));
        }

        let row = principal_row(fields, &instance.value).map_err(|e| invalid(e.to_string()))?;
        for ((cell, column), (leaf, _)) in row.iter().zip(&table.columns).zip(&leaves) {
            if cell.is_null() {
                if !column.nullable {
                    return Err(invalid(format!("column '{}' is null", column.name)));
                }
                continue;
            }
            leaf.constraints
                .admits(cell)
                .map_err(|constraint| invalid(format!("column '{}' violates {}", column.name, constraint)))?;
        }

        let key: Vec<_> = table
            .primary_key
            .columns
            .iter()
            .filter_map(|c| table.column_index(c))
            .map(|i| row[i].clone())
            .collect();
        if let Some(first) = harvested.iter().find(|h| {
            h.key.len() == key.len() && h.key.iter().zip(&key).all(|(a, b)| a.same(b))
        }) {
            return Err(ErrorKind::DuplicateInstanceKey {
                first: first.name.clone(),
                second: instance.name.clone(),
            });
        }

        harvested.push(PreDefinedInstance {
            name: instance.name.clone(),
            key,
            row,
            value: instance.value.clone(),
        });
    }

    debug!(entity = %decl.name, instances = harvested.len(), "pre-defined instances harvested");
    Ok(harvested)
}
