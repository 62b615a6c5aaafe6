//! Names of fields, columns and tables.

use std::cmp::Reverse;

use tracing::debug;

use super::path::{field_at_mut, Target};
use super::{Context, Issue, Within};
use crate::error::ErrorKind;
use crate::metadata::Annotation;
use crate::schema::{leaves_of, Column, Field, FieldKind};

/// Names already taken by tables, with the entity that holds each.
#[derive(Debug, Default)]
pub(crate) struct NameRegistry {
    tables: Vec<(String, String)>,
}

impl NameRegistry {
    /// Claim a table name for an owner.
    pub(crate) fn register(&mut self, name: &str, owner: &str) -> Result<(), ErrorKind> {
        if name.is_empty() {
            return Err(ErrorKind::EmptyName);
        }
        if let Some((_, holder)) = self.tables.iter().find(|(n, _)| n == name) {
            return Err(ErrorKind::DuplicateTableName {
                name: name.to_string(),
                owner: holder.clone(),
            });
        }
        self.tables.push((name.to_string(), owner.to_string()));
        Ok(())
    }

    /// Number of registered tables.
    pub(crate) fn len(&self) -> usize {
        self.tables.len()
    }
}

impl Context<'_> {
    /// Apply the name markers of one site, deepest path first.
    pub(crate) fn apply_names(
        &self,
        fields: &mut [Field],
        root: Option<usize>,
        annotations: &[Annotation],
    ) -> Result<(), Issue> {
        let separator = self.config.separator.as_str();
        let mut renames: Vec<(&Annotation, &str, Option<&str>)> = annotations
            .iter()
            .filter_map(|a| match a {
                Annotation::Name { name, path } => Some((a, name.as_str(), path.as_deref())),
                _ => None,
            })
            .collect();
        renames.sort_by_key(|(_, _, path)| Reverse(path.map_or(0, |p| p.split(separator).count())));

        let mut applied: Vec<(Vec<usize>, String)> = Vec::new();
        for (annotation, name, path) in renames {
            if name.trim().is_empty() {
                return Err(ErrorKind::EmptyName.into());
            }
            let indices = match self.locate(fields, root, path)? {
                Target::Relation { at, rest } => {
                    self.defer(fields, &at, annotation, rest)?;
                    continue;
                }
                Target::Field(indices) => indices,
            };
            if let Some((_, first)) = applied.iter().find(|(target, _)| *target == indices) {
                if first != name {
                    return Err(ErrorKind::NameCardinality {
                        first: first.clone(),
                        second: name.to_string(),
                    }
                    .into());
                }
                continue;
            }

            let field = field_at_mut(fields, &indices)
                .ok_or_else(|| ErrorKind::NonexistentPath(path.unwrap_or_default().to_string()))?;
            if path.is_none() && matches!(field.kind, FieldKind::Relation(_)) {
                return Err(ErrorKind::MissingPath("Name", "relation").into());
            }
            if field.name != name {
                debug!(member = %field.member, from = %field.name, to = %name, "field renamed");
                field.name = name.to_string();
            }
            applied.push((indices, name.to_string()));
        }
        Ok(())
    }
}

/// Assign column names to every leaf stored in one table: the separator-joined
/// current names along the path.
pub(crate) fn assign_columns(fields: &mut [Field], prefix: Option<&str>, separator: &str) {
    for field in fields {
        let path = match prefix {
            Some(prefix) => format!("{}{}{}", prefix, separator, field.name),
            None => field.name.clone(),
        };
        match &mut field.kind {
            FieldKind::Scalar(leaf) | FieldKind::Enumeration(leaf) => leaf.column = path,
            FieldKind::Aggregate(a) => assign_columns(&mut a.fields, Some(&path), separator),
            FieldKind::Reference(r) => assign_columns(&mut r.fields, Some(&path), separator),
            FieldKind::Relation(_) => {}
        }
    }
}

/// Reorder siblings by declared ordinal positions, recursively. Fields
/// without a position fill the free slots in declaration order.
pub(crate) fn order_by_position(fields: Vec<Field>) -> Result<Vec<Field>, Issue> {
    let count = fields.len();
    let mut slots: Vec<Option<Field>> = (0..count).map(|_| None).collect();
    let mut floating = Vec::new();

    for mut field in fields {
        let member = field.member.clone();
        if field.is_inline() {
            if let Some(children) = field.children_mut() {
                let ordered = order_by_position(std::mem::take(children)).within(&member)?;
                *children = ordered;
            }
        }
        match field.position {
            Some(position) if position >= count => {
                return Err(Issue::from(ErrorKind::InvalidColumnPosition { position, count })
                    .within(&member));
            }
            Some(position) => {
                if slots[position].is_some() {
                    return Err(
                        Issue::from(ErrorKind::DuplicateColumnPosition(position)).within(&member)
                    );
                }
                slots[position] = Some(field);
            }
            None => floating.push(field),
        }
    }

    let mut floating = floating.into_iter();
    Ok(slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| floating.next()))
        .collect())
}

/// Columns of the leaves stored in one table, in field order.
pub(crate) fn build_columns(fields: &[Field]) -> Result<Vec<Column>, ErrorKind> {
    let mut columns: Vec<Column> = Vec::new();
    for (leaf, nullable) in leaves_of(fields) {
        if columns.iter().any(|c| c.name == leaf.column) {
            return Err(ErrorKind::DuplicateColumnName(leaf.column.clone()));
        }
        columns.push(Column {
            name: leaf.column.clone(),
            data_type: leaf.data_type.clone(),
            nullable,
            default: leaf.default.clone(),
            constraints: leaf.constraints.constraints(),
        });
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TypeRef;
    use crate::schema::{Aggregate, Creator, DataType, Leaf};
    use crate::value::ScalarType;

    fn leaf(member: &str, position: Option<usize>) -> Field {
        Field {
            member: member.into(),
            name: member.into(),
            declared: TypeRef::scalar(ScalarType::Int32),
            nullable: false,
            settable: true,
            position,
            kind: FieldKind::Scalar(Leaf::new(DataType::Scalar(ScalarType::Int32))),
        }
    }

    fn members(fields: &[Field]) -> Vec<&str> {
        fields.iter().map(|f| f.member.as_str()).collect()
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = NameRegistry::default();
        registry.register("Shop.Order", "Shop.Order").unwrap();
        assert_eq!(
            registry.register("Shop.Order", "Billing.Order"),
            Err(ErrorKind::DuplicateTableName {
                name: "Shop.Order".into(),
                owner: "Shop.Order".into()
            })
        );
        assert_eq!(registry.register("", "X"), Err(ErrorKind::EmptyName));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_order_by_position() {
        let fields = vec![leaf("A", None), leaf("B", Some(0)), leaf("C", None)];
        let ordered = order_by_position(fields).unwrap();
        assert_eq!(members(&ordered), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_position_errors() {
        let out_of_range = vec![leaf("A", Some(2)), leaf("B", None)];
        assert_eq!(
            order_by_position(out_of_range).unwrap_err().kind,
            ErrorKind::InvalidColumnPosition {
                position: 2,
                count: 2
            }
        );
        let duplicate = vec![leaf("A", Some(1)), leaf("B", Some(1))];
        assert_eq!(
            order_by_position(duplicate).unwrap_err().kind,
            ErrorKind::DuplicateColumnPosition(1)
        );
    }

    #[test]
    fn test_columns_join_current_names() {
        let mut fields = vec![
            leaf("Id", None),
            Field {
                member: "Home".into(),
                name: "Residence".into(),
                declared: TypeRef::named("Geo.Address"),
                nullable: false,
                settable: true,
                position: None,
                kind: FieldKind::Aggregate(Aggregate {
                    type_name: "Geo.Address".into(),
                    fields: vec![leaf("Zip", None)],
                    creator: Creator::Lookup,
                }),
            },
        ];
        assign_columns(&mut fields, None, ".");
        let columns = build_columns(&fields).unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Id", "Residence.Zip"]);
    }

    #[test]
    fn test_duplicate_columns() {
        let mut a = leaf("A", None);
        a.name = "X".into();
        let mut b = leaf("B", None);
        b.name = "X".into();
        let mut fields = vec![a, b];
        assign_columns(&mut fields, None, ".");
        assert_eq!(
            build_columns(&fields),
            Err(ErrorKind::DuplicateColumnName("X".into()))
        );
    }
}
