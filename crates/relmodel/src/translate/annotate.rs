//! Marker application at one annotation site.
//!
//! A site is either one member (`root = Some(index)`, paths relative to that
//! member) or a relation table (`root = None`, paths relative to the table's
//! fields). Conversions come first so that defaults and constraints are
//! checked against the stored domain; renames come before everything that
//! resolves paths by current name.

use tracing::debug;

use super::path::{field_at, field_at_mut, Target};
use super::{Context, Issue};
use crate::error::ErrorKind;
use crate::metadata::Annotation;
use crate::schema::{Field, FieldKind};

/// Where the markers being applied were declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// A member of an entity type.
    Entity,
    /// A member of a struct type.
    Aggregate,
    /// Markers forwarded into a relation table.
    RelationTable,
}

/// A key marker resolved to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyMark {
    /// Primary-key rather than candidate-key marker.
    pub(crate) primary: bool,
    /// Candidate-key name.
    pub(crate) name: Option<String>,
    /// Index path of the marked field.
    pub(crate) target: Vec<usize>,
}

impl Context<'_> {
    /// Apply every marker of one site.
    pub(crate) fn annotate(
        &self,
        fields: &mut [Field],
        root: Option<usize>,
        annotations: &[Annotation],
        scope: Scope,
        marks: &mut Vec<KeyMark>,
    ) -> Result<(), Issue> {
        if let Some(i) = root {
            if let Some(field) = fields.get_mut(i) {
                self.apply_conversions(field, annotations)?;
            }
        }
        self.apply_names(fields, root, annotations)?;
        self.apply_defaults(fields, root, annotations)?;
        self.apply_checks(fields, root, annotations)?;
        if let Some(i) = root {
            apply_position(fields, i, annotations)?;
        }
        self.apply_keys(fields, root, annotations, scope, marks)?;
        self.apply_relation_tables(fields, root, annotations)?;
        Ok(())
    }

    fn apply_keys(
        &self,
        fields: &mut [Field],
        root: Option<usize>,
        annotations: &[Annotation],
        scope: Scope,
        marks: &mut Vec<KeyMark>,
    ) -> Result<(), Issue> {
        for annotation in annotations {
            let (primary, name, path) = match annotation {
                Annotation::PrimaryKey { path } => (true, None, path.as_deref()),
                Annotation::Unique { name, path } => (false, name.clone(), path.as_deref()),
                _ => continue,
            };
            if scope == Scope::Aggregate {
                return Err(ErrorKind::KeyMarkerInAggregate(annotation.label()).into());
            }
            if primary && scope == Scope::RelationTable {
                return Err(ErrorKind::PrimaryKeyInRelation.into());
            }

            let target = match self.locate(fields, root, path)? {
                Target::Relation { at, rest } => {
                    if primary {
                        return Err(ErrorKind::PrimaryKeyInRelation.into());
                    }
                    self.defer(fields, &at, annotation, rest)?;
                    continue;
                }
                Target::Field(target) => target,
            };
            let field = field_at(fields, &target)
                .ok_or_else(|| ErrorKind::NonexistentPath(path.unwrap_or_default().to_string()))?;
            if matches!(field.kind, FieldKind::Relation(_)) {
                if primary {
                    return Err(ErrorKind::PrimaryKeyInRelation.into());
                }
                return Err(ErrorKind::MissingPath("Unique", "relation").into());
            }

            let mark = KeyMark {
                primary,
                name,
                target,
            };
            if marks.contains(&mark) {
                debug!(marker = annotation.label(), "repeated key marker ignored");
                continue;
            }
            marks.push(mark);
        }
        Ok(())
    }

    fn apply_relation_tables(
        &self,
        fields: &mut [Field],
        root: Option<usize>,
        annotations: &[Annotation],
    ) -> Result<(), Issue> {
        let mut applied: Vec<(Vec<usize>, &str)> = Vec::new();
        for annotation in annotations {
            let Annotation::RelationTable { name, path } = annotation else {
                continue;
            };
            if name.trim().is_empty() {
                return Err(ErrorKind::EmptyName.into());
            }
            let target = match self.locate(fields, root, path.as_deref())? {
                Target::Field(target) => target,
                Target::Relation { rest, .. } => return Err(ErrorKind::NonexistentPath(rest).into()),
            };
            if let Some((_, first)) = applied.iter().find(|(t, _)| *t == target) {
                if *first != name.as_str() {
                    return Err(ErrorKind::NameCardinality {
                        first: first.to_string(),
                        second: name.clone(),
                    }
                    .into());
                }
                continue;
            }

            let field = field_at_mut(fields, &target)
                .ok_or_else(|| ErrorKind::NonexistentPath(path.clone().unwrap_or_default()))?;
            let label = field.kind_label();
            let FieldKind::Relation(relation) = &mut field.kind else {
                return Err(ErrorKind::MissingPath("RelationTable", label).into());
            };
            relation.table = name.clone();
            applied.push((target, name.as_str()));
        }
        Ok(())
    }
}

fn apply_position(fields: &mut [Field], root: usize, annotations: &[Annotation]) -> Result<(), Issue> {
    let mut position = None;
    for annotation in annotations {
        let Annotation::Column(n) = annotation else {
            continue;
        };
        match position {
            Some(p) if p != *n => return Err(ErrorKind::DuplicateColumnPosition(*n).into()),
            _ => position = Some(*n),
        }
    }
    if let (Some(position), Some(field)) = (position, fields.get_mut(root)) {
        field.position = Some(position);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranslatorConfig;
    use crate::metadata::{ConstraintDecl, Model, TypeRef};
    use crate::schema::{Aggregate, Creator, DataType, Leaf, Relation};
    use crate::value::{CollectionKind, ScalarType, Value};

    fn leaf(member: &str, nullable: bool) -> Field {
        Field {
            member: member.into(),
            name: member.into(),
            declared: TypeRef::scalar(ScalarType::Int32),
            nullable,
            settable: true,
            position: None,
            kind: FieldKind::Scalar(Leaf::new(DataType::Scalar(ScalarType::Int32))),
        }
    }

    fn fields() -> Vec<Field> {
        vec![
            leaf("Id", false),
            Field {
                member: "Size".into(),
                name: "Size".into(),
                declared: TypeRef::named("Geo.Size"),
                nullable: false,
                settable: true,
                position: None,
                kind: FieldKind::Aggregate(Aggregate {
                    type_name: "Geo.Size".into(),
                    fields: vec![leaf("Width", false), leaf("Height", true)],
                    creator: Creator::Lookup,
                }),
            },
            Field {
                member: "Scores".into(),
                name: "Scores".into(),
                declared: TypeRef::list(TypeRef::scalar(ScalarType::Int32)),
                nullable: false,
                settable: true,
                position: None,
                kind: FieldKind::Relation(Relation::new(
                    CollectionKind::List,
                    None,
                    TypeRef::scalar(ScalarType::Int32),
                )),
            },
        ]
    }

    fn run(fields: &mut [Field], root: usize, annotations: &[Annotation]) -> Result<Vec<KeyMark>, ErrorKind> {
        let model = Model::new();
        let config = TranslatorConfig::default();
        let ctx = Context::new(&model, &config);
        let mut marks = Vec::new();
        ctx.annotate(fields, Some(root), annotations, Scope::Entity, &mut marks)
            .map_err(|i| i.kind)?;
        Ok(marks)
    }

    #[test]
    fn test_nested_markers() {
        let mut fields = fields();
        run(
            &mut fields,
            1,
            &[
                Annotation::name_at("W", "Width"),
                Annotation::default_at(3, "W"),
                Annotation::check_at(ConstraintDecl::greater_than(0), "Width"),
                Annotation::name("Dimensions"),
            ],
        )
        .unwrap();

        let size = &fields[1];
        assert_eq!(size.name, "Dimensions");
        let width = size.children()[0].leaf().unwrap();
        assert_eq!(width.default, Some(Value::Int(3)));
        assert!(!width.constraints.is_empty());
        assert_eq!(size.children()[0].name, "W");
    }

    #[test]
    fn test_repeated_markers_are_idempotent() {
        let mut once = fields();
        let mut twice = fields();
        run(&mut once, 0, &[Annotation::name("Key"), Annotation::primary_key()]).unwrap();
        let marks = run(
            &mut twice,
            0,
            &[
                Annotation::name("Key"),
                Annotation::name("Key"),
                Annotation::primary_key(),
                Annotation::primary_key(),
            ],
        )
        .unwrap();
        assert_eq!(once[0].name, twice[0].name);
        assert_eq!(marks.len(), 1);
    }

    #[test]
    fn test_conflicting_renames() {
        let mut fields = fields();
        assert_eq!(
            run(&mut fields, 0, &[Annotation::name("A"), Annotation::name("B")]),
            Err(ErrorKind::NameCardinality {
                first: "A".into(),
                second: "B".into()
            })
        );
    }

    #[test]
    fn test_markers_on_composites_need_paths() {
        let mut fields = fields();
        assert_eq!(
            run(&mut fields, 1, &[Annotation::default_value(1)]),
            Err(ErrorKind::MissingPath("Default", "aggregate"))
        );
        assert_eq!(
            run(&mut fields, 2, &[Annotation::name("Points")]),
            Err(ErrorKind::MissingPath("Name", "relation"))
        );
        assert_eq!(
            run(&mut fields, 2, &[Annotation::unique()]),
            Err(ErrorKind::MissingPath("Unique", "relation"))
        );
        assert_eq!(
            run(&mut fields, 1, &[Annotation::default_at(1, "Depth")]),
            Err(ErrorKind::NonexistentPath("Depth".into()))
        );
    }

    #[test]
    fn test_relation_markers() {
        let mut fields = fields();
        assert_eq!(
            run(&mut fields, 2, &[Annotation::primary_key_at("Item")]),
            Err(ErrorKind::PrimaryKeyInRelation)
        );

        let mut fields = self::fields();
        run(
            &mut fields,
            2,
            &[
                Annotation::relation_table("Shop.Scores"),
                Annotation::check_at(ConstraintDecl::greater_than(0), "Item"),
            ],
        )
        .unwrap();
        let relation = fields[2].relation().unwrap();
        assert_eq!(relation.table, "Shop.Scores");
        assert_eq!(relation.pending.len(), 1);
    }

    #[test]
    fn test_key_marker_in_aggregate() {
        let model = Model::new();
        let config = TranslatorConfig::default();
        let ctx = Context::new(&model, &config);
        let mut fields = fields();
        let err = ctx
            .annotate(&mut fields, Some(0), &[Annotation::primary_key()], Scope::Aggregate, &mut Vec::new())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::KeyMarkerInAggregate("PrimaryKey"));
    }

    #[test]
    fn test_column_positions() {
        let mut fields = fields();
        run(&mut fields, 0, &[Annotation::Column(2), Annotation::Column(2)]).unwrap();
        assert_eq!(fields[0].position, Some(2));
        assert_eq!(
            run(&mut fields, 0, &[Annotation::Column(1), Annotation::Column(0)]),
            Err(ErrorKind::DuplicateColumnPosition(0))
        );
    }
}
