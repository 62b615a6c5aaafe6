//! Constraint application and validation.

use tracing::debug;

use super::defaults::literal;
use super::path::{field_at_mut, Target};
use super::{Context, Issue, Within};
use crate::error::ErrorKind;
use crate::metadata::{Annotation, ConstraintDecl};
use crate::schema::{CustomCheck, Field, FieldKind, Leaf};
use crate::value::Value;

/// Add a declared constraint to a leaf, checking it against the stored domain.
pub(crate) fn apply_constraint(leaf: &mut Leaf, decl: &ConstraintDecl) -> Result<(), ErrorKind> {
    let inapplicable = || ErrorKind::InapplicableConstraint {
        constraint: decl.label(),
        domain: leaf.data_type.to_string(),
    };
    let anchor = |value: &Value| {
        literal(leaf, value).ok_or_else(|| ErrorKind::InvalidAnchor {
            anchor: value.to_string(),
            constraint: decl.label(),
            domain: leaf.data_type.to_string(),
        })
    };

    match decl {
        ConstraintDecl::Sign(sign) => {
            if !leaf.data_type.is_numeric() {
                return Err(inapplicable());
            }
            leaf.constraints.add_sign(*sign);
        }
        ConstraintDecl::Compare(op, value) => {
            if !leaf.data_type.is_ordered() {
                return Err(inapplicable());
            }
            let value = anchor(value)?;
            leaf.constraints.add_comparison(*op, value);
        }
        ConstraintDecl::Length { min, max } => {
            if !leaf.data_type.is_textual() {
                return Err(inapplicable());
            }
            leaf.constraints.add_length(*min, *max);
        }
        ConstraintDecl::OneOf(values) => {
            let values = values.iter().map(anchor).collect::<Result<Vec<_>, _>>()?;
            leaf.constraints.add_allowed(values);
        }
        ConstraintDecl::NotOneOf(values) => {
            let values = values.iter().map(anchor).collect::<Result<Vec<_>, _>>()?;
            leaf.constraints.add_disallowed(values);
        }
        ConstraintDecl::Custom { generator, args } => {
            leaf.constraints
                .add_custom(CustomCheck::new(generator.clone(), args.clone()));
        }
    }
    Ok(())
}

/// Validate a finished leaf: satisfiability, default against the combined
/// constraints, and custom check generation.
pub(crate) fn finalize_leaf(leaf: &mut Leaf) -> Result<(), ErrorKind> {
    leaf.constraints
        .check_satisfiable(&leaf.data_type)
        .map_err(ErrorKind::Unsatisfiable)?;

    if let Some(default) = leaf.default.as_ref().filter(|d| !d.is_null()) {
        leaf.constraints
            .admits(default)
            .map_err(|constraint| ErrorKind::DefaultContradictsConstraint {
                value: default.to_string(),
                constraint,
            })?;
    }

    let column = leaf.column.clone();
    let data_type = leaf.data_type.clone();
    for check in &mut leaf.constraints.custom {
        check
            .generate(&column, &data_type)
            .map_err(|reason| ErrorKind::GeneratorFailed {
                generator: check.generator.clone(),
                reason,
            })?;
    }
    Ok(())
}

/// Finalize every leaf stored in one table.
pub(crate) fn finalize_leaves(fields: &mut [Field]) -> Result<(), Issue> {
    for field in fields {
        let member = field.member.clone();
        match &mut field.kind {
            FieldKind::Scalar(leaf) | FieldKind::Enumeration(leaf) => {
                finalize_leaf(leaf).within(&member)?
            }
            FieldKind::Aggregate(a) => finalize_leaves(&mut a.fields).within(&member)?,
            FieldKind::Reference(r) => finalize_leaves(&mut r.fields).within(&member)?,
            FieldKind::Relation(_) => {}
        }
    }
    Ok(())
}

impl Context<'_> {
    /// Apply the constraint markers of one site.
    pub(crate) fn apply_checks(
        &self,
        fields: &mut [Field],
        root: Option<usize>,
        annotations: &[Annotation],
    ) -> Result<(), Issue> {
        for annotation in annotations {
            let Annotation::Check { constraint, path } = annotation else {
                continue;
            };
            let indices = match self.locate(fields, root, path.as_deref())? {
                Target::Relation { at, rest } => {
                    self.defer(fields, &at, annotation, rest)?;
                    continue;
                }
                Target::Field(indices) => indices,
            };
            let field = field_at_mut(fields, &indices)
                .ok_or_else(|| ErrorKind::NonexistentPath(path.clone().unwrap_or_default()))?;
            let label = field.kind_label();
            let leaf = field
                .leaf_mut()
                .ok_or(ErrorKind::MissingPath("Check", label))?;
            apply_constraint(leaf, constraint)?;
            debug!(constraint = %constraint.label(), "constraint applied");
        }
        Ok(())
    }
}
