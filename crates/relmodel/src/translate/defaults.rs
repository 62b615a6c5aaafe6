//! Default values.

use tracing::debug;

use super::path::{field_at_mut, nullable_along, Target};
use super::{Context, Issue};
use crate::error::ErrorKind;
use crate::metadata::Annotation;
use crate::schema::{Field, Leaf};
use crate::value::Value;

/// Bring a literal into the stored domain of a leaf.
///
/// The literal may be written in the declared domain (and is then converted)
/// or directly in the stored domain, in which case it must convert back to a
/// declared value.
pub(crate) fn literal(leaf: &Leaf, value: &Value) -> Option<Value> {
    if value.is_null() {
        return None;
    }
    if leaf.domain.normalize(value).is_some() {
        return leaf.store(value).ok().filter(|v| !v.is_null());
    }
    let stored = leaf.data_type.normalize(value)?;
    let declared = leaf.load(&stored).ok()?;
    leaf.domain.normalize(&declared)?;
    Some(stored)
}

impl Context<'_> {
    /// Apply the default markers of one site.
    pub(crate) fn apply_defaults(
        &self,
        fields: &mut [Field],
        root: Option<usize>,
        annotations: &[Annotation],
    ) -> Result<(), Issue> {
        let mut applied: Vec<(Vec<usize>, Value)> = Vec::new();
        for annotation in annotations {
            let Annotation::Default { value, path } = annotation else {
                continue;
            };
            let indices = match self.locate(fields, root, path.as_deref())? {
                Target::Relation { at, rest } => {
                    self.defer(fields, &at, annotation, rest)?;
                    continue;
                }
                Target::Field(indices) => indices,
            };

            let nullable = nullable_along(fields, &indices);
            let field = field_at_mut(fields, &indices)
                .ok_or_else(|| ErrorKind::NonexistentPath(path.clone().unwrap_or_default()))?;
            let label = field.kind_label();
            let leaf = field
                .leaf_mut()
                .ok_or(ErrorKind::MissingPath("Default", label))?;

            let stored = if value.is_null() {
                if !nullable {
                    return Err(ErrorKind::NullDefaultOnNonNullable.into());
                }
                Value::Null
            } else {
                literal(leaf, value).ok_or_else(|| ErrorKind::InvalidDefault {
                    value: value.to_string(),
                    domain: leaf.domain.to_string(),
                })?
            };

            if let Some((_, first)) = applied.iter().find(|(target, _)| *target == indices) {
                if !first.same(&stored) {
                    return Err(ErrorKind::ConflictingDefaults {
                        first: first.to_string(),
                        second: stored.to_string(),
                    }
                    .into());
                }
                debug!(default = %stored, "repeated default ignored");
                continue;
            }
            leaf.default = Some(stored.clone());
            applied.push((indices, stored));
        }
        Ok(())
    }
}
