//! Marker path resolution.
//!
//! A path names a nested field relative to the annotated member. Each segment
//! matches a field by its current name first and by its original member name
//! otherwise. Paths that reach into a relation stop there; the remainder is
//! resolved against the relation table once it exists.

use crate::error::ErrorKind;
use crate::schema::{Field, FieldKind};

/// Where a path leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// A field stored in the same table, by index path.
    Field(Vec<usize>),
    /// A relation on the way, with the unresolved remainder.
    Relation {
        /// Index path of the relation field.
        at: Vec<usize>,
        /// Remaining path inside the relation table.
        rest: String,
    },
}

/// Resolve a path against a list of sibling fields.
pub(crate) fn resolve(fields: &[Field], path: &str, separator: &str) -> Result<Target, ErrorKind> {
    let segments: Vec<&str> = path.split(separator).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ErrorKind::NonexistentPath(path.to_string()));
    }

    let mut indices = Vec::with_capacity(segments.len());
    let mut current = fields;
    for (depth, segment) in segments.iter().enumerate() {
        let index = current
            .iter()
            .position(|f| f.name == *segment)
            .or_else(|| current.iter().position(|f| f.member == *segment))
            .ok_or_else(|| ErrorKind::NonexistentPath(path.to_string()))?;
        indices.push(index);

        let field = &current[index];
        let last = depth + 1 == segments.len();
        match &field.kind {
            FieldKind::Relation(_) if !last => {
                return Ok(Target::Relation {
                    at: indices,
                    rest: segments[depth + 1..].join(separator),
                });
            }
            _ if last => break,
            FieldKind::Aggregate(a) => current = &a.fields,
            FieldKind::Reference(r) => current = &r.fields,
            _ => return Err(ErrorKind::NonexistentPath(path.to_string())),
        }
    }
    Ok(Target::Field(indices))
}

/// Field at an index path.
pub(crate) fn field_at<'f>(fields: &'f [Field], indices: &[usize]) -> Option<&'f Field> {
    let (first, rest) = indices.split_first()?;
    let field = fields.get(*first)?;
    if rest.is_empty() {
        return Some(field);
    }
    field_at(field.children(), rest)
}

/// Mutable field at an index path. Relation fields are descended into their
/// relation-table fields.
pub(crate) fn field_at_mut<'f>(fields: &'f mut [Field], indices: &[usize]) -> Option<&'f mut Field> {
    let (first, rest) = indices.split_first()?;
    let field = fields.get_mut(*first)?;
    if rest.is_empty() {
        return Some(field);
    }
    field_at_mut(field.children_mut()?, rest)
}

/// Whether any field along an index path is nullable.
pub(crate) fn nullable_along(fields: &[Field], indices: &[usize]) -> bool {
    let mut current = fields;
    for index in indices {
        let Some(field) = current.get(*index) else {
            return false;
        };
        if field.nullable {
            return true;
        }
        current = field.children();
    }
    false
}
