//! Primary-key deduction, candidate keys and foreign keys.

use tracing::debug;

use super::annotate::KeyMark;
use super::path::field_at;
use super::Context;
use crate::error::ErrorKind;
use crate::schema::{
    leaves_of, CandidateKey, Column, Field, FieldKind, ForeignKey, KeySource, PrimaryKey,
};

/// A key marker resolved to the columns it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnMark {
    pub(crate) primary: bool,
    pub(crate) name: Option<String>,
    pub(crate) columns: Vec<String>,
}

/// Resolve key markers to columns. Must run after column names are assigned
/// and before fields are reordered.
pub(crate) fn resolve_marks(fields: &[Field], marks: &[KeyMark]) -> Vec<ColumnMark> {
    marks
        .iter()
        .filter_map(|mark| {
            let field = field_at(fields, &mark.target)?;
            Some(ColumnMark {
                primary: mark.primary,
                name: mark.name.clone(),
                columns: field.leaves().iter().map(|(l, _)| l.column.clone()).collect(),
            })
        })
        .collect()
}

/// Determine the primary key and candidate keys of a principal table.
///
/// Explicit markers win; otherwise the key is deduced from the `Id` naming
/// convention, then from the only fully non-nullable candidate key, then
/// from the only non-nullable field.
pub(crate) fn deduce_keys(
    short_name: &str,
    fields: &[Field],
    columns: &[Column],
    marks: &[ColumnMark],
) -> Result<(PrimaryKey, Vec<CandidateKey>), ErrorKind> {
    let candidates = candidate_keys(columns, marks);

    let declared: Vec<String> = dedup(
        marks
            .iter()
            .filter(|m| m.primary)
            .flat_map(|m| m.columns.iter().cloned()),
    );
    let not_null = |key: &&CandidateKey| {
        key.columns
            .iter()
            .all(|c| columns.iter().any(|col| col.name == *c && !col.nullable))
    };
    let complete: Vec<&CandidateKey> = candidates.iter().filter(not_null).collect();

    let (key, source) = if !declared.is_empty() {
        (declared, KeySource::Declared)
    } else if let Some(key) = by_naming(short_name, fields) {
        (key, KeySource::Naming)
    } else if let [only] = complete.as_slice() {
        (only.columns.clone(), KeySource::CandidateKey)
    } else if let Some(key) = sole_non_nullable(fields) {
        (key, KeySource::SoleNonNullable)
    } else {
        return Err(ErrorKind::UndeducibleKey);
    };

    let primary_key = primary_key(key, source, columns)?;
    debug!(columns = ?primary_key.columns, source = ?primary_key.source, "primary key determined");
    Ok((primary_key.clone(), drop_redundant(candidates, &primary_key)))
}

/// Check a key for nullable columns and put its columns in table order.
pub(crate) fn primary_key(
    mut key: Vec<String>,
    source: KeySource,
    columns: &[Column],
) -> Result<PrimaryKey, ErrorKind> {
    for name in &key {
        if columns.iter().any(|c| c.name == *name && c.nullable) {
            return Err(ErrorKind::NullableKeyMember(name.clone()));
        }
    }
    key.sort_by_key(|name| columns.iter().position(|c| c.name == *name));
    Ok(PrimaryKey {
        columns: key,
        source,
    })
}

/// Group candidate-key markers into keys: named markers merge by name,
/// keys over the same column set merge.
pub(crate) fn candidate_keys(columns: &[Column], marks: &[ColumnMark]) -> Vec<CandidateKey> {
    let mut keys: Vec<CandidateKey> = Vec::new();
    for mark in marks.iter().filter(|m| !m.primary) {
        let named = mark
            .name
            .as_ref()
            .and_then(|name| keys.iter_mut().find(|k| k.name.as_ref() == Some(name)));
        match named {
            Some(key) => {
                for column in &mark.columns {
                    if !key.columns.contains(column) {
                        key.columns.push(column.clone());
                    }
                }
            }
            None => keys.push(CandidateKey {
                name: mark.name.clone(),
                columns: dedup(mark.columns.iter().cloned()),
            }),
        }
    }
    for key in &mut keys {
        key.columns
            .sort_by_key(|name| columns.iter().position(|c| c.name == *name));
    }

    let mut merged: Vec<CandidateKey> = Vec::new();
    for key in keys {
        match merged.iter_mut().find(|k| k.columns == key.columns) {
            Some(existing) => {
                debug!(columns = ?key.columns, "duplicate candidate key merged");
                if existing.name.is_none() {
                    existing.name = key.name;
                }
            }
            None => merged.push(key),
        }
    }
    merged
}

/// Drop candidate keys that contain the primary key.
pub(crate) fn drop_redundant(keys: Vec<CandidateKey>, primary: &PrimaryKey) -> Vec<CandidateKey> {
    keys.into_iter()
        .filter(|key| {
            let redundant = primary.columns.iter().all(|c| key.columns.contains(c));
            if redundant {
                debug!(columns = ?key.columns, "candidate key covers the primary key, dropped");
            }
            !redundant
        })
        .collect()
}

fn by_naming(short_name: &str, fields: &[Field]) -> Option<Vec<String>> {
    let entity_id = format!("{}Id", short_name);
    let is_id = |name: &str| name.eq_ignore_ascii_case("Id") || name.eq_ignore_ascii_case(&entity_id);
    let matches: Vec<&Field> = fields
        .iter()
        .filter(|f| f.is_inline() && (is_id(&f.member) || is_id(&f.name)))
        .collect();
    match matches.as_slice() {
        [only] => Some(leaf_columns(only)),
        _ => None,
    }
}

fn sole_non_nullable(fields: &[Field]) -> Option<Vec<String>> {
    let required: Vec<&Field> = fields
        .iter()
        .filter(|f| {
            let leaves = f.leaves();
            f.is_inline() && !leaves.is_empty() && leaves.iter().all(|(_, nullable)| !nullable)
        })
        .collect();
    match required.as_slice() {
        [only] => Some(leaf_columns(only)),
        _ => None,
    }
}

fn leaf_columns(field: &Field) -> Vec<String> {
    field.leaves().iter().map(|(l, _)| l.column.clone()).collect()
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

impl Context<'_> {
    /// Foreign keys for every reference stored in a table.
    pub(crate) fn foreign_keys(&self, fields: &[Field]) -> Vec<ForeignKey> {
        let mut out = Vec::new();
        self.collect_foreign_keys(fields, &mut out);
        out
    }

    fn collect_foreign_keys(&self, fields: &[Field], out: &mut Vec<ForeignKey>) {
        for field in fields {
            match &field.kind {
                FieldKind::Reference(r) => {
                    let target_columns = self
                        .keys
                        .get(&r.target)
                        .map(|p| p.columns.clone())
                        .unwrap_or_default();
                    out.push(ForeignKey {
                        columns: leaves_of(&r.fields)
                            .iter()
                            .map(|(l, _)| l.column.clone())
                            .collect(),
                        target_table: r.table.clone(),
                        target_columns,
                    });
                }
                FieldKind::Aggregate(a) => self.collect_foreign_keys(&a.fields, out),
                _ => {}
            }
        }
    }
}
