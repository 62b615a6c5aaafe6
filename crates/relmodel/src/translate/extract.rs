//! Field extraction: which declared members become fields.

use super::Issue;
use crate::error::ErrorKind;
use crate::metadata::{Annotation, MemberDecl, Model, TypeDecl};

/// Minimum number of fields of an entity.
pub(crate) const ENTITY_MIN_FIELDS: usize = 2;

/// Minimum number of fields of an aggregate.
pub(crate) const AGGREGATE_MIN_FIELDS: usize = 1;

/// Select the members of a type that become fields.
///
/// The inheritance chain is walked from the root base type down; a later
/// declaration of a name replaces an earlier one. Of the surviving
/// declarations, only those of the type itself are included by default;
/// `[Include]` pulls in inherited and non-public members.
pub(crate) fn extract_members<'m>(
    model: &'m Model,
    decl: &'m TypeDecl,
    required: usize,
) -> Result<Vec<&'m MemberDecl>, Issue> {
    let mut slots: Vec<(&'m MemberDecl, &'m str)> = Vec::new();
    for owner in model.linearize(decl) {
        for member in &owner.members {
            let include = member.has(|a| matches!(a, Annotation::Include));
            let code_only = member.has(|a| matches!(a, Annotation::CodeOnly));
            if include && code_only {
                return Err(Issue::from(ErrorKind::IncludeAndCodeOnly).within(&member.name));
            }
            if member.is_static {
                continue;
            }
            match slots.iter().position(|(m, _)| m.name == member.name) {
                Some(i) => slots[i] = (member, owner.name.as_str()),
                None => slots.push((member, owner.name.as_str())),
            }
        }
    }

    let members: Vec<&MemberDecl> = slots
        .into_iter()
        .filter(|(member, owner)| is_field(member, *owner == decl.name))
        .map(|(member, _)| member)
        .collect();

    if members.len() < required {
        return Err(ErrorKind::TooFewFields {
            found: members.len(),
            required,
        }
        .into());
    }
    Ok(members)
}

fn is_field(member: &MemberDecl, own: bool) -> bool {
    if member.getter.is_none() || member.generic {
        return false;
    }
    if member.has(|a| matches!(a, Annotation::CodeOnly)) {
        return false;
    }
    if member.has(|a| matches!(a, Annotation::Include)) {
        return true;
    }
    own && member.is_public() && member.contract.is_none()
}
