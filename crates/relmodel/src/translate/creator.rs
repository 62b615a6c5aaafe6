//! Constructor overload resolution.
//!
//! Resolution is two-phase: enumerate the candidate constructors (the pinned
//! one, or every public one), keep the viable ones, pick the greatest arity.

use tracing::debug;

use crate::error::ErrorKind;
use crate::metadata::{ConstructorDecl, TypeDecl, TypeRef, Visibility};
use crate::schema::{Creator, Field};

/// Identifier of the parameterless constructor a type without declared
/// constructors implicitly has.
pub(crate) const IMPLICIT_CONSTRUCTOR: &str = "default";

/// Constructors of a type, including the implicit one.
pub(crate) fn constructors(decl: &TypeDecl) -> Vec<ConstructorDecl> {
    if decl.constructors.is_empty() {
        vec![ConstructorDecl::public(IMPLICIT_CONSTRUCTOR)]
    } else {
        decl.constructors.clone()
    }
}

/// Decide how instances of a type are rebuilt from its fields.
pub(crate) fn resolve_creator(decl: &TypeDecl, fields: &[Field]) -> Result<Creator, ErrorKind> {
    let constructors = constructors(decl);
    let pinned: Vec<&ConstructorDecl> = constructors.iter().filter(|c| c.reconstitute).collect();

    let (constructor, bound) = match pinned.as_slice() {
        [] => select(&constructors, fields)?,
        [only] => {
            let bound = bind(only, fields).ok_or_else(|| ErrorKind::NonViableConstructor(only.id.clone()))?;
            (*only, bound)
        }
        _ => return Err(ErrorKind::MultipleSelectedConstructors),
    };

    let mut setters = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        if bound.contains(&i) {
            continue;
        }
        if !field.settable {
            return Err(ErrorKind::NotSettable(field.member.clone()));
        }
        setters.push(field.member.clone());
    }

    debug!(
        ty = %decl.name,
        constructor = %constructor.id,
        arity = constructor.arity(),
        "constructor selected"
    );
    Ok(Creator::Constructor {
        id: constructor.id.clone(),
        arguments: bound.iter().map(|&i| fields[i].member.clone()).collect(),
        setters,
    })
}

fn select<'c>(
    constructors: &'c [ConstructorDecl],
    fields: &[Field],
) -> Result<(&'c ConstructorDecl, Vec<usize>), ErrorKind> {
    let viable: Vec<(&ConstructorDecl, Vec<usize>)> = constructors
        .iter()
        .filter(|c| c.visibility == Visibility::Public)
        .filter_map(|c| bind(c, fields).map(|bound| (c, bound)))
        .collect();

    let Some(arity) = viable.iter().map(|(c, _)| c.arity()).max() else {
        return Err(ErrorKind::NoViableConstructor);
    };
    let mut best: Vec<(&ConstructorDecl, Vec<usize>)> =
        viable.into_iter().filter(|(c, _)| c.arity() == arity).collect();
    if best.len() > 1 {
        let mut ids: Vec<String> = best.iter().map(|(c, _)| c.id.clone()).collect();
        ids.sort();
        return Err(ErrorKind::AmbiguousConstructors(ids));
    }
    best.pop().ok_or(ErrorKind::NoViableConstructor)
}

/// Map each parameter to exactly one field, or `None` if the constructor is
/// not viable.
fn bind(constructor: &ConstructorDecl, fields: &[Field]) -> Option<Vec<usize>> {
    let mut bound: Vec<usize> = Vec::with_capacity(constructor.params.len());
    for param in &constructor.params {
        let matches: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                f.name.eq_ignore_ascii_case(&param.name) || f.member.eq_ignore_ascii_case(&param.name)
            })
            .map(|(i, _)| i)
            .collect();
        let [index] = matches.as_slice() else {
            return None;
        };
        if bound.contains(index) || !type_matches(&param.ty, &fields[*index]) {
            return None;
        }
        bound.push(*index);
    }
    Some(bound)
}

fn type_matches(param: &TypeRef, field: &Field) -> bool {
    if *param == field.declared {
        return true;
    }
    match param {
        TypeRef::Nullable(inner) => !field.nullable && **inner == field.declared,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, FieldKind, Leaf};
    use crate::value::ScalarType;

    fn field(member: &str, ty: ScalarType, settable: bool) -> Field {
        Field {
            member: member.into(),
            name: member.into(),
            declared: TypeRef::scalar(ty),
            nullable: false,
            settable,
            position: None,
            kind: FieldKind::Scalar(Leaf::new(DataType::Scalar(ty))),
        }
    }

    fn fields() -> Vec<Field> {
        vec![
            field("Id", ScalarType::Int32, false),
            field("Name", ScalarType::String, true),
            field("Price", ScalarType::Decimal, false),
        ]
    }

    fn int() -> TypeRef {
        TypeRef::scalar(ScalarType::Int32)
    }

    #[test]
    fn test_greatest_arity_wins() {
        let decl = TypeDecl::class("Shop.Product")
            .with_constructor(ConstructorDecl::public("short").with_param("id", int()))
            .with_constructor(
                ConstructorDecl::public("long")
                    .with_param("id", int())
                    .with_param("price", TypeRef::scalar(ScalarType::Decimal)),
            );
        let creator = resolve_creator(&decl, &fields()).unwrap();
        assert_eq!(
            creator,
            Creator::Constructor {
                id: "long".into(),
                arguments: vec!["Id".into(), "Price".into()],
                setters: vec!["Name".into()],
            }
        );
    }

    #[test]
    fn test_equal_arity_is_ambiguous() {
        let fields = vec![
            field("Id", ScalarType::Int32, true),
            field("Code", ScalarType::Int32, true),
        ];
        let decl = TypeDecl::class("Shop.Product")
            .with_constructor(ConstructorDecl::public("b").with_param("code", int()))
            .with_constructor(ConstructorDecl::public("a").with_param("id", int()));
        assert_eq!(
            resolve_creator(&decl, &fields),
            Err(ErrorKind::AmbiguousConstructors(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_uncovered_fields_must_be_settable() {
        let decl = TypeDecl::class("Shop.Product");
        assert_eq!(
            resolve_creator(&decl, &fields()),
            Err(ErrorKind::NotSettable("Id".into()))
        );
    }

    #[test]
    fn test_viability_rules() {
        let fields = fields();
        let wrong_type = ConstructorDecl::public("c").with_param("id", TypeRef::scalar(ScalarType::String));
        assert_eq!(bind(&wrong_type, &fields), None);

        let twice = ConstructorDecl::public("c").with_param("id", int()).with_param("ID", int());
        assert_eq!(bind(&twice, &fields), None);

        let unknown = ConstructorDecl::public("c").with_param("weight", int());
        assert_eq!(bind(&unknown, &fields), None);

        let unwrapped = ConstructorDecl::public("c").with_param("id", int().nullable());
        assert_eq!(bind(&unwrapped, &fields), Some(vec![0]));
    }

    #[test]
    fn test_parameters_follow_renames() {
        let mut fields = fields();
        fields[1].name = "Title".into();
        let decl = TypeDecl::class("Shop.Product").with_constructor(
            ConstructorDecl::public("c")
                .with_param("id", int())
                .with_param("title", TypeRef::scalar(ScalarType::String))
                .with_param("price", TypeRef::scalar(ScalarType::Decimal)),
        );
        let Creator::Constructor { arguments, setters, .. } = resolve_creator(&decl, &fields).unwrap() else {
            panic!("expected a constructor");
        };
        assert_eq!(arguments, vec!["Id", "Name", "Price"]);
        assert!(setters.is_empty());
    }

    #[test]
    fn test_pinned_constructor() {
        let decl = TypeDecl::class("Shop.Product")
            .with_constructor(
                ConstructorDecl::public("all")
                    .with_param("id", int())
                    .with_param("price", TypeRef::scalar(ScalarType::Decimal)),
            )
            .with_constructor(ConstructorDecl::private("bad").with_param("weight", int()).reconstitute_through());
        assert_eq!(
            resolve_creator(&decl, &fields()),
            Err(ErrorKind::NonViableConstructor("bad".into()))
        );

        let decl = TypeDecl::class("Shop.Product")
            .with_constructor(ConstructorDecl::public("a").reconstitute_through())
            .with_constructor(ConstructorDecl::public("b").reconstitute_through());
        assert_eq!(
            resolve_creator(&decl, &fields()),
            Err(ErrorKind::MultipleSelectedConstructors)
        );
    }

    #[test]
    fn test_no_public_constructor() {
        let decl = TypeDecl::class("Shop.Product").with_constructor(ConstructorDecl::private("hidden"));
        assert_eq!(resolve_creator(&decl, &fields()), Err(ErrorKind::NoViableConstructor));
    }
}
