//! Integration tests for schema translation.

use pretty_assertions::assert_eq;
use relmodel::metadata::{ConstraintDecl, EnumDecl};
use relmodel::schema::Creator;
use relmodel::{
    Annotation, ConstructorDecl, ErrorCategory, ErrorKind, InstanceDecl, KeySource, MemberDecl,
    Model, Object, ScalarType, Schema, TableNaming, TranslationError, Translator, TranslatorConfig,
    TypeDecl, TypeRef, Value,
};

fn int(name: &str) -> MemberDecl {
    MemberDecl::property(name, TypeRef::scalar(ScalarType::Int32))
}

fn text(name: &str) -> MemberDecl {
    MemberDecl::property(name, TypeRef::scalar(ScalarType::String))
}

fn optional_text(name: &str) -> MemberDecl {
    MemberDecl::property(name, TypeRef::scalar(ScalarType::String).nullable())
}

fn translate(model: &Model, root: &str) -> Result<Schema, TranslationError> {
    Translator::default().translate(model, &[root])
}

fn shop() -> Model {
    Model::new()
        .with_type(
            TypeDecl::structure("Shop.Line")
                .with_member(text("Sku"))
                .with_member(int("Qty")),
        )
        .with_type(TypeDecl::enumeration(
            "Shop.Status",
            EnumDecl::new(["Open", "Closed"]),
        ))
        .with_type(
            TypeDecl::class("Shop.Customer")
                .with_member(int("Id"))
                .with_member(text("Name").with(Annotation::unique())),
        )
        .with_type(
            TypeDecl::class("Shop.Order")
                .with_member(int("Id"))
                .with_member(MemberDecl::property("Customer", TypeRef::named("Shop.Customer")))
                .with_member(MemberDecl::property("Status", TypeRef::named("Shop.Status")))
                .with_member(MemberDecl::property(
                    "Lines",
                    TypeRef::ordered_list(TypeRef::named("Shop.Line")),
                ))
                .with_member(MemberDecl::property(
                    "Tags",
                    TypeRef::set(TypeRef::scalar(ScalarType::String)),
                ))
                .with_member(MemberDecl::property(
                    "Prices",
                    TypeRef::map(
                        TypeRef::scalar(ScalarType::String),
                        TypeRef::scalar(ScalarType::Float64),
                    ),
                )),
        )
}

#[test]
fn test_primary_keys_are_never_nullable() {
    let schema = translate(&shop(), "Shop.Order").unwrap();
    assert_eq!(schema.len(), 2);
    for table in schema.tables() {
        assert!(!table.primary_key.columns.is_empty(), "{} has no key", table.name);
        for column in &table.primary_key.columns {
            let column = table.column(column).unwrap();
            assert!(!column.nullable, "{}.{} is nullable", table.name, column.name);
        }
    }
}

#[test]
fn test_relation_tables_by_kind() {
    let schema = translate(&shop(), "Shop.Order").unwrap();
    let order = schema.entity("Shop.Order").unwrap();
    assert_eq!(order.relation_tables.len(), 3);

    let key_of = |name: &str| schema.table(name).unwrap().primary_key.columns.clone();
    assert_eq!(key_of("Shop.Order.LinesTable"), vec!["Order.Id", "Index"]);
    assert_eq!(key_of("Shop.Order.TagsTable"), vec!["Order.Id", "Item"]);
    assert_eq!(key_of("Shop.Order.PricesTable"), vec!["Order.Id", "Key"]);

    let lines = schema.table("Shop.Order.LinesTable").unwrap();
    assert_eq!(lines.primary_key.source, KeySource::Relation);
    assert_eq!(lines.foreign_keys[0].target_table, "Shop.Order");
    assert!(lines.is_relation());
}

#[test]
fn test_references_become_foreign_keys() {
    let schema = translate(&shop(), "Shop.Order").unwrap();
    let order = schema.entity("Shop.Order").unwrap();
    assert_eq!(order.referenced_entities(), vec!["Shop.Customer"]);
    assert_eq!(order.table.column_names(), vec!["Id", "Customer.Id", "Status"]);
    let fk = &order.table.foreign_keys[0];
    assert_eq!(fk.columns, vec!["Customer.Id"]);
    assert_eq!(fk.target_table, "Shop.Customer");

    // Unique markers on the target do not travel with the reference.
    assert!(order.table.candidate_keys.is_empty());
    let customer = schema.entity("Shop.Customer").unwrap();
    assert_eq!(customer.table.candidate_keys.len(), 1);
}

#[test]
fn test_translation_is_deterministic() {
    let config = TranslatorConfig::default().with_workers(4);
    let translator = Translator::new(config).unwrap();
    let first = translator.translate(&shop(), &["Shop.Order"]).unwrap();
    let second = translator.translate(&shop(), &["Shop.Order"]).unwrap();
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn test_repeated_markers_are_idempotent() {
    let entity = |qty: MemberDecl| {
        Model::new().with_type(
            TypeDecl::class("Shop.Item")
                .with_member(int("Id"))
                .with_member(qty),
        )
    };
    let once = entity(
        int("Qty")
            .with(Annotation::name("Quantity"))
            .with(Annotation::default_value(1))
            .with(Annotation::check(ConstraintDecl::greater_than(0))),
    );
    let twice = entity(
        int("Qty")
            .with(Annotation::name("Quantity"))
            .with(Annotation::name("Quantity"))
            .with(Annotation::default_value(1))
            .with(Annotation::default_value(1))
            .with(Annotation::check(ConstraintDecl::greater_than(0)))
            .with(Annotation::check(ConstraintDecl::greater_than(0))),
    );
    let once = translate(&once, "Shop.Item").unwrap();
    let twice = translate(&twice, "Shop.Item").unwrap();
    assert_eq!(once.to_json().unwrap(), twice.to_json().unwrap());

    let column = once.table("Shop.Item").unwrap().column("Quantity").unwrap().clone();
    assert_eq!(column.default, Some(Value::Int(1)));
}

#[test]
fn test_unsatisfiable_range_fails() {
    let model = Model::new().with_type(
        TypeDecl::class("Shop.Item").with_member(int("Id")).with_member(
            int("Qty")
                .with(Annotation::check(ConstraintDecl::greater_or_equal(1)))
                .with(Annotation::check(ConstraintDecl::less_than(1))),
        ),
    );
    let err = translate(&model, "Shop.Item").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Unsatisfiable(_)), "{}", err);
    assert_eq!(err.category(), ErrorCategory::Constraint);
    assert_eq!(err.entity, "Shop.Item");

    let satisfiable = Model::new().with_type(
        TypeDecl::class("Shop.Item").with_member(int("Id")).with_member(
            int("Qty")
                .with(Annotation::check(ConstraintDecl::greater_or_equal(1)))
                .with(Annotation::check(ConstraintDecl::less_than(2))),
        ),
    );
    assert!(translate(&satisfiable, "Shop.Item").is_ok());
}

#[test]
fn test_default_contradicting_constraint_fails() {
    let model = Model::new().with_type(
        TypeDecl::class("Shop.Item").with_member(int("Id")).with_member(
            int("Qty")
                .with(Annotation::default_value(0))
                .with(Annotation::check(ConstraintDecl::greater_than(0))),
        ),
    );
    let err = translate(&model, "Shop.Item").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DefaultContradictsConstraint { .. }));
}

#[test]
fn test_duplicate_column_rename_fails() {
    let model = Model::new().with_type(
        TypeDecl::class("Shop.Item")
            .with_member(int("Id"))
            .with_member(text("A").with(Annotation::name("X")))
            .with_member(text("B").with(Annotation::name("X"))),
    );
    let err = translate(&model, "Shop.Item").unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateColumnName("X".into()));
    assert_eq!(err.category(), ErrorCategory::Naming);
}

#[test]
fn test_conflicting_renames_fail() {
    let model = Model::new().with_type(
        TypeDecl::class("Shop.Item").with_member(int("Id")).with_member(
            text("A")
                .with(Annotation::name("X"))
                .with(Annotation::name("Y")),
        ),
    );
    let err = translate(&model, "Shop.Item").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NameCardinality { .. }));
    assert_eq!(err.field.as_deref(), Some("A"));
}

#[test]
fn test_self_rename_is_a_no_op() {
    let plain = Model::new().with_type(
        TypeDecl::class("Shop.Item")
            .with_member(int("Id"))
            .with_member(text("Label")),
    );
    let renamed = Model::new().with_type(
        TypeDecl::class("Shop.Item")
            .with_member(int("Id"))
            .with_member(text("Label").with(Annotation::name("Label"))),
    );
    let plain = translate(&plain, "Shop.Item").unwrap();
    let renamed = translate(&renamed, "Shop.Item").unwrap();
    assert_eq!(plain.to_json().unwrap(), renamed.to_json().unwrap());
}

#[test]
fn test_key_deduced_from_id_naming() {
    let model = Model::new().with_type(
        TypeDecl::class("Shop.Note")
            .with_member(int("Id"))
            .with_member(optional_text("Title"))
            .with_member(optional_text("Body")),
    );
    let schema = translate(&model, "Shop.Note").unwrap();
    let key = schema.entity("Shop.Note").unwrap().primary_key().clone();
    assert_eq!(key.columns, vec!["Id"]);
    assert_eq!(key.source, KeySource::Naming);
}

#[test]
fn test_key_from_sole_non_nullable_field() {
    let model = Model::new().with_type(
        TypeDecl::class("Shop.Note")
            .with_member(text("Slug"))
            .with_member(optional_text("Body")),
    );
    let schema = translate(&model, "Shop.Note").unwrap();
    let key = schema.entity("Shop.Note").unwrap().primary_key().clone();
    assert_eq!(key.columns, vec!["Slug"]);
    assert_eq!(key.source, KeySource::SoleNonNullable);
}

#[test]
fn test_undeducible_key_fails() {
    let model = Model::new().with_type(
        TypeDecl::class("Shop.Note")
            .with_member(optional_text("Title"))
            .with_member(optional_text("Body")),
    );
    let err = translate(&model, "Shop.Note").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndeducibleKey);
    assert_eq!(err.category(), ErrorCategory::Key);
}

fn unit(name: &str, code: &str, factor: i64) -> InstanceDecl {
    InstanceDecl::new(
        name,
        Object::new("Geo.Unit").with("Code", code).with("Factor", factor),
    )
}

fn closed_unit(instances: Vec<InstanceDecl>) -> Model {
    let decl = instances.into_iter().fold(
        TypeDecl::class("Geo.Unit")
            .pre_defined()
            .with_constructor(ConstructorDecl::private("ctor"))
            .with_member(text("Code").read_only().with(Annotation::primary_key()))
            .with_member(int("Factor").read_only()),
        TypeDecl::with_instance,
    );
    Model::new().with_type(decl)
}

#[test]
fn test_pre_defined_needs_two_instances() {
    let err = translate(&closed_unit(vec![unit("Meter", "m", 1)]), "Geo.Unit").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TooFewInstances(1));
    assert_eq!(err.category(), ErrorCategory::PreDefined);
}

#[test]
fn test_pre_defined_instances_are_reachable() {
    let model = closed_unit(vec![unit("Meter", "m", 1), unit("Foot", "ft", 3)]);
    let schema = translate(&model, "Geo.Unit").unwrap();
    let entity = schema.entity("Geo.Unit").unwrap();
    assert_eq!(entity.creator, Creator::Lookup);
    assert_eq!(entity.instances.len(), 2);

    let foot = schema.instance("Geo.Unit", "Foot").unwrap();
    assert_eq!(foot.key, vec![Value::string("ft")]);
    assert_eq!(foot.row, vec![Value::string("ft"), Value::Int(3)]);
    assert_eq!(foot.value.get("Factor"), Some(&Value::Int(3)));
    assert_eq!(
        entity.instance_by_key(&[Value::string("m")]).map(|i| i.name.as_str()),
        Some("Meter")
    );
}

#[test]
fn test_pre_defined_duplicate_key_fails() {
    let model = closed_unit(vec![unit("Meter", "m", 1), unit("Metre", "m", 1)]);
    let err = translate(&model, "Geo.Unit").unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::DuplicateInstanceKey {
            first: "Meter".into(),
            second: "Metre".into()
        }
    );
}

fn with_constructors(constructors: Vec<ConstructorDecl>) -> Model {
    let decl = constructors.into_iter().fold(
        TypeDecl::class("Shop.Customer")
            .with_member(int("Id"))
            .with_member(text("Name")),
        TypeDecl::with_constructor,
    );
    Model::new().with_type(decl)
}

#[test]
fn test_equal_arity_constructors_are_ambiguous() {
    let model = with_constructors(vec![
        ConstructorDecl::public("by_id").with_param("id", TypeRef::scalar(ScalarType::Int32)),
        ConstructorDecl::public("by_name").with_param("name", TypeRef::scalar(ScalarType::String)),
    ]);
    let err = translate(&model, "Shop.Customer").unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::AmbiguousConstructors(vec!["by_id".into(), "by_name".into()])
    );
    assert_eq!(err.category(), ErrorCategory::Reconstitution);
}

#[test]
fn test_greatest_arity_constructor_wins() {
    let model = with_constructors(vec![
        ConstructorDecl::public("short").with_param("id", TypeRef::scalar(ScalarType::Int32)),
        ConstructorDecl::public("full")
            .with_param("id", TypeRef::scalar(ScalarType::Int32))
            .with_param("name", TypeRef::scalar(ScalarType::String)),
    ]);
    let schema = translate(&model, "Shop.Customer").unwrap();
    assert_eq!(
        schema.entity("Shop.Customer").unwrap().creator,
        Creator::Constructor {
            id: "full".into(),
            arguments: vec!["Id".into(), "Name".into()],
            setters: vec![],
        }
    );
}

#[test]
fn test_pinned_constructor_must_be_viable() {
    let model = with_constructors(vec![
        ConstructorDecl::public("full")
            .with_param("id", TypeRef::scalar(ScalarType::Int32))
            .with_param("name", TypeRef::scalar(ScalarType::String)),
        ConstructorDecl::public("odd")
            .with_param("age", TypeRef::scalar(ScalarType::Int32))
            .reconstitute_through(),
    ]);
    let err = translate(&model, "Shop.Customer").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NonViableConstructor("odd".into()));
}

#[test]
fn test_reference_cycles_fail() {
    let model = Model::new()
        .with_type(
            TypeDecl::class("Org.Team")
                .with_member(int("Id"))
                .with_member(MemberDecl::property("Lead", TypeRef::named("Org.Person").nullable())),
        )
        .with_type(
            TypeDecl::class("Org.Person")
                .with_member(int("Id"))
                .with_member(MemberDecl::property("Team", TypeRef::named("Org.Team"))),
        );
    let err = translate(&model, "Org.Team").unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::ReferenceCycle(vec!["Org.Person".into(), "Org.Team".into(), "Org.Person".into()])
    );
    assert_eq!(err.category(), ErrorCategory::Structural);

    let selfish = Model::new().with_type(
        TypeDecl::class("Org.Person")
            .with_member(int("Id"))
            .with_member(MemberDecl::property("Mentor", TypeRef::named("Org.Person").nullable())),
    );
    let err = translate(&selfish, "Org.Person").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ReferenceCycle(_)));
}

#[test]
fn test_self_reference_through_relation_is_allowed() {
    let model = Model::new().with_type(
        TypeDecl::class("Org.Person")
            .with_member(int("Id"))
            .with_member(MemberDecl::property(
                "Friends",
                TypeRef::set(TypeRef::named("Org.Person")),
            )),
    );
    let schema = translate(&model, "Org.Person").unwrap();
    let friends = schema.table("Org.Person.FriendsTable").unwrap();
    assert_eq!(friends.column_names(), vec!["Person.Id", "Item.Id"]);
    assert_eq!(friends.foreign_keys.len(), 2);
    assert!(friends
        .foreign_keys
        .iter()
        .all(|fk| fk.target_table == "Org.Person"));
}

#[test]
fn test_unqualified_table_names_collide() {
    let model = Model::new()
        .with_type(
            TypeDecl::class("Billing.Account")
                .with_member(int("Id"))
                .with_member(text("Iban")),
        )
        .with_type(
            TypeDecl::class("Crm.Account")
                .with_member(int("Id"))
                .with_member(text("Owner")),
        );
    assert!(Translator::default().translate_all(&model).is_ok());

    let config = TranslatorConfig::default().with_table_naming(TableNaming::Unqualified);
    let err = Translator::new(config).unwrap().translate_all(&model).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateTableName { .. }));
}
