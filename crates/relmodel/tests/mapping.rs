//! Integration tests for extraction and reconstitution.

use pretty_assertions::assert_eq;
use relmodel::metadata::EnumDecl;
use relmodel::{
    Annotation, Collection, ConstructorDecl, Construction, Extractor, MappingError, MemberDecl,
    MemoryResolver, Model, Object, Reconstitutor, RelationRows, ScalarType, Schema, Translator,
    TypeDecl, TypeRef, Value,
};

fn int(name: &str) -> MemberDecl {
    MemberDecl::property(name, TypeRef::scalar(ScalarType::Int32))
}

fn text(name: &str) -> MemberDecl {
    MemberDecl::property(name, TypeRef::scalar(ScalarType::String))
}

fn model() -> Model {
    Model::new()
        .with_type(
            TypeDecl::structure("Shop.Line")
                .with_member(text("Sku"))
                .with_member(int("Qty")),
        )
        .with_type(
            TypeDecl::structure("Shop.Address")
                .with_member(text("City"))
                .with_member(MemberDecl::property(
                    "Zip",
                    TypeRef::scalar(ScalarType::String).nullable(),
                )),
        )
        .with_type(TypeDecl::enumeration(
            "Shop.Status",
            EnumDecl::new(["Open", "Paid", "Shipped"]),
        ))
        .with_type(
            TypeDecl::class("Shop.Customer")
                .with_member(int("Id"))
                .with_member(text("Name")),
        )
        .with_type(
            TypeDecl::class("Shop.Order")
                .with_constructor(
                    ConstructorDecl::public("new")
                        .with_param("id", TypeRef::scalar(ScalarType::Int32))
                        .with_param("customer", TypeRef::named("Shop.Customer")),
                )
                .with_member(int("Id").read_only())
                .with_member(MemberDecl::property("Customer", TypeRef::named("Shop.Customer")).read_only())
                .with_member(MemberDecl::property(
                    "Note",
                    TypeRef::scalar(ScalarType::String).nullable(),
                ))
                .with_member(
                    MemberDecl::property("Status", TypeRef::named("Shop.Status")).with(Annotation::Numeric),
                )
                .with_member(MemberDecl::property(
                    "ShipTo",
                    TypeRef::named("Shop.Address").nullable(),
                ))
                .with_member(MemberDecl::property(
                    "Lines",
                    TypeRef::ordered_list(TypeRef::named("Shop.Line")),
                ))
                .with_member(MemberDecl::property(
                    "Notes",
                    TypeRef::list(TypeRef::scalar(ScalarType::String)),
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
                ))
                .with_member(MemberDecl::property(
                    "Watchers",
                    TypeRef::set(TypeRef::named("Shop.Customer")),
                )),
        )
}

fn schema() -> Schema {
    Translator::default().translate(&model(), &["Shop.Order"]).unwrap()
}

fn customer(id: i64, name: &str) -> Object {
    Object::new("Shop.Customer").with("Id", id).with("Name", name)
}

fn line(sku: &str, qty: i64) -> Object {
    Object::new("Shop.Line").with("Sku", sku).with("Qty", qty)
}

fn order(ship_to: Value, note: Value) -> Object {
    Object::new("Shop.Order")
        .with("Id", 42)
        .with("Customer", customer(1, "Ada"))
        .with("Note", note)
        .with("Status", Value::enumeration("Paid"))
        .with("ShipTo", ship_to)
        .with("Lines", Collection::ordered_list([line("A-1", 2), line("B-7", 1)]))
        .with("Notes", Collection::list(["fragile", "fragile"]))
        .with("Tags", Collection::set(["gift", "express"]))
        .with("Prices", Collection::map([("A-1", 9.5), ("B-7", 20.0)]))
        .with("Watchers", Collection::set([customer(2, "Bo")]))
}

fn resolver(schema: &Schema) -> MemoryResolver {
    let extractor = Extractor::new(schema);
    let mut resolver = MemoryResolver::new();
    for customer in [customer(1, "Ada"), customer(2, "Bo")] {
        let key = extractor.key_values(&customer).unwrap();
        resolver.insert("Shop.Customer", key, customer);
    }
    resolver
}

fn round_trip(schema: &Schema, object: &Object) -> Object {
    let extraction = Extractor::new(schema).extract(object).unwrap();
    let rows = RelationRows::from(&extraction);
    Reconstitutor::new(schema)
        .reconstitute(&extraction.entity, &extraction.row, &rows, &resolver(schema))
        .unwrap()
}

#[test]
fn test_round_trip_every_field_kind() {
    let schema = schema();
    let address = Object::new("Shop.Address").with("City", "Oslo").with("Zip", "0150");

    let full = order(address.into(), Value::string("leave at door"));
    assert_eq!(round_trip(&schema, &full), full);

    let sparse = order(Value::Null, Value::Null);
    assert_eq!(round_trip(&schema, &sparse), sparse);

    let partial = Object::new("Shop.Address").with("City", "Oslo").with("Zip", Value::Null);
    let partial = order(partial.into(), Value::Null);
    assert_eq!(round_trip(&schema, &partial), partial);
}

#[test]
fn test_round_trip_empty_collections() {
    let schema = schema();
    let empty = order(Value::Null, Value::Null)
        .with("Lines", Collection::ordered_list(Vec::<Value>::new()))
        .with("Notes", Collection::list(Vec::<Value>::new()))
        .with("Tags", Collection::set(Vec::<Value>::new()))
        .with("Prices", Collection::map(Vec::<(Value, Value)>::new()))
        .with("Watchers", Collection::set(Vec::<Value>::new()));
    assert_eq!(round_trip(&schema, &empty), empty);
}

#[test]
fn test_numeric_enumeration_is_stored_as_integer() {
    let schema = schema();
    let extraction = Extractor::new(&schema)
        .extract(&order(Value::Null, Value::Null))
        .unwrap();
    let table = schema.table("Shop.Order").unwrap();
    let status = table.column_index("Status").unwrap();
    assert_eq!(extraction.row[status], Value::Int(1));
}

#[test]
fn test_constructor_arguments_follow_parameters() {
    let schema = schema();
    let object = order(Value::Null, Value::Null);
    let extraction = Extractor::new(&schema).extract(&object).unwrap();
    let rows = RelationRows::from(&extraction);

    let construction = Reconstitutor::new(&schema)
        .construct("Shop.Order", &extraction.row, &rows, &resolver(&schema))
        .unwrap();
    let Construction::Call {
        constructor,
        arguments,
        setters,
        ..
    } = construction
    else {
        panic!("expected a constructor call");
    };
    assert_eq!(constructor, "new");
    assert_eq!(
        arguments,
        vec![
            ("Id".to_string(), Value::Int(42)),
            ("Customer".to_string(), Value::from(customer(1, "Ada"))),
        ]
    );
    assert_eq!(setters.len(), 8);
}

#[test]
fn test_unmodified_relations_emit_no_rows() {
    let schema = schema();
    let mut object = order(Value::Null, Value::Null);
    for member in ["Lines", "Notes", "Tags", "Prices", "Watchers"] {
        if let Some(Value::Collection(collection)) = object.members.get_mut(member) {
            collection.commit();
        }
    }
    let extraction = Extractor::new(&schema).extract(&object).unwrap();
    assert!(extraction.relations.is_empty());
}

#[test]
fn test_missing_reference_target() {
    let schema = schema();
    let extraction = Extractor::new(&schema)
        .extract(&order(Value::Null, Value::Null))
        .unwrap();
    let rows = RelationRows::from(&extraction);
    let err = Reconstitutor::new(&schema)
        .reconstitute("Shop.Order", &extraction.row, &rows, &MemoryResolver::new())
        .unwrap_err();
    assert_eq!(
        err,
        MappingError::UnresolvedReference {
            entity: "Shop.Customer".into(),
            key: "1".into()
        }
    );
}

#[test]
fn test_self_referencing_relation_round_trip() {
    let model = Model::new().with_type(
        TypeDecl::class("Org.Person")
            .with_member(int("Id"))
            .with_member(MemberDecl::property(
                "Friends",
                TypeRef::list(TypeRef::named("Org.Person")),
            )),
    );
    let schema = Translator::default().translate(&model, &["Org.Person"]).unwrap();
    let friend = |id: i64| {
        let mut friends = Collection::list(Vec::<Value>::new());
        friends.commit();
        Object::new("Org.Person").with("Id", id).with("Friends", friends)
    };
    let person = Object::new("Org.Person")
        .with("Id", 1)
        .with("Friends", Collection::list([friend(2), friend(3)]));

    let extraction = Extractor::new(&schema).extract(&person).unwrap();
    assert_eq!(extraction.relations[0].insertions.len(), 2);

    let mut resolver = MemoryResolver::new();
    resolver.insert("Org.Person", vec![Value::Int(2)], friend(2));
    resolver.insert("Org.Person", vec![Value::Int(3)], friend(3));
    let rebuilt = Reconstitutor::new(&schema)
        .reconstitute(
            "Org.Person",
            &extraction.row,
            &RelationRows::from(&extraction),
            &resolver,
        )
        .unwrap();
    assert_eq!(rebuilt, person);
}

fn basket_schema() -> Schema {
    let model = Model::new().with_type(
        TypeDecl::class("Shop.Basket")
            .with_member(int("Id"))
            .with_member(MemberDecl::property(
                "Items",
                TypeRef::list(TypeRef::scalar(ScalarType::String)),
            )),
    );
    Translator::default().translate(&model, &["Shop.Basket"]).unwrap()
}

/// Rows of one relation table, keyed by their first two cells (owner, index).
#[derive(Default)]
struct ItemStore {
    rows: Vec<Vec<Value>>,
}

impl ItemStore {
    fn apply(&mut self, schema: &Schema, object: &Object) -> Vec<Value> {
        let extraction = Extractor::new(schema).extract(object).unwrap();
        for changes in &extraction.relations {
            for row in &changes.deletions {
                let before = self.rows.len();
                self.rows.retain(|r| r[..2] != row[..2]);
                assert_eq!(self.rows.len(), before - 1, "deleted row {:?} not stored", row);
            }
            for row in &changes.modifications {
                let stored = self.rows.iter_mut().find(|r| r[..2] == row[..2]);
                *stored.unwrap_or_else(|| panic!("modified row {:?} not stored", row)) = row.clone();
            }
            for row in &changes.insertions {
                assert!(
                    !self.rows.iter().any(|r| r[..2] == row[..2]),
                    "key of {:?} already stored in {:?}",
                    row,
                    self.rows
                );
                self.rows.push(row.clone());
            }
        }
        extraction.row
    }

    fn load(&self, schema: &Schema, principal: &[Value]) -> Object {
        let table = &schema.entity("Shop.Basket").unwrap().relation_tables[0].name;
        let mut rows = RelationRows::new();
        for row in &self.rows {
            rows.add(table.clone(), row.clone());
        }
        Reconstitutor::new(schema)
            .reconstitute("Shop.Basket", principal, &rows, &MemoryResolver::new())
            .unwrap()
    }
}

fn items_of(object: &mut Object) -> &mut Collection {
    match object.members.get_mut("Items") {
        Some(Value::Collection(items)) => items,
        other => panic!("expected a collection, got {:?}", other),
    }
}

#[test]
fn test_list_delete_then_insert_across_saves() {
    let schema = basket_schema();
    let mut store = ItemStore::default();
    let basket = Object::new("Shop.Basket")
        .with("Id", 1)
        .with("Items", Collection::list(["a", "b"]));
    let principal = store.apply(&schema, &basket);

    let mut basket = store.load(&schema, &principal);
    items_of(&mut basket).remove_at(0);
    items_of(&mut basket).push("c");
    store.apply(&schema, &basket);

    let mut basket = store.load(&schema, &principal);
    assert_eq!(*items_of(&mut basket), Collection::list(["b", "c"]));
    items_of(&mut basket).push("d");
    store.apply(&schema, &basket);

    let mut basket = store.load(&schema, &principal);
    assert_eq!(*items_of(&mut basket), Collection::list(["b", "c", "d"]));
    assert_eq!(store.rows.len(), 3);
}

#[test]
fn test_list_modify_after_delete_across_saves() {
    let schema = basket_schema();
    let mut store = ItemStore::default();
    let basket = Object::new("Shop.Basket")
        .with("Id", 1)
        .with("Items", Collection::list(["a", "b", "c"]));
    let principal = store.apply(&schema, &basket);

    let mut basket = store.load(&schema, &principal);
    items_of(&mut basket).remove_at(1);
    store.apply(&schema, &basket);

    let mut basket = store.load(&schema, &principal);
    items_of(&mut basket).modify(1, "C");
    items_of(&mut basket).push("d");
    store.apply(&schema, &basket);

    let mut basket = store.load(&schema, &principal);
    assert_eq!(*items_of(&mut basket), Collection::list(["a", "C", "d"]));
    assert_eq!(
        store.rows,
        vec![
            vec![Value::Int(1), Value::UInt(0), Value::string("a")],
            vec![Value::Int(1), Value::UInt(2), Value::string("C")],
            vec![Value::Int(1), Value::UInt(3), Value::string("d")],
        ]
    );
}
