mod common;

use common::{Order, Person, init_tracing, person};
use mockset::{MemberSlot, prelude::*};

#[derive(Default, RecordContext)]
#[record_context(name = "Shop", set_accessor, readonly(orders = RecordSet<Order>))]
struct ShopContext {
    people: RecordSet<Person>,
    label: String,
    #[mock_handle]
    mock: Option<MockHandle>,
}

#[derive(Default, RecordContext)]
struct PlainContext {
    people: mockset::RecordSet<Person>,
}

#[test]
fn derive_lists_members_in_declaration_order() {
    let mut shop = ShopContext::default();
    let members = shop.record_members();

    let names = members.iter().map(|m| m.name).collect::<Vec<_>>();
    assert_eq!(names, vec!["people", "orders"]);
    assert_eq!(members[0].element.name, "Person");
    assert!(matches!(members[1].slot, MemberSlot::ReadOnly));
    assert_eq!(ShopContext::context_name(), "Shop");
    assert!(shop.exposes_set_accessor());
    assert!(!PlainContext::default().exposes_set_accessor());
}

#[test]
fn create_installs_every_member() {
    init_tracing();
    let engine = Arrangements::new();

    let shop = Preparer::new(&engine).create::<ShopContext>().unwrap();
    shop.people.add(person(1, "Ada", 36));
    shop.orders(&engine)
        .unwrap()
        .add(Order { order_id: 10, person_id: 1, total: 12.5 });

    let owner = shop.mock.as_ref().unwrap();
    assert_eq!(owner.type_name(), "Shop");
    assert_eq!(owner.behavior(), Behavior::Loose);
    assert_eq!(shop.people.mock_handle().unwrap().behavior(), Behavior::CallOriginal);
    assert_eq!(shop.orders(&engine).unwrap().find(10_i64).unwrap().unwrap().total, 12.5);
    assert!(shop.label.is_empty());
}

#[test]
fn generic_accessor_shares_the_member_store() {
    let engine = Arrangements::new();
    let shop = Preparer::new(&engine).create::<ShopContext>().unwrap();

    shop.people.add(person(1, "Ada", 36));
    let via_accessor = shop.record_set::<Person>(&engine).unwrap();
    via_accessor.add(person(2, "Grace", 85));

    assert!(via_accessor.ptr_eq(&shop.people));
    assert_eq!(shop.people.len(), 2);
    assert!(shop.record_set::<Order>(&engine).unwrap().ptr_eq(&shop.orders(&engine).unwrap()));
    assert_eq!(
        engine.resolve_set::<Person>(shop.mock.as_ref().unwrap()).unwrap().len(),
        2
    );
}

#[test]
fn preparing_twice_creates_distinct_stores() {
    let engine = Arrangements::new();
    let preparer = Preparer::new(&engine);
    let mut shop = preparer.create::<ShopContext>().unwrap();
    let first_people = shop.people.clone();
    let first_orders = shop.orders(&engine).unwrap();

    preparer.prepare(&mut shop).unwrap();
    first_people.add(person(1, "Ada", 36));
    first_orders.add(Order { order_id: 1, person_id: 1, total: 1.0 });

    assert!(!first_people.ptr_eq(&shop.people));
    assert!(shop.people.is_empty());
    assert!(shop.orders(&engine).unwrap().is_empty());
}

#[test]
fn reuse_existing_makes_preparation_idempotent() {
    let engine = Arrangements::new();
    let preparer = Preparer::new(&engine).with_options(PrepareOptions::new().reuse_existing(true));
    let mut shop = preparer.create::<ShopContext>().unwrap();
    shop.people.add(person(1, "Ada", 36));

    let bindings = preparer.prepare(&mut shop).unwrap();

    assert_eq!(shop.people.len(), 1);
    assert!(bindings.iter().all(|binding| binding.reused));
    assert_eq!(bindings[0].installation, Installation::Assigned);
    assert_eq!(bindings[1].installation, Installation::Arranged);
    assert_eq!(
        bindings[0].downcast::<RecordSet<Person>>().unwrap().len(),
        1
    );
}

#[test]
fn contexts_without_a_mock_handle_take_writable_members_only() {
    let engine = Arrangements::new();
    let mut plain = PlainContext::default();

    let bindings = Preparer::new(&engine).prepare(&mut plain).unwrap();

    assert_eq!(bindings.len(), 1);
    assert!(plain.people.mock_handle().is_some());
    assert!(plain.mock_handle().is_none());

    let mut shop = ShopContext::default();
    assert!(matches!(
        Preparer::new(&engine).prepare(&mut shop),
        Err(MocksetError::Configuration(_))
    ));
}

#[test]
fn engines_refuse_arrangements_on_foreign_instances() {
    let engine = Arrangements::new();
    let other = Arrangements::new();
    let shop = Preparer::new(&other).create::<ShopContext>().unwrap();
    let mut stolen = ShopContext::default();
    stolen.attach_mock(shop.mock.clone().unwrap());
    let before = stolen.people.clone();

    assert!(matches!(
        Preparer::new(&engine).prepare(&mut stolen),
        Err(MocksetError::Configuration(_))
    ));
    assert!(before.ptr_eq(&stolen.people));
    assert_eq!(engine.arrangement_count(), 0);
}
