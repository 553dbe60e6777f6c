mod common;

use std::sync::Arc;

use common::{AuditEntry, Invoice, Order, OrderLine, Person, init_tracing, person, people};
use mockset::prelude::*;
use serde::{Deserialize, Serialize};

#[test]
fn seeded_find_then_remove() {
    init_tracing();
    let set = RecordSet::<Person>::new();
    set.add(person(1, "A", 30));
    set.add(person(2, "B", 40));

    let first = set.find(1).unwrap().unwrap();
    assert_eq!(*first, person(1, "A", 30));

    set.remove(&first);

    let remaining = set.iter().map(|p| (*p).clone()).collect::<Vec<_>>();
    assert_eq!(remaining, vec![person(2, "B", 40)]);
}

#[test]
fn find_returns_the_same_instance_for_every_added_record() {
    let set = RecordSet::<Person>::new();
    let added = (1..=5)
        .map(|id| set.add(person(id, "P", 20 + id)).into_record())
        .collect::<Vec<_>>();

    for record in &added {
        let found = set.find(record.id).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, record));
    }
}

#[test]
fn removed_records_disappear_from_iteration() {
    let set = people();
    let victims = set.iter().filter(|p| p.age == 36).collect::<Vec<_>>();

    set.remove_range(&victims);

    assert!(set.iter().all(|p| victims.iter().all(|v| !Arc::ptr_eq(v, &p))));
    assert_eq!(set.len(), 2);
}

#[test]
fn key_conventions_cover_renamed_members() {
    assert_eq!(Person::key_members(), Some(&["id"][..]));
    assert_eq!(Order::key_members(), Some(&["OrderId"][..]));
    assert_eq!(OrderLine::record_name(), "Line");
    assert_eq!(Invoice::key_members(), Some(&["invoiceId"][..]));

    let orders = RecordSet::builder()
        .with_records([Order { order_id: 10, person_id: 1, total: 9.5 }])
        .build();
    let invoices = RecordSet::builder()
        .with_records([Invoice { invoice_id: 3, amount: 1.0 }])
        .build();

    assert_eq!(orders.find(10_i64).unwrap().unwrap().person_id, 1);
    assert_eq!(invoices.find(3).unwrap().unwrap().amount, 1.0);
}

#[test]
fn composite_keys_match_in_declaration_order() {
    let lines = RecordSet::builder()
        .with_records([
            OrderLine { order_id: 1, line_no: 1, sku: "a".to_string() },
            OrderLine { order_id: 1, line_no: 2, sku: "b".to_string() },
        ])
        .build();

    assert_eq!(lines.find(vec![1, 2]).unwrap().unwrap().sku, "b");
    assert_eq!(lines.find(vec![2, 1]).unwrap(), None);
}

#[test]
fn composite_key_arity_mismatch_is_an_invalid_operation() {
    let lines = RecordSet::builder()
        .with_records([OrderLine { order_id: 1, line_no: 1, sku: "a".to_string() }])
        .build();

    assert!(matches!(lines.find(1), Err(MocksetError::InvalidOperation(_))));
    assert!(matches!(
        lines.find(vec![1, 1, 1]),
        Err(MocksetError::InvalidOperation(_))
    ));
}

#[test]
fn missing_key_is_a_configuration_error_raised_at_find() {
    let audit = RecordSet::<AuditEntry>::new();
    audit.add(AuditEntry { message: "created".to_string() });

    assert!(matches!(audit.find(1), Err(MocksetError::Configuration(_))));

    audit.set_key_fn(|entry: &AuditEntry| entry.message.clone());
    assert!(audit.find("created").unwrap().is_some());
}

#[test]
fn missing_key_fails_find_even_on_an_empty_set() {
    #[derive(Debug, Serialize, Deserialize, Record)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        body_text: String,
    }

    let audit = RecordSet::<AuditEntry>::new();
    let notes = RecordSet::<Note>::new();

    assert_eq!(Note::key_members(), Some(&[][..]));
    assert!(matches!(audit.find(1), Err(MocksetError::Configuration(_))));
    assert!(matches!(notes.find(1), Err(MocksetError::Configuration(_))));
}

#[test]
fn renamed_fields_resolve_keys_at_compile_time() {
    #[derive(Debug, Serialize, Deserialize, Record)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    struct Ticket {
        ticket_id: i32,
        #[serde(rename = "title")]
        summary: String,
    }

    let tickets = RecordSet::<Ticket>::new();

    assert_eq!(Ticket::key_members(), Some(&["TICKET_ID"][..]));
    assert_eq!(tickets.find(1).unwrap().map(|t| t.summary.clone()), None);

    tickets.add(Ticket { ticket_id: 1, summary: "open".to_string() });
    assert_eq!(tickets.find(1).unwrap().unwrap().summary, "open");
}

#[test]
fn explicit_key_function_replaces_the_convention() {
    let set = people();
    set.set_key_fn(|p: &Person| p.name.clone());

    assert_eq!(set.find("Grace").unwrap().unwrap().id, 2);
    assert_eq!(set.find(2).unwrap(), None);
}

#[tokio::test]
async fn find_async_is_already_complete() {
    let set = people();

    let found = set.find_async(3).await.unwrap().unwrap();

    assert_eq!(found.name, "Alan");
}

#[test]
fn attach_and_add_range_append_in_order() {
    let set = RecordSet::<Person>::new();
    set.add_range([person(1, "A", 1), person(2, "B", 2)]);
    let entry = set.attach(person(3, "C", 3));

    assert_eq!(entry.state(), EntryState::Detached);
    assert_eq!(
        set.to_vec().iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[test]
fn bound_collections_are_shared_both_ways() {
    let set = RecordSet::<Person>::new();
    let backing = ObservableCollection::<Person>::new();

    set.bind(backing.clone());
    set.add(person(1, "A", 1));
    backing.push(Arc::new(person(2, "B", 2)));

    assert_eq!(backing.len(), 2);
    assert_eq!(set.count().unwrap(), 2);
    assert!(set.data().as_observable().unwrap().ptr_eq(&backing));
}

#[test]
fn rebinding_keeps_data_from_another_set() {
    let original = people();
    let replacement = RecordSet::<Person>::builder().plain().build();

    replacement.bind_shared(original.data());
    original.add(person(5, "Edsger", 72));

    assert_eq!(replacement.len(), 5);
    assert_eq!(replacement.find(5).unwrap().unwrap().name, "Edsger");
    assert!(!replacement.ptr_eq(&original));
}
