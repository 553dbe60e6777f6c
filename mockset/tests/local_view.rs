mod common;

use std::sync::{Arc, Mutex};

use common::{Person, init_tracing, person, people};
use mockset::prelude::*;

#[test]
fn view_writes_are_visible_through_the_set_and_back() {
    init_tracing();
    let set = people();
    let view = set.local();

    let added = view.add(person(5, "Edsger", 72));
    set.add(person(6, "Donald", 86));

    assert!(Arc::ptr_eq(&set.find(5).unwrap().unwrap(), &added));
    assert_eq!(view.len(), 6);
    assert!(view.iter().any(|p| p.name == "Donald"));

    assert!(view.remove(&added));
    assert_eq!(set.filter(Filter::eq("id", 5)).count().unwrap(), 0);

    view.clear();
    assert!(set.is_empty());
}

#[test]
fn observable_sets_notify_view_subscribers() {
    let set = RecordSet::<Person>::new();
    let view = set.local();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let id = view
        .subscribe(move |change: &CollectionChange<Person>| {
            let event = match change {
                CollectionChange::Added { item, index } => format!("+{}@{index}", item.id),
                CollectionChange::Removed { item, index } => format!("-{}@{index}", item.id),
                CollectionChange::Reset => "reset".to_string(),
            };
            sink.lock().unwrap().push(event);
        })
        .unwrap();

    let ada = set.add(person(1, "Ada", 36)).into_record();
    set.add(person(2, "Grace", 85));
    set.remove(&ada);
    view.clear();
    view.unsubscribe(id);
    set.add(person(3, "Alan", 41));

    assert_eq!(*events.lock().unwrap(), vec!["+1@0", "+2@1", "-1@0", "reset"]);
    assert!(view.to_observable().is_some());
}

#[test]
fn plain_sets_reject_view_subscriptions() {
    let set = RecordSet::<Person>::builder().plain().build();
    let view = set.local();

    assert!(matches!(
        view.subscribe(|_: &CollectionChange<Person>| {}),
        Err(MocksetError::InvalidOperation(_))
    ));
    assert!(view.to_observable().is_none());
    assert!(!view.is_read_only());
}

#[test]
fn copy_to_fills_from_the_offset() {
    let set = people();
    let view = set.local();
    let mut target = vec![None; 5];

    view.copy_to(&mut target, 1).unwrap();

    assert!(target[0].is_none());
    assert_eq!(
        target[1..].iter().map(|p| p.as_ref().unwrap().id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert!(matches!(
        view.copy_to(&mut target, 2),
        Err(MocksetError::InvalidOperation(_))
    ));
}
