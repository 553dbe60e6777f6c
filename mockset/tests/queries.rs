mod common;

use std::sync::Arc;

use common::{Person, init_tracing, person, people};
use mockset::{
    bson::Bson,
    prelude::*,
    query::{Predicate, QueryOp},
};
use serde::{Deserialize, Serialize};

fn ids(records: Vec<Arc<Person>>) -> Vec<i32> {
    records.iter().map(|p| p.id).collect()
}

#[test]
fn queries_are_lazy_and_see_later_additions() {
    init_tracing();
    let set = people();
    let adults_named_a = set.filter(Filter::starts_with("name", "A").and(Filter::gte("age", 18)));

    assert_eq!(adults_named_a.count().unwrap(), 2);

    set.add(person(5, "Ann", 19));

    assert_eq!(adults_named_a.count().unwrap(), 3);
}

#[test]
fn composition_never_mutates_the_parent() {
    let set = people();
    let ordered = set.order_by("name");
    let first_two = ordered.take(2);

    assert_eq!(ids(first_two.to_list().unwrap()), vec![1, 3]);
    assert_eq!(ordered.count().unwrap(), 4);
    assert_eq!(set.count().unwrap(), 4);
}

#[test]
fn ordering_is_stable_and_then_by_breaks_ties() {
    let set = people();

    let by_age = set.order_by("age").to_list().unwrap();
    let by_age_then_name_desc = set.order_by("age").then_by_desc("name").to_list().unwrap();

    assert_eq!(ids(by_age), vec![1, 4, 3, 2]);
    assert_eq!(ids(by_age_then_name_desc), vec![4, 1, 3, 2]);
}

#[test]
fn steps_apply_left_to_right() {
    let set = people();

    let skip_then_filter = set.skip(1).filter(Filter::eq("age", 36)).to_list().unwrap();
    let filter_then_skip = set.filter(Filter::eq("age", 36)).skip(1).to_list().unwrap();

    assert_eq!(ids(skip_then_filter), vec![4]);
    assert_eq!(ids(filter_then_skip), vec![4]);
    assert_eq!(ids(set.take(3).skip(2).to_list().unwrap()), vec![3]);
}

#[test]
fn closure_predicates_see_typed_records() {
    let set = people();

    let long_names = set.filter_by(|p: &Person| p.name.len() > 4);

    assert_eq!(ids(long_names.to_list().unwrap()), vec![2, 4]);
    assert!(set.any_by(|p: &Person| p.age > 80).unwrap());
    assert!(!set.all_by(|p: &Person| p.age > 40).unwrap());
}

#[test]
fn element_terminals() {
    let set = people();
    let thirty_six = set.filter(Filter::eq("age", 36));

    assert_eq!(thirty_six.first().unwrap().id, 1);
    assert_eq!(thirty_six.last().unwrap().id, 4);
    assert_eq!(set.filter(Filter::eq("id", 2)).single().unwrap().name, "Grace");
    assert!(set.filter(Filter::eq("id", 9)).first_or_default().unwrap().is_none());
    assert!(set.filter(Filter::eq("id", 9)).last_or_default().unwrap().is_none());
    assert!(matches!(
        thirty_six.single(),
        Err(MocksetError::InvalidOperation(_))
    ));
    assert!(matches!(
        thirty_six.single_or_default(),
        Err(MocksetError::InvalidOperation(_))
    ));
    assert!(matches!(
        set.filter(Filter::eq("id", 9)).first(),
        Err(MocksetError::InvalidOperation(_))
    ));
}

#[test]
fn quantifiers_and_contains() {
    let set = people();
    let grace = set.find(2).unwrap().unwrap();

    assert!(set.any().unwrap());
    assert!(set.any_where(Filter::gt("age", 80)).unwrap());
    assert!(set.all(Filter::exists("name")).unwrap());
    assert!(!set.filter(Filter::eq("id", 9)).any().unwrap());
    assert!(set.filter(Filter::eq("id", 9)).all(Filter::eq("id", 0)).unwrap());
    assert!(set.contains_record(&grace).unwrap());
    assert!(!set.contains_record(&Arc::new(person(2, "Grace", 85))).unwrap());
    assert!(set.select_field("name").contains("Alan").unwrap());
    assert_eq!(set.long_count().unwrap(), 4);
}

#[test]
fn aggregates() {
    let set = people();
    let empty = set.filter(Filter::eq("id", 9));

    assert_eq!(set.sum("age").unwrap(), Bson::Int32(198));
    assert_eq!(set.min("age").unwrap(), Bson::Int32(36));
    assert_eq!(set.max("name").unwrap(), Bson::String("Grace".to_string()));
    assert_eq!(set.average("age").unwrap(), 49.5);
    assert_eq!(empty.sum("age").unwrap(), Bson::Int32(0));
    assert!(matches!(empty.min("age"), Err(MocksetError::InvalidOperation(_))));
    assert!(matches!(empty.average("age"), Err(MocksetError::InvalidOperation(_))));
}

#[test]
fn projections_produce_bson_rows() {
    #[derive(Debug, PartialEq, Deserialize)]
    struct Summary {
        name: String,
    }

    let set = people();

    let ages = set.order_by("age").select_field("age").distinct().to_list().unwrap();
    let summaries = set
        .filter(Filter::lt("age", 40))
        .select(["name"])
        .to_list_as::<Summary>()
        .unwrap();

    assert_eq!(ages, vec![Bson::Int32(36), Bson::Int32(41), Bson::Int32(85)]);
    assert_eq!(
        summaries,
        vec![
            Summary { name: "Ada".to_string() },
            Summary { name: "Barbara".to_string() },
        ]
    );
}

#[test]
fn projected_scalars_have_no_fields() {
    let set = people();

    let result = set.select_field("name").filter(Filter::eq("name", "Ada")).count();

    assert_eq!(result.unwrap(), 0);
}

#[test]
fn closure_predicates_after_a_projection_are_internal_errors() {
    let set = people();
    let expression = set
        .select(["name"])
        .expression()
        .compose(QueryOp::Where(Predicate::Fn(Arc::new(|_: &Person| true))))
        .terminate(Terminal::Count);

    let result = set.provider().execute(&expression);

    assert!(matches!(result, Err(MocksetError::Internal(_))));
}

#[derive(Debug, Serialize, Deserialize, Record)]
struct Counter {
    id: i32,
    hits: u64,
}

#[test]
fn records_without_a_bson_form_still_count_and_list() {
    let set = RecordSet::<Counter>::new();
    set.add(Counter { id: 1, hits: u64::MAX });

    assert_eq!(set.count().unwrap(), 1);
    assert_eq!(set.to_list().unwrap().len(), 1);
    assert!(set.any().unwrap());
    assert_eq!(set.first().unwrap().hits, u64::MAX);
    assert_eq!(set.filter_by(|c: &Counter| c.id == 1).count().unwrap(), 1);
    assert!(matches!(
        set.filter(Filter::eq("id", 1)).count(),
        Err(MocksetError::Serialization(_))
    ));
}

#[test]
fn integer_sum_overflow_is_an_invalid_operation() {
    #[derive(Debug, Serialize, Deserialize, Record)]
    struct Ledger {
        id: i32,
        amount: i64,
    }

    let set = RecordSet::builder()
        .with_records([Ledger { id: 1, amount: i64::MAX }, Ledger { id: 2, amount: i64::MAX }])
        .build();

    assert!(matches!(set.sum("amount"), Err(MocksetError::InvalidOperation(_))));
    assert_eq!(set.take(1).sum("amount").unwrap(), Bson::Int64(i64::MAX));
}
