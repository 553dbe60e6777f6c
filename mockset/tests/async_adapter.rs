mod common;

use common::{Person, init_tracing, person, people};
use futures::StreamExt;
use mockset::prelude::*;

#[tokio::test]
async fn async_count_matches_sync_count() {
    init_tracing();

    for n in [0, 1, 7] {
        let set = RecordSet::<Person>::new();
        set.add_range((0..n).map(|id| person(id, "P", id)));

        assert_eq!(set.count_async().await.unwrap(), n as usize);
        assert_eq!(set.count_async().await.unwrap(), set.count().unwrap());
        assert_eq!(set.long_count_async().await.unwrap(), n as u64);
    }
}

#[tokio::test]
async fn async_terminals_mirror_their_sync_forms() {
    let set = people();
    let by_age = set.order_by_desc("age");

    assert_eq!(by_age.first_async().await.unwrap().id, 2);
    assert_eq!(by_age.last_async().await.unwrap().id, 4);
    assert_eq!(
        set.filter(Filter::eq("name", "Alan")).single_async().await.unwrap().id,
        3
    );
    assert!(set.filter(Filter::eq("id", 9)).first_or_default_async().await.unwrap().is_none());
    assert!(set.filter(Filter::eq("id", 9)).single_or_default_async().await.unwrap().is_none());
    assert!(set.filter(Filter::eq("id", 9)).last_or_default_async().await.unwrap().is_none());
    assert!(set.any_async().await.unwrap());
    assert!(set.all_async(Filter::gt("age", 30)).await.unwrap());
    assert!(set.select_field("name").contains_async("Ada").await.unwrap());
    assert_eq!(
        by_age.to_list_async().await.unwrap(),
        by_age.to_list().unwrap()
    );
    assert_eq!(set.sum_async("age").await.unwrap(), set.sum("age").unwrap());
    assert_eq!(set.min_async("age").await.unwrap(), set.min("age").unwrap());
    assert_eq!(set.max_async("age").await.unwrap(), set.max("age").unwrap());
    assert_eq!(set.average_async("age").await.unwrap(), 49.5);
}

#[tokio::test]
async fn errors_surface_through_the_future() {
    let set = RecordSet::<Person>::new();

    assert_eq!(set.first_async().await.unwrap_err(), MocksetError::no_elements());
    assert!(matches!(
        set.average_async("age").await,
        Err(MocksetError::InvalidOperation(_))
    ));
}

#[tokio::test]
async fn cancellation_tokens_are_accepted_and_ignored() {
    let set = people();
    let token = CancellationToken::new();
    token.cancel();

    let output = set
        .provider()
        .execute_async(&set.expression().terminate_async(Terminal::Count), &token)
        .await
        .unwrap();

    assert!(token.is_cancelled());
    assert_eq!(output.into_count().unwrap(), 4);
}

#[tokio::test]
async fn async_iteration_matches_sync_iteration() {
    let set = people();
    let sync = set.iter().map(|p| p.id).collect::<Vec<_>>();

    let mut cursor = set.async_iter();
    let mut manual = Vec::new();
    while cursor.move_next_async().await {
        manual.push(cursor.current().unwrap().id);
    }
    let streamed = set
        .query()
        .into_async_iter()
        .unwrap()
        .map(|p| p.id)
        .collect::<Vec<_>>()
        .await;

    assert_eq!(manual, sync);
    assert_eq!(streamed, sync);
}

#[tokio::test]
async fn disposed_cursors_stop_and_new_ones_restart() {
    let set = people();
    let query = set.order_by("name");

    let mut cursor = query.clone().into_async_iter().unwrap();
    assert!(cursor.move_next_async().await);
    cursor.dispose_async().await;

    assert!(cursor.is_disposed());
    assert!(!cursor.move_next_async().await);

    let mut fresh = query.into_async_iter().unwrap();
    assert!(fresh.move_next_async().await);
    assert_eq!(fresh.current().unwrap().name, "Ada");
}

#[tokio::test]
async fn async_iteration_over_projections() {
    let set = people();

    let names = set
        .order_by("id")
        .select_field("name")
        .into_async_iter()
        .unwrap()
        .collect::<Vec<_>>()
        .await;

    assert_eq!(names.len(), 4);
    assert_eq!(names[0].as_str(), Some("Ada"));
}
