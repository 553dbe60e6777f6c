//! In-memory record sets.
//!
//! A [`RecordSet`] is the stand-in for one persisted collection of a data-access layer. It owns
//! a rebindable backing store, a lazily resolved identity key policy, and a query provider that
//! evaluates queries against the store's live contents. Record sets are cheap `Clone` handles:
//! clones are the same record set, sharing store, key policy and provider.
//!
//! A record set dereferences to its root [`Query`], so every composition and terminal operation
//! is available directly on it:
//!
//! ```ignore
//! use mockset::prelude::*;
//!
//! let people = RecordSet::<Person>::new();
//! people.add(Person { id: 1, name: "A".to_string() });
//! people.add(Person { id: 2, name: "B".to_string() });
//!
//! assert_eq!(people.find(1)?.unwrap().name, "A");
//! assert_eq!(people.filter(Filter::eq("name", "B")).count()?, 1);
//! assert_eq!(people.count_async().await?, 2);
//! ```

use std::{any::Any, fmt, ops::Deref, sync::Arc};

use bson::Bson;
use futures::future::{Ready, ready};
use tracing::debug;

use mockset_core::{
    collection::{BackingCollection, ObservableCollection, VecCollection},
    context::{ElementType, ErasedSet, RecordSetType, SetSlot},
    error::{MocksetError, MocksetResult},
    key::{IntoKey, KeyFn, KeyPolicy, KeyValue, key_fn},
    mock::{ArrangedValue, MockHandle},
    provider::{AsyncCursor, QueryProvider},
    query::Expression,
    queryable::Query,
    record::Record,
};

use crate::{
    async_provider::InMemoryQueryProvider, evaluator::values_equal, local_view::LocalView,
    store::InMemoryStore,
};

/// The change-tracking state reported by entry handles. Records are never tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Detached,
}

/// The handle returned by [`RecordSet::add`], [`RecordSet::attach`] and [`RecordSet::remove`].
#[derive(Debug)]
pub struct EntityEntry<T> {
    record: Arc<T>,
    state: EntryState,
}

impl<T> EntityEntry<T> {
    fn detached(record: Arc<T>) -> Self {
        Self {
            record,
            state: EntryState::Detached,
        }
    }

    /// The record, shared with the store.
    pub fn record(&self) -> &Arc<T> {
        &self.record
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn into_record(self) -> Arc<T> {
        self.record
    }
}

impl<T> Clone for EntityEntry<T> {
    fn clone(&self) -> Self {
        Self {
            record: self.record.clone(),
            state: self.state,
        }
    }
}

struct RecordSetInner<T: Record> {
    store: InMemoryStore<T>,
    keys: KeyPolicy<T>,
    root: Query<T>,
    mock: Option<MockHandle>,
}

/// An in-memory record set.
pub struct RecordSet<T: Record> {
    inner: Arc<RecordSetInner<T>>,
}

impl<T: Record> RecordSet<T> {
    /// Creates an empty record set backed by an [`ObservableCollection`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RecordSetBuilder<T> {
        RecordSetBuilder::default()
    }

    /// The backing collection currently bound.
    pub fn data(&self) -> Arc<dyn BackingCollection<T>> {
        self.inner.store.collection()
    }

    /// Binds a caller-supplied backing collection.
    ///
    /// Changes made through the collection are visible through the record set and vice versa.
    /// Queries already composed against this record set evaluate against the new collection.
    pub fn bind(&self, collection: impl BackingCollection<T> + 'static) -> &Self {
        self.bind_shared(Arc::new(collection))
    }

    /// Binds a shared backing collection, such as one taken from another record set's
    /// [`data`](Self::data).
    pub fn bind_shared(&self, collection: Arc<dyn BackingCollection<T>>) -> &Self {
        self.inner.store.bind(collection);
        self
    }

    /// Sets the function returning a record's identity key, replacing any inferred one.
    ///
    /// Return a `Vec` of values for composite keys.
    pub fn set_key_fn<K, F>(&self, f: F) -> &Self
    where
        K: IntoKey,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.inner.keys.set(key_fn(f));
        self
    }

    /// Appends a record.
    pub fn add(&self, record: T) -> EntityEntry<T> {
        self.add_shared(Arc::new(record))
    }

    /// Appends an already shared record.
    pub fn add_shared(&self, record: Arc<T>) -> EntityEntry<T> {
        self.inner.store.collection().push(record.clone());

        EntityEntry::detached(record)
    }

    /// Appends every record, in order.
    pub fn add_range(&self, records: impl IntoIterator<Item = T>) {
        let collection = self.inner.store.collection();

        for record in records {
            collection.push(Arc::new(record));
        }
    }

    /// Same as [`add`](Self::add): records are never tracked.
    pub fn attach(&self, record: T) -> EntityEntry<T> {
        self.add(record)
    }

    /// Removes this exact record instance. Removing an absent record does nothing.
    pub fn remove(&self, record: &Arc<T>) -> EntityEntry<T> {
        self.inner.store.collection().remove(record);

        EntityEntry::detached(record.clone())
    }

    /// Removes each record instance.
    pub fn remove_range<'a>(&self, records: impl IntoIterator<Item = &'a Arc<T>>) {
        let collection = self.inner.store.collection();

        for record in records {
            collection.remove(record);
        }
    }

    /// Returns the first record whose identity key equals `keys`, in insertion order.
    ///
    /// Pass a single value for simple keys and a `Vec` of values for composite keys.
    /// Numeric key values match across widths.
    ///
    /// # Errors
    ///
    /// - [`MocksetError::Configuration`] if the key cannot be determined
    /// - [`MocksetError::InvalidOperation`] if the number of key values does not match the
    ///   record's key
    pub fn find(&self, keys: impl IntoKey) -> MocksetResult<Option<Arc<T>>> {
        let supplied = match keys.into_key() {
            KeyValue::Single(value) => vec![value],
            KeyValue::Composite(values) => values,
        };
        let records = self.inner.store.snapshot();

        // Convention inference needs a record to look at; an empty store cannot match anyway.
        if records.is_empty() && !self.inner.keys.is_resolved() && T::key_members().is_none() {
            return Ok(None);
        }

        let key_fn = self.inner.keys.resolve(records.first().map(Arc::as_ref))?;
        for record in records {
            if key_matches(&key_fn, &record, &supplied)? {
                return Ok(Some(record));
            }
        }

        Ok(None)
    }

    /// [`find`](Self::find), through an already completed future.
    pub fn find_async(&self, keys: impl IntoKey) -> Ready<MocksetResult<Option<Arc<T>>>> {
        ready(self.find(keys))
    }

    /// Iterates over a snapshot of the records, in insertion order.
    pub fn iter(&self) -> std::vec::IntoIter<Arc<T>> {
        self.inner.store.snapshot().into_iter()
    }

    pub fn to_vec(&self) -> Vec<Arc<T>> {
        self.inner.store.snapshot()
    }

    /// Iterates asynchronously over a snapshot of the records.
    pub fn async_iter(&self) -> AsyncCursor<Arc<T>> {
        AsyncCursor::new(self.iter())
    }

    pub fn len(&self) -> usize {
        self.inner.store.collection().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The root query over this record set.
    pub fn query(&self) -> Query<T> {
        self.inner.root.clone()
    }

    /// A live view over the currently bound backing collection.
    pub fn local(&self) -> LocalView<T> {
        LocalView::new(self.inner.store.collection())
    }

    /// The mock instance this record set was created as, if it was created by a mocking engine.
    pub fn mock_handle(&self) -> Option<&MockHandle> {
        self.inner.mock.as_ref()
    }

    /// The element type descriptor of this record set.
    pub fn record_type(&self) -> ElementType {
        ElementType::of::<Self>()
    }

    /// Returns `true` if both handles are the same record set.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn key_matches<T>(key_fn: &KeyFn<T>, record: &T, supplied: &[Bson]) -> MocksetResult<bool> {
    let actual = match key_fn(record)? {
        KeyValue::Single(value) => vec![value],
        KeyValue::Composite(values) => values,
    };

    if actual.len() != supplied.len() {
        return Err(MocksetError::InvalidOperation(format!(
            "Number of keys passed to find ({}) is not equal to the number of keys on the record ({})",
            supplied.len(),
            actual.len(),
        )));
    }

    Ok(actual
        .iter()
        .zip(supplied)
        .all(|(actual, supplied)| values_equal(actual, supplied)))
}

impl<T: Record> Deref for RecordSet<T> {
    type Target = Query<T>;

    fn deref(&self) -> &Self::Target {
        &self.inner.root
    }
}

impl<T: Record> Clone for RecordSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Record> Default for RecordSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> fmt::Debug for RecordSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSet")
            .field("record", &T::record_name())
            .field("len", &self.len())
            .field("keys", &self.inner.keys)
            .field("mock", &self.inner.mock)
            .finish()
    }
}

impl<'a, T: Record> IntoIterator for &'a RecordSet<T> {
    type Item = Arc<T>;
    type IntoIter = std::vec::IntoIter<Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Record> ErasedSet for RecordSet<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_boxed(&self) -> Box<dyn ErasedSet> {
        Box::new(self.clone())
    }

    fn to_arranged(&self) -> ArrangedValue {
        Arc::new(self.clone())
    }

    fn mock_handle(&self) -> Option<&MockHandle> {
        self.inner.mock.as_ref()
    }

    fn same_store(&self, other: &dyn ErasedSet) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.inner.store.ptr_eq(&other.inner.store))
    }

    fn len(&self) -> usize {
        RecordSet::len(self)
    }
}

impl<T: Record> RecordSetType for RecordSet<T> {
    type Record = T;

    fn create(handle: MockHandle) -> Self {
        Self::builder().with_mock_handle(handle).build()
    }
}

impl<T: Record> SetSlot for RecordSet<T> {
    fn install(&mut self, set: &dyn ErasedSet) -> MocksetResult<()> {
        let set = set.as_any().downcast_ref::<Self>().ok_or_else(|| {
            MocksetError::Internal(format!(
                "cannot install a record set of another element type into a {} member",
                T::record_name(),
            ))
        })?;

        *self = set.clone();
        Ok(())
    }

    fn current(&self) -> &dyn ErasedSet {
        self
    }
}

/// Builder for [`RecordSet`]s.
///
/// # Example
///
/// ```ignore
/// let orders = RecordSet::<OrderLine>::builder()
///     .plain()
///     .with_key_fn(|line: &OrderLine| vec![line.order_id, line.line_no])
///     .with_records(lines)
///     .build();
/// ```
pub struct RecordSetBuilder<T: Record> {
    records: Vec<Arc<T>>,
    collection: Option<Arc<dyn BackingCollection<T>>>,
    observable: bool,
    key_fn: Option<KeyFn<T>>,
    mock: Option<MockHandle>,
}

impl<T: Record> Default for RecordSetBuilder<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            collection: None,
            observable: true,
            key_fn: None,
            mock: None,
        }
    }
}

impl<T: Record> RecordSetBuilder<T> {
    /// Seeds the record set, in order.
    pub fn with_records(mut self, records: impl IntoIterator<Item = T>) -> Self {
        self.records.extend(records.into_iter().map(Arc::new));
        self
    }

    /// Seeds the record set with already shared records.
    pub fn with_shared_records(mut self, records: impl IntoIterator<Item = Arc<T>>) -> Self {
        self.records.extend(records);
        self
    }

    /// Uses a caller-supplied backing collection. Seed records are appended to it.
    pub fn with_collection(mut self, collection: impl BackingCollection<T> + 'static) -> Self {
        self.collection = Some(Arc::new(collection));
        self
    }

    /// Backs the record set with a [`VecCollection`], which raises no change notifications.
    pub fn plain(mut self) -> Self {
        self.observable = false;
        self
    }

    /// Backs the record set with an [`ObservableCollection`]. This is the default.
    pub fn observable(mut self) -> Self {
        self.observable = true;
        self
    }

    pub fn with_key_fn<K, F>(mut self, f: F) -> Self
    where
        K: IntoKey,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.key_fn = Some(key_fn(f));
        self
    }

    /// Marks the record set as created by a mocking engine.
    pub fn with_mock_handle(mut self, handle: MockHandle) -> Self {
        self.mock = Some(handle);
        self
    }

    pub fn build(self) -> RecordSet<T> {
        let collection = match self.collection {
            Some(collection) => collection,
            None if self.observable => Arc::new(ObservableCollection::<T>::new()),
            None => Arc::new(VecCollection::<T>::new()),
        };
        for record in self.records {
            collection.push(record);
        }

        debug!(
            record = T::record_name(),
            len = collection.len(),
            mocked = self.mock.is_some(),
            "created record set"
        );

        let store = InMemoryStore::with_collection(collection);
        let provider = Arc::new(InMemoryQueryProvider::new(store.clone()));
        let keys = match self.key_fn {
            Some(key_fn) => KeyPolicy::with_key_fn(key_fn),
            None => KeyPolicy::new(),
        };

        RecordSet {
            inner: Arc::new(RecordSetInner {
                store,
                keys,
                root: provider.create_query(Expression::source()),
                mock: self.mock,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockset_core::query::Filter;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        id: i32,
        name: String,
    }

    impl Record for Person {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderLine {
        order: i64,
        line: i32,
    }

    impl Record for OrderLine {}

    fn person(id: i32, name: &str) -> Person {
        Person {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn find_returns_the_added_instance() {
        let people = RecordSet::new();
        let ada = people.add(person(1, "A")).into_record();
        people.add(person(2, "B"));

        let found = people.find(1).unwrap().unwrap();

        assert!(Arc::ptr_eq(&found, &ada));
        assert_eq!(people.find(3_i64).unwrap(), None);
    }

    #[test]
    fn entries_are_detached() {
        let people = RecordSet::new();
        let entry = people.attach(person(1, "A"));
        let removed = people.remove(entry.record());

        assert_eq!(entry.state(), EntryState::Detached);
        assert_eq!(removed.state(), EntryState::Detached);
        assert!(people.is_empty());
    }

    #[test]
    fn remove_uses_reference_equality_and_ignores_absent_records() {
        let people = RecordSet::new();
        let first = people.add(person(1, "A")).into_record();
        people.add(person(2, "B"));

        people.remove(&Arc::new(person(2, "B")));
        people.remove(&first);

        let names = people.iter().map(|p| p.name.clone()).collect::<Vec<_>>();
        assert_eq!(names, vec!["B"]);
    }

    #[test]
    fn composite_keys_require_matching_arity() {
        let lines = RecordSet::builder()
            .with_key_fn(|line: &OrderLine| vec![Bson::Int64(line.order), Bson::Int32(line.line)])
            .with_records([OrderLine { order: 7, line: 1 }, OrderLine { order: 7, line: 2 }])
            .build();

        let found = lines.find(vec![7, 2]).unwrap().unwrap();
        let err = lines.find(7).unwrap_err();

        assert_eq!(found.line, 2);
        assert!(matches!(err, MocksetError::InvalidOperation(_)));
    }

    #[test]
    fn find_without_a_determinable_key_is_a_configuration_error() {
        let lines = RecordSet::builder()
            .with_records([OrderLine { order: 1, line: 1 }])
            .build();

        assert!(matches!(lines.find(1), Err(MocksetError::Configuration(_))));
    }

    #[test]
    fn bind_shares_the_collection_both_ways() {
        let people = RecordSet::<Person>::new();
        let backing = VecCollection::from_iter([person(1, "A")]);
        let query = people.filter(Filter::exists("id"));

        people.bind(backing.clone());
        backing.push(Arc::new(person(2, "B")));
        people.add(person(3, "C"));

        assert_eq!(backing.len(), 3);
        assert_eq!(query.count().unwrap(), 3);
        assert!(people.data().as_observable().is_none());
    }

    #[test]
    fn clones_are_the_same_record_set() {
        let people = RecordSet::<Person>::new();
        let alias = people.clone();
        alias.add(person(1, "A"));

        assert!(people.ptr_eq(&alias));
        assert!(people.same_store(&alias));
        assert_eq!(people.len(), 1);
        assert!(!people.ptr_eq(&RecordSet::new()));
    }
}
