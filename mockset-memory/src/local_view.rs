//! Live views over a record set's backing collection.

use std::{fmt, sync::Arc};

use mockset_core::{
    collection::{BackingCollection, ChangeHandler, CollectionChange, ObservableCollection, SubscriptionId},
    error::{MocksetError, MocksetResult},
    record::Record,
};

/// A mutable view over the backing collection bound when the view was taken.
///
/// Reads and writes pass straight through to the collection. Change subscriptions require an
/// [`ObservableCollection`].
pub struct LocalView<T> {
    collection: Arc<dyn BackingCollection<T>>,
}

impl<T: Record> LocalView<T> {
    pub(crate) fn new(collection: Arc<dyn BackingCollection<T>>) -> Self {
        Self { collection }
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Local views are always writable.
    pub fn is_read_only(&self) -> bool {
        false
    }

    pub fn add(&self, record: T) -> Arc<T> {
        let record = Arc::new(record);
        self.collection.push(record.clone());
        record
    }

    pub fn add_shared(&self, record: Arc<T>) {
        self.collection.push(record);
    }

    pub fn clear(&self) {
        self.collection.clear();
    }

    /// Returns `true` if this exact record instance is present.
    pub fn contains(&self, record: &Arc<T>) -> bool {
        self.collection.contains(record)
    }

    /// Removes this exact record instance, returning whether it was present.
    pub fn remove(&self, record: &Arc<T>) -> bool {
        self.collection.remove(record)
    }

    /// Copies the records into `target`, starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`MocksetError::InvalidOperation`] if `target` has no room for every record.
    pub fn copy_to(&self, target: &mut [Option<Arc<T>>], offset: usize) -> MocksetResult<()> {
        let records = self.collection.snapshot();
        let end = offset
            .checked_add(records.len())
            .filter(|end| *end <= target.len())
            .ok_or_else(|| {
                MocksetError::InvalidOperation(format!(
                    "cannot copy {} records into a slice of length {} at offset {offset}",
                    records.len(),
                    target.len(),
                ))
            })?;

        for (slot, record) in target[offset..end].iter_mut().zip(records) {
            *slot = Some(record);
        }

        Ok(())
    }

    /// Iterates over a snapshot of the records, in insertion order.
    pub fn iter(&self) -> std::vec::IntoIter<Arc<T>> {
        self.collection.snapshot().into_iter()
    }

    /// The backing collection as an [`ObservableCollection`], if it is one.
    pub fn to_observable(&self) -> Option<ObservableCollection<T>> {
        self.collection.as_observable()
    }

    /// Registers a change handler on the backing collection.
    ///
    /// # Errors
    ///
    /// Returns [`MocksetError::InvalidOperation`] if the backing collection is not observable.
    pub fn subscribe<F>(&self, handler: F) -> MocksetResult<SubscriptionId>
    where
        F: Fn(&CollectionChange<T>) + Send + Sync + 'static,
    {
        let handler: ChangeHandler<T> = Arc::new(handler);

        self.collection.subscribe(handler).ok_or_else(|| {
            MocksetError::InvalidOperation(format!(
                "the backing collection of {} records does not raise change notifications",
                T::record_name(),
            ))
        })
    }

    /// Removes a change handler, returning whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.collection.unsubscribe(id)
    }
}

impl<T> fmt::Debug for LocalView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalView").finish_non_exhaustive()
    }
}
