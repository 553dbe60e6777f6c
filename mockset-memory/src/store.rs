//! The shared, rebindable store handle underneath a record set.
//!
//! A record set, its query provider and its local views all read through the same
//! [`InMemoryStore`]. Binding a different backing collection swaps it for every one of them at
//! once, so a query composed before a rebind evaluates against the new contents.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::debug;

use mockset_core::{
    collection::{BackingCollection, ObservableCollection},
    record::Record,
};

/// Cloneable handle on the backing collection currently bound to a record set.
pub struct InMemoryStore<T> {
    collection: Arc<RwLock<Arc<dyn BackingCollection<T>>>>,
}

impl<T: Record> InMemoryStore<T> {
    /// Creates a store backed by an empty [`ObservableCollection`].
    pub fn new() -> Self {
        Self::with_collection(Arc::new(ObservableCollection::<T>::new()))
    }

    pub fn with_collection(collection: Arc<dyn BackingCollection<T>>) -> Self {
        Self {
            collection: Arc::new(RwLock::new(collection)),
        }
    }

    /// The backing collection currently bound.
    pub fn collection(&self) -> Arc<dyn BackingCollection<T>> {
        self.collection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the backing collection for every handle on this store.
    pub fn bind(&self, collection: Arc<dyn BackingCollection<T>>) {
        debug!(
            record = T::record_name(),
            len = collection.len(),
            "bound backing collection"
        );

        *self
            .collection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = collection;
    }

    /// Copies the current contents, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.collection().snapshot()
    }

    /// Returns `true` if both handles are the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.collection, &other.collection)
    }
}

impl<T> Clone for InMemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
        }
    }
}

impl<T: Record> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for InMemoryStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .collection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();

        f.debug_struct("InMemoryStore").field("len", &len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockset_core::collection::VecCollection;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Note {
        id: i32,
    }

    impl Record for Note {}

    #[test]
    fn rebinding_is_visible_through_every_clone() {
        let store = InMemoryStore::<Note>::new();
        let alias = store.clone();
        let replacement = VecCollection::from_iter([Note { id: 1 }, Note { id: 2 }]);

        alias.bind(Arc::new(replacement));

        assert_eq!(store.snapshot().len(), 2);
        assert!(store.ptr_eq(&alias));
    }
}
