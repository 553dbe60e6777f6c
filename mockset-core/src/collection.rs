//! Backing collections: the concrete in-memory stores underneath record sets.
//!
//! A backing collection is an ordered, mutable sequence of shared records. Membership tests and
//! removal use reference equality (`Arc::ptr_eq`), never value equality, so two records with the
//! same contents are still distinct entries.
//!
//! # Collection Types
//!
//! - [`ObservableCollection`] - Default store, notifies subscribers of every change
//! - [`VecCollection`] - Plain store without change notification
//!
//! Both are cheap `Clone` handles over one shared storage: a clone observes and mutates the same
//! records, which is what lets a caller keep a store around and bind it to another record set.

use std::{
    fmt,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::trace;

/// Identifies a change subscription on an observable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A change raised by an [`ObservableCollection`].
#[derive(Debug)]
pub enum CollectionChange<T> {
    /// A record was appended at `index`.
    Added { item: Arc<T>, index: usize },
    /// A record was removed from `index`.
    Removed { item: Arc<T>, index: usize },
    /// The store was cleared.
    Reset,
}

/// A subscriber callback for [`CollectionChange`]s.
pub type ChangeHandler<T> = Arc<dyn Fn(&CollectionChange<T>) + Send + Sync>;

/// An ordered, mutable in-memory store of shared records.
pub trait BackingCollection<T>: Send + Sync {
    /// Appends a record.
    fn push(&self, item: Arc<T>);

    /// Removes the first occurrence of this exact record. Returns `false` if it is absent.
    fn remove(&self, item: &Arc<T>) -> bool;

    /// Removes every record.
    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if this exact record is stored.
    fn contains(&self, item: &Arc<T>) -> bool;

    /// Copies the current contents, in insertion order.
    fn snapshot(&self) -> Vec<Arc<T>>;

    /// Registers a change handler. Returns `None` if this store does not raise notifications.
    fn subscribe(&self, _handler: ChangeHandler<T>) -> Option<SubscriptionId> {
        None
    }

    /// Removes a change handler. Returns `false` if it was not registered.
    fn unsubscribe(&self, _id: SubscriptionId) -> bool {
        false
    }

    /// Returns this store as an observable collection, if it is one.
    fn as_observable(&self) -> Option<ObservableCollection<T>> {
        None
    }
}

fn position<T>(items: &[Arc<T>], item: &Arc<T>) -> Option<usize> {
    items.iter().position(|candidate| Arc::ptr_eq(candidate, item))
}

struct ObservableState<T> {
    items: RwLock<Vec<Arc<T>>>,
    handlers: RwLock<Vec<(SubscriptionId, ChangeHandler<T>)>>,
    next_id: AtomicU64,
}

/// A backing store that notifies subscribers of every change.
///
/// Handlers run after the change has been applied and the store lock released, so a handler
/// may read the store it is subscribed to.
pub struct ObservableCollection<T> {
    state: Arc<ObservableState<T>>,
}

impl<T> ObservableCollection<T> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Arc<T>>) -> Self {
        Self {
            state: Arc::new(ObservableState {
                items: RwLock::new(items),
                handlers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Returns `true` if both handles share the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Number of registered change handlers.
    pub fn subscriber_count(&self) -> usize {
        self.state
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, change: CollectionChange<T>) {
        let handlers = self
            .state
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect::<Vec<_>>();

        trace!(subscribers = handlers.len(), "raising collection change");
        for handler in handlers {
            handler(&change);
        }
    }
}

impl<T> Clone for ObservableCollection<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Default for ObservableCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for ObservableCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Arc::new).collect())
    }
}

impl<T> fmt::Debug for ObservableCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.state.items.read().unwrap_or_else(PoisonError::into_inner).len();

        f.debug_struct("ObservableCollection")
            .field("len", &len)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T> BackingCollection<T> for ObservableCollection<T>
where
    T: Send + Sync,
{
    fn push(&self, item: Arc<T>) {
        let index = {
            let mut items = self.state.items.write().unwrap_or_else(PoisonError::into_inner);
            items.push(item.clone());
            items.len() - 1
        };

        self.notify(CollectionChange::Added { item, index });
    }

    fn remove(&self, item: &Arc<T>) -> bool {
        let removed = {
            let mut items = self.state.items.write().unwrap_or_else(PoisonError::into_inner);
            position(&items, item).map(|index| (items.remove(index), index))
        };

        match removed {
            Some((item, index)) => {
                self.notify(CollectionChange::Removed { item, index });
                true
            }
            None => false,
        }
    }

    fn clear(&self) {
        self.state
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        self.notify(CollectionChange::Reset);
    }

    fn len(&self) -> usize {
        self.state
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn contains(&self, item: &Arc<T>) -> bool {
        let items = self.state.items.read().unwrap_or_else(PoisonError::into_inner);

        position(&items, item).is_some()
    }

    fn snapshot(&self) -> Vec<Arc<T>> {
        self.state
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self, handler: ChangeHandler<T>) -> Option<SubscriptionId> {
        let id = SubscriptionId(self.state.next_id.fetch_add(1, Ordering::Relaxed));

        self.state
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));

        Some(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .state
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);

        handlers.len() != before
    }

    fn as_observable(&self) -> Option<ObservableCollection<T>> {
        Some(self.clone())
    }
}

/// A plain backing store without change notification.
pub struct VecCollection<T> {
    items: Arc<RwLock<Vec<Arc<T>>>>,
}

impl<T> VecCollection<T> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Arc<T>>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }
}

impl<T> Clone for VecCollection<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T> Default for VecCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for VecCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Arc::new).collect())
    }
}

impl<T> fmt::Debug for VecCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.items.read().unwrap_or_else(PoisonError::into_inner).len();

        f.debug_struct("VecCollection").field("len", &len).finish()
    }
}

impl<T> BackingCollection<T> for VecCollection<T>
where
    T: Send + Sync,
{
    fn push(&self, item: Arc<T>) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }

    fn remove(&self, item: &Arc<T>) -> bool {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);

        match position(&items, item) {
            Some(index) => {
                items.remove(index);
                true
            }
            None => false,
        }
    }

    fn clear(&self) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn contains(&self, item: &Arc<T>) -> bool {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);

        position(&items, item).is_some()
    }

    fn snapshot(&self) -> Vec<Arc<T>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn removal_uses_reference_equality() {
        let store = VecCollection::new();
        let first = Arc::new(1);
        let twin = Arc::new(1);
        store.push(first.clone());

        assert!(!store.contains(&twin));
        assert!(!store.remove(&twin));
        assert!(store.remove(&first));
        assert!(store.is_empty());
    }

    #[test]
    fn clones_share_storage() {
        let store = ObservableCollection::new();
        let alias = store.clone();

        alias.push(Arc::new("a"));

        assert_eq!(store.len(), 1);
        assert!(store.ptr_eq(&alias));
    }

    #[test]
    fn observable_raises_changes_until_unsubscribed() {
        let store = ObservableCollection::<i32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let id = store
            .subscribe(Arc::new(move |change: &CollectionChange<i32>| {
                let label = match change {
                    CollectionChange::Added { item, index } => format!("+{item}@{index}"),
                    CollectionChange::Removed { item, index } => format!("-{item}@{index}"),
                    CollectionChange::Reset => "reset".to_string(),
                };
                sink.lock().unwrap().push(label);
            }))
            .unwrap();

        let item = Arc::new(5);
        store.push(item.clone());
        store.remove(&item);
        store.clear();
        assert!(store.unsubscribe(id));
        store.push(Arc::new(6));

        assert_eq!(*seen.lock().unwrap(), vec!["+5@0", "-5@0", "reset"]);
    }

    #[test]
    fn plain_store_does_not_support_subscriptions() {
        let store = VecCollection::<i32>::new();

        assert!(store.subscribe(Arc::new(|_: &CollectionChange<i32>| {})).is_none());
        assert!(store.as_observable().is_none());
    }
}
