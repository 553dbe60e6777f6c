//! Identity keys and the policy that extracts them from records.
//!
//! A record's identity key is either a single value or an ordered sequence of values (a
//! composite key). The [`KeyPolicy`] of a record set either uses a caller-supplied key function
//! verbatim, or infers one by convention the first time identity lookup is attempted:
//!
//! 1. a member named `id` (case-insensitive),
//! 2. else a member named `<RecordName>Id` (case-insensitive, `<record_name>_id` also accepted).
//!
//! Inference never happens at construction time, so building a record set never fails.

use std::sync::{Arc, PoisonError, RwLock};

use bson::{Bson, Document};
use tracing::debug;

use crate::{
    error::{MocksetError, MocksetResult},
    record::{Record, RecordExt},
};

/// The identity key of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// A non-composite key.
    Single(Bson),
    /// The ordered values of a composite key.
    Composite(Vec<Bson>),
}

impl KeyValue {
    /// Wraps a BSON value, treating arrays as composite keys.
    pub fn from_bson(value: Bson) -> Self {
        match value {
            Bson::Array(values) => KeyValue::Composite(values),
            value => KeyValue::Single(value),
        }
    }

    /// Number of key values a lookup must supply.
    pub fn arity(&self) -> usize {
        match self {
            KeyValue::Single(_) => 1,
            KeyValue::Composite(values) => values.len(),
        }
    }
}

/// Conversion into a [`KeyValue`], implemented for everything convertible into BSON.
///
/// Vectors and arrays convert into composite keys.
pub trait IntoKey {
    fn into_key(self) -> KeyValue;
}

impl<V: Into<Bson>> IntoKey for V {
    fn into_key(self) -> KeyValue {
        KeyValue::from_bson(self.into())
    }
}

/// A function returning the identity key of a record.
pub type KeyFn<T> = Arc<dyn Fn(&T) -> MocksetResult<KeyValue> + Send + Sync>;

/// Wraps a plain key accessor into a [`KeyFn`].
pub fn key_fn<T, K, F>(f: F) -> KeyFn<T>
where
    T: Record,
    K: IntoKey,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    Arc::new(move |record: &T| Ok(f(record).into_key()))
}

/// Lazily resolved key extraction policy of a single record set.
///
/// The resolved function is cached for the lifetime of the policy. Setting a key function
/// after implicit resolution replaces the cached one.
pub struct KeyPolicy<T> {
    key_fn: RwLock<Option<KeyFn<T>>>,
}

impl<T: Record> KeyPolicy<T> {
    /// Creates a policy that will infer the key by convention.
    pub fn new() -> Self {
        Self { key_fn: RwLock::new(None) }
    }

    /// Creates a policy with an explicit key function.
    pub fn with_key_fn(key_fn: KeyFn<T>) -> Self {
        Self { key_fn: RwLock::new(Some(key_fn)) }
    }

    /// Replaces the key function.
    pub fn set(&self, key_fn: KeyFn<T>) {
        *self.key_fn.write().unwrap_or_else(PoisonError::into_inner) = Some(key_fn);
    }

    /// Returns `true` once a key function is known, explicit or inferred.
    pub fn is_resolved(&self) -> bool {
        self.key_fn
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Returns the key function, inferring it on first use.
    ///
    /// Statically declared key members ([`Record::key_members`]) are used when present; otherwise
    /// the key is inferred by convention from `probe`'s BSON view.
    ///
    /// # Errors
    ///
    /// Returns [`MocksetError::Configuration`] if no explicit function was set and neither key
    /// convention matches a member of the record, or if inference needs a probe and none is given.
    pub fn resolve(&self, probe: Option<&T>) -> MocksetResult<KeyFn<T>> {
        if let Some(key_fn) = self.key_fn.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(key_fn.clone());
        }

        let members = match (T::key_members(), probe) {
            (Some([]), _) => return Err(no_key_error::<T>()),
            (Some(members), _) => members.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
            (None, Some(probe)) => vec![convention_member::<T>(&probe.to_document()?)?],
            (None, None) => return Err(no_key_error::<T>()),
        };
        debug!(record = T::record_name(), ?members, "inferred record key members");

        let key_fn: KeyFn<T> = Arc::new(move |record: &T| {
            let document = record.to_document()?;
            let mut values = members
                .iter()
                .map(|member| lookup_member(&document, member).cloned().unwrap_or(Bson::Null))
                .collect::<Vec<_>>();

            Ok(match values.len() {
                1 => KeyValue::from_bson(values.remove(0)),
                _ => KeyValue::Composite(values),
            })
        });

        let mut guard = self.key_fn.write().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get_or_insert(key_fn).clone())
    }
}

impl<T: Record> Default for KeyPolicy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for KeyPolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolved = self
            .key_fn
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();

        f.debug_struct("KeyPolicy").field("resolved", &resolved).finish()
    }
}

fn lookup_member<'a>(document: &'a Document, member: &str) -> Option<&'a Bson> {
    document.get(member).or_else(|| {
        document
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(member))
            .map(|(_, value)| value)
    })
}

fn convention_member<T: Record>(document: &Document) -> MocksetResult<String> {
    let name = T::record_name();
    let candidates = [
        "id".to_string(),
        format!("{name}Id"),
        format!("{name}_id"),
    ];

    candidates
        .iter()
        .find_map(|candidate| {
            document
                .keys()
                .find(|key| key.eq_ignore_ascii_case(candidate))
                .cloned()
        })
        .ok_or_else(no_key_error::<T>)
}

fn no_key_error<T: Record>() -> MocksetError {
    MocksetError::Configuration(format!(
        "Couldn't automatically determine the key of record {}. \
         Specify a key function with `set_key_fn` before using `find`.",
        T::record_name(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Person {
        id: i32,
        name: String,
    }

    impl Record for Person {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Order {
        #[serde(rename = "OrderID")]
        order_id: i64,
    }

    impl Record for Order {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tag {
        label: String,
    }

    impl Record for Tag {}

    #[test]
    fn infers_id_member() {
        let policy = KeyPolicy::<Person>::new();
        let person = Person { id: 4, name: "Ada".to_string() };

        let key_fn = policy.resolve(Some(&person)).unwrap();

        assert!(policy.is_resolved());
        assert_eq!(key_fn(&person).unwrap(), KeyValue::Single(Bson::Int32(4)));
    }

    #[test]
    fn infers_record_name_id_member_case_insensitively() {
        let policy = KeyPolicy::<Order>::new();
        let order = Order { order_id: 11 };

        let key_fn = policy.resolve(Some(&order)).unwrap();

        assert_eq!(key_fn(&order).unwrap(), KeyValue::Single(Bson::Int64(11)));
    }

    #[test]
    fn fails_without_convention_or_key_fn() {
        let policy = KeyPolicy::<Tag>::new();
        let err = policy.resolve(Some(&Tag { label: "x".to_string() })).err().unwrap();

        assert!(matches!(err, MocksetError::Configuration(_)));
        assert!(!policy.is_resolved());
    }

    #[test]
    fn explicit_key_fn_wins_and_supports_composite_keys() {
        let policy = KeyPolicy::with_key_fn(key_fn(|tag: &Tag| vec![tag.label.clone(), "x".to_string()]));
        let tag = Tag { label: "a".to_string() };

        let key = policy.resolve(Some(&tag)).unwrap()(&tag).unwrap();

        assert_eq!(key.arity(), 2);
        assert_eq!(key, KeyValue::Composite(vec![Bson::from("a"), Bson::from("x")]));
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Keyless {
        label: String,
    }

    impl Record for Keyless {
        fn key_members() -> Option<&'static [&'static str]> {
            Some(&[])
        }
    }

    #[test]
    fn statically_keyless_records_fail_without_a_probe() {
        assert!(matches!(
            KeyPolicy::<Keyless>::new().resolve(None),
            Err(MocksetError::Configuration(_))
        ));
    }

    #[test]
    fn setting_key_fn_replaces_inferred_one() {
        let policy = KeyPolicy::<Person>::new();
        let person = Person { id: 1, name: "Bo".to_string() };
        policy.resolve(Some(&person)).unwrap();

        policy.set(key_fn(|p: &Person| p.name.clone()));

        let key = policy.resolve(Some(&person)).unwrap()(&person).unwrap();
        assert_eq!(key, KeyValue::Single(Bson::from("Bo")));
    }
}
