//! Core traits for records held by record sets.
//!
//! Records are plain serde types. The query engine and the key policy never touch record fields
//! directly: they observe a record through its BSON document view, produced by [`RecordExt`].

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::error::{MocksetError, MocksetResult};

/// Core trait that every record type stored in a record set must implement.
///
/// It is usually derived with `#[derive(Record)]`, which also accepts
/// `#[record(name = "...")]` to override [`Record::record_name`].
///
/// # Example
///
/// ```ignore
/// use mockset::prelude::*;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize, Record)]
/// pub struct Person {
///     pub id: i32,
///     pub name: String,
/// }
///
/// assert_eq!(Person::record_name(), "Person");
/// ```
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the record type name used by key conventions (`<Name>Id`).
    ///
    /// Defaults to the unqualified Rust type name.
    fn record_name() -> &'static str {
        short_type_name::<Self>()
    }

    /// Returns the members forming the identity key, when known at compile time.
    ///
    /// `None` means the key is inferred by convention from the record's BSON view, and an empty
    /// slice means the record is known to have no conventional key. More than one member forms a
    /// composite key, in declaration order. `#[derive(Record)]` fills this in from `#[key]` field
    /// attributes or the `id` / `<Name>Id` field naming conventions.
    fn key_members() -> Option<&'static [&'static str]> {
        None
    }
}

/// Extension trait providing serialization utilities for records.
///
/// This trait is automatically implemented for all types that implement [`Record`].
pub trait RecordExt: Record {
    /// Converts this record to a BSON value.
    fn to_bson(&self) -> MocksetResult<Bson>;

    /// Converts this record to a BSON document, failing if it does not serialize as one.
    fn to_document(&self) -> MocksetResult<Document>;

    /// Creates a record from a BSON value.
    fn from_bson(bson: Bson) -> MocksetResult<Self>;

    /// Converts this record to a JSON value.
    fn to_json(&self) -> MocksetResult<Value>;

    /// Creates a record from a JSON value.
    fn from_json(value: Value) -> MocksetResult<Self>;
}

impl<R: Record> RecordExt for R {
    fn to_bson(&self) -> MocksetResult<Bson> {
        Ok(serialize_to_bson(self)?)
    }

    fn to_document(&self) -> MocksetResult<Document> {
        match self.to_bson()? {
            Bson::Document(document) => Ok(document),
            other => Err(MocksetError::Serialization(format!(
                "record {} serialized to {:?}, expected a document",
                R::record_name(),
                other.element_type(),
            ))),
        }
    }

    fn from_bson(bson: Bson) -> MocksetResult<Self> {
        Ok(deserialize_from_bson(bson)?)
    }

    fn to_json(&self) -> MocksetResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> MocksetResult<Self> {
        Ok(from_value(value)?)
    }
}

/// Returns the last path segment of a type name, without generic arguments.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);

    base.rsplit("::").next().unwrap_or(base)
}
