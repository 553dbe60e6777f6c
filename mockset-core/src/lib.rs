//! Core abstractions for in-memory record sets that stand in for a data-access layer in tests.
//!
//! This crate is the core of the mockset project and provides:
//!
//! - **Record traits** ([`record`]) - Core traits for record types and their BSON view
//! - **Identity keys** ([`key`]) - Key values and the lazily resolved key extraction policy
//! - **Query expressions** ([`query`]) - The query expression tree and filter expression API
//! - **Query handles** ([`queryable`]) - Lazy, immutable, fluent query composition
//! - **Query providers** ([`provider`]) - Synchronous and asynchronous execution traits
//! - **Backing collections** ([`collection`]) - Observable and plain in-memory stores
//! - **Mocking engine contract** ([`mock`]) - What preparation needs from a mocking engine
//! - **Record contexts** ([`context`]) - Compile-time discovery of record-set members
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use mockset::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Record)]
//! pub struct Person {
//!     pub id: i32,
//!     pub name: String,
//! }
//!
//! let people = RecordSet::<Person>::new();
//! people.add(Person { id: 1, name: "Ada".to_string() });
//! assert_eq!(people.find(1)?.unwrap().name, "Ada");
//! ```

#[allow(unused_extern_crates)]
extern crate self as mockset_core;

pub mod collection;
pub mod context;
pub mod error;
pub mod key;
pub mod mock;
pub mod provider;
pub mod query;
pub mod queryable;
pub mod record;
