//! In-memory record sets and the query engine behind them.
//!
//! This crate implements the contracts of `mockset-core` over plain in-memory collections:
//!
//! - [`RecordSet`] - the mutable record set standing in for one persisted collection
//! - [`executor`] - rewrites a query expression against the live store contents and evaluates it
//! - [`async_provider`] - the asynchronous surface, completing every operation eagerly
//! - [`LocalView`] - a live read/write view over a record set's backing collection
//! - [`Preparer`] - installs record sets into the members of record contexts
//!
//! # Quick Start
//!
//! ```ignore
//! use mockset::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Record)]
//! pub struct User {
//!     pub id: i32,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let users = RecordSet::<User>::new();
//!     users.add(User { id: 1, name: "Alice".to_string() });
//!
//!     let alice = users.filter(Filter::eq("name", "Alice")).first_async().await?;
//!     assert_eq!(users.find(1)?.map(|u| u.id), Some(alice.id));
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as mockset_memory;

pub mod async_provider;
pub(crate) mod evaluator;
pub mod executor;
pub mod local_view;
pub mod prepare;
pub mod record_set;
pub mod store;

pub use async_provider::InMemoryQueryProvider;
pub use local_view::LocalView;
pub use prepare::{MockEngineExt, Preparer};
pub use record_set::{EntityEntry, EntryState, RecordSet, RecordSetBuilder};
pub use store::InMemoryStore;
