//! In-memory record sets and query emulation for testing data-access layers.
//!
//! This crate is the primary entry point for users of the mockset framework. It re-exports the
//! contracts from `mockset-core`, the in-memory implementation from `mockset-memory` and the
//! derive macros from `mockset-macros`.
//!
//! # Features
//!
//! - **Record sets** - Add, attach, remove and find records by identity key, in memory
//! - **Composable queries** - Filter, project, order and page lazily; evaluate on demand
//! - **Async surface** - Every terminal has an async form that completes without suspending
//! - **Context preparation** - Install record sets into every record-set member of a test double
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
//! async fn main() -> MocksetResult<()> {
//!     let users = RecordSet::<User>::new();
//!     users.add(User { id: 1, name: "Alice".to_string() });
//!     users.add(User { id: 2, name: "Bob".to_string() });
//!
//!     // Identity lookup
//!     let bob = users.find(2)?.unwrap();
//!
//!     // Queries are lazy and evaluate against the live contents
//!     let named = users.filter(Filter::starts_with("name", "A")).order_by("name");
//!     users.add(User { id: 3, name: "Ann".to_string() });
//!
//!     assert_eq!(named.count_async().await?, 2);
//!     assert_eq!(bob.name, "Bob");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Preparing Contexts
//!
//! ```ignore
//! use mockset::prelude::*;
//!
//! #[derive(Default, RecordContext)]
//! #[record_context(set_accessor, readonly(orders = RecordSet<Order>))]
//! struct ShopContext {
//!     users: RecordSet<User>,
//!     #[mock_handle]
//!     mock: Option<MockHandle>,
//! }
//!
//! let engine = Arrangements::new();
//! let shop = Preparer::new(&engine).create::<ShopContext>()?;
//!
//! shop.users.add(User { id: 1, name: "Alice".to_string() });
//! shop.orders(&engine).unwrap().add(Order { id: 10, user_id: 1 });
//!
//! // The generic accessor shares the member's store
//! assert_eq!(shop.record_set::<User>(&engine).unwrap().len(), 1);
//! ```

#[allow(unused_extern_crates)]
extern crate self as mockset;

pub mod prelude;

pub use mockset_core::{collection, context, error, key, mock, provider, query, queryable, record};

pub use mockset_core::{
    context::{ElementType, MemberSlot, RecordContext, RecordMember},
    mock::{MemberAccess, MockEngine, MockHandle},
    record::Record,
};
pub use mockset_macros::{Record, RecordContext};
pub use mockset_memory::RecordSet;

// Re-export BSON types for convenience
pub use bson;

/// In-memory implementations.
pub mod memory {
    pub use mockset_memory::{
        EntityEntry, EntryState, InMemoryQueryProvider, InMemoryStore, LocalView, MockEngineExt,
        Preparer, RecordSet, RecordSetBuilder, executor,
    };
}
