//! Convenient re-exports of commonly used types from mockset.
//!
//! ```ignore
//! use mockset::prelude::*;
//! ```
//!
//! This provides access to:
//! - Record traits and the derive macros
//! - Record sets, local views and their builders
//! - Query construction and filtering
//! - Context preparation and the bundled mocking engine
//! - Error types

pub use mockset_core::{
    collection::{BackingCollection, CollectionChange, ObservableCollection, SubscriptionId, VecCollection},
    context::{Installation, PrepareOptions, RecordContext, RecordMemberBinding},
    error::{MocksetError, MocksetResult},
    key::{IntoKey, KeyValue},
    mock::{Arrangements, Behavior, MemberAccess, MockEngine, MockHandle},
    provider::{AsyncCursor, AsyncQueryProvider, CancellationToken, QueryProvider},
    query::{Expr, FieldOp, Filter, Sort, SortDirection, Terminal},
    queryable::Query,
    record::{Record, RecordExt},
};
pub use mockset_macros::{Record, RecordContext};
pub use mockset_memory::{
    EntityEntry, EntryState, LocalView, MockEngineExt, Preparer, RecordSet, RecordSetBuilder,
};
