//! Query provider abstraction.
//!
//! Query handles never evaluate anything themselves: intermediate steps ask their provider to
//! wrap the extended expression in a new handle, and terminal steps ask it to execute the tree.
//!
//! # Traits
//!
//! - [`QueryProvider`]: synchronous execution and enumeration
//! - [`AsyncQueryProvider`]: the asynchronous surface on top of it
//! - [`QueryElement`]: how a result row is read back as a query's element type
//!
//! Asynchronous operations in this crate are a compatibility surface. Providers finish all the
//! work before returning, so every future they hand out is already resolved, and an
//! [`AsyncCursor`] advances over rows that were materialized up front.

use std::{
    fmt,
    pin::Pin,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use async_trait::async_trait;
use bson::Bson;
use futures::{
    Stream,
    future::{Ready, ready},
};

use crate::{
    error::{MocksetError, MocksetResult},
    query::Expression,
    queryable::Query,
    record::{Record, RecordExt},
};

/// One row flowing through query evaluation.
#[derive(Debug)]
pub enum Row<T> {
    /// A stored record. Its BSON view is computed on first use.
    Record {
        record: Arc<T>,
        view: Arc<OnceLock<Bson>>,
    },
    /// A projected value.
    Value(Bson),
}

impl<T> Clone for Row<T> {
    fn clone(&self) -> Self {
        match self {
            Row::Record { record, view } => Row::Record {
                record: record.clone(),
                view: view.clone(),
            },
            Row::Value(value) => Row::Value(value.clone()),
        }
    }
}

impl<T> Row<T> {
    /// Creates a record row. The record is not serialized until its view is needed.
    pub fn from_record(record: Arc<T>) -> Self {
        Row::Record {
            record,
            view: Arc::new(OnceLock::new()),
        }
    }

    /// The stored record, if this row was not projected.
    pub fn record(&self) -> Option<&Arc<T>> {
        match self {
            Row::Record { record, .. } => Some(record),
            Row::Value(_) => None,
        }
    }
}

impl<T: Record> Row<T> {
    /// The BSON view expressions are evaluated against.
    ///
    /// # Errors
    ///
    /// Returns [`MocksetError::Serialization`] if the record has no BSON representation.
    pub fn view(&self) -> MocksetResult<&Bson> {
        match self {
            Row::Record { record, view } => {
                if let Some(view) = view.get() {
                    return Ok(view);
                }

                let computed = record.to_bson()?;
                Ok(view.get_or_init(|| computed))
            }
            Row::Value(value) => Ok(value),
        }
    }

    /// Consumes the row, returning its BSON view.
    pub fn into_bson(self) -> MocksetResult<Bson> {
        match self {
            Row::Value(value) => Ok(value),
            row => row.view().cloned(),
        }
    }
}

/// The result of executing a terminal expression.
#[derive(Debug)]
pub enum QueryOutput<T> {
    Count(u64),
    Bool(bool),
    Row(Option<Row<T>>),
    Rows(Vec<Row<T>>),
    Scalar(Bson),
}

impl<T> QueryOutput<T> {
    /// Name of the result shape, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryOutput::Count(_) => "count",
            QueryOutput::Bool(_) => "bool",
            QueryOutput::Row(_) => "row",
            QueryOutput::Rows(_) => "rows",
            QueryOutput::Scalar(_) => "scalar",
        }
    }

    fn mismatch(self, expected: &str) -> MocksetError {
        MocksetError::Internal(format!(
            "query produced a {} result where a {expected} result was expected",
            self.kind(),
        ))
    }

    pub fn into_count(self) -> MocksetResult<u64> {
        match self {
            QueryOutput::Count(count) => Ok(count),
            other => Err(other.mismatch("count")),
        }
    }

    pub fn into_bool(self) -> MocksetResult<bool> {
        match self {
            QueryOutput::Bool(value) => Ok(value),
            other => Err(other.mismatch("bool")),
        }
    }

    pub fn into_row(self) -> MocksetResult<Option<Row<T>>> {
        match self {
            QueryOutput::Row(row) => Ok(row),
            other => Err(other.mismatch("row")),
        }
    }

    pub fn into_rows(self) -> MocksetResult<Vec<Row<T>>> {
        match self {
            QueryOutput::Rows(rows) => Ok(rows),
            other => Err(other.mismatch("rows")),
        }
    }

    pub fn into_scalar(self) -> MocksetResult<Bson> {
        match self {
            QueryOutput::Scalar(value) => Ok(value),
            other => Err(other.mismatch("scalar")),
        }
    }
}

/// An element type a query can yield.
///
/// Record queries yield `Arc<T>`, so results are the stored records themselves.
/// Projected queries yield `Bson`.
pub trait QueryElement<T>: Sized + Send + 'static {
    fn from_row(row: Row<T>) -> MocksetResult<Self>;
}

impl<T: Record> QueryElement<T> for Arc<T> {
    fn from_row(row: Row<T>) -> MocksetResult<Self> {
        match row {
            Row::Record { record, .. } => Ok(record),
            Row::Value(value) => Err(MocksetError::Internal(format!(
                "projected value {value} cannot be read back as a {} record",
                T::record_name(),
            ))),
        }
    }
}

impl<T: Record> QueryElement<T> for Bson {
    fn from_row(row: Row<T>) -> MocksetResult<Self> {
        row.into_bson()
    }
}

/// A cancellation signal accepted by asynchronous operations.
///
/// All asynchronous work completes before it is returned, so providers accept the token
/// for interface compatibility and never check it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Synchronous query execution.
pub trait QueryProvider<T: Record>: Send + Sync {
    /// Wraps an extended expression into a new lazy query handle. Does not evaluate.
    fn create_query(self: Arc<Self>, expression: Expression<T>) -> Query<T>;

    /// Executes an expression closed by a terminal.
    fn execute(&self, expression: &Expression<T>) -> MocksetResult<QueryOutput<T>>;

    /// Evaluates a non-terminal expression into its rows.
    fn enumerate(&self, expression: &Expression<T>) -> MocksetResult<Vec<Row<T>>>;
}

/// Asynchronous query execution, resolved eagerly.
#[async_trait]
pub trait AsyncQueryProvider<T: Record>: QueryProvider<T> {
    /// Executes an expression closed by an asynchronous (or synchronous) terminal.
    async fn execute_async(
        &self,
        expression: &Expression<T>,
        cancellation: &CancellationToken,
    ) -> MocksetResult<QueryOutput<T>>;

    /// Evaluates a non-terminal expression and exposes its rows through an async cursor.
    fn enumerate_async(&self, expression: &Expression<T>) -> MocksetResult<AsyncCursor<Row<T>>>;
}

/// Asynchronous iteration over rows materialized up front.
///
/// Every advance completes immediately. Disposing the cursor drops the underlying iterator;
/// advancing a disposed cursor reports the end of the sequence.
pub struct AsyncCursor<E> {
    inner: Option<Box<dyn Iterator<Item = E> + Send>>,
    current: Option<E>,
}

impl<E: Send + 'static> AsyncCursor<E> {
    pub fn new(iter: impl Iterator<Item = E> + Send + 'static) -> Self {
        Self {
            inner: Some(Box::new(iter)),
            current: None,
        }
    }

    /// Advances to the next element. Resolves to `false` at the end of the sequence.
    pub fn move_next_async(&mut self) -> Ready<bool> {
        self.current = self.inner.as_mut().and_then(|iter| iter.next());

        ready(self.current.is_some())
    }

    /// The element the cursor is positioned on.
    pub fn current(&self) -> Option<&E> {
        self.current.as_ref()
    }

    /// Releases the underlying iterator.
    pub fn dispose_async(&mut self) -> Ready<()> {
        self.inner = None;
        self.current = None;

        ready(())
    }

    /// Returns `true` once the cursor has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.is_none()
    }

    /// Converts every remaining element, failing on the first conversion error.
    pub fn try_map<U, F>(mut self, mut f: F) -> MocksetResult<AsyncCursor<U>>
    where
        U: Send + 'static,
        F: FnMut(E) -> MocksetResult<U>,
    {
        let items = match self.inner.take() {
            Some(iter) => iter.map(&mut f).collect::<MocksetResult<Vec<U>>>()?,
            None => Vec::new(),
        };

        Ok(AsyncCursor::new(items.into_iter()))
    }
}

impl<E: Unpin> Stream for AsyncCursor<E> {
    type Item = E;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        Poll::Ready(this.inner.as_mut().and_then(|iter| iter.next()))
    }
}

impl<E> fmt::Debug for AsyncCursor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCursor")
            .field("disposed", &self.inner.is_none())
            .field("positioned", &self.current.is_some())
            .finish()
    }
}
