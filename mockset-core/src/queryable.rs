//! Lazy, immutable query handles.
//!
//! A [`Query`] pairs an expression tree with the provider that will evaluate it. Composition
//! methods return a new handle wrapping an extended tree; the handle they were called on is
//! left untouched and can keep being extended independently. Terminal methods hand the closed
//! tree to the provider and return a concrete result.
//!
//! The element type parameter tracks what the query yields: `Arc<T>` (the stored records
//! themselves) until a `select` step, `Bson` after it.
//!
//! # Example
//!
//! ```ignore
//! use mockset::prelude::*;
//!
//! let query = people.query().filter(Filter::gt("age", 30));
//! let oldest = query.order_by_desc("age").first()?;
//! let names = query.select_field("name").to_list()?;
//! let total = query.count_async().await?;
//! ```

use std::{fmt, marker::PhantomData, sync::Arc};

use bson::{Bson, de::deserialize_from_bson};
use serde::de::DeserializeOwned;

use crate::{
    error::{MocksetError, MocksetResult},
    provider::{
        AsyncCursor, AsyncQueryProvider, CancellationToken, QueryElement, QueryOutput, Row,
    },
    query::{Expr, Expression, Predicate, Projection, QueryOp, Sort, SortDirection, Terminal},
    record::Record,
};

/// An immutable query over records of type `T`, yielding elements of type `E`.
pub struct Query<T: Record, E = Arc<T>> {
    provider: Arc<dyn AsyncQueryProvider<T>>,
    expression: Expression<T>,
    _element: PhantomData<fn() -> E>,
}

impl<T: Record, E> Clone for Query<T, E> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            expression: self.expression.clone(),
            _element: PhantomData,
        }
    }
}

impl<T: Record, E> fmt::Debug for Query<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("record", &T::record_name())
            .field("depth", &self.expression.depth())
            .finish()
    }
}

impl<T: Record> Query<T> {
    /// Creates a record query over `expression`, evaluated by `provider`.
    ///
    /// Providers call this from [`QueryProvider::create_query`](crate::provider::QueryProvider::create_query).
    pub fn new(provider: Arc<dyn AsyncQueryProvider<T>>, expression: Expression<T>) -> Self {
        Self {
            provider,
            expression,
            _element: PhantomData,
        }
    }

    /// Filters records with a closure over the typed record.
    pub fn filter_by<F>(&self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.compose(QueryOp::Where(Predicate::Fn(Arc::new(predicate))))
    }

    /// Returns `true` if any record satisfies the closure.
    pub fn any_by<F>(&self, predicate: F) -> MocksetResult<bool>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.execute(Terminal::AnyWhere(Predicate::Fn(Arc::new(predicate))))?
            .into_bool()
    }

    /// Returns `true` if every record satisfies the closure.
    pub fn all_by<F>(&self, predicate: F) -> MocksetResult<bool>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.execute(Terminal::All(Predicate::Fn(Arc::new(predicate))))?
            .into_bool()
    }

    /// Returns `true` if this exact record instance is part of the result.
    pub fn contains_record(&self, record: &Arc<T>) -> MocksetResult<bool> {
        let target = record.clone();

        self.any_by(move |candidate| std::ptr::eq(candidate, Arc::as_ptr(&target)))
    }
}

impl<T: Record> Query<T, Bson> {
    /// Deserializes every projected value into `U`.
    pub fn to_list_as<U: DeserializeOwned>(&self) -> MocksetResult<Vec<U>> {
        self.to_list()?
            .into_iter()
            .map(|value| Ok(deserialize_from_bson(value)?))
            .collect()
    }
}

impl<T: Record, E: QueryElement<T>> Query<T, E> {
    /// The expression tree this handle wraps.
    pub fn expression(&self) -> &Expression<T> {
        &self.expression
    }

    /// The provider evaluating this query.
    pub fn provider(&self) -> &Arc<dyn AsyncQueryProvider<T>> {
        &self.provider
    }

    fn retype<U>(query: Query<T>) -> Query<T, U> {
        Query {
            provider: query.provider,
            expression: query.expression,
            _element: PhantomData,
        }
    }

    fn compose_as<U>(&self, op: QueryOp<T>) -> Query<T, U> {
        let expression = self.expression.compose(op);

        Self::retype(self.provider.clone().create_query(expression))
    }

    fn compose(&self, op: QueryOp<T>) -> Self {
        self.compose_as(op)
    }

    fn execute(&self, terminal: Terminal<T>) -> MocksetResult<QueryOutput<T>> {
        self.provider.execute(&self.expression.terminate(terminal))
    }

    async fn execute_async(&self, terminal: Terminal<T>) -> MocksetResult<QueryOutput<T>> {
        let expression = self.expression.terminate_async(terminal);

        self.provider
            .execute_async(&expression, &CancellationToken::default())
            .await
    }

    fn element(row: Option<Row<T>>) -> MocksetResult<Option<E>> {
        row.map(E::from_row).transpose()
    }

    fn required(row: Option<Row<T>>) -> MocksetResult<E> {
        Self::element(row)?.ok_or_else(MocksetError::no_elements)
    }

    fn elements(rows: Vec<Row<T>>) -> MocksetResult<Vec<E>> {
        rows.into_iter().map(E::from_row).collect()
    }

    // Composition

    /// Keeps the rows matching a field expression.
    pub fn filter(&self, expr: Expr) -> Self {
        self.compose(QueryOp::Where(Predicate::Expr(expr)))
    }

    /// Projects every row onto a document holding only `fields`.
    pub fn select<I, S>(&self, fields: I) -> Query<T, Bson>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields.into_iter().map(Into::into).collect();

        self.compose_as(QueryOp::Select(Projection::Fields(fields)))
    }

    /// Replaces every row with the value of `field`.
    pub fn select_field(&self, field: impl Into<String>) -> Query<T, Bson> {
        self.compose_as(QueryOp::Select(Projection::Field(field.into())))
    }

    /// Orders rows by `field` ascending, discarding any previous ordering.
    pub fn order_by(&self, field: impl Into<String>) -> Self {
        self.compose(QueryOp::OrderBy(Sort::new(field, SortDirection::Asc)))
    }

    /// Orders rows by `field` descending, discarding any previous ordering.
    pub fn order_by_desc(&self, field: impl Into<String>) -> Self {
        self.compose(QueryOp::OrderBy(Sort::new(field, SortDirection::Desc)))
    }

    /// Adds an ascending tie-breaker to the current ordering.
    pub fn then_by(&self, field: impl Into<String>) -> Self {
        self.compose(QueryOp::ThenBy(Sort::new(field, SortDirection::Asc)))
    }

    /// Adds a descending tie-breaker to the current ordering.
    pub fn then_by_desc(&self, field: impl Into<String>) -> Self {
        self.compose(QueryOp::ThenBy(Sort::new(field, SortDirection::Desc)))
    }

    pub fn skip(&self, count: usize) -> Self {
        self.compose(QueryOp::Skip(count))
    }

    pub fn take(&self, count: usize) -> Self {
        self.compose(QueryOp::Take(count))
    }

    /// Drops rows whose view equals an earlier row's view.
    pub fn distinct(&self) -> Self {
        self.compose(QueryOp::Distinct)
    }

    // Synchronous terminals

    pub fn count(&self) -> MocksetResult<usize> {
        Ok(self.execute(Terminal::Count)?.into_count()? as usize)
    }

    pub fn long_count(&self) -> MocksetResult<u64> {
        self.execute(Terminal::LongCount)?.into_count()
    }

    pub fn any(&self) -> MocksetResult<bool> {
        self.execute(Terminal::Any)?.into_bool()
    }

    pub fn any_where(&self, expr: Expr) -> MocksetResult<bool> {
        self.execute(Terminal::AnyWhere(expr.into()))?.into_bool()
    }

    pub fn all(&self, expr: Expr) -> MocksetResult<bool> {
        self.execute(Terminal::All(expr.into()))?.into_bool()
    }

    /// Returns `true` if a row's view equals `value`. Numeric values compare across widths.
    pub fn contains(&self, value: impl Into<Bson>) -> MocksetResult<bool> {
        self.execute(Terminal::Contains(value.into()))?.into_bool()
    }

    /// Returns the first row, failing if there is none.
    pub fn first(&self) -> MocksetResult<E> {
        Self::required(self.execute(Terminal::First)?.into_row()?)
    }

    pub fn first_or_default(&self) -> MocksetResult<Option<E>> {
        Self::element(self.execute(Terminal::FirstOrDefault)?.into_row()?)
    }

    /// Returns the only row, failing if there are none or more than one.
    pub fn single(&self) -> MocksetResult<E> {
        Self::required(self.execute(Terminal::Single)?.into_row()?)
    }

    /// Returns the only row or `None`, failing if there is more than one.
    pub fn single_or_default(&self) -> MocksetResult<Option<E>> {
        Self::element(self.execute(Terminal::SingleOrDefault)?.into_row()?)
    }

    pub fn last(&self) -> MocksetResult<E> {
        Self::required(self.execute(Terminal::Last)?.into_row()?)
    }

    pub fn last_or_default(&self) -> MocksetResult<Option<E>> {
        Self::element(self.execute(Terminal::LastOrDefault)?.into_row()?)
    }

    /// Materializes the query.
    pub fn to_list(&self) -> MocksetResult<Vec<E>> {
        Self::elements(self.execute(Terminal::ToList)?.into_rows()?)
    }

    /// Sums the numeric values of `field`. Non-numeric and missing values are skipped.
    pub fn sum(&self, field: impl Into<String>) -> MocksetResult<Bson> {
        self.execute(Terminal::Sum(field.into()))?.into_scalar()
    }

    pub fn min(&self, field: impl Into<String>) -> MocksetResult<Bson> {
        self.execute(Terminal::Min(field.into()))?.into_scalar()
    }

    pub fn max(&self, field: impl Into<String>) -> MocksetResult<Bson> {
        self.execute(Terminal::Max(field.into()))?.into_scalar()
    }

    pub fn average(&self, field: impl Into<String>) -> MocksetResult<f64> {
        scalar_to_f64(self.execute(Terminal::Average(field.into()))?.into_scalar()?)
    }

    /// Evaluates the query and iterates over a snapshot of its rows.
    pub fn iter(&self) -> MocksetResult<std::vec::IntoIter<E>> {
        Ok(Self::elements(self.provider.enumerate(&self.expression)?)?.into_iter())
    }

    // Asynchronous terminals

    pub async fn count_async(&self) -> MocksetResult<usize> {
        Ok(self.execute_async(Terminal::Count).await?.into_count()? as usize)
    }

    pub async fn long_count_async(&self) -> MocksetResult<u64> {
        self.execute_async(Terminal::LongCount).await?.into_count()
    }

    pub async fn any_async(&self) -> MocksetResult<bool> {
        self.execute_async(Terminal::Any).await?.into_bool()
    }

    pub async fn all_async(&self, expr: Expr) -> MocksetResult<bool> {
        self.execute_async(Terminal::All(expr.into())).await?.into_bool()
    }

    pub async fn contains_async(&self, value: impl Into<Bson>) -> MocksetResult<bool> {
        self.execute_async(Terminal::Contains(value.into()))
            .await?
            .into_bool()
    }

    pub async fn first_async(&self) -> MocksetResult<E> {
        Self::required(self.execute_async(Terminal::First).await?.into_row()?)
    }

    pub async fn first_or_default_async(&self) -> MocksetResult<Option<E>> {
        Self::element(
            self.execute_async(Terminal::FirstOrDefault)
                .await?
                .into_row()?,
        )
    }

    pub async fn single_async(&self) -> MocksetResult<E> {
        Self::required(self.execute_async(Terminal::Single).await?.into_row()?)
    }

    pub async fn single_or_default_async(&self) -> MocksetResult<Option<E>> {
        Self::element(
            self.execute_async(Terminal::SingleOrDefault)
                .await?
                .into_row()?,
        )
    }

    pub async fn last_async(&self) -> MocksetResult<E> {
        Self::required(self.execute_async(Terminal::Last).await?.into_row()?)
    }

    pub async fn last_or_default_async(&self) -> MocksetResult<Option<E>> {
        Self::element(
            self.execute_async(Terminal::LastOrDefault)
                .await?
                .into_row()?,
        )
    }

    pub async fn to_list_async(&self) -> MocksetResult<Vec<E>> {
        Self::elements(self.execute_async(Terminal::ToList).await?.into_rows()?)
    }

    pub async fn sum_async(&self, field: impl Into<String>) -> MocksetResult<Bson> {
        self.execute_async(Terminal::Sum(field.into()))
            .await?
            .into_scalar()
    }

    pub async fn min_async(&self, field: impl Into<String>) -> MocksetResult<Bson> {
        self.execute_async(Terminal::Min(field.into()))
            .await?
            .into_scalar()
    }

    pub async fn max_async(&self, field: impl Into<String>) -> MocksetResult<Bson> {
        self.execute_async(Terminal::Max(field.into()))
            .await?
            .into_scalar()
    }

    pub async fn average_async(&self, field: impl Into<String>) -> MocksetResult<f64> {
        scalar_to_f64(
            self.execute_async(Terminal::Average(field.into()))
                .await?
                .into_scalar()?,
        )
    }

    /// Evaluates the query and exposes its rows through an [`AsyncCursor`].
    ///
    /// Every call evaluates afresh; cursors never share state.
    pub fn into_async_iter(self) -> MocksetResult<AsyncCursor<E>> {
        self.provider
            .enumerate_async(&self.expression)?
            .try_map(E::from_row)
    }
}

fn scalar_to_f64(value: Bson) -> MocksetResult<f64> {
    match value {
        Bson::Double(value) => Ok(value),
        Bson::Int32(value) => Ok(value as f64),
        Bson::Int64(value) => Ok(value as f64),
        other => Err(MocksetError::Internal(format!(
            "average produced a non-numeric value {other}"
        ))),
    }
}
