//! The asynchronous compatibility adapter.
//!
//! [`InMemoryQueryProvider`] is the query provider every record set hands its queries to. It
//! wraps the synchronous [`Executor`] and adds the asynchronous surface on top of it:
//!
//! - `execute_async` rewrites every asynchronous terminal into its synchronous equivalent, as
//!   listed in [`mockset_core::query::ASYNC_TERMINAL_REWRITES`], runs the executor, and returns
//!   the result through a future that is complete before it is first polled. Failures surface
//!   through the same future.
//! - `enumerate_async` evaluates the query and exposes the rows through an [`AsyncCursor`].
//!
//! Each call evaluates afresh against the current store contents; no cursor or result is shared
//! between calls. Cancellation tokens are accepted and never observed.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, trace};

use mockset_core::{
    error::{MocksetError, MocksetResult},
    provider::{AsyncCursor, AsyncQueryProvider, CancellationToken, QueryOutput, QueryProvider, Row},
    query::{Call, Expression, ExpressionVisitor, Method, sync_equivalent},
    queryable::Query,
    record::Record,
};

use crate::{executor::Executor, store::InMemoryStore};

/// Rewrites asynchronous terminals into their synchronous equivalents.
#[derive(Debug, Default)]
pub struct AsyncTerminalRewriter {
    rewritten: usize,
}

impl AsyncTerminalRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls rewritten so far.
    pub fn rewritten(&self) -> usize {
        self.rewritten
    }
}

impl<T> ExpressionVisitor<T> for AsyncTerminalRewriter {
    type Output = Expression<T>;
    type Error = MocksetError;

    fn visit_source(&mut self) -> Result<Self::Output, Self::Error> {
        Ok(Expression::Source)
    }

    fn visit_constant(&mut self, items: &Arc<[Arc<T>]>) -> Result<Self::Output, Self::Error> {
        Ok(Expression::Constant(items.clone()))
    }

    fn visit_call(&mut self, call: &Call<T>) -> Result<Self::Output, Self::Error> {
        let source = self.visit(&call.source)?;
        let method = match &call.method {
            Method::AsyncTerminal(terminal) => {
                let async_name = terminal.async_name();
                let sync_name = sync_equivalent(async_name)
                    .filter(|name| *name == terminal.name())
                    .ok_or_else(|| {
                        MocksetError::Internal(format!(
                            "asynchronous terminal `{async_name}` has no synchronous equivalent"
                        ))
                    })?;

                trace!(from = async_name, to = sync_name, "rewrote asynchronous terminal");
                self.rewritten += 1;
                Method::Terminal(terminal.clone())
            }
            method => method.clone(),
        };

        Ok(Expression::Call(Arc::new(Call {
            source,
            method,
            target: call.target,
        })))
    }
}

/// The query provider of an in-memory record set.
pub struct InMemoryQueryProvider<T> {
    executor: Executor<T>,
}

impl<T: Record> InMemoryQueryProvider<T> {
    pub fn new(store: InMemoryStore<T>) -> Self {
        Self {
            executor: Executor::new(store),
        }
    }

    fn rewrite_async(&self, expression: &Expression<T>) -> MocksetResult<Expression<T>> {
        let mut rewriter = AsyncTerminalRewriter::new();
        let rewritten = rewriter.visit(expression)?;
        debug!(
            record = T::record_name(),
            rewritten = rewriter.rewritten(),
            "prepared asynchronous query for synchronous execution"
        );

        Ok(rewritten)
    }
}

impl<T: Record> QueryProvider<T> for InMemoryQueryProvider<T> {
    fn create_query(self: Arc<Self>, expression: Expression<T>) -> Query<T> {
        Query::new(self, expression)
    }

    fn execute(&self, expression: &Expression<T>) -> MocksetResult<QueryOutput<T>> {
        self.executor.execute(expression)
    }

    fn enumerate(&self, expression: &Expression<T>) -> MocksetResult<Vec<Row<T>>> {
        self.executor.enumerate(expression)
    }
}

#[async_trait]
impl<T: Record> AsyncQueryProvider<T> for InMemoryQueryProvider<T> {
    async fn execute_async(
        &self,
        expression: &Expression<T>,
        _cancellation: &CancellationToken,
    ) -> MocksetResult<QueryOutput<T>> {
        let rewritten = self.rewrite_async(expression)?;

        self.executor.execute(&rewritten)
    }

    fn enumerate_async(&self, expression: &Expression<T>) -> MocksetResult<AsyncCursor<Row<T>>> {
        Ok(AsyncCursor::new(
            self.executor.enumerate(expression)?.into_iter(),
        ))
    }
}

impl<T> fmt::Debug for InMemoryQueryProvider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryQueryProvider")
            .field("executor", &self.executor)
            .finish()
    }
}
