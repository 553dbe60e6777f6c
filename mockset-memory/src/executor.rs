//! Expression-tree execution against an in-memory sequence.
//!
//! Queries are composed against an abstract source and dispatched to the query provider. The
//! executor makes them runnable in three steps:
//!
//! 1. **Rewrite**: [`InMemoryRewriter`] walks the tree bottom-up, replaces the abstract
//!    [`Expression::Source`] root with a [`Expression::Constant`] snapshot of the store, and
//!    redirects every provider call to the equivalent in-memory sequence operation.
//! 2. **Compile**: the rewritten tree is lowered into a zero-argument callable. A tree that
//!    cannot be lowered (unbound source, provider calls left, asynchronous terminals, misplaced
//!    terminals) fails with [`MocksetError::Internal`].
//! 3. **Invoke**: the callable runs immediately. Nothing is cached between executions.
//!
//! Composition steps apply left to right. Ordering is a stable sort: rows with equal sort keys
//! keep their relative order.

use std::{cmp::Ordering, sync::Arc};

use bson::{Bson, Document};
use tracing::trace;

use mockset_core::{
    error::{MocksetError, MocksetResult},
    provider::{QueryOutput, Row},
    query::{
        Call, CallTarget, Expression, ExpressionVisitor, Method, Predicate, Projection, QueryOp,
        Sort, SortDirection, Terminal,
    },
    record::Record,
};

use crate::{
    evaluator::{RowEvaluator, compare_values, lookup, values_equal},
    store::InMemoryStore,
};

/// A compiled query, ready to be invoked once.
pub type CompiledQuery<T> = Box<dyn FnOnce() -> MocksetResult<QueryOutput<T>> + Send>;

/// Rewrites provider-bound calls into calls on a materialized sequence.
pub struct InMemoryRewriter<T> {
    source: Arc<[Arc<T>]>,
}

impl<T> InMemoryRewriter<T> {
    pub fn new(source: Arc<[Arc<T>]>) -> Self {
        Self { source }
    }
}

impl<T> ExpressionVisitor<T> for InMemoryRewriter<T> {
    type Output = Expression<T>;
    type Error = MocksetError;

    fn visit_source(&mut self) -> Result<Self::Output, Self::Error> {
        Ok(Expression::Constant(self.source.clone()))
    }

    fn visit_constant(&mut self, items: &Arc<[Arc<T>]>) -> Result<Self::Output, Self::Error> {
        Ok(Expression::Constant(items.clone()))
    }

    fn visit_call(&mut self, call: &Call<T>) -> Result<Self::Output, Self::Error> {
        let source = self.visit(&call.source)?;

        Ok(Expression::Call(Arc::new(Call {
            source,
            method: call.method.clone(),
            target: CallTarget::InMemory,
        })))
    }
}

/// A rewritten expression lowered into a linear pipeline.
struct Plan<T> {
    source: Arc<[Arc<T>]>,
    steps: Vec<QueryOp<T>>,
    terminal: Option<Terminal<T>>,
}

/// Lowers a rewritten expression into a callable.
///
/// # Errors
///
/// Returns [`MocksetError::Internal`] if the tree does not resolve to something invokable.
pub fn compile<T: Record>(expression: &Expression<T>) -> MocksetResult<CompiledQuery<T>> {
    let mut steps = Vec::new();
    let mut terminal = None;
    let mut current = expression;

    let source = loop {
        match current {
            Expression::Source => {
                return Err(MocksetError::Internal(
                    "query source is not bound to an in-memory sequence".to_string(),
                ));
            }
            Expression::Constant(items) => break items.clone(),
            Expression::Call(call) => {
                if call.target != CallTarget::InMemory {
                    return Err(MocksetError::Internal(format!(
                        "`{}` is still dispatched to the query provider",
                        call.method.name(),
                    )));
                }

                match &call.method {
                    Method::Compose(op) => steps.push(op.clone()),
                    Method::Terminal(t) if std::ptr::eq(current, expression) => {
                        terminal = Some(t.clone());
                    }
                    Method::Terminal(t) => {
                        return Err(MocksetError::Internal(format!(
                            "terminal `{}` cannot be composed further",
                            t.name(),
                        )));
                    }
                    Method::AsyncTerminal(t) => {
                        return Err(MocksetError::Internal(format!(
                            "asynchronous terminal `{}` must be rewritten before synchronous execution",
                            t.async_name(),
                        )));
                    }
                }

                current = &call.source;
            }
        }
    };

    steps.reverse();
    let plan = Plan {
        source,
        steps,
        terminal,
    };

    Ok(Box::new(move || plan.run()))
}

/// Executes expression trees against the contents of a store.
pub struct Executor<T> {
    store: InMemoryStore<T>,
}

impl<T: Record> Executor<T> {
    pub fn new(store: InMemoryStore<T>) -> Self {
        Self { store }
    }

    fn rewrite(&self, expression: &Expression<T>) -> MocksetResult<Expression<T>> {
        let source: Arc<[Arc<T>]> = self.store.snapshot().into();
        trace!(
            record = T::record_name(),
            rows = source.len(),
            depth = expression.depth(),
            "rewriting query for in-memory execution"
        );

        InMemoryRewriter::new(source).visit(expression)
    }

    /// Executes an expression closed by a synchronous terminal.
    pub fn execute(&self, expression: &Expression<T>) -> MocksetResult<QueryOutput<T>> {
        match expression.as_call() {
            Some(call) if call.method.is_terminal() => {}
            _ => {
                return Err(MocksetError::Internal(
                    "query was executed without a terminal operation".to_string(),
                ));
            }
        }

        compile(&self.rewrite(expression)?)?()
    }

    /// Evaluates a non-terminal expression into its rows.
    pub fn enumerate(&self, expression: &Expression<T>) -> MocksetResult<Vec<Row<T>>> {
        if let Some(call) = expression.as_call().filter(|call| call.method.is_terminal()) {
            return Err(MocksetError::Internal(format!(
                "cannot enumerate a query closed by `{}`",
                call.method.name(),
            )));
        }

        compile(&self.rewrite(expression)?)?()?.into_rows()
    }
}

impl<T> std::fmt::Debug for Executor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").field("store", &self.store).finish()
    }
}

impl<T: Record> Plan<T> {
    fn run(self) -> MocksetResult<QueryOutput<T>> {
        let mut rows = self
            .source
            .iter()
            .map(|record| Row::from_record(record.clone()))
            .collect::<Vec<_>>();
        let mut sort_keys: Vec<Sort> = Vec::new();

        for step in &self.steps {
            match step {
                QueryOp::Where(predicate) => rows = filter_rows(rows, predicate)?,
                QueryOp::Select(projection) => {
                    rows = rows
                        .into_iter()
                        .map(|row| Ok(Row::Value(project(row.view()?, projection))))
                        .collect::<MocksetResult<_>>()?;
                    sort_keys.clear();
                }
                QueryOp::OrderBy(sort) => {
                    sort_keys = vec![sort.clone()];
                    sort_rows(&mut rows, &sort_keys)?;
                }
                QueryOp::ThenBy(sort) => {
                    if sort_keys.is_empty() {
                        return Err(MocksetError::Internal(
                            "`then_by` must follow `order_by`".to_string(),
                        ));
                    }

                    sort_keys.push(sort.clone());
                    sort_rows(&mut rows, &sort_keys)?;
                }
                QueryOp::Skip(count) => {
                    rows.drain(..(*count).min(rows.len()));
                    sort_keys.clear();
                }
                QueryOp::Take(count) => {
                    rows.truncate(*count);
                    sort_keys.clear();
                }
                QueryOp::Distinct => {
                    let mut unique: Vec<Row<T>> = Vec::with_capacity(rows.len());
                    for row in rows {
                        let view = row.view()?;
                        let mut seen = false;
                        for kept in &unique {
                            if values_equal(kept.view()?, view) {
                                seen = true;
                                break;
                            }
                        }
                        if !seen {
                            unique.push(row);
                        }
                    }
                    rows = unique;
                    sort_keys.clear();
                }
            }
        }

        match self.terminal {
            None => Ok(QueryOutput::Rows(rows)),
            Some(terminal) => apply_terminal(rows, terminal),
        }
    }
}

fn test<T: Record>(predicate: &Predicate<T>, row: &Row<T>) -> MocksetResult<bool> {
    match predicate {
        Predicate::Expr(expr) => RowEvaluator::matches(row.view()?, expr),
        Predicate::Fn(f) => match row.record() {
            Some(record) => Ok(f(record)),
            None => Err(MocksetError::Internal(
                "closure predicates cannot be applied to projected rows".to_string(),
            )),
        },
    }
}

fn filter_rows<T: Record>(rows: Vec<Row<T>>, predicate: &Predicate<T>) -> MocksetResult<Vec<Row<T>>> {
    let mut kept = Vec::with_capacity(rows.len());

    for row in rows {
        if test(predicate, &row)? {
            kept.push(row);
        }
    }

    Ok(kept)
}

fn project(view: &Bson, projection: &Projection) -> Bson {
    match projection {
        Projection::Field(field) => lookup(view, field).cloned().unwrap_or(Bson::Null),
        Projection::Fields(fields) => Bson::Document(
            fields
                .iter()
                .filter_map(|field| lookup(view, field).map(|value| (field.clone(), value.clone())))
                .collect::<Document>(),
        ),
    }
}

fn sort_rows<T: Record>(rows: &mut Vec<Row<T>>, keys: &[Sort]) -> MocksetResult<()> {
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows.drain(..) {
        let view = row.view()?;
        let values = keys
            .iter()
            .map(|key| lookup(view, &key.field).cloned().unwrap_or(Bson::Null))
            .collect::<Vec<_>>();
        keyed.push((values, row));
    }

    keyed.sort_by(|(a, _), (b, _)| {
        keys.iter()
            .zip(a.iter().zip(b))
            .map(|(key, (left, right))| match key.direction {
                SortDirection::Asc => compare_values(left, right),
                SortDirection::Desc => compare_values(right, left),
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    rows.extend(keyed.into_iter().map(|(_, row)| row));

    Ok(())
}

/// The value an aggregate reads from a row. An empty field name reads the row itself, which is
/// what a query projected with `select_field` aggregates over.
fn aggregate_value<'a>(view: &'a Bson, field: &str) -> Option<&'a Bson> {
    if field.is_empty() {
        Some(view)
    } else {
        lookup(view, field)
    }
}

fn field_values<'a, T: Record>(rows: &'a [Row<T>], field: &str) -> MocksetResult<Vec<&'a Bson>> {
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(value) = aggregate_value(row.view()?, field) {
            values.push(value);
        }
    }

    Ok(values)
}

fn numeric_values<'a, T: Record>(
    rows: &'a [Row<T>],
    field: &str,
) -> MocksetResult<impl Iterator<Item = &'a Bson>> {
    Ok(field_values(rows, field)?
        .into_iter()
        .filter(|value| matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))))
}

fn sum<T: Record>(rows: &[Row<T>], field: &str) -> MocksetResult<Bson> {
    let mut integer: i64 = 0;
    let mut float: f64 = 0.0;
    let mut widest = 0_u8;

    for value in numeric_values(rows, field)? {
        let addend = match value {
            Bson::Int32(v) => i64::from(*v),
            Bson::Int64(v) => {
                widest = widest.max(1);
                *v
            }
            Bson::Double(v) => {
                float += v;
                widest = 2;
                continue;
            }
            _ => continue,
        };

        integer = integer.checked_add(addend).ok_or_else(|| {
            MocksetError::InvalidOperation(format!("arithmetic overflow summing `{field}`"))
        })?;
    }

    Ok(match widest {
        2 => Bson::Double(float + integer as f64),
        1 => Bson::Int64(integer),
        _ => i32::try_from(integer)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(integer)),
    })
}

fn extreme<T: Record>(rows: &[Row<T>], field: &str, wanted: Ordering) -> MocksetResult<Bson> {
    field_values(rows, field)?
        .into_iter()
        .filter(|value| !matches!(value, Bson::Null))
        .fold(None::<&Bson>, |best, value| match best {
            Some(current) if compare_values(value, current) != wanted => Some(current),
            _ => Some(value),
        })
        .cloned()
        .ok_or_else(MocksetError::no_elements)
}

fn average<T: Record>(rows: &[Row<T>], field: &str) -> MocksetResult<Bson> {
    let (total, count) = numeric_values(rows, field)?.fold((0.0, 0_u64), |(total, count), value| {
        let value = match value {
            Bson::Int32(v) => *v as f64,
            Bson::Int64(v) => *v as f64,
            Bson::Double(v) => *v,
            _ => 0.0,
        };

        (total + value, count + 1)
    });

    match count {
        0 => Err(MocksetError::no_elements()),
        count => Ok(Bson::Double(total / count as f64)),
    }
}

fn single<T>(mut rows: Vec<Row<T>>) -> MocksetResult<Option<Row<T>>> {
    match rows.len() {
        0 | 1 => Ok(rows.pop()),
        _ => Err(MocksetError::more_than_one_element()),
    }
}

fn apply_terminal<T: Record>(rows: Vec<Row<T>>, terminal: Terminal<T>) -> MocksetResult<QueryOutput<T>> {
    let required = |row: Option<Row<T>>| match row {
        Some(row) => Ok(QueryOutput::Row(Some(row))),
        None => Err(MocksetError::no_elements()),
    };

    match terminal {
        Terminal::Count | Terminal::LongCount => Ok(QueryOutput::Count(rows.len() as u64)),
        Terminal::Any => Ok(QueryOutput::Bool(!rows.is_empty())),
        Terminal::AnyWhere(predicate) => {
            for row in &rows {
                if test(&predicate, row)? {
                    return Ok(QueryOutput::Bool(true));
                }
            }
            Ok(QueryOutput::Bool(false))
        }
        Terminal::All(predicate) => {
            for row in &rows {
                if !test(&predicate, row)? {
                    return Ok(QueryOutput::Bool(false));
                }
            }
            Ok(QueryOutput::Bool(true))
        }
        Terminal::Contains(value) => {
            for row in &rows {
                if values_equal(row.view()?, &value) {
                    return Ok(QueryOutput::Bool(true));
                }
            }
            Ok(QueryOutput::Bool(false))
        }
        Terminal::First => required(rows.into_iter().next()),
        Terminal::FirstOrDefault => Ok(QueryOutput::Row(rows.into_iter().next())),
        Terminal::Single => required(single(rows)?),
        Terminal::SingleOrDefault => Ok(QueryOutput::Row(single(rows)?)),
        Terminal::Last => required(rows.into_iter().last()),
        Terminal::LastOrDefault => Ok(QueryOutput::Row(rows.into_iter().last())),
        Terminal::ToList => Ok(QueryOutput::Rows(rows)),
        Terminal::Sum(field) => Ok(QueryOutput::Scalar(sum(&rows, &field)?)),
        Terminal::Min(field) => Ok(QueryOutput::Scalar(extreme(&rows, &field, Ordering::Less)?)),
        Terminal::Max(field) => Ok(QueryOutput::Scalar(extreme(
            &rows,
            &field,
            Ordering::Greater,
        )?)),
        Terminal::Average(field) => Ok(QueryOutput::Scalar(average(&rows, &field)?)),
    }
}
