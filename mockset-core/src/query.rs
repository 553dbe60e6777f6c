//! Query expression trees and the filter expression API.
//!
//! A query is an immutable [`Expression`] tree. Every composition step (`filter`, `select`,
//! `order_by`, `take`, ...) wraps the previous tree in a new [`Call`] node, and a terminal step
//! (`count`, `first`, `to_list`, ...) closes it. Trees share structure through `Arc`, so
//! extending a query never mutates the query it was built from.
//!
//! Calls composed by client code target the abstract query provider
//! ([`CallTarget::Provider`]). Before execution the in-memory executor rewrites them into calls
//! on an already materialized sequence ([`CallTarget::InMemory`]) and replaces the
//! [`Expression::Source`] root with an [`Expression::Constant`] snapshot.
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides a collection of static methods for building filter expressions
//! over a record's fields:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Array: `any_of`, `none_of`
//! - Logical: `and`, `or`
//!
//! ```ignore
//! use mockset::query::Filter;
//!
//! let adults = people
//!     .query()
//!     .filter(Filter::gte("age", 18).and(Filter::starts_with("name", "A")))
//!     .order_by("name")
//!     .to_list()?;
//! ```

use std::{fmt, sync::Arc};

use bson::Bson;

use crate::error::MocksetError;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// A sort key: which field to order by and in which direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self { field: field.into(), direction }
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String or array contains value.
    Contains,
    /// String or array does not contain value.
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Array contains any of the values.
    AnyOf,
    /// Array contains none of the values.
    NoneOf,
}

/// A filter expression over the fields of a record (or of a projected row).
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>` for ergonomics.
pub struct Filter;

impl Filter {
    /// Matches rows where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches rows where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches rows where the field is greater than the specified value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches rows where the field is greater than or equal to the specified value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches rows where the field is less than the specified value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches rows where the field is less than or equal to the specified value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches rows where the string field starts with the specified value.
    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// Matches rows where the string field ends with the specified value.
    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// Matches rows where the field (string or array) contains the specified value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Matches rows where the field (string or array) does not contain the specified value.
    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    /// Matches rows where the field exists.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches rows where the field does not exist.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Combines multiple expressions such that all must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines multiple expressions such that any can match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches rows where the field contains, or is, any of the specified values.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// Matches rows where the field contains, or is, none of the specified values.
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }
}

/// Visitor over filter expressions, implemented by row evaluators.
pub trait QueryVisitor {
    type Output;
    type Error: Into<MocksetError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// A row predicate: a field expression, or a closure over the typed record.
///
/// Closure predicates only apply to record rows; applying one after a projection fails
/// at execution time.
pub enum Predicate<T> {
    Expr(Expr),
    Fn(Arc<dyn Fn(&T) -> bool + Send + Sync>),
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Expr(expr) => Predicate::Expr(expr.clone()),
            Predicate::Fn(f) => Predicate::Fn(f.clone()),
        }
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Expr(expr) => f.debug_tuple("Expr").field(expr).finish(),
            Predicate::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

impl<T> From<Expr> for Predicate<T> {
    fn from(expr: Expr) -> Self {
        Predicate::Expr(expr)
    }
}

/// The shape of a `select` step.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Keep the listed fields; each row becomes a document holding only those fields.
    Fields(Vec<String>),
    /// Replace each row with the value of a single field.
    Field(String),
}

/// A non-terminal composition step.
#[derive(Debug)]
pub enum QueryOp<T> {
    Where(Predicate<T>),
    Select(Projection),
    OrderBy(Sort),
    ThenBy(Sort),
    Skip(usize),
    Take(usize),
    Distinct,
}

impl<T> Clone for QueryOp<T> {
    fn clone(&self) -> Self {
        match self {
            QueryOp::Where(predicate) => QueryOp::Where(predicate.clone()),
            QueryOp::Select(projection) => QueryOp::Select(projection.clone()),
            QueryOp::OrderBy(sort) => QueryOp::OrderBy(sort.clone()),
            QueryOp::ThenBy(sort) => QueryOp::ThenBy(sort.clone()),
            QueryOp::Skip(count) => QueryOp::Skip(*count),
            QueryOp::Take(count) => QueryOp::Take(*count),
            QueryOp::Distinct => QueryOp::Distinct,
        }
    }
}

impl<T> QueryOp<T> {
    /// The operation name as it appears in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            QueryOp::Where(_) => "where",
            QueryOp::Select(_) => "select",
            QueryOp::OrderBy(_) => "order_by",
            QueryOp::ThenBy(_) => "then_by",
            QueryOp::Skip(_) => "skip",
            QueryOp::Take(_) => "take",
            QueryOp::Distinct => "distinct",
        }
    }
}

/// A terminal operation: triggers evaluation and produces a concrete result.
#[derive(Debug)]
pub enum Terminal<T> {
    Count,
    LongCount,
    Any,
    AnyWhere(Predicate<T>),
    All(Predicate<T>),
    Contains(Bson),
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Last,
    LastOrDefault,
    ToList,
    Sum(String),
    Min(String),
    Max(String),
    Average(String),
}

impl<T> Clone for Terminal<T> {
    fn clone(&self) -> Self {
        match self {
            Terminal::Count => Terminal::Count,
            Terminal::LongCount => Terminal::LongCount,
            Terminal::Any => Terminal::Any,
            Terminal::AnyWhere(predicate) => Terminal::AnyWhere(predicate.clone()),
            Terminal::All(predicate) => Terminal::All(predicate.clone()),
            Terminal::Contains(value) => Terminal::Contains(value.clone()),
            Terminal::First => Terminal::First,
            Terminal::FirstOrDefault => Terminal::FirstOrDefault,
            Terminal::Single => Terminal::Single,
            Terminal::SingleOrDefault => Terminal::SingleOrDefault,
            Terminal::Last => Terminal::Last,
            Terminal::LastOrDefault => Terminal::LastOrDefault,
            Terminal::ToList => Terminal::ToList,
            Terminal::Sum(field) => Terminal::Sum(field.clone()),
            Terminal::Min(field) => Terminal::Min(field.clone()),
            Terminal::Max(field) => Terminal::Max(field.clone()),
            Terminal::Average(field) => Terminal::Average(field.clone()),
        }
    }
}

impl<T> Terminal<T> {
    /// The synchronous method name of this terminal.
    pub fn name(&self) -> &'static str {
        match self {
            Terminal::Count => "count",
            Terminal::LongCount => "long_count",
            Terminal::Any | Terminal::AnyWhere(_) => "any",
            Terminal::All(_) => "all",
            Terminal::Contains(_) => "contains",
            Terminal::First => "first",
            Terminal::FirstOrDefault => "first_or_default",
            Terminal::Single => "single",
            Terminal::SingleOrDefault => "single_or_default",
            Terminal::Last => "last",
            Terminal::LastOrDefault => "last_or_default",
            Terminal::ToList => "to_list",
            Terminal::Sum(_) => "sum",
            Terminal::Min(_) => "min",
            Terminal::Max(_) => "max",
            Terminal::Average(_) => "average",
        }
    }

    /// The asynchronous method name of this terminal.
    pub fn async_name(&self) -> &'static str {
        let name = self.name();

        ASYNC_TERMINAL_REWRITES
            .iter()
            .find(|(_, sync)| *sync == name)
            .map(|(async_name, _)| *async_name)
            .unwrap_or(name)
    }
}

/// Async terminal method names and the synchronous terminals they are rewritten to.
pub const ASYNC_TERMINAL_REWRITES: &[(&str, &str)] = &[
    ("count_async", "count"),
    ("long_count_async", "long_count"),
    ("to_list_async", "to_list"),
    ("first_async", "first"),
    ("first_or_default_async", "first_or_default"),
    ("single_async", "single"),
    ("single_or_default_async", "single_or_default"),
    ("last_async", "last"),
    ("last_or_default_async", "last_or_default"),
    ("any_async", "any"),
    ("all_async", "all"),
    ("contains_async", "contains"),
    ("sum_async", "sum"),
    ("min_async", "min"),
    ("max_async", "max"),
    ("average_async", "average"),
];

/// Returns the synchronous terminal an async terminal name is rewritten to.
pub fn sync_equivalent(async_name: &str) -> Option<&'static str> {
    ASYNC_TERMINAL_REWRITES
        .iter()
        .find(|(name, _)| *name == async_name)
        .map(|(_, sync)| *sync)
}

/// The method invoked by a [`Call`] node.
#[derive(Debug)]
pub enum Method<T> {
    /// A composition step.
    Compose(QueryOp<T>),
    /// A synchronous terminal.
    Terminal(Terminal<T>),
    /// An asynchronous terminal; must be rewritten before the synchronous executor can run it.
    AsyncTerminal(Terminal<T>),
}

impl<T> Clone for Method<T> {
    fn clone(&self) -> Self {
        match self {
            Method::Compose(op) => Method::Compose(op.clone()),
            Method::Terminal(terminal) => Method::Terminal(terminal.clone()),
            Method::AsyncTerminal(terminal) => Method::AsyncTerminal(terminal.clone()),
        }
    }
}

impl<T> Method<T> {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Compose(op) => op.name(),
            Method::Terminal(terminal) => terminal.name(),
            Method::AsyncTerminal(terminal) => terminal.async_name(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Method::Compose(_))
    }
}

/// Who a [`Call`] is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// The abstract query provider, as composed by client code.
    Provider,
    /// The in-memory sequence operations, after rewriting.
    InMemory,
}

/// A method call node in an expression tree.
#[derive(Debug)]
pub struct Call<T> {
    pub source: Expression<T>,
    pub method: Method<T>,
    pub target: CallTarget,
}

/// An immutable, structurally shared query expression tree.
#[derive(Debug)]
pub enum Expression<T> {
    /// The abstract queryable root a query was composed against.
    Source,
    /// An already materialized in-memory sequence.
    Constant(Arc<[Arc<T>]>),
    /// A method call on another expression.
    Call(Arc<Call<T>>),
}

impl<T> Clone for Expression<T> {
    fn clone(&self) -> Self {
        match self {
            Expression::Source => Expression::Source,
            Expression::Constant(items) => Expression::Constant(items.clone()),
            Expression::Call(call) => Expression::Call(call.clone()),
        }
    }
}

impl<T> Expression<T> {
    /// Returns the root expression of a new query.
    pub fn source() -> Self {
        Expression::Source
    }

    /// Extends this tree with a call dispatched to the query provider.
    pub fn call(&self, method: Method<T>) -> Self {
        Expression::Call(Arc::new(Call {
            source: self.clone(),
            method,
            target: CallTarget::Provider,
        }))
    }

    /// Extends this tree with a composition step.
    pub fn compose(&self, op: QueryOp<T>) -> Self {
        self.call(Method::Compose(op))
    }

    /// Closes this tree with a synchronous terminal.
    pub fn terminate(&self, terminal: Terminal<T>) -> Self {
        self.call(Method::Terminal(terminal))
    }

    /// Closes this tree with an asynchronous terminal.
    pub fn terminate_async(&self, terminal: Terminal<T>) -> Self {
        self.call(Method::AsyncTerminal(terminal))
    }

    /// Returns the top call of this tree, if any.
    pub fn as_call(&self) -> Option<&Call<T>> {
        match self {
            Expression::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Number of call nodes between this expression and its root.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;

        while let Expression::Call(call) = current {
            depth += 1;
            current = &call.source;
        }

        depth
    }
}

/// Visitor over expression trees.
///
/// Rewriters implement this with `Output = Expression<T>`; [`ExpressionVisitor::visit`]
/// dispatches on the node kind.
pub trait ExpressionVisitor<T> {
    type Output;
    type Error: Into<MocksetError>;

    fn visit_source(&mut self) -> Result<Self::Output, Self::Error>;
    fn visit_constant(&mut self, items: &Arc<[Arc<T>]>) -> Result<Self::Output, Self::Error>;
    fn visit_call(&mut self, call: &Call<T>) -> Result<Self::Output, Self::Error>;

    fn visit(&mut self, expression: &Expression<T>) -> Result<Self::Output, Self::Error> {
        match expression {
            Expression::Source => self.visit_source(),
            Expression::Constant(items) => self.visit_constant(items),
            Expression::Call(call) => self.visit_call(call),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_helpers_build_field_expressions() {
        let expr = Filter::eq("name", "Ada").and(Filter::gt("age", 30)).and(Filter::exists("email"));

        match expr {
            Expr::And(list) => {
                assert_eq!(list.len(), 3);
                assert_eq!(list[0], Expr::field("name".into(), FieldOp::Eq, Bson::from("Ada")));
                assert_eq!(list[2], Expr::Exists("email".into(), true));
            }
            other => panic!("expected AND, got {other:?}"),
        }
    }

    #[test]
    fn composing_never_mutates_the_parent_tree() {
        let root = Expression::<()>::source();
        let filtered = root.compose(QueryOp::Where(Filter::eq("a", 1).into()));
        let taken = filtered.compose(QueryOp::Take(2));
        let skipped = filtered.compose(QueryOp::Skip(1));

        assert_eq!(root.depth(), 0);
        assert_eq!(filtered.depth(), 1);
        assert_eq!(taken.depth(), 2);
        assert_eq!(skipped.as_call().unwrap().method.name(), "skip");
        assert_eq!(taken.as_call().unwrap().method.name(), "take");
        assert_eq!(taken.as_call().unwrap().target, CallTarget::Provider);
    }

    #[test]
    fn async_rewrite_table_covers_documented_terminals() {
        for (async_name, sync_name) in [
            ("count_async", "count"),
            ("to_list_async", "to_list"),
            ("first_async", "first"),
            ("first_or_default_async", "first_or_default"),
            ("single_async", "single"),
            ("single_or_default_async", "single_or_default"),
            ("any_async", "any"),
            ("all_async", "all"),
        ] {
            assert_eq!(sync_equivalent(async_name), Some(sync_name));
        }

        assert_eq!(sync_equivalent("count"), None);
        assert_eq!(Terminal::<()>::FirstOrDefault.async_name(), "first_or_default_async");
    }
}
