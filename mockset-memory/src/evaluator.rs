//! Filter expression evaluation and value comparison over BSON row views.
//!
//! Every row a query sees is observed through its BSON view. This module decides whether a row
//! matches a filter [`Expr`], and provides the value comparisons the executor sorts, deduplicates,
//! aggregates and matches keys with.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, datetime::DateTime};

use mockset_core::{
    error::MocksetError,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64, so `Int32(1)`, `Int64(1)` and `Double(1.0)` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    /// All integers and floats normalized to f64.
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other BSON value, compared by its raw representation.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    /// Rank used to order values of different kinds: null first, then booleans, numbers,
    /// strings, dates, arrays, documents and everything else.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Bool(_) => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::DateTime(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::Map(_) => 6,
            Comparable::Other(_) => 7,
        }
    }

    /// A total order over all values, used for sorting and min/max.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => a.total_cmp(b),
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => self
                .partial_cmp(other)
                .unwrap_or_else(|| self.rank().cmp(&other.rank())),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Value equality with numeric normalization.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Total order over BSON values with numeric normalization.
pub(crate) fn compare_values(left: &Bson, right: &Bson) -> Ordering {
    Comparable::from(left).total_cmp(&Comparable::from(right))
}

/// Looks up a field of a row view. Dotted paths descend into nested documents.
pub(crate) fn lookup<'a>(view: &'a Bson, field: &str) -> Option<&'a Bson> {
    field.split('.').try_fold(view, |current, segment| {
        current.as_document().and_then(|doc| doc.get(segment))
    })
}

/// Evaluates filter expressions against one row view.
///
/// Rows that are not documents (projected scalars) have no fields: field comparisons never match
/// and `exists` is always false.
pub(crate) struct RowEvaluator<'a> {
    view: &'a Bson,
}

impl<'a> RowEvaluator<'a> {
    pub fn new(view: &'a Bson) -> Self {
        Self { view }
    }

    pub fn matches(view: &'a Bson, expr: &Expr) -> Result<bool, MocksetError> {
        Self::new(view).visit_expr(expr)
    }
}

fn contains_value(array: &[Comparable<'_>], value: &Comparable<'_>) -> bool {
    array.iter().any(|item| item == value)
}

fn any_of(field: Comparable<'_>, values: Comparable<'_>) -> bool {
    match (field, values) {
        (Comparable::Array(array), Comparable::Array(values)) => {
            values.iter().any(|value| contains_value(&array, value))
        }
        (Comparable::Array(array), single) => contains_value(&array, &single),
        (single, Comparable::Array(values)) => contains_value(&values, &single),
        (left, right) => left == right,
    }
}

impl QueryVisitor for RowEvaluator<'_> {
    type Output = bool;
    type Error = MocksetError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.view, field).is_some() == should_exist)
    }

    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = lookup(self.view, field) else {
            // Missing fields only satisfy the negative operators.
            return Ok(matches!(op, FieldOp::Ne | FieldOp::NotContains | FieldOp::NoneOf));
        };
        let left = Comparable::from(field_value);
        let right = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => left == right,
            FieldOp::Ne => left != right,
            FieldOp::Gt => left.partial_cmp(&right) == Some(Ordering::Greater),
            FieldOp::Gte => matches!(
                left.partial_cmp(&right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FieldOp::Lt => left.partial_cmp(&right) == Some(Ordering::Less),
            FieldOp::Lte => matches!(
                left.partial_cmp(&right),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FieldOp::Contains => match (left, right) {
                (Comparable::Array(array), item) => contains_value(&array, &item),
                (Comparable::String(haystack), Comparable::String(needle)) => {
                    haystack.contains(needle)
                }
                _ => false,
            },
            FieldOp::NotContains => match (left, right) {
                (Comparable::Array(array), item) => !contains_value(&array, &item),
                (Comparable::String(haystack), Comparable::String(needle)) => {
                    !haystack.contains(needle)
                }
                _ => true,
            },
            FieldOp::StartsWith => match (left, right) {
                (Comparable::String(s), Comparable::String(prefix)) => s.starts_with(prefix),
                _ => false,
            },
            FieldOp::EndsWith => match (left, right) {
                (Comparable::String(s), Comparable::String(suffix)) => s.ends_with(suffix),
                _ => false,
            },
            FieldOp::AnyOf => any_of(left, right),
            FieldOp::NoneOf => !any_of(left, right),
        })
    }
}
