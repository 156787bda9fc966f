//! Dynamically typed column values.
//!
//! Projections, cursors and aggregate results need to carry a column value
//! without knowing the model statically. [`ScalarValue`] is that carrier, and
//! [`ScalarField`] is implemented by every per-model field enum.

use std::fmt;

use bigdecimal::BigDecimal;
use jiff::Timestamp;
use serde::Serialize;

/// A single column value.
///
/// Ordering follows the variant order first (`Null` sorts before everything),
/// then the natural ordering of the payload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// SQL `NULL`.
    Null,
    /// Boolean column value.
    Bool(bool),
    /// Integer column value, widened to 64 bits.
    Int(i64),
    /// Exact decimal, produced by averages.
    Decimal(BigDecimal),
    /// Text column value.
    Text(String),
    /// Timestamp column value.
    Timestamp(Timestamp),
    /// Text array column value.
    TextList(Vec<String>),
}

impl ScalarValue {
    /// Returns whether this value is `NULL`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Returns the value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Returns a short name of the value's type, used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "null",
            ScalarValue::Bool(_) => "bool",
            ScalarValue::Int(_) => "int",
            ScalarValue::Decimal(_) => "decimal",
            ScalarValue::Text(_) => "text",
            ScalarValue::Timestamp(_) => "timestamp",
            ScalarValue::TextList(_) => "text[]",
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Bool(value) => write!(f, "{value}"),
            ScalarValue::Int(value) => write!(f, "{value}"),
            ScalarValue::Decimal(value) => write!(f, "{value}"),
            ScalarValue::Text(value) => f.write_str(value),
            ScalarValue::Timestamp(value) => write!(f, "{value}"),
            ScalarValue::TextList(values) => write!(f, "{{{}}}", values.join(",")),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Bool(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int(i64::from(value))
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int(value)
    }
}

impl From<BigDecimal> for ScalarValue {
    fn from(value: BigDecimal) -> Self {
        ScalarValue::Decimal(value)
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Text(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_owned())
    }
}

impl From<Timestamp> for ScalarValue {
    fn from(value: Timestamp) -> Self {
        ScalarValue::Timestamp(value)
    }
}

impl From<jiff_diesel::Timestamp> for ScalarValue {
    fn from(value: jiff_diesel::Timestamp) -> Self {
        ScalarValue::Timestamp(Timestamp::from(value))
    }
}

impl From<Vec<String>> for ScalarValue {
    fn from(value: Vec<String>) -> Self {
        ScalarValue::TextList(value)
    }
}

impl<T> From<Option<T>> for ScalarValue
where
    T: Into<ScalarValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(ScalarValue::Null, Into::into)
    }
}

/// Storage kind of a scalar column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `text`
    Text,
    /// `integer`
    Int,
    /// `boolean`
    Bool,
    /// `timestamptz`
    Timestamp,
    /// `text[]`
    TextList,
}

/// Comparison operator used when a value is turned back into a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `<>`, or `IS NOT NULL` against a null value.
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
}

impl CmpOp {
    /// Returns the strict operator pointing in the given direction.
    #[inline]
    pub fn strict(ascending: bool) -> Self {
        if ascending { CmpOp::Gt } else { CmpOp::Lt }
    }
}

/// Implemented by the per-model scalar field enums.
pub trait ScalarField:
    fmt::Debug + fmt::Display + Copy + Eq + Ord + std::hash::Hash + Send + Sync + Serialize + 'static
{
    /// Every scalar field of the model in declaration order.
    const ALL: &'static [Self];

    /// Column name of the field.
    fn name(self) -> &'static str;

    /// Storage kind of the field.
    fn kind(self) -> FieldKind;

    /// Whether the column accepts `NULL`.
    fn is_nullable(self) -> bool;

    /// Whether `_avg` and `_sum` accept this field.
    #[inline]
    fn is_numeric(self) -> bool {
        self.kind() == FieldKind::Int
    }

    /// Whether `_min`, `_max` and ordering accept this field.
    #[inline]
    fn is_comparable(self) -> bool {
        self.kind() != FieldKind::TextList
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_first() {
        let mut values = vec![
            ScalarValue::Text("b".into()),
            ScalarValue::Null,
            ScalarValue::Text("a".into()),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                ScalarValue::Null,
                ScalarValue::Text("a".into()),
                ScalarValue::Text("b".into()),
            ]
        );
    }

    #[test]
    fn options_map_to_null() {
        assert_eq!(ScalarValue::from(None::<String>), ScalarValue::Null);
        assert_eq!(ScalarValue::from(Some(7_i32)), ScalarValue::Int(7));
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_string(&ScalarValue::Text("x".into())).unwrap();
        assert_eq!(json, "\"x\"");
        let json = serde_json::to_string(&ScalarValue::Null).unwrap();
        assert_eq!(json, "null");
    }
}
