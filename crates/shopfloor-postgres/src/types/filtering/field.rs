//! Per-column filter conditions.
//!
//! Each filter is a single condition; combine several through the model's
//! `And`/`Or`/`Not` variants.

use jiff::Timestamp;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{CmpOp, ScalarValue};
use crate::{PgError, PgResult};

/// Case sensitivity of a text match.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Compare as stored (`LIKE`, `=`).
    #[default]
    Default,
    /// Compare ignoring case (`ILIKE`).
    Insensitive,
}

/// Condition on a text column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum StringFilter {
    /// Exact match.
    Equals(String, QueryMode),
    /// Value is one of the list.
    In(Vec<String>),
    /// Value is none of the list.
    NotIn(Vec<String>),
    /// Lexically less than.
    Lt(String),
    /// Lexically less than or equal.
    Lte(String),
    /// Lexically greater than.
    Gt(String),
    /// Lexically greater than or equal.
    Gte(String),
    /// Contains the substring.
    Contains(String, QueryMode),
    /// Starts with the prefix.
    StartsWith(String, QueryMode),
    /// Ends with the suffix.
    EndsWith(String, QueryMode),
    /// Negation of the inner condition.
    Not(Box<StringFilter>),
}

impl StringFilter {
    /// Exact, case-sensitive match.
    pub fn equals(value: impl Into<String>) -> Self {
        Self::Equals(value.into(), QueryMode::Default)
    }

    /// Substring match.
    pub fn contains(value: impl Into<String>) -> Self {
        Self::Contains(value.into(), QueryMode::Default)
    }

    /// Prefix match.
    pub fn starts_with(value: impl Into<String>) -> Self {
        Self::StartsWith(value.into(), QueryMode::Default)
    }

    /// Suffix match.
    pub fn ends_with(value: impl Into<String>) -> Self {
        Self::EndsWith(value.into(), QueryMode::Default)
    }

    /// Membership in a list.
    pub fn any_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::In(values.into_iter().map(Into::into).collect())
    }

    /// Negates this condition.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Switches a pattern or equality match to case-insensitive mode.
    ///
    /// Conditions without a mode are returned unchanged.
    pub fn insensitive(self) -> Self {
        match self {
            Self::Equals(value, _) => Self::Equals(value, QueryMode::Insensitive),
            Self::Contains(value, _) => Self::Contains(value, QueryMode::Insensitive),
            Self::StartsWith(value, _) => Self::StartsWith(value, QueryMode::Insensitive),
            Self::EndsWith(value, _) => Self::EndsWith(value, QueryMode::Insensitive),
            Self::Not(inner) => Self::Not(Box::new(inner.insensitive())),
            other => other,
        }
    }
}

/// Condition on an ordered scalar column (integers, booleans, timestamps).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum ScalarFilter<T> {
    /// Exact match.
    Equals(T),
    /// Value is one of the list.
    In(Vec<T>),
    /// Value is none of the list.
    NotIn(Vec<T>),
    /// Less than.
    Lt(T),
    /// Less than or equal.
    Lte(T),
    /// Greater than.
    Gt(T),
    /// Greater than or equal.
    Gte(T),
    /// Negation of the inner condition.
    Not(Box<ScalarFilter<T>>),
}

/// Condition on an integer column.
pub type IntFilter = ScalarFilter<i32>;

/// Condition on a boolean column.
pub type BoolFilter = ScalarFilter<bool>;

/// Condition on a timestamp column.
pub type DateTimeFilter = ScalarFilter<Timestamp>;

impl<T> ScalarFilter<T> {
    /// Negates this condition.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }
}

/// Condition on a nullable column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum NullableFilter<F> {
    /// Column is `NULL`.
    IsNull,
    /// Column is not `NULL`.
    IsNotNull,
    /// Column is not `NULL` and satisfies the inner condition.
    Value(F),
}

impl<F> From<F> for NullableFilter<F> {
    fn from(filter: F) -> Self {
        Self::Value(filter)
    }
}

/// Condition on a `text[]` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum StringListFilter {
    /// The list contains the value.
    Has(String),
    /// The list contains every value.
    HasEvery(Vec<String>),
    /// The list contains at least one of the values.
    HasSome(Vec<String>),
    /// The list is empty (`true`) or non-empty (`false`).
    IsEmpty(bool),
    /// The list equals the given list, order included.
    Equals(Vec<String>),
}

/// Converts a comparison against a dynamic value back into a typed filter.
///
/// Cursor pagination uses this to express "after the cursor row" for any
/// ordered field.
pub trait CompareFilter: Sized {
    /// Builds the filter `column <op> value`.
    fn compare(op: CmpOp, value: ScalarValue) -> PgResult<Self>;
}

fn mismatch(expected: &'static str, value: &ScalarValue) -> PgError {
    PgError::validation(format!(
        "expected a {expected} value, found {}",
        value.type_name()
    ))
}

impl CompareFilter for StringFilter {
    fn compare(op: CmpOp, value: ScalarValue) -> PgResult<Self> {
        let ScalarValue::Text(value) = value else {
            return Err(mismatch("text", &value));
        };

        Ok(match op {
            CmpOp::Eq => Self::equals(value),
            CmpOp::Ne => Self::equals(value).not(),
            CmpOp::Lt => Self::Lt(value),
            CmpOp::Lte => Self::Lte(value),
            CmpOp::Gt => Self::Gt(value),
            CmpOp::Gte => Self::Gte(value),
        })
    }
}

fn scalar_compare<T>(op: CmpOp, value: T) -> ScalarFilter<T> {
    match op {
        CmpOp::Eq => ScalarFilter::Equals(value),
        CmpOp::Ne => ScalarFilter::Equals(value).not(),
        CmpOp::Lt => ScalarFilter::Lt(value),
        CmpOp::Lte => ScalarFilter::Lte(value),
        CmpOp::Gt => ScalarFilter::Gt(value),
        CmpOp::Gte => ScalarFilter::Gte(value),
    }
}

impl CompareFilter for ScalarFilter<i32> {
    fn compare(op: CmpOp, value: ScalarValue) -> PgResult<Self> {
        let ScalarValue::Int(raw) = value else {
            return Err(mismatch("int", &value));
        };

        let value = i32::try_from(raw)
            .map_err(|_| PgError::validation(format!("{raw} does not fit a 32-bit column")))?;
        Ok(scalar_compare(op, value))
    }
}

impl CompareFilter for ScalarFilter<bool> {
    fn compare(op: CmpOp, value: ScalarValue) -> PgResult<Self> {
        let ScalarValue::Bool(value) = value else {
            return Err(mismatch("bool", &value));
        };

        Ok(scalar_compare(op, value))
    }
}

impl CompareFilter for ScalarFilter<Timestamp> {
    fn compare(op: CmpOp, value: ScalarValue) -> PgResult<Self> {
        let ScalarValue::Timestamp(value) = value else {
            return Err(mismatch("timestamp", &value));
        };

        Ok(scalar_compare(op, value))
    }
}

impl CompareFilter for StringListFilter {
    fn compare(op: CmpOp, value: ScalarValue) -> PgResult<Self> {
        match (op, value) {
            (CmpOp::Eq, ScalarValue::TextList(values)) => Ok(Self::Equals(values)),
            (CmpOp::Eq, other) => Err(mismatch("text[]", &other)),
            _ => Err(PgError::validation("list fields only support equality")),
        }
    }
}

impl<F: CompareFilter> CompareFilter for NullableFilter<F> {
    fn compare(op: CmpOp, value: ScalarValue) -> PgResult<Self> {
        match (op, value) {
            (CmpOp::Eq, ScalarValue::Null) => Ok(Self::IsNull),
            (CmpOp::Ne, ScalarValue::Null) => Ok(Self::IsNotNull),
            (_, ScalarValue::Null) => Err(PgError::validation(
                "null can only be compared for equality",
            )),
            (op, value) => F::compare(op, value).map(Self::Value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insensitive_switches_mode_through_not() {
        let filter = StringFilter::contains("Ford").not().insensitive();
        assert_eq!(
            filter,
            StringFilter::Not(Box::new(StringFilter::Contains(
                "Ford".into(),
                QueryMode::Insensitive
            )))
        );
    }

    #[test]
    fn compare_builds_typed_filters() {
        let filter = StringFilter::compare(CmpOp::Gt, ScalarValue::from("m")).unwrap();
        assert_eq!(filter, StringFilter::Gt("m".into()));

        let filter = IntFilter::compare(CmpOp::Lte, ScalarValue::Int(9)).unwrap();
        assert_eq!(filter, IntFilter::Lte(9));

        assert!(IntFilter::compare(CmpOp::Eq, ScalarValue::from("9")).is_err());
        assert!(IntFilter::compare(CmpOp::Eq, ScalarValue::Int(i64::MAX)).is_err());
    }

    #[test]
    fn nullable_compare_handles_null() {
        let filter = NullableFilter::<StringFilter>::compare(CmpOp::Eq, ScalarValue::Null);
        assert_eq!(filter.unwrap(), NullableFilter::IsNull);

        let filter = NullableFilter::<StringFilter>::compare(CmpOp::Ne, ScalarValue::Null);
        assert_eq!(filter.unwrap(), NullableFilter::IsNotNull);

        let filter = NullableFilter::<StringFilter>::compare(CmpOp::Gt, ScalarValue::Null);
        assert!(filter.is_err());
    }
}
