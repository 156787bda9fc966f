//! Keyset pagination over `(created_at, id)`.
//!
//! Used by the bespoke listings; the generic delegate resolves its cursor
//! from a unique selector instead.

use base64::prelude::*;
use jiff::Timestamp;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum number of items per page.
pub const MAX_LIMIT: i64 = 100;

/// Position in a listing ordered by `created_at DESC, id DESC`.
///
/// The id breaks ties between rows created in the same microsecond.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(into = "String", try_from = "String")]
pub struct Cursor {
    /// Timestamp of the last seen row.
    pub timestamp: Timestamp,
    /// Id of the last seen row.
    pub id: String,
}

impl Cursor {
    /// Creates a new cursor from a timestamp and id.
    pub fn new(timestamp: Timestamp, id: impl Into<String>) -> Self {
        Self {
            timestamp,
            id: id.into(),
        }
    }

    /// Encodes the cursor as a URL-safe base64 string.
    pub fn encode(&self) -> String {
        let data = format!("{}|{}", self.timestamp, self.id);
        BASE64_URL_SAFE_NO_PAD.encode(data.as_bytes())
    }

    /// Decodes a cursor produced by [`Cursor::encode`].
    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(encoded).ok()?;
        let data = String::from_utf8(bytes).ok()?;
        let (timestamp, id) = data.split_once('|')?;
        if id.is_empty() {
            return None;
        }

        Some(Self {
            timestamp: timestamp.parse().ok()?,
            id: id.to_owned(),
        })
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        cursor.encode()
    }
}

impl TryFrom<String> for Cursor {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Cursor::decode(&value).ok_or("invalid cursor format")
    }
}

/// Cursor pagination parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct CursorPagination {
    /// Maximum number of records to return.
    pub limit: i64,
    /// Cursor pointing at the last row of the previous page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Cursor>,
    /// Whether to run the extra `COUNT(*)` query.
    #[serde(default)]
    pub include_count: bool,
}

impl CursorPagination {
    /// First page with the given limit.
    pub fn new(limit: i64) -> Self {
        Self {
            limit: limit.clamp(1, MAX_LIMIT),
            after: None,
            include_count: false,
        }
    }

    /// Page starting after `cursor`.
    pub fn after(limit: i64, cursor: Cursor) -> Self {
        Self {
            after: Some(cursor),
            ..Self::new(limit)
        }
    }

    /// Page starting after an encoded cursor. An invalid cursor starts over.
    pub fn from_cursor_string(limit: i64, cursor: Option<&str>) -> Self {
        Self {
            after: cursor.and_then(Cursor::decode),
            ..Self::new(limit)
        }
    }

    /// Enables the total count.
    pub fn with_count(mut self) -> Self {
        self.include_count = true;
        self
    }

    /// Number of rows to fetch: one more than the limit, to detect a next page.
    pub fn fetch_limit(&self) -> i64 {
        self.limit + 1
    }

    /// Returns whether a cursor was given.
    pub fn has_cursor(&self) -> bool {
        self.after.is_some()
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct CursorPage<T> {
    /// Rows of this page.
    pub items: Vec<T>,
    /// Total number of matching rows, when requested.
    pub total: Option<i64>,
    /// Cursor of the next page, absent on the last page.
    pub next_cursor: Option<String>,
}

impl<T> CursorPage<T> {
    /// Builds a page from up to `limit + 1` fetched rows.
    ///
    /// `cursor_fn` extracts the `(created_at, id)` key of a row.
    pub fn new<F>(mut items: Vec<T>, total: Option<i64>, limit: i64, cursor_fn: F) -> Self
    where
        F: Fn(&T) -> (Timestamp, String),
    {
        let has_more = items.len() as i64 > limit;
        if has_more {
            items.pop();
        }

        let next_cursor = has_more
            .then(|| items.last())
            .flatten()
            .map(|item| {
                let (timestamp, id) = cursor_fn(item);
                Cursor::new(timestamp, id).encode()
            });

        Self {
            items,
            total,
            next_cursor,
        }
    }

    /// Creates an empty page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: Some(0),
            next_cursor: None,
        }
    }

    /// Returns whether another page exists.
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    /// Maps the rows to a different type.
    pub fn map<U, F>(self, f: F) -> CursorPage<U>
    where
        F: FnMut(T) -> U,
    {
        CursorPage {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            next_cursor: self.next_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn key(_: &i32) -> (Timestamp, String) {
        (Timestamp::UNIX_EPOCH, "row".to_owned())
    }

    #[test]
    fn cursor_survives_encoding() {
        let cursor = Cursor::new(Timestamp::now(), Uuid::now_v7().to_string());
        let decoded = Cursor::decode(&cursor.encode()).expect("decode should succeed");
        assert_eq!(cursor, decoded);
    }

    #[test]
    fn cursor_decode_rejects_garbage() {
        assert!(Cursor::decode("invalid").is_none());
        assert!(Cursor::decode("").is_none());

        let missing_id = BASE64_URL_SAFE_NO_PAD.encode("2025-01-01T00:00:00Z|");
        assert!(Cursor::decode(&missing_id).is_none());
    }

    #[test]
    fn pagination_clamps_limit() {
        assert_eq!(CursorPagination::new(0).limit, 1);
        assert_eq!(CursorPagination::new(500).limit, MAX_LIMIT);
        assert_eq!(CursorPagination::new(50).fetch_limit(), 51);
    }

    #[test]
    fn invalid_cursor_string_starts_over() {
        let pagination = CursorPagination::from_cursor_string(10, Some("!!"));
        assert!(!pagination.has_cursor());
        assert_eq!(pagination.limit, 10);
    }

    #[test]
    fn page_drops_the_lookahead_row() {
        let page = CursorPage::new((1..=11).collect(), None, 10, key);
        assert_eq!(page.items.len(), 10);
        assert!(page.has_more());

        let next = Cursor::decode(page.next_cursor.as_deref().unwrap()).unwrap();
        assert_eq!(next.id, "row");
    }

    #[test]
    fn last_page_has_no_cursor() {
        let page = CursorPage::new((1..=3).collect(), Some(3), 10, key);
        assert_eq!(page.items.len(), 3);
        assert!(!page.has_more());
        assert_eq!(page.total, Some(3));
    }
}
