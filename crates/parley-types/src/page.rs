//! Cursor pagination types.
//!
//! Lists are ordered by a timestamp and then by row id, both descending. The
//! cursor carries that pair for the last row on a page, and the next page
//! selects rows strictly after it in the same order. Rows that share a
//! timestamp are split by id, so none is skipped or repeated at a page
//! boundary, and rows inserted between fetches can never shift it.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Position of the last row on a page: its sort timestamp and its id.
///
/// Text form is `<rfc3339 timestamp>_<uuid>`, as printed by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn new(at: DateTime<Utc>, id: Uuid) -> Self {
        Self { at, id }
    }

    /// Whether a row at `(at, id)` comes after this cursor in descending
    /// `(timestamp, id)` order.
    pub fn precedes(&self, at: DateTime<Utc>, id: Uuid) -> bool {
        (at, id) < (self.at, self.id)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.at.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.id
        )
    }
}

impl FromStr for Cursor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (at, id) = s
            .rsplit_once('_')
            .ok_or_else(|| format!("invalid cursor '{s}': expected <timestamp>_<id>"))?;
        let at = DateTime::parse_from_rfc3339(at)
            .map_err(|e| format!("invalid cursor timestamp '{at}': {e}"))?
            .with_timezone(&Utc);
        let id = Uuid::parse_str(id).map_err(|e| format!("invalid cursor id '{id}': {e}"))?;
        Ok(Self { at, id })
    }
}

/// Paging parameters for a list query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Maximum rows to return. `None` uses the configured default.
    pub limit: Option<i64>,
    /// Exclusive bound from a previous page.
    pub cursor: Option<Cursor>,
}

impl PageRequest {
    pub fn first(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            cursor: None,
        }
    }

    pub fn after(limit: i64, cursor: Cursor) -> Self {
        Self {
            limit: Some(limit),
            cursor: Some(cursor),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present only when more rows exist past this page.
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    /// Build a page from `limit + 1` fetched rows.
    ///
    /// The extra row is only a marker that another page exists; it is
    /// trimmed and never returned.
    pub fn from_overfetch(mut rows: Vec<T>, limit: usize, cursor_of: impl Fn(&T) -> Cursor) -> Self {
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more {
            rows.last().map(cursor_of)
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
