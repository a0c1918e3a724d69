//! Builders for request parameters.
//!
//! [`QueryParams`] assembles URL query pairs from optional values; [`SearchQuery`]
//! models the paging envelope accepted by the appliance's `search*` endpoints.

use serde::Serialize;
use std::fmt::Display;

/// Builder for assembling query parameter pairs.
#[derive(Debug, Default, Clone)]
pub struct QueryParams {
    pairs: Vec<(&'static str, String)>,
}

impl QueryParams {
    /// Create a new, empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Append a key/value pair when the value is present.
    pub fn push_opt<T>(&mut self, key: &'static str, value: Option<T>)
    where
        T: ToString,
    {
        if let Some(value) = value {
            self.pairs.push((key, value.to_string()));
        }
    }

    /// Append a required key/value pair.
    pub fn push<T>(&mut self, key: &'static str, value: T)
    where
        T: Display,
    {
        self.pairs.push((key, value.to_string()));
    }

    /// Return the collected key/value pairs.
    #[must_use]
    pub fn into_pairs(self) -> Vec<(&'static str, String)> {
        self.pairs
    }
}

/// Paging and search envelope for `search*` endpoints.
///
/// A `row_count` of `-1` asks the appliance for every row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// 1-based page number
    pub current: u32,
    /// Rows per page
    pub row_count: i64,
    /// Free-text filter applied by the appliance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_phrase: Option<String>,
}

impl SearchQuery {
    /// First page with the given row count.
    #[must_use]
    pub const fn rows(row_count: i64) -> Self {
        Self {
            current: 1,
            row_count,
            search_phrase: None,
        }
    }

    /// Every row in one page.
    #[must_use]
    pub const fn all() -> Self {
        Self::rows(-1)
    }

    /// Set the search phrase. Blank phrases are dropped.
    #[must_use]
    pub fn with_phrase(mut self, phrase: impl Into<String>) -> Self {
        let phrase = phrase.into();
        self.search_phrase = (!phrase.trim().is_empty()).then_some(phrase);
        self
    }

    /// Convert to URL query pairs for GET variants.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut params = QueryParams::new();
        params.push("current", self.current);
        params.push("rowCount", self.row_count);
        params.push_opt("searchPhrase", self.search_phrase.as_ref());
        params.into_pairs()
    }
}
