//! Text-filter helper exposed to plugins
//!
//! Translates a filter string plus mode flags into a SQL predicate over a
//! full-text column.

use serde::{Deserialize, Serialize};

/// A user text filter with its matching modes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFilter {
    pub pattern: String,
    pub whole_words: bool,
    pub regexp: bool,
    pub case_sensitive: bool,
}

impl TextFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    pub fn whole_words(mut self, on: bool) -> Self {
        self.whole_words = on;
        self
    }

    pub fn regexp(mut self, on: bool) -> Self {
        self.regexp = on;
        self
    }

    pub fn case_sensitive(mut self, on: bool) -> Self {
        self.case_sensitive = on;
        self
    }

    /// SQL predicate over `column`.
    ///
    /// Whole-words and regex modes use `REGEXP`, the plain mode a
    /// substring `GLOB`. Case-insensitive variants wrap the column in
    /// `LOWER(...)` and lowercase the pattern.
    pub fn to_sql(&self, column: &str) -> String {
        let column_expr = if self.case_sensitive {
            column.to_string()
        } else {
            format!("LOWER({})", column)
        };
        let pattern = if self.case_sensitive {
            self.pattern.clone()
        } else {
            self.pattern.to_lowercase()
        };
        let pattern = pattern.replace('\'', "''");

        if self.whole_words {
            format!("{} REGEXP '\\b{}\\b'", column_expr, pattern)
        } else if self.regexp {
            format!("{} REGEXP '{}'", column_expr, pattern)
        } else {
            format!("{} GLOB '*{}*'", column_expr, pattern)
        }
    }
}
