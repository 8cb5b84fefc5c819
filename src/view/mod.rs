//! Windowed view snapshot and the request types that cross the thread
//! boundary

use crate::data::Value;
use crate::range::RowRange;
use serde::{Deserialize, Serialize};

/// Positioning hint for the current selection row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollHint {
    #[default]
    None,
    /// The current selection row must stay inside the visible window.
    EnsureVisible,
}

/// Visibility of a row at the edge of the visible window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeRowHint {
    /// The row is only partially visible.
    Part,
    #[default]
    Full,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// User-picked sort column and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortParameters {
    pub column: usize,
    pub direction: SortDirection,
}

/// Producer loading phase carried with each heavy operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadingStatus {
    #[default]
    NotChanged,
    Finished,
    Started,
}

/// Requested row window, stamped with the version it was computed against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRequest {
    pub window: RowRange,
    pub visible: RowRange,
    pub version: i64,
}

/// Requested selection, stamped with the version it was computed against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub selection: Vec<RowRange>,
    pub current_row: i64,
    pub version: i64,
}

impl SelectionRequest {
    pub fn empty() -> Self {
        Self {
            selection: Vec::new(),
            current_row: -1,
            version: 0,
        }
    }
}

/// Visual hints accompanying window and selection requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintsRequest {
    pub scroll: ScrollHint,
    pub top_row: EdgeRowHint,
    pub bottom_row: EdgeRowHint,
}

/// Snapshot the back produces and the front consumes: the materialized
/// row window plus selection, hints, version and request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewWindowValues {
    /// Materialized cell rows for `rows`, in window order.
    pub data: Vec<Vec<Value>>,

    /// Number of rows satisfying the active filter.
    pub records_count: i64,

    pub rows: RowRange,
    pub rows_visible: RowRange,

    pub selection: Vec<RowRange>,
    pub current_row: i64,

    pub scroll_hint: ScrollHint,
    pub top_row_hint: EdgeRowHint,
    pub bottom_row_hint: EdgeRowHint,

    pub version: i64,
    pub request_id: i64,

    /// Free-form per-window aggregates attached by a plugin hook.
    pub extra_data: Option<serde_json::Value>,
}

impl Default for ViewWindowValues {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            records_count: 0,
            rows: RowRange::default(),
            rows_visible: RowRange::default(),
            selection: Vec::new(),
            current_row: -1,
            scroll_hint: ScrollHint::None,
            top_row_hint: EdgeRowHint::Full,
            bottom_row_hint: EdgeRowHint::Full,
            version: 0,
            request_id: -1,
            extra_data: None,
        }
    }
}

impl ViewWindowValues {
    /// Materialized cells for `row`, when the row lies inside the window.
    pub fn row(&self, row: i64) -> Option<&Vec<Value>> {
        if row >= self.records_count {
            return None;
        }
        if !self.rows.contains(row) {
            return None;
        }
        let index = (row - self.rows.top) as usize;
        self.data.get(index)
    }

    /// Tail range a view must remove when the record count shrinks to
    /// `records_count`.
    pub fn prepare_remove_rows(&self, records_count: i64) -> RowRange {
        let records_count = records_count.max(0);
        if records_count < self.records_count {
            RowRange::new(records_count, self.records_count - 1)
        } else {
            RowRange::default()
        }
    }

    pub fn remove_rows(&mut self, records_count: i64) {
        let records_count = records_count.max(0);
        while self.rows.bottom >= records_count {
            if self.row(self.rows.bottom).is_some() {
                self.data.pop();
            }
            self.rows.bottom -= 1;
            self.rows_visible.top = self.rows_visible.top.min(self.rows.bottom);
        }
        if self.data.is_empty() {
            self.rows = RowRange::default();
            self.rows_visible = RowRange::default();
        }
        self.records_count = self.records_count.min(records_count);
    }

    /// Ranges a view must repaint: the union of the old and new windows
    /// clipped to the smaller record count.
    pub fn prepare_change_rows(&self, new_values: &ViewWindowValues) -> Vec<RowRange> {
        let min_records = self.records_count.min(new_values.records_count);
        let mut result = Vec::new();
        for range in self.rows.union(&new_values.rows) {
            if range.bottom < min_records {
                result.push(range);
            } else {
                let clipped = RowRange::new(range.top, min_records - 1);
                if clipped.is_valid() {
                    result.push(clipped);
                }
            }
        }
        result
    }

    pub fn change_rows(&mut self, new_values: &ViewWindowValues) {
        self.rows = new_values.rows;
        self.rows_visible = new_values.rows_visible;
        self.data = new_values.data.clone();
    }

    /// Tail range a view must insert when the record count grows to
    /// `records_count`.
    pub fn prepare_add_rows(&self, records_count: i64) -> RowRange {
        let records_count = records_count.max(0);
        if records_count > self.records_count {
            RowRange::new(self.records_count, records_count - 1)
        } else {
            RowRange::default()
        }
    }

    pub fn add_rows(&mut self, records_count: i64) {
        self.records_count = self.records_count.max(records_count);
    }

    pub fn set_data(
        &mut self,
        data: Vec<Vec<Value>>,
        rows: RowRange,
        rows_visible: RowRange,
        records_count: i64,
    ) {
        self.data = data;
        self.rows = rows;
        self.rows_visible = rows_visible;
        self.records_count = records_count;
    }
}
