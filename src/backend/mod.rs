//! Back cache: single owner of the embedded store
//!
//! Executes heavy (write/sort/filter/count/select-ids) and easy
//! (window/selection/hints) operations against the main and suspended
//! tables, owns the version→id-mapping dictionary, transforms stale row
//! indices across versions, and produces [`ViewWindowValues`] snapshots.
//! Everything here runs on the back thread.

pub mod export;
pub mod hooks;
pub mod ids;
pub mod worker;

pub use export::ColumnExportInfo;
pub use hooks::{HookContext, NoopHook, OperationHook};
pub use ids::{IdMapping, RowTransformer};
pub use worker::{BackRequest, BackResponse, BackWorker};

use crate::data::{full_text_value, CommonIndexRanges, DeltaBatch, FieldDescriptor, RowDelta, Value};
use crate::range::RowRange;
use crate::storage::{make_unique_name, CacheTable, StoreHandle, ROW_WINDOW_OFFSET};
use crate::view::{
    EdgeRowHint, HintsRequest, LoadingStatus, RowRequest, ScrollHint, SelectionRequest,
    SortDirection, SortParameters, ViewWindowValues,
};
use crate::{CacheError, Result};
use log::{debug, trace, warn};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Instant;

/// Where the embedded store lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StorageKind {
    #[default]
    InMemory,
    File(PathBuf),
}

/// Construction-time policy of one cache: schema, default ordering,
/// full-text columns and storage placement.
#[derive(Debug, Clone)]
pub struct TableCacheConfig {
    pub table_name: String,
    pub fields: Vec<FieldDescriptor>,
    /// Column name holding the 64-bit primary key.
    pub primary_key: String,
    /// Index of the primary-key column; used as the sort fallback.
    pub id_column: usize,
    /// Default sort sequences appended after the user-picked column.
    pub default_sort: Vec<Vec<usize>>,
    pub default_direction: SortDirection,
    /// Full-text `common` columns and their source column ranges.
    pub common_index_ranges: CommonIndexRanges,
    pub storage: StorageKind,
}

impl TableCacheConfig {
    pub fn new(table_name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            table_name: table_name.into(),
            fields,
            primary_key: "id".to_string(),
            id_column: 0,
            default_sort: Vec::new(),
            default_direction: SortDirection::Ascending,
            common_index_ranges: CommonIndexRanges::new(),
            storage: StorageKind::InMemory,
        }
    }

    pub fn primary_key(mut self, name: impl Into<String>, column: usize) -> Self {
        self.primary_key = name.into();
        self.id_column = column;
        self
    }

    pub fn default_sort(mut self, sort: Vec<Vec<usize>>, direction: SortDirection) -> Self {
        self.default_sort = sort;
        self.default_direction = direction;
        self
    }

    pub fn common_index_ranges(mut self, ranges: CommonIndexRanges) -> Self {
        self.common_index_ranges = ranges;
        self
    }

    pub fn storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    /// Default sort with the id column substituted when none is
    /// configured. Duplicate columns or out-of-range indices reject the
    /// whole model.
    pub fn normalized_default_sort(&self) -> Result<Vec<Vec<usize>>> {
        let order = if self.default_sort.is_empty() {
            vec![vec![self.id_column]]
        } else {
            self.default_sort.clone()
        };

        let mut seen = BTreeSet::new();
        for sequence in &order {
            for &column in sequence {
                if !seen.insert(column) {
                    return Err(CacheError::InvalidSortOrder(
                        "columns duplicated".to_string(),
                    ));
                }
                if column >= self.fields.len() {
                    return Err(CacheError::InvalidSortOrder(
                        "column index out of range".to_string(),
                    ));
                }
            }
        }
        Ok(order)
    }
}

/// Result of one heavy operation, turned into an `OperationCompleted`
/// response by the worker.
pub struct HeavyOutcome {
    pub selection_duration_ms: Option<i64>,
    pub db_row_count: Option<i64>,
    pub suspended_count: u64,
    pub values: ViewWindowValues,
    pub updated: bool,
    pub selected_ids: Option<BTreeSet<i64>>,
}

/// Result of one easy operation.
pub struct EasyOutcome {
    pub values: ViewWindowValues,
    pub updated: bool,
}

/// Result of a user pass-through query.
pub enum UserQueryOutcome {
    Rows(Vec<Vec<Value>>),
    /// The statement was not a read-only SELECT; the cache state is
    /// untouched.
    NotSelect,
    /// A storage failure, already queued for error reporting.
    Failed,
}

pub struct BackCache {
    common_indexes: CommonIndexRanges,

    filter: String,
    sort_column: Option<usize>,
    sort_direction: SortDirection,

    requested_rows: RowRange,
    requested_rows_visible: RowRange,
    auto_scroll: bool,
    selection_allowed: bool,

    /// Approximate counts of operations applied to each table, used while
    /// the exact count query would be too heavy.
    table_ops_counter: u64,
    suspended_counter: u64,

    versioned_ids: BTreeMap<i64, IdMapping>,

    hook: Option<Box<dyn OperationHook>>,

    default_sort: Vec<Vec<usize>>,
    default_direction: SortDirection,

    view: ViewWindowValues,

    store: StoreHandle,
    table: CacheTable,
    /// Shadow table staging deltas while updates are suspended.
    suspended: CacheTable,
    suspended_deleted: BTreeSet<i64>,

    /// Errors accumulated during the current operation, drained by the
    /// worker into `ErrorOccured` responses.
    pending_errors: Vec<String>,
}

impl BackCache {
    pub fn new(config: &TableCacheConfig) -> Result<Self> {
        let default_sort = config.normalized_default_sort()?;
        let store = match &config.storage {
            StorageKind::InMemory => StoreHandle::open_in_memory()?,
            StorageKind::File(path) => StoreHandle::open_file(path)?,
        };

        let name = make_unique_name(&config.table_name);
        let table = CacheTable::new(
            store.clone(),
            name.clone(),
            &config.fields,
            &config.primary_key,
        )?;
        // ssp - suspended
        let suspended = CacheTable::new(
            store.clone(),
            format!("{}_ssp", name),
            &config.fields,
            &config.primary_key,
        )?;

        Ok(Self {
            common_indexes: config.common_index_ranges.clone(),
            filter: String::new(),
            sort_column: None,
            sort_direction: config.default_direction,
            requested_rows: RowRange::default(),
            requested_rows_visible: RowRange::default(),
            auto_scroll: true,
            selection_allowed: false,
            table_ops_counter: 0,
            suspended_counter: 0,
            versioned_ids: BTreeMap::new(),
            hook: None,
            default_sort,
            default_direction: config.default_direction,
            view: ViewWindowValues::default(),
            store,
            table,
            suspended,
            suspended_deleted: BTreeSet::new(),
            pending_errors: Vec::new(),
        })
    }

    pub fn set_hook(&mut self, hook: Box<dyn OperationHook>) {
        self.hook = Some(hook);
    }

    pub fn table_name(&self) -> &str {
        self.table.name()
    }

    pub fn view(&self) -> &ViewWindowValues {
        &self.view
    }

    pub fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_errors)
    }

    fn report_error(&mut self, context: &str, error: &CacheError) {
        log::error!("{}: {}", context, error);
        self.pending_errors.push(error.to_string());
    }

    /// Create both tables.
    pub fn init_tables(&mut self) {
        if let Err(e) = self.table.create() {
            self.report_error("init table", &e);
            return;
        }
        if let Err(e) = self.suspended.create() {
            self.report_error("init suspended table", &e);
        }
    }

    /// Delete both tables and reset every counter, mapping and the
    /// snapshot to their initial values.
    pub fn clear_table(&mut self) {
        self.selection_allowed = false;
        self.versioned_ids.clear();

        if let Some(hook) = self.hook.as_mut() {
            hook.process_clear();
        }

        if let Err(e) = self.table.clear() {
            self.report_error("clear table", &e);
        }
        if let Err(e) = self.suspended.clear() {
            self.report_error("clear suspended table", &e);
        }

        self.requested_rows = RowRange::default();
        self.requested_rows_visible = RowRange::default();
        self.view = ViewWindowValues::default();
        self.suspended_deleted.clear();
        self.table_ops_counter = 0;
        self.suspended_counter = 0;
    }

    /// Drop all id mappings older than `version`.
    pub fn confirm_version(&mut self, version: i64) {
        self.versioned_ids = self.versioned_ids.split_off(&version);
    }

    /// In auto-scroll (tail) mode stale windows keep their absolute
    /// position so new tail rows become visible; in anchor mode they are
    /// re-mapped through the id transform.
    pub fn set_auto_scroll(&mut self, auto_scroll: bool) {
        self.auto_scroll = auto_scroll;
    }

    // ------------------------------------------------------------------
    // Heavy operation

    #[allow(clippy::too_many_arguments)]
    pub fn process_heavy(
        &mut self,
        request_id: i64,
        batch: DeltaBatch,
        loading: LoadingStatus,
        sorting: Option<SortParameters>,
        filter: Option<String>,
        report_selected: bool,
        suspend_updates: bool,
        progress: &mut dyn FnMut(u8),
    ) -> HeavyOutcome {
        let selected_ids = if report_selected {
            self.selected_ids()
        } else {
            None
        };

        let sorting_changed = sorting.is_some();
        let filter_changed = filter.is_some();
        self.set_sorting(sorting);
        self.set_filter(filter);
        self.view.request_id = request_id;

        // Deltas of the initial load are never suspended; decide before
        // the loading status updates the gate.
        let is_suspend = suspend_updates && self.selection_allowed;
        self.set_selection_allowed(loading);

        let insertion = self.try_store(&batch, is_suspend, progress);
        let main_table_updated = insertion.is_some() && !is_suspend;
        // The producer may send increments while loading continues, so a
        // finished marker alone also forces a re-selection.
        let updated_or_finished = main_table_updated || loading == LoadingStatus::Finished;

        let selection_duration =
            self.try_perform_selection(updated_or_finished, sorting_changed, filter_changed);
        let (db_row_count, counting_ms) = self.estimate_db_row_count(updated_or_finished);

        debug!(
            "heavy op {}: {} deltas, insertion: {:?} ms, selection: {:?} ms, db size: {:?} ({:?} ms), table: {}",
            request_id,
            batch.len(),
            insertion,
            selection_duration,
            db_row_count,
            counting_ms,
            self.table.name()
        );

        HeavyOutcome {
            selection_duration_ms: selection_duration,
            db_row_count,
            suspended_count: self.suspended_counter,
            values: self.view.clone(),
            updated: selection_duration.is_some(),
            selected_ids,
        }
    }

    fn set_sorting(&mut self, sorting: Option<SortParameters>) {
        let Some(sorting) = sorting else {
            return;
        };
        if sorting.column >= self.table.column_count() {
            warn!(
                "sort column {} outside [0, {}), sort skipped",
                sorting.column,
                self.table.column_count()
            );
            return;
        }
        self.sort_column = Some(sorting.column);
        self.sort_direction = sorting.direction;
        debug!(
            "sorting: column {}, {}",
            sorting.column,
            sorting.direction.sql()
        );
    }

    fn set_filter(&mut self, filter: Option<String>) {
        let Some(filter) = filter else {
            return;
        };
        debug!("filter: {}", filter);
        self.filter = filter;
    }

    fn set_selection_allowed(&mut self, loading: LoadingStatus) {
        if loading == LoadingStatus::NotChanged {
            return;
        }
        self.selection_allowed = loading == LoadingStatus::Finished;
    }

    /// Store the batch in one transaction, draining the suspended shadow
    /// first when updates flow again. Returns `(insertion_ms, updating_ms)`
    /// when a transaction ran, even a failed one; a failure rolls back and
    /// is reported.
    fn try_store(
        &mut self,
        batch: &DeltaBatch,
        suspend: bool,
        progress: &mut dyn FnMut(u8),
    ) -> Option<(i64, i64)> {
        if batch.is_empty() && (suspend || self.suspended_counter == 0) {
            // Nothing came in and no suspended records wait for a drain.
            return None;
        }

        let start = Instant::now();
        let mut stored_at = start;
        if let Err(e) = self.store_transaction(batch, suspend, progress, &mut stored_at) {
            let _ = self.store.rollback();
            self.report_error("store items", &e);
        }

        let total = start.elapsed().as_millis() as i64;
        let insertion = stored_at.duration_since(start).as_millis() as i64;
        Some((insertion, total - insertion))
    }

    fn store_transaction(
        &mut self,
        batch: &DeltaBatch,
        suspend: bool,
        progress: &mut dyn FnMut(u8),
        stored_at: &mut Instant,
    ) -> Result<()> {
        self.store.begin_transaction()?;

        if !suspend {
            self.resume_suspended(progress)?;
        }
        self.store_items(batch, suspend)?;
        *stored_at = Instant::now();

        if !suspend {
            if let Some(hook) = self.hook.as_mut() {
                if hook.is_insertion_needed() {
                    let ctx = HookContext::new(&self.table, &self.filter);
                    hook.process_data_inserted(&ctx)?;
                }
            }
        }

        self.store.commit()
    }

    fn store_items(&mut self, batch: &DeltaBatch, suspend: bool) -> Result<()> {
        for delta in batch {
            match delta {
                RowDelta::Upsert(values) => self.insert_or_replace(values.clone(), suspend)?,
                RowDelta::Delete(id) => self.delete_record(*id, suspend)?,
            }
        }

        let counter = if suspend {
            &mut self.suspended_counter
        } else {
            &mut self.table_ops_counter
        };
        *counter += batch.len() as u64;
        Ok(())
    }

    fn insert_or_replace(&mut self, mut values: Vec<Value>, suspend: bool) -> Result<()> {
        // Pending-value hooks do not run for suspended rows; they run when
        // the shadow drains into the main table.
        if suspend {
            self.suspended.insert_or_replace(&values)
        } else if self.add_pending_value(&mut values) {
            self.table.insert_or_replace(&values)
        } else {
            Ok(())
        }
    }

    fn add_pending_value(&mut self, values: &mut Vec<Value>) -> bool {
        if let Some(hook) = self.hook.as_mut() {
            if !hook.add_pending_value(values) {
                return false;
            }
        }

        for (&common_index, indexes) in &self.common_indexes {
            if common_index < values.len() {
                let text = full_text_value(values, indexes);
                values[common_index] = Value::Text(text);
            }
        }
        true
    }

    fn delete_record(&mut self, id: i64, suspend: bool) -> Result<()> {
        if suspend {
            self.suspended.delete_row(id)?;
            self.suspended_deleted.insert(id);
        } else {
            self.table.delete_row(id)?;
            if let Some(hook) = self.hook.as_mut() {
                hook.delete_pending_value(id);
            }
        }
        Ok(())
    }

    /// Replay the suspended shadow into the main table: staged deletes
    /// first, then every staged row in id order. Runs inside the caller's
    /// transaction.
    fn resume_suspended(&mut self, progress: &mut dyn FnMut(u8)) -> Result<()> {
        self.suspended_counter =
            self.suspended.row_count()? as u64 + self.suspended_deleted.len() as u64;
        let total = self.suspended_counter;
        let mut applied = 0u64;
        let mut last_percent = 0u8;
        let mut step = |applied: &mut u64, last: &mut u8, progress: &mut dyn FnMut(u8)| {
            if *applied >= total {
                return;
            }
            *applied += 1;
            let percent = (*applied * 100 / total) as u8;
            if percent != *last {
                *last = percent;
                progress(percent);
            }
        };

        let deleted: Vec<i64> = std::mem::take(&mut self.suspended_deleted)
            .into_iter()
            .collect();
        for id in deleted {
            self.delete_record(id, false)?;
            step(&mut applied, &mut last_percent, &mut *progress);
        }

        let rows = self
            .suspended
            .perform_sql("SELECT * FROM $table$ ORDER BY id", &[], "")?;
        for row in rows {
            self.insert_or_replace(row, false)?;
            step(&mut applied, &mut last_percent, &mut *progress);
        }

        self.suspended.clear()?;
        self.suspended_counter = 0;
        progress(100);
        Ok(())
    }

    fn try_perform_selection(
        &mut self,
        updated_or_finished: bool,
        sorting_changed: bool,
        filter_changed: bool,
    ) -> Option<i64> {
        if !self.selection_allowed {
            return None;
        }
        if updated_or_finished || sorting_changed || filter_changed {
            let start = Instant::now();
            self.perform_selection();
            Some(start.elapsed().as_millis() as i64)
        } else {
            None
        }
    }

    /// Re-run the ordering query and advance to a new version.
    fn perform_selection(&mut self) {
        let sql = format!(
            "SELECT id FROM $table$ WHERE $filter$ {}",
            self.order_by_clause()
        );
        trace!("selection: {}", self.table.specify_sql(&sql, &self.filter));

        let ids = match self.table.select_ids(&sql, &self.filter) {
            Ok(ids) => ids,
            Err(e) => {
                self.report_error("perform selection", &e);
                Vec::new()
            }
        };

        self.view.version += 1;
        self.update_id_mapping(ids);

        let previous = self.view.version - 1;
        if let Some(t) = Self::transformer_for(&self.versioned_ids, self.view.version, previous) {
            let (selection, current_row) =
                transform_selection_with(&t, &self.view.selection, self.view.current_row);
            self.view.selection = selection;
            self.view.current_row = current_row;
        }

        self.update_row_window();
        self.update_view_window_values(true);

        if let Some(hook) = self.hook.as_mut() {
            hook.process_data_selected();
        }
    }

    fn update_id_mapping(&mut self, ids: Vec<i64>) {
        match self.versioned_ids.entry(self.view.version) {
            Entry::Occupied(_) => {
                warn!("id mapping for version {} already exists", self.view.version);
            }
            Entry::Vacant(entry) => {
                let mut mapping = IdMapping::with_capacity(ids.len());
                for id in ids {
                    mapping.push(id);
                }
                entry.insert(mapping);
            }
        }
    }

    /// Rows matching the filter at the version the snapshot reports.
    fn records_count(&self) -> i64 {
        self.versioned_ids
            .get(&self.view.version)
            .map(|m| m.len() as i64)
            .unwrap_or(0)
    }

    fn transformer_for<'a>(
        versioned_ids: &'a BTreeMap<i64, IdMapping>,
        current_version: i64,
        version: i64,
    ) -> Option<RowTransformer<'a>> {
        if current_version == version {
            return None;
        }
        let current = versioned_ids.get(&current_version)?;
        let previous = if version < current_version {
            versioned_ids.get(&version)?
        } else {
            current
        };
        Some(RowTransformer {
            old: previous,
            new: current,
        })
    }

    /// Carry the requested window into the new version and re-establish
    /// the pre-fetch margin invariant.
    fn update_row_window(&mut self) {
        let records_count = self.records_count();
        let previous = self.view.version - 1;

        if self.requested_rows.is_valid() && !self.auto_scroll {
            if let Some(t) =
                Self::transformer_for(&self.versioned_ids, self.view.version, previous)
            {
                transform_window(&t, &mut self.requested_rows, &mut self.requested_rows_visible);
                trace!(
                    "window transformed: {} / visible {}",
                    self.requested_rows,
                    self.requested_rows_visible
                );
            }
        }

        if self.requested_rows_visible.top >= records_count {
            self.requested_rows_visible = RowRange::default();
            self.requested_rows = RowRange::default();
        }

        if !self.requested_rows_visible.is_valid() {
            self.requested_rows_visible = self.requested_rows_visible.expand(ROW_WINDOW_OFFSET);
        }
        if !self
            .requested_rows
            .contains_with_padding(&self.requested_rows_visible, ROW_WINDOW_OFFSET)
        {
            self.requested_rows = self.requested_rows_visible.expand(ROW_WINDOW_OFFSET);
        }
    }

    /// Re-materialize the window, reusing cached rows unless a refresh of
    /// everything was requested. Stops early when the table shrank under
    /// the window.
    fn update_view_window_values(&mut self, refresh_all: bool) {
        let records_count = self.records_count();
        let mut data: Vec<Vec<Value>> = Vec::new();

        if self.requested_rows.is_valid() {
            for i in self.requested_rows.top..=self.requested_rows.bottom {
                let cached = if refresh_all {
                    None
                } else {
                    self.view.row(i).cloned()
                };
                if let Some(row) = cached {
                    data.push(row);
                } else {
                    match self.record(i) {
                        Some(values) => {
                            debug_assert_eq!(values.len(), self.table.column_count());
                            data.push(values);
                        }
                        None => break,
                    }
                }
            }
        }

        let mut rows = RowRange::default();
        let mut visible = RowRange::default();
        if !data.is_empty() {
            // the materially possible range: what the table had data for
            rows = RowRange::new(
                self.requested_rows.top,
                self.requested_rows.top + data.len() as i64 - 1,
            );
            // the visible range follows the real one
            let bottom = self.requested_rows_visible.bottom.min(rows.bottom);
            visible = RowRange::new(
                (bottom - self.requested_rows_visible.span()).max(0),
                bottom,
            );
        }

        trace!("window values: range {}, visible {}", rows, visible);
        self.view.set_data(data, rows, visible, records_count);

        if let Some(hook) = self.hook.as_mut() {
            hook.make_extra_data(&mut self.view);
        }
    }

    pub(crate) fn record(&mut self, row: i64) -> Option<Vec<Value>> {
        let mapping = self.versioned_ids.get(&self.view.version)?;
        let id = mapping.id_at(row)?;
        match self.table.select_row(id) {
            Ok(values) => values,
            Err(e) => {
                self.report_error("fetch row", &e);
                None
            }
        }
    }

    /// Exact count when selection is allowed, the cheap operations
    /// heuristic while the initial load still runs.
    fn estimate_db_row_count(&mut self, updated_or_finished: bool) -> (Option<i64>, Option<i64>) {
        if !updated_or_finished {
            return (None, None);
        }
        if self.selection_allowed {
            let start = Instant::now();
            let count = match self.table.row_count() {
                Ok(count) => count,
                Err(e) => {
                    self.report_error("count rows", &e);
                    0
                }
            };
            (Some(count), Some(start.elapsed().as_millis() as i64))
        } else {
            (Some(self.table_ops_counter as i64), None)
        }
    }

    /// Ids of the currently selected rows, resolved against the latest
    /// mapping. `None` until a selection query ran.
    pub fn selected_ids(&self) -> Option<BTreeSet<i64>> {
        let (_, mapping) = self.versioned_ids.iter().next_back()?;
        let mut ids = BTreeSet::new();
        for range in &self.view.selection {
            if mapping.is_out_of_range(range.top) || mapping.is_out_of_range(range.bottom) {
                continue;
            }
            for row in range.top..=range.bottom {
                if let Some(id) = mapping.id_at(row) {
                    ids.insert(id);
                }
            }
        }
        Some(ids)
    }

    // ------------------------------------------------------------------
    // Easy operation

    pub fn process_easy(
        &mut self,
        request_id: i64,
        rows_request: RowRequest,
        selection_request: SelectionRequest,
        hints: HintsRequest,
    ) -> EasyOutcome {
        self.view.request_id = request_id;

        let mut updated = false;
        if self.selection_allowed {
            // the selection applies first
            updated |= self.apply_selection_request(&selection_request);

            let mut row_request = rows_request;
            let last_row = self.records_count() - 1;

            let correct = |visible: RowRange, current: i64, bottom_is_end: bool| {
                let visible = visible.scroll_to_with_correction(
                    current,
                    hints.top_row == EdgeRowHint::Full,
                    hints.bottom_row == EdgeRowHint::Full,
                    bottom_is_end,
                );
                (visible.expand(ROW_WINDOW_OFFSET), visible)
            };

            if hints.scroll == ScrollHint::EnsureVisible {
                // EnsureVisible gives the selection priority: the window
                // request is replaced by one tracking the current row.
                let (window, visible) = correct(
                    rows_request.visible,
                    self.view.current_row,
                    self.view.current_row == last_row,
                );
                row_request.window = window;
                row_request.visible = visible;
            } else if row_request.visible.bottom == last_row {
                // the visible bottom is the last data row; correct as if
                // that row were the selection to keep the tail fully shown
                let (window, visible) = correct(rows_request.visible, last_row, true);
                row_request.window = window;
                row_request.visible = visible;
            }

            // the window applies after the selection
            updated |= self.apply_row_request(&row_request);

            if updated {
                self.update_view_window_values(false);
            }
        }

        EasyOutcome {
            values: self.view.clone(),
            updated,
        }
    }

    fn apply_row_request(&mut self, request: &RowRequest) -> bool {
        let transformed = if !self.auto_scroll {
            self.transform_row_request(request).unwrap_or(*request)
        } else {
            *request
        };

        if self.requested_rows != transformed.window
            || self.requested_rows_visible != transformed.visible
        {
            self.requested_rows = transformed.window;
            self.requested_rows_visible = transformed.visible;
            trace!(
                "row window: {} / visible {}",
                self.requested_rows,
                self.requested_rows_visible
            );
            true
        } else {
            false
        }
    }

    fn transform_row_request(&self, request: &RowRequest) -> Option<RowRequest> {
        let t = Self::transformer_for(&self.versioned_ids, self.view.version, request.version)?;
        let mut transformed = *request;
        transform_window(&t, &mut transformed.window, &mut transformed.visible);
        Some(transformed)
    }

    fn apply_selection_request(&mut self, request: &SelectionRequest) -> bool {
        let transformed = self.transform_selection_request(request);
        if self.view.current_row != transformed.current_row
            || self.view.selection != transformed.selection
        {
            self.view.current_row = transformed.current_row;
            self.view.selection = transformed.selection;
            true
        } else {
            false
        }
    }

    fn transform_selection_request(&self, request: &SelectionRequest) -> SelectionRequest {
        match Self::transformer_for(&self.versioned_ids, self.view.version, request.version) {
            Some(t) => {
                let (selection, current_row) =
                    transform_selection_with(&t, &request.selection, request.current_row);
                SelectionRequest {
                    selection,
                    current_row,
                    version: request.version,
                }
            }
            None => request.clone(),
        }
    }

    // ------------------------------------------------------------------
    // User query

    /// Read-only pass-through query; anything that is not a SELECT is
    /// rejected without touching the cache state.
    pub fn perform_select(&mut self, sql: &str, params: &[Value]) -> UserQueryOutcome {
        let full_sql = self.table.specify_sql(sql, &self.filter);

        let readonly = self.store.with(|conn| {
            let stmt = conn.prepare(&full_sql)?;
            Ok(stmt.readonly() && stmt.column_count() > 0)
        });
        match readonly {
            Ok(true) => {}
            Ok(false) => {
                log::error!("perform select: only select statements allowed here");
                return UserQueryOutcome::NotSelect;
            }
            Err(e) => {
                self.report_error("user query", &e);
                return UserQueryOutcome::Failed;
            }
        }

        match self.table.perform_sql(sql, params, &self.filter) {
            Ok(rows) => UserQueryOutcome::Rows(rows),
            Err(e) => {
                self.report_error("user query", &e);
                UserQueryOutcome::Failed
            }
        }
    }

    /// Build the ORDER BY clause from the user-picked column and the
    /// configured default sequences.
    fn order_by_clause(&self) -> String {
        let column_count = self.table.column_count();
        let user_column = self.sort_column.filter(|&c| c < column_count);

        if user_column.is_none() && self.default_sort.is_empty() {
            return String::new();
        }

        let mut column_list: Vec<&str> = Vec::new();
        let mut default_column_list: Vec<&str> = Vec::new();
        for sequence in &self.default_sort {
            if column_list.is_empty() {
                if let Some(user) = user_column {
                    if sequence.contains(&user) {
                        // the user column promotes its whole sequence
                        column_list.extend(sequence.iter().map(|&c| self.table.column_name(c)));
                        continue;
                    }
                }
            }
            default_column_list.extend(sequence.iter().map(|&c| self.table.column_name(c)));
        }

        let sort_direction = self.sort_direction.sql();
        let mut default_sort_direction = sort_direction;

        if column_list.is_empty() {
            if let Some(user) = user_column {
                column_list.push(self.table.column_name(user));
                default_sort_direction = self.default_direction.sql();
            }
        }

        let mut parts: Vec<String> = column_list
            .iter()
            .map(|name| format!("{} {}", name, sort_direction))
            .collect();
        parts.extend(
            default_column_list
                .iter()
                .map(|name| format!("{} {}", name, default_sort_direction)),
        );

        format!("ORDER BY {}", parts.join(", "))
    }
}

fn transform_window(t: &RowTransformer<'_>, window: &mut RowRange, visible: &mut RowRange) -> bool {
    let new_top = t.transform_row(visible.top);
    if new_top < 0 {
        return false;
    }
    *visible = RowRange::new(new_top, new_top + visible.span());
    *window = visible.expand(ROW_WINDOW_OFFSET);
    true
}

/// Transform every selected row, drop the vanished ones and re-coalesce
/// the survivors into maximal contiguous ranges.
fn transform_selection_with(
    t: &RowTransformer<'_>,
    selection: &[RowRange],
    current_row: i64,
) -> (Vec<RowRange>, i64) {
    let new_current = t.transform_row(current_row);

    let mut rows = BTreeSet::new();
    for range in selection {
        for row in range.top..=range.bottom {
            let new_row = t.transform_row(row);
            if new_row >= 0 {
                rows.insert(new_row);
            }
        }
    }

    let mut result: Vec<RowRange> = Vec::new();
    for row in rows {
        match result.last_mut() {
            Some(last) if last.bottom == row - 1 => last.bottom = row,
            _ => result.push(RowRange::new(row, row)),
        }
    }

    (result, new_current)
}

#[cfg(test)]
mod tests;
