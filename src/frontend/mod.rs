//! View-facing table model
//!
//! Accepts user actions and producer deltas, keeps them in pending-state
//! buckets until the event processor releases a command, forwards commands
//! to the back thread as typed messages, and applies returned snapshots to
//! the view with row-granular add/change/remove diffs.

pub mod events;

pub use events::{Command, Event, EventProcessor, PendingFlags};

use crate::backend::{
    BackRequest, BackResponse, BackWorker, ColumnExportInfo, OperationHook, TableCacheConfig,
};
use crate::data::{DeltaBatch, RowDelta, Value};
use crate::range::RowRange;
use crate::storage::{ROW_WINDOW_OFFSET, SQLITE_MAX_VARIABLE_NUMBER};
use crate::view::{
    EdgeRowHint, HintsRequest, LoadingStatus, RowRequest, ScrollHint, SelectionRequest,
    SortDirection, SortParameters, ViewWindowValues,
};
use crate::{CacheError, Result};
use log::{debug, error, trace};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::time::Instant;

/// Counters surfaced in the table summary line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemsSummary {
    /// Rows matching the active filter.
    pub count: i64,
    /// Rows received from the producer (exact or estimated).
    pub received_count: i64,
    pub selected_count: i64,
    pub error: Option<String>,
}

/// Notifications the model produces for its host view; drained by
/// [`FrontModel::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// The tail range was removed from the model.
    RowsRemoved(RowRange),
    /// The range must be repainted.
    RowsChanged(RowRange),
    /// The tail range was inserted into the model.
    RowsInserted(RowRange),
    SelectionUpdated {
        selection: Vec<RowRange>,
        current_row: i64,
    },
    /// A fresh snapshot was applied.
    ViewWindowChanged,
    RecordsCountChanged(i64),
    SuspendedCountChanged(u64),
    ResumeProgress(u8),
    ExportProgress(u8),
    ExportFinished(Option<String>),
    UserQueryPerformed(Vec<Vec<Value>>),
    SelectedIdsReported(BTreeSet<i64>),
    BusyChanged(bool),
    /// Everything changed; the view must rebuild from scratch.
    ModelReset,
    Error(String),
}

#[derive(Default)]
struct BackendState {
    /// Deltas handed to the back and not yet acknowledged.
    writing_len: usize,
    pending_update: Option<i64>,
    pending_clear: bool,
    pending_user_query: bool,
}

impl BackendState {
    fn is_ready(&self) -> bool {
        self.writing_len == 0
            && self.pending_update.is_none()
            && !self.pending_clear
            && !self.pending_user_query
    }
}

#[derive(Default)]
struct PendingDataState {
    buffer: DeltaBatch,
    loading: LoadingStatus,
    resume_updates: bool,
}

impl PendingDataState {
    fn is_needed(&self) -> bool {
        !self.buffer.is_empty() || self.loading != LoadingStatus::NotChanged || self.resume_updates
    }
}

#[derive(Default)]
struct PendingHeavyState {
    sorting: Option<SortParameters>,
    filter: Option<String>,
    report_selected: bool,
}

impl PendingHeavyState {
    fn is_needed(&self) -> bool {
        self.sorting.is_some() || self.filter.is_some() || self.report_selected
    }
}

#[derive(Default)]
struct PendingEasyState {
    rows: Option<RowRequest>,
    selection: Option<SelectionRequest>,
    hints: Option<HintsRequest>,
}

impl PendingEasyState {
    fn is_needed(&self) -> bool {
        self.rows.is_some() || self.selection.is_some() || self.hints.is_some()
    }
}

/// All transient model state; recreated wholesale on clear and on error.
#[derive(Default)]
struct ModelState {
    frontend_ready: bool,
    backend: BackendState,
    data: PendingDataState,
    heavy: PendingHeavyState,
    easy: PendingEasyState,
    query: Option<(String, Vec<Value>)>,
    processor: EventProcessor,
    last_update_request: Option<Instant>,
}

/// Busy-cursor keeper: engages only after continuous busy time so short
/// operations do not flicker the cursor.
#[derive(Default)]
struct CursorKeeper {
    pending_since: Option<Instant>,
    engaged: bool,
}

pub struct FrontModel {
    state: ModelState,
    view: ViewWindowValues,

    operation_id: i64,
    db_records_count: i64,
    error: Option<String>,

    blocked_user_actions: BTreeSet<Event>,
    pending_view_window_update: bool,

    /// Desired storage behavior; piggybacks on every heavy request.
    suspend_updates: bool,

    default_sort: Vec<Vec<usize>>,
    default_direction: SortDirection,
    column_count: usize,

    pending_export: bool,
    cursor: CursorKeeper,
    reported_busy: bool,

    worker: BackWorker,
    requests: Sender<BackRequest>,
    responses: Receiver<BackResponse>,
    events_out: Vec<ModelEvent>,
}

impl FrontModel {
    pub fn new(config: TableCacheConfig) -> Result<Self> {
        Self::with_hook(config, None)
    }

    pub fn with_hook(
        config: TableCacheConfig,
        hook: Option<Box<dyn OperationHook>>,
    ) -> Result<Self> {
        // surface construction failures synchronously
        config.normalized_default_sort()?;
        if config.fields.len() >= SQLITE_MAX_VARIABLE_NUMBER {
            return Err(CacheError::FieldCountExceeded(config.fields.len()));
        }

        let (req_tx, req_rx) = channel();
        let (resp_tx, resp_rx) = channel();

        let default_sort = config.default_sort.clone();
        let default_direction = config.default_direction;
        let column_count = config.fields.len();

        let worker = BackWorker::spawn(config, hook, req_rx, resp_tx);
        let _ = req_tx.send(BackRequest::InitTables);

        Ok(Self {
            state: ModelState::default(),
            view: ViewWindowValues::default(),
            operation_id: 0,
            db_records_count: 0,
            error: None,
            blocked_user_actions: BTreeSet::new(),
            pending_view_window_update: false,
            suspend_updates: false,
            default_sort,
            default_direction,
            column_count,
            pending_export: false,
            cursor: CursorKeeper::default(),
            reported_busy: false,
            worker,
            requests: req_tx,
            responses: resp_rx,
            events_out: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // View accessors

    pub fn row_count(&self) -> i64 {
        self.view.records_count
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn cell(&self, row: i64, column: usize) -> Option<&Value> {
        self.view.row(row)?.get(column)
    }

    pub fn view(&self) -> &ViewWindowValues {
        &self.view
    }

    pub fn is_row_visible(&self, row: i64) -> bool {
        self.view.rows.contains(row)
    }

    pub fn is_data_loaded(&self, row: i64) -> bool {
        self.view.row(row).is_some()
    }

    pub fn summary(&self) -> ItemsSummary {
        ItemsSummary {
            count: self.view.records_count,
            received_count: self.db_records_count,
            selected_count: self.view.selection.iter().map(|r| r.count()).sum(),
            error: self.error.clone(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state.processor.is_busy(&self.flags())
    }

    /// True after roughly a second of continuous busy; drives the wait
    /// cursor without flicker.
    pub fn is_cursor_engaged(&self) -> bool {
        self.cursor.engaged
    }

    pub fn default_sort_indicator(&self) -> Option<(usize, SortDirection)> {
        let first = self.default_sort.first()?.first()?;
        Some((*first, self.default_direction))
    }

    /// Earliest instant at which [`poll`](Self::poll) has due work.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.processor.deadline()
    }

    // ------------------------------------------------------------------
    // User actions

    pub fn set_row_window(
        &mut self,
        top_row: i64,
        bottom_row: i64,
        scroll_hint: ScrollHint,
        top_row_hint: EdgeRowHint,
        bottom_row_hint: EdgeRowHint,
    ) {
        if self.blocked_user_actions.contains(&Event::WindowOperation) {
            return;
        }
        self.set_row_window_internal(top_row, bottom_row, scroll_hint, top_row_hint, bottom_row_hint);
        self.process_event(Event::WindowOperation);
    }

    fn set_row_window_internal(
        &mut self,
        top_row: i64,
        bottom_row: i64,
        scroll_hint: ScrollHint,
        top_row_hint: EdgeRowHint,
        bottom_row_hint: EdgeRowHint,
    ) {
        let top = top_row.max(0);
        let visible = RowRange::new(top, bottom_row.max(top));

        self.state.easy.rows = Some(RowRequest {
            visible,
            window: visible.expand(ROW_WINDOW_OFFSET),
            version: self.view.version,
        });
        self.state.easy.hints = Some(HintsRequest {
            scroll: scroll_hint,
            top_row: top_row_hint,
            bottom_row: bottom_row_hint,
        });
    }

    /// `custom_event` marks selection changes coming from user code (e.g.
    /// a key press) rather than the standard widget; those must not echo
    /// into the local snapshot immediately.
    pub fn set_selection(
        &mut self,
        selection: &[RowRange],
        current_row: i64,
        custom_event: bool,
        scroll_hint: ScrollHint,
        top_row_hint: EdgeRowHint,
        bottom_row_hint: EdgeRowHint,
    ) {
        if self.blocked_user_actions.contains(&Event::SelectionOperation) {
            return;
        }
        self.set_selection_internal(
            selection,
            current_row,
            custom_event,
            scroll_hint,
            top_row_hint,
            bottom_row_hint,
        );
        self.process_event(Event::SelectionOperation);
    }

    fn set_selection_internal(
        &mut self,
        selection: &[RowRange],
        current_row: i64,
        custom_event: bool,
        scroll_hint: ScrollHint,
        top_row_hint: EdgeRowHint,
        bottom_row_hint: EdgeRowHint,
    ) {
        let (corrected, corrected_row) = Self::correct_selection(selection, current_row);
        trace!(
            "selection request: {} ranges, current row {}",
            corrected.len(),
            corrected_row
        );

        self.state.easy.selection = Some(SelectionRequest {
            selection: corrected.clone(),
            current_row: corrected_row,
            version: self.view.version,
        });
        self.state.easy.hints = Some(HintsRequest {
            scroll: scroll_hint,
            top_row: top_row_hint,
            bottom_row: bottom_row_hint,
        });

        if !custom_event {
            self.view.selection = corrected;
            self.view.current_row = corrected_row;
        }
    }

    pub fn set_selection_and_row_window(
        &mut self,
        selection: &[RowRange],
        current_row: i64,
        custom_event: bool,
        top_row: i64,
        bottom_row: i64,
        scroll_hint: ScrollHint,
        top_row_hint: EdgeRowHint,
        bottom_row_hint: EdgeRowHint,
    ) {
        debug_assert!(self.blocked_user_actions.is_empty());

        self.set_selection_internal(
            selection,
            current_row,
            custom_event,
            scroll_hint,
            top_row_hint,
            bottom_row_hint,
        );
        self.set_row_window_internal(top_row, bottom_row, scroll_hint, top_row_hint, bottom_row_hint);
        self.process_event(Event::SelectionAndWindowOperation);
    }

    /// Snap the current row into the nearest selected range; an empty
    /// selection collapses to `(empty, -1)`.
    fn correct_selection(selection: &[RowRange], current_row: i64) -> (Vec<RowRange>, i64) {
        let mut result_row = current_row;
        let mut distance = i64::MAX;

        for range in selection {
            let new_distance = range.distance_to(current_row);
            if new_distance < distance {
                result_row = range.nearest_row(current_row);
                distance = new_distance;
            }
        }

        if distance == i64::MAX {
            return (Vec::new(), -1);
        }
        (selection.to_vec(), result_row)
    }

    pub fn sort(&mut self, column: usize, direction: SortDirection) {
        self.state.heavy.sorting = Some(SortParameters { column, direction });
        self.process_event(Event::SortOperation);
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.state.heavy.filter = Some(filter.into());
        self.process_event(Event::FilterOperation);
    }

    /// Ask the back for the currently selected id set; used to delete
    /// selected rows through the producer.
    pub fn report_selected(&mut self) {
        self.state.heavy.report_selected = true;
        self.process_event(Event::DeleteOperation);
    }

    /// Append a producer delta batch to the pending buffer.
    pub fn push_deltas(&mut self, deltas: impl IntoIterator<Item = RowDelta>) {
        self.state.data.buffer.extend(deltas);
        self.process_event(Event::NewDataPackReceived);
    }

    pub fn set_loading_finished(&mut self, finished: bool) {
        self.state.data.loading = if finished {
            LoadingStatus::Finished
        } else {
            LoadingStatus::Started
        };
        self.state.frontend_ready = finished;
        self.process_event(Event::FrontEndStateChanged);

        if finished {
            self.process_event(Event::LoadingFinished);
        }
    }

    /// Enabling suspension needs no request of its own: the flag rides on
    /// every future heavy operation and diverts writes into the shadow.
    /// Disabling marks a resume so the next heavy operation drains the
    /// shadow even without fresh deltas.
    pub fn set_suspend_updates(&mut self, suspend: bool) {
        self.suspend_updates = suspend;
        if !suspend {
            self.state.data.resume_updates = true;
        }
        self.process_event(Event::UpdateSuspensionFlagChanged);
    }

    pub fn set_auto_scroll(&mut self, auto_scroll: bool) {
        self.send(BackRequest::SetAutoScroll(auto_scroll));
    }

    pub fn perform_user_query(&mut self, sql: impl Into<String>, params: Vec<Value>) -> bool {
        if self.state.query.is_some() || self.state.backend.pending_user_query {
            error!("a user query is already being executed");
            return false;
        }
        self.state.query = Some((sql.into(), params));
        self.process_event(Event::UserQueryRequested);
        true
    }

    pub fn start_export(&mut self, path: impl Into<PathBuf>, columns: Vec<ColumnExportInfo>) -> bool {
        if self.pending_export {
            return false;
        }
        self.pending_export = true;
        self.send(BackRequest::Export {
            path: path.into(),
            columns,
        });
        true
    }

    pub fn abort_export(&mut self) -> bool {
        if self.pending_export {
            self.worker.stop_export();
            return true;
        }
        false
    }

    /// Drop all local data and recreate the pending state; the back clears
    /// both tables asynchronously.
    pub fn clear(&mut self) {
        if self.state.backend.pending_clear {
            debug!("clear skipped, already pending");
            return;
        }

        self.send(BackRequest::ClearTable);
        self.state = ModelState::default();
        self.state.backend.pending_clear = true;
        self.view = ViewWindowValues::default();
        self.db_records_count = 0;
        self.error = None;
        self.pending_view_window_update = false;
        self.restore_cursor();
        self.events_out.push(ModelEvent::RecordsCountChanged(0));
        self.events_out.push(ModelEvent::ModelReset);
    }

    /// Halt the cursor timer before the model is torn down.
    pub fn prepare_removal(&mut self) {
        self.restore_cursor();
    }

    /// Ask the back thread to stop and join it with a bounded wait.
    pub fn stop(&mut self) {
        self.send(BackRequest::Stop);
        self.worker.join();
    }

    pub fn is_completely_stopped(&self) -> bool {
        self.worker.is_completely_stopped()
    }

    // ------------------------------------------------------------------
    // Event pump

    /// Drive timers and drain back responses; returns the notifications
    /// the host view must apply. Call from the host loop, at the latest by
    /// [`next_deadline`](Self::next_deadline).
    pub fn poll(&mut self) -> Vec<ModelEvent> {
        if self.state.processor.poll_timer(Instant::now()) {
            self.process_event(Event::TimerExpired);
        }

        loop {
            match self.responses.try_recv() {
                Ok(response) => self.handle_response(response),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        self.update_cursor();
        std::mem::take(&mut self.events_out)
    }

    fn flags(&self) -> PendingFlags {
        PendingFlags {
            frontend_ready: self.state.frontend_ready,
            backend_ready: self.state.backend.is_ready(),
            user_query_needed: self.state.query.is_some(),
            easy_needed: self.state.easy.is_needed(),
            heavy_needed: self.state.heavy.is_needed(),
            data_needed: self.state.data.is_needed(),
        }
    }

    fn send(&self, request: BackRequest) {
        // a dead back thread surfaces through its own error response
        let _ = self.requests.send(request);
    }

    fn process_event(&mut self, event: Event) -> Command {
        let flags = self.flags();
        let busy = self.state.processor.is_busy(&flags);
        if busy != self.reported_busy {
            self.reported_busy = busy;
            self.events_out.push(ModelEvent::BusyChanged(busy));
        }

        let command = self.state.processor.process_event(event, &flags);
        trace!("event {:?} -> {:?}, op {}", event, command, self.operation_id);

        match command {
            Command::SendUserAction => {
                self.operation_id += 1;
                self.state.backend.pending_update = Some(self.operation_id);

                let rows = self.state.easy.rows.unwrap_or(RowRequest {
                    window: self.view.rows,
                    visible: self.view.rows_visible,
                    version: self.view.version,
                });
                let selection = self
                    .state
                    .easy
                    .selection
                    .clone()
                    .unwrap_or_else(|| SelectionRequest {
                        selection: self.view.selection.clone(),
                        current_row: self.view.current_row,
                        version: self.view.version,
                    });
                let hints = self.state.easy.hints.unwrap_or(HintsRequest {
                    scroll: self.view.scroll_hint,
                    top_row: self.view.top_row_hint,
                    bottom_row: self.view.bottom_row_hint,
                });

                self.send(BackRequest::ProcessEasy {
                    request_id: self.operation_id,
                    rows,
                    selection,
                    hints,
                });
                self.state.last_update_request = Some(Instant::now());
                self.state.easy = PendingEasyState::default();
            }
            Command::SendUpdate => {
                // the delta buffer crosses the thread boundary by swap
                let batch = std::mem::take(&mut self.state.data.buffer);
                self.state.backend.writing_len = batch.len();

                self.operation_id += 1;
                self.state.backend.pending_update = Some(self.operation_id);

                let filter = self.state.heavy.filter.take();
                self.send(BackRequest::ProcessHeavy {
                    request_id: self.operation_id,
                    batch,
                    loading: self.state.data.loading,
                    sorting: self.state.heavy.sorting,
                    filter,
                    report_selected: self.state.heavy.report_selected,
                    suspend_updates: self.suspend_updates,
                });

                self.state.data = PendingDataState::default();
                self.state.heavy = PendingHeavyState::default();
                self.state.last_update_request = Some(Instant::now());
            }
            Command::SendUserQuery => {
                debug_assert!(self.state.query.is_some());
                if let Some((sql, params)) = self.state.query.take() {
                    self.state.backend.pending_user_query = true;
                    self.send(BackRequest::PerformSelect { sql, params });
                }
            }
            Command::DoNothing => {}
        }

        if self.state.processor.is_busy(&self.flags()) {
            self.engage_cursor();
        } else {
            self.restore_cursor();
        }

        command
    }

    fn handle_response(&mut self, response: BackResponse) {
        match response {
            BackResponse::Initialized => debug!("back tables initialized"),
            BackResponse::OperationCompleted {
                selection_duration_ms,
                db_row_count,
                suspended_count,
                values,
                updated,
                selected_ids,
            } => self.on_operation_completed(
                selection_duration_ms,
                db_row_count,
                suspended_count,
                values,
                updated,
                selected_ids,
            ),
            BackResponse::ClearCompleted => {
                self.state.backend.pending_clear = false;
                self.process_event(Event::ClearCompleted);
            }
            BackResponse::UserQueryPerformed(rows) => {
                self.state.backend.pending_user_query = false;
                self.events_out.push(ModelEvent::UserQueryPerformed(rows));
                self.process_event(Event::UserQueryCompleted);
            }
            BackResponse::ExportProgress(percent) => {
                self.events_out.push(ModelEvent::ExportProgress(percent));
            }
            BackResponse::ExportFinished(error) => {
                self.pending_export = false;
                self.events_out.push(ModelEvent::ExportFinished(error));
            }
            BackResponse::ResumeProgress(percent) => {
                self.events_out.push(ModelEvent::ResumeProgress(percent));
            }
            BackResponse::ErrorOccured { message, fatal } => {
                if fatal {
                    self.on_error(message);
                } else {
                    // a rejected user query leaves the cache intact
                    self.events_out.push(ModelEvent::Error(message));
                    if self.state.backend.pending_user_query {
                        self.state.backend.pending_user_query = false;
                        self.process_event(Event::UserQueryCompleted);
                    }
                }
            }
        }
    }

    /// Apply an incoming snapshot to the view, emitting row-granular
    /// remove/change/add diffs in that order.
    fn on_operation_completed(
        &mut self,
        selection_duration_ms: Option<i64>,
        db_row_count: Option<i64>,
        suspended_count: Option<u64>,
        values: ViewWindowValues,
        updated: bool,
        selected_ids: Option<BTreeSet<i64>>,
    ) {
        if self.error.is_some() {
            return;
        }

        if let Some(ids) = selected_ids {
            self.events_out.push(ModelEvent::SelectedIdsReported(ids));
        }

        if self.state.backend.pending_clear {
            return;
        }

        if let Some(at) = self.state.last_update_request {
            trace!(
                "op {}: updated: {}, turnaround: {} ms",
                values.request_id,
                updated,
                at.elapsed().as_millis()
            );
        }

        self.state.backend.pending_update = None;
        self.state.backend.writing_len = 0;

        if let Some(ms) = selection_duration_ms {
            self.state.processor.set_last_heavy_ms(ms);
        }

        if let Some(count) = db_row_count {
            self.db_records_count = count;
            self.events_out.push(ModelEvent::RecordsCountChanged(count));
        }

        if let Some(count) = suspended_count {
            self.events_out.push(ModelEvent::SuspendedCountChanged(count));
        }

        let executed = self.process_event(Event::BackEndStateChanged);

        // A freshly scheduled easy request would paint a stale state over
        // the one it asks for; an unchanged snapshot without a pending
        // refresh must not repaint either, or the loop never settles.
        if executed == Command::SendUserAction || (!updated && !self.pending_view_window_update) {
            self.pending_view_window_update |= updated;
            return;
        }

        self.pending_view_window_update = false;
        self.blocked_user_actions.insert(Event::SelectionOperation);
        if self.view.records_count == values.records_count {
            self.blocked_user_actions.insert(Event::WindowOperation);
        }

        let remove_range = self.view.prepare_remove_rows(values.records_count);
        if remove_range.is_valid() {
            self.view.remove_rows(values.records_count);
            self.events_out.push(ModelEvent::RowsRemoved(remove_range));
        }

        let changed_ranges = self.view.prepare_change_rows(&values);
        self.view.change_rows(&values);
        for range in changed_ranges {
            if range.is_valid() {
                self.events_out.push(ModelEvent::RowsChanged(range));
            }
        }

        let new_range = self.view.prepare_add_rows(values.records_count);
        if new_range.is_valid() {
            self.view.add_rows(values.records_count);
            self.events_out.push(ModelEvent::RowsInserted(new_range));
        }

        if self.view.selection != values.selection
            || self.view.current_row != values.current_row
            || self.view.scroll_hint != values.scroll_hint
            || self.view.top_row_hint != values.top_row_hint
            || self.view.bottom_row_hint != values.bottom_row_hint
        {
            self.view.selection = values.selection.clone();
            self.view.current_row = values.current_row;
            self.view.scroll_hint = values.scroll_hint;
            self.view.top_row_hint = values.top_row_hint;
            self.view.bottom_row_hint = values.bottom_row_hint;

            self.events_out.push(ModelEvent::SelectionUpdated {
                selection: values.selection.clone(),
                current_row: values.current_row,
            });
        }

        if self.view.extra_data != values.extra_data {
            self.view.extra_data = values.extra_data.clone();
        }

        if self.view.version != values.version {
            self.view.version = values.version;
            // the back may reclaim superseded id mappings now
            self.send(BackRequest::ConfirmVersion(values.version));
        }

        self.view.request_id = values.request_id;
        self.events_out.push(ModelEvent::ViewWindowChanged);

        self.blocked_user_actions.clear();
    }

    fn on_error(&mut self, message: String) {
        error!("storage failure: {}", message);
        self.error = Some(message.clone());

        self.state = ModelState::default();
        self.process_event(Event::ErrorOccured);

        self.view = ViewWindowValues::default();
        self.db_records_count = 0;
        self.restore_cursor();

        self.events_out.push(ModelEvent::Error(message));
        self.events_out.push(ModelEvent::RecordsCountChanged(0));
        self.events_out.push(ModelEvent::ModelReset);
    }

    // ------------------------------------------------------------------
    // Busy cursor

    fn engage_cursor(&mut self) {
        if !self.cursor.engaged && self.cursor.pending_since.is_none() {
            self.cursor.pending_since = Some(Instant::now());
        }
    }

    fn restore_cursor(&mut self) {
        if self.cursor.engaged || self.cursor.pending_since.is_some() {
            self.cursor.pending_since = None;
            self.cursor.engaged = false;
        }
    }

    fn update_cursor(&mut self) {
        if self.error.is_some() {
            return;
        }
        if let Some(since) = self.cursor.pending_since {
            if !self.cursor.engaged && since.elapsed() >= events::BUSY_INDICATOR_DELAY {
                self.cursor.engaged = true;
            }
        }
    }
}

impl Drop for FrontModel {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests;
