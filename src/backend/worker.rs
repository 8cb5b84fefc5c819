//! Back thread: a message loop owning the back cache
//!
//! The front posts [`BackRequest`] values and never blocks; the worker
//! processes them in order and answers with [`BackResponse`] values, so
//! for a given request sequence the responses arrive in the same order.

use crate::backend::export::{export_csv, ColumnExportInfo};
use crate::backend::{BackCache, OperationHook, TableCacheConfig, UserQueryOutcome};
use crate::data::{DeltaBatch, Value};
use crate::view::{HintsRequest, LoadingStatus, RowRequest, SelectionRequest, SortParameters, ViewWindowValues};
use log::{debug, info};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Requests the front posts to the back thread.
pub enum BackRequest {
    InitTables,
    ProcessHeavy {
        request_id: i64,
        batch: DeltaBatch,
        loading: LoadingStatus,
        sorting: Option<SortParameters>,
        filter: Option<String>,
        report_selected: bool,
        suspend_updates: bool,
    },
    ProcessEasy {
        request_id: i64,
        rows: RowRequest,
        selection: SelectionRequest,
        hints: HintsRequest,
    },
    ConfirmVersion(i64),
    ClearTable,
    PerformSelect {
        sql: String,
        params: Vec<Value>,
    },
    SetAutoScroll(bool),
    Export {
        path: PathBuf,
        columns: Vec<ColumnExportInfo>,
    },
    Stop,
}

/// Responses the back thread posts to the front.
pub enum BackResponse {
    Initialized,
    OperationCompleted {
        selection_duration_ms: Option<i64>,
        db_row_count: Option<i64>,
        suspended_count: Option<u64>,
        values: ViewWindowValues,
        updated: bool,
        selected_ids: Option<BTreeSet<i64>>,
    },
    ClearCompleted,
    UserQueryPerformed(Vec<Vec<Value>>),
    ExportProgress(u8),
    ExportFinished(Option<String>),
    ResumeProgress(u8),
    ErrorOccured {
        message: String,
        /// True for storage failures that poison the cache; false for
        /// rejected user queries, which leave the state untouched.
        fatal: bool,
    },
}

/// Handle to the spawned back thread.
pub struct BackWorker {
    handle: Option<JoinHandle<()>>,
    finished: Arc<AtomicBool>,
    export_stop: Arc<AtomicBool>,
}

impl BackWorker {
    /// Spawn the back thread. The cache itself is constructed on the back
    /// thread; a construction failure surfaces as a fatal `ErrorOccured`.
    pub fn spawn(
        config: TableCacheConfig,
        hook: Option<Box<dyn OperationHook>>,
        requests: Receiver<BackRequest>,
        responses: Sender<BackResponse>,
    ) -> Self {
        let finished = Arc::new(AtomicBool::new(false));
        let export_stop = Arc::new(AtomicBool::new(false));

        let thread_finished = finished.clone();
        let thread_export_stop = export_stop.clone();
        let handle = std::thread::Builder::new()
            .name(format!("gridcache-{}", config.table_name))
            .spawn(move || {
                run_back_loop(config, hook, requests, &responses, &thread_export_stop);
                thread_finished.store(true, Ordering::Release);
            })
            .expect("failed to spawn back thread");

        Self {
            handle: Some(handle),
            finished,
            export_stop,
        }
    }

    /// Request the running export to stop at the next row.
    pub fn stop_export(&self) {
        self.export_stop.store(true, Ordering::Relaxed);
    }

    /// Bounded join: wait in 500 ms steps for up to 50 s, then abandon
    /// the thread. There is no way to force-terminate a thread; an
    /// abandoned worker keeps `is_completely_stopped` false.
    pub fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        for i in 0..100 {
            if self.finished.load(Ordering::Acquire) {
                let _ = handle.join();
                return;
            }
            info!("waiting for back thread ({})", i);
            std::thread::sleep(Duration::from_millis(500));
        }
        debug!("back thread did not stop in time, abandoning it");
        self.handle = Some(handle);
    }

    /// True once the message loop returned and the thread was joined.
    pub fn is_completely_stopped(&self) -> bool {
        self.handle.is_none() && self.finished.load(Ordering::Acquire)
    }
}

fn run_back_loop(
    config: TableCacheConfig,
    hook: Option<Box<dyn OperationHook>>,
    requests: Receiver<BackRequest>,
    responses: &Sender<BackResponse>,
    export_stop: &AtomicBool,
) {
    let mut back = match BackCache::new(&config) {
        Ok(back) => back,
        Err(e) => {
            let _ = responses.send(BackResponse::ErrorOccured {
                message: e.to_string(),
                fatal: true,
            });
            return;
        }
    };
    if let Some(hook) = hook {
        back.set_hook(hook);
    }
    info!("back cache ready, table {}", back.table_name());

    while let Ok(request) = requests.recv() {
        match request {
            BackRequest::InitTables => {
                back.init_tables();
                drain_errors(&mut back, responses);
                let _ = responses.send(BackResponse::Initialized);
            }
            BackRequest::ProcessHeavy {
                request_id,
                batch,
                loading,
                sorting,
                filter,
                report_selected,
                suspend_updates,
            } => {
                let mut progress = |percent: u8| {
                    let _ = responses.send(BackResponse::ResumeProgress(percent));
                };
                let outcome = back.process_heavy(
                    request_id,
                    batch,
                    loading,
                    sorting,
                    filter,
                    report_selected,
                    suspend_updates,
                    &mut progress,
                );
                drain_errors(&mut back, responses);
                let _ = responses.send(BackResponse::OperationCompleted {
                    selection_duration_ms: outcome.selection_duration_ms,
                    db_row_count: outcome.db_row_count,
                    suspended_count: Some(outcome.suspended_count),
                    values: outcome.values,
                    updated: outcome.updated,
                    selected_ids: outcome.selected_ids,
                });
            }
            BackRequest::ProcessEasy {
                request_id,
                rows,
                selection,
                hints,
            } => {
                let outcome = back.process_easy(request_id, rows, selection, hints);
                drain_errors(&mut back, responses);
                let _ = responses.send(BackResponse::OperationCompleted {
                    selection_duration_ms: None,
                    db_row_count: None,
                    suspended_count: None,
                    values: outcome.values,
                    updated: outcome.updated,
                    selected_ids: None,
                });
            }
            BackRequest::ConfirmVersion(version) => {
                back.confirm_version(version);
            }
            BackRequest::ClearTable => {
                back.clear_table();
                drain_errors(&mut back, responses);
                let _ = responses.send(BackResponse::ClearCompleted);
            }
            BackRequest::PerformSelect { sql, params } => {
                match back.perform_select(&sql, &params) {
                    UserQueryOutcome::Rows(rows) => {
                        let _ = responses.send(BackResponse::UserQueryPerformed(rows));
                    }
                    UserQueryOutcome::NotSelect => {
                        let _ = responses.send(BackResponse::ErrorOccured {
                            message: "only select statements are allowed here".to_string(),
                            fatal: false,
                        });
                    }
                    UserQueryOutcome::Failed => {
                        drain_errors(&mut back, responses);
                    }
                }
            }
            BackRequest::SetAutoScroll(auto_scroll) => {
                back.set_auto_scroll(auto_scroll);
            }
            BackRequest::Export { path, columns } => {
                let mut progress = |percent: u8| {
                    let _ = responses.send(BackResponse::ExportProgress(percent));
                };
                let error = export_csv(&mut back, &path, &columns, export_stop, &mut progress);
                export_stop.store(false, Ordering::Relaxed);
                let _ = responses.send(BackResponse::ExportFinished(error));
            }
            BackRequest::Stop => break,
        }
    }
    debug!("back loop finished, table {}", back.table_name());
}

fn drain_errors(back: &mut BackCache, responses: &Sender<BackResponse>) {
    for message in back.take_errors() {
        let _ = responses.send(BackResponse::ErrorOccured {
            message,
            fatal: true,
        });
    }
}
