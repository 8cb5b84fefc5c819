//! gridcache — asynchronous windowed table cache
//!
//! A two-thread pipeline that buffers row deltas from a streaming producer,
//! materializes an ordered, filtered selection inside an embedded SQLite
//! store, and serves a small sliding window of fully-materialized rows to a
//! virtualized table view. Selection and scroll state survive re-sorting and
//! re-filtering through a versioned id-mapping scheme.

pub mod backend;
pub mod data;
pub mod frontend;
pub mod range;
pub mod storage;
pub mod view;

// Re-export main types
pub use backend::{
    BackCache, BackRequest, BackResponse, ColumnExportInfo, HookContext, NoopHook, OperationHook,
    StorageKind, TableCacheConfig,
};
pub use data::{DeltaBatch, FieldDescriptor, FieldType, RowDelta, Value};
pub use frontend::{FrontModel, ItemsSummary, ModelEvent};
pub use range::RowRange;
pub use storage::{StoreHandle, TextFilter};
pub use view::{
    EdgeRowHint, HintsRequest, LoadingStatus, RowRequest, ScrollHint, SelectionRequest,
    SortDirection, SortParameters, ViewWindowValues,
};

/// Cache error type
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid sort order: {0}")]
    InvalidSortOrder(String),

    #[error("field count {0} exceeds the engine variable limit")]
    FieldCountExceeded(usize),

    #[error("only select statements are allowed here")]
    QueryNotReadOnly,

    #[error("export file is not valid: {0}")]
    ExportFile(String),

    #[error("back thread is gone")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, CacheError>;
