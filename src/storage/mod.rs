//! Embedded SQL store access
//!
//! The back thread owns the connection; every primitive (prepare, exec,
//! fetch) takes the handle mutex individually so the connection object
//! stays safe even if a plugin reaches it from the wrong thread. The
//! supported model is single-threaded back usage.

pub mod cache_table;
pub mod text_filter;

pub use cache_table::{make_unique_name, CacheTable, SQLITE_MAX_VARIABLE_NUMBER};
pub use text_filter::TextFilter;

use crate::Result;
use parking_lot::Mutex;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

/// Number of pre-fetch rows kept on each side of the visible window.
pub const ROW_WINDOW_OFFSET: i64 = 50;

/// Shared handle to one SQLite connection.
#[derive(Clone, Debug)]
pub struct StoreHandle {
    conn: Arc<Mutex<Connection>>,
}

impl StoreHandle {
    /// Open a transient in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open (or create) a file-backed store.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        register_regexp(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run one SQL primitive under the connection mutex.
    pub fn with<R>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<R>) -> Result<R> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    pub fn begin_transaction(&self) -> Result<()> {
        self.with(|conn| conn.execute_batch("BEGIN"))
    }

    pub fn commit(&self) -> Result<()> {
        self.with(|conn| conn.execute_batch("COMMIT"))
    }

    pub fn rollback(&self) -> Result<()> {
        self.with(|conn| conn.execute_batch("ROLLBACK"))
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// SQLite has no REGEXP implementation of its own; the filter grammar
/// needs one. Compiled patterns are cached per statement via the aux slot.
fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let regex: Arc<Regex> =
                ctx.get_or_create_aux(0, |vr| -> std::result::Result<Regex, BoxError> {
                    Ok(Regex::new(vr.as_str()?)?)
                })?;
            let text = ctx
                .get_raw(1)
                .as_str_or_null()
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            Ok(text.map(|t| regex.is_match(t)).unwrap_or(false))
        },
    )
}
