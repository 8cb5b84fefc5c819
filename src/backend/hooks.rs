//! Optional plugin hook invoked by the back cache around its operations

use crate::data::Value;
use crate::storage::CacheTable;
use crate::view::ViewWindowValues;
use crate::Result;

/// SQL access handed to a hook while it runs inside a back-cache
/// operation. Statements are substituted against the main table and the
/// currently active filter.
pub struct HookContext<'a> {
    table: &'a CacheTable,
    filter: &'a str,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(table: &'a CacheTable, filter: &'a str) -> Self {
        Self { table, filter }
    }

    /// Run a raw statement with `$table$`/`$fields$`/`$filter$`
    /// substitution. Errors propagate to the caller; inside
    /// `process_data_inserted` they abort the surrounding transaction.
    pub fn perform_sql(&self, template: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        self.table.perform_sql(template, params, self.filter)
    }
}

/// Back-side plugin interface.
///
/// All methods run on the back thread. The default implementation is a
/// transparent no-op.
pub trait OperationHook: Send {
    /// Inspect or transform an incoming row before it is written; return
    /// false to veto the insert.
    fn add_pending_value(&mut self, _values: &mut Vec<Value>) -> bool {
        true
    }

    /// Notified after a row is deleted from the main table.
    fn delete_pending_value(&mut self, _id: i64) {}

    /// When true, `process_data_inserted` runs inside the write
    /// transaction after the batch is stored.
    fn is_insertion_needed(&self) -> bool {
        false
    }

    /// Custom updates joined to the write transaction; an error rolls the
    /// whole transaction back.
    fn process_data_inserted(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Notified after each re-selection.
    fn process_data_selected(&mut self) {}

    /// Notified when the cache is cleared.
    fn process_clear(&mut self) {}

    /// Attach per-window derived aggregates to an outgoing snapshot.
    fn make_extra_data(&mut self, _values: &mut ViewWindowValues) {}
}

/// Hook that does nothing; used when no plugin is configured.
pub struct NoopHook;

impl OperationHook for NoopHook {}
