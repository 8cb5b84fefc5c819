//! Typed façade over one table of the embedded store
//!
//! Builds the canonical statements (create, clear, insert-or-replace,
//! delete, select by id) from a field descriptor list at construction.
//! Tables are cleared, never dropped: dropping a table invalidates open
//! cursors on the same connection.

use crate::data::{FieldDescriptor, Value};
use crate::storage::StoreHandle;
use crate::{CacheError, Result};
use rusqlite::params_from_iter;
use std::sync::atomic::{AtomicI64, Ordering};

/// Maximum number of SQL variables the engine accepts in one statement.
pub const SQLITE_MAX_VARIABLE_NUMBER: usize = 999;

/// Placeholder substituted with the table name in raw SQL templates.
pub const TABLE_PLACEHOLDER: &str = "$table$";
/// Placeholder substituted with the joined column list.
pub const FIELDS_PLACEHOLDER: &str = "$fields$";
/// Placeholder substituted with the active filter (`TRUE` when empty).
pub const FILTER_PLACEHOLDER: &str = "$filter$";

static INSTANCE_COUNTER: AtomicI64 = AtomicI64::new(0);

/// Append an atomic monotonically-increasing counter so several instances
/// sharing one connection cannot collide.
pub fn make_unique_name(name: &str) -> String {
    let n = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}{}", name, n + 1)
}

#[derive(Debug)]
pub struct CacheTable {
    store: StoreHandle,
    name: String,
    field_names: Vec<String>,
    fields: String,

    insert_sql: String,
    delete_sql: String,
    select_sql: String,
    create_sql: String,
    clear_sql: String,
}

impl CacheTable {
    pub fn new(
        store: StoreHandle,
        table_name: String,
        field_list: &[FieldDescriptor],
        primary_key: &str,
    ) -> Result<Self> {
        if field_list.len() >= SQLITE_MAX_VARIABLE_NUMBER {
            return Err(CacheError::FieldCountExceeded(field_list.len()));
        }

        let field_names: Vec<String> = field_list.iter().map(|f| f.name.clone()).collect();
        let fields = field_names.join(",");

        let fields_with_types = field_list
            .iter()
            .map(|f| {
                let mut ddl = format!("{} {}", f.name, f.field_type.ddl_type());
                if f.name == primary_key {
                    ddl.push_str(" PRIMARY KEY");
                }
                ddl
            })
            .collect::<Vec<_>>()
            .join(",");

        let parameters = vec!["?"; field_list.len()].join(",");

        Ok(Self {
            insert_sql: format!("INSERT OR REPLACE INTO {} VALUES ({})", table_name, parameters),
            delete_sql: format!("DELETE FROM {} WHERE id = ?", table_name),
            select_sql: format!("SELECT {} FROM {} WHERE id = ?", fields, table_name),
            create_sql: format!("CREATE TABLE {} ({})", table_name, fields_with_types),
            clear_sql: format!("DELETE FROM {}", table_name),
            store,
            name: table_name,
            field_names,
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self, column: usize) -> &str {
        &self.field_names[column]
    }

    pub fn column_count(&self) -> usize {
        self.field_names.len()
    }

    pub fn create(&self) -> Result<()> {
        self.store
            .with(|conn| conn.execute_batch(&self.create_sql))
    }

    pub fn clear(&self) -> Result<()> {
        self.store.with(|conn| conn.execute(&self.clear_sql, []))?;
        Ok(())
    }

    pub fn insert_or_replace(&self, values: &[Value]) -> Result<()> {
        self.store.with(|conn| {
            conn.prepare_cached(&self.insert_sql)?
                .execute(params_from_iter(values.iter()))
        })?;
        Ok(())
    }

    pub fn delete_row(&self, id: i64) -> Result<()> {
        self.store
            .with(|conn| conn.prepare_cached(&self.delete_sql)?.execute([id]))?;
        Ok(())
    }

    /// Fetch one full row by id; `None` when the id is absent.
    pub fn select_row(&self, id: i64) -> Result<Option<Vec<Value>>> {
        self.store.with(|conn| {
            let mut stmt = conn.prepare_cached(&self.select_sql)?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => {
                    let mut values = Vec::with_capacity(self.field_names.len());
                    for i in 0..self.field_names.len() {
                        values.push(row.get::<_, Value>(i)?);
                    }
                    Ok(Some(values))
                }
                None => Ok(None),
            }
        })
    }

    pub fn row_count(&self) -> Result<i64> {
        let sql = format!("SELECT count(1) FROM {}", self.name);
        self.store
            .with(|conn| conn.query_row(&sql, [], |row| row.get(0)))
    }

    /// Substitute the `$table$`, `$fields$` and `$filter$` placeholders.
    /// An empty filter becomes the literal `TRUE`.
    pub fn specify_sql(&self, template: &str, filter: &str) -> String {
        let filter = if filter.is_empty() { "TRUE" } else { filter };
        template
            .replace(TABLE_PLACEHOLDER, &self.name)
            .replace(FIELDS_PLACEHOLDER, &self.fields)
            .replace(FILTER_PLACEHOLDER, filter)
    }

    /// Run a raw statement after placeholder substitution, materializing
    /// all result rows.
    pub fn perform_sql(
        &self,
        template: &str,
        params: &[Value],
        filter: &str,
    ) -> Result<Vec<Vec<Value>>> {
        let sql = self.specify_sql(template, filter);
        self.store.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns = stmt.column_count();
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns);
                for i in 0..columns {
                    values.push(row.get::<_, Value>(i)?);
                }
                result.push(values);
            }
            Ok(result)
        })
    }

    /// Run a single-column `SELECT` after placeholder substitution,
    /// collecting the first column as ids in result order.
    pub fn select_ids(&self, template: &str, filter: &str) -> Result<Vec<i64>> {
        let sql = self.specify_sql(template, filter);
        self.store.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut ids = Vec::new();
            while let Some(row) = rows.next()? {
                ids.push(row.get(0)?);
            }
            Ok(ids)
        })
    }

    /// Escape a text literal for direct inclusion in a filter expression.
    pub fn escape_field(field: &str) -> String {
        format!("'{}'", field.replace('\'', "''"))
    }
}
