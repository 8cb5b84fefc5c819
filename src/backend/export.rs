//! CSV export of the current selection order
//!
//! Runs on the back thread, streaming one row at a time so arbitrarily
//! large tables export in constant memory. Cancellation is cooperative:
//! the stop flag is polled per row and a cancelled export removes the
//! partial output file.

use crate::backend::BackCache;
use crate::data::Value;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// One exported column: its index in the row and the header to print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnExportInfo {
    pub column: usize,
    pub header: String,
}

/// Quote a cell per RFC 4180 when it contains a separator, quote or
/// line break.
fn csv_cell(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_row(out: &mut impl Write, cells: impl Iterator<Item = String>) -> std::io::Result<()> {
    let line = cells.map(|c| csv_cell(&c)).collect::<Vec<_>>().join(",");
    writeln!(out, "{}", line)
}

/// Stream every row of the current selection to `path`.
///
/// Returns the error message on failure, `None` on success or
/// cancellation. The caller resets `stop` afterwards.
pub(crate) fn export_csv(
    back: &mut BackCache,
    path: &Path,
    columns: &[ColumnExportInfo],
    stop: &AtomicBool,
    progress: &mut dyn FnMut(u8),
) -> Option<String> {
    let file = match File::create(path) {
        Ok(file) => file,
        Err(e) => return Some(format!("export file is not valid: {}", e)),
    };
    let mut out = BufWriter::new(file);

    let result = export_rows(back, &mut out, columns, stop, progress);
    drop(out);

    if stop.load(Ordering::Relaxed) {
        let _ = std::fs::remove_file(path);
        return None;
    }
    result.err().map(|e| e.to_string())
}

fn export_rows(
    back: &mut BackCache,
    out: &mut impl Write,
    columns: &[ColumnExportInfo],
    stop: &AtomicBool,
    progress: &mut dyn FnMut(u8),
) -> std::io::Result<()> {
    write_row(out, columns.iter().map(|c| c.header.clone()))?;

    let total = back.view().records_count;
    let mut last_percent = 0u8;
    for row in 0..total {
        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }

        let values = back.record(row).unwrap_or_default();
        let cell = |c: &ColumnExportInfo| {
            values
                .get(c.column)
                .map(Value::render)
                .unwrap_or_default()
        };
        write_row(out, columns.iter().map(cell))?;

        let percent = ((row + 1) * 100 / total) as u8;
        if percent != last_percent {
            last_percent = percent;
            progress(percent);
        }
    }
    out.flush()
}
