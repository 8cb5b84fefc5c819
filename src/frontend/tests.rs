use super::*;
use crate::backend::{HookContext, StorageKind};
use crate::data::{CommonIndexRanges, FieldDescriptor, FieldType};
use std::collections::BTreeSet;
use std::time::Duration;

fn fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("id", FieldType::Integer),
        FieldDescriptor::new("name", FieldType::Text),
        FieldDescriptor::new("common", FieldType::TextNoCase),
    ]
}

fn config() -> TableCacheConfig {
    let common: CommonIndexRanges = [(2usize, BTreeSet::from([1usize]))].into_iter().collect();
    TableCacheConfig::new("quotes", fields()).common_index_ranges(common)
}

fn upsert(id: i64, name: &str) -> RowDelta {
    RowDelta::Upsert(vec![Value::Integer(id), name.into(), Value::Null])
}

/// Pump the model until `pred` holds, collecting every event on the way.
fn poll_until(model: &mut FrontModel, pred: impl Fn(&FrontModel) -> bool) -> Vec<ModelEvent> {
    let mut events = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        events.extend(model.poll());
        if pred(model) {
            return events;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("condition not reached in time; events so far: {:?}", events);
}

/// Pump the model until the collected events satisfy `pred`.
fn poll_until_event(
    model: &mut FrontModel,
    pred: impl Fn(&[ModelEvent]) -> bool,
) -> Vec<ModelEvent> {
    let mut events = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        events.extend(model.poll());
        if pred(&events) {
            return events;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("event not seen in time; events so far: {:?}", events);
}

fn loaded_model(rows: &[(i64, &str)]) -> FrontModel {
    let mut model = FrontModel::new(config()).unwrap();
    model.push_deltas(rows.iter().map(|&(id, name)| upsert(id, name)));
    model.set_loading_finished(true);
    poll_until(&mut model, |m| m.row_count() == rows.len() as i64);
    model
}

#[test]
fn test_initial_load_scenario() {
    let mut model = FrontModel::new(config()).unwrap();
    model.push_deltas([upsert(1, "a"), upsert(2, "b"), upsert(3, "c")]);
    model.set_loading_finished(true);

    let events = poll_until(&mut model, |m| m.row_count() == 3);

    assert_eq!(model.view().version, 1);
    assert_eq!(model.view().rows, RowRange::new(0, 2));
    assert_eq!(model.view().rows_visible, RowRange::new(0, 2));
    assert_eq!(model.cell(0, 1), Some(&Value::Text("a".into())));
    assert_eq!(model.cell(2, 1), Some(&Value::Text("c".into())));
    assert_eq!(model.summary().count, 3);
    assert_eq!(model.summary().received_count, 3);

    assert!(events.contains(&ModelEvent::RowsInserted(RowRange::new(0, 2))));
    assert!(events.contains(&ModelEvent::RecordsCountChanged(3)));
    assert!(events.contains(&ModelEvent::ViewWindowChanged));
}

#[test]
fn test_resort_scenario() {
    let mut model = loaded_model(&[(1, "a"), (2, "b"), (3, "c")]);

    model.set_selection(
        &[RowRange::new(0, 0)],
        0,
        false,
        ScrollHint::None,
        EdgeRowHint::Full,
        EdgeRowHint::Full,
    );
    poll_until(&mut model, |m| {
        m.view().request_id >= 2 && !m.is_busy()
    });
    assert_eq!(model.view().selection, vec![RowRange::new(0, 0)]);

    model.sort(1, SortDirection::Descending);
    let events = poll_until(&mut model, |m| m.view().version == 2);

    assert_eq!(model.cell(0, 0), Some(&Value::Integer(3)));
    assert_eq!(model.cell(2, 0), Some(&Value::Integer(1)));
    // the selection that pointed at id 1 followed it to its new row
    assert_eq!(model.view().selection, vec![RowRange::new(2, 2)]);
    assert_eq!(model.view().current_row, 2);
    assert!(events.iter().any(|e| matches!(
        e,
        ModelEvent::SelectionUpdated { current_row: 2, .. }
    )));
}

#[test]
fn test_delete_in_view_scenario() {
    let mut model = loaded_model(&[(1, "a"), (2, "b"), (3, "c")]);

    model.set_selection(
        &[RowRange::new(1, 1)],
        1,
        false,
        ScrollHint::None,
        EdgeRowHint::Full,
        EdgeRowHint::Full,
    );
    poll_until(&mut model, |m| !m.is_busy());

    model.push_deltas([RowDelta::Delete(2)]);
    let events = poll_until(&mut model, |m| m.row_count() == 2);

    assert_eq!(model.cell(0, 0), Some(&Value::Integer(1)));
    assert_eq!(model.cell(1, 0), Some(&Value::Integer(3)));
    assert!(model.view().selection.is_empty());
    assert_eq!(model.view().current_row, -1);
    assert!(events.contains(&ModelEvent::RowsRemoved(RowRange::new(2, 2))));
    assert!(events.iter().any(|e| matches!(
        e,
        ModelEvent::SelectionUpdated { current_row: -1, .. }
    )));
}

#[test]
fn test_suspend_resume_scenario() {
    let mut model = loaded_model(&[(1, "a"), (2, "b"), (3, "c")]);

    model.set_suspend_updates(true);
    model.push_deltas([upsert(4, "d"), upsert(5, "e")]);
    poll_until_event(&mut model, |events| {
        events.contains(&ModelEvent::SuspendedCountChanged(2))
    });
    // the visible table did not move while suspended
    assert_eq!(model.row_count(), 3);

    model.set_suspend_updates(false);
    let events = poll_until(&mut model, |m| m.row_count() == 5);

    assert!(events
        .iter()
        .any(|e| matches!(e, ModelEvent::ResumeProgress(100))));
    assert!(events.contains(&ModelEvent::SuspendedCountChanged(0)));
    assert!(events.contains(&ModelEvent::RowsInserted(RowRange::new(3, 4))));
    assert_eq!(model.cell(3, 1), Some(&Value::Text("d".into())));
    assert_eq!(model.cell(4, 1), Some(&Value::Text("e".into())));
}

#[test]
fn test_filter_scenario() {
    let mut model = loaded_model(&[(1, "a"), (2, "b"), (3, "c")]);

    model.set_filter("name GLOB '*b*'");
    poll_until(&mut model, |m| m.row_count() == 1);
    assert_eq!(model.cell(0, 0), Some(&Value::Integer(2)));

    model.set_filter("");
    poll_until(&mut model, |m| m.row_count() == 3);
}

struct FailingHook;

impl OperationHook for FailingHook {
    fn is_insertion_needed(&self) -> bool {
        true
    }
    fn process_data_inserted(&mut self, ctx: &HookContext<'_>) -> crate::Result<()> {
        ctx.perform_sql("UPDATE $table$ SET missing_column = 1", &[])?;
        Ok(())
    }
}

#[test]
fn test_storage_error_scenario() {
    let mut model = FrontModel::with_hook(config(), Some(Box::new(FailingHook))).unwrap();
    model.push_deltas([upsert(1, "a")]);
    model.set_loading_finished(true);

    let events = poll_until(&mut model, |m| m.summary().error.is_some());

    let errors: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ModelEvent::Error(_)))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(events.contains(&ModelEvent::ModelReset));
    assert_eq!(model.row_count(), 0);
    assert!(model.summary().error.as_deref().unwrap().contains("storage error"));

    // the model is terminal now: further events change nothing
    model.push_deltas([upsert(2, "b")]);
    for _ in 0..20 {
        model.poll();
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(model.row_count(), 0);
    assert!(!model.is_busy());
}

#[test]
fn test_user_query() {
    let mut model = loaded_model(&[(1, "a"), (2, "b"), (3, "c")]);

    assert!(model.perform_user_query("SELECT count(1) FROM $table$ WHERE $filter$", vec![]));
    // a second query cannot start while one is pending
    assert!(!model.perform_user_query("SELECT 1", vec![]));

    let events = poll_until(&mut model, |m| !m.is_busy());
    let rows = events
        .iter()
        .find_map(|e| match e {
            ModelEvent::UserQueryPerformed(rows) => Some(rows.clone()),
            _ => None,
        })
        .expect("query result expected");
    assert_eq!(rows, vec![vec![Value::Integer(3)]]);
}

#[test]
fn test_user_query_rejects_non_select() {
    let mut model = loaded_model(&[(1, "a")]);

    assert!(model.perform_user_query("DELETE FROM $table$", vec![]));
    let events = poll_until(&mut model, |m| !m.is_busy());

    assert!(events
        .iter()
        .any(|e| matches!(e, ModelEvent::Error(m) if m.contains("select"))));
    // the rejection is not fatal: the cache keeps serving data
    assert!(model.summary().error.is_none());
    assert_eq!(model.row_count(), 1);

    // and a proper query still goes through afterwards
    assert!(model.perform_user_query("SELECT id FROM $table$ WHERE $filter$", vec![]));
    let events = poll_until(&mut model, |m| !m.is_busy());
    assert!(events
        .iter()
        .any(|e| matches!(e, ModelEvent::UserQueryPerformed(_))));
}

#[test]
fn test_export() {
    let mut model = loaded_model(&[(1, "a"), (2, "b"), (3, "c")]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.csv");

    let columns = vec![
        ColumnExportInfo {
            column: 0,
            header: "Id".into(),
        },
        ColumnExportInfo {
            column: 1,
            header: "Name".into(),
        },
    ];
    assert!(model.start_export(&path, columns.clone()));
    // a second export cannot start while one runs
    assert!(!model.start_export(&path, columns));

    let events = poll_until_event(&mut model, |events| {
        events
            .iter()
            .any(|e| matches!(e, ModelEvent::ExportFinished(_)))
    });
    assert!(events.contains(&ModelEvent::ExportFinished(None)));

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, "Id,Name\n1,a\n2,b\n3,c\n");
}

#[test]
fn test_window_margin_on_large_table() {
    let rows: Vec<(i64, String)> = (1..=300).map(|i| (i, format!("n{:03}", i))).collect();
    let borrowed: Vec<(i64, &str)> = rows.iter().map(|(i, s)| (*i, s.as_str())).collect();
    let mut model = loaded_model(&borrowed);

    model.set_row_window(
        100,
        110,
        ScrollHint::None,
        EdgeRowHint::Full,
        EdgeRowHint::Full,
    );
    poll_until(&mut model, |m| m.view().rows_visible == RowRange::new(100, 110));

    let view = model.view();
    assert!(view
        .rows
        .contains_with_padding(&view.rows_visible, ROW_WINDOW_OFFSET));
}

#[test]
fn test_clear_scenario() {
    let mut model = loaded_model(&[(1, "a"), (2, "b"), (3, "c")]);

    model.clear();
    assert_eq!(model.row_count(), 0);
    assert_eq!(model.summary().count, 0);
    assert_eq!(model.summary().received_count, 0);

    // after the back confirms, data can flow again
    model.push_deltas([upsert(7, "g")]);
    model.set_loading_finished(true);
    poll_until(&mut model, |m| m.row_count() == 1);
    assert_eq!(model.cell(0, 0), Some(&Value::Integer(7)));
}

#[test]
fn test_report_selected_ids() {
    let mut model = loaded_model(&[(1, "a"), (2, "b"), (3, "c")]);
    model.set_selection(
        &[RowRange::new(0, 1)],
        0,
        false,
        ScrollHint::None,
        EdgeRowHint::Full,
        EdgeRowHint::Full,
    );
    poll_until(&mut model, |m| !m.is_busy());

    model.report_selected();
    let events = poll_until(&mut model, |m| !m.is_busy());
    let ids = events
        .iter()
        .find_map(|e| match e {
            ModelEvent::SelectedIdsReported(ids) => Some(ids.clone()),
            _ => None,
        })
        .expect("selected ids expected");
    assert_eq!(ids, BTreeSet::from([1, 2]));
}

#[test]
fn test_selection_corrected_to_nearest_row() {
    let (selection, row) = FrontModel::correct_selection(&[RowRange::new(5, 9)], 20);
    assert_eq!(selection, vec![RowRange::new(5, 9)]);
    assert_eq!(row, 9);

    let (selection, row) = FrontModel::correct_selection(&[], 20);
    assert!(selection.is_empty());
    assert_eq!(row, -1);

    let ranges = [RowRange::new(0, 2), RowRange::new(10, 12)];
    let (_, row) = FrontModel::correct_selection(&ranges, 9);
    assert_eq!(row, 10);
}

#[test]
fn test_file_storage() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config().storage(StorageKind::File(dir.path().join("cache.db")));
    let mut model = FrontModel::new(cfg).unwrap();
    model.push_deltas([upsert(1, "a")]);
    model.set_loading_finished(true);
    poll_until(&mut model, |m| m.row_count() == 1);
    assert!(dir.path().join("cache.db").exists());
}

#[test]
fn test_stop_and_join() {
    let mut model = loaded_model(&[(1, "a")]);
    assert!(!model.is_completely_stopped());
    model.stop();
    assert!(model.is_completely_stopped());
}

#[test]
fn test_default_sort_indicator() {
    let cfg = config().default_sort(vec![vec![1]], SortDirection::Descending);
    let model = FrontModel::new(cfg).unwrap();
    assert_eq!(
        model.default_sort_indicator(),
        Some((1, SortDirection::Descending))
    );

    let model = FrontModel::new(config()).unwrap();
    assert_eq!(model.default_sort_indicator(), None);
}

#[test]
fn test_construction_rejects_bad_sort_order() {
    let cfg = config().default_sort(vec![vec![0], vec![0]], SortDirection::Ascending);
    assert!(matches!(
        FrontModel::new(cfg),
        Err(crate::CacheError::InvalidSortOrder(_))
    ));
}
