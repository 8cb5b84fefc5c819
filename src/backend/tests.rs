use super::*;
use crate::data::FieldType;
use crate::view::EdgeRowHint;

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

fn new_back() -> BackCache {
    let mut back = BackCache::new(&config()).unwrap();
    back.init_tables();
    assert!(back.take_errors().is_empty());
    back
}

fn upsert(id: i64, name: &str) -> RowDelta {
    RowDelta::Upsert(vec![Value::Integer(id), name.into(), Value::Null])
}

fn heavy(
    back: &mut BackCache,
    request_id: i64,
    batch: DeltaBatch,
    loading: LoadingStatus,
    sorting: Option<SortParameters>,
    filter: Option<String>,
    suspend: bool,
) -> HeavyOutcome {
    back.process_heavy(
        request_id, batch, loading, sorting, filter, false, suspend, &mut |_| {},
    )
}

fn load_abc(back: &mut BackCache) -> HeavyOutcome {
    heavy(
        back,
        1,
        vec![upsert(1, "a"), upsert(2, "b"), upsert(3, "c")],
        LoadingStatus::Finished,
        None,
        None,
        false,
    )
}

fn easy_selection(back: &mut BackCache, request_id: i64, rows: &[i64]) -> EasyOutcome {
    let version = back.view.version;
    let selection: Vec<RowRange> = rows.iter().map(|&r| RowRange::new(r, r)).collect();
    let current = rows.first().copied().unwrap_or(-1);
    let rows_request = RowRequest {
        window: back.view.rows,
        visible: back.view.rows_visible,
        version,
    };
    back.process_easy(
        request_id,
        rows_request,
        SelectionRequest {
            selection,
            current_row: current,
            version,
        },
        HintsRequest::default(),
    )
}

#[test]
fn test_initial_load() {
    let mut back = new_back();
    let outcome = load_abc(&mut back);
    assert!(back.take_errors().is_empty());

    assert!(outcome.updated);
    assert_eq!(outcome.db_row_count, Some(3));
    assert_eq!(outcome.suspended_count, 0);
    assert_eq!(outcome.values.records_count, 3);
    assert_eq!(outcome.values.version, 1);
    assert_eq!(outcome.values.rows, RowRange::new(0, 2));
    assert_eq!(outcome.values.rows_visible, RowRange::new(0, 2));
    assert_eq!(outcome.values.request_id, 1);
    // materialized cells follow the selection order
    assert_eq!(outcome.values.data[0][1], Value::Text("a".into()));
    assert_eq!(outcome.values.data[2][1], Value::Text("c".into()));
}

#[test]
fn test_mapping_length_matches_filtered_count() {
    let mut back = new_back();
    load_abc(&mut back);
    let mapping_len = back.versioned_ids.get(&back.view.version).unwrap().len();
    assert_eq!(mapping_len as i64, back.table.row_count().unwrap());

    heavy(
        &mut back,
        2,
        vec![],
        LoadingStatus::NotChanged,
        None,
        Some("name GLOB '*b*'".into()),
        false,
    );
    let mapping_len = back.versioned_ids.get(&back.view.version).unwrap().len();
    assert_eq!(mapping_len, 1);
}

#[test]
fn test_empty_batch_is_noop() {
    let mut back = new_back();
    load_abc(&mut back);
    let outcome = heavy(
        &mut back,
        2,
        vec![],
        LoadingStatus::NotChanged,
        None,
        None,
        false,
    );
    assert!(!outcome.updated);
    assert_eq!(outcome.db_row_count, None);
    assert_eq!(outcome.values.version, 1);
}

#[test]
fn test_resort_transforms_selection() {
    let mut back = new_back();
    load_abc(&mut back);

    // select the row holding id 1
    let outcome = easy_selection(&mut back, 2, &[0]);
    assert!(outcome.updated);
    assert_eq!(outcome.values.selection, vec![RowRange::new(0, 0)]);
    assert_eq!(outcome.values.current_row, 0);

    // sort by name descending: ids become [3, 2, 1]
    let outcome = heavy(
        &mut back,
        3,
        vec![],
        LoadingStatus::NotChanged,
        Some(SortParameters {
            column: 1,
            direction: SortDirection::Descending,
        }),
        None,
        false,
    );
    assert!(outcome.updated);
    assert_eq!(outcome.values.version, 2);
    assert_eq!(outcome.values.data[0][0], Value::Integer(3));
    assert_eq!(outcome.values.data[2][0], Value::Integer(1));
    // the selection followed id 1 to its new row
    assert_eq!(outcome.values.selection, vec![RowRange::new(2, 2)]);
    assert_eq!(outcome.values.current_row, 2);
}

#[test]
fn test_delete_collapses_selection() {
    let mut back = new_back();
    load_abc(&mut back);
    easy_selection(&mut back, 2, &[1]); // id 2

    let outcome = heavy(
        &mut back,
        3,
        vec![RowDelta::Delete(2)],
        LoadingStatus::NotChanged,
        None,
        None,
        false,
    );
    assert_eq!(outcome.values.records_count, 2);
    assert_eq!(outcome.values.data[0][0], Value::Integer(1));
    assert_eq!(outcome.values.data[1][0], Value::Integer(3));
    assert!(outcome.values.selection.is_empty());
    assert_eq!(outcome.values.current_row, -1);
}

#[test]
fn test_selection_ranges_recoalesce() {
    let mut back = new_back();
    heavy(
        &mut back,
        1,
        (1..=6).map(|i| upsert(i, &format!("n{}", i))).collect(),
        LoadingStatus::Finished,
        None,
        None,
        false,
    );
    easy_selection(&mut back, 2, &[0, 1, 2]);

    // deleting the middle row keeps the selected id set contiguous again
    let outcome = heavy(
        &mut back,
        3,
        vec![RowDelta::Delete(2)],
        LoadingStatus::NotChanged,
        None,
        None,
        false,
    );
    assert_eq!(outcome.values.selection, vec![RowRange::new(0, 1)]);
    let ids = back.selected_ids().unwrap();
    assert_eq!(ids, BTreeSet::from([1, 3]));
}

#[test]
fn test_selected_ids_survive_reorder() {
    let mut back = new_back();
    load_abc(&mut back);
    easy_selection(&mut back, 2, &[0, 2]); // ids 1 and 3
    let before = back.selected_ids().unwrap();

    heavy(
        &mut back,
        3,
        vec![],
        LoadingStatus::NotChanged,
        Some(SortParameters {
            column: 1,
            direction: SortDirection::Descending,
        }),
        None,
        false,
    );
    let after = back.selected_ids().unwrap();
    assert_eq!(before, after);
    assert_eq!(after, BTreeSet::from([1, 3]));
}

#[test]
fn test_suspend_and_resume_roundtrip() {
    let mut back = new_back();
    load_abc(&mut back);

    // suspended deltas go to the shadow; the visible table stays put
    let outcome = heavy(
        &mut back,
        2,
        vec![upsert(4, "d"), upsert(5, "e")],
        LoadingStatus::NotChanged,
        None,
        None,
        true,
    );
    assert_eq!(outcome.values.records_count, 3);
    assert_eq!(outcome.suspended_count, 2);
    assert!(!outcome.updated);
    assert_eq!(back.table.row_count().unwrap(), 3);
    assert_eq!(back.suspended.row_count().unwrap(), 2);

    // resume with an empty batch drains the shadow with a progress stream
    let mut progress = Vec::new();
    let outcome = back.process_heavy(
        3,
        vec![],
        LoadingStatus::NotChanged,
        None,
        None,
        false,
        false,
        &mut |p| progress.push(p),
    );
    assert_eq!(outcome.values.records_count, 5);
    assert_eq!(outcome.suspended_count, 0);
    assert_eq!(back.suspended.row_count().unwrap(), 0);
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_suspended_delete_replays_on_resume() {
    let mut back = new_back();
    load_abc(&mut back);

    heavy(
        &mut back,
        2,
        vec![RowDelta::Delete(1), upsert(4, "d")],
        LoadingStatus::NotChanged,
        None,
        None,
        true,
    );
    assert_eq!(back.table.row_count().unwrap(), 3);

    let outcome = heavy(
        &mut back,
        3,
        vec![],
        LoadingStatus::NotChanged,
        None,
        None,
        false,
    );
    assert_eq!(outcome.values.records_count, 3);
    let ids: Vec<i64> = (0..3)
        .map(|r| back.record(r).unwrap()[0].as_integer().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 3, 4]);
}

#[test]
fn test_resume_is_replay_safe_with_overlap() {
    let mut back = new_back();
    load_abc(&mut back);

    // a suspended update of an existing id replays as a replace
    heavy(
        &mut back,
        2,
        vec![upsert(2, "b2")],
        LoadingStatus::NotChanged,
        None,
        None,
        true,
    );
    let outcome = heavy(
        &mut back,
        3,
        vec![],
        LoadingStatus::NotChanged,
        None,
        None,
        false,
    );
    assert_eq!(outcome.values.records_count, 3);
    assert_eq!(
        back.table.select_row(2).unwrap().unwrap()[1],
        Value::Text("b2".into())
    );
}

#[test]
fn test_initial_load_is_never_suspended() {
    let mut back = new_back();
    // selection is not allowed yet, so the suspend flag is ignored
    let outcome = heavy(
        &mut back,
        1,
        vec![upsert(1, "a")],
        LoadingStatus::NotChanged,
        None,
        None,
        true,
    );
    assert_eq!(back.table.row_count().unwrap(), 1);
    assert_eq!(back.suspended.row_count().unwrap(), 0);
    assert_eq!(outcome.suspended_count, 0);
    // before the load finishes the count is the cheap estimate
    assert_eq!(outcome.db_row_count, Some(1));
}

#[test]
fn test_filter_and_unfilter() {
    let mut back = new_back();
    load_abc(&mut back);
    easy_selection(&mut back, 2, &[1]); // id 2

    let outcome = heavy(
        &mut back,
        3,
        vec![],
        LoadingStatus::NotChanged,
        None,
        Some("name GLOB '*b*'".into()),
        false,
    );
    assert_eq!(outcome.values.records_count, 1);
    assert_eq!(outcome.values.data[0][0], Value::Integer(2));
    assert_eq!(outcome.values.selection, vec![RowRange::new(0, 0)]);

    let outcome = heavy(
        &mut back,
        4,
        vec![],
        LoadingStatus::NotChanged,
        None,
        Some(String::new()),
        false,
    );
    assert_eq!(outcome.values.records_count, 3);
    // the selection transformed back by id lookup
    assert_eq!(outcome.values.selection, vec![RowRange::new(1, 1)]);
}

#[test]
fn test_common_column_filled_from_index_ranges() {
    let mut back = new_back();
    load_abc(&mut back);
    let row = back.table.select_row(2).unwrap().unwrap();
    assert_eq!(row[2], Value::Text("]b".into()));

    let outcome = heavy(
        &mut back,
        2,
        vec![],
        LoadingStatus::NotChanged,
        None,
        Some("LOWER(common) GLOB '*b*'".into()),
        false,
    );
    assert_eq!(outcome.values.records_count, 1);
}

#[test]
fn test_confirm_version_reclaims_old_mappings() {
    let mut back = new_back();
    load_abc(&mut back);
    heavy(
        &mut back,
        2,
        vec![upsert(4, "d")],
        LoadingStatus::NotChanged,
        None,
        None,
        false,
    );
    assert_eq!(
        back.versioned_ids.keys().copied().collect::<Vec<_>>(),
        vec![1, 2]
    );

    back.confirm_version(2);
    assert_eq!(
        back.versioned_ids.keys().copied().collect::<Vec<_>>(),
        vec![2]
    );
}

#[test]
fn test_clear_resets_everything() {
    let mut back = new_back();
    load_abc(&mut back);
    easy_selection(&mut back, 2, &[0]);

    back.clear_table();
    assert!(back.take_errors().is_empty());
    assert!(back.versioned_ids.is_empty());
    assert_eq!(back.table.row_count().unwrap(), 0);
    assert_eq!(back.view.records_count, 0);
    assert_eq!(back.view.current_row, -1);
    assert_eq!(back.table_ops_counter, 0);

    // a subsequent heavy op with empty deltas yields an empty table
    let outcome = heavy(
        &mut back,
        3,
        vec![],
        LoadingStatus::Finished,
        None,
        None,
        false,
    );
    assert_eq!(outcome.values.records_count, 0);
}

#[test]
fn test_window_request_beyond_records() {
    let mut back = new_back();
    load_abc(&mut back);

    let visible = RowRange::new(70, 120);
    let outcome = back.process_easy(
        2,
        RowRequest {
            window: visible.expand(crate::storage::ROW_WINDOW_OFFSET),
            visible,
            version: 1,
        },
        SelectionRequest::empty(),
        HintsRequest::default(),
    );
    assert!(outcome.values.data.is_empty());
    assert!(!outcome.values.rows.is_valid());
    assert_eq!(outcome.values.records_count, 3);
    assert!(back.take_errors().is_empty());
}

#[test]
fn test_window_keeps_prefetch_margin() {
    let mut back = new_back();
    heavy(
        &mut back,
        1,
        (1..=300).map(|i| upsert(i, &format!("n{:03}", i))).collect(),
        LoadingStatus::Finished,
        None,
        None,
        false,
    );

    let visible = RowRange::new(100, 110);
    let outcome = back.process_easy(
        2,
        RowRequest {
            window: visible.expand(crate::storage::ROW_WINDOW_OFFSET),
            visible,
            version: 1,
        },
        SelectionRequest::empty(),
        HintsRequest::default(),
    );
    assert!(outcome.updated);
    assert_eq!(outcome.values.rows_visible, visible);
    assert!(outcome
        .values
        .rows
        .contains_with_padding(&visible, crate::storage::ROW_WINDOW_OFFSET));
}

#[test]
fn test_ensure_visible_tracks_current_row() {
    let mut back = new_back();
    heavy(
        &mut back,
        1,
        (1..=100).map(|i| upsert(i, &format!("n{:03}", i))).collect(),
        LoadingStatus::Finished,
        None,
        None,
        false,
    );

    let outcome = back.process_easy(
        2,
        RowRequest {
            window: RowRange::new(0, 59),
            visible: RowRange::new(0, 9),
            version: 1,
        },
        SelectionRequest {
            selection: vec![RowRange::new(60, 60)],
            current_row: 60,
            version: 1,
        },
        HintsRequest {
            scroll: ScrollHint::EnsureVisible,
            top_row: EdgeRowHint::Full,
            bottom_row: EdgeRowHint::Full,
        },
    );
    assert!(outcome.updated);
    assert_eq!(outcome.values.rows_visible, RowRange::new(51, 60));
    assert_eq!(outcome.values.current_row, 60);
}

#[test]
fn test_ensure_visible_inside_window_is_noop() {
    let mut back = new_back();
    heavy(
        &mut back,
        1,
        (1..=100).map(|i| upsert(i, &format!("n{:03}", i))).collect(),
        LoadingStatus::Finished,
        None,
        None,
        false,
    );
    let visible = RowRange::new(0, 9);
    let window = visible.expand(crate::storage::ROW_WINDOW_OFFSET);
    back.process_easy(
        2,
        RowRequest {
            window,
            visible,
            version: 1,
        },
        SelectionRequest {
            selection: vec![RowRange::new(4, 4)],
            current_row: 4,
            version: 1,
        },
        HintsRequest {
            scroll: ScrollHint::EnsureVisible,
            top_row: EdgeRowHint::Full,
            bottom_row: EdgeRowHint::Full,
        },
    );
    assert_eq!(back.view.rows_visible, visible);
}

#[test]
fn test_easy_noop_before_loading_finished() {
    let mut back = new_back();
    heavy(
        &mut back,
        1,
        vec![upsert(1, "a")],
        LoadingStatus::Started,
        None,
        None,
        false,
    );
    let outcome = back.process_easy(
        2,
        RowRequest::default(),
        SelectionRequest::empty(),
        HintsRequest::default(),
    );
    // a no-op snapshot still answers so the front state settles
    assert!(!outcome.updated);
    assert_eq!(outcome.values.request_id, 2);
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
fn test_failed_transaction_rolls_back() {
    let mut back = new_back();
    load_abc(&mut back);
    back.set_hook(Box::new(FailingHook));

    let outcome = heavy(
        &mut back,
        2,
        vec![upsert(4, "d")],
        LoadingStatus::NotChanged,
        None,
        None,
        false,
    );
    let errors = back.take_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("storage error"));
    // the transaction rolled back: the new row never landed
    assert_eq!(back.table.row_count().unwrap(), 3);
    assert_eq!(outcome.values.records_count, 3);
}

struct VetoHook;

impl OperationHook for VetoHook {
    fn add_pending_value(&mut self, values: &mut Vec<Value>) -> bool {
        values[0].as_integer() != Some(2)
    }
}

#[test]
fn test_hook_vetoes_rows() {
    let mut back = new_back();
    back.set_hook(Box::new(VetoHook));
    let outcome = load_abc(&mut back);
    assert_eq!(outcome.values.records_count, 2);
    assert!(back.table.select_row(2).unwrap().is_none());
}

#[test]
fn test_user_query() {
    let mut back = new_back();
    load_abc(&mut back);

    match back.perform_select("SELECT name FROM $table$ WHERE $filter$ ORDER BY id", &[]) {
        UserQueryOutcome::Rows(rows) => {
            assert_eq!(rows.len(), 3);
            assert_eq!(rows[0][0], Value::Text("a".into()));
        }
        _ => panic!("expected rows"),
    }

    match back.perform_select("DELETE FROM $table$", &[]) {
        UserQueryOutcome::NotSelect => {}
        _ => panic!("non-select must be rejected"),
    }
    // the rejected statement never ran
    assert_eq!(back.table.row_count().unwrap(), 3);
    assert!(back.take_errors().is_empty());
}

#[test]
fn test_order_by_composition() {
    let fields = vec![
        FieldDescriptor::new("id", FieldType::Integer),
        FieldDescriptor::new("name", FieldType::Text),
        FieldDescriptor::new("venue", FieldType::Text),
    ];
    let config = TableCacheConfig::new("orders", fields)
        .default_sort(vec![vec![1, 2]], SortDirection::Ascending);
    let mut back = BackCache::new(&config).unwrap();

    // no user sort: default sequences with the default direction
    assert_eq!(back.order_by_clause(), "ORDER BY name ASC, venue ASC");

    // user column inside a default sequence promotes the whole sequence,
    // exactly once and at the front
    back.set_sorting(Some(SortParameters {
        column: 2,
        direction: SortDirection::Descending,
    }));
    assert_eq!(back.order_by_clause(), "ORDER BY name DESC, venue DESC");

    // user column outside every sequence stands alone, defaults follow
    // with the configured default direction
    back.set_sorting(Some(SortParameters {
        column: 0,
        direction: SortDirection::Descending,
    }));
    assert_eq!(
        back.order_by_clause(),
        "ORDER BY id DESC, name ASC, venue ASC"
    );
}

#[test]
fn test_order_by_empty_without_defaults_or_user_sort() {
    let mut config = TableCacheConfig::new("plain", fields());
    config.default_sort = Vec::new();
    let mut back = BackCache::new(&config).unwrap();
    // bypass the normalized fallback to model an engine-default order
    back.default_sort = Vec::new();
    assert_eq!(back.order_by_clause(), "");
}

#[test]
fn test_invalid_sort_order_rejected() {
    let duplicated = TableCacheConfig::new("t", fields())
        .default_sort(vec![vec![1], vec![1]], SortDirection::Ascending);
    assert!(matches!(
        BackCache::new(&duplicated),
        Err(CacheError::InvalidSortOrder(_))
    ));

    let out_of_range = TableCacheConfig::new("t", fields())
        .default_sort(vec![vec![7]], SortDirection::Ascending);
    assert!(matches!(
        BackCache::new(&out_of_range),
        Err(CacheError::InvalidSortOrder(_))
    ));
}

#[test]
fn test_invalid_user_sort_column_skipped() {
    let mut back = new_back();
    load_abc(&mut back);
    let outcome = heavy(
        &mut back,
        2,
        vec![],
        LoadingStatus::NotChanged,
        Some(SortParameters {
            column: 9,
            direction: SortDirection::Descending,
        }),
        None,
        false,
    );
    // the bogus sort was skipped, not adopted; the selection still ran
    // with the previous ordering
    assert!(back.sort_column.is_none());
    assert!(outcome.updated);
    assert_eq!(outcome.values.data[0][0], Value::Integer(1));
}

#[test]
fn test_auto_scroll_keeps_window_position() {
    let mut back = new_back();
    heavy(
        &mut back,
        1,
        (1..=200).map(|i| upsert(i, &format!("n{:03}", i))).collect(),
        LoadingStatus::Finished,
        None,
        None,
        false,
    );
    let visible = RowRange::new(100, 109);
    back.process_easy(
        2,
        RowRequest {
            window: visible.expand(crate::storage::ROW_WINDOW_OFFSET),
            visible,
            version: 1,
        },
        SelectionRequest::empty(),
        HintsRequest::default(),
    );

    // tail mode: a re-sort leaves the window at its absolute position
    back.set_auto_scroll(true);
    heavy(
        &mut back,
        3,
        vec![],
        LoadingStatus::NotChanged,
        Some(SortParameters {
            column: 1,
            direction: SortDirection::Descending,
        }),
        None,
        false,
    );
    assert_eq!(back.view.rows_visible, visible);
}

#[test]
fn test_anchor_mode_follows_rows_across_versions() {
    let mut back = new_back();
    heavy(
        &mut back,
        1,
        (1..=200).map(|i| upsert(i, &format!("n{:03}", i))).collect(),
        LoadingStatus::Finished,
        None,
        None,
        false,
    );
    back.set_auto_scroll(false);

    let visible = RowRange::new(100, 109);
    back.process_easy(
        2,
        RowRequest {
            window: visible.expand(crate::storage::ROW_WINDOW_OFFSET),
            visible,
            version: 1,
        },
        SelectionRequest::empty(),
        HintsRequest::default(),
    );

    // anchor mode: reversing the order maps the window onto the same ids
    heavy(
        &mut back,
        3,
        vec![],
        LoadingStatus::NotChanged,
        Some(SortParameters {
            column: 0,
            direction: SortDirection::Descending,
        }),
        None,
        false,
    );
    // row 100 held id 101; with ids [200..1] that id now sits at row 99
    assert_eq!(back.view.rows_visible.top, 99);
    assert_eq!(back.view.rows_visible.span(), visible.span());
}
