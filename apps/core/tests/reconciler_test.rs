use sift_core::model::{RankedResult, ResultItem};
use sift_core::reconciler::DisplayedList;

fn ranked(title: &str, source: &str, score: i64, generation: u64) -> RankedResult {
    let mut item = ResultItem::new(title, "sub").with_score(score);
    item.source_id = source.to_string();
    item.generation = generation;
    RankedResult {
        item,
        score,
        pinned: false,
    }
}

#[test]
fn unchanged_rows_keep_identity_and_take_new_scores() {
    let mut list = DisplayedList::default();
    list.reconcile(vec![ranked("a", "s", 10, 1), ranked("b", "s", 5, 1)]);
    let ids: Vec<u64> = list.entries().iter().map(|e| e.id).collect();

    let stats = list.reconcile(vec![ranked("a", "s", 12, 2), ranked("b", "s", 5, 2)]);

    assert_eq!(stats.rescored, 1);
    assert_eq!(stats.unchanged, 1);
    assert_eq!(list.entries()[0].id, ids[0]);
    assert_eq!(list.entries()[1].id, ids[1]);
    assert_eq!(list.entries()[0].result.score, 12);
    assert!(list.entries().iter().all(|e| e.result.generation() == 2));
}

#[test]
fn differing_rows_are_replaced_and_tail_adjusted() {
    let mut list = DisplayedList::default();
    list.reconcile(vec![
        ranked("a", "s", 3, 1),
        ranked("b", "s", 2, 1),
        ranked("c", "s", 1, 1),
    ]);
    let first_id = list.entries()[0].id;

    let stats = list.reconcile(vec![ranked("a", "s", 3, 2), ranked("x", "s", 2, 2)]);
    assert_eq!(stats.replaced, 1);
    assert_eq!(stats.truncated, 1);
    assert_eq!(list.len(), 2);
    assert_eq!(list.entries()[0].id, first_id);
    assert_eq!(list.entries()[1].result.title(), "x");

    let stats = list.reconcile(vec![
        ranked("a", "s", 3, 3),
        ranked("x", "s", 2, 3),
        ranked("y", "s", 1, 3),
    ]);
    assert_eq!(stats.appended, 1);
    assert!(stats.changed());
}

#[test]
fn identical_reconcile_reports_no_change() {
    let mut list = DisplayedList::default();
    list.reconcile(vec![ranked("a", "s", 3, 1)]);
    let stats = list.reconcile(vec![ranked("a", "s", 3, 1)]);
    assert!(!stats.changed());
}

#[test]
fn selection_resets_and_visibility_follows_content() {
    let mut list = DisplayedList::default();
    assert!(!list.is_visible());

    list.reconcile(vec![ranked("a", "s", 2, 1), ranked("b", "s", 1, 1)]);
    assert!(list.is_visible());
    assert_eq!(list.select_next(), Some(1));

    list.reconcile(vec![ranked("a", "s", 2, 2), ranked("b", "s", 1, 2)]);
    assert_eq!(list.selected_index(), Some(0));

    list.reconcile(Vec::new());
    assert_eq!(list.selected_index(), None);
}

#[test]
fn selection_wraps_in_both_directions() {
    let mut list = DisplayedList::new(2);
    list.reconcile((0..3).map(|i| ranked(&format!("r{i}"), "s", 10 - i, 1)).collect());

    assert_eq!(list.select_prev(), Some(2));
    assert_eq!(list.select_next(), Some(0));
    assert_eq!(list.select_next_page(), Some(2));
    assert_eq!(list.select_next_page(), Some(1));
    assert_eq!(list.selected().unwrap().result.title(), "r1");
}

#[test]
fn source_pruning_keeps_selection_in_bounds() {
    let mut list = DisplayedList::default();
    list.reconcile(vec![
        ranked("a", "apps", 3, 1),
        ranked("b", "web", 2, 1),
        ranked("c", "apps", 1, 1),
    ]);
    list.select(2);

    list.remove_source("apps");
    assert_eq!(list.len(), 1);
    assert_eq!(list.selected_index(), Some(0));

    list.retain_source("files");
    assert!(list.is_empty());
    assert_eq!(list.selected_index(), None);
}
