use sift_core::contract::{DisplayEvent, DisplayedListDto};
use sift_core::model::{RankedResult, ResultItem};
use sift_core::reconciler::DisplayedList;

#[test]
fn displayed_list_serializes_rows_and_selection() {
    let mut list = DisplayedList::default();
    let mut item = ResultItem::new("Code", "/apps/code").with_score(400);
    item.source_id = "apps".to_string();
    list.reconcile(vec![RankedResult {
        item,
        score: 400,
        pinned: false,
    }]);

    let dto = DisplayedListDto::from_list(&list, 7);
    assert_eq!(dto.generation, 7);
    assert_eq!(dto.selected, Some(0));
    assert_eq!(dto.rows[0].source_id, "apps");

    let encoded = serde_json::to_string(&DisplayEvent::Updated(dto.clone())).unwrap();
    assert!(encoded.contains("\"kind\":\"Updated\""));
    let decoded: DisplayEvent = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, DisplayEvent::Updated(dto));
}

#[test]
fn events_use_kind_and_payload_tags() {
    let encoded = serde_json::to_string(&DisplayEvent::StillSearching { generation: 3 }).unwrap();
    assert_eq!(
        encoded,
        r#"{"kind":"StillSearching","payload":{"generation":3}}"#
    );
}
