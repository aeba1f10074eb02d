use serde::{Deserialize, Serialize};

use crate::model::Generation;
use crate::reconciler::{DisplayedEntry, DisplayedList};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayedRowDto {
    pub id: u64,
    pub title: String,
    pub subtitle: String,
    pub icon: String,
    pub score: i64,
    pub pinned: bool,
    pub source_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayedListDto {
    pub generation: Generation,
    pub visible: bool,
    pub selected: Option<usize>,
    pub rows: Vec<DisplayedRowDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload")]
pub enum DisplayEvent {
    Updated(DisplayedListDto),
    StillSearching { generation: Generation },
    Settled { generation: Generation },
    Message { title: String, subtitle: String },
}

impl From<&DisplayedEntry> for DisplayedRowDto {
    fn from(entry: &DisplayedEntry) -> Self {
        Self {
            id: entry.id,
            title: entry.result.item.title.clone(),
            subtitle: entry.result.item.subtitle.clone(),
            icon: entry.result.item.icon.clone(),
            score: entry.result.score,
            pinned: entry.result.pinned,
            source_id: entry.result.item.source_id.clone(),
        }
    }
}

impl DisplayedListDto {
    pub fn from_list(list: &DisplayedList, generation: Generation) -> Self {
        Self {
            generation,
            visible: list.is_visible(),
            selected: list.selected_index(),
            rows: list.entries().iter().map(DisplayedRowDto::from).collect(),
        }
    }
}
