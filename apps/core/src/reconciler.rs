use crate::model::RankedResult;

pub const DEFAULT_PAGE_SIZE: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayedEntry {
    pub id: u64,
    pub result: RankedResult,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub unchanged: usize,
    pub rescored: usize,
    pub replaced: usize,
    pub appended: usize,
    pub truncated: usize,
}

impl ReconcileStats {
    pub fn changed(&self) -> bool {
        self.rescored + self.replaced + self.appended + self.truncated > 0
    }
}

#[derive(Debug, Clone)]
pub struct DisplayedList {
    entries: Vec<DisplayedEntry>,
    selected: Option<usize>,
    visible: bool,
    page_size: usize,
    next_id: u64,
}

impl Default for DisplayedList {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl DisplayedList {
    pub fn new(page_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            selected: None,
            visible: false,
            page_size: page_size.max(1),
            next_id: 1,
        }
    }

    pub fn entries(&self) -> &[DisplayedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&DisplayedEntry> {
        self.selected.and_then(|index| self.entries.get(index))
    }

    pub fn get(&self, index: usize) -> Option<&DisplayedEntry> {
        self.entries.get(index)
    }

    // Rows with unchanged title and subtitle keep their id and take the new
    // score and payload; differing rows are replaced; the tail is appended or
    // truncated.
    pub fn reconcile(&mut self, ranked: Vec<RankedResult>) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let shared = self.entries.len().min(ranked.len());
        let mut incoming = ranked.into_iter();

        for index in 0..shared {
            let Some(next) = incoming.next() else {
                break;
            };
            let entry = &mut self.entries[index];
            if entry.result.item.same_entity(&next.item) {
                if entry.result.score != next.score {
                    stats.rescored += 1;
                } else {
                    stats.unchanged += 1;
                }
                entry.result.score = next.score;
                entry.result.pinned = next.pinned;
                entry.result.item = next.item;
            } else {
                let id = self.next_id;
                self.next_id += 1;
                *entry = DisplayedEntry { id, result: next };
                stats.replaced += 1;
            }
        }

        if self.entries.len() > shared {
            stats.truncated = self.entries.len() - shared;
            self.entries.truncate(shared);
        }
        for result in incoming {
            let id = self.next_id;
            self.next_id += 1;
            self.entries.push(DisplayedEntry { id, result });
            stats.appended += 1;
        }

        if self.entries.is_empty() {
            self.selected = None;
        } else {
            self.selected = Some(0);
            self.visible = true;
        }
        stats
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.selected = None;
        self.visible = false;
    }

    pub fn remove_source(&mut self, source_id: &str) {
        self.retain(|entry| entry.result.source_id() != source_id);
    }

    pub fn retain_source(&mut self, source_id: &str) {
        self.retain(|entry| entry.result.source_id() == source_id);
    }

    pub fn select_next(&mut self) -> Option<usize> {
        self.move_selection(1)
    }

    pub fn select_prev(&mut self) -> Option<usize> {
        self.move_selection(-1)
    }

    pub fn select_next_page(&mut self) -> Option<usize> {
        self.move_selection(self.page_size as isize)
    }

    pub fn select_prev_page(&mut self) -> Option<usize> {
        self.move_selection(-(self.page_size as isize))
    }

    pub fn select(&mut self, index: usize) -> Option<usize> {
        if index < self.entries.len() {
            self.selected = Some(index);
        }
        self.selected
    }

    fn move_selection(&mut self, delta: isize) -> Option<usize> {
        let count = self.entries.len() as isize;
        if count == 0 {
            self.selected = None;
            return None;
        }
        let current = self.selected.unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(count) as usize;
        self.selected = Some(next);
        self.selected
    }

    fn retain(&mut self, keep: impl Fn(&DisplayedEntry) -> bool) {
        self.entries.retain(|entry| keep(entry));
        self.selected = match self.selected {
            _ if self.entries.is_empty() => None,
            Some(index) if index >= self.entries.len() => Some(self.entries.len() - 1),
            other => other,
        };
    }
}
