use std::sync::Arc;

use crate::history::{HistoryEntry, HistoryStore};
use crate::matcher::MAX_RAW;
use crate::model::{RankedResult, ResultItem};
use crate::pin::PinStore;

pub const PINNED_SCORE: i64 = i64::MAX;
pub const USE_INCREMENT: i64 = 5;
pub const MAX_COUNTED_USES: u32 = 10;
// Stays below the gap between the prefix band and an exact match.
pub const MAX_HISTORY_WEIGHT: i64 = USE_INCREMENT * MAX_COUNTED_USES as i64;

pub fn history_weight(entry: Option<HistoryEntry>) -> i64 {
    entry
        .map(|entry| i64::from(entry.uses.min(MAX_COUNTED_USES)) * USE_INCREMENT)
        .unwrap_or(0)
}

pub fn combine(raw_score: i64, history_weight: i64, pinned: bool) -> i64 {
    if pinned {
        return PINNED_SCORE;
    }
    raw_score.clamp(0, MAX_RAW - 1) + history_weight.clamp(0, MAX_HISTORY_WEIGHT)
}

// Stable: equal scores keep arrival order.
pub fn sort_ranked(results: &mut [RankedResult]) {
    results.sort_by(|a, b| b.score.cmp(&a.score));
}

#[derive(Debug, Clone)]
pub struct Ranker {
    history: Arc<HistoryStore>,
    pins: Arc<PinStore>,
}

impl Ranker {
    pub fn new(history: Arc<HistoryStore>, pins: Arc<PinStore>) -> Self {
        Self { history, pins }
    }

    pub fn score(&self, item: ResultItem, query_context: &str) -> RankedResult {
        let item_key = item.item_key();
        let pinned = self.pins.is_pinned(query_context, &item_key);
        let weight = if pinned {
            0
        } else {
            history_weight(self.history.entry(&item.source_id, &item_key))
        };
        RankedResult {
            score: combine(item.score, weight, pinned),
            pinned,
            item,
        }
    }

    pub fn rank(&self, candidates: Vec<ResultItem>, query_context: &str) -> Vec<RankedResult> {
        let mut ranked: Vec<RankedResult> = candidates
            .into_iter()
            .map(|item| self.score(item, query_context))
            .collect();
        sort_ranked(&mut ranked);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::{combine, history_weight, MAX_HISTORY_WEIGHT, PINNED_SCORE};
    use crate::history::HistoryEntry;
    use crate::matcher::{EXACT_SCORE, PREFIX_BASE, FUZZY_MAX};

    #[test]
    fn weight_is_capped() {
        let heavy = HistoryEntry {
            last_used: 1,
            uses: 10_000,
        };
        assert_eq!(history_weight(Some(heavy)), MAX_HISTORY_WEIGHT);
        assert_eq!(history_weight(None), 0);
    }

    #[test]
    fn best_prefix_with_full_history_stays_below_exact() {
        let best_prefix = PREFIX_BASE + FUZZY_MAX;
        assert!(combine(best_prefix, MAX_HISTORY_WEIGHT, false) < combine(EXACT_SCORE, 0, false));
    }

    #[test]
    fn pinned_ignores_raw_score() {
        assert_eq!(combine(0, 0, true), PINNED_SCORE);
        assert!(combine(EXACT_SCORE, MAX_HISTORY_WEIGHT, false) < PINNED_SCORE);
    }
}
