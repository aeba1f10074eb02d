use std::sync::Arc;

use crate::transliteration::TransliterationCache;

// Score bands: exact 400, prefix 200..=299, substring 100..=199, fuzzy 1..=99.
pub const EXACT_SCORE: i64 = 400;
pub const PREFIX_BASE: i64 = 200;
pub const SUBSTRING_BASE: i64 = 100;
pub const FUZZY_MAX: i64 = 99;
pub const MAX_RAW: i64 = EXACT_SCORE + 1;

pub const DEFAULT_PHONETIC_MAX_LEN: usize = 40;

const MATCH_POINTS: i64 = 16;
const BOUNDARY_BONUS: i64 = 8;
const CONSECUTIVE_BONUS: i64 = 8;
const GAP_PENALTY: i64 = 2;
const LEADING_PENALTY_CAP: i64 = 10;

#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    cache: Arc<TransliterationCache>,
    phonetic_max_len: usize,
    phonetic_enabled: bool,
}

impl FuzzyMatcher {
    pub fn new(cache: Arc<TransliterationCache>) -> Self {
        Self {
            cache,
            phonetic_max_len: DEFAULT_PHONETIC_MAX_LEN,
            phonetic_enabled: true,
        }
    }

    pub fn with_phonetic_max_len(mut self, max_len: usize) -> Self {
        self.phonetic_max_len = max_len;
        self
    }

    pub fn with_phonetic(mut self, enabled: bool) -> Self {
        self.phonetic_enabled = enabled;
        self
    }

    pub fn cache(&self) -> &Arc<TransliterationCache> {
        &self.cache
    }

    pub fn is_match(&self, content: &str, query: &str) -> bool {
        if is_match(content, query) {
            return true;
        }
        self.phonetic_reading(content)
            .is_some_and(|reading| is_match(&reading, query))
    }

        pub fn score(&self, content: &str, query: &str) -> i64 {
        let literal = score(content, query);
        if literal >= EXACT_SCORE {
            return literal;
        }
        let phonetic = self
            .phonetic_reading(content)
            .map(|reading| score(&reading, query))
            .unwrap_or(0);
        literal.max(phonetic)
    }

    fn phonetic_reading(&self, content: &str) -> Option<String> {
        if !self.phonetic_enabled || content.is_empty() || content.is_ascii() {
            return None;
        }
        if content.chars().count() > self.phonetic_max_len {
            tracing::trace!(content, "skipping phonetic pass for long candidate");
            return None;
        }
        if !self.cache.contains_foreign(content) {
            return None;
        }
        Some(self.cache.get(content))
    }
}

// True when the query is a contiguous case-insensitive substring, or when it
// can be consumed in order under the case-segment rule: scanning from a start
// offset, any character may be consumed until the scan meets an uppercase
// letter; from then on only uppercase letters qualify until the next consumed
// character restarts the scan.
pub fn is_match(content: &str, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    if !is_ordered_subsequence(content, query) {
        return false;
    }
    let content: Vec<char> = content.chars().collect();
    let content_lower = lower_all(&content);
    let query_lower = lower_str(query);
    find_chars(&content_lower, &query_lower).is_some()
        || segment_match(&content, &content_lower, &query_lower)
}

pub fn score(content: &str, query: &str) -> i64 {
    if content.is_empty() || query.is_empty() || !is_ordered_subsequence(content, query) {
        return 0;
    }
    let content: Vec<char> = content.chars().collect();
    let content_lower = lower_all(&content);
    let query_lower = lower_str(query);
    let coverage = (query_lower.len() as i64 * FUZZY_MAX) / content.len() as i64;

    if content_lower == query_lower {
        return EXACT_SCORE;
    }

    if let Some(position) = find_chars(&content_lower, &query_lower) {
        if position == 0 {
            return PREFIX_BASE + coverage.min(FUZZY_MAX);
        }
        let boundary = if is_boundary(&content, position) { 20 } else { 0 };
        let position_penalty = (position as i64).min(40);
        return (SUBSTRING_BASE + coverage + boundary - position_penalty)
            .clamp(SUBSTRING_BASE, SUBSTRING_BASE + FUZZY_MAX);
    }

    if !segment_match(&content, &content_lower, &query_lower) {
        return 0;
    }
    alignment_score(&content, &content_lower, &query_lower)
}

// Every match consumes the query in order, so a failed case-insensitive
// subsequence scan rejects without allocating.
fn is_ordered_subsequence(content: &str, query: &str) -> bool {
    let mut content = content.chars().map(|ch| ch.to_ascii_lowercase());
    query
        .chars()
        .map(|ch| ch.to_ascii_lowercase())
        .all(|wanted| content.any(|ch| ch == wanted))
}

// row[c] answers "can query[q..] be consumed starting at content index c" for
// the query index being filled; rows are built from the end of the query
// backwards, keeping the search at O(|content| * |query|).
fn segment_match(content: &[char], content_lower: &[char], query_lower: &[char]) -> bool {
    let n = content.len();
    let mut next_row = vec![true; n + 1];
    let mut row = vec![false; n + 1];

    for &wanted in query_lower.iter().rev() {
        row[n] = false;
        // Any uppercase index k >= c can consume the query char and continue.
        let mut upper_suffix = false;
        for c in (0..n).rev() {
            let good = content_lower[c] == wanted && next_row[c + 1];
            if content[c].is_ascii_uppercase() {
                upper_suffix = upper_suffix || good;
                row[c] = upper_suffix;
            } else {
                row[c] = good || row[c + 1];
            }
        }
        std::mem::swap(&mut row, &mut next_row);
    }

    next_row[0]
}

// Best alignment mapped into 1..=FUZZY_MAX. Rewards word boundaries and runs
// of consecutive characters, penalises gaps.
fn alignment_score(content: &[char], content_lower: &[char], query_lower: &[char]) -> i64 {
    const NONE: i64 = i64::MIN / 4;
    let n = content.len();
    let m = query_lower.len();

    // prev[c]: best total with the previous query char matched at c.
    let mut prev = vec![NONE; n];
    let mut cur = vec![NONE; n];
    for c in 0..n {
        if content_lower[c] == query_lower[0] {
            let leading = (c as i64).min(LEADING_PENALTY_CAP);
            prev[c] = MATCH_POINTS + boundary_bonus(content, c) - leading;
        }
    }

    for &wanted in &query_lower[1..] {
        cur.fill(NONE);
        // Running max of prev[k] + GAP_PENALTY * k over k < c - 1.
        let mut carried = NONE;
        for c in 1..n {
            if c >= 2 && prev[c - 2] > NONE {
                carried = carried.max(prev[c - 2] + GAP_PENALTY * (c as i64 - 2));
            }
            if content_lower[c] != wanted {
                continue;
            }
            let gapped = if carried > NONE {
                carried - GAP_PENALTY * (c as i64 - 1)
            } else {
                NONE
            };
            let adjacent = if prev[c - 1] > NONE {
                prev[c - 1] + CONSECUTIVE_BONUS
            } else {
                NONE
            };
            let best = gapped.max(adjacent);
            if best > NONE {
                cur[c] = best + MATCH_POINTS + boundary_bonus(content, c);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    let best = prev.into_iter().max().unwrap_or(NONE).max(0);
    let ceiling = m as i64 * (MATCH_POINTS + BOUNDARY_BONUS + CONSECUTIVE_BONUS);
    (1 + best * (FUZZY_MAX - 1) / ceiling).clamp(1, FUZZY_MAX)
}

fn boundary_bonus(content: &[char], index: usize) -> i64 {
    if is_boundary(content, index) {
        BOUNDARY_BONUS
    } else {
        0
    }
}

fn is_boundary(content: &[char], index: usize) -> bool {
    if index == 0 {
        return true;
    }
    let current = content[index];
    let previous = content[index - 1];
    current.is_ascii_uppercase() && !previous.is_ascii_uppercase()
        || !previous.is_alphanumeric() && current.is_alphanumeric()
}

fn lower_all(chars: &[char]) -> Vec<char> {
    chars.iter().map(|ch| ch.to_ascii_lowercase()).collect()
}

fn lower_str(text: &str) -> Vec<char> {
    text.chars().map(|ch| ch.to_ascii_lowercase()).collect()
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
