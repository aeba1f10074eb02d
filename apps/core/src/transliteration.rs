use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use pinyin::ToPinyin;

pub trait Transliterator: Send + Sync {
    fn contains_foreign(&self, text: &str) -> bool;
    fn transliterate(&self, text: &str) -> String;
}

// `报告` becomes `BaoGao`; characters without a reading are kept as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct PinyinTransliterator;

impl Transliterator for PinyinTransliterator {
    fn contains_foreign(&self, text: &str) -> bool {
        text.chars().any(|ch| ch.to_pinyin().is_some())
    }

    fn transliterate(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() * 2);
        for ch in text.chars() {
            match ch.to_pinyin() {
                Some(reading) => push_title_case(&mut out, reading.plain()),
                None => out.push(ch),
            }
        }
        out
    }
}

fn push_title_case(out: &mut String, syllable: &str) {
    let mut chars = syllable.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.extend(chars);
    }
}

// The first caller for a key computes the reading; concurrent callers for the
// same key block on its slot instead of recomputing.
pub struct TransliterationCache {
    transliterator: Arc<dyn Transliterator>,
    entries: RwLock<HashMap<String, Arc<OnceLock<String>>>>,
}

impl TransliterationCache {
    pub fn new(transliterator: Arc<dyn Transliterator>) -> Self {
        Self {
            transliterator,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn pinyin() -> Self {
        Self::new(Arc::new(PinyinTransliterator))
    }

    pub fn contains_foreign(&self, text: &str) -> bool {
        self.transliterator.contains_foreign(text)
    }

    pub fn get(&self, text: &str) -> String {
        if let Some(slot) = self.entries.read().get(text) {
            if let Some(reading) = slot.get() {
                return reading.clone();
            }
        }

        let slot = {
            let mut entries = self.entries.write();
            Arc::clone(
                entries
                    .entry(text.to_string())
                    .or_insert_with(|| Arc::new(OnceLock::new())),
            )
        };
        slot.get_or_init(|| self.transliterator.transliterate(text))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for TransliterationCache {
    fn default() -> Self {
        Self::pinyin()
    }
}

impl std::fmt::Debug for TransliterationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransliterationCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{PinyinTransliterator, Transliterator};

    #[test]
    fn pinyin_reading_is_title_cased_per_syllable() {
        let reading = PinyinTransliterator.transliterate("报告");
        assert_eq!(reading, "BaoGao");
    }

    #[test]
    fn latin_text_is_not_foreign() {
        assert!(!PinyinTransliterator.contains_foreign("Visual Studio Code"));
        assert!(PinyinTransliterator.contains_foreign("年度报告.docx"));
    }

    #[test]
    fn mixed_text_keeps_latin_characters() {
        let reading = PinyinTransliterator.transliterate("Q4报告");
        assert_eq!(reading, "Q4BaoGao");
    }
}
