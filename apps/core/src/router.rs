use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::model::Generation;
use crate::source::SourceMetadata;

pub const TERM_SEPARATOR: &str = " ";
// Registering this keyword makes a source global; it never matches a term.
pub const WILDCARD_KEYWORD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub raw: String,
    pub terms: Vec<String>,
    pub action_keyword: String,
    pub search: String,
    pub generation: Generation,
}

impl Query {
    pub fn is_global(&self) -> bool {
        self.action_keyword.is_empty()
    }

    pub fn search_terms(&self) -> &[String] {
        if self.is_global() {
            &self.terms
        } else {
            &self.terms[1..]
        }
    }

    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("action keyword '{keyword}' is already owned by '{owner}'")]
    KeywordTaken { keyword: String, owner: String },
    #[error("action keyword must not be empty or contain whitespace")]
    InvalidKeyword,
    #[error("unknown source: {0}")]
    UnknownSource(String),
    #[error("source already registered: {0}")]
    DuplicateSource(String),
}

#[derive(Debug, Default, Clone)]
pub struct QueryRouter {
    global: Vec<String>,
    keyword_owners: HashMap<String, String>,
    keywords_by_source: HashMap<String, Vec<String>>,
    disabled: HashSet<String>,
}

impl QueryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metadata: &SourceMetadata) -> Result<(), RouterError> {
        if self.keywords_by_source.contains_key(&metadata.id) {
            return Err(RouterError::DuplicateSource(metadata.id.clone()));
        }
        for keyword in &metadata.action_keywords {
            self.check_available(&metadata.id, keyword)?;
        }

        self.keywords_by_source
            .insert(metadata.id.clone(), Vec::new());
        for keyword in &metadata.action_keywords {
            self.bind(&metadata.id, keyword);
        }
        if metadata.disabled {
            self.disabled.insert(metadata.id.clone());
        }
        Ok(())
    }

    pub fn unregister(&mut self, source_id: &str) -> Result<(), RouterError> {
        let keywords = self
            .keywords_by_source
            .remove(source_id)
            .ok_or_else(|| RouterError::UnknownSource(source_id.to_string()))?;
        for keyword in keywords {
            if keyword != WILDCARD_KEYWORD {
                self.keyword_owners.remove(&keyword);
            }
        }
        self.global.retain(|id| id != source_id);
        self.disabled.remove(source_id);
        Ok(())
    }

    pub fn parse(&self, raw: &str) -> Option<Query> {
        let terms: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
        let first = terms.first()?;
        let raw = terms.join(TERM_SEPARATOR);

        let (action_keyword, search) = if self.is_active_keyword(first) {
            (first.clone(), terms[1..].join(TERM_SEPARATOR))
        } else {
            (String::new(), raw.clone())
        };

        Some(Query {
            raw,
            terms,
            action_keyword,
            search,
            generation: 0,
        })
    }

    pub fn resolve_sources(&self, query: &Query) -> Vec<String> {
        if !query.action_keyword.is_empty() && self.is_active_keyword(&query.action_keyword) {
            if let Some(owner) = self.keyword_owners.get(&query.action_keyword) {
                return vec![owner.clone()];
            }
        }

        self.global
            .iter()
            .filter(|id| !self.disabled.contains(*id))
            .cloned()
            .collect()
    }

    pub fn action_keyword_registered(&self, keyword: &str) -> bool {
        keyword != WILDCARD_KEYWORD && self.keyword_owners.contains_key(keyword)
    }

    pub fn owner_of(&self, keyword: &str) -> Option<&str> {
        if keyword == WILDCARD_KEYWORD {
            return None;
        }
        self.keyword_owners.get(keyword).map(String::as_str)
    }

    pub fn keywords_of(&self, source_id: &str) -> Option<&[String]> {
        self.keywords_by_source.get(source_id).map(Vec::as_slice)
    }

    pub fn global_sources(&self) -> &[String] {
        &self.global
    }

    pub fn add_action_keyword(&mut self, source_id: &str, keyword: &str) -> Result<(), RouterError> {
        if !self.keywords_by_source.contains_key(source_id) {
            return Err(RouterError::UnknownSource(source_id.to_string()));
        }
        self.check_available(source_id, keyword)?;
        self.bind(source_id, keyword);
        Ok(())
    }

    pub fn remove_action_keyword(&mut self, source_id: &str, keyword: &str) -> Result<(), RouterError> {
        let keywords = self
            .keywords_by_source
            .get_mut(source_id)
            .ok_or_else(|| RouterError::UnknownSource(source_id.to_string()))?;
        keywords.retain(|existing| existing != keyword);

        if keyword == WILDCARD_KEYWORD {
            self.global.retain(|id| id != source_id);
        } else if self.keyword_owners.get(keyword).is_some_and(|owner| owner == source_id) {
            self.keyword_owners.remove(keyword);
        }
        Ok(())
    }

    pub fn replace_action_keyword(
        &mut self,
        source_id: &str,
        old_keyword: &str,
        new_keyword: &str,
    ) -> Result<(), RouterError> {
        if old_keyword == new_keyword {
            return Ok(());
        }
        self.add_action_keyword(source_id, new_keyword)?;
        self.remove_action_keyword(source_id, old_keyword)
    }

    pub fn set_disabled(&mut self, source_id: &str, disabled: bool) -> Result<(), RouterError> {
        if !self.keywords_by_source.contains_key(source_id) {
            return Err(RouterError::UnknownSource(source_id.to_string()));
        }
        if disabled {
            self.disabled.insert(source_id.to_string());
        } else {
            self.disabled.remove(source_id);
        }
        Ok(())
    }

    pub fn is_disabled(&self, source_id: &str) -> bool {
        self.disabled.contains(source_id)
    }

    fn is_active_keyword(&self, keyword: &str) -> bool {
        if keyword == WILDCARD_KEYWORD {
            return false;
        }
        self.keyword_owners
            .get(keyword)
            .is_some_and(|owner| !self.disabled.contains(owner))
    }

    fn check_available(&self, source_id: &str, keyword: &str) -> Result<(), RouterError> {
        if keyword.is_empty() || keyword.chars().any(char::is_whitespace) {
            return Err(RouterError::InvalidKeyword);
        }
        if keyword == WILDCARD_KEYWORD {
            return Ok(());
        }
        match self.keyword_owners.get(keyword) {
            Some(owner) if owner != source_id => Err(RouterError::KeywordTaken {
                keyword: keyword.to_string(),
                owner: owner.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn bind(&mut self, source_id: &str, keyword: &str) {
        if keyword == WILDCARD_KEYWORD {
            if !self.global.iter().any(|id| id == source_id) {
                self.global.push(source_id.to_string());
            }
        } else {
            self.keyword_owners
                .insert(keyword.to_string(), source_id.to_string());
        }
        if let Some(keywords) = self.keywords_by_source.get_mut(source_id) {
            if !keywords.iter().any(|existing| existing == keyword) {
                keywords.push(keyword.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QueryRouter;
    use crate::source::SourceMetadata;

    #[test]
    fn collapses_whitespace_into_single_separator() {
        let router = QueryRouter::new();
        let query = router.parse("  open   the\tdoor ").unwrap();
        assert_eq!(query.raw, "open the door");
        assert_eq!(query.terms, vec!["open", "the", "door"]);
        assert_eq!(query.search, "open the door");
    }

    #[test]
    fn keyword_only_input_has_empty_search() {
        let mut router = QueryRouter::new();
        router
            .register(&SourceMetadata::keyword("web", "Web", "g"))
            .unwrap();
        let query = router.parse("g").unwrap();
        assert_eq!(query.action_keyword, "g");
        assert_eq!(query.search, "");
        assert!(query.search_terms().is_empty());
    }

    #[test]
    fn wildcard_is_never_a_literal_keyword() {
        let mut router = QueryRouter::new();
        router
            .register(&SourceMetadata::global("files", "Files"))
            .unwrap();
        let query = router.parse("* notes").unwrap();
        assert!(query.is_global());
        assert!(!router.action_keyword_registered("*"));
    }
}
