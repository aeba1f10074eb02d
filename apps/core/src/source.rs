use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use thiserror::Error;

use crate::dispatcher::CancelToken;
use crate::matcher::FuzzyMatcher;
use crate::model::ResultItem;
use crate::router::{Query, WILDCARD_KEYWORD};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0}")]
    Failed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMetadata {
    pub id: String,
    pub name: String,
    pub action_keywords: Vec<String>,
    pub disabled: bool,
}

impl SourceMetadata {
    pub fn new(id: &str, name: &str, action_keywords: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            action_keywords: action_keywords.iter().map(|k| k.to_string()).collect(),
            disabled: false,
        }
    }

    pub fn global(id: &str, name: &str) -> Self {
        Self::new(id, name, &[WILDCARD_KEYWORD])
    }

    pub fn keyword(id: &str, name: &str, keyword: &str) -> Self {
        Self::new(id, name, &[keyword])
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn is_global(&self) -> bool {
        self.action_keywords.iter().any(|k| k == WILDCARD_KEYWORD)
    }
}

pub struct QueryContext<'a> {
    pub query: &'a Query,
    pub history: &'a HashMap<String, i64>,
    pub matcher: &'a FuzzyMatcher,
    pub cancel: &'a CancelToken,
}

impl QueryContext<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// Every later batch replaces the source's earlier results.
#[derive(Debug, Default)]
pub struct SourceOutput {
    pub results: Vec<ResultItem>,
    pub follow_up: Option<Receiver<Vec<ResultItem>>>,
}

impl SourceOutput {
    pub fn ready(results: Vec<ResultItem>) -> Self {
        Self {
            results,
            follow_up: None,
        }
    }

    pub fn with_follow_up(mut self, follow_up: Receiver<Vec<ResultItem>>) -> Self {
        self.follow_up = Some(follow_up);
        self
    }
}

impl From<Vec<ResultItem>> for SourceOutput {
    fn from(results: Vec<ResultItem>) -> Self {
        Self::ready(results)
    }
}

pub trait Source: Send + Sync {
    fn query(&self, ctx: &QueryContext<'_>) -> Result<SourceOutput, SourceError>;

    fn context_menu(&self, _selected: &ResultItem) -> Result<Vec<ResultItem>, SourceError> {
        Ok(Vec::new())
    }

    fn reload(&self) -> Result<usize, SourceError> {
        Ok(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceStats {
    pub query_count: u64,
    pub avg_query_ms: f64,
    pub failures: u64,
}

pub struct SourceHandle {
    metadata: SourceMetadata,
    source: Arc<dyn Source>,
    stats: Mutex<SourceStats>,
}

impl SourceHandle {
    pub fn new(metadata: SourceMetadata, source: Arc<dyn Source>) -> Self {
        Self {
            metadata,
            source,
            stats: Mutex::new(SourceStats::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub fn stats(&self) -> SourceStats {
        *self.stats.lock()
    }

    pub(crate) fn record_query(&self, elapsed: Duration, failed: bool) {
        let millis = elapsed.as_secs_f64() * 1000.0;
        let mut stats = self.stats.lock();
        stats.query_count += 1;
        stats.avg_query_ms = if stats.query_count == 1 {
            millis
        } else {
            (stats.avg_query_ms + millis) / 2.0
        };
        if failed {
            stats.failures += 1;
        }
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("metadata", &self.metadata)
            .field("stats", &self.stats())
            .finish()
    }
}

pub struct FnSource<F>
where
    F: Fn(&QueryContext<'_>) -> Result<SourceOutput, SourceError> + Send + Sync,
{
    query_fn: F,
}

impl<F> FnSource<F>
where
    F: Fn(&QueryContext<'_>) -> Result<SourceOutput, SourceError> + Send + Sync,
{
    pub fn new(query_fn: F) -> Self {
        Self { query_fn }
    }
}

impl<F> Source for FnSource<F>
where
    F: Fn(&QueryContext<'_>) -> Result<SourceOutput, SourceError> + Send + Sync,
{
    fn query(&self, ctx: &QueryContext<'_>) -> Result<SourceOutput, SourceError> {
        (self.query_fn)(ctx)
    }
}
