use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::SearchEngine;
use crate::model::{ActionHandle, ResultItem};
use crate::source::{QueryContext, Source, SourceError, SourceMetadata, SourceOutput};

pub const SUGGESTION_DELAY: Duration = Duration::from_millis(300);
const SUGGESTION_SCORE: i64 = 100;
const SEARCH_SCORE: i64 = 300;

pub trait SuggestionProvider: Send + Sync {
    fn suggest(&self, text: &str) -> Result<Vec<String>, SourceError>;
}

pub struct WebSearchSource {
    engine: SearchEngine,
    suggestions: Option<Arc<dyn SuggestionProvider>>,
    delay: Duration,
}

impl WebSearchSource {
    pub fn new(engine: SearchEngine) -> Self {
        Self {
            engine,
            suggestions: None,
            delay: SUGGESTION_DELAY,
        }
    }

    pub fn with_suggestions(mut self, provider: Arc<dyn SuggestionProvider>) -> Self {
        self.suggestions = Some(provider);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn id(&self) -> String {
        format!("web:{}", self.engine.keyword)
    }

    pub fn metadata(&self) -> SourceMetadata {
        SourceMetadata::keyword(&self.id(), &self.engine.title, &self.engine.keyword)
    }

    pub fn search_url(&self, text: &str) -> String {
        self.engine.url.replace("{q}", &urlencoding::encode(text))
    }

    fn result_for(&self, text: &str, score: i64) -> ResultItem {
        ResultItem::new(text, &format!("Search {}", self.engine.title))
            .with_score(score)
            .with_action(ActionHandle::OpenUrl {
                url: self.search_url(text),
            })
    }
}

impl Source for WebSearchSource {
    fn query(&self, ctx: &QueryContext<'_>) -> Result<SourceOutput, SourceError> {
        let search = ctx.query.search.trim().to_string();
        if search.is_empty() {
            let prompt = ResultItem::new(
                &format!("Search {}", self.engine.title),
                &format!("Type a search after '{}'", self.engine.keyword),
            )
            .with_action(ActionHandle::ChangeQuery {
                query: format!("{} ", self.engine.keyword),
            });
            return Ok(vec![prompt].into());
        }

        let primary = self.result_for(&search, SEARCH_SCORE);
        let Some(provider) = self.suggestions.clone() else {
            return Ok(vec![primary].into());
        };

        let (tx, rx) = crossbeam_channel::bounded(1);
        let cancel = ctx.cancel.clone();
        let delay = self.delay;
        let base = vec![primary.clone()];
        let engine = self.engine.clone();
        let spawned = thread::Builder::new()
            .name(format!("sift-suggest-{}", engine.keyword))
            .spawn(move || {
                crossbeam_channel::select! {
                    recv(cancel.cancelled()) -> _ => return,
                    recv(crossbeam_channel::after(delay)) -> _ => {}
                }
                let suggestions = match provider.suggest(&search) {
                    Ok(suggestions) => suggestions,
                    Err(error) => {
                        warn!(engine = %engine.title, %error, "suggestions failed");
                        return;
                    }
                };
                if cancel.is_cancelled() {
                    return;
                }
                let source = WebSearchSource::new(engine);
                let mut results = base;
                results.extend(
                    suggestions
                        .iter()
                        .filter(|text| text.as_str() != search)
                        .map(|text| source.result_for(text, SUGGESTION_SCORE)),
                );
                debug!(count = results.len(), "suggestions ready");
                let _ = tx.send(results);
            });

        let output = SourceOutput::ready(vec![primary]);
        match spawned {
            Ok(_) => Ok(output.with_follow_up(rx)),
            Err(error) => {
                warn!(%error, "failed to start suggestion fetch");
                Ok(output)
            }
        }
    }
}

impl std::fmt::Debug for WebSearchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchSource")
            .field("engine", &self.engine)
            .field("suggestions", &self.suggestions.is_some())
            .finish()
    }
}
