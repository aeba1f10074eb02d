pub mod files;
pub mod manifest;
pub mod web_search;

use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::matcher::FuzzyMatcher;
use crate::source::{Source, SourceMetadata};

pub use files::FileSource;
pub use manifest::ManifestSource;
pub use web_search::{SuggestionProvider, WebSearchSource};

pub fn match_score(matcher: &FuzzyMatcher, search: &str, title: &str, subtitle: &str) -> i64 {
    let title_score = matcher.score(title, search);
    if title_score > 0 {
        return title_score;
    }
    match matcher.score(subtitle, search) {
        0 => 0,
        score => (score / 2).max(1),
    }
}

pub fn from_config(
    cfg: &Config,
    suggestions: Option<Arc<dyn SuggestionProvider>>,
) -> Vec<(SourceMetadata, Arc<dyn Source>)> {
    let mut out: Vec<(SourceMetadata, Arc<dyn Source>)> = Vec::new();

    let (manifests, warnings) = manifest::load_all(&cfg.plugin_paths);
    for warning in warnings {
        warn!(%warning, "plugin manifest skipped");
    }
    for source in manifests {
        out.push((source.metadata(), Arc::new(source)));
    }

    for engine in &cfg.web_search.engines {
        let mut source = WebSearchSource::new(engine.clone());
        if let Some(provider) = suggestions.as_ref().filter(|_| cfg.web_search.suggestions_enabled) {
            source = source.with_suggestions(Arc::clone(provider));
        }
        out.push((source.metadata(), Arc::new(source)));
    }

    if !cfg.file_roots.is_empty() {
        let source = FileSource::new(cfg.file_roots.clone(), cfg.file_max_depth);
        if let Err(error) = source.reload() {
            warn!(%error, "initial file scan failed");
        }
        out.push((source.metadata(), Arc::new(source)));
    }

    out
}
