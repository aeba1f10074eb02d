use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{validate, Config, ConfigError};
use crate::contract::DisplayedListDto;
use crate::dispatcher::{DispatchEvent, Dispatcher, ResultBatch};
use crate::history::{HistoryStore, QueryHistory};
use crate::matcher::FuzzyMatcher;
use crate::model::{ActionHandle, Generation, ResultItem};
use crate::pin::PinStore;
use crate::ranker::Ranker;
use crate::reconciler::{DisplayedList, ReconcileStats};
use crate::router::{Query, QueryRouter, RouterError};
use crate::rpc::{self, HostOperation, RpcError};
use crate::source::{Source, SourceHandle, SourceMetadata, SourceStats};
use crate::sources::SuggestionProvider;
use crate::store::{StateStore, StoreError};
use crate::transliteration::TransliterationCache;

pub const PIN_TITLE: &str = "Pin to top for this query";
pub const UNPIN_TITLE: &str = "Unpin from this query";
pub const TOGGLE_PIN_ACTION: &str = "sift.toggle_pin";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("router error: {0}")]
    Router(#[from] RouterError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
    #[error("no displayed result at index {0}")]
    IndexOutOfRange(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEvent {
    Updated(ReconcileStats),
    StillSearching { generation: Generation },
    Settled { generation: Generation },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEffect {
    QueryChanged { generation: Option<Generation> },
    Message { title: String, subtitle: String },
    Reloaded { items: usize },
    VisibilityChanged { visible: bool },
}

pub struct CoreService {
    config: Config,
    router: Arc<RwLock<QueryRouter>>,
    sources: Arc<RwLock<HashMap<String, Arc<SourceHandle>>>>,
    dispatcher: Dispatcher,
    ranker: Ranker,
    history: Arc<HistoryStore>,
    pins: Arc<PinStore>,
    query_history: QueryHistory,
    last_query: Option<Arc<Query>>,
    // Query whose batches produced the displayed rows; lags `last_query`
    // until the new generation delivers its first batch.
    shown_query: Option<Arc<Query>>,
    // Newest batch per source for the current generation, in arrival order.
    collected: Vec<(String, Vec<ResultItem>)>,
    displayed: DisplayedList,
    searching: bool,
}

impl CoreService {
    pub fn new(config: Config) -> Result<Self, ServiceError> {
        validate(&config)?;

        let cache = Arc::new(TransliterationCache::pinyin());
        let matcher = FuzzyMatcher::new(cache)
            .with_phonetic_max_len(config.phonetic_max_len)
            .with_phonetic(config.transliteration_enabled);
        let router = Arc::new(RwLock::new(QueryRouter::new()));
        let sources = Arc::new(RwLock::new(HashMap::new()));
        let history = Arc::new(HistoryStore::new(config.history_per_source));
        let pins = Arc::new(PinStore::new());

        let dispatcher = Dispatcher::new(
            Arc::clone(&router),
            Arc::clone(&sources),
            Arc::clone(&history),
            matcher,
        )
        .with_debounce(Duration::from_millis(config.debounce_ms));

        Ok(Self {
            ranker: Ranker::new(Arc::clone(&history), Arc::clone(&pins)),
            query_history: QueryHistory::new(config.query_history_limit),
            displayed: DisplayedList::new(config.max_results as usize),
            config,
            router,
            sources,
            dispatcher,
            history,
            pins,
            last_query: None,
            shown_query: None,
            collected: Vec::new(),
            searching: false,
        })
    }

    pub fn with_configured_sources(
        config: Config,
        suggestions: Option<Arc<dyn SuggestionProvider>>,
    ) -> Result<Self, ServiceError> {
        let service = Self::new(config)?;
        for (metadata, source) in crate::sources::from_config(&service.config, suggestions) {
            let id = metadata.id.clone();
            if let Err(error) = service.register_source(metadata, source) {
                warn!(source = %id, %error, "skipping source");
            }
        }
        Ok(service)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn register_source(
        &self,
        metadata: SourceMetadata,
        source: Arc<dyn Source>,
    ) -> Result<(), ServiceError> {
        self.router.write().register(&metadata)?;
        info!(source = %metadata.id, keywords = ?metadata.action_keywords, "registered source");
        let handle = Arc::new(SourceHandle::new(metadata, source));
        self.sources
            .write()
            .insert(handle.id().to_string(), handle);
        Ok(())
    }

    pub fn unregister_source(&self, source_id: &str) -> Result<(), ServiceError> {
        self.router.write().unregister(source_id)?;
        self.sources.write().remove(source_id);
        Ok(())
    }

    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn on_query_changed(&mut self, raw: &str) -> Option<Generation> {
        let parsed = self.router.read().parse(raw);
        let Some(query) = parsed else {
            self.dispatcher.cancel();
            self.last_query = None;
            self.shown_query = None;
            self.collected.clear();
            self.displayed.clear();
            self.searching = false;
            return None;
        };

        self.prune_for_transition(&query);
        self.collected.clear();
        self.searching = false;

        let ticket = self.dispatcher.dispatch(query);
        let generation = ticket.generation();
        self.last_query = Some(ticket.query);
        Some(generation)
    }

    pub fn pump(&mut self, timeout: Duration) -> Option<ServiceEvent> {
        let event = self.dispatcher.next_event(timeout)?;
        Some(self.handle_event(event))
    }

    pub fn run_until_settled(&mut self, timeout: Duration) -> Vec<ServiceEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let Some(event) = self.pump(remaining) else {
                break;
            };
            let settled = matches!(event, ServiceEvent::Settled { .. });
            events.push(event);
            if settled {
                break;
            }
        }
        events
    }

    fn handle_event(&mut self, event: DispatchEvent) -> ServiceEvent {
        match event {
            DispatchEvent::Batch(batch) => ServiceEvent::Updated(self.apply_batch(batch)),
            DispatchEvent::StillSearching { generation } => {
                self.searching = true;
                ServiceEvent::StillSearching { generation }
            }
            DispatchEvent::Settled { generation } => {
                self.searching = false;
                ServiceEvent::Settled { generation }
            }
        }
    }

    fn apply_batch(&mut self, batch: ResultBatch) -> ReconcileStats {
        self.searching = false;
        debug!(
            generation = batch.generation,
            source = %batch.source_id,
            results = batch.results.len(),
            follow_up = batch.follow_up,
            "applying batch"
        );
        match self
            .collected
            .iter_mut()
            .find(|(source_id, _)| *source_id == batch.source_id)
        {
            Some((_, results)) => *results = batch.results,
            None => self.collected.push((batch.source_id, batch.results)),
        }
        self.shown_query = self.last_query.clone();
        self.rerank()
    }

    fn rerank(&mut self) -> ReconcileStats {
        let candidates: Vec<ResultItem> = self
            .collected
            .iter()
            .flat_map(|(_, results)| results.iter().cloned())
            .collect();
        let mut ranked = self.ranker.rank(candidates, &self.query_context());
        ranked.truncate(self.config.max_results as usize);
        self.displayed.reconcile(ranked)
    }

    fn query_context(&self) -> String {
        self.last_query
            .as_ref()
            .map(|query| query.raw.clone())
            .unwrap_or_default()
    }

    fn shown_context(&self) -> String {
        self.shown_query
            .as_ref()
            .map(|query| query.raw.clone())
            .unwrap_or_default()
    }

    fn shown_is_current(&self) -> bool {
        match (&self.shown_query, &self.last_query) {
            (Some(shown), Some(last)) => shown.generation == last.generation,
            _ => false,
        }
    }

    // Re-sorts the rows on screen without touching the collected batches.
    fn resort_displayed(&mut self) -> ReconcileStats {
        let items: Vec<ResultItem> = self
            .displayed
            .entries()
            .iter()
            .map(|entry| entry.result.item.clone())
            .collect();
        let ranked = self.ranker.rank(items, &self.shown_context());
        self.displayed.reconcile(ranked)
    }

    // Drops displayed rows that cannot belong to the new query's source set.
    fn prune_for_transition(&mut self, next: &Query) {
        let previous_keyword = self
            .last_query
            .as_ref()
            .map(|query| query.action_keyword.clone())
            .unwrap_or_default();
        if previous_keyword == next.action_keyword {
            return;
        }

        let router = self.router.read();
        let next_owner = router.owner_of(&next.action_keyword).map(str::to_string);
        let previous_owner = router.owner_of(&previous_keyword).map(str::to_string);
        drop(router);

        match (previous_owner, next_owner) {
            (_, Some(owner)) => self.displayed.retain_source(&owner),
            (Some(previous), None) => self.displayed.remove_source(&previous),
            (None, None) => {}
        }
    }

    pub fn displayed(&self) -> &DisplayedList {
        &self.displayed
    }

    pub fn snapshot(&self) -> DisplayedListDto {
        DisplayedListDto::from_list(&self.displayed, self.dispatcher.current_generation())
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn current_query(&self) -> Option<&Query> {
        self.last_query.as_deref()
    }

    pub fn current_generation(&self) -> Generation {
        self.dispatcher.current_generation()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn select_next(&mut self) -> Option<usize> {
        self.displayed.select_next()
    }

    pub fn select_prev(&mut self) -> Option<usize> {
        self.displayed.select_prev()
    }

    pub fn select_next_page(&mut self) -> Option<usize> {
        self.displayed.select_next_page()
    }

    pub fn select_prev_page(&mut self) -> Option<usize> {
        self.displayed.select_prev_page()
    }

    pub fn commit_selection(&mut self) -> Option<ActionHandle> {
        let item = self.displayed.selected()?.result.item.clone();
        let item_key = item.item_key();
        if let Some(evicted) = self.history.record(&item.source_id, &item_key) {
            debug!(source = %item.source_id, evicted = %evicted, "history entry evicted");
        }
        if let Some(query) = &self.shown_query {
            self.query_history.add(&query.raw);
        }
        info!(source = %item.source_id, item = %item_key, "result chosen");
        Some(item.action)
    }

    pub fn load_context_menu(&self, index: usize) -> Result<Vec<ResultItem>, ServiceError> {
        let item = &self
            .displayed
            .get(index)
            .ok_or(ServiceError::IndexOutOfRange(index))?
            .result
            .item;

        let handle = self.sources.read().get(&item.source_id).cloned();
        let mut menu = match handle {
            Some(handle) => {
                match catch_unwind(AssertUnwindSafe(|| handle.source().context_menu(item))) {
                    Ok(Ok(entries)) => entries,
                    Ok(Err(error)) => {
                        warn!(source = %item.source_id, %error, "context menu failed");
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(source = %item.source_id, "context menu panicked");
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        let pinned = self.pins.is_pinned(&self.shown_context(), &item.item_key());
        let title = if pinned { UNPIN_TITLE } else { PIN_TITLE };
        menu.push(
            ResultItem::new(title, &item.title)
                .with_action(ActionHandle::Custom(TOGGLE_PIN_ACTION.to_string())),
        );
        for entry in &mut menu {
            entry.source_id = item.source_id.clone();
            entry.generation = item.generation;
        }
        Ok(menu)
    }

    pub fn toggle_pin(&mut self, index: usize) -> Result<bool, ServiceError> {
        let item_key = self
            .displayed
            .get(index)
            .ok_or(ServiceError::IndexOutOfRange(index))?
            .result
            .item
            .item_key();
        let pinned = self.pins.toggle(&self.shown_context(), &item_key);
        if self.shown_is_current() {
            self.rerank();
        } else {
            self.resort_displayed();
        }
        Ok(pinned)
    }

    pub fn pin_result(&self, query_context: &str, item_key: &str) -> bool {
        self.pins.pin(query_context, item_key)
    }

    pub fn unpin_result(&self, query_context: &str, item_key: &str) -> bool {
        self.pins.unpin(query_context, item_key)
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn pins(&self) -> &Arc<PinStore> {
        &self.pins
    }

    pub fn query_history(&self) -> &QueryHistory {
        &self.query_history
    }

    pub fn add_action_keyword(&self, source_id: &str, keyword: &str) -> Result<(), ServiceError> {
        self.router.write().add_action_keyword(source_id, keyword)?;
        Ok(())
    }

    pub fn remove_action_keyword(&self, source_id: &str, keyword: &str) -> Result<(), ServiceError> {
        self.router.write().remove_action_keyword(source_id, keyword)?;
        Ok(())
    }

    pub fn replace_action_keyword(
        &self,
        source_id: &str,
        old_keyword: &str,
        new_keyword: &str,
    ) -> Result<(), ServiceError> {
        self.router
            .write()
            .replace_action_keyword(source_id, old_keyword, new_keyword)?;
        Ok(())
    }

    pub fn action_keyword_registered(&self, keyword: &str) -> bool {
        self.router.read().action_keyword_registered(keyword)
    }

    pub fn set_source_disabled(&self, source_id: &str, disabled: bool) -> Result<(), ServiceError> {
        self.router.write().set_disabled(source_id, disabled)?;
        Ok(())
    }

    pub fn is_source_disabled(&self, source_id: &str) -> bool {
        self.router.read().is_disabled(source_id)
    }

    pub fn source_stats(&self, source_id: &str) -> Option<SourceStats> {
        self.sources.read().get(source_id).map(|handle| handle.stats())
    }

    pub fn reload_sources(&self) -> usize {
        let handles: Vec<Arc<SourceHandle>> = self.sources.read().values().cloned().collect();
        handles
            .iter()
            .map(|handle| match handle.source().reload() {
                Ok(count) => count,
                Err(error) => {
                    warn!(source = %handle.id(), %error, "reload failed");
                    0
                }
            })
            .sum()
    }

    pub fn apply_host_operation(&mut self, operation: HostOperation) -> HostEffect {
        debug!(?operation, "host operation");
        match operation {
            HostOperation::ChangeQuery { query } => HostEffect::QueryChanged {
                generation: self.on_query_changed(&query),
            },
            HostOperation::ShowMessage { title, subtitle } => {
                HostEffect::Message { title, subtitle }
            }
            HostOperation::ReloadSources => HostEffect::Reloaded {
                items: self.reload_sources(),
            },
            HostOperation::HideApp => {
                self.displayed.set_visible(false);
                HostEffect::VisibilityChanged { visible: false }
            }
            HostOperation::ShowApp => {
                self.displayed.set_visible(true);
                HostEffect::VisibilityChanged { visible: true }
            }
        }
    }

    pub fn handle_host_json(&mut self, payload: &str) -> Result<HostEffect, ServiceError> {
        let operation = rpc::decode_host_json(payload)?;
        Ok(self.apply_host_operation(operation))
    }

    pub fn load_state(&self, store: &StateStore) {
        match store.load_history() {
            Ok(history) => self.history.load(history),
            Err(error) => warn!(%error, "history unreadable; starting empty"),
        }
        match store.load_pins() {
            Ok(pins) => self.pins.load(pins),
            Err(error) => warn!(%error, "pins unreadable; starting empty"),
        }
    }

    pub fn save_state(&self, store: &mut StateStore) -> Result<(), ServiceError> {
        store.save_history(&self.history.export())?;
        store.save_pins(&self.pins.snapshot())?;
        Ok(())
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("generation", &self.current_generation())
            .field("query", &self.last_query.as_ref().map(|q| q.raw.as_str()))
            .field("displayed", &self.displayed.len())
            .field("searching", &self.searching)
            .finish()
    }
}
