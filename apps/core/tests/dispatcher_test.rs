use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;
use sift_core::dispatcher::{DispatchEvent, Dispatcher, GenerationCounter, GenerationState};
use sift_core::history::HistoryStore;
use sift_core::matcher::FuzzyMatcher;
use sift_core::model::{Generation, ResultItem};
use sift_core::router::QueryRouter;
use sift_core::source::{
    FnSource, QueryContext, Source, SourceError, SourceHandle, SourceMetadata, SourceOutput,
};
use sift_core::transliteration::TransliterationCache;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    router: Arc<RwLock<QueryRouter>>,
    sources: Arc<RwLock<HashMap<String, Arc<SourceHandle>>>>,
    dispatcher: Dispatcher,
}

impl Harness {
    fn new(debounce: Duration) -> Self {
        let router = Arc::new(RwLock::new(QueryRouter::new()));
        let sources = Arc::new(RwLock::new(HashMap::new()));
        let dispatcher = Dispatcher::new(
            Arc::clone(&router),
            Arc::clone(&sources),
            Arc::new(HistoryStore::new(100)),
            FuzzyMatcher::new(Arc::new(TransliterationCache::pinyin())),
        )
        .with_debounce(debounce);
        Self {
            router,
            sources,
            dispatcher,
        }
    }

    fn add(&self, metadata: SourceMetadata, source: impl Source + 'static) {
        self.router.write().register(&metadata).unwrap();
        let handle = Arc::new(SourceHandle::new(metadata, Arc::new(source)));
        self.sources
            .write()
            .insert(handle.id().to_string(), handle);
    }

    fn dispatch(&self, raw: &str) -> Generation {
        let query = self.router.read().parse(raw).unwrap();
        self.dispatcher.dispatch(query).generation()
    }

    fn events_until_settled(&self, generation: Generation) -> Vec<DispatchEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.dispatcher.next_event(WAIT) {
            let done = event == DispatchEvent::Settled { generation };
            events.push(event);
            if done {
                return events;
            }
        }
        panic!("generation {generation} never settled; got {events:?}");
    }
}

fn echo_source(delay: Duration) -> impl Source {
    FnSource::new(move |ctx: &QueryContext<'_>| {
        thread::sleep(delay);
        Ok(vec![ResultItem::new(&ctx.query.raw, "echo").with_score(100)].into())
    })
}

fn batches(events: &[DispatchEvent]) -> Vec<&sift_core::dispatcher::ResultBatch> {
    events
        .iter()
        .filter_map(|event| match event {
            DispatchEvent::Batch(batch) => Some(batch),
            _ => None,
        })
        .collect()
}

#[test]
fn superseded_generation_never_surfaces() {
    let harness = Harness::new(Duration::from_secs(2));
    harness.add(
        SourceMetadata::global("slow", "Slow"),
        FnSource::new(|ctx: &QueryContext<'_>| {
            if ctx.query.raw == "a" {
                thread::sleep(Duration::from_millis(150));
            }
            Ok(vec![ResultItem::new(&ctx.query.raw, "slow")].into())
        }),
    );

    let first = harness.dispatch("a");
    let second = harness.dispatch("ab");
    assert!(second > first);

    let events = harness.events_until_settled(second);
    thread::sleep(Duration::from_millis(250));
    assert!(harness.dispatcher.try_next_event().is_none());

    let received = batches(&events);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].generation, second);
    assert_eq!(received[0].results[0].title, "ab");
    assert_eq!(received[0].results[0].generation, second);
    assert_eq!(harness.dispatcher.state_of(first), GenerationState::Cancelled);
    assert_eq!(harness.dispatcher.state_of(second), GenerationState::Settled);
}

#[test]
fn failing_and_panicking_sources_do_not_block_others() {
    let harness = Harness::new(Duration::from_secs(2));
    harness.add(
        SourceMetadata::global("broken", "Broken"),
        FnSource::new(|_: &QueryContext<'_>| Err(SourceError::new("backend down"))),
    );
    harness.add(
        SourceMetadata::global("panics", "Panics"),
        FnSource::new(|_: &QueryContext<'_>| -> Result<SourceOutput, SourceError> {
            panic!("source bug")
        }),
    );
    harness.add(SourceMetadata::global("ok", "Ok"), echo_source(Duration::ZERO));

    let generation = harness.dispatch("query");
    let events = harness.events_until_settled(generation);

    let with_results: Vec<_> = batches(&events)
        .into_iter()
        .filter(|batch| !batch.results.is_empty())
        .collect();
    assert_eq!(with_results.len(), 1);
    assert_eq!(with_results[0].source_id, "ok");

    let sources = harness.sources.read();
    assert_eq!(sources["broken"].stats().failures, 1);
    assert_eq!(sources["panics"].stats().failures, 1);
    assert_eq!(sources["ok"].stats().failures, 0);
    assert_eq!(sources["ok"].stats().query_count, 1);
}

#[test]
fn still_searching_fires_only_when_nothing_returned_in_time() {
    let harness = Harness::new(Duration::from_millis(30));
    harness.add(
        SourceMetadata::global("slow", "Slow"),
        echo_source(Duration::from_millis(200)),
    );

    let generation = harness.dispatch("x");
    let events = harness.events_until_settled(generation);
    assert_eq!(events[0], DispatchEvent::StillSearching { generation });
    assert!(matches!(events[1], DispatchEvent::Batch(_)));
}

#[test]
fn fast_results_suppress_still_searching() {
    let harness = Harness::new(Duration::from_millis(150));
    harness.add(SourceMetadata::global("fast", "Fast"), echo_source(Duration::ZERO));

    let generation = harness.dispatch("x");
    let events = harness.events_until_settled(generation);
    thread::sleep(Duration::from_millis(250));

    assert!(!events
        .iter()
        .any(|event| matches!(event, DispatchEvent::StillSearching { .. })));
    assert!(harness.dispatcher.try_next_event().is_none());
}

#[test]
fn follow_up_batches_arrive_after_initial_batch() {
    let harness = Harness::new(Duration::from_secs(2));
    harness.add(
        SourceMetadata::keyword("web", "Web", "g"),
        FnSource::new(|ctx: &QueryContext<'_>| {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let search = ctx.query.search.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                let _ = tx.send(vec![
                    ResultItem::new(&search, "search"),
                    ResultItem::new(&format!("{search} tutorial"), "suggestion"),
                ]);
            });
            Ok(SourceOutput::ready(vec![ResultItem::new(&ctx.query.search, "search")])
                .with_follow_up(rx))
        }),
    );

    let generation = harness.dispatch("g rust");
    let events = harness.events_until_settled(generation);
    let received = batches(&events);

    assert_eq!(received.len(), 2);
    assert!(!received[0].follow_up);
    assert!(received[1].follow_up);
    assert_eq!(received[1].results.len(), 2);
}

#[test]
fn follow_up_of_superseded_generation_is_dropped() {
    let harness = Harness::new(Duration::from_secs(2));
    harness.add(
        SourceMetadata::global("web", "Web"),
        FnSource::new(|ctx: &QueryContext<'_>| {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let raw = ctx.query.raw.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                let _ = tx.send(vec![ResultItem::new(&raw, "late")]);
            });
            Ok(SourceOutput::ready(Vec::new()).with_follow_up(rx))
        }),
    );

    let first = harness.dispatch("r");
    thread::sleep(Duration::from_millis(20));
    let second = harness.dispatch("ru");

    let events = harness.events_until_settled(second);
    for batch in batches(&events) {
        assert_eq!(batch.generation, second);
    }
    assert_ne!(first, second);
}

#[test]
fn cancel_token_disconnects_when_superseded() {
    let counter = GenerationCounter::new();
    let first = counter.advance();
    assert!(matches!(
        first.cancelled().try_recv(),
        Err(crossbeam_channel::TryRecvError::Empty)
    ));

    let second = counter.advance();
    assert!(first.is_cancelled());
    assert!(matches!(
        first.cancelled().recv_timeout(Duration::from_millis(50)),
        Err(crossbeam_channel::RecvTimeoutError::Disconnected)
    ));
    assert!(!second.is_cancelled());
}

#[test]
fn cancelled_generation_lets_go_of_open_follow_up_stream() {
    let streams: Arc<parking_lot::Mutex<Vec<crossbeam_channel::Sender<Vec<ResultItem>>>>> =
        Arc::default();
    let held = Arc::clone(&streams);
    let harness = Harness::new(Duration::from_secs(2));
    harness.add(
        SourceMetadata::global("web", "Web"),
        FnSource::new(move |_ctx: &QueryContext<'_>| {
            let (tx, rx) = crossbeam_channel::bounded(0);
            held.lock().push(tx);
            Ok(SourceOutput::ready(Vec::new()).with_follow_up(rx))
        }),
    );

    let generation = harness.dispatch("r");
    assert!(matches!(
        harness.dispatcher.next_event(WAIT),
        Some(DispatchEvent::Batch(batch)) if batch.generation == generation
    ));
    harness.dispatcher.cancel();

    let deadline = std::time::Instant::now() + Duration::from_millis(500);
    let stream = streams.lock()[0].clone();
    loop {
        match stream.try_send(Vec::new()) {
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => break,
            _ if std::time::Instant::now() >= deadline => {
                panic!("worker still listening on a cancelled follow-up stream")
            }
            _ => thread::sleep(Duration::from_millis(5)),
        }
    }
}

#[test]
fn keyword_query_only_reaches_its_owner() {
    let harness = Harness::new(Duration::from_secs(2));
    harness.add(SourceMetadata::global("apps", "Apps"), echo_source(Duration::ZERO));
    harness.add(
        SourceMetadata::keyword("defs", "Definitions", "def"),
        echo_source(Duration::ZERO),
    );

    let generation = harness.dispatch("def foo");
    let events = harness.events_until_settled(generation);
    let received = batches(&events);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].source_id, "defs");
}

#[test]
fn query_without_sources_settles_immediately() {
    let harness = Harness::new(Duration::from_secs(2));
    let generation = harness.dispatch("nothing");
    let events = harness.events_until_settled(generation);
    assert_eq!(events, vec![DispatchEvent::Settled { generation }]);
}

#[test]
fn cancel_advances_generation_and_goes_idle() {
    let harness = Harness::new(Duration::from_secs(2));
    harness.add(
        SourceMetadata::global("slow", "Slow"),
        echo_source(Duration::from_millis(100)),
    );
    let generation = harness.dispatch("x");
    let cancelled_at = harness.dispatcher.cancel();

    assert!(cancelled_at > generation);
    assert_eq!(harness.dispatcher.state(), GenerationState::Idle);
    assert!(harness.dispatcher.next_event(Duration::from_millis(300)).is_none());
}
