use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, trace, warn};

use crate::history::HistoryStore;
use crate::matcher::FuzzyMatcher;
use crate::model::{Generation, ResultItem};
use crate::router::{Query, QueryRouter};
use crate::source::{QueryContext, SourceHandle, SourceOutput};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
const RETIRED_GENERATIONS: usize = 16;

// Advancing cancels every token issued for earlier generations.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
    // Dropped on advance, which disconnects the previous tokens' receivers.
    live: Arc<Mutex<Option<Sender<()>>>>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> CancelToken {
        let (live_tx, live_rx) = crossbeam_channel::bounded::<()>(0);
        let mut live = self.live.lock();
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        *live = Some(live_tx);
        CancelToken {
            generation,
            current: Arc::clone(&self.current),
            live: live_rx,
        }
    }

    pub fn current(&self) -> Generation {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    generation: Generation,
    current: Arc<AtomicU64>,
    live: Receiver<()>,
}

impl CancelToken {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.current.load(Ordering::SeqCst) != self.generation
    }

    // Disconnects once the generation is superseded; usable in `select!`.
    pub fn cancelled(&self) -> &Receiver<()> {
        &self.live
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Dispatched,
    Collecting,
    Settled,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultBatch {
    pub generation: Generation,
    pub source_id: String,
    pub results: Vec<ResultItem>,
    pub follow_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Batch(ResultBatch),
    StillSearching { generation: Generation },
    Settled { generation: Generation },
}

#[derive(Debug, Clone)]
pub struct DispatchTicket {
    pub query: Arc<Query>,
    pub sources: Vec<String>,
}

impl DispatchTicket {
    pub fn generation(&self) -> Generation {
        self.query.generation
    }
}

#[derive(Debug)]
enum WorkerMessage {
    Batch(ResultBatch),
    Finished {
        generation: Generation,
        source_id: String,
    },
    StillSearching {
        generation: Generation,
    },
    NothingDispatched {
        generation: Generation,
    },
}

struct InFlight {
    generation: Generation,
    state: GenerationState,
    pending: usize,
    returned: bool,
    // Dropping the sender wakes and cancels the debounce timer.
    debounce_cancel: Option<Sender<()>>,
}

impl InFlight {
    fn idle() -> Self {
        Self {
            generation: 0,
            state: GenerationState::Idle,
            pending: 0,
            returned: false,
            debounce_cancel: None,
        }
    }
}

pub struct Dispatcher {
    router: Arc<RwLock<QueryRouter>>,
    sources: Arc<RwLock<HashMap<String, Arc<SourceHandle>>>>,
    history: Arc<HistoryStore>,
    matcher: FuzzyMatcher,
    generations: GenerationCounter,
    debounce: Duration,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    inflight: Mutex<InFlight>,
    retired: Mutex<VecDeque<(Generation, GenerationState)>>,
}

impl Dispatcher {
    pub fn new(
        router: Arc<RwLock<QueryRouter>>,
        sources: Arc<RwLock<HashMap<String, Arc<SourceHandle>>>>,
        history: Arc<HistoryStore>,
        matcher: FuzzyMatcher,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            router,
            sources,
            history,
            matcher,
            generations: GenerationCounter::new(),
            debounce: DEFAULT_DEBOUNCE,
            tx,
            rx,
            inflight: Mutex::new(InFlight::idle()),
            retired: Mutex::new(VecDeque::with_capacity(RETIRED_GENERATIONS)),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn current_generation(&self) -> Generation {
        self.generations.current()
    }

    pub fn state(&self) -> GenerationState {
        self.inflight.lock().state
    }

    // A generation superseded before settling reports `Cancelled`.
    pub fn state_of(&self, generation: Generation) -> GenerationState {
        {
            let inflight = self.inflight.lock();
            if inflight.generation == generation {
                return inflight.state;
            }
        }
        self.retired
            .lock()
            .iter()
            .find(|(retired, _)| *retired == generation)
            .map(|(_, state)| *state)
            .unwrap_or(GenerationState::Idle)
    }

    pub fn dispatch(&self, query: Query) -> DispatchTicket {
        let token = self.generations.advance();
        let generation = token.generation();
        let query = Arc::new(query.with_generation(generation));

        let source_ids = self.router.read().resolve_sources(&query);
        let handles: Vec<Arc<SourceHandle>> = {
            let sources = self.sources.read();
            source_ids
                .iter()
                .filter_map(|id| sources.get(id).cloned())
                .collect()
        };
        let dispatched: Vec<String> = handles.iter().map(|h| h.id().to_string()).collect();

        debug!(
            generation,
            query = %query,
            sources = dispatched.len(),
            "dispatching query"
        );

        {
            let mut inflight = self.inflight.lock();
            self.retire(supersede(&mut inflight, generation));
            inflight.pending = handles.len();
            if handles.is_empty() {
                inflight.state = GenerationState::Settled;
                let _ = self.tx.send(WorkerMessage::NothingDispatched { generation });
            } else {
                inflight.debounce_cancel = Some(self.spawn_debounce(generation));
            }
        }

        for handle in handles {
            self.spawn_worker(handle, Arc::clone(&query), token.clone());
        }

        DispatchTicket {
            query,
            sources: dispatched,
        }
    }

    pub fn cancel(&self) -> Generation {
        let generation = self.generations.advance().generation();
        let mut inflight = self.inflight.lock();
        self.retire(supersede(&mut inflight, generation));
        inflight.state = GenerationState::Idle;
        generation
    }

    pub fn next_event(&self, timeout: Duration) -> Option<DispatchEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = match self.rx.recv_timeout(remaining) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            };
            if let Some(event) = self.accept(message) {
                return Some(event);
            }
        }
    }

    pub fn try_next_event(&self) -> Option<DispatchEvent> {
        while let Ok(message) = self.rx.try_recv() {
            if let Some(event) = self.accept(message) {
                return Some(event);
            }
        }
        None
    }

    // Only messages stamped with the current generation get past here; the
    // caller never sees a stale batch.
    fn accept(&self, message: WorkerMessage) -> Option<DispatchEvent> {
        let current = self.generations.current();
        let mut inflight = self.inflight.lock();

        match message {
            WorkerMessage::Batch(batch) => {
                if batch.generation != current || inflight.generation != batch.generation {
                    trace!(
                        generation = batch.generation,
                        current,
                        source = %batch.source_id,
                        "dropping stale batch"
                    );
                    return None;
                }
                inflight.returned = true;
                inflight.debounce_cancel = None;
                if inflight.state == GenerationState::Dispatched {
                    inflight.state = GenerationState::Collecting;
                }
                Some(DispatchEvent::Batch(batch))
            }
            WorkerMessage::Finished {
                generation,
                source_id,
            } => {
                if generation != current || inflight.generation != generation {
                    return None;
                }
                trace!(generation, source = %source_id, "source finished");
                inflight.pending = inflight.pending.saturating_sub(1);
                if inflight.pending > 0 {
                    return None;
                }
                inflight.state = GenerationState::Settled;
                inflight.debounce_cancel = None;
                debug!(generation, "generation settled");
                Some(DispatchEvent::Settled { generation })
            }
            WorkerMessage::StillSearching { generation } => {
                if generation != current || inflight.generation != generation || inflight.returned {
                    return None;
                }
                Some(DispatchEvent::StillSearching { generation })
            }
            WorkerMessage::NothingDispatched { generation } => {
                if generation != current || inflight.generation != generation {
                    return None;
                }
                Some(DispatchEvent::Settled { generation })
            }
        }
    }

    fn retire(&self, previous: (Generation, GenerationState)) {
        if previous.0 == 0 {
            return;
        }
        let mut retired = self.retired.lock();
        if retired.len() == RETIRED_GENERATIONS {
            retired.pop_front();
        }
        retired.push_back(previous);
    }

    fn spawn_debounce(&self, generation: Generation) -> Sender<()> {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);
        let delay = self.debounce;
        let tx = self.tx.clone();
        let generations = self.generations.clone();

        let spawned = thread::Builder::new()
            .name("sift-debounce".to_string())
            .spawn(move || {
                crossbeam_channel::select! {
                    recv(cancel_rx) -> _ => {}
                    recv(crossbeam_channel::after(delay)) -> _ => {
                        if generations.is_current(generation) {
                            let _ = tx.send(WorkerMessage::StillSearching { generation });
                        }
                    }
                }
            });
        if let Err(error) = spawned {
            warn!(generation, %error, "failed to start debounce timer");
        }
        cancel_tx
    }

    fn spawn_worker(&self, handle: Arc<SourceHandle>, query: Arc<Query>, token: CancelToken) {
        let history = self.history.snapshot_for(handle.id());
        let matcher = self.matcher.clone();
        let tx = self.tx.clone();
        let generation = token.generation();
        let source_id = handle.id().to_string();

        let spawned = thread::Builder::new()
            .name(format!("sift-source-{source_id}"))
            .spawn(move || run_worker(&handle, &query, &history, &matcher, &token, &tx));

        if let Err(error) = spawned {
            error!(source = %source_id, generation, %error, "failed to start source worker");
            let _ = self.tx.send(WorkerMessage::Finished {
                generation,
                source_id,
            });
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("generation", &self.current_generation())
            .field("state", &self.state())
            .field("debounce", &self.debounce)
            .finish()
    }
}

fn supersede(inflight: &mut InFlight, generation: Generation) -> (Generation, GenerationState) {
    let final_state = match inflight.state {
        GenerationState::Dispatched | GenerationState::Collecting => {
            debug!(
                generation = inflight.generation,
                superseded_by = generation,
                "cancelling in-flight generation"
            );
            GenerationState::Cancelled
        }
        other => other,
    };
    let retired = (inflight.generation, final_state);
    *inflight = InFlight {
        generation,
        state: GenerationState::Dispatched,
        pending: 0,
        returned: false,
        debounce_cancel: None,
    };
    retired
}

fn run_worker(
    handle: &SourceHandle,
    query: &Query,
    history: &HashMap<String, i64>,
    matcher: &FuzzyMatcher,
    token: &CancelToken,
    tx: &Sender<WorkerMessage>,
) {
    let started = Instant::now();
    let ctx = QueryContext {
        query,
        history,
        matcher,
        cancel: token,
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| handle.source().query(&ctx)));
    let (output, failed) = match outcome {
        Ok(Ok(output)) => (output, false),
        Ok(Err(error)) => {
            warn!(source = %handle.id(), query = %query, %error, "source query failed");
            (SourceOutput::default(), true)
        }
        Err(_) => {
            error!(source = %handle.id(), query = %query, "source query panicked");
            (SourceOutput::default(), true)
        }
    };
    handle.record_query(started.elapsed(), failed);

    let SourceOutput { results, follow_up } = output;
    send_batch(tx, token, handle.id(), results, false);

    if let Some(follow_up) = follow_up {
        loop {
            crossbeam_channel::select! {
                recv(follow_up) -> message => match message {
                    Ok(results) => send_batch(tx, token, handle.id(), results, true),
                    Err(_) => break,
                },
                recv(token.cancelled()) -> _ => {
                    trace!(source = %handle.id(), generation = token.generation(), "abandoning follow-up stream");
                    break;
                }
            }
        }
    }

    let _ = tx.send(WorkerMessage::Finished {
        generation: token.generation(),
        source_id: handle.id().to_string(),
    });
}

fn send_batch(
    tx: &Sender<WorkerMessage>,
    token: &CancelToken,
    source_id: &str,
    mut results: Vec<ResultItem>,
    follow_up: bool,
) {
    if token.is_cancelled() {
        trace!(source = %source_id, generation = token.generation(), "skipping stale batch");
        return;
    }
    for result in &mut results {
        result.source_id = source_id.to_string();
        result.generation = token.generation();
    }
    let _ = tx.send(WorkerMessage::Batch(ResultBatch {
        generation: token.generation(),
        source_id: source_id.to_string(),
        results,
        follow_up,
    }));
}
