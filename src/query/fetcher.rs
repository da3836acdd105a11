//! Debounced, sequence-guarded list fetcher.
//!
//! A worker thread owns the debounce timer. [`DebouncedFetcher::schedule`]
//! (re)arms it with the newest query; when the quiet interval elapses the query
//! is dispatched on its own thread. Every dispatch takes the next sequence
//! number and a result is applied only if no newer dispatch has been issued
//! since, so the last request issued wins regardless of arrival order.
//!
//! In-flight requests are never aborted. After teardown their results are
//! dropped.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::core::errors::{LabError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::query::page::Page;
use crate::query::state::QueryState;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// The request a fetcher issues for a query.
pub type FetchFn<T> = Arc<dyn Fn(&QueryState) -> Result<Page<T>> + Send + Sync>;

type Observer<T> = Box<dyn Fn(&QueryState, &FetchOutcome<T>) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus<T> {
    Idle,
    Loading,
    Success(Page<T>),
    Failure(String),
}

/// Result of one applied response, as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<T> {
    Loaded(Page<T>),
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetcherStats {
    pub scheduled: u64,
    /// Pending schedules replaced before they fired.
    pub coalesced: u64,
    /// Pending schedules dropped by `cancel` or teardown.
    pub cancelled: u64,
    pub dispatched: u64,
    pub applied: u64,
    pub discarded: u64,
}

enum Command {
    Schedule(QueryState),
    Dispatch(QueryState),
    Cancel,
    Shutdown,
}

struct FetcherState<T> {
    status: FetchStatus<T>,
    cache: Option<Page<T>>,
    latest_query: Option<QueryState>,
    dispatched_query: Option<QueryState>,
    issued: u64,
    /// Commands sent to the worker that it has not picked up yet.
    queued: u64,
    timer_armed: bool,
    in_flight: u64,
    closed: bool,
    stats: FetcherStats,
}

impl<T> FetcherState<T> {
    const fn is_settled(&self) -> bool {
        self.queued == 0 && !self.timer_armed && self.in_flight == 0
    }
}

struct Shared<T> {
    label: String,
    fetch: FetchFn<T>,
    state: Mutex<FetcherState<T>>,
    settled: Condvar,
    observers: RwLock<Vec<Observer<T>>>,
    activity: Option<ActivityLoggerHandle>,
}

pub struct FetcherBuilder<T> {
    fetch: FetchFn<T>,
    debounce: Duration,
    label: String,
    activity: Option<ActivityLoggerHandle>,
}

impl<T: Clone + Send + Sync + 'static> FetcherBuilder<T> {
    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Name used in activity events (`asset`, `user-picker`, ...).
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn activity(mut self, handle: Option<ActivityLoggerHandle>) -> Self {
        self.activity = handle;
        self
    }

    pub fn spawn(self) -> Result<DebouncedFetcher<T>> {
        let shared = Arc::new(Shared {
            label: self.label,
            fetch: self.fetch,
            state: Mutex::new(FetcherState {
                status: FetchStatus::Idle,
                cache: None,
                latest_query: None,
                dispatched_query: None,
                issued: 0,
                queued: 0,
                timer_armed: false,
                in_flight: 0,
                closed: false,
                stats: FetcherStats::default(),
            }),
            settled: Condvar::new(),
            observers: RwLock::new(Vec::new()),
            activity: self.activity,
        });
        let (tx, rx) = unbounded();
        let worker_shared = Arc::clone(&shared);
        let debounce = self.debounce;
        let worker = thread::Builder::new()
            .name(format!("labdesk-debounce-{}", shared.label))
            .spawn(move || run_worker(&worker_shared, &rx, debounce))
            .map_err(|error| LabError::Unknown {
                details: format!("cannot start fetcher thread: {error}"),
            })?;
        Ok(DebouncedFetcher {
            shared,
            tx,
            worker: Some(worker),
            debounce,
        })
    }
}

/// Owned by exactly one list view. Dropping it cancels any pending fetch.
pub struct DebouncedFetcher<T: Clone + Send + Sync + 'static> {
    shared: Arc<Shared<T>>,
    tx: Sender<Command>,
    worker: Option<thread::JoinHandle<()>>,
    debounce: Duration,
}

impl<T: Clone + Send + Sync + 'static> DebouncedFetcher<T> {
    #[must_use]
    pub fn builder(fetch: FetchFn<T>) -> FetcherBuilder<T> {
        FetcherBuilder {
            fetch,
            debounce: DEFAULT_DEBOUNCE,
            label: "list".to_string(),
            activity: None,
        }
    }

    /// Fetcher with the given quiet interval and no activity logging.
    pub fn spawn(fetch: FetchFn<T>, debounce: Duration) -> Result<Self> {
        Self::builder(fetch).debounce(debounce).spawn()
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Fetch `query` once nothing newer has been scheduled for the quiet interval.
    pub fn schedule(&self, query: QueryState) {
        {
            let mut state = self.shared.state.lock();
            state.latest_query = Some(query.clone());
            state.stats.scheduled += 1;
        }
        self.send(Command::Schedule(query));
    }

    /// Dispatch immediately, superseding any pending schedule.
    pub fn fetch_now(&self, query: QueryState) {
        self.shared.state.lock().latest_query = Some(query.clone());
        self.send(Command::Dispatch(query));
    }

    /// Dispatch the most recently requested query again. `false` if there is none.
    pub fn refetch(&self) -> bool {
        let query = self.shared.state.lock().latest_query.clone();
        match query {
            Some(query) => {
                self.send(Command::Dispatch(query));
                true
            }
            None => false,
        }
    }

    /// Drop the pending schedule, if any. In-flight requests are left alone.
    pub fn cancel(&self) {
        self.send(Command::Cancel);
    }

    #[must_use]
    pub fn status(&self) -> FetchStatus<T> {
        self.shared.state.lock().status.clone()
    }

    /// Last successfully applied page. Survives later failures and reloads.
    #[must_use]
    pub fn cached_page(&self) -> Option<Page<T>> {
        self.shared.state.lock().cache.clone()
    }

    /// Query of the most recent dispatch.
    #[must_use]
    pub fn dispatched_query(&self) -> Option<QueryState> {
        self.shared.state.lock().dispatched_query.clone()
    }

    /// Sequence number of the most recent dispatch; zero before the first.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.shared.state.lock().issued
    }

    #[must_use]
    pub fn stats(&self) -> FetcherStats {
        self.shared.state.lock().stats
    }

    /// Called after every applied response, before `wait_settled` returns.
    pub fn on_settle<F>(&self, observer: F)
    where
        F: Fn(&QueryState, &FetchOutcome<T>) + Send + Sync + 'static,
    {
        self.shared.observers.write().push(Box::new(observer));
    }

    /// Block until nothing is queued, armed or in flight. `false` on timeout.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.is_settled() {
            if self.shared.settled.wait_until(&mut state, deadline).timed_out() {
                return state.is_settled();
            }
        }
        true
    }

    /// Stop the debounce worker. Called by `Drop`.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.tx.send(Command::Shutdown);
        let _ = worker.join();
        let mut state = self.shared.state.lock();
        state.closed = true;
        state.queued = 0;
        state.timer_armed = false;
        self.shared.settled.notify_all();
    }

    fn send(&self, command: Command) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.queued += 1;
        if self.tx.send(command).is_err() {
            state.queued -= 1;
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for DebouncedFetcher<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<T: Clone + Send + Sync + 'static>(
    shared: &Arc<Shared<T>>,
    rx: &Receiver<Command>,
    debounce: Duration,
) {
    let mut armed: Option<(QueryState, Instant)> = None;
    loop {
        let received = match &armed {
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some((_, deadline)) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
        };
        match received {
            Ok(Command::Schedule(query)) => {
                let mut state = shared.state.lock();
                state.queued -= 1;
                if armed.is_some() {
                    state.stats.coalesced += 1;
                }
                state.timer_armed = true;
                armed = Some((query, Instant::now() + debounce));
            }
            Ok(Command::Dispatch(query)) => {
                if armed.take().is_some() {
                    shared.state.lock().stats.coalesced += 1;
                }
                dispatch(shared, query, true);
            }
            Ok(Command::Cancel) => {
                let mut state = shared.state.lock();
                state.queued -= 1;
                if armed.take().is_some() {
                    state.stats.cancelled += 1;
                    state.timer_armed = false;
                }
                if state.is_settled() {
                    shared.settled.notify_all();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some((query, _)) = armed.take() {
                    dispatch(shared, query, false);
                }
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    if armed.is_some() {
        shared.state.lock().stats.cancelled += 1;
    }
}

fn dispatch<T: Clone + Send + Sync + 'static>(
    shared: &Arc<Shared<T>>,
    query: QueryState,
    dequeued: bool,
) {
    let seq = {
        let mut state = shared.state.lock();
        if dequeued {
            state.queued -= 1;
        }
        state.timer_armed = false;
        if state.closed {
            shared.settled.notify_all();
            return;
        }
        state.issued += 1;
        state.in_flight += 1;
        state.status = FetchStatus::Loading;
        state.dispatched_query = Some(query.clone());
        state.stats.dispatched += 1;
        state.issued
    };

    let worker_shared = Arc::clone(shared);
    let worker_query = query.clone();
    let spawned = thread::Builder::new()
        .name(format!("labdesk-fetch-{}-{seq}", shared.label))
        .spawn(move || complete(&worker_shared, seq, &worker_query, None));
    if let Err(error) = spawned {
        let failure = LabError::Unknown {
            details: format!("cannot start request thread: {error}"),
        };
        complete(shared, seq, &query, Some(failure));
    }
}

fn complete<T: Clone>(shared: &Shared<T>, seq: u64, query: &QueryState, failed: Option<LabError>) {
    let result = match failed {
        Some(error) => Err(error),
        None => (shared.fetch)(query).and_then(|page| page.validate().map(|()| page)),
    };
    let outcome = match result {
        Ok(page) => FetchOutcome::Loaded(page),
        Err(error) => FetchOutcome::Failed(error.display_message()),
    };

    let (applied, latest) = {
        let mut state = shared.state.lock();
        let applied = seq == state.issued && !state.closed;
        if applied {
            state.stats.applied += 1;
            state.status = match &outcome {
                FetchOutcome::Loaded(page) => {
                    state.cache = Some(page.clone());
                    FetchStatus::Success(page.clone())
                }
                FetchOutcome::Failed(message) => FetchStatus::Failure(message.clone()),
            };
        } else {
            state.stats.discarded += 1;
        }
        (applied, state.issued)
    };

    if applied {
        for observer in shared.observers.read().iter() {
            observer(query, &outcome);
        }
    } else if let Some(activity) = &shared.activity {
        activity.send(ActivityEvent::ResponseDiscarded {
            resource: shared.label.clone(),
            seq,
            latest,
        });
    }

    let mut state = shared.state.lock();
    state.in_flight -= 1;
    shared.settled.notify_all();
}
