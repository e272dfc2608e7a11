//! Search dispatcher — debounce, staleness tokens, backend fallback.
//!
//! Session phases: idle → debouncing → in-flight → resolved | errored, or
//! superseded when a newer dispatch (or a cancel) overtakes an in-flight one.
//! Only the response carrying the latest token is ever published.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use localmind_core::{Error, ModelSelection, Result, SearchSettings};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::SearchBackend;
use crate::history::SearchHistory;
use crate::mock::MockSearchBackend;
use crate::types::{
    DispatchOutcome, HistoryEntry, ResultSource, SearchFilters, SearchPhase, SearchRequest,
    SearchView,
};

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub debounce: Duration,
    pub history_limit: usize,
    pub filters: SearchFilters,
    /// Serve mock results when the backend fails. Off means the view goes to errored.
    pub fallback_to_mock: bool,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self::from_settings(&SearchSettings::default())
    }
}

impl DispatcherOptions {
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            debounce: Duration::from_millis(settings.debounce_ms),
            history_limit: settings.history_limit,
            filters: SearchFilters::default(),
            fallback_to_mock: true,
        }
    }
}

/// Handle to a search session. Clones share the session.
#[derive(Clone)]
pub struct SearchDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    backend: Arc<dyn SearchBackend>,
    mock: MockSearchBackend,
    selection: Arc<dyn ModelSelection>,
    options: DispatcherOptions,
    /// Last token handed out. Tokens start at 1.
    latest_token: AtomicU64,
    backend_connected: AtomicBool,
    session: Mutex<Session>,
    history: Mutex<SearchHistory>,
    view: watch::Sender<SearchView>,
}

#[derive(Default)]
struct Session {
    debounce: Option<JoinHandle<()>>,
    /// Bumped on every keystroke; a timer only fires if it is still current.
    debounce_seq: u64,
    in_flight: Option<CancellationToken>,
}

impl SearchDispatcher {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        selection: Arc<dyn ModelSelection>,
        options: DispatcherOptions,
    ) -> Result<Self> {
        if options.debounce.is_zero() {
            return Err(Error::Config("search debounce must be greater than zero".into()));
        }
        if options.history_limit == 0 {
            return Err(Error::Config("search history limit must be greater than zero".into()));
        }

        let (view, _) = watch::channel(SearchView::default());
        Ok(Self {
            inner: Arc::new(DispatcherInner {
                backend,
                mock: MockSearchBackend::new(),
                selection,
                history: Mutex::new(SearchHistory::new(options.history_limit)),
                options,
                latest_token: AtomicU64::new(0),
                backend_connected: AtomicBool::new(true),
                session: Mutex::new(Session::default()),
                view,
            }),
        })
    }

    /// Keystroke entry point. Restarts the debounce timer; a blank query
    /// cancels everything and returns to idle.
    pub fn on_query_change(&self, query: &str) {
        let query = query.trim().to_string();
        if query.is_empty() {
            self.cancel();
            let connected = self.is_backend_connected();
            self.inner.view.send_modify(|view| {
                *view = SearchView {
                    backend_connected: connected,
                    ..SearchView::default()
                };
            });
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime; ignoring query change");
                return;
            }
        };

        let mut session = self.inner.session.lock();
        if let Some(timer) = session.debounce.take() {
            timer.abort();
        }
        session.debounce_seq += 1;
        let seq = session.debounce_seq;

        self.inner.view.send_modify(|view| {
            view.query = query.clone();
            view.phase = SearchPhase::Debouncing;
        });

        let inner = self.inner.clone();
        let delay = self.inner.options.debounce;
        session.debounce = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut session = inner.session.lock();
                if session.debounce_seq != seq {
                    return;
                }
                // Detach so later keystrokes supersede by token, not by abort.
                session.debounce = None;
            }
            inner.dispatch(query, false).await;
        }));
    }

    /// Dispatch immediately, skipping the debounce, and record the query.
    pub async fn search_now(&self, query: &str) -> DispatchOutcome {
        let query = query.trim().to_string();
        if query.is_empty() {
            self.cancel();
            return DispatchOutcome::Superseded {
                token: self.inner.latest_token.load(Ordering::SeqCst),
            };
        }
        self.inner.stop_debounce();
        self.inner.dispatch(query, true).await
    }

    /// Abort the pending timer and any in-flight request. Safe to repeat.
    pub fn cancel(&self) {
        self.inner.stop_debounce();
        {
            let mut session = self.inner.session.lock();
            if let Some(cancel) = session.in_flight.take() {
                cancel.cancel();
                // Make any response still on its way stale.
                let token = self.inner.latest_token.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("Search cancelled, token now {}", token);
            }
        }
        self.inner.view.send_modify(|view| {
            if matches!(view.phase, SearchPhase::Debouncing | SearchPhase::InFlight) {
                view.phase = SearchPhase::Idle;
            }
        });
    }

    pub fn add_to_history(&self, query: &str) -> bool {
        self.inner.history.lock().add(query)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.history.lock().entries()
    }

    pub fn clear_history(&self) {
        self.inner.history.lock().clear();
    }

    pub fn suggestions(&self, prefix: &str, limit: usize) -> Vec<String> {
        self.inner.history.lock().suggestions(prefix, limit)
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchView> {
        self.inner.view.subscribe()
    }

    pub fn view(&self) -> SearchView {
        self.inner.view.borrow().clone()
    }

    pub fn is_backend_connected(&self) -> bool {
        self.inner.backend_connected.load(Ordering::SeqCst)
    }
}

impl DispatcherInner {
    fn stop_debounce(&self) {
        let mut session = self.session.lock();
        session.debounce_seq += 1;
        if let Some(timer) = session.debounce.take() {
            timer.abort();
        }
    }

    async fn dispatch(&self, query: String, record: bool) -> DispatchOutcome {
        // Token and in-flight slot change together so the newest dispatch is never cancelled.
        let cancel = CancellationToken::new();
        let token = {
            let mut session = self.session.lock();
            if let Some(previous) = session.in_flight.replace(cancel.clone()) {
                previous.cancel();
            }
            self.latest_token.fetch_add(1, Ordering::SeqCst) + 1
        };
        if record {
            self.history.lock().add(&query);
        }

        let request = SearchRequest {
            query: query.clone(),
            model_id: self.selection.current_model_id(),
            filters: self.options.filters.clone(),
        };
        debug!("Dispatch #{} query={:?} model={}", token, query, request.model_id);

        self.view.send_modify(|view| {
            view.query = query.clone();
            view.phase = SearchPhase::InFlight;
        });

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Dispatch #{} superseded in flight", token);
                return DispatchOutcome::Superseded { token };
            }
            result = self.backend.search(request.clone()) => result,
        };

        // Publish only if nothing newer was issued meanwhile.
        let mut session = self.session.lock();
        if self.latest_token.load(Ordering::SeqCst) != token || cancel.is_cancelled() {
            debug!("Dispatch #{} resolved stale, discarded", token);
            return DispatchOutcome::Superseded { token };
        }
        session.in_flight = None;

        // Only the latest dispatch may change connectivity.
        let outcome = match result {
            Ok(response) => {
                if !self.backend_connected.swap(true, Ordering::SeqCst) {
                    info!("Search backend reachable again");
                }
                Some((ResultSource::Backend, response))
            }
            Err(e) => {
                if self.backend_connected.swap(false, Ordering::SeqCst) {
                    warn!("Search backend unavailable, using local results: {}", e);
                } else {
                    debug!("Search backend still unavailable: {}", e);
                }
                self.options
                    .fallback_to_mock
                    .then(|| (ResultSource::Mock, self.mock.respond(&request)))
            }
        };

        let connected = self.backend_connected.load(Ordering::SeqCst);
        match outcome {
            Some((source, response)) => {
                self.view.send_modify(|view| {
                    view.query = query.clone();
                    view.phase = SearchPhase::Resolved;
                    view.results = response.results.clone();
                    view.total_results = response.total_results;
                    view.processing_time_ms = response.processing_time_ms;
                    view.model_used = Some(response.model_used.clone());
                    view.source = Some(source);
                    view.backend_connected = connected;
                    view.token = token;
                });
                DispatchOutcome::Resolved {
                    token,
                    source,
                    response,
                }
            }
            None => {
                self.view.send_modify(|view| {
                    view.query = query.clone();
                    view.phase = SearchPhase::Errored;
                    view.results.clear();
                    view.total_results = 0;
                    view.processing_time_ms = 0;
                    view.model_used = None;
                    view.source = None;
                    view.backend_connected = connected;
                    view.token = token;
                });
                DispatchOutcome::Failed { token }
            }
        }
    }
}
