use super::worker::{Downstream, Session};
use crate::config::StreamdexConfig;
use crate::error::{Result, StreamdexError};
use crate::index::SearchIndexManager;
use crate::log::{ChangeLog, GroupCreated, StartPosition};
use crate::suggest::SuggestionIndexManager;
use crate::types::{FeatureFlags, LoopState};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;

const WORKER_THREAD_NAME: &str = "streamdex-indexer";

/// Flags and state after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub fulltext: bool,
    pub suggest: bool,
    pub state: LoopState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerStatus {
    pub state: LoopState,
    pub fulltext: bool,
    pub suggest: bool,
    /// Error that stopped the last session, if it did not stop on request.
    pub last_error: Option<String>,
}

struct RunningSession {
    token: CancellationToken,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct Control {
    flags: FeatureFlags,
    session: Option<RunningSession>,
}

/// Owns the consumption loop: starts and stops sessions on a dedicated
/// worker thread, each with its own current-thread tokio runtime, and holds
/// the feature flags the next session runs with.
pub struct StreamIndexer {
    config: Arc<StreamdexConfig>,
    log: Arc<dyn ChangeLog>,
    downstream: Arc<Downstream>,
    control: Mutex<Control>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl StreamIndexer {
    pub fn new(
        config: StreamdexConfig,
        log: Arc<dyn ChangeLog>,
        search: Arc<SearchIndexManager>,
        suggest: Arc<SuggestionIndexManager>,
    ) -> Self {
        let flags = config.flags();
        let downstream = Arc::new(Downstream {
            registry: Arc::clone(search.registry()),
            search,
            suggest,
        });
        StreamIndexer {
            config: Arc::new(config),
            log,
            downstream,
            control: Mutex::new(Control {
                flags,
                session: None,
            }),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    fn control(&self) -> Result<MutexGuard<'_, Control>> {
        self.control
            .lock()
            .map_err(|_| StreamdexError::Transport("indexer control lock poisoned".to_string()))
    }

    /// Start a session unless one is running. Creates the consumer groups
    /// and the search indexes first.
    pub fn start(&self) -> Result<LoopState> {
        let mut control = self.control()?;
        self.start_locked(&mut control)
    }

    /// Stop the running session and wait for the worker to exit.
    /// Unacknowledged entries stay pending and are redelivered on the next
    /// start.
    pub fn stop(&self) -> LoopState {
        match self.control() {
            Ok(mut control) => self.stop_locked(&mut control),
            Err(e) => {
                tracing::error!("[STREAM] stop failed: {}", e);
                LoopState::Stopped
            }
        }
    }

    pub fn state(&self) -> LoopState {
        match self.control() {
            Ok(control) => state_of(&control),
            Err(_) => LoopState::Stopped,
        }
    }

    pub fn flags(&self) -> FeatureFlags {
        self.control()
            .map(|c| c.flags)
            .unwrap_or_else(|_| self.config.flags())
    }

    pub fn status(&self) -> IndexerStatus {
        let (state, flags) = match self.control() {
            Ok(control) => (state_of(&control), control.flags),
            Err(_) => (LoopState::Stopped, self.config.flags()),
        };
        IndexerStatus {
            state,
            fulltext: flags.fulltext,
            suggest: flags.suggest,
            last_error: self.last_error.lock().ok().and_then(|e| e.clone()),
        }
    }

    pub fn set_fulltext_enabled(&self, enabled: bool) -> Result<ToggleOutcome> {
        self.toggle(|flags| flags.with_fulltext(enabled))
    }

    pub fn set_suggest_enabled(&self, enabled: bool) -> Result<ToggleOutcome> {
        self.toggle(|flags| flags.with_suggest(enabled))
    }

    /// Swap in new flags. A running session is restarted so that it picks
    /// them up; a stopped loop stays stopped.
    fn toggle(&self, change: impl FnOnce(FeatureFlags) -> FeatureFlags) -> Result<ToggleOutcome> {
        let mut control = self.control()?;
        let was_running = state_of(&control) == LoopState::Running;

        if was_running {
            self.stop_locked(&mut control);
        }
        control.flags = change(control.flags);
        tracing::info!(
            "[STREAM] flags now fulltext={} suggest={}",
            control.flags.fulltext,
            control.flags.suggest
        );
        let state = if was_running {
            self.start_locked(&mut control)?
        } else {
            LoopState::Stopped
        };

        Ok(ToggleOutcome {
            fulltext: control.flags.fulltext,
            suggest: control.flags.suggest,
            state,
        })
    }

    fn start_locked(&self, control: &mut Control) -> Result<LoopState> {
        if state_of(control) == LoopState::Running {
            return Ok(LoopState::Running);
        }
        // reap a session that ended on its own
        self.stop_locked(control);

        if let Err(e) = self.bootstrap() {
            tracing::error!("[STREAM] bootstrap failed: {}", e);
            self.set_last_error(Some(e.to_string()));
            return Err(e);
        }
        self.set_last_error(None);

        let token = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));
        let session = Arc::new(Session {
            log: Arc::clone(&self.log),
            downstream: Arc::clone(&self.downstream),
            config: Arc::clone(&self.config),
            flags: control.flags,
            token: token.clone(),
        });
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .thread_name(WORKER_THREAD_NAME)
            .build()?;

        let worker_running = Arc::clone(&running);
        let last_error = Arc::clone(&self.last_error);
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                if let Err(e) = runtime.block_on(session.run()) {
                    tracing::error!("[STREAM] session stopped on error: {}", e);
                    if let Ok(mut slot) = last_error.lock() {
                        *slot = Some(e.to_string());
                    }
                }
                worker_running.store(false, Ordering::SeqCst);
            })?;

        control.session = Some(RunningSession {
            token,
            running,
            handle,
        });
        tracing::info!("[STREAM] started");
        Ok(LoopState::Running)
    }

    fn stop_locked(&self, control: &mut Control) -> LoopState {
        if let Some(session) = control.session.take() {
            session.token.cancel();
            if session.handle.join().is_err() {
                tracing::error!("[STREAM] worker thread panicked");
                self.set_last_error(Some("worker thread panicked".to_string()));
            }
            tracing::info!("[STREAM] stopped");
        }
        LoopState::Stopped
    }

    /// Idempotently create both consumer groups on every topic, reading
    /// from the beginning, and make sure every entity index exists.
    fn bootstrap(&self) -> Result<()> {
        let groups = [self.config.search_group(), self.config.suggest_group()];
        for topic in &self.config.streams {
            for group in &groups {
                match self
                    .log
                    .ensure_group(topic, group, StartPosition::Beginning, true)?
                {
                    GroupCreated::Created => {
                        tracing::info!("[STREAM] created group {} on {}", group, topic)
                    }
                    GroupCreated::AlreadyExists => {
                        tracing::debug!("[STREAM] group {} exists on {}", group, topic)
                    }
                }
            }
        }
        self.downstream.search.bootstrap()
    }

    fn set_last_error(&self, error: Option<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = error;
        }
    }
}

fn state_of(control: &Control) -> LoopState {
    match &control.session {
        Some(session) if session.running.load(Ordering::SeqCst) => LoopState::Running,
        _ => LoopState::Stopped,
    }
}

impl Drop for StreamIndexer {
    fn drop(&mut self) {
        if let Ok(mut control) = self.control.lock() {
            if let Some(session) = control.session.take() {
                session.token.cancel();
                let _ = session.handle.join();
            }
        }
    }
}
