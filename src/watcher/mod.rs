//! Long-running consumer of an [`EventSource`].
//!
//! The [`Watcher`] opens the source, hands every raw event to a handler and
//! reconnects with exponential backoff whenever the stream ends or fails. It
//! runs either on a dedicated thread ([`Watcher::run_in_background`]) or on
//! the caller's thread ([`Watcher::run_blocking`]) and stops cooperatively
//! when its [`CancelToken`] is set.
//!
//! Cancellation is observed before each connection attempt, between two
//! events and after every backoff sleep. A read blocked inside the source is
//! only interrupted if the source itself watches the token.

mod backoff;
mod source;

pub use backoff::{Backoff, Sleeper, ThreadSleeper};
pub use source::{CancelToken, EventSource, EventStream, SourceError};

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU32, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError},
        Arc, Mutex, MutexGuard, TryLockError,
    },
    thread::JoinHandle,
    time::Duration,
};

use crate::events::RawEvent;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Called once per raw event, on the watcher's thread.
pub type Handler = Box<dyn FnMut(&RawEvent) -> Result<(), HandlerError> + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct WatcherConfig {
    pub initial_backoff: Duration,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
    /// Consecutive transient failures tolerated before giving up. `None`
    /// retries forever.
    pub max_retries: Option<u32>,
    /// How long [`Watcher::stop`] waits for the loop thread to exit.
    pub stop_grace: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_backoff: Duration::from_secs(60),
            max_retries: None,
            stop_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum WatcherState {
    Connecting = 0,
    Streaming = 1,
    Backoff = 2,
    Stopped = 3,
}

impl WatcherState {
    #[inline]
    fn from_u32(val: u32) -> WatcherState {
        match val {
            0 => WatcherState::Connecting,
            1 => WatcherState::Streaming,
            2 => WatcherState::Backoff,
            _ => WatcherState::Stopped,
        }
    }
}

struct AtomicWatcherState(AtomicU32);

impl AtomicWatcherState {
    fn new(val: WatcherState) -> Self {
        AtomicWatcherState(AtomicU32::new(val as u32))
    }
    fn load(&self) -> WatcherState {
        WatcherState::from_u32(self.0.load(Ordering::SeqCst))
    }
    fn store(&self, value: WatcherState) {
        self.0.store(value as u32, Ordering::SeqCst)
    }
}

/// How a single stream came to an end.
enum StreamEnd {
    Cancelled,
    Closed,
    Failed(SourceError),
}

/// Everything the loop owns. Only the thread running the loop touches it.
struct WatchLoop {
    config: WatcherConfig,
    source: Box<dyn EventSource + Send>,
    handler: Handler,
    sleeper: Box<dyn Sleeper>,
}

impl WatchLoop {
    fn run(&mut self, cancel: &CancelToken, state: &AtomicWatcherState) {
        let mut retries: u32 = 0;
        let mut backoff = Backoff::new(
            self.config.initial_backoff,
            self.config.backoff_factor,
            self.config.max_backoff,
        );

        while !cancel.is_cancelled() {
            state.store(WatcherState::Connecting);
            log::info!("Opening container event stream...");

            let end = match self.source.open(cancel) {
                Ok(stream) => {
                    retries = 0;
                    backoff.reset();
                    state.store(WatcherState::Streaming);
                    dispatch(stream, &mut self.handler, cancel)
                }
                Err(err) => StreamEnd::Failed(err),
            };

            match end {
                StreamEnd::Cancelled => break,
                StreamEnd::Closed => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    // Neither the retry counter nor the backoff grows here.
                    log::warn!(
                        "Container event stream closed unexpectedly; will attempt to reconnect."
                    );
                    self.pause(backoff.current(), cancel, state);
                }
                StreamEnd::Failed(err) if err.is_transient() => {
                    retries += 1;
                    log::error!("Container event stream error: {err}");

                    if let Some(max) = self.config.max_retries.filter(|max| retries > *max) {
                        log::error!(
                            "Exceeded maximum retries ({max}). Stopping watcher; no further events will be reported."
                        );
                        break;
                    }

                    log::info!(
                        "Reconnecting to container events in {:.1}s (attempt {retries}).",
                        backoff.current().as_secs_f64()
                    );
                    self.pause(backoff.current(), cancel, state);
                    backoff.escalate();
                }
                StreamEnd::Failed(err) => {
                    log::error!("Unexpected error in watcher loop: {err:?}");
                    self.pause(backoff.current(), cancel, state);
                    backoff.escalate();
                }
            }
        }

        state.store(WatcherState::Stopped);
        log::info!("Watcher stopped.");
    }

    fn pause(&mut self, duration: Duration, cancel: &CancelToken, state: &AtomicWatcherState) {
        state.store(WatcherState::Backoff);
        self.sleeper.sleep(duration, cancel);
    }
}

fn dispatch(stream: EventStream<'_>, handler: &mut Handler, cancel: &CancelToken) -> StreamEnd {
    for item in stream {
        if cancel.is_cancelled() {
            log::info!("Stop requested, leaving the event stream.");
            return StreamEnd::Cancelled;
        }
        let raw = match item {
            Ok(raw) => raw,
            Err(err) => return StreamEnd::Failed(err),
        };
        match panic::catch_unwind(AssertUnwindSafe(|| handler(&raw))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::error!("Error inside event handler: {err}"),
            Err(panic) => log::error!("Event handler panicked: {}", panic_message(&*panic)),
        }
    }
    StreamEnd::Closed
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic payload"
    }
}

struct Worker {
    thread: JoinHandle<()>,
    done: Receiver<()>,
}

pub struct Watcher {
    core: Arc<Mutex<WatchLoop>>,
    cancel: CancelToken,
    state: Arc<AtomicWatcherState>,
    stop_grace: Duration,
    worker: Option<Worker>,
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Watcher {
    pub fn new<S, H>(source: S, handler: H, config: WatcherConfig) -> Self
    where
        S: EventSource + Send + 'static,
        H: FnMut(&RawEvent) -> Result<(), HandlerError> + Send + 'static,
    {
        Self::with_sleeper(source, handler, config, ThreadSleeper::default())
    }

    pub fn with_sleeper<S, H, Z>(source: S, handler: H, config: WatcherConfig, sleeper: Z) -> Self
    where
        S: EventSource + Send + 'static,
        H: FnMut(&RawEvent) -> Result<(), HandlerError> + Send + 'static,
        Z: Sleeper + 'static,
    {
        let stop_grace = config.stop_grace;
        let core = WatchLoop {
            config,
            source: Box::new(source),
            handler: Box::new(handler),
            sleeper: Box::new(sleeper),
        };
        Watcher {
            core: Arc::new(Mutex::new(core)),
            cancel: CancelToken::new(),
            state: Arc::new(AtomicWatcherState::new(WatcherState::Connecting)),
            stop_grace,
            worker: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state.load()
    }

    /// Whether a background loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.thread.is_finished())
    }

    /// A handle that stops the loop when cancelled, usable from any thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Starts the loop on a dedicated thread and returns immediately.
    pub fn run_in_background(&mut self) {
        if self.is_running() {
            log::warn!("Watcher already running.");
            return;
        }

        let core = Arc::clone(&self.core);
        let cancel = self.cancel.clone();
        let state = Arc::clone(&self.state);
        let (done_tx, done) = mpsc::channel::<()>();

        let spawned = std::thread::Builder::new()
            .name("moondock-watcher".to_string())
            .spawn(move || {
                let mut core = match core.lock() {
                    Ok(core) => core,
                    Err(poisoned) => poisoned.into_inner(),
                };
                core.run(&cancel, &state);
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(thread) => {
                self.worker = Some(Worker { thread, done });
                log::info!("Watcher started in background thread.");
            }
            Err(e) => log::error!("Unable to spawn the watcher thread: {e}"),
        }
    }

    /// Runs the loop on the calling thread until it is stopped or gives up.
    pub fn run_blocking(&self) {
        if self.is_running() {
            log::warn!("Watcher already running in the background.");
            return;
        }
        let Some(mut core) = self.try_lock_core() else {
            log::warn!("Watcher already running.");
            return;
        };
        log::info!("Watcher starting in foreground (blocking) mode.");
        core.run(&self.cancel, &self.state);
    }

    /// Requests the loop to stop and waits up to the grace period for the
    /// background thread to exit. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        let Some(worker) = self.worker.take() else {
            return;
        };

        log::info!("Stopping watcher...");
        match worker.done.recv_timeout(self.stop_grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.thread.join();
                log::info!("Watcher thread joined.");
            }
            Err(RecvTimeoutError::Timeout) => log::warn!(
                "Watcher thread did not exit within {:?}; leaving it detached.",
                self.stop_grace
            ),
        }
    }

    fn try_lock_core(&self) -> Option<MutexGuard<'_, WatchLoop>> {
        match self.core.try_lock() {
            Ok(core) => Some(core),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}
