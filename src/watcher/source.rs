use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::events::RawEvent;

/// Shared cancellation flag. Cloning hands out another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to decode event: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

impl SourceError {
    /// Transport and API failures. Anything else points at a defect rather
    /// than a runtime hiccup.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Docker(_) | SourceError::Io(_))
    }
}

pub type EventStream<'a> = Box<dyn Iterator<Item = Result<RawEvent, SourceError>> + 'a>;

/// A long-lived subscription to the runtime's events.
///
/// Each call to [`EventSource::open`] starts a fresh stream. The stream may
/// end or fail at any point; the watcher decides whether to reconnect.
pub trait EventSource {
    fn open(&mut self, cancel: &CancelToken) -> Result<EventStream<'_>, SourceError>;
}
