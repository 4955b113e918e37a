use crate::events::{Normalizer, RawEvent};
use crate::sink::Sink;

/// Normalizes raw events and forwards the interesting ones to a sink.
pub struct Pipeline {
    normalizer: Normalizer,
    sink: Box<dyn Sink + Send>,
    /// Allow-list of canonical actions. Empty forwards everything.
    actions: Vec<String>,
}

impl Pipeline {
    pub fn new(normalizer: Normalizer, sink: Box<dyn Sink + Send>, actions: Vec<String>) -> Self {
        Self {
            normalizer,
            sink,
            actions,
        }
    }

    fn forwards(&self, action: &str) -> bool {
        self.actions.is_empty() || self.actions.iter().any(|a| a == action)
    }

    /// Delivery failures are logged here and never reach the watcher.
    pub fn handle(&self, raw: &RawEvent) {
        let Some(event) = self.normalizer.normalize(raw) else {
            return;
        };
        if !self.forwards(&event.action) {
            log::debug!("Skipping {} {} event", event.domain, event.action);
            return;
        }
        match self.sink.send(&event) {
            Ok(()) => log::info!("Event sent: {} {}", event.domain, event.action),
            Err(e) => log::error!(
                "Failed to send {} {} event for {}: {e}",
                event.domain,
                event.action,
                event.short_id()
            ),
        }
    }
}
