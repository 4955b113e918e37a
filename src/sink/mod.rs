//! Delivery targets for canonical events.

mod discord;

pub use discord::DiscordSink;

use crate::events::CanonicalEvent;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response {code}: {body}")]
    Status { code: u16, body: String },
}

pub trait Sink {
    fn send(&self, event: &CanonicalEvent) -> Result<(), SinkError>;
}

/// Writes events to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl Sink for LogSink {
    fn send(&self, event: &CanonicalEvent) -> Result<(), SinkError> {
        log::info!(
            "{} {} {} (image: {}, exit code: {})",
            event.domain,
            event.action,
            event.name.as_deref().unwrap_or(event.short_id()),
            event.image.as_deref().unwrap_or("N/A"),
            event
                .exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
        );
        Ok(())
    }
}
