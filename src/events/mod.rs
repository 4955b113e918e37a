//! Container runtime events.
//!
//! The runtime emits loosely-structured JSON objects ([`RawEvent`]). The
//! [`Normalizer`] turns those into [`CanonicalEvent`]s, which are what the
//! sinks understand.

mod actions;
mod normalize;

use serde::Serialize;
use serde_json::{Map, Value};

pub use actions::ActionTable;
pub use normalize::{normalize, EventView, Extractor, Identity, Normalizer};

/// An unprocessed event as produced by the runtime's event stream.
pub type RawEvent = Value;

/// Resource id used when none of the known keys resolve one.
pub const UNKNOWN_ID: &str = "<unknown>";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalEvent {
    /// Lower-cased event type, `unknown` when absent.
    pub domain: String,
    pub action: String,
    pub id: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub exit_code: Option<i64>,
    /// Seconds since the unix epoch.
    pub timestamp: f64,
    pub attributes: Map<String, Value>,
    pub raw: Map<String, Value>,
}

impl CanonicalEvent {
    /// The first 12 characters of the id, the way `docker ps` prints them.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(12) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }
}
