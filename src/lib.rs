//! Watches a container runtime's event stream and forwards normalized
//! events to a notification sink.

pub mod cli;
pub mod config;
pub mod docker;
pub mod events;
pub mod logging;
pub mod pipeline;
pub mod signals;
pub mod sink;
pub mod watcher;
