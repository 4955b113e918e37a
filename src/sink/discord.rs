use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use url::Url;

use super::{Sink, SinkError};
use crate::events::CanonicalEvent;

const DEFAULT_COLOR: u32 = 0x808080;

const ACTION_COLORS: &[(&str, u32)] = &[
    ("die", 0xFF0000),
    ("kill", 0xFF4500),
    ("oom", 0xFF6347),
    ("restart", 0x1E90FF),
    ("start", 0x00FF00),
    ("stop", 0x808080),
    ("create", 0x00CED1),
    ("connect", 0xFFFF00),
    ("disconnect", 0xFFA500),
    ("destroy", 0x8B0000),
    ("pull", 0x1E90FF),
    ("push", 0x1E90FF),
    ("attach", 0x00CED1),
    ("health_healthy", 0x00FF00),
    ("health_unhealthy", 0xFF0000),
];

const ACTION_EMOJIS: &[(&str, &str)] = &[
    ("die", "🪦"),
    ("kill", "💀"),
    ("oom", "💥"),
    ("restart", "⟲"),
    ("start", "▶️"),
    ("stop", "⏹️"),
    ("create", "🏗️"),
    ("destroy", "🗑️"),
    ("pause", "⏸️"),
    ("unpause", "▶️"),
    ("health_healthy", "❤️"),
    ("health_unhealthy", "💔"),
    ("pull", "⬇️"),
    ("push", "⬆️"),
    ("connect", "🔗"),
    ("disconnect", "⛓️"),
    ("attach", "🔌"),
];

/// Posts events to a Discord webhook as embeds.
pub struct DiscordSink {
    client: Client,
    webhook: Url,
}

impl DiscordSink {
    pub fn new(webhook: Url, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, webhook })
    }
}

impl Sink for DiscordSink {
    fn send(&self, event: &CanonicalEvent) -> Result<(), SinkError> {
        let payload = json!({ "embeds": [build_embed(event)] });
        let response = self
            .client
            .post(self.webhook.clone())
            .json(&payload)
            .send()?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            log::debug!("Event sent to Discord successfully.");
            return Ok(());
        }
        Err(SinkError::Status {
            code: status.as_u16(),
            body: response.text().unwrap_or_default(),
        })
    }
}

fn action_color(action: &str) -> u32 {
    ACTION_COLORS
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_COLOR)
}

fn action_emoji(action: &str) -> Option<&'static str> {
    ACTION_EMOJIS
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, emoji)| *emoji)
}

fn build_embed(event: &CanonicalEvent) -> Value {
    let mut lines = vec![
        format!("Domain      : {}", event.domain),
        format!("Action      : {}", event.action),
    ];

    match event.domain.as_str() {
        "container" => {
            lines.push(format!("Name        : {}", event.name.as_deref().unwrap_or("N/A")));
            lines.push(format!("Image       : {}", event.image.as_deref().unwrap_or("N/A")));
            lines.push(format!("ID          : {}", event.short_id()));
            if let Some(code) = event.exit_code {
                lines.push(format!("Exit Code   : {code}"));
            }
        }
        "network" => {
            let container = event.attributes.get("container").and_then(Value::as_str);
            lines.push(format!("Network     : {}", event.name.as_deref().unwrap_or("N/A")));
            lines.push(format!("Container   : {}", container.unwrap_or("N/A")));
        }
        _ => lines.push(format!("ID          : {}", event.short_id())),
    }

    let title = match action_emoji(&event.action) {
        Some(emoji) => format!("{emoji} Docker Event Detected: {}", event.action),
        None => format!("Docker Event Detected: {}", event.action),
    };

    json!({
        "title": title,
        "color": action_color(&event.action),
        "description": format!("```{}```", lines.join("\n")),
    })
}
