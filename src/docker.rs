//! Docker event source using bollard.
//!
//! bollard is async; the watcher is not. The source owns a private
//! current-thread tokio runtime and drives the event stream with
//! `block_on`, one event at a time.

use std::path::Path;
use std::time::Duration;

use bollard::models::EventMessage;
use bollard::query_parameters::{EventsOptions, EventsOptionsBuilder};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::LocalBoxStream;
use futures_util::StreamExt;
use tokio::runtime::Runtime;

use crate::config::DockerConfig;
use crate::events::RawEvent;
use crate::watcher::{CancelToken, EventSource, EventStream, SourceError};

const CONNECT_TIMEOUT_SECS: u64 = 120;

pub struct DockerEventSource {
    docker: Docker,
    runtime: Runtime,
    read_poll: Duration,
}

impl DockerEventSource {
    /// Builds the client and checks that the daemon answers.
    pub fn connect(config: &DockerConfig) -> Result<Self, SourceError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let docker = {
            let _guard = runtime.enter();
            connect_docker(config.host.as_deref(), config.tls.as_deref())?
        };

        runtime.block_on(docker.ping())?;
        log::info!("Docker client initialized successfully.");

        Ok(Self {
            docker,
            runtime,
            read_poll: config.read_poll,
        })
    }
}

fn connect_docker(
    host: Option<&str>,
    tls: Option<&Path>,
) -> Result<Docker, bollard::errors::Error> {
    match host {
        None => {
            log::info!("Initializing Docker client with local defaults");
            Docker::connect_with_local_defaults()
        }
        Some(host) if host.starts_with("unix://") => {
            log::info!("Initializing Docker client - host: {host}");
            Docker::connect_with_unix(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        Some(host) => {
            log::info!("Initializing Docker client - host: {host}");
            match tls {
                Some(cert_path) if host.starts_with("tcp://") => {
                    log::info!("TLS mode enabled for Docker connection.");
                    Docker::connect_with_ssl(
                        host,
                        &cert_path.join("key.pem"),
                        &cert_path.join("cert.pem"),
                        &cert_path.join("ca.pem"),
                        CONNECT_TIMEOUT_SECS,
                        API_DEFAULT_VERSION,
                    )
                }
                _ => {
                    if host.starts_with("tcp://") {
                        log::warn!(
                            "Connecting to Docker via TCP without TLS. This is insecure for production environments."
                        );
                    }
                    Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
                }
            }
        }
    }
}

impl EventSource for DockerEventSource {
    fn open(&mut self, cancel: &CancelToken) -> Result<EventStream<'_>, SourceError> {
        // The event stream is lazy; ping so an unreachable daemon fails here.
        self.runtime.block_on(self.docker.ping())?;

        let options: EventsOptions = EventsOptionsBuilder::new().build();
        let stream = self.docker.events(Some(options)).boxed_local();

        Ok(Box::new(DockerEvents {
            runtime: &self.runtime,
            stream,
            cancel: cancel.clone(),
            read_poll: self.read_poll,
        }))
    }
}

struct DockerEvents<'a> {
    runtime: &'a Runtime,
    stream: LocalBoxStream<'a, Result<EventMessage, bollard::errors::Error>>,
    cancel: CancelToken,
    read_poll: Duration,
}

impl Iterator for DockerEvents<'_> {
    type Item = Result<RawEvent, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let stream = &mut self.stream;
            let read_poll = self.read_poll;
            let next = self
                .runtime
                .block_on(async move { tokio::time::timeout(read_poll, stream.next()).await });

            match next {
                Ok(Some(Ok(message))) => {
                    return Some(serde_json::to_value(message).map_err(SourceError::from));
                }
                Ok(Some(Err(e))) => return Some(Err(e.into())),
                Ok(None) => return None,
                // Quiet daemon; end the stream only if we are asked to stop.
                Err(_elapsed) if self.cancel.is_cancelled() => return None,
                Err(_elapsed) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bollard::models::{EventActor, EventMessage, EventMessageTypeEnum};
    use std::collections::HashMap;

    use super::*;
    use crate::events::normalize;

    #[test]
    fn test_event_message_normalizes() {
        let message = EventMessage {
            typ: Some(EventMessageTypeEnum::CONTAINER),
            action: Some("die".to_string()),
            actor: Some(EventActor {
                id: Some("4f3c9a1b2d7e8f90".to_string()),
                attributes: Some(HashMap::from([
                    ("name".to_string(), "web".to_string()),
                    ("image".to_string(), "nginx".to_string()),
                    ("exitCode".to_string(), "1".to_string()),
                ])),
            }),
            time: Some(1700000000),
            time_nano: Some(1700000000000000000),
            ..Default::default()
        };

        let raw = serde_json::to_value(message).expect("event message serializes");
        let event = normalize(&raw).expect("event should normalize");
        assert_eq!(event.domain, "container");
        assert_eq!(event.action, "die");
        assert_eq!(event.id, "4f3c9a1b2d7e8f90");
        assert_eq!(event.name.as_deref(), Some("web"));
        assert_eq!(event.exit_code, Some(1));
        assert_eq!(event.timestamp, 1700000000.0);
    }

    #[test]
    fn test_tls_with_missing_certificates_fails() {
        let res = connect_docker(
            Some("tcp://127.0.0.1:2376"),
            Some(Path::new("/nonexistent/moondock-certs")),
        );
        assert!(res.is_err());
    }
}
