use std::process::ExitCode;
use std::time::Duration;

use moondock::config::MoondockConfig;
use moondock::docker::DockerEventSource;
use moondock::events::{Normalizer, RawEvent};
use moondock::logging::Logging;
use moondock::pipeline::Pipeline;
use moondock::sink::{DiscordSink, LogSink, Sink};
use moondock::watcher::{HandlerError, Watcher};
use moondock::{cli, signals};

const GAVE_UP_POLL: Duration = Duration::from_secs(1);

fn main() -> ExitCode {
    // Values from .env never override the real environment.
    let _ = dotenv::dotenv();

    let args = cli::get_cli_args();
    let config = match MoondockConfig::try_init(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Unable to load config {:?}: {err}", args.config);
            return ExitCode::FAILURE;
        }
    };

    let logging = match Logging::init(&config.log) {
        Ok(logging) => logging,
        Err(err) => {
            eprintln!("Unable to initialize logging: {err}");
            return ExitCode::FAILURE;
        }
    };
    log::debug!("Logging at level {}", logging.level());

    let source = match DockerEventSource::connect(&config.docker) {
        Ok(source) => source,
        Err(err) => {
            log::error!("Could not connect to the Docker daemon: {err}");
            return ExitCode::FAILURE;
        }
    };

    let sink: Box<dyn Sink + Send> = match &config.discord.webhook {
        Some(webhook) => match DiscordSink::new(webhook.clone(), config.discord.timeout) {
            Ok(sink) => Box::new(sink),
            Err(err) => {
                log::error!("Unable to build the Discord client: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => {
            log::warn!("DISCORD_WEBHOOK not configured; events will only be logged.");
            Box::new(LogSink)
        }
    };

    let pipeline = Pipeline::new(Normalizer::default(), sink, config.critical_events.clone());
    let watcher = Watcher::new(
        source,
        move |raw: &RawEvent| -> Result<(), HandlerError> {
            pipeline.handle(raw);
            Ok(())
        },
        config.watcher.clone(),
    );

    let cancel = watcher.cancel_token();
    if let Err(err) = signals::handle_shutdown(cancel.clone()) {
        log::error!("Unable to install signal handlers: {err}");
        return ExitCode::FAILURE;
    }

    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);
    watcher.run_blocking();

    if cancel.is_cancelled() {
        return ExitCode::SUCCESS;
    }

    // The watcher gave up. Stay up, but quiet, until someone stops us.
    log::error!("Container events are no longer monitored. Waiting for a shutdown signal.");
    while !cancel.is_cancelled() {
        std::thread::sleep(GAVE_UP_POLL);
    }
    ExitCode::FAILURE
}
