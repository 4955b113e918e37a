use std::{path::PathBuf, sync::OnceLock};

use clap::Parser;

/// Forwards container runtime events to a notification channel.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the config file. Defaults apply when it does not exist.
    #[arg(short, long, default_value = "moondock.toml")]
    pub config: PathBuf,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
