use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};

use crate::watcher::CancelToken;

/// What should we do when the user stops this program?
///
/// The first SIGINT/SIGTERM asks the watcher to stop; a second one exits
/// right away.
pub fn handle_shutdown(cancel: CancelToken) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        let mut stopping = false;
        for signal in signals.forever() {
            if stopping {
                log::warn!("Received signal {signal} again, exiting now.");
                std::process::exit(130);
            }
            stopping = true;
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
            log::info!("Received signal {signal}, stopping watcher...");
            cancel.cancel();
        }
    });

    Ok(())
}
