//! SIGHUP-driven inventory snapshots.
//!
//! One worker thread consumes a signal iterator; nothing here ever runs
//! in async-signal context. SIGPIPE is registered alongside so that a
//! write to a vanished peer comes back as an error instead of taking the
//! process down.

use std::io::{self, Write};
use std::sync::Arc;
use std::thread;

use signal_hook::consts::signal::{SIGHUP, SIGPIPE};
use signal_hook::iterator::Signals;
use tracing::warn;

use crate::handler::ThreadHandler;
use crate::state::Depot;

/// Spawn the signal worker. Dropping the returned handler closes the
/// signal iterator and joins the thread.
pub fn start(depot: Arc<Depot>) -> io::Result<ThreadHandler> {
    let mut signals = Signals::new([SIGHUP, SIGPIPE])?;
    let handle = signals.handle();
    let thread = thread::Builder::new()
        .name("depot signal worker".to_owned())
        .spawn(move || {
            for signal in signals.forever() {
                if signal == SIGHUP {
                    dump(&depot);
                }
            }
        })?;
    Ok(ThreadHandler::new(Box::new(move || handle.close()), thread))
}

/// Render the snapshot to stdout under the depot lock.
fn dump(depot: &Depot) {
    let state = depot.state();
    let mut stdout = io::stdout().lock();
    if let Err(err) = state
        .write_snapshot(&mut stdout)
        .and_then(|()| stdout.flush())
    {
        warn!(%err, "failed to write the inventory snapshot");
    }
}
