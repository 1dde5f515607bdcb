//! Bootstrap for a command-line depot instance.
//!
//! [`Arguments`] are parsed and validated in [`args`] (the process exits
//! straight from there on a bad command line); everything after that is
//! wiring the core together: bind and announce the port, build the shared
//! state, start the signal worker, then accept peers on the calling
//! thread.

use std::net::TcpListener;
use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use depot_core::{handler::ThreadHandler, network, signal, Depot};
use tracing::info;

pub mod args;

pub use crate::args::{ArgsError, Arguments};

/// One running depot process: the shared state, the listening socket and
/// the signal worker that lives as long as the node does.
pub struct DepotNode {
    depot: Arc<Depot>,
    listener: TcpListener,
    _signal_worker: ThreadHandler,
}

impl DepotNode {
    /// Bind the node and announce its port; accepting starts in
    /// [`DepotNode::run`].
    ///
    /// # Errors
    /// Binding the acceptor socket or starting the signal worker failed.
    pub fn new(arguments: Arguments) -> Result<Self> {
        let (listener, port) = network::bind().wrap_err("Failed to bind the acceptor socket")?;
        let depot = Depot::new(arguments.name, port, arguments.stock);
        let signal_worker =
            signal::start(Arc::clone(&depot)).wrap_err("Failed to start the signal worker")?;
        {
            let state = depot.state();
            info!(name = %state.name(), port = %state.port(), "depot is listening");
        }
        Ok(Self {
            depot,
            listener,
            _signal_worker: signal_worker,
        })
    }

    /// Accept peers on the calling thread until the listener fails.
    ///
    /// # Errors
    /// Only a failing `accept`; peers coming and going are not errors.
    pub fn run(&self) -> Result<()> {
        network::accept_loop(&self.depot, &self.listener).wrap_err("The acceptor terminated")
    }
}
