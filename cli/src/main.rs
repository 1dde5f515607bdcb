//! Depot node command line.

use std::env;
use std::io;

use color_eyre::eyre::Result;
use depotd::{Arguments, DepotNode};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let arguments = Arguments::parse(env::args().skip(1)).unwrap_or_else(|err| err.exit());
    color_eyre::install()?;
    // stdout belongs to the protocol (port announcement, snapshots);
    // logging goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let node = DepotNode::new(arguments)?;
    node.run()
}
