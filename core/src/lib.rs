//! A depot: one node in a mesh of inventory-holding peers.
//!
//! Each depot process owns a table of named, signed-integer goods and a
//! table of handshaken neighbours, and exchanges `Deliver`/`Withdraw`/
//! `Transfer` style messages with its peers over a line-oriented TCP
//! protocol on loopback. Everything a session can touch lives behind one
//! process-wide lock; sessions are plain OS threads driven by blocking
//! reads, and a dedicated worker turns SIGHUP into an inventory snapshot
//! on stdout.
//!
//! Module map:
//! - [`message`]: the wire codec.
//! - [`state`]: the [`Depot`] aggregate, holding inventory, neighbours
//!   and deferred task groups, plus the snapshot rendering.
//! - [`session`]: one peer connection, handshake and dispatch loop.
//! - [`network`]: the acceptor socket and the outbound connector.
//! - [`signal`]: the SIGHUP/SIGPIPE worker.
//! - [`handler`]: join-on-drop thread handles.

pub mod handler;
pub mod message;
pub mod network;
pub mod session;
pub mod signal;
pub mod state;

pub use crate::state::{Depot, DepotState, Neighbour};
