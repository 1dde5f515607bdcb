//! The listening side and the dialling side of the mesh.

use std::io::{self, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, trace};

use crate::session::Session;
use crate::state::{Depot, DepotState};

/// Depots only ever talk over loopback.
pub const LOCALHOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Bind the acceptor socket on an OS-assigned loopback port and announce
/// the chosen port on stdout. That announcement is the first thing a
/// depot ever prints.
pub fn bind() -> io::Result<(TcpListener, String)> {
    let listener = TcpListener::bind((LOCALHOST, 0))?;
    let port = listener.local_addr()?.port().to_string();
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{port}")?;
    stdout.flush()?;
    Ok((listener, port))
}

/// Accept inbound peers forever, one session thread per connection. Only
/// a failing `accept` ends the loop.
pub fn accept_loop(depot: &Arc<Depot>, listener: &TcpListener) -> io::Result<()> {
    loop {
        let (stream, address) = listener.accept()?;
        trace!(%address, "inbound connection");
        let depot = Arc::clone(depot);
        thread::Builder::new()
            .name("depot session".to_owned())
            .spawn(move || match Session::accept(depot, stream) {
                Ok(Some(session)) => session.run(),
                Ok(None) => debug!(%address, "inbound peer failed the handshake"),
                Err(err) => debug!(%address, %err, "inbound handshake aborted"),
            })?;
    }
}

/// Handle a `Connect` request: dial `port` on loopback and run the
/// outbound handshake, unless some neighbour already announced that port.
/// Runs under the dispatch lock `state` is the guard of; every failure
/// path returns silently beyond a log line.
pub(crate) fn connect(depot: &Arc<Depot>, state: &mut DepotState, port: &str) {
    if state.has_neighbour(port) {
        trace!(%port, "connect request for an existing neighbour");
        return;
    }
    let Ok(number) = port.parse::<u16>() else {
        trace!(%port, "connect request with an unusable port");
        return;
    };
    let stream = match TcpStream::connect((LOCALHOST, number)) {
        Ok(stream) => stream,
        Err(err) => {
            debug!(%port, %err, "outbound connection failed");
            return;
        }
    };
    match Session::initiate(Arc::clone(depot), state, stream) {
        Ok(Some(session)) => {
            let peer_port = session.peer_port().to_owned();
            match thread::Builder::new()
                .name("depot session".to_owned())
                .spawn(move || session.run())
            {
                Ok(handle) => state.set_reader_thread(&peer_port, handle.thread().clone()),
                Err(err) => error!(%err, "failed to spawn a session thread"),
            }
        }
        Ok(None) => debug!(%port, "outbound peer did not answer with IM"),
        Err(err) => debug!(%port, %err, "outbound handshake aborted"),
    }
}
