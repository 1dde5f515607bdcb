//! One peer TCP session: the handshake and the per-line dispatch loop.

use std::io::{self, BufRead, BufReader, Read};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, trace, warn};

use crate::message::{self, Message};
use crate::network;
use crate::state::{Depot, DepotState, Neighbour};

/// Reads `\n`-terminated lines of unbounded length from a byte stream.
pub(crate) struct LineReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> LineReader<R> {
    pub(crate) fn new(source: R) -> Self {
        Self {
            inner: BufReader::new(source),
        }
    }

    /// The next line without its terminator, or `None` at end of stream.
    /// A final line missing its newline is still yielded once.
    pub(crate) fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        if self.inner.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

/// A handshaken peer connection, driven by one reader thread.
///
/// The session owns only the read half; the write half lives in the
/// neighbour table, where `Transfer` handlers on any session reach it.
pub struct Session {
    depot: Arc<Depot>,
    reader: LineReader<TcpStream>,
    peer_name: String,
    peer_port: String,
}

impl Session {
    /// Inbound handshake: the first line must be the peer's `IM`, which
    /// registers it *before* our own announcement goes back (a peer that
    /// dialled us expects our `IM` promptly once it has sent its own).
    /// Anything else drops both halves of the socket; `None` means no
    /// session came of the connection.
    pub fn accept(depot: Arc<Depot>, stream: TcpStream) -> io::Result<Option<Self>> {
        let writer = stream.try_clone()?;
        let mut reader = LineReader::new(stream);
        let Some(line) = reader.read_line()? else {
            return Ok(None);
        };
        let Ok(Message::Im { port, name }) = line.parse::<Message>() else {
            debug!("inbound peer did not open with IM");
            return Ok(None);
        };

        let mut state = depot.state();
        state.register_neighbour(Neighbour::new(
            name.clone(),
            port.clone(),
            writer,
            thread::current(),
        ));
        let announcement = Message::Im {
            port: state.port().to_owned(),
            name: state.name().to_owned(),
        };
        state.send_to(&port, &announcement)?;
        drop(state);

        info!(peer = %name, %port, "registered inbound neighbour");
        Ok(Some(Self {
            depot,
            reader,
            peer_name: name,
            peer_port: port,
        }))
    }

    /// Outbound handshake, run while the caller already holds the depot
    /// lock (the lock is not reentrant, so the held guard's state comes in
    /// by reference): announce ourselves, then require the peer's `IM`
    /// before registering it. The reader-thread identity is patched in by
    /// the caller once the session thread exists.
    pub(crate) fn initiate(
        depot: Arc<Depot>,
        state: &mut DepotState,
        stream: TcpStream,
    ) -> io::Result<Option<Self>> {
        let mut writer = stream.try_clone()?;
        let mut reader = LineReader::new(stream);
        let announcement = Message::Im {
            port: state.port().to_owned(),
            name: state.name().to_owned(),
        };
        message::write_message(&mut writer, &announcement)?;

        let Some(line) = reader.read_line()? else {
            return Ok(None);
        };
        let Ok(Message::Im { port, name }) = line.parse::<Message>() else {
            debug!("outbound peer did not answer with IM");
            return Ok(None);
        };
        state.register_neighbour(Neighbour::new(
            name.clone(),
            port.clone(),
            writer,
            thread::current(),
        ));

        info!(peer = %name, %port, "registered outbound neighbour");
        Ok(Some(Self {
            depot,
            reader,
            peer_name: name,
            peer_port: port,
        }))
    }

    /// The listening port the peer announced.
    pub fn peer_port(&self) -> &str {
        &self.peer_port
    }

    /// Dispatch lines until the peer goes away. Only this session ends on
    /// close; the neighbour entry stays behind, and writes to it fail
    /// silently from then on.
    pub fn run(mut self) {
        loop {
            match self.reader.read_line() {
                Ok(Some(line)) => self.dispatch(&line),
                Ok(None) => {
                    info!(peer = %self.peer_name, "peer closed the connection");
                    break;
                }
                Err(err) => {
                    warn!(peer = %self.peer_name, %err, "session read failed");
                    break;
                }
            }
        }
    }

    /// Parse and handle one line under the depot lock. Unparsable lines
    /// are dropped without an answer; the session carries on.
    fn dispatch(&self, line: &str) {
        let message = match line.parse::<Message>() {
            Ok(message) => message,
            Err(err) => {
                trace!(peer = %self.peer_name, %err, "dropping malformed line");
                return;
            }
        };
        let mut state = self.depot.state();
        match message {
            Message::Deliver { quantity, name } => state.deliver(&name, quantity),
            Message::Withdraw { quantity, name } => state.withdraw(&name, quantity),
            Message::Transfer {
                quantity,
                name,
                destination,
            } => state.transfer(quantity, &name, &destination),
            Message::Defer { key, task } => state.defer(key, task),
            Message::Execute { key } => state.execute(key),
            Message::Connect { port } => network::connect(&self.depot, &mut state, &port),
            // a repeated announcement mid-session carries nothing new
            Message::Im { .. } => trace!(peer = %self.peer_name, "ignoring mid-session IM"),
        }
    }
}
