//! Shared depot state: the goods ledger, the neighbour table and the
//! deferred-task registry, all behind one process-wide lock.

use std::collections::HashMap;
use std::io::{self, Write};
use std::mem;
use std::net::TcpStream;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::Thread;

use tracing::{debug, trace, warn};

use crate::message::{self, Message};

/// Root aggregate for one depot process.
///
/// A single coarse mutex guards every table and both identity strings;
/// session threads, the connector and the signal worker all serialise
/// through it. Handlers run with the lock held, including the socket
/// writes they perform, so a frame on a peer link is never interleaved.
pub struct Depot {
    state: Mutex<DepotState>,
}

impl Depot {
    /// Build the aggregate around its name, announced port and initial
    /// stock. Duplicate goods in the stock collapse into one entry by
    /// accumulation.
    pub fn new(
        name: impl Into<String>,
        port: impl Into<String>,
        stock: Vec<(String, i64)>,
    ) -> Arc<Self> {
        let mut inventory = HashMap::new();
        for (good, quantity) in stock {
            *inventory.entry(good).or_insert(0) += quantity;
        }
        Arc::new(Self {
            state: Mutex::new(DepotState {
                name: name.into(),
                port: port.into(),
                inventory,
                neighbours: HashMap::new(),
                deferred: HashMap::new(),
            }),
        })
    }

    /// Take the depot lock.
    pub fn state(&self) -> MutexGuard<'_, DepotState> {
        self.state.lock().expect("depot state lock poisoned")
    }
}

/// One fully handshaken peer, keyed in the table by the port it announced.
///
/// The entry owns the write half of the session's socket and outlives the
/// session: nothing evicts it when the peer goes away, and later writes to
/// it simply fail and are dropped.
pub struct Neighbour {
    name: String,
    port: String,
    stream: TcpStream,
    reader: Thread,
}

impl Neighbour {
    pub(crate) fn new(name: String, port: String, stream: TcpStream, reader: Thread) -> Self {
        Self {
            name,
            port,
            stream,
            reader,
        }
    }

    /// The name the remote depot announced.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The listening port the remote depot announced, as a string.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Identity of the thread driving this neighbour's session.
    pub fn reader(&self) -> &Thread {
        &self.reader
    }

    fn send(&mut self, message: &Message) -> io::Result<()> {
        message::write_message(&mut self.stream, message)
    }
}

/// Everything behind the depot lock.
pub struct DepotState {
    name: String,
    port: String,
    inventory: HashMap<String, i64>,
    neighbours: HashMap<String, Neighbour>,
    deferred: HashMap<u32, Vec<String>>,
}

impl DepotState {
    /// This depot's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This depot's listening port as a decimal string.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Current quantity of `good`, if the ledger has an entry for it.
    pub fn quantity(&self, good: &str) -> Option<i64> {
        self.inventory.get(good).copied()
    }

    /// Whether some neighbour announced `port` as its listening port.
    pub fn has_neighbour(&self, port: &str) -> bool {
        self.neighbours.contains_key(port)
    }

    /// All registered neighbours, in no particular order.
    pub fn neighbours(&self) -> impl Iterator<Item = &Neighbour> {
        self.neighbours.values()
    }

    /// Add `quantity` of `good`, creating the entry if needed.
    pub fn deliver(&mut self, good: &str, quantity: i64) {
        *self.inventory.entry(good.to_owned()).or_insert(0) += quantity;
    }

    /// Remove `quantity` of `good`; an unknown good ends up negative.
    pub fn withdraw(&mut self, good: &str, quantity: i64) {
        *self.inventory.entry(good.to_owned()).or_insert(0) -= quantity;
    }

    /// Withdraw locally, then hand the goods to every neighbour that
    /// announced `destination` as its name. With no such neighbour the
    /// withdrawal still stands; the goods are simply gone.
    pub fn transfer(&mut self, quantity: i64, good: &str, destination: &str) {
        self.withdraw(good, quantity);
        let delivery = Message::Deliver {
            quantity,
            name: good.to_owned(),
        };
        for neighbour in self
            .neighbours
            .values_mut()
            .filter(|neighbour| neighbour.name == destination)
        {
            if let Err(err) = neighbour.send(&delivery) {
                debug!(peer = %neighbour.port, %err, "dropping delivery to unreachable neighbour");
            }
        }
    }

    /// Append `task` to the group under `key`, creating the group on
    /// first use. Arrival order is replay order.
    pub fn defer(&mut self, key: u32, task: String) {
        self.deferred.entry(key).or_default().push(task);
    }

    /// Replay the group under `key` in arrival order, then empty it.
    /// Only `Deliver`, `Withdraw` and `Transfer` are honoured inside a
    /// group; anything else parked there is skipped. The (now empty)
    /// group entry survives for future defers to the same key.
    pub fn execute(&mut self, key: u32) {
        let Some(tasks) = self.deferred.get_mut(&key) else {
            trace!(key, "execute for an unknown key");
            return;
        };
        for task in mem::take(tasks) {
            match task.parse::<Message>() {
                Ok(Message::Deliver { quantity, name }) => self.deliver(&name, quantity),
                Ok(Message::Withdraw { quantity, name }) => self.withdraw(&name, quantity),
                Ok(Message::Transfer {
                    quantity,
                    name,
                    destination,
                }) => self.transfer(quantity, &name, &destination),
                _ => trace!(key, "skipping deferred entry"),
            }
        }
    }

    /// Insert `neighbour` under the port it announced. A re-announced
    /// port replaces the stale entry, keeping the table keyed.
    pub(crate) fn register_neighbour(&mut self, neighbour: Neighbour) {
        trace!(peer = %neighbour.name, port = %neighbour.port, "registering neighbour");
        if let Some(stale) = self.neighbours.insert(neighbour.port.clone(), neighbour) {
            warn!(peer = %stale.name, port = %stale.port, "replaced a neighbour that re-announced its port");
        }
    }

    pub(crate) fn set_reader_thread(&mut self, port: &str, reader: Thread) {
        if let Some(neighbour) = self.neighbours.get_mut(port) {
            neighbour.reader = reader;
        }
    }

    pub(crate) fn send_to(&mut self, port: &str, message: &Message) -> io::Result<()> {
        if let Some(neighbour) = self.neighbours.get_mut(port) {
            neighbour.send(message)
        } else {
            trace!(%port, "no neighbour under that port to send to");
            Ok(())
        }
    }

    /// Render the diagnostic snapshot: goods sorted by name with zero
    /// quantities left out, then neighbour names sorted.
    pub fn write_snapshot(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "Goods:")?;
        let mut goods: Vec<(&str, i64)> = self
            .inventory
            .iter()
            .filter(|&(_, &quantity)| quantity != 0)
            .map(|(name, &quantity)| (name.as_str(), quantity))
            .collect();
        goods.sort_unstable();
        for (name, quantity) in goods {
            writeln!(out, "{name} {quantity}")?;
        }
        writeln!(out, "Neighbours:")?;
        let mut names: Vec<&str> = self
            .neighbours
            .values()
            .map(|neighbour| neighbour.name.as_str())
            .collect();
        names.sort_unstable();
        for name in names {
            writeln!(out, "{name}")?;
        }
        Ok(())
    }
}
