//! The line protocol spoken between depots.
//!
//! One message per `\n`-terminated line, fields separated by `:`. Verbs
//! are recognised by leading prefix in a fixed priority order; the verb
//! token itself is never compared whole, so `Delivery:1:x` parses as a
//! `Deliver`. Anything that fails to parse is dropped by the dispatcher
//! without an answer to the peer.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use thiserror::Error;

/// Why a wire line was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The line does not start with a known verb.
    #[error("unrecognised verb")]
    UnknownVerb,
    /// More or fewer `:`-separated fields than the verb declares.
    #[error("wrong number of fields")]
    FieldCount,
    /// A string field was empty.
    #[error("empty field")]
    EmptyField,
    /// A quantity was not a strictly positive decimal.
    #[error("invalid quantity")]
    Quantity,
    /// A defer key was not an unsigned 32-bit decimal.
    #[error("invalid key")]
    Key,
}

/// One message on a depot link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Handshake announcement: the sender's listening port and name.
    Im {
        /// Listening port as the sender printed it, kept as a string.
        port: String,
        /// The sender's depot name.
        name: String,
    },
    /// Ask the receiver to dial another depot's listening port.
    Connect {
        /// Port to dial, kept as a string until dialling time.
        port: String,
    },
    /// Add goods to the receiver's inventory.
    Deliver {
        /// How many, strictly positive.
        quantity: i64,
        /// Which good.
        name: String,
    },
    /// Remove goods from the receiver's inventory (which may go negative).
    Withdraw {
        /// How many, strictly positive.
        quantity: i64,
        /// Which good.
        name: String,
    },
    /// Withdraw locally and hand the goods to a named neighbour.
    Transfer {
        /// How many, strictly positive.
        quantity: i64,
        /// Which good.
        name: String,
        /// Name the receiving neighbour announced in its handshake.
        destination: String,
    },
    /// Park a message for later replay under an integer key.
    Defer {
        /// Group key.
        key: u32,
        /// The parked line, verbatim, colons and all.
        task: String,
    },
    /// Replay and empty the deferred group under `key`.
    Execute {
        /// Group key.
        key: u32,
    },
}

impl FromStr for Message {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        // Prefix match in this exact order is the wire contract.
        if line.starts_with("Connect") {
            let [_, port] = split_exact(line)?;
            Ok(Self::Connect {
                port: non_empty(port)?.to_owned(),
            })
        } else if line.starts_with("IM") {
            let [_, port, name] = split_exact(line)?;
            Ok(Self::Im {
                port: non_empty(port)?.to_owned(),
                name: non_empty(name)?.to_owned(),
            })
        } else if line.starts_with("Deliver") {
            let [_, quantity, name] = split_exact(line)?;
            Ok(Self::Deliver {
                quantity: parse_quantity(quantity)?,
                name: non_empty(name)?.to_owned(),
            })
        } else if line.starts_with("Withdraw") {
            let [_, quantity, name] = split_exact(line)?;
            Ok(Self::Withdraw {
                quantity: parse_quantity(quantity)?,
                name: non_empty(name)?.to_owned(),
            })
        } else if line.starts_with("Defer") {
            let (key, task) = split_defer(line)?;
            Ok(Self::Defer { key, task })
        } else if line.starts_with("Execute") {
            let [_, key] = split_exact(line)?;
            Ok(Self::Execute {
                key: parse_key(key)?,
            })
        } else if line.starts_with("Transfer") {
            let [_, quantity, name, destination] = split_exact(line)?;
            Ok(Self::Transfer {
                quantity: parse_quantity(quantity)?,
                name: non_empty(name)?.to_owned(),
                destination: non_empty(destination)?.to_owned(),
            })
        } else {
            Err(ParseError::UnknownVerb)
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Im { port, name } => write!(f, "IM:{port}:{name}"),
            Self::Connect { port } => write!(f, "Connect:{port}"),
            Self::Deliver { quantity, name } => write!(f, "Deliver:{quantity}:{name}"),
            Self::Withdraw { quantity, name } => write!(f, "Withdraw:{quantity}:{name}"),
            Self::Transfer {
                quantity,
                name,
                destination,
            } => write!(f, "Transfer:{quantity}:{name}:{destination}"),
            Self::Defer { key, task } => write!(f, "Defer:{key}:{task}"),
            Self::Execute { key } => write!(f, "Execute:{key}"),
        }
    }
}

/// Frame `message` as one newline-terminated buffer, written and flushed
/// whole so a frame is never interleaved with another writer's bytes.
pub fn write_message<W: Write>(out: &mut W, message: &Message) -> io::Result<()> {
    let mut line = message.to_string();
    line.push('\n');
    out.write_all(line.as_bytes())?;
    out.flush()
}

/// Split on `:` into exactly `N` fields; anything else is a failure.
fn split_exact<const N: usize>(line: &str) -> Result<[&str; N], ParseError> {
    let mut fields = line.split(':');
    let mut out = [""; N];
    for slot in &mut out {
        *slot = fields.next().ok_or(ParseError::FieldCount)?;
    }
    if fields.next().is_some() {
        return Err(ParseError::FieldCount);
    }
    Ok(out)
}

/// `Defer` keeps everything after the second colon as an opaque tail.
fn split_defer(line: &str) -> Result<(u32, String), ParseError> {
    let mut fields = line.splitn(3, ':');
    let _verb = fields.next().ok_or(ParseError::FieldCount)?;
    let key = fields.next().ok_or(ParseError::FieldCount)?;
    let task = fields.next().ok_or(ParseError::FieldCount)?;
    if task.is_empty() {
        return Err(ParseError::EmptyField);
    }
    Ok((parse_key(key)?, task.to_owned()))
}

fn parse_quantity(field: &str) -> Result<i64, ParseError> {
    match field.parse::<i64>() {
        Ok(quantity) if quantity > 0 => Ok(quantity),
        _ => Err(ParseError::Quantity),
    }
}

fn parse_key(field: &str) -> Result<u32, ParseError> {
    field.parse().map_err(|_| ParseError::Key)
}

fn non_empty(field: &str) -> Result<&str, ParseError> {
    if field.is_empty() {
        Err(ParseError::EmptyField)
    } else {
        Ok(field)
    }
}
