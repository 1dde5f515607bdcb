//! End-to-end scenarios over real loopback sessions.
//!
//! Each test spins one or two full depots in-process and talks to them as
//! a bare TCP client, then polls the shared state handles until the
//! expected effect lands (sessions run on their own threads).

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use depot_core::{network, Depot};

/// A running depot plus the port it listens on.
fn spawn_depot(name: &str, stock: &[(&str, i64)]) -> (Arc<Depot>, String) {
    let (listener, port) = network::bind().expect("failed to bind a depot");
    let stock = stock
        .iter()
        .map(|&(good, quantity)| (good.to_owned(), quantity))
        .collect();
    let depot = Depot::new(name, port.clone(), stock);
    let accepting = Arc::clone(&depot);
    thread::spawn(move || {
        let _ = network::accept_loop(&accepting, &listener);
    });
    (depot, port)
}

fn dial(port: &str) -> TcpStream {
    let number: u16 = port.parse().expect("depot announced a non-numeric port");
    TcpStream::connect(("127.0.0.1", number)).expect("failed to dial depot")
}

/// Handshake against `port` as a bare client; returns the write half and
/// a reader over the same connection.
fn connect_as(port: &str, name: &str, own_port: &str) -> (TcpStream, BufReader<TcpStream>) {
    let mut stream = dial(port);
    let mut reader = BufReader::new(stream.try_clone().expect("failed to clone stream"));
    writeln!(stream, "IM:{own_port}:{name}").expect("failed to send IM");
    let mut reply = String::new();
    reader.read_line(&mut reply).expect("failed to read IM reply");
    assert!(reply.starts_with("IM:"), "expected an IM reply, got {reply:?}");
    (stream, reader)
}

fn send(stream: &mut TcpStream, line: &str) {
    writeln!(stream, "{line}").expect("failed to send line");
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("timed out waiting until {what}");
}

#[test]
fn deliveries_and_withdrawals_accumulate() {
    let (depot, port) = spawn_depot("alpha", &[("banana", 3)]);
    let (mut peer, _reader) = connect_as(&port, "tester", "1");

    send(&mut peer, "Deliver:2:banana");
    wait_until("the delivery lands", || {
        depot.state().quantity("banana") == Some(5)
    });

    send(&mut peer, "Withdraw:7:banana");
    wait_until("the withdrawal lands", || {
        depot.state().quantity("banana") == Some(-2)
    });
}

#[test]
fn withdrawing_an_unknown_good_goes_negative() {
    let (depot, port) = spawn_depot("alpha", &[]);
    let (mut peer, _reader) = connect_as(&port, "tester", "1");

    send(&mut peer, "Withdraw:5:widget");
    wait_until("the entry shows up negative", || {
        depot.state().quantity("widget") == Some(-5)
    });
}

#[test]
fn connect_registers_both_sides() {
    let (alpha, alpha_port) = spawn_depot("alpha", &[]);
    let (beta, beta_port) = spawn_depot("beta", &[]);
    let (mut peer, _reader) = connect_as(&alpha_port, "tester", "2");

    send(&mut peer, &format!("Connect:{beta_port}"));
    wait_until("alpha registers beta", || {
        alpha.state().has_neighbour(&beta_port)
    });
    wait_until("beta registers alpha", || {
        beta.state().has_neighbour(&alpha_port)
    });

    let state = alpha.state();
    let entry = state
        .neighbours()
        .find(|neighbour| neighbour.port() == beta_port)
        .expect("beta vanished from alpha's table");
    assert_eq!(entry.name(), "beta");
    assert!(entry.reader().name().is_some());
}

#[test]
fn transfer_moves_goods_to_the_destination() {
    let (alpha, alpha_port) = spawn_depot("alpha", &[("banana", 10)]);
    let (beta, beta_port) = spawn_depot("beta", &[]);
    let (mut peer, _reader) = connect_as(&alpha_port, "tester", "3");

    send(&mut peer, &format!("Connect:{beta_port}"));
    wait_until("the depots pair up", || {
        alpha.state().has_neighbour(&beta_port)
    });

    send(&mut peer, "Transfer:3:banana:beta");
    wait_until("alpha gives up the goods", || {
        alpha.state().quantity("banana") == Some(7)
    });
    wait_until("beta receives the goods", || {
        beta.state().quantity("banana") == Some(3)
    });
}

#[test]
fn defer_then_execute_replays_in_order() {
    let (depot, port) = spawn_depot("alpha", &[]);
    let (mut peer, _reader) = connect_as(&port, "tester", "4");

    send(&mut peer, "Defer:42:Deliver:1:apple");
    send(&mut peer, "Defer:42:Withdraw:2:apple");
    send(&mut peer, "Execute:42");
    wait_until("the group replays", || {
        depot.state().quantity("apple") == Some(-1)
    });

    // replaying the emptied group moves nothing; the marker just
    // sequences the assertion behind the second Execute
    send(&mut peer, "Execute:42");
    send(&mut peer, "Deliver:1:marker");
    wait_until("the marker lands", || {
        depot.state().quantity("marker") == Some(1)
    });
    assert_eq!(depot.state().quantity("apple"), Some(-1));
}

#[test]
fn deferred_transfers_keep_their_colons() {
    let (alpha, alpha_port) = spawn_depot("alpha", &[("banana", 10)]);
    let (beta, beta_port) = spawn_depot("beta", &[]);
    let (mut peer, _reader) = connect_as(&alpha_port, "tester", "5");

    send(&mut peer, &format!("Connect:{beta_port}"));
    wait_until("the depots pair up", || {
        alpha.state().has_neighbour(&beta_port)
    });

    send(&mut peer, "Defer:7:Transfer:2:banana:beta");
    send(&mut peer, "Execute:7");
    wait_until("alpha gives up the goods", || {
        alpha.state().quantity("banana") == Some(8)
    });
    wait_until("beta receives the goods", || {
        beta.state().quantity("banana") == Some(2)
    });
}

#[test]
fn duplicate_connects_are_suppressed() {
    let (alpha, alpha_port) = spawn_depot("alpha", &[]);
    let (beta, beta_port) = spawn_depot("beta", &[]);
    let (mut peer, _reader) = connect_as(&alpha_port, "tester", "6");

    send(&mut peer, &format!("Connect:{beta_port}"));
    wait_until("the depots pair up", || {
        alpha.state().has_neighbour(&beta_port)
    });
    send(&mut peer, &format!("Connect:{beta_port}"));
    send(&mut peer, "Deliver:1:marker");
    wait_until("the marker lands", || {
        alpha.state().quantity("marker") == Some(1)
    });

    let state = alpha.state();
    assert_eq!(
        state
            .neighbours()
            .filter(|neighbour| neighbour.port() == beta_port)
            .count(),
        1
    );
    drop(state);
    assert_eq!(
        beta.state()
            .neighbours()
            .filter(|neighbour| neighbour.port() == alpha_port)
            .count(),
        1
    );
}

#[test]
fn malformed_lines_are_dropped_not_fatal() {
    let (depot, port) = spawn_depot("alpha", &[]);
    let (mut peer, _reader) = connect_as(&port, "tester", "7");

    send(&mut peer, "Deliver::apple");
    send(&mut peer, "Deliver:1:apple");
    wait_until("the valid delivery lands", || {
        depot.state().quantity("apple") == Some(1)
    });
}

#[test]
fn garbage_handshake_is_rejected() {
    let (depot, port) = spawn_depot("alpha", &[]);
    let mut stream = dial(&port);
    writeln!(stream, "Greetings").expect("failed to send line");

    let mut reply = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut reply)
        .expect("read failed");
    assert_eq!(read, 0, "the depot should close on a bad handshake");
    assert_eq!(depot.state().neighbours().count(), 0);
}
