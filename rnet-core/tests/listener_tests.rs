//! Integration tests for `Listener` bind/accept/recv_from/send_to.

use std::io::{Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::thread;
use std::time::Duration;

use rnet_core::listener::{Listener, Network};

#[test]
fn tcp_listener_accepts_a_real_connection() {
    let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), Network::Tcp, false).unwrap();
    let addr = listener.local_addr().unwrap();

    let client = thread::spawn(move || {
        // The listener is non-blocking; give the accept loop a moment to
        // be ready before connecting.
        thread::sleep(Duration::from_millis(20));
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"ping").unwrap();
    });

    let (socket, _peer) = loop {
        match listener.accept() {
            Ok(pair) => break pair,
            Err(_) => thread::sleep(Duration::from_millis(5)),
        }
    };
    client.join().unwrap();

    socket.set_nonblocking(false).unwrap();
    let mut std_socket: std::net::TcpStream = socket.into();
    let mut buf = [0u8; 4];
    std_socket.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ping");
}

#[test]
fn udp_listener_round_trips_a_datagram() {
    let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), Network::Udp, false).unwrap();
    let addr = listener.local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(b"haha", addr).unwrap();

    let mut buf = [0u8; 64];
    let (n, peer) = loop {
        match listener.recv_from(&mut buf) {
            Ok(pair) => break pair,
            Err(_) => thread::sleep(Duration::from_millis(5)),
        }
    };
    assert_eq!(&buf[..n], b"haha");

    listener.send_to(b"reply: haha", peer).unwrap();
    let mut reply = [0u8; 64];
    let (n, _) = client.recv_from(&mut reply).unwrap();
    assert_eq!(&reply[..n], b"reply: haha");
}

#[test]
fn listener_close_is_idempotent() {
    let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), Network::Tcp, false).unwrap();
    assert!(!listener.is_closed());
    listener.close();
    listener.close();
    assert!(listener.is_closed());
}
