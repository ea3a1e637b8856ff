//! Integration tests driving a real `Server` over loopback TCP.
//!
//! Each test picks a fixed free port with `portpicker` up front (rather
//! than binding `:0` and trying to read the chosen port back out of a
//! blocking `Server::run_tcp` call), builds a `Config` around it, runs
//! the server on a background thread, and drives it with plain
//! `std::net::TcpStream` clients.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rnet::{CallbackReturn, Conn, Config, ConnHandle, Operation, Server, TcpCallback};

fn read_line(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).expect("read a reply line");
        if byte[0] == b'\n' {
            break;
        }
        buf.push(byte[0]);
    }
    String::from_utf8(buf).unwrap()
}

fn split_first_line(head: &[u8], tail: &[u8]) -> Option<(Vec<u8>, usize)> {
    let joined: Vec<u8> = head.iter().chain(tail.iter()).copied().collect();
    joined
        .iter()
        .position(|&b| b == b'\n')
        .map(|pos| (joined[..pos].to_vec(), pos + 1))
}

struct EchoWithPrefix;

impl TcpCallback for EchoWithPrefix {
    fn on_conn_opened(&self, _conn: &mut Conn<'_>) -> CallbackReturn {
        (
            Some(b"hello client, welcome to connection\n".to_vec()),
            Operation::None,
        )
    }

    fn conn_handler(&self, conn: &mut Conn<'_>) -> CallbackReturn {
        let (_, head, tail) = conn.read();
        let Some((line, consumed)) = split_first_line(head, tail) else {
            return (None, Operation::None);
        };
        conn.shift_n(consumed);

        let mut reply = b"receive ".to_vec();
        reply.extend_from_slice(&line);
        reply.push(b'\n');

        if line == b"shutdown" {
            return (Some(reply), Operation::Shutdown);
        }
        (Some(reply), Operation::None)
    }
}

#[test]
fn echo_with_prefix_reuseport_four_loops() {
    let port = portpicker::pick_unused_port().expect("a free port");
    let config = Config::new(format!("127.0.0.1:{port}"))
        .with_reuse_port(true)
        .with_multicore(4);

    let server = thread::spawn(move || Server::run_tcp(config, Arc::new(EchoWithPrefix)));

    // The listener and all four loops need a moment to come up before
    // connecting.
    thread::sleep(Duration::from_millis(50));

    for _ in 0..8 {
        let mut stream =
            TcpStream::connect(("127.0.0.1", port)).expect("connect to a reuseport listener");
        stream.write_all(b"ping\n").unwrap();

        assert_eq!(read_line(&mut stream), "hello client, welcome to connection");
        assert_eq!(read_line(&mut stream), "receive ping");
    }

    let mut closer = TcpStream::connect(("127.0.0.1", port)).unwrap();
    closer.write_all(b"shutdown\n").unwrap();
    let _ = read_line(&mut closer);
    let _ = read_line(&mut closer);

    server
        .join()
        .expect("server thread should not panic")
        .expect("server should shut down cleanly");
}

struct HandleCapture {
    tx: mpsc::Sender<ConnHandle>,
}

impl TcpCallback for HandleCapture {
    fn on_conn_opened(&self, conn: &mut Conn<'_>) -> CallbackReturn {
        let _ = self.tx.send(conn.handle());
        (None, Operation::None)
    }

    fn conn_handler(&self, conn: &mut Conn<'_>) -> CallbackReturn {
        let (len, head, tail) = conn.read();
        conn.shift_n(len);
        let _ = (head, tail);
        (None, Operation::None)
    }
}

#[test]
fn backpressure_drains_a_large_async_write_once_the_client_reads() {
    let port = portpicker::pick_unused_port().expect("a free port");
    let (tx, rx) = mpsc::channel();
    let config = Config::new(format!("127.0.0.1:{port}")).with_multicore(1);

    let server = thread::spawn(move || Server::run_tcp(config, Arc::new(HandleCapture { tx })));
    thread::sleep(Duration::from_millis(30));

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let handle = rx.recv_timeout(Duration::from_secs(2)).unwrap();

    // Large enough that the kernel socket buffer cannot absorb it in one
    // write, forcing the loop to buffer the remainder in the outbound
    // ring and switch the fd to write-interest.
    let payload = vec![0xABu8; 8 * 1024 * 1024];
    handle.async_write(payload.clone());

    let mut received = vec![0u8; payload.len()];
    stream.read_exact(&mut received).expect("drain the full payload");
    assert_eq!(received, payload);

    handle.close();
    drop(stream);
    let _ = server; // server thread is left running; process exit reaps it
}

struct WakeEcho {
    tx: mpsc::Sender<ConnHandle>,
}

impl TcpCallback for WakeEcho {
    fn on_conn_opened(&self, conn: &mut Conn<'_>) -> CallbackReturn {
        let _ = self.tx.send(conn.handle());
        (None, Operation::None)
    }

    fn conn_handler(&self, _conn: &mut Conn<'_>) -> CallbackReturn {
        (None, Operation::None)
    }

    fn on_waken_handler(&self, _conn: &mut Conn<'_>) -> CallbackReturn {
        (Some(b"waken\n".to_vec()), Operation::None)
    }
}

#[test]
fn cross_thread_wake_runs_on_the_loop_thread() {
    let port = portpicker::pick_unused_port().expect("a free port");
    let (tx, rx) = mpsc::channel();
    let config = Config::new(format!("127.0.0.1:{port}")).with_multicore(1);

    let _server = thread::spawn(move || Server::run_tcp(config, Arc::new(WakeEcho { tx })));
    thread::sleep(Duration::from_millis(30));

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let handle = rx.recv_timeout(Duration::from_secs(2)).unwrap();

    handle.wake();
    assert_eq!(read_line(&mut stream), "waken");
}

struct CloseOnSecondLine;

impl TcpCallback for CloseOnSecondLine {
    fn conn_handler(&self, conn: &mut Conn<'_>) -> CallbackReturn {
        let (_, head, tail) = conn.read();
        let Some((line, consumed)) = split_first_line(head, tail) else {
            return (None, Operation::None);
        };
        conn.shift_n(consumed);
        (Some(line), Operation::Close)
    }
}

#[test]
fn close_delivers_the_returned_bytes_before_the_fin() {
    let port = portpicker::pick_unused_port().expect("a free port");
    let config = Config::new(format!("127.0.0.1:{port}")).with_multicore(1);

    let _server = thread::spawn(move || Server::run_tcp(config, Arc::new(CloseOnSecondLine)));
    thread::sleep(Duration::from_millis(30));

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(b"goodbye\n").unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).expect("read until the peer FIN");
    assert_eq!(buf, b"goodbye");
}

struct ShutdownOnConnect;

impl TcpCallback for ShutdownOnConnect {
    fn on_conn_opened(&self, _conn: &mut Conn<'_>) -> CallbackReturn {
        (None, Operation::Shutdown)
    }

    fn conn_handler(&self, _conn: &mut Conn<'_>) -> CallbackReturn {
        (None, Operation::None)
    }
}

#[test]
fn shutdown_operation_stops_the_server_within_a_bounded_time() {
    let port = portpicker::pick_unused_port().expect("a free port");
    let config = Config::new(format!("127.0.0.1:{port}")).with_multicore(2);

    let server = thread::spawn(move || Server::run_tcp(config, Arc::new(ShutdownOnConnect)));
    thread::sleep(Duration::from_millis(30));

    let connectors: Vec<_> = (0..3)
        .map(|_| thread::spawn(move || TcpStream::connect(("127.0.0.1", port))))
        .collect();
    let clients: Vec<_> = connectors.into_iter().filter_map(|h| h.join().ok()).collect();

    let result = server
        .join()
        .expect("server thread should not panic");
    assert!(result.is_ok());
    drop(clients);
}
