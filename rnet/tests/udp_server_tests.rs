//! Integration tests driving a real `Server` over loopback UDP.

use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rnet::{CallbackReturn, Config, Operation, Pack, Server, UdpCallback};

struct ReplyPrefix;

impl UdpCallback for ReplyPrefix {
    fn pack_handler(&self, data: &[u8], pack: &Pack<'_>) -> CallbackReturn {
        let _ = pack.remote_addr();
        let mut reply = b"reply: ".to_vec();
        reply.extend_from_slice(data);
        (Some(reply), Operation::None)
    }
}

#[test]
fn udp_echo_with_prefix() {
    let port = portpicker::pick_unused_port().expect("a free port");
    let config = Config::new(format!("127.0.0.1:{port}"))
        .with_network(rnet::Network::Udp)
        .with_multicore(1);

    let _server = thread::spawn(move || Server::run_udp(config, Arc::new(ReplyPrefix)));
    thread::sleep(Duration::from_millis(30));

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(b"haha", ("127.0.0.1", port)).unwrap();

    let mut buf = [0u8; 64];
    client
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let (n, _) = client.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"reply: haha");
}

struct ShutdownOnMagicWord;

impl UdpCallback for ShutdownOnMagicWord {
    fn pack_handler(&self, data: &[u8], _pack: &Pack<'_>) -> CallbackReturn {
        if data == b"shutdown" {
            return (None, Operation::Shutdown);
        }
        (None, Operation::None)
    }
}

#[test]
fn udp_shutdown_operation_stops_the_server() {
    let port = portpicker::pick_unused_port().expect("a free port");
    let config = Config::new(format!("127.0.0.1:{port}"))
        .with_network(rnet::Network::Udp)
        .with_multicore(1);

    let server = thread::spawn(move || Server::run_udp(config, Arc::new(ShutdownOnMagicWord)));
    thread::sleep(Duration::from_millis(30));

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(b"shutdown", ("127.0.0.1", port)).unwrap();

    let result = server.join().expect("server thread should not panic");
    assert!(result.is_ok());
}
