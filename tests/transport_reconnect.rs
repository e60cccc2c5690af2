use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use dogbot_follower::transport::{TransportClient, TransportConfig, TransportError};

fn fast_config(addr: String) -> TransportConfig {
    TransportConfig {
        server_addr: addr,
        connect_timeout: Duration::from_millis(500),
        retry_backoff: Duration::from_millis(50),
        send_timeout: Duration::from_millis(500),
        recv_timeout: Duration::from_millis(100),
        heartbeat_interval: Duration::from_millis(50),
    }
}

fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr").to_string();
    (listener, addr)
}

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

fn read_until_line(stream: TcpStream, wanted: &str) -> bool {
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("server read timeout");
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        match line {
            Ok(line) if line == wanted => return true,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
    false
}

#[test]
fn send_fails_fast_while_down_and_recovers_after_heartbeat_reconnect() {
    let (listener, addr) = listen();
    let client = TransportClient::connect(fast_config(addr));
    let (first, _) = listener.accept().expect("first accept");
    assert!(client.is_connected());
    assert_eq!(client.generation(), 1);
    assert_eq!(
        client.peer_addr().map(|peer| peer.to_string()),
        Some(client.server_addr().to_string())
    );

    client
        .start_receive_loop(|_| {})
        .expect("start receiver");

    // Server goes away; the receiver notices EOF and marks the link down.
    drop(first);
    assert!(wait_until(Duration::from_secs(2), || !client.is_connected()));

    let started = Instant::now();
    let err = client.send("heading").expect_err("send while down");
    assert!(matches!(err, TransportError::Disconnected(_)));
    assert!(started.elapsed() < Duration::from_millis(200));

    client
        .start_heartbeat(Duration::from_millis(50))
        .expect("start heartbeat");
    let (second, _) = listener.accept().expect("second accept");
    assert!(wait_until(Duration::from_secs(2), || client.is_connected()));
    assert_eq!(client.generation(), 2);

    client.send("heading").expect("send after reconnect");
    assert!(read_until_line(second, "heading"));

    client.shutdown();
}

#[test]
fn receive_loop_reassembles_lines_split_across_reads() {
    let (listener, addr) = listen();
    let client = TransportClient::connect(fast_config(addr));
    let (mut server, _) = listener.accept().expect("accept");

    let (tx, rx) = mpsc::channel();
    client
        .start_receive_loop(move |line| {
            let _ = tx.send(line);
        })
        .expect("start receiver");

    server.write_all(b"ok:hea").expect("write");
    server.flush().expect("flush");
    std::thread::sleep(Duration::from_millis(30));
    server.write_all(b"ding\r\nok:grab\n").expect("write");

    let timeout = Duration::from_secs(2);
    assert_eq!(rx.recv_timeout(timeout).expect("first line"), "ok:heading");
    assert_eq!(rx.recv_timeout(timeout).expect("second line"), "ok:grab");

    client.shutdown();
}

#[test]
fn probe_returns_the_servers_echo() {
    let (listener, addr) = listen();
    let mut config = fast_config(addr);
    config.recv_timeout = Duration::from_secs(1);
    let client = TransportClient::connect(config);
    let (server, _) = listener.accept().expect("accept");

    let echo = std::thread::spawn(move || {
        let mut writer = server.try_clone().expect("clone stream");
        let mut reader = BufReader::new(server);
        let mut line = String::new();
        if reader.read_line(&mut line).is_ok() {
            let _ = writer.write_all(line.as_bytes());
        }
    });

    let reply = client.probe().expect("probe");
    assert_eq!(reply.as_deref().map(str::trim_end), Some("echoback"));
    echo.join().expect("echo thread");

    client.shutdown();
}

#[test]
fn rejects_messages_that_would_break_framing() {
    let (listener, addr) = listen();
    let client = TransportClient::connect(fast_config(addr));
    let (mut server, _) = listener.accept().expect("accept");

    let err = client.send("r_cw\nr_ccw").expect_err("embedded newline");
    assert!(matches!(err, TransportError::InvalidMessage(_)));
    assert!(client.is_connected());

    client.send("r_cw").expect("valid send");
    server
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("read timeout");
    let mut buf = [0u8; 16];
    let n = server.read(&mut buf).expect("read");
    assert_eq!(&buf[..n], b"r_cw\n");

    client.shutdown();
}

#[test]
fn shutdown_is_idempotent_and_stops_workers() {
    let (listener, addr) = listen();
    let client = TransportClient::connect(fast_config(addr));
    let (_server, _) = listener.accept().expect("accept");

    client
        .start_heartbeat(Duration::from_millis(20))
        .expect("start heartbeat");
    client
        .start_receive_loop(|_| {})
        .expect("start receiver");

    let started = Instant::now();
    client.shutdown();
    client.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(client.is_shut_down());
    assert!(!client.is_connected());
    assert!(matches!(client.send("heading"), Err(TransportError::Closed)));
}

#[test]
fn connect_retries_until_server_listens() {
    let (listener, addr) = listen();
    drop(listener);

    let server_addr = addr.clone();
    let server = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        let listener = TcpListener::bind(&server_addr).expect("rebind");
        let (stream, _) = listener.accept().expect("accept");
        read_until_line(stream, "heading")
    });

    let started = Instant::now();
    let client = TransportClient::connect(fast_config(addr));
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert!(client.is_connected());
    assert_eq!(client.generation(), 1);

    client.send("heading").expect("send after retry");
    assert!(server.join().expect("server thread"));

    client.shutdown();
}

#[test]
fn failed_write_drops_the_link_and_later_sends_fail_fast() {
    let (listener, addr) = listen();
    let client = TransportClient::connect(fast_config(addr));
    let (server, _) = listener.accept().expect("accept");

    // The first write after the peer closes is accepted locally; the peer's
    // reset makes a following write fail.
    drop(server);
    let mut failure = None;
    for _ in 0..50 {
        if let Err(err) = client.send("r_cw") {
            failure = Some(err);
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    let err = failure.expect("write to a closed peer fails");
    assert!(matches!(err, TransportError::Disconnected(_)));
    assert!(!client.is_connected());
    assert_eq!(client.generation(), 0);

    let started = Instant::now();
    let err = client.send("r_cw").expect_err("send while down");
    assert!(matches!(err, TransportError::Disconnected(_)));
    assert!(started.elapsed() < Duration::from_millis(100));

    client.shutdown();
}

#[test]
fn stalled_write_does_not_block_status_or_shutdown() {
    let (listener, addr) = listen();
    let mut config = fast_config(addr);
    config.send_timeout = Duration::from_secs(5);
    let client = TransportClient::connect(config);
    // Accepted but never read, so the socket buffers fill up.
    let (_server, _) = listener.accept().expect("accept");

    let oversized = "x".repeat(32 * 1024 * 1024);
    std::thread::scope(|scope| {
        let writer = scope.spawn(|| client.send(&oversized));
        std::thread::sleep(Duration::from_millis(300));
        assert!(!writer.is_finished(), "write should be stalled on a full socket");

        let started = Instant::now();
        assert!(client.is_connected());
        assert_eq!(client.generation(), 1);
        assert!(started.elapsed() < Duration::from_millis(100));

        let started = Instant::now();
        client.shutdown();
        assert!(started.elapsed() < Duration::from_secs(2));

        let result = writer.join().expect("writer thread");
        assert!(result.is_err());
    });
    assert!(client.is_shut_down());
}
