//! TCP client for the actuator server.
//!
//! The client owns a single connection to the server and hands out nothing
//! but `send`. Two optional background threads keep the link alive:
//!
//! - heartbeat: writes `echoback` every interval; on failure it drops the
//!   connection and reconnects inline (blocking retry with backoff)
//! - receiver: reads server replies, reassembles lines, and passes each one
//!   to a caller-supplied sink; read timeouts are benign
//!
//! The connection slot is guarded by a mutex that is never held across
//! socket I/O. Reconnects happen outside the lock and the new connection is
//! swapped in wholesale, so a writer never sees a half-replaced connection
//! and the control loop is never blocked behind a reconnect. Writes are
//! serialised on a separate lock; a write to a peer that stopped reading
//! holds up other writers for at most `send_timeout`. While the slot is
//! empty, `send` fails fast.
//!
//! Shutdown closes the socket, which makes pending reads return and lets the
//! background threads exit; there is no other cancellation channel.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::error::TransportError;
use super::wire::{encode_line, LineBuffer, ECHO_READ_LIMIT, HEARTBEAT_TOKEN};

pub const DEFAULT_SERVER_ADDR: &str = "192.168.50.100:8080";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(3);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(200);

/// Granularity at which sleeping workers notice shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Anything the control loop can hand a command line to.
pub trait CommandSink {
    fn send(&self, message: &str) -> Result<(), TransportError>;
}

impl<T: CommandSink + ?Sized> CommandSink for &T {
    fn send(&self, message: &str) -> Result<(), TransportError> {
        (**self).send(message)
    }
}

impl<T: CommandSink + ?Sized> CommandSink for Arc<T> {
    fn send(&self, message: &str) -> Result<(), TransportError> {
        (**self).send(message)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransportConfig {
    /// `host:port` of the actuator server. Resolved on every attempt.
    pub server_addr: String,
    pub connect_timeout: Duration,
    /// Delay between failed connection attempts.
    pub retry_backoff: Duration,
    /// Per-write deadline; exceeding it counts as a disconnect.
    pub send_timeout: Duration,
    /// Per-read deadline for the receiver and echo reads.
    pub recv_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    /// Bumped on every successful (re)connect.
    generation: u64,
}

impl Connection {
    fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

struct Shared {
    config: TransportConfig,
    slot: Mutex<Option<Arc<Connection>>>,
    writer: Mutex<()>,
    closed: AtomicBool,
    generations: AtomicU64,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Option<Arc<Connection>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn current(&self) -> Option<Arc<Connection>> {
        self.slot().clone()
    }

    /// Sleep for `duration`, waking early on shutdown. Returns false once
    /// the client is closed.
    fn sleep_unless_closed(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_closed() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SHUTDOWN_POLL));
        }
    }

    /// Write a framed line on the current connection.
    ///
    /// Writers are serialised on their own lock so that lines from different
    /// threads never interleave mid-line. The slot lock is only taken to
    /// fetch the connection, so a write stalled on a full socket never blocks
    /// slot readers or `shutdown`, which closes the socket and so ends the
    /// stalled write. A failed write drops the connection.
    fn write_line(&self, line: &[u8]) -> Result<Arc<Connection>, TransportError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let Some(conn) = self.current() else {
            return Err(TransportError::Disconnected("not connected".to_string()));
        };
        if let Err(err) = (&conn.stream).write_all(line) {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            let error = TransportError::from_write(&err);
            log::warn!("send to {} failed: {}", conn.peer, error);
            self.mark_broken(conn.generation);
            return Err(error);
        }
        Ok(conn)
    }

    /// Drop the connection if it is still the one identified by `generation`.
    fn mark_broken(&self, generation: u64) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|conn| conn.generation == generation) {
            if let Some(conn) = slot.take() {
                conn.close();
            }
        }
    }

    fn drop_current(&self) {
        if let Some(conn) = self.slot().take() {
            conn.close();
        }
    }

    /// Swap in a fresh connection. Refused (and the socket closed) after
    /// shutdown.
    fn install(&self, conn: Arc<Connection>) -> bool {
        let mut slot = self.slot();
        if self.is_closed() {
            conn.close();
            return false;
        }
        if let Some(old) = slot.replace(conn) {
            old.close();
        }
        true
    }

    /// Connect with unbounded retry. Returns `None` only on shutdown.
    fn establish(&self) -> Option<Arc<Connection>> {
        let mut attempt: u64 = 0;
        loop {
            if self.is_closed() {
                return None;
            }
            attempt += 1;
            match open_stream(&self.config) {
                Ok((stream, peer)) => {
                    let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
                    log::info!(
                        "connection established to {} (attempt {}, generation {})",
                        peer,
                        attempt,
                        generation
                    );
                    return Some(Arc::new(Connection {
                        stream,
                        peer,
                        generation,
                    }));
                }
                Err(err) => {
                    log::warn!(
                        "connection to {} failed: {}. retrying in {:.1}s",
                        self.config.server_addr,
                        err,
                        self.config.retry_backoff.as_secs_f32()
                    );
                    if !self.sleep_unless_closed(self.config.retry_backoff) {
                        return None;
                    }
                }
            }
        }
    }

    fn reconnect(&self) -> bool {
        self.drop_current();
        match self.establish() {
            Some(conn) => self.install(conn),
            None => false,
        }
    }

    /// Read one chunk as the echo acknowledgment for an `echoback` send.
    fn read_echo(&self, conn: &Connection) -> Result<Option<String>, TransportError> {
        let mut buf = [0u8; ECHO_READ_LIMIT];
        match (&conn.stream).read(&mut buf) {
            Ok(0) => {
                self.mark_broken(conn.generation);
                Err(TransportError::Disconnected(
                    "server closed connection".to_string(),
                ))
            }
            Ok(n) => Ok(Some(String::from_utf8_lossy(&buf[..n]).into_owned())),
            Err(err) => match TransportError::from_read(&err) {
                TransportError::Timeout => Ok(None),
                other => {
                    self.mark_broken(conn.generation);
                    Err(other)
                }
            },
        }
    }
}

fn open_stream(config: &TransportConfig) -> io::Result<(TcpStream, SocketAddr)> {
    let mut last_err = None;
    for addr in config.server_addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(stream) => {
                stream.set_write_timeout(Some(config.send_timeout))?;
                stream.set_read_timeout(Some(config.recv_timeout))?;
                stream.set_nodelay(true)?;
                return Ok((stream, addr));
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} resolved to no addresses", config.server_addr),
        )
    }))
}

/// Reconnecting line client for the actuator server.
pub struct TransportClient {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TransportClient {
    /// Connect to the server, retrying every `retry_backoff` until it
    /// succeeds. Blocks the calling thread for as long as that takes: the
    /// robot cannot act without the link.
    pub fn connect(config: TransportConfig) -> Self {
        let shared = Arc::new(Shared {
            config,
            slot: Mutex::new(None),
            writer: Mutex::new(()),
            closed: AtomicBool::new(false),
            generations: AtomicU64::new(0),
        });
        if let Some(conn) = shared.establish() {
            shared.install(conn);
        }
        Self {
            shared,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }

    pub fn server_addr(&self) -> &str {
        &self.shared.config.server_addr
    }

    /// Address of the live connection, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.current().map(|conn| conn.peer)
    }

    pub fn is_connected(&self) -> bool {
        !self.shared.is_closed() && self.shared.current().is_some()
    }

    /// Number of connections established so far (1 after `connect`).
    pub fn generation(&self) -> u64 {
        self.shared.current().map_or(0, |conn| conn.generation)
    }

    /// Send one message as a line.
    ///
    /// Does not reconnect: a failure marks the link down and is reported as
    /// `Disconnected` until the heartbeat re-establishes it. A message
    /// containing `echoback` is followed by a synchronous read of the echo.
    pub fn send(&self, message: &str) -> Result<(), TransportError> {
        let line =
            encode_line(message).map_err(|err| TransportError::InvalidMessage(err.to_string()))?;
        let conn = self.shared.write_line(&line)?;
        if message.contains(HEARTBEAT_TOKEN) {
            match self.shared.read_echo(&conn) {
                Ok(Some(echo)) => log::info!("echo from {}: {}", conn.peer, echo.trim_end()),
                Ok(None) => log::warn!("no echo from {} within deadline", conn.peer),
                Err(err) => log::warn!("echo read from {} failed: {}", conn.peer, err),
            }
        }
        Ok(())
    }

    /// Send the heartbeat token and return the echo, if one arrived in time.
    ///
    /// Competes with the receive loop for incoming bytes when both run.
    pub fn probe(&self) -> Result<Option<String>, TransportError> {
        let line = encode_line(HEARTBEAT_TOKEN)
            .map_err(|err| TransportError::InvalidMessage(err.to_string()))?;
        let conn = self.shared.write_line(&line)?;
        self.shared.read_echo(&conn)
    }

    /// Spawn the heartbeat thread. It runs until shutdown.
    pub fn start_heartbeat(&self, interval: Duration) -> anyhow::Result<()> {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("transport-heartbeat".to_string())
            .spawn(move || heartbeat_loop(shared, interval))?;
        self.workers().push(handle);
        Ok(())
    }

    /// Spawn the receive thread; every complete line from the server is
    /// handed to `sink`. The sink must not call `shutdown`.
    pub fn start_receive_loop<F>(&self, sink: F) -> anyhow::Result<()>
    where
        F: FnMut(String) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("transport-receiver".to_string())
            .spawn(move || receive_loop(shared, sink))?;
        self.workers().push(handle);
        Ok(())
    }

    /// Close the connection and stop background threads. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.drop_current();
        let workers = std::mem::take(&mut *self.workers());
        for handle in workers {
            if handle.join().is_err() {
                log::error!("transport worker thread panicked");
            }
        }
        log::info!("connection to {} closed", self.shared.config.server_addr);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_closed()
    }

    fn workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandSink for TransportClient {
    fn send(&self, message: &str) -> Result<(), TransportError> {
        TransportClient::send(self, message)
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn heartbeat_loop(shared: Arc<Shared>, interval: Duration) {
    let line = format!("{}\n", HEARTBEAT_TOKEN);
    loop {
        match shared.write_line(line.as_bytes()) {
            Ok(_) => {}
            Err(TransportError::Closed) => break,
            Err(err) => {
                log::warn!(
                    "heartbeat failed ({}); reconnecting to {}",
                    err,
                    shared.config.server_addr
                );
                if !shared.reconnect() {
                    break;
                }
            }
        }
        if !shared.sleep_unless_closed(interval) {
            break;
        }
    }
    log::debug!("heartbeat stopped");
}

fn receive_loop<F>(shared: Arc<Shared>, mut sink: F)
where
    F: FnMut(String),
{
    let mut buf = [0u8; ECHO_READ_LIMIT];
    let mut lines = LineBuffer::new();
    let mut generation = 0;
    loop {
        if shared.is_closed() {
            break;
        }
        let Some(conn) = shared.current() else {
            // Link is down; the heartbeat owns reconnection.
            if !shared.sleep_unless_closed(SHUTDOWN_POLL) {
                break;
            }
            continue;
        };
        if conn.generation != generation {
            lines.reset();
            generation = conn.generation;
        }
        match (&conn.stream).read(&mut buf) {
            Ok(0) => {
                if shared.is_closed() {
                    break;
                }
                log::warn!("server {} closed the connection", conn.peer);
                shared.mark_broken(conn.generation);
            }
            Ok(n) => {
                for line in lines.push(&buf[..n]) {
                    sink(line);
                }
            }
            Err(err) => {
                if shared.is_closed() {
                    break;
                }
                match TransportError::from_read(&err) {
                    TransportError::Timeout => {
                        log::debug!("no reply from {} within deadline", conn.peer);
                    }
                    other => {
                        log::warn!("receive from {} failed: {}", conn.peer, other);
                        shared.mark_broken(conn.generation);
                    }
                }
            }
        }
    }
    log::debug!("receiver stopped");
}
