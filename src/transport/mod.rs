//! Transport to the remote actuator server.
//!
//! Line-delimited ASCII over TCP: the client connects with unbounded retry,
//! sends one command per line, keeps the link alive with an `echoback`
//! heartbeat, and surfaces server replies through a receive thread.

mod client;
mod error;
pub mod wire;

pub use client::{
    CommandSink, TransportClient, TransportConfig, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RECV_TIMEOUT, DEFAULT_RETRY_BACKOFF, DEFAULT_SEND_TIMEOUT,
    DEFAULT_SERVER_ADDR,
};
pub use error::TransportError;
pub use wire::{detected_line, encode_line, LineBuffer, HEARTBEAT_TOKEN};
