//! actuator_console - manual link to the actuator server
//!
//! Two modes:
//! - `monitor`: keep the link alive with the heartbeat and print every reply
//!   until Ctrl-C
//! - `console`: read commands from stdin and send them one per line
//!   (`q` quits, an empty line repeats the previous command)

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::time::Duration;

use dogbot_follower::transport::{TransportClient, TransportConfig, DEFAULT_SERVER_ADDR};

#[derive(Parser, Debug)]
#[command(author, version, about = "Talk to the Dogbot actuator server by hand")]
struct Args {
    /// Actuator server address (host:port).
    #[arg(long, env = "FOLLOWER_SERVER_ADDR", default_value = DEFAULT_SERVER_ADDR)]
    server: String,

    /// Delay between connection attempts, in seconds.
    #[arg(long, default_value_t = 3)]
    retry_secs: u64,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Heartbeat + reply monitor.
    Monitor {
        /// Heartbeat interval in milliseconds.
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },
    /// Interactive command prompt.
    Console,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = TransportConfig {
        server_addr: args.server,
        retry_backoff: Duration::from_secs(args.retry_secs.max(1)),
        ..TransportConfig::default()
    };
    let client = TransportClient::connect(config);

    match args.mode {
        Mode::Monitor { interval_ms } => {
            monitor(&client, Duration::from_millis(interval_ms.max(1)))?
        }
        Mode::Console => console(&client)?,
    }

    client.shutdown();
    Ok(())
}

fn monitor(client: &TransportClient, interval: Duration) -> Result<()> {
    client.start_heartbeat(interval)?;
    client.start_receive_loop(|reply| log::info!("{}", reply))?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("monitoring; press Ctrl-C to stop");
    let _ = rx.recv();
    log::info!("shutdown signal received");
    Ok(())
}

fn console(client: &TransportClient) -> Result<()> {
    let stdin = io::stdin();
    let mut last: Option<String> = None;
    let mut input = stdin.lock();
    loop {
        print!(">> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let entered = line.trim();
        if entered == "q" {
            break;
        }
        let command = if entered.is_empty() {
            match &last {
                Some(previous) => previous.clone(),
                None => continue,
            }
        } else {
            entered.to_string()
        };

        match client.send(&command) {
            Ok(()) => println!("Sent: {}", command),
            Err(err) => log::warn!("'{}' not sent: {}", command, err),
        }
        last = Some(command);
    }
    Ok(())
}
