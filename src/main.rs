// File: main.rs
//
// The purpose of this file is to parse CLI arguments, wire up logging and
// signal handling, and run a node's message loop to completion.

use std::net::SocketAddr;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;

mod error;
mod handler;
mod hash;
mod msg;
mod node;

use error::NodeError;
use handler::Handler;

/// Holds data parsed from the command line to initialize a node.
#[derive(StructOpt, Debug)]
#[structopt(name = "ringhash")]
pub struct CLI {
  /// Enables debug-level logging (overrides RUST_LOG).
  #[structopt(short, long)]
  debug: bool,

  /// Address this node binds its UDP socket to.
  #[structopt(long)]
  node_addr: SocketAddr,

  /// Address of an existing ring member to join through. Omit to found a
  /// new ring as its sole member.
  #[structopt(long)]
  bootstrap: Option<SocketAddr>,

  /// Size of the identifier ring (`M`).
  #[structopt(long, default_value = "1024")]
  ring_size: u32,

  /// Run the finger-table routing variant instead of the baseline.
  #[structopt(long)]
  fingers: bool,

  /// UDP read timeout in milliseconds; also the stabilization tick period.
  #[structopt(long, default_value = "3000")]
  timeout_ms: u64,
}

fn main() {
  let cli = CLI::from_args();

  let mut builder = env_logger::Builder::from_default_env();
  if cli.debug {
    builder.filter_level(log::LevelFilter::Debug);
  }
  builder.init();

  if let Err(e) = run(cli) {
    log::error!("node exiting: {}", e);
    process::exit(1);
  }
}

fn run(cli: CLI) -> Result<(), NodeError> {
  let shutdown = Arc::new(AtomicBool::new(false));
  for sig in &[signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
    signal_hook::flag::register(*sig, Arc::clone(&shutdown))
      .map_err(NodeError::Io)?;
  }

  let mut handler = Handler::new(
    cli.node_addr,
    cli.bootstrap,
    cli.ring_size,
    cli.fingers,
    Duration::from_millis(cli.timeout_ms),
  )?;

  handler.run(&shutdown)
}
