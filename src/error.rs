// File: error.rs
//
// The purpose of this file is to define the small closed set of ways a
// node's socket setup or I/O can fail.

use std::io;
use thiserror::Error;

/// Errors that can escape a `Handler`. Transport timeouts and malformed
/// datagrams are not represented here, since they are normal operation (a
/// timeout is the stabilization tick) or are logged and dropped at the
/// decode call site, never escalated.
#[derive(Error, Debug)]
pub enum NodeError {
  #[error("failed to bind UDP socket: {0}")]
  Bind(#[source] io::Error),

  #[error("I/O failure on node socket: {0}")]
  Io(#[source] io::Error),
}
