// File: msg.rs
//
// The purpose of this file is to define the closed set of messages nodes
// and clients exchange over the wire, and to encode/decode them.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// The closed set of datagrams a node can send or receive. Tagged on the
/// wire as `{"method": "<TAG>", "args": {...}}`, so a peer that only knows
/// how to decode this enum can never observe a method outside this set;
/// unrecognized bytes are a decode error, not a "default" variant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "method", content = "args")]
pub enum Message {
  /// A request to join the ring, sent by the joining node to a bootstrap
  /// peer (or forwarded peer-to-peer until it reaches the node that
  /// should accept it).
  #[serde(rename = "JOIN_REQ")]
  JoinReq { addr: SocketAddr, id: u32 },

  /// The reply to a `JOIN_REQ`, handing the joining node its new
  /// successor.
  #[serde(rename = "JOIN_REP")]
  JoinRep {
    successor_id: u32,
    successor_addr: SocketAddr,
  },

  /// A node telling its (possibly new) successor that it believes it is
  /// that successor's predecessor.
  #[serde(rename = "NOTIFY")]
  Notify {
    predecessor_id: u32,
    predecessor_addr: SocketAddr,
  },

  /// A probe asking the receiver to report its predecessor. Carries no
  /// payload; also doubles as the idle-tick message a node sends itself to
  /// its successor.
  #[serde(rename = "PREDECESSOR")]
  Predecessor,

  /// The reply to `PREDECESSOR`. `predecessor_id` is `None` if the
  /// responder has no predecessor yet. Carries only an id, not an address;
  /// the candidate's address is taken from the datagram's UDP source
  /// address by the receiver (see `handler::Handler::handle_stabilize`).
  #[serde(rename = "STABILIZE")]
  Stabilize { predecessor_id: Option<u32> },

  /// Store `key` -> `value`; replies are sent to `client_addr`, not back
  /// along the forwarding path.
  #[serde(rename = "PUT")]
  Put {
    key: String,
    value: String,
    client_addr: SocketAddr,
  },

  /// Retrieve the value for `key`; replies are sent to `client_addr`, not
  /// back along the forwarding path.
  #[serde(rename = "GET")]
  Get { key: String, client_addr: SocketAddr },

  /// A successful reply. `value` is `Some` for a `GET` hit, `None` for a
  /// successful `PUT`.
  #[serde(rename = "ACK")]
  Ack { value: Option<String> },

  /// A negative reply: routing dead-end, or "key not found" on a `GET`.
  #[serde(rename = "NACK")]
  Nack,
}

/// The minimum receive buffer size the spec requires (1024 bytes of
/// payload); the handler actually allocates a larger buffer for headroom.
pub const MIN_DATAGRAM_BYTES: usize = 1024;

/// Encode a message as the bytes to put on the wire.
pub fn encode(msg: &Message) -> Result<Vec<u8>, serde_json::Error> {
  serde_json::to_vec(msg)
}

/// Decode a message received from the wire.
pub fn decode(bytes: &[u8]) -> Result<Message, serde_json::Error> {
  serde_json::from_slice(bytes)
}
