// File: handler.rs
//
// The purpose of this file is to own the network endpoint and turn
// inbound datagrams into ring-state transitions (and ring-state
// transitions into outbound datagrams). `node.rs` decides; this file
// does the I/O.

use crate::error::NodeError;
use crate::hash;
use crate::msg::{self, Message};
use crate::node::{JoinOutcome, Node, Peer, Route};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Datagrams are read into a buffer comfortably above the 1024-byte
/// minimum the wire format requires.
const RECV_BUFFER_BYTES: usize = 4096;

/// Owns the node's UDP socket and ring state and drives the message loop.
pub struct Handler {
  socket: UdpSocket,
  node: Node,
  bootstrap: Option<SocketAddr>,
}

impl Handler {
  /// Returns a new Handler, bound and ready to run.
  ///
  /// If `addr`'s port is `0`, the OS assigns an ephemeral port; the node's
  /// identity is hashed from whatever address the socket actually binds
  /// to, not the address requested.
  ///
  /// # Arguments
  ///
  /// * `addr` - this node's bind address
  /// * `bootstrap` - optional peer address to join the ring through
  /// * `ring_size` - the `M` parameter of the identifier ring
  /// * `with_fingers` - whether to run the finger-table variant
  /// * `timeout` - the UDP read timeout, which doubles as the
  ///   stabilization tick period
  pub fn new(
    addr: SocketAddr,
    bootstrap: Option<SocketAddr>,
    ring_size: u32,
    with_fingers: bool,
    timeout: Duration,
  ) -> Result<Handler, NodeError> {
    let socket = UdpSocket::bind(addr).map_err(NodeError::Bind)?;
    socket
      .set_read_timeout(Some(timeout))
      .map_err(NodeError::Bind)?;
    let bound_addr = socket.local_addr().map_err(NodeError::Bind)?;
    let node = Node::new(bound_addr, bootstrap, ring_size, with_fingers);
    log::info!(
      "node {} bound at {} (ring_size={}, fingers={})",
      node.id,
      bound_addr,
      ring_size,
      with_fingers
    );
    Ok(Handler {
      socket,
      node,
      bootstrap,
    })
  }

  /// Runs the message loop until `shutdown` is set.
  ///
  /// While the node has not yet completed the join handshake (§4.2), each
  /// iteration retransmits `JOIN_REQ` and waits for `JOIN_REP`. Once
  /// inside the ring, each iteration dispatches one inbound datagram or,
  /// on a read timeout, fires the idle stabilization tick (§4.1).
  pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), NodeError> {
    while !shutdown.load(Ordering::SeqCst) {
      self.step()?;
    }
    log::info!("node {} shutting down", self.node.id);
    Ok(())
  }

  /// Advances the node by exactly one loop iteration. Exposed so tests can
  /// deterministically drive several nodes in lock-step without relying on
  /// background threads or wall-clock sleeps.
  pub fn step(&mut self) -> Result<(), NodeError> {
    if !self.node.inside_dht {
      self.join_tick()
    } else {
      match self.recv_once()? {
        Some((msg, from)) => self.dispatch(msg, from),
        None => self.on_idle_tick(),
      }
    }
  }

  /// One iteration of the join procedure (§4.2): (re)send `JOIN_REQ` to
  /// the bootstrap peer, then wait up to the read timeout for a reply.
  fn join_tick(&mut self) -> Result<(), NodeError> {
    let bootstrap = self
      .bootstrap
      .expect("join_tick is only reached while inside_dht is false, which requires a bootstrap");
    self.send(
      bootstrap,
      &Message::JoinReq {
        addr: self.node.addr,
        id: self.node.id,
      },
    )?;
    match self.recv_once()? {
      Some((
        Message::JoinRep {
          successor_id,
          successor_addr,
        },
        _from,
      )) => {
        self
          .node
          .accept_join_reply(Peer::new(successor_id, successor_addr));
        log::info!(
          "node {} joined ring via {}; successor={}",
          self.node.id,
          bootstrap,
          successor_id
        );
      }
      Some((other, from)) => {
        log::debug!("ignoring {:?} from {} while joining", other, from);
      }
      None => {} // timeout; the next join_tick retransmits JOIN_REQ
    }
    Ok(())
  }

  /// Receives and decodes one datagram, if one arrives before the read
  /// timeout elapses. Malformed datagrams are logged and dropped, never
  /// propagated as an error (§7).
  fn recv_once(&mut self) -> Result<Option<(Message, SocketAddr)>, NodeError> {
    let mut buf = [0u8; RECV_BUFFER_BYTES];
    match self.socket.recv_from(&mut buf) {
      Ok((len, from)) => match msg::decode(&buf[..len]) {
        Ok(message) => Ok(Some((message, from))),
        Err(e) => {
          log::warn!("dropping malformed datagram from {}: {}", from, e);
          Ok(None)
        }
      },
      Err(e) if is_timeout(&e) => Ok(None),
      Err(e) => Err(NodeError::Io(e)),
    }
  }

  fn send(&self, to: SocketAddr, msg: &Message) -> Result<(), NodeError> {
    let bytes = msg::encode(msg).expect("Message only holds wire-safe types; encoding cannot fail");
    self.socket.send_to(&bytes, to).map_err(NodeError::Io)?;
    Ok(())
  }

  /// The idle-tick action that drives stabilization: probe our successor
  /// for its predecessor (§4.4).
  fn on_idle_tick(&mut self) -> Result<(), NodeError> {
    if let Some(successor) = self.node.successor {
      self.send(successor.addr, &Message::Predecessor)?;
    }
    Ok(())
  }

  fn dispatch(&mut self, msg: Message, from: SocketAddr) -> Result<(), NodeError> {
    log::debug!("node {} <- {:?} from {}", self.node.id, msg, from);
    match msg {
      Message::JoinReq { addr, id } => self.handle_join_req(Peer::new(id, addr)),
      Message::JoinRep { .. } => {
        log::debug!(
          "node {} ignoring stray JOIN_REP after join completed",
          self.node.id
        );
        Ok(())
      }
      Message::Notify {
        predecessor_id,
        predecessor_addr,
      } => {
        self
          .node
          .notify(Peer::new(predecessor_id, predecessor_addr));
        Ok(())
      }
      Message::Predecessor => {
        let predecessor_id = self.node.predecessor.map(|p| p.id);
        self.send(from, &Message::Stabilize { predecessor_id })
      }
      Message::Stabilize { predecessor_id } => self.handle_stabilize(predecessor_id, from),
      Message::Put {
        key,
        value,
        client_addr,
      } => self.handle_put(key, value, client_addr),
      Message::Get { key, client_addr } => self.handle_get(key, client_addr),
      Message::Ack { .. } | Message::Nack => {
        log::debug!(
          "node {} received a client-facing reply meant for someone else",
          self.node.id
        );
        Ok(())
      }
    }
  }

  /// Handles an inbound `JOIN_REQ` (§4.3).
  fn handle_join_req(&mut self, joiner: Peer) -> Result<(), NodeError> {
    match self.node.node_join(joiner) {
      JoinOutcome::Accepted { reply_successor } => {
        log::info!(
          "node {} accepted {} as successor",
          self.node.id,
          joiner.id
        );
        self.send(
          joiner.addr,
          &Message::JoinRep {
            successor_id: reply_successor.id,
            successor_addr: reply_successor.addr,
          },
        )
      }
      JoinOutcome::Forward { next } => {
        log::debug!(
          "node {} forwarding JOIN_REQ({}) to {}",
          self.node.id,
          joiner.id,
          next.id
        );
        self.send(
          next.addr,
          &Message::JoinReq {
            addr: joiner.addr,
            id: joiner.id,
          },
        )
      }
    }
  }

  /// Handles an inbound `STABILIZE` reply (§4.4): possibly adopt a better
  /// successor, then always notify the (possibly new) successor.
  fn handle_stabilize(
    &mut self,
    predecessor_id: Option<u32>,
    from: SocketAddr,
  ) -> Result<(), NodeError> {
    let successor = self.node.stabilize(predecessor_id, from);
    self.send(
      successor.addr,
      &Message::Notify {
        predecessor_id: self.node.id,
        predecessor_addr: self.node.addr,
      },
    )
  }

  /// Handles an inbound `PUT`, local or forwarded (§4.5, §4.6, §4.7).
  fn handle_put(
    &mut self,
    key: String,
    value: String,
    client_addr: SocketAddr,
  ) -> Result<(), NodeError> {
    let key_hash = hash::hash(&key, self.node.ring_size);
    match self.route(key_hash) {
      Route::Local => {
        self.node.put_local(key, value);
        self.send(client_addr, &Message::Ack { value: None })
      }
      Route::Forward(peer) => self.send(
        peer.addr,
        &Message::Put {
          key,
          value,
          client_addr,
        },
      ),
      Route::NoRoute => self.send(client_addr, &Message::Nack),
    }
  }

  /// Handles an inbound `GET`, local or forwarded (§4.5, §4.6, §4.7).
  fn handle_get(&mut self, key: String, client_addr: SocketAddr) -> Result<(), NodeError> {
    let key_hash = hash::hash(&key, self.node.ring_size);
    match self.route(key_hash) {
      Route::Local => match self.node.get_local(&key) {
        Some(value) => {
          let value = value.clone();
          self.send(client_addr, &Message::Ack { value: Some(value) })
        }
        None => self.send(client_addr, &Message::Nack),
      },
      Route::Forward(peer) => self.send(peer.addr, &Message::Get { key, client_addr }),
      Route::NoRoute => self.send(client_addr, &Message::Nack),
    }
  }

  /// Dispatches to the baseline or finger-table routing rule, whichever
  /// this node was constructed to run.
  fn route(&self, key_hash: u32) -> Route {
    if self.node.finger_table.is_some() {
      self.node.finger_route(key_hash)
    } else {
      self.node.route(key_hash)
    }
  }
}

fn is_timeout(e: &io::Error) -> bool {
  matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
