// File: node.rs
//
// The purpose of this file is to hold a node's ring state (identity,
// successor/predecessor, keystore, and finger-table variant routing
// table) and the pure decision logic that mutates it. Nothing in this
// file touches the network; `handler.rs` turns these decisions into
// datagrams.

use crate::hash;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

/// A peer's ring identifier paired with its network address. Peers are
/// referenced by value everywhere in this crate, never by an owning
/// handle into another node's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
  pub id: u32,
  pub addr: SocketAddr,
}

impl Peer {
  /// Returns a new Peer
  ///
  /// # Arguments
  ///
  /// * `id` - the peer's ring identifier
  /// * `addr` - the peer's network address
  pub fn new(id: u32, addr: SocketAddr) -> Peer {
    Peer { id, addr }
  }
}

/// Outcome of handling an inbound `JOIN_REQ`.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
  /// Accept the joining peer as our new successor; reply `JOIN_REP` to it
  /// handing it `reply_successor` as its own new successor.
  Accepted { reply_successor: Peer },
  /// The joining peer does not belong here; forward the original
  /// `JOIN_REQ` unchanged to `next`.
  Forward { next: Peer },
}

/// Outcome of routing a key hash for `PUT`/`GET`.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
  /// This node owns the key; perform the operation locally.
  Local,
  /// Forward the request, unchanged, to this peer.
  Forward(Peer),
  /// No valid next hop; reply `NACK`.
  NoRoute,
}

/// A node's complete ring state.
///
/// * `id`            - this node's ring identifier, derived from `addr`
/// * `addr`          - this node's own network address
/// * `successor`     - `None` only before the join handshake completes
/// * `predecessor`   - `None` until some peer notifies us
/// * `inside_dht`    - whether the join handshake has completed
/// * `keystore`      - local key/value storage for keys this node owns
/// * `finger_table`  - `Some` (ordered map) in the finger-table variant,
///                     `None` in the baseline variant
/// * `ring_size`     - the `M` parameter of the identifier ring
pub struct Node {
  pub id: u32,
  pub addr: SocketAddr,
  pub successor: Option<Peer>,
  pub predecessor: Option<Peer>,
  pub inside_dht: bool,
  pub keystore: HashMap<String, String>,
  pub finger_table: Option<BTreeMap<u32, SocketAddr>>,
  pub ring_size: u32,
}

impl Node {
  /// Returns a new Node object.
  ///
  /// If `bootstrap` is `None`, the node starts as the sole member of a new
  /// ring: its own successor, no predecessor, already `inside_dht`.
  /// Otherwise it starts outside the ring, waiting for the join handshake
  /// (`accept_join_reply`) to complete.
  ///
  /// # Arguments
  ///
  /// * `addr` - this node's own bind address
  /// * `bootstrap` - `Some(peer_addr)` to join through, `None` to found a
  ///   new ring
  /// * `ring_size` - the `M` parameter of the identifier ring
  /// * `with_fingers` - whether to maintain a finger table (finger-table
  ///   variant) instead of routing purely hop-by-hop (baseline variant)
  pub fn new(
    addr: SocketAddr,
    bootstrap: Option<SocketAddr>,
    ring_size: u32,
    with_fingers: bool,
  ) -> Node {
    let id = hash::hash(&addr.to_string(), ring_size);
    let solitary = bootstrap.is_none();
    let successor = if solitary {
      Some(Peer::new(id, addr))
    } else {
      None
    };
    let mut finger_table = if with_fingers {
      Some(BTreeMap::new())
    } else {
      None
    };
    if let (Some(ft), Some(succ)) = (finger_table.as_mut(), successor.as_ref()) {
      ft.insert(succ.id, succ.addr);
    }
    Node {
      id,
      addr,
      successor,
      predecessor: None,
      inside_dht: solitary,
      keystore: HashMap::new(),
      finger_table,
      ring_size,
    }
  }

  /// Completes the join handshake once a `JOIN_REP` arrives (§4.2).
  pub fn accept_join_reply(&mut self, successor: Peer) {
    self.set_successor(successor);
    self.inside_dht = true;
  }

  /// Handles an inbound `JOIN_REQ` from `joiner` (§4.3).
  ///
  /// # Arguments
  ///
  /// * `joiner` - the id and address of the node requesting to join
  pub fn node_join(&mut self, joiner: Peer) -> JoinOutcome {
    let successor = self
      .successor
      .expect("node_join requires an established successor");
    if self.id == successor.id {
      // Solitary node: adopt joiner, hand it our old (solitary) state.
      let old_successor = successor;
      self.set_successor(joiner);
      JoinOutcome::Accepted {
        reply_successor: old_successor,
      }
    } else if hash::in_succ_arc(self.id, successor.id, joiner.id, self.ring_size) {
      let old_successor = successor;
      self.set_successor(joiner);
      JoinOutcome::Accepted {
        reply_successor: old_successor,
      }
    } else {
      JoinOutcome::Forward { next: successor }
    }
  }

  /// Handles an inbound `NOTIFY` (§4.4). A no-op if `candidate` is not a
  /// better predecessor than the one we already have (this is what makes
  /// repeated delivery of the same `NOTIFY` idempotent).
  ///
  /// # Arguments
  ///
  /// * `candidate` - the peer claiming to be our predecessor
  pub fn notify(&mut self, candidate: Peer) {
    let accept = match self.predecessor {
      None => true,
      Some(pred) => hash::in_pred_arc(self.id, pred.id, candidate.id, self.ring_size),
    };
    if accept {
      self.predecessor = Some(candidate);
    }
  }

  /// Handles an inbound `STABILIZE` reply (§4.4).
  ///
  /// Returns the (possibly updated) successor, which the caller then
  /// `NOTIFY`s.
  ///
  /// # Arguments
  ///
  /// * `candidate_id` - the responder's reported predecessor id, if any
  /// * `candidate_addr` - the UDP source address the datagram arrived
  ///   from; the wire message carries only an id, no address of its own
  pub fn stabilize(&mut self, candidate_id: Option<u32>, candidate_addr: SocketAddr) -> Peer {
    let successor = self
      .successor
      .expect("stabilize requires an established successor");
    if let Some(x) = candidate_id {
      if hash::in_succ_arc(self.id, successor.id, x, self.ring_size) {
        self.set_successor(Peer::new(x, candidate_addr));
      }
    }
    self
      .successor
      .expect("successor is always Some after stabilize")
  }

  /// Routes a key hash in the baseline variant (§4.5).
  ///
  /// # Arguments
  ///
  /// * `key_hash` - the hashed key being routed
  pub fn route(&self, key_hash: u32) -> Route {
    let successor = match self.successor {
      Some(s) => s,
      None => return Route::NoRoute,
    };
    if hash::in_succ_arc(self.id, successor.id, key_hash, self.ring_size) {
      Route::Local
    } else if successor.id < key_hash {
      Route::Forward(successor)
    } else if key_hash <= self.id {
      match self.predecessor {
        Some(p) => Route::Forward(p),
        None => Route::NoRoute,
      }
    } else {
      Route::NoRoute
    }
  }

  /// Routes a key hash in the finger-table variant (§4.6).
  ///
  /// # Arguments
  ///
  /// * `key_hash` - the hashed key being routed
  pub fn finger_route(&self, key_hash: u32) -> Route {
    let successor = match self.successor {
      Some(s) => s,
      None => return Route::NoRoute,
    };
    if hash::in_succ_arc(self.id, successor.id, key_hash, self.ring_size) {
      return Route::Local;
    }
    let fingers = match &self.finger_table {
      Some(f) => f,
      None => return Route::NoRoute,
    };
    for (&finger_id, &finger_addr) in fingers.iter().rev() {
      if hash::in_pred_arc(key_hash, self.id, finger_id, self.ring_size) {
        return Route::Forward(Peer::new(finger_id, finger_addr));
      }
    }
    Route::NoRoute
  }

  /// Stores `key` -> `value` locally (§4.7). Assumes the caller has
  /// already established, via `route`/`finger_route`, that this node owns
  /// the key.
  pub fn put_local(&mut self, key: String, value: String) {
    self.keystore.insert(key, value);
  }

  /// Looks up `key` locally (§4.7).
  pub fn get_local(&self, key: &str) -> Option<&String> {
    self.keystore.get(key)
  }

  /// Updates the successor pointer and, in the finger-table variant,
  /// opportunistically records it as a finger (§4.6).
  fn set_successor(&mut self, successor: Peer) {
    self.successor = Some(successor);
    if let Some(fingers) = self.finger_table.as_mut() {
      fingers.insert(successor.id, successor.addr);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().unwrap()
  }

  #[test]
  fn solitary_node_is_its_own_successor() {
    let node = Node::new(addr(5000), None, 1024, false);
    assert!(node.inside_dht);
    assert_eq!(node.successor.unwrap().id, node.id);
    assert!(node.predecessor.is_none());
  }

  #[test]
  fn joining_node_starts_outside_the_ring() {
    let node = Node::new(addr(5001), Some(addr(5000)), 1024, false);
    assert!(!node.inside_dht);
    assert!(node.successor.is_none());
  }

  #[test]
  fn solitary_node_accepts_any_joiner() {
    let mut node = Node::new(addr(5000), None, 1024, false);
    let joiner = Peer::new((node.id + 1) % 1024, addr(5001));
    match node.node_join(joiner) {
      JoinOutcome::Accepted { reply_successor } => assert_eq!(reply_successor.id, node.id),
      JoinOutcome::Forward { .. } => panic!("solitary node must accept"),
    }
    assert_eq!(node.successor.unwrap(), joiner);
  }

  #[test]
  fn join_forwards_when_joiner_belongs_elsewhere() {
    // self=10, successor=20: a joiner at id 15 belongs here (case 2).
    let mut node = Node::new(addr(5000), None, 1024, false);
    node.id = 10;
    node.successor = Some(Peer::new(20, addr(5001)));
    let joiner = Peer::new(15, addr(5002));
    match node.node_join(joiner) {
      JoinOutcome::Accepted { reply_successor } => assert_eq!(reply_successor.id, 20),
      JoinOutcome::Forward { .. } => panic!("joiner at 15 belongs between 10 and 20"),
    }
    assert_eq!(node.successor.unwrap(), joiner);

    // A joiner at id 25 (past our successor) must be forwarded on.
    let mut node = Node::new(addr(5000), None, 1024, false);
    node.id = 10;
    node.successor = Some(Peer::new(20, addr(5001)));
    let far_joiner = Peer::new(25, addr(5003));
    match node.node_join(far_joiner) {
      JoinOutcome::Forward { next } => assert_eq!(next.id, 20),
      JoinOutcome::Accepted { .. } => panic!("joiner at 25 is past our successor"),
    }
    assert_eq!(node.successor.unwrap().id, 20, "forwarding must not mutate state");
  }

  #[test]
  fn notify_is_idempotent() {
    let mut node = Node::new(addr(5000), None, 1024, false);
    let candidate = Peer::new((node.id + 500) % 1024, addr(5001));
    node.notify(candidate);
    assert_eq!(node.predecessor.unwrap(), candidate);
    // Delivering the same NOTIFY again changes nothing.
    node.notify(candidate);
    assert_eq!(node.predecessor.unwrap(), candidate);
  }

  #[test]
  fn notify_rejects_worse_predecessor() {
    let mut node = Node::new(addr(5000), None, 1024, false);
    node.id = 100;
    node.predecessor = Some(Peer::new(90, addr(5001)));
    // 50 is farther from us (clockwise) than 90 is, so it's a worse
    // predecessor and must be rejected.
    node.notify(Peer::new(50, addr(5002)));
    assert_eq!(node.predecessor.unwrap().id, 90);
    // 95 is strictly between 90 and 100: a better predecessor.
    node.notify(Peer::new(95, addr(5003)));
    assert_eq!(node.predecessor.unwrap().id, 95);
  }

  #[test]
  fn stabilize_adopts_better_successor_using_datagram_source_addr() {
    let mut node = Node::new(addr(5000), None, 1024, false);
    node.id = 10;
    node.successor = Some(Peer::new(30, addr(5001)));
    let sender_addr = addr(5002);
    let new_successor = node.stabilize(Some(20), sender_addr);
    assert_eq!(new_successor.id, 20);
    assert_eq!(new_successor.addr, sender_addr);
  }

  #[test]
  fn stabilize_keeps_successor_when_candidate_not_better() {
    let mut node = Node::new(addr(5000), None, 1024, false);
    node.id = 10;
    node.successor = Some(Peer::new(20, addr(5001)));
    // Candidate 5 is not in (10, 20], so it's not adopted.
    let successor = node.stabilize(Some(5), addr(5002));
    assert_eq!(successor.id, 20);
  }

  #[test]
  fn route_owns_locally_in_succ_arc() {
    let mut node = Node::new(addr(5000), None, 1024, false);
    node.id = 10;
    node.successor = Some(Peer::new(20, addr(5001)));
    assert_eq!(node.route(15), Route::Local);
  }

  #[test]
  fn route_forwards_to_successor_past_owned_arc() {
    let mut node = Node::new(addr(5000), None, 1024, false);
    node.id = 10;
    node.successor = Some(Peer::new(20, addr(5001)));
    match node.route(500) {
      Route::Forward(p) => assert_eq!(p.id, 20),
      other => panic!("expected forward to successor, got {:?}", other),
    }
  }

  #[test]
  fn route_forwards_to_predecessor_before_owned_arc() {
    let mut node = Node::new(addr(5000), None, 1024, false);
    node.id = 10;
    node.successor = Some(Peer::new(20, addr(5001)));
    node.predecessor = Some(Peer::new(3, addr(5002)));
    match node.route(5) {
      Route::Forward(p) => assert_eq!(p.id, 3),
      other => panic!("expected forward to predecessor, got {:?}", other),
    }
  }

  #[test]
  fn route_dead_ends_without_predecessor() {
    let mut node = Node::new(addr(5000), None, 1024, false);
    node.id = 10;
    node.successor = Some(Peer::new(20, addr(5001)));
    assert_eq!(node.route(5), Route::NoRoute);
  }

  #[test]
  fn finger_route_prefers_successor_arc_then_closest_preceding_finger() {
    let mut node = Node::new(addr(5000), None, 1024, true);
    node.id = 10;
    node.successor = Some(Peer::new(20, addr(5001)));
    let fingers = node.finger_table.as_mut().unwrap();
    fingers.clear();
    fingers.insert(20, addr(5001));
    fingers.insert(400, addr(5002));
    fingers.insert(800, addr(5003));

    // Key 15 is owned locally (within (10, 20]).
    assert_eq!(node.finger_route(15), Route::Local);

    // Key 900 should route to the closest preceding finger, 800.
    match node.finger_route(900) {
      Route::Forward(p) => assert_eq!(p.id, 800),
      other => panic!("expected forward to finger 800, got {:?}", other),
    }
  }

  #[test]
  fn finger_route_dead_ends_with_empty_finger_table() {
    let mut node = Node::new(addr(5000), None, 1024, true);
    node.id = 10;
    node.successor = Some(Peer::new(20, addr(5001)));
    node.finger_table.as_mut().unwrap().clear();
    assert_eq!(node.finger_route(500), Route::NoRoute);
  }

  #[test]
  fn put_then_get_round_trips() {
    let mut node = Node::new(addr(5000), None, 1024, false);
    node.put_local("alpha".to_string(), "1".to_string());
    assert_eq!(node.get_local("alpha"), Some(&"1".to_string()));
    assert_eq!(node.get_local("missing"), None);
  }
}
