// File: hash.rs
//
// The purpose of this file is to hash a given key with SHA-1 and to decide,
// in a ring of a given size, whether one identifier lies on a clockwise arc
// between two others.

use sha1::{Digest, Sha1};
use std::cmp::Ordering;

/// Returns a hash for a given key, reduced into `[0, ring_size)`.
///
/// The full SHA-1 digest is computed and the last four bytes are folded
/// into a big-endian `u32` before reducing, so `ring_size` values larger
/// than 256 (unlike a single-byte reduction) still spread across the ring.
///
/// # Arguments
///
/// * `key` - The key to be hashed
/// * `ring_size` - The size of the identifier ring (`M`)
pub fn hash(key: &str, ring_size: u32) -> u32 {
  let mut hasher = Sha1::new();
  hasher.input(key.as_bytes());
  let result = hasher.result();
  let tail = &result[result.len() - 4..];
  let folded = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
  folded % ring_size
}

/// Returns true iff `x` lies strictly after `self_id` and at or before
/// `succ_id`, travelling clockwise around a ring of size `ring_size`.
///
/// This is the arc a node owns together with its successor: `(self_id,
/// succ_id]`. When `self_id == succ_id` (a solitary node, or a
/// single-member ring) the arc is the entire ring and this always returns
/// true.
///
/// # Arguments
///
/// * `self_id` - The lower, exclusive bound of the arc
/// * `succ_id` - The upper, inclusive bound of the arc
/// * `x` - The identifier being tested
/// * `ring_size` - The size of the identifier ring (`M`)
pub fn in_succ_arc(self_id: u32, succ_id: u32, x: u32, ring_size: u32) -> bool {
  in_arc(self_id, succ_id, x, ring_size, true)
}

/// Returns true iff `x` lies strictly after `pred_id` and strictly before
/// `self_id`, travelling clockwise around a ring of size `ring_size`.
///
/// This is the open arc `(pred_id, self_id)` used both to decide whether a
/// candidate predecessor is better than the one we have, and to find the
/// finger table entry that most closely precedes a target key.
///
/// # Arguments
///
/// * `self_id` - The upper, exclusive bound of the arc
/// * `pred_id` - The lower, exclusive bound of the arc
/// * `x` - The identifier being tested
/// * `ring_size` - The size of the identifier ring (`M`)
pub fn in_pred_arc(self_id: u32, pred_id: u32, x: u32, ring_size: u32) -> bool {
  in_arc(pred_id, self_id, x, ring_size, false)
}

/// Shared arc-membership test: is `x` in `(min, max]` (or `(min, max)` when
/// `incl` is false), travelling clockwise, wrapping when `min >= max`.
fn in_arc(min: u32, max: u32, x: u32, ring_size: u32, incl: bool) -> bool {
  debug_assert!(min < ring_size && max < ring_size && x < ring_size);
  match min.cmp(&max) {
    Ordering::Less => {
      if incl {
        x > min && x <= max
      } else {
        x > min && x < max
      }
    }
    Ordering::Greater => {
      if incl {
        x > min || x <= max
      } else {
        x > min || x < max
      }
    }
    Ordering::Equal => true,
  }
}
