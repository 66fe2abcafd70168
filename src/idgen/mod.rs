//! The `idgen` module issues the unique 64-bit identifiers used for topics,
//! subscribers and published events.
//!
//! Identifiers are monotonically increasing within a process and carry a
//! reversible base-62 string form of exactly eleven characters, which is what
//! appears in URL paths and API payloads. Correctness elsewhere in the system
//! depends only on uniqueness.

use std::sync::Mutex;

use chrono::Utc;
use rand::Rng;
use tracing::info;

use crate::config::settings::IdGenSettings;
use crate::utils::Error;

/// Base-62 digits in the order used by the string encoding: `0-9`, then
/// lowercase, then uppercase.
pub(crate) const ALPHABET: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of the string form of an identifier.
const STRING_ID_LEN: usize = 11;

/// Bits below the millisecond timestamp, shared between sequence and node.
const SEQ_NODE_BITS: u8 = 22;

/// Generator of unique, monotonically increasing 64-bit identifiers.
///
/// An identifier packs the milliseconds elapsed since the configured epoch,
/// a per-millisecond sequence and a node identifier into a positive `i64`:
/// `elapsed_ms << 22 | sequence << node_bits | node`.
#[derive(Debug)]
pub struct IdGenerator {
    node: i64,
    node_bits: u8,
    epoch_ms: i64,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    last_ms: i64,
    seq: i64,
}

impl IdGenerator {
    /// Builds a generator from configuration. A configured node of zero means
    /// a random node in `[0, 256)` is chosen.
    pub fn new(cfg: &IdGenSettings) -> Result<Self, Error> {
        if cfg.node_bits == 0 || cfg.node_bits > 16 {
            return Err(Error::new(
                500,
                format!("idgen node bits must be between 1 and 16 (got: {})", cfg.node_bits),
            ));
        }

        let mut node = cfg.node;
        if node == 0 {
            node = rand::thread_rng().gen_range(0..256);
            info!(node, "idgen node id is set randomly");
        }
        if u32::from(node) >= 1u32 << cfg.node_bits {
            return Err(Error::new(
                500,
                format!(
                    "idgen node {} does not fit into {} node bits",
                    node, cfg.node_bits
                ),
            ));
        }

        Ok(Self {
            node: i64::from(node),
            node_bits: cfg.node_bits,
            epoch_ms: cfg.epoch_time_in_seconds * 1_000,
            state: Mutex::new(State { last_ms: 0, seq: 0 }),
        })
    }

    /// Returns the next identifier. Ids are strictly increasing: calls within
    /// the same millisecond advance the sequence, sequence exhaustion spins to
    /// the next millisecond, and a clock running backwards reuses the last
    /// observed millisecond.
    pub fn next(&self) -> i64 {
        let max_seq = 1i64 << (SEQ_NODE_BITS - self.node_bits);
        let mut state = self.state.lock().unwrap();

        let mut now = self.elapsed_ms();
        if now < state.last_ms {
            now = state.last_ms;
        }

        if now == state.last_ms {
            state.seq += 1;
            if state.seq >= max_seq {
                while now <= state.last_ms {
                    std::hint::spin_loop();
                    now = self.elapsed_ms();
                }
                state.last_ms = now;
                state.seq = 0;
            }
        } else {
            state.last_ms = now;
            state.seq = 0;
        }

        (state.last_ms << SEQ_NODE_BITS) | (state.seq << self.node_bits) | self.node
    }

    /// Returns the next identifier in its 11-character base-62 string form.
    pub fn next_string(&self) -> String {
        encode_string_id(self.next())
    }

    fn elapsed_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.epoch_ms
    }
}

/// Reports whether `s` is a well-formed string identifier, i.e. matches
/// `^[0-9a-zA-Z]{11}$`.
pub fn valid_string_id(s: &str) -> bool {
    s.len() == STRING_ID_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Encodes an identifier into its 11-character base-62 form, zero-padded on
/// the left.
pub fn encode_string_id(id: i64) -> String {
    let mut buf = [ALPHABET[0]; STRING_ID_LEN];
    let mut n = id as u64;
    let mut i = STRING_ID_LEN;
    while n > 0 && i > 0 {
        i -= 1;
        buf[i] = ALPHABET[(n % 62) as usize];
        n /= 62;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Decodes an 11-character base-62 identifier back into its integer form.
/// Anything that is not a well-formed string identifier, or that overflows a
/// 64-bit integer, decodes to `-1`.
pub fn decode_string_id(s: &str) -> i64 {
    if !valid_string_id(s) {
        return -1;
    }
    let mut n: i64 = 0;
    for b in s.bytes() {
        let digit = match b {
            b'0'..=b'9' => i64::from(b - b'0'),
            b'a'..=b'z' => i64::from(b - b'a') + 10,
            _ => i64::from(b - b'A') + 36,
        };
        n = match n.checked_mul(62).and_then(|v| v.checked_add(digit)) {
            Some(v) => v,
            None => return -1,
        };
    }
    n
}

#[cfg(test)]
mod tests;
