//! Deterministic synthetic destination-port fallback for sources that
//! cannot report a real port (spec.md §4.6, §9).
//!
//! Grounded in `examples/original_source/core/simple_agent.py`'s
//! `hashlib.md5`-based port simulation, but built on `sha2`/`hex` (already
//! in the teacher's dependency set) instead of adding an `md5` crate the
//! teacher never uses — the contract is only same-input/same-output, not a
//! specific hash family (spec.md §4.6: "the specific hash is an
//! implementation detail").

use std::collections::HashMap;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Connections spaced at least this many seconds apart look like C2
/// beaconing, so the port is kept stable; closer together looks like a
/// scan, so the port is varied.
const BEACON_LIKE_INTERVAL_SECS: f64 = 2.0;

struct PidDestState {
    connection_count: u32,
    last_timestamp: f64,
}

/// Tracks, per `(pid, dest_ip)`, whether recent connections look spaced
/// out (beacon-like) or rapid (scan-like), and derives a stable or varying
/// synthetic port accordingly.
#[derive(Default)]
pub struct SyntheticPortExtractor {
    state: Mutex<HashMap<(u32, String), PidDestState>>,
}

impl SyntheticPortExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synthetic_port(&self, pid: u32, dest_ip: &str, timestamp: f64) -> u16 {
        let mut state = self.state.lock();
        let key = (pid, dest_ip.to_string());
        let entry = state.entry(key).or_insert(PidDestState {
            connection_count: 0,
            last_timestamp: timestamp,
        });

        let port = if entry.connection_count < 2 {
            hash_to_port(&format!("{pid}_{dest_ip}"))
        } else {
            let interval = timestamp - entry.last_timestamp;
            if interval >= BEACON_LIKE_INTERVAL_SECS {
                hash_to_port(&format!("{pid}_{dest_ip}"))
            } else {
                hash_to_port(&format!("{pid}_{dest_ip}_{}", entry.connection_count))
            }
        };

        entry.connection_count += 1;
        entry.last_timestamp = timestamp;
        port
    }

    pub fn reset(&self, pid: u32) {
        self.state.lock().retain(|(p, _), _| *p != pid);
    }
}

fn hash_to_port(seed: &str) -> u16 {
    let digest = Sha256::digest(seed.as_bytes());
    let hex_prefix = hex::encode(&digest[..4]);
    let n = u32::from_str_radix(&hex_prefix, 16).unwrap_or(0);
    8000 + (n % 200) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_map_to_same_port() {
        assert_eq!(hash_to_port("1000_10.0.0.5"), hash_to_port("1000_10.0.0.5"));
    }

    #[test]
    fn port_is_in_the_8000_to_8199_range() {
        let port = hash_to_port("anything");
        assert!((8000..8200).contains(&port));
    }

    #[test]
    fn spaced_connections_reuse_the_same_port() {
        let extractor = SyntheticPortExtractor::new();
        let p1 = extractor.synthetic_port(1000, "10.0.0.5", 0.0);
        let p2 = extractor.synthetic_port(1000, "10.0.0.5", 5.0);
        let p3 = extractor.synthetic_port(1000, "10.0.0.5", 11.0);
        assert_eq!(p1, p2);
        assert_eq!(p2, p3);
    }

    #[test]
    fn rapid_connections_vary_the_port() {
        let extractor = SyntheticPortExtractor::new();
        extractor.synthetic_port(2000, "10.0.0.9", 0.0);
        extractor.synthetic_port(2000, "10.0.0.9", 0.1);
        let p3 = extractor.synthetic_port(2000, "10.0.0.9", 0.2);
        let p4 = extractor.synthetic_port(2000, "10.0.0.9", 0.3);
        assert_ne!(p3, p4);
    }
}
