//! Quasi-unique identifiers correlating a `CALL_TEST` request with the
//! `GET_RESULTS` request that fetches its outcome.
//!
//! Not a security token: the parts are guessable.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Counter breaking ties between ids generated in the same millisecond.
#[derive(Debug, Default)]
pub struct IdSequence {
    counter: Mutex<u64>,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        *counter = counter.wrapping_add(1);
        *counter
    }
}

#[derive(Clone, Debug)]
pub struct UniqueIdGenerator {
    sequence: Arc<IdSequence>,
    address: String,
}

impl Default for UniqueIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UniqueIdGenerator {
    pub fn new() -> Self {
        Self::with_sequence(Arc::new(IdSequence::new()))
    }

    /// Shares `sequence` with other generators; ids stay distinct across all
    /// of them.
    pub fn with_sequence(sequence: Arc<IdSequence>) -> Self {
        Self {
            sequence,
            address: to_hex(&local_address_octets()),
        }
    }

    pub fn generate<T: ?Sized>(&self, instance: &T, test_name: &str) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        self.generate_at(instance, test_name, now)
    }

    /// Concatenates, in hex: the local address, the timestamp adjusted by the
    /// sequence, the address of the test instance and a hash of the test name.
    pub fn generate_at<T: ?Sized>(&self, instance: &T, test_name: &str, timestamp_ms: u64) -> String {
        let time = timestamp_ms.wrapping_add(self.sequence.next());
        let identity = instance as *const T as *const () as usize;
        format!(
            "{}{:x}{:x}{:x}",
            self.address,
            time,
            identity,
            name_hash(test_name) as u32
        )
    }
}

fn name_hash(name: &str) -> i32 {
    name.chars()
        .fold(0i32, |hash, c| hash.wrapping_mul(31).wrapping_add(c as i32))
}

/// Address of the interface used for outbound traffic. Connecting a UDP
/// socket sends nothing; it only selects a route.
fn local_address_octets() -> Vec<u8> {
    let address = UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("192.0.2.1:9")?;
            socket.local_addr()
        })
        .map(|address| address.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    match address {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_same_millisecond_ids_differ() {
        let generator = UniqueIdGenerator::new();
        let instance = 42u8;
        let first = generator.generate_at(&instance, "testBar", 1_000);
        let second = generator.generate_at(&instance, "testBar", 1_000);
        assert_ne!(first, second);
    }

    #[test]
    fn test_concurrent_generation_is_unique() {
        let sequence = Arc::new(IdSequence::new());
        let ids = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let generator = UniqueIdGenerator::with_sequence(sequence.clone());
                    scope.spawn(move || {
                        let instance = ();
                        (0..200)
                            .map(|_| generator.generate_at(&instance, "testBar", 7))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect::<HashSet<_>>()
        });
        assert_eq!(ids.len(), 8 * 200);
    }

    #[test]
    fn test_id_is_hex() {
        let id = UniqueIdGenerator::new().generate(&"instance", "testBar");
        assert!(!id.is_empty());
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_name_hash_matches_string_hash_code() {
        assert_eq!(name_hash(""), 0);
        assert_eq!(name_hash("a"), 97);
        assert_eq!(name_hash("ab"), 97 * 31 + 98);
    }
}
