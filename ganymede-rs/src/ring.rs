//! Provides a consistent hash ring which maps keys onto peers.
//!
//! Each real peer is placed onto the ring several times (as **virtual points**). A key is owned
//! by the first point which is equal to or larger than the hash of the key, wrapping around at
//! the end of the ring. Adding more points per peer smooths the otherwise uneven partition
//! sizes a single point per peer yields, therefore the number of replicas is the knob to tune
//! the uniformity of the load distribution.
//!
//! The ring is built once when the peer set is configured and is read-only afterwards. There is
//! no operation to remove a single peer, a changed peer set requires a new ring.
//!
//! # Example
//! ```
//! # use ganymede::ring::HashRing;
//! let mut ring = HashRing::new(50);
//! assert_eq!(ring.get("Tom"), None);
//!
//! ring.add(&["http://localhost:8001", "http://localhost:8002"]);
//! let owner = ring.get("Tom").unwrap();
//!
//! // The ownership is stable as long as the ring is unchanged...
//! assert_eq!(ring.get("Tom").unwrap(), owner);
//! ```
use crc::{Crc, CRC_32_ISO_HDLC};
use fnv::FnvHashMap;

/// Computes the position of a key or a virtual point on the ring.
pub type HashFn = Box<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// The CRC-32 as used by Ethernet, zlib and PNG (also known as CRC-32/IEEE).
const CRC32_IEEE: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Computes the default ring position of the given data.
pub fn crc32_ieee(data: &[u8]) -> u32 {
    CRC32_IEEE.checksum(data)
}

/// Represents the ring of virtual points along with the owner of each point.
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    points: Vec<u32>,
    owners: FnvHashMap<u32, String>,
}

impl HashRing {
    /// Creates an empty ring which places **replicas** virtual points per peer and uses
    /// CRC-32/IEEE as hash function.
    pub fn new(replicas: usize) -> Self {
        HashRing::with_hash(replicas, Box::new(crc32_ieee))
    }

    /// Creates an empty ring using a custom hash function.
    ///
    /// This is mostly used in tests to obtain predictable positions.
    pub fn with_hash(replicas: usize, hash: HashFn) -> Self {
        HashRing {
            hash,
            replicas,
            points: Vec::new(),
            owners: FnvHashMap::default(),
        }
    }

    /// Places **replicas** virtual points for each of the given peers onto the ring.
    ///
    /// The name of the i-th point of a peer is the decimal index followed by the peer itself
    /// (e.g. "3http://localhost:8001"). Calling this again appends more points but leaves
    /// the existing ones untouched.
    pub fn add<S: AsRef<str>>(&mut self, peers: &[S]) {
        for peer in peers {
            let peer = peer.as_ref();
            for replica in 0..self.replicas {
                let point = (self.hash)(format!("{}{}", replica, peer).as_bytes());
                self.points.push(point);
                let _ = self.owners.insert(point, peer.to_owned());
            }
        }

        self.points.sort_unstable();
    }

    /// Returns the peer owning the given key or **None** if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let index = self.points.partition_point(|point| *point < hash);
        let point = self.points[index % self.points.len()];

        self.owners.get(&point).map(|peer| peer.as_str())
    }

    /// Determines if no peer has been placed on the ring yet.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the number of distinct virtual points on the ring.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns the number of virtual points placed per peer.
    pub fn replicas(&self) -> usize {
        self.replicas
    }
}

#[cfg(test)]
mod tests {
    use crate::ring::{crc32_ieee, HashRing};

    /// Uses the numeric value of the data itself as hash, so that positions are predictable.
    fn numeric_ring() -> HashRing {
        HashRing::with_hash(
            3,
            Box::new(|data: &[u8]| {
                String::from_utf8_lossy(data)
                    .parse::<u32>()
                    .unwrap_or_default()
            }),
        )
    }

    #[test]
    fn keys_are_mapped_to_the_next_point_clockwise() {
        let mut ring = numeric_ring();

        // This yields the points 2, 4, 6, 12, 14, 16, 22, 24, 26...
        ring.add(&["6", "4", "2"]);

        assert_eq!(ring.get("2"), Some("2"));
        assert_eq!(ring.get("11"), Some("2"));
        assert_eq!(ring.get("23"), Some("4"));
        // ..and everything beyond the last point wraps around to the first one.
        assert_eq!(ring.get("27"), Some("2"));

        // Adding "8" places 8, 18 and 28 onto the ring, so "27" now belongs to it...
        ring.add(&["8"]);
        assert_eq!(ring.get("27"), Some("8"));
        assert_eq!(ring.get("11"), Some("2"));
    }

    #[test]
    fn empty_ring_yields_no_peer() {
        let ring = HashRing::new(50);
        assert!(ring.is_empty());
        assert_eq!(ring.get("Tom"), None);
    }

    #[test]
    fn lookups_are_deterministic_and_cover_registered_peers_only() {
        let peers = [
            "http://localhost:8001",
            "http://localhost:8002",
            "http://localhost:8003",
        ];
        let mut ring = HashRing::new(50);
        ring.add(&peers);
        assert_eq!(ring.replicas(), 50);
        assert!(ring.len() <= 150);

        for i in 0..1000 {
            let key = format!("key-{}", i);
            let owner = ring.get(&key).unwrap();
            assert!(peers.contains(&owner));
            assert_eq!(ring.get(&key), Some(owner));
        }
    }

    #[test]
    fn virtual_points_spread_the_load() {
        let peers = ["A", "B", "C"];
        let mut ring = HashRing::new(50);
        ring.add(&peers);

        let mut counts = [0; 3];
        for i in 0..3000 {
            let owner = ring.get(&format!("key-{}", i)).unwrap();
            let index = peers.iter().position(|peer| *peer == owner).unwrap();
            counts[index] += 1;
        }

        // Every peer owns a noticeable share of the keys...
        assert!(counts.iter().all(|count| *count > 300));
    }

    #[test]
    fn default_hash_is_crc32_ieee() {
        // The well known check value of CRC-32/IEEE...
        assert_eq!(crc32_ieee(b"123456789"), 0xCBF43926);
    }
}
