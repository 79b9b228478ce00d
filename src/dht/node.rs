use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use rand::Rng as _;

use super::error::DhtError;

/// Length of the compact node representation: 20-byte ID, 4-byte IPv4
/// address, 2-byte big-endian port.
pub(crate) const COMPACT_NODE_LEN: usize = 26;

/// A node unheard from for longer than this is questionable and gets
/// pinged by maintenance.
const QUESTIONABLE_AFTER: Duration = Duration::from_secs(5 * 60);

/// A 160-bit DHT node identifier.
///
/// The wire form is 20 raw bytes; the textual form is 40 lowercase hex
/// characters. Distance between identifiers is the XOR metric of BEP-5.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; 20]);

impl NodeId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        rand::rng().fill(&mut id);
        Self(id)
    }

    /// Builds an identifier from exactly 20 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DhtError> {
        if bytes.len() != 20 {
            return Err(DhtError::InvalidNodeId);
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(bytes);
        Ok(Self(id))
    }

    /// Parses an identifier from its 40-hex-character textual form.
    pub fn from_hex(hex: &str) -> Result<Self, DhtError> {
        if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DhtError::InvalidNodeId);
        }

        let mut id = [0u8; 20];
        for (i, byte) in id.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| DhtError::InvalidNodeId)?;
        }
        Ok(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// XOR distance to another identifier, as a big-endian 160-bit value.
    pub fn distance(&self, other: &NodeId) -> [u8; 20] {
        let mut dist = [0u8; 20];
        for (i, d) in dist.iter_mut().enumerate() {
            *d = self.0[i] ^ other.0[i];
        }
        dist
    }

    /// The i-th bit of the identifier, most significant first.
    pub(crate) fn bit(&self, index: usize) -> bool {
        (self.0[index / 8] >> (7 - index % 8)) & 1 == 1
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// A known remote DHT node.
///
/// Two nodes are equal iff their IDs are equal; the address and last-seen
/// time are observational metadata.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub addr: SocketAddrV4,
    pub last_seen: Instant,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Node {
    pub fn new(id: NodeId, addr: SocketAddrV4) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Marks the node as just heard from.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Whether the node looks like a real, reachable contact. Nodes
    /// advertising port 0 or the unspecified address are dropped and their
    /// sender blocked.
    pub fn is_valid(&self) -> bool {
        self.addr.port() != 0 && *self.addr.ip() != Ipv4Addr::UNSPECIFIED
    }

    /// Whether the node has been silent long enough to warrant a ping.
    pub fn is_questionable(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > QUESTIONABLE_AFTER
    }

    /// Parses one 26-byte compact node entry.
    pub fn from_compact(data: &[u8]) -> Option<Self> {
        if data.len() != COMPACT_NODE_LEN {
            return None;
        }

        let id = NodeId::from_bytes(&data[..20]).ok()?;
        let ip = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let port = u16::from_be_bytes([data[24], data[25]]);

        Some(Self::new(id, SocketAddrV4::new(ip, port)))
    }

    /// Encodes the node as its 26-byte compact entry.
    pub fn to_compact(&self) -> [u8; COMPACT_NODE_LEN] {
        let mut compact = [0u8; COMPACT_NODE_LEN];
        compact[..20].copy_from_slice(&self.id.0);
        compact[20..24].copy_from_slice(&self.addr.ip().octets());
        compact[24..26].copy_from_slice(&self.addr.port().to_be_bytes());
        compact
    }
}
