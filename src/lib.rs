//! dht-node - a minimal BitTorrent Mainline DHT node
//!
//! This library implements the core of a DHT participant following BEP
//! (BitTorrent Enhancement Proposals) specifications: it answers queries
//! from other nodes, maintains a Kademlia routing table, and lets user
//! code observe and inject DHT traffic.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding
//! - [`dht`] - BEP-5 node runtime, routing table, and wire protocol

pub mod bencode;
pub mod dht;

pub use bencode::{decode, encode, BencodeError, Value};
pub use dht::{DhtError, DhtMessage, DhtNode, DhtQuery, Node, NodeId, RoutingTable, Stats};
