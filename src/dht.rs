//! BitTorrent Mainline DHT node ([BEP-5]).
//!
//! This module implements a minimal participant in the Kademlia-based DHT
//! used by BitTorrent. The node answers `ping`, `find_node`, `get_peers`,
//! and `announce_peer` queries from other nodes, keeps a routing table of
//! contacts ordered by XOR distance, and refreshes that table in the
//! background. It does not track announced peers; its value is protocol
//! conformance and routing-table hygiene.
//!
//! # Getting started
//!
//! ```no_run
//! use std::sync::Arc;
//! use dht_node::DhtNode;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let node = Arc::new(DhtNode::new(None, None)?);
//! node.start().await?;
//!
//! // Observe every incoming message.
//! node.add_message_handler(|message, sender| {
//!     println!("{} sent {:?}", sender.addr, message.get_str(b"y"));
//! });
//!
//! // ... later
//! node.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`DhtNode`] — the runtime: one UDP socket shared by a receive task,
//!   a maintenance task, and a send task
//! - [`RoutingTable`] — splitting k-buckets over the 160-bit keyspace
//! - [`NodeId`] — 160-bit node identifier with the XOR metric
//! - [`Node`] — a known remote contact (ID + IPv4 address + last-seen time)
//! - [`DhtMessage`] — parsed view of an incoming bencoded message
//!
//! Incoming datagrams flow through bencode decoding, message parsing, the
//! routing table, and the user handler chain; queries additionally produce
//! a BEP-5 reply. Outgoing messages — user-supplied or maintenance-created —
//! are queued to the send task and counted when they hit the wire.
//!
//! [BEP-5]: http://bittorrent.org/beps/bep_0005.html

mod error;
mod message;
mod node;
mod routing;
mod server;

pub use error::DhtError;
pub use message::{
    find_node_query, ping_query, transaction_id, DhtMessage, DhtQuery,
};
pub use node::{Node, NodeId};
pub use routing::RoutingTable;
pub use server::{DhtNode, Stats, BOOTSTRAP_NODES};
