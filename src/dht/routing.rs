use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::Rng as _;

use super::node::{Node, NodeId};

/// Kademlia replication parameter: nodes per bucket.
pub(crate) const K: usize = 8;

const ID_BITS: usize = 160;

/// One routing-table partition: a contiguous prefix range of the keyspace
/// holding up to [`K`] nodes, oldest contact at the front.
#[derive(Debug)]
pub(crate) struct Bucket {
    prefix: [u8; 20],
    prefix_len: usize,
    nodes: VecDeque<Node>,
}

impl Bucket {
    fn new(prefix: [u8; 20], prefix_len: usize) -> Self {
        Self {
            prefix,
            prefix_len,
            nodes: VecDeque::with_capacity(K),
        }
    }

    /// Whether the bucket's prefix range contains the given ID.
    pub(crate) fn covers(&self, id: &NodeId) -> bool {
        let prefix = NodeId(self.prefix);
        (0..self.prefix_len).all(|i| id.bit(i) == prefix.bit(i))
    }

    /// A uniformly random ID inside the bucket's range.
    fn random_id(&self) -> NodeId {
        let mut id = [0u8; 20];
        rand::rng().fill(&mut id);

        for i in 0..self.prefix_len {
            let mask = 1u8 << (7 - i % 8);
            if NodeId(self.prefix).bit(i) {
                id[i / 8] |= mask;
            } else {
                id[i / 8] &= !mask;
            }
        }
        NodeId(id)
    }

    /// The most recently seen node, if any.
    fn freshest(&self) -> Option<&Node> {
        self.nodes.back()
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }
}

/// Routing table of known DHT nodes.
///
/// Buckets partition the 160-bit keyspace by prefix; the table starts as a
/// single bucket covering everything. When the bucket containing the local
/// ID fills up it splits at the midpoint of its range; other full buckets
/// reject newcomers. Within a bucket, nodes are kept ordered by last
/// contact, oldest at the front.
pub struct RoutingTable {
    our_id: NodeId,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    pub fn new(our_id: NodeId) -> Self {
        Self {
            our_id,
            buckets: vec![Bucket::new([0u8; 20], 0)],
        }
    }

    pub fn our_id(&self) -> &NodeId {
        &self.our_id
    }

    fn bucket_index(&self, id: &NodeId) -> usize {
        // The buckets partition the keyspace, so exactly one covers any ID.
        self.buckets
            .iter()
            .position(|b| b.covers(id))
            .unwrap_or(0)
    }

    /// Inserts or refreshes a node.
    ///
    /// A node already present has its last-seen time refreshed and moves to
    /// the tail of its bucket. A new node lands in the bucket covering its
    /// ID; if that bucket is full it either splits (when it covers the
    /// local ID) or drops the newcomer. Returns whether the node is in the
    /// table afterwards.
    pub fn add_node(&mut self, node: Node) -> bool {
        if node.id == self.our_id {
            return false;
        }

        loop {
            let idx = self.bucket_index(&node.id);
            let bucket = &mut self.buckets[idx];

            if let Some(pos) = bucket.nodes.iter().position(|n| n.id == node.id) {
                if let Some(mut existing) = bucket.nodes.remove(pos) {
                    existing.touch();
                    existing.addr = node.addr;
                    bucket.nodes.push_back(existing);
                }
                return true;
            }

            if bucket.nodes.len() < K {
                bucket.nodes.push_back(node);
                return true;
            }

            if bucket.covers(&self.our_id) && bucket.prefix_len < ID_BITS {
                self.split(idx);
                continue;
            }

            return false;
        }
    }

    /// Splits bucket `idx` at the midpoint of its range, re-partitioning
    /// its nodes by their next prefix bit.
    fn split(&mut self, idx: usize) {
        let bucket = self.buckets.remove(idx);
        let bit = bucket.prefix_len;

        let mut lower = Bucket::new(bucket.prefix, bit + 1);
        let mut upper_prefix = bucket.prefix;
        upper_prefix[bit / 8] |= 1u8 << (7 - bit % 8);
        let mut upper = Bucket::new(upper_prefix, bit + 1);

        for node in bucket.nodes {
            if node.id.bit(bit) {
                upper.nodes.push_back(node);
            } else {
                lower.nodes.push_back(node);
            }
        }

        self.buckets.insert(idx, upper);
        self.buckets.insert(idx, lower);
    }

    /// Up to `count` nodes, sorted by XOR distance to `target` ascending.
    pub fn closest_nodes(&self, target: &NodeId, count: usize) -> Vec<Node> {
        let mut nodes: Vec<(Node, [u8; 20])> = self
            .buckets
            .iter()
            .flat_map(|b| b.nodes())
            .map(|n| (n.clone(), n.id.distance(target)))
            .collect();

        nodes.sort_by(|a, b| a.1.cmp(&b.1));
        nodes.truncate(count);
        nodes.into_iter().map(|(n, _)| n).collect()
    }

    /// Evicts every node whose last contact is older than `max_age`.
    pub fn remove_stale(&mut self, now: Instant, max_age: Duration) {
        for bucket in &mut self.buckets {
            bucket
                .nodes
                .retain(|n| now.saturating_duration_since(n.last_seen) <= max_age);
        }
    }

    /// Total node count across all buckets.
    pub fn active_count(&self) -> usize {
        self.buckets.iter().map(|b| b.nodes.len()).sum()
    }

    /// Nodes that have been silent long enough to warrant a liveness ping.
    pub(crate) fn questionable_nodes(&self, now: Instant) -> Vec<Node> {
        self.buckets
            .iter()
            .flat_map(|b| b.nodes())
            .filter(|n| n.is_questionable(now))
            .cloned()
            .collect()
    }

    /// Refresh targets for idle buckets: for each non-empty bucket whose
    /// freshest node is older than `idle`, a random ID inside the bucket's
    /// range paired with that freshest node.
    pub(crate) fn refresh_targets(&self, now: Instant, idle: Duration) -> Vec<(NodeId, Node)> {
        self.buckets
            .iter()
            .filter_map(|b| {
                let freshest = b.freshest()?;
                if now.saturating_duration_since(freshest.last_seen) > idle {
                    Some((b.random_id(), freshest.clone()))
                } else {
                    None
                }
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }
}
