use std::collections::BTreeMap;

use bytes::Bytes;

use crate::bencode::Value;

use super::error::DhtError;
use super::node::{Node, NodeId, COMPACT_NODE_LEN};

/// A parsed view of an incoming KRPC message, classified by its `y` field.
#[derive(Debug, Clone)]
pub enum DhtMessage {
    /// `y=q`: a query from a remote node.
    Query {
        transaction_id: Bytes,
        /// The raw `q` value; kept verbatim so unknown queries stay
        /// observable through the handler chain.
        name: String,
        sender: NodeId,
        query: DhtQuery,
    },
    /// `y=r`: a response to one of our queries.
    Response {
        transaction_id: Bytes,
        sender: NodeId,
        /// Contacts decoded from the compact `r.nodes` value, if present.
        nodes: Vec<Node>,
    },
    /// `y=e`: a KRPC error.
    Error {
        transaction_id: Bytes,
        code: i64,
        message: String,
    },
}

/// The queries a remote node can ask of us.
#[derive(Debug, Clone)]
pub enum DhtQuery {
    Ping,
    FindNode {
        target: NodeId,
    },
    GetPeers {
        info_hash: [u8; 20],
    },
    AnnouncePeer {
        info_hash: [u8; 20],
        port: u16,
        token: Bytes,
    },
    /// A query name we do not answer (`sample_infohashes`, `vote`, future
    /// extensions). Still updates the routing table and reaches handlers.
    Unknown,
}

impl DhtMessage {
    /// Classifies a decoded bencode value as a query, response, or error.
    pub fn parse(value: &Value) -> Result<Self, DhtError> {
        if value.as_dict().is_none() {
            return Err(DhtError::InvalidMessage("expected dict".into()));
        }

        let transaction_id = value
            .get_bytes(b"t")
            .cloned()
            .ok_or_else(|| DhtError::InvalidMessage("missing transaction id".into()))?;

        match value.get_str(b"y") {
            Some("q") => Self::parse_query(transaction_id, value),
            Some("r") => Self::parse_response(transaction_id, value),
            Some("e") => Self::parse_error(transaction_id, value),
            Some(other) => Err(DhtError::InvalidMessage(format!(
                "unknown message type: {other}"
            ))),
            None => Err(DhtError::InvalidMessage("missing message type".into())),
        }
    }

    fn parse_query(transaction_id: Bytes, msg: &Value) -> Result<Self, DhtError> {
        let name = msg
            .get_str(b"q")
            .ok_or_else(|| DhtError::InvalidMessage("missing query name".into()))?
            .to_string();

        let args = msg
            .get(b"a")
            .ok_or_else(|| DhtError::InvalidMessage("missing query args".into()))?;

        let sender = required_id(args, b"id")?;

        let query = match name.as_str() {
            "ping" => DhtQuery::Ping,
            "find_node" => DhtQuery::FindNode {
                target: required_id(args, b"target")?,
            },
            "get_peers" => DhtQuery::GetPeers {
                info_hash: required_hash(args, b"info_hash")?,
            },
            "announce_peer" => {
                let port = args
                    .get(b"port")
                    .and_then(Value::as_integer)
                    .ok_or_else(|| DhtError::InvalidMessage("missing port".into()))?;
                let port = u16::try_from(port)
                    .map_err(|_| DhtError::InvalidMessage("port out of range".into()))?;

                let token = args
                    .get_bytes(b"token")
                    .cloned()
                    .ok_or_else(|| DhtError::InvalidMessage("missing token".into()))?;

                DhtQuery::AnnouncePeer {
                    info_hash: required_hash(args, b"info_hash")?,
                    port,
                    token,
                }
            }
            _ => DhtQuery::Unknown,
        };

        Ok(Self::Query {
            transaction_id,
            name,
            sender,
            query,
        })
    }

    fn parse_response(transaction_id: Bytes, msg: &Value) -> Result<Self, DhtError> {
        let ret = msg
            .get(b"r")
            .ok_or_else(|| DhtError::InvalidMessage("missing return dict".into()))?;

        let sender = required_id(ret, b"id")?;

        let nodes = ret
            .get_bytes(b"nodes")
            .map(|data| {
                data.chunks_exact(COMPACT_NODE_LEN)
                    .filter_map(Node::from_compact)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self::Response {
            transaction_id,
            sender,
            nodes,
        })
    }

    fn parse_error(transaction_id: Bytes, msg: &Value) -> Result<Self, DhtError> {
        let error = msg
            .get(b"e")
            .and_then(Value::as_list)
            .ok_or_else(|| DhtError::InvalidMessage("missing error list".into()))?;

        let code = error.first().and_then(|v| v.as_integer()).unwrap_or(0);
        let message = error
            .get(1)
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
            .to_string();

        Ok(Self::Error {
            transaction_id,
            code,
            message,
        })
    }

    /// The sender's node ID, when the message carries one. Error messages
    /// do not.
    pub fn sender(&self) -> Option<NodeId> {
        match self {
            Self::Query { sender, .. } | Self::Response { sender, .. } => Some(*sender),
            Self::Error { .. } => None,
        }
    }

    pub fn transaction_id(&self) -> &Bytes {
        match self {
            Self::Query { transaction_id, .. }
            | Self::Response { transaction_id, .. }
            | Self::Error { transaction_id, .. } => transaction_id,
        }
    }
}

fn required_id(dict: &Value, key: &[u8]) -> Result<NodeId, DhtError> {
    dict.get_bytes(key)
        .ok_or_else(|| {
            DhtError::InvalidMessage(format!("missing {}", String::from_utf8_lossy(key)))
        })
        .and_then(|b| NodeId::from_bytes(b))
}

fn required_hash(dict: &Value, key: &[u8]) -> Result<[u8; 20], DhtError> {
    Ok(required_id(dict, key)?.0)
}

/// A fresh 2-byte transaction ID.
pub fn transaction_id() -> Bytes {
    let id: [u8; 2] = rand::random();
    Bytes::copy_from_slice(&id)
}

/// Builds a `ping` query.
pub fn ping_query(transaction_id: &Bytes, our_id: &NodeId) -> Value {
    query(transaction_id, "ping", args(our_id))
}

/// Builds a `find_node` query for `target`.
pub fn find_node_query(transaction_id: &Bytes, our_id: &NodeId, target: &NodeId) -> Value {
    let mut a = args(our_id);
    a.insert(
        Bytes::from_static(b"target"),
        Value::Bytes(Bytes::copy_from_slice(target.as_bytes())),
    );
    query(transaction_id, "find_node", a)
}

/// Builds the reply to `ping` and `announce_peer`: just our ID.
pub(crate) fn id_response(transaction_id: &Bytes, our_id: &NodeId) -> Value {
    response(transaction_id, args(our_id))
}

/// Builds the reply to `find_node`: our ID plus the compact form of the
/// closest nodes.
pub(crate) fn find_node_response(
    transaction_id: &Bytes,
    our_id: &NodeId,
    nodes: &[Node],
) -> Value {
    let mut r = args(our_id);
    r.insert(Bytes::from_static(b"nodes"), compact_nodes(nodes));
    response(transaction_id, r)
}

/// Builds the reply to `get_peers`. This node stores no peers, so the reply
/// always carries the closest nodes and a throwaway token, never `values`.
pub(crate) fn get_peers_response(
    transaction_id: &Bytes,
    our_id: &NodeId,
    token: &Bytes,
    nodes: &[Node],
) -> Value {
    let mut r = args(our_id);
    r.insert(Bytes::from_static(b"nodes"), compact_nodes(nodes));
    r.insert(Bytes::from_static(b"token"), Value::Bytes(token.clone()));
    response(transaction_id, r)
}

fn args(our_id: &NodeId) -> BTreeMap<Bytes, Value> {
    let mut map = BTreeMap::new();
    map.insert(
        Bytes::from_static(b"id"),
        Value::Bytes(Bytes::copy_from_slice(our_id.as_bytes())),
    );
    map
}

fn compact_nodes(nodes: &[Node]) -> Value {
    let mut data = Vec::with_capacity(nodes.len() * COMPACT_NODE_LEN);
    for node in nodes {
        data.extend_from_slice(&node.to_compact());
    }
    Value::Bytes(Bytes::from(data))
}

fn query(transaction_id: &Bytes, name: &str, args: BTreeMap<Bytes, Value>) -> Value {
    let mut dict = BTreeMap::new();
    dict.insert(Bytes::from_static(b"t"), Value::Bytes(transaction_id.clone()));
    dict.insert(Bytes::from_static(b"y"), Value::string("q"));
    dict.insert(Bytes::from_static(b"q"), Value::string(name));
    dict.insert(Bytes::from_static(b"a"), Value::Dict(args));
    Value::Dict(dict)
}

fn response(transaction_id: &Bytes, ret: BTreeMap<Bytes, Value>) -> Value {
    let mut dict = BTreeMap::new();
    dict.insert(Bytes::from_static(b"t"), Value::Bytes(transaction_id.clone()));
    dict.insert(Bytes::from_static(b"y"), Value::string("r"));
    dict.insert(Bytes::from_static(b"r"), Value::Dict(ret));
    Value::Dict(dict)
}
