use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rand::Rng as _;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bencode::{decode, encode, Value};

use super::error::DhtError;
use super::message::{self, DhtMessage, DhtQuery};
use super::node::{Node, NodeId};
use super::routing::{RoutingTable, K};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);
const NODE_MAX_AGE: Duration = Duration::from_secs(15 * 60);
const BUCKET_IDLE: Duration = Duration::from_secs(15 * 60);
const PENDING_QUERY_TIMEOUT: Duration = Duration::from_secs(30);
const BLOCKED_IP_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_BLOCKED_IPS: usize = 1000;
const MAX_DATAGRAM: usize = 1472;
const RECV_BUFFER_LEN: usize = 65536;
const BIND_ATTEMPTS: usize = 8;
const SEND_QUEUE_LEN: usize = 1024;
const TOKEN_LEN: usize = 8;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Well-known entry points into the DHT overlay.
pub const BOOTSTRAP_NODES: &[&str] = &[
    "router.bittorrent.com:6881",
    "router.utorrent.com:6881",
    "dht.transmissionbt.com:6881",
];

/// A point-in-time snapshot of node activity.
///
/// The message counters are reset to zero by the [`DhtNode::stats`] call
/// that produced the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub active_nodes: usize,
    pub incoming: u64,
    pub outgoing: u64,
}

/// A query we sent and have not yet seen answered.
struct PendingQuery {
    query_name: String,
    issued_at: Instant,
    destination: SocketAddrV4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Running,
    Stopped,
}

type MessageHandler = Arc<dyn Fn(&Value, &Node) + Send + Sync>;

/// A minimal BitTorrent Mainline DHT node ([BEP-5]).
///
/// The node answers the four standard queries, keeps a splitting k-bucket
/// routing table, and refreshes it in the background. User code observes
/// traffic through the handler chain and injects messages with
/// [`send_message`](Self::send_message); no response futures are exposed.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use dht_node::DhtNode;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let node = Arc::new(DhtNode::new(None, Some(6881))?);
/// node.start().await?;
///
/// node.add_message_handler(|message, sender| {
///     println!("{} -> {:?}", sender.addr, message.get_str(b"y"));
/// });
///
/// let stats = node.stats();
/// println!("{} nodes known", stats.active_nodes);
///
/// node.stop().await;
/// # Ok(())
/// # }
/// ```
///
/// [BEP-5]: http://bittorrent.org/beps/bep_0005.html
pub struct DhtNode {
    our_id: NodeId,
    configured_port: Option<u16>,
    state: Mutex<State>,
    local_port: Mutex<Option<u16>>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    routing: RwLock<RoutingTable>,
    pending: RwLock<HashMap<Bytes, PendingQuery>>,
    blocked: RwLock<HashMap<Ipv4Addr, Instant>>,
    handlers: RwLock<Vec<MessageHandler>>,
    incoming: AtomicU64,
    outgoing: AtomicU64,
    send_tx: mpsc::Sender<(Vec<u8>, SocketAddrV4)>,
    send_rx: Mutex<Option<mpsc::Receiver<(Vec<u8>, SocketAddrV4)>>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DhtNode {
    /// Creates a node without touching the network.
    ///
    /// `node_id` is the 40-hex-character identifier to use; a random one is
    /// generated when absent. `node_port` is the UDP port to bind on
    /// [`start`](Self::start); a random port in [1025, 65535] is drawn when
    /// absent. Port 0 is rejected.
    pub fn new(node_id: Option<&str>, node_port: Option<u16>) -> Result<Self, DhtError> {
        let our_id = match node_id {
            Some(hex) => NodeId::from_hex(hex)?,
            None => NodeId::generate(),
        };

        if node_port == Some(0) {
            return Err(DhtError::InvalidPort);
        }

        let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_LEN);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            our_id,
            configured_port: node_port,
            state: Mutex::new(State::Created),
            local_port: Mutex::new(None),
            socket: Mutex::new(None),
            routing: RwLock::new(RoutingTable::new(our_id)),
            pending: RwLock::new(HashMap::new()),
            blocked: RwLock::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            incoming: AtomicU64::new(0),
            outgoing: AtomicU64::new(0),
            send_tx,
            send_rx: Mutex::new(Some(send_rx)),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// The node's identifier as 40 lowercase hex characters.
    pub fn id(&self) -> String {
        self.our_id.to_string()
    }

    /// The UDP port the node is bound to, once started.
    pub fn port(&self) -> Option<u16> {
        *self.local_port.lock()
    }

    /// Registers a handler invoked for every successfully parsed incoming
    /// message, in registration order. A panicking handler is logged and
    /// isolated; the remaining handlers still run.
    ///
    /// Handlers may call [`send_message`](Self::send_message); they must
    /// not block for long, since they run on the receive path.
    pub fn add_message_handler<F>(&self, handler: F)
    where
        F: Fn(&Value, &Node) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Binds the UDP socket and spawns the receive, send, and maintenance
    /// tasks; the maintenance task immediately seeds the routing table from
    /// the bootstrap nodes.
    ///
    /// Valid from the created state; a second call on a running node is a
    /// no-op, and a stopped node cannot be restarted. A bind failure on an
    /// explicitly configured port is surfaced; with an auto-chosen port,
    /// up to eight fresh ports are tried first.
    pub async fn start(self: &Arc<Self>) -> Result<(), DhtError> {
        {
            let mut state = self.state.lock();
            match *state {
                State::Created => *state = State::Running,
                State::Running => {
                    debug!("node already running");
                    return Ok(());
                }
                State::Stopped => return Err(DhtError::Stopped),
            }
        }

        let socket = match self.bind().await {
            Ok(socket) => Arc::new(socket),
            Err(err) => {
                *self.state.lock() = State::Created;
                return Err(err);
            }
        };

        let local_port = match socket.local_addr() {
            Ok(addr) => addr.port(),
            Err(err) => {
                *self.state.lock() = State::Created;
                return Err(err.into());
            }
        };

        let queue = match self.send_rx.lock().take() {
            Some(queue) => queue,
            None => return Err(DhtError::Stopped),
        };

        info!(id = %self.our_id, port = local_port, "starting dht node");
        *self.local_port.lock() = Some(local_port);
        *self.socket.lock() = Some(Arc::clone(&socket));

        {
            let mut tasks = self.tasks.lock();
            tasks.push(tokio::spawn(Arc::clone(self).recv_loop(Arc::clone(&socket))));
            tasks.push(tokio::spawn(
                Arc::clone(self).send_loop(Arc::clone(&socket), queue),
            ));
            tasks.push(tokio::spawn(Arc::clone(self).maintenance_loop()));
        }

        Ok(())
    }

    /// Signals the tasks to finish, waits a bounded time for them, and
    /// closes the socket. Idempotent; the node is inert afterwards.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                State::Running => *state = State::Stopped,
                State::Created | State::Stopped => {
                    debug!("stop called on a node that is not running");
                    return;
                }
            }
        }

        info!(id = %self.our_id, "stopping dht node");
        let _ = self.shutdown.send(true);

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            match timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%err, "task ended abnormally"),
                Err(_) => warn!("task did not finish in time, detaching"),
            }
        }

        *self.socket.lock() = None;
    }

    /// Queues a bencoded message for transmission to `node_ip:node_port`.
    ///
    /// Fire-and-forget: an address that is not an IPv4 literal, an encoded
    /// size above 1472 bytes, or a full outgoing queue is logged and
    /// dropped without notifying the caller. A `y=q` dict additionally
    /// records a pending query under its transaction ID, swept after 30
    /// seconds without an answer.
    pub fn send_message(&self, message: &Value, node_ip: &str, node_port: u16) {
        let ip: Ipv4Addr = match node_ip.parse() {
            Ok(ip) => ip,
            Err(_) => {
                warn!(ip = node_ip, "cannot send message: not an IPv4 address");
                return;
            }
        };

        self.send_value(message, SocketAddrV4::new(ip, node_port));
    }

    /// Snapshot of the node count and the message counters; the counters
    /// reset to zero.
    pub fn stats(&self) -> Stats {
        Stats {
            active_nodes: self.routing.read().active_count(),
            incoming: self.incoming.swap(0, Ordering::Relaxed),
            outgoing: self.outgoing.swap(0, Ordering::Relaxed),
        }
    }

    async fn bind(&self) -> Result<UdpSocket, DhtError> {
        if let Some(port) = self.configured_port {
            return Ok(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?);
        }

        let mut last_err = None;
        for _ in 0..BIND_ATTEMPTS {
            let port: u16 = rand::rng().random_range(1025..=65535);
            match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await {
                Ok(socket) => return Ok(socket),
                Err(err) => {
                    debug!(port, %err, "bind failed, retrying with a fresh port");
                    last_err = Some(err);
                }
            }
        }

        Err(DhtError::Io(last_err.unwrap_or_else(|| {
            std::io::Error::other("no bind attempt made")
        })))
    }

    /// Sends `find_node` for our own ID to the well-known routers.
    async fn bootstrap(&self) {
        for host in BOOTSTRAP_NODES {
            match tokio::net::lookup_host(host).await {
                Ok(mut addrs) => {
                    let v4 = addrs.find_map(|addr| match addr {
                        SocketAddr::V4(v4) => Some(v4),
                        SocketAddr::V6(_) => None,
                    });
                    if let Some(addr) = v4 {
                        debug!(host, %addr, "seeding routing table");
                        let tid = message::transaction_id();
                        self.send_value(
                            &message::find_node_query(&tid, &self.our_id, &self.our_id),
                            addr,
                        );
                    }
                }
                Err(err) => warn!(host, %err, "cannot resolve bootstrap node"),
            }
        }
    }

    /// Records the pending query (for `y=q` dicts), encodes, and queues the
    /// message for the send task.
    pub(crate) fn send_value(&self, message: &Value, dest: SocketAddrV4) {
        let data = encode(message);
        if data.len() > MAX_DATAGRAM {
            warn!(len = data.len(), to = %dest, "dropping oversized datagram");
            return;
        }

        if message.get_str(b"y") == Some("q") {
            if let Some(tid) = message.get_bytes(b"t") {
                let query_name = message.get_str(b"q").unwrap_or("unknown").to_string();
                self.pending.write().insert(
                    tid.clone(),
                    PendingQuery {
                        query_name,
                        issued_at: Instant::now(),
                        destination: dest,
                    },
                );
            }
        }

        if let Err(err) = self.send_tx.try_send((data, dest)) {
            warn!(%err, to = %dest, "cannot queue outgoing message");
        }
    }

    /// Processes one datagram and returns the reply to send, if any.
    pub(crate) fn process_datagram(&self, data: &[u8], from: SocketAddrV4) -> Option<Value> {
        self.incoming.fetch_add(1, Ordering::Relaxed);

        if self.blocked.read().contains_key(from.ip()) {
            debug!(ip = %from.ip(), "ignoring message from blocked ip");
            return None;
        }

        let value = match decode(data) {
            Ok(value) => value,
            Err(err) => {
                debug!(%err, %from, "cannot decode datagram");
                return None;
            }
        };

        let msg = match DhtMessage::parse(&value) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%err, %from, "malformed message");
                return None;
            }
        };

        // KRPC errors carry no sender ID, so there is no contact to record
        // and nothing to hand the chain; the transaction is settled though.
        if let DhtMessage::Error {
            transaction_id,
            code,
            message,
        } = &msg
        {
            debug!(code, reason = %message, %from, "received error reply");
            self.pending.write().remove(transaction_id);
            return None;
        }

        let sender = msg.sender()?;
        let node = Node::new(sender, from);
        if !node.is_valid() {
            debug!(%from, "blocking sender advertising an invalid endpoint");
            self.block_ip(*from.ip());
            return None;
        }

        self.routing.write().add_node(node.clone());
        self.run_handlers(&value, &node);

        match msg {
            DhtMessage::Query {
                transaction_id,
                name,
                query,
                ..
            } => self.build_reply(&transaction_id, &name, query),
            DhtMessage::Response {
                transaction_id,
                nodes,
                ..
            } => {
                if self.pending.write().remove(&transaction_id).is_none() {
                    debug!(%from, "response does not match a pending query");
                }
                self.ingest_nodes(nodes);
                None
            }
            DhtMessage::Error { .. } => None,
        }
    }

    fn build_reply(&self, tid: &Bytes, name: &str, query: DhtQuery) -> Option<Value> {
        match query {
            DhtQuery::Ping => Some(message::id_response(tid, &self.our_id)),
            DhtQuery::FindNode { target } => {
                let closest = self.routing.read().closest_nodes(&target, K);
                Some(message::find_node_response(tid, &self.our_id, &closest))
            }
            DhtQuery::GetPeers { info_hash } => {
                let closest = self.routing.read().closest_nodes(&NodeId(info_hash), K);
                let token: [u8; TOKEN_LEN] = rand::random();
                Some(message::get_peers_response(
                    tid,
                    &self.our_id,
                    &Bytes::copy_from_slice(&token),
                    &closest,
                ))
            }
            // Acknowledged but not stored; peer tracking is out of scope.
            DhtQuery::AnnouncePeer { .. } => Some(message::id_response(tid, &self.our_id)),
            DhtQuery::Unknown => {
                debug!(query = name, "ignoring unhandled query");
                None
            }
        }
    }

    /// Adds contacts learned from a response's compact `nodes` value,
    /// blocking the advertised address of anything invalid.
    fn ingest_nodes(&self, nodes: Vec<Node>) {
        let (valid, invalid): (Vec<_>, Vec<_>) = nodes.into_iter().partition(Node::is_valid);

        {
            let mut routing = self.routing.write();
            for node in valid {
                routing.add_node(node);
            }
        }

        for node in invalid {
            debug!(addr = %node.addr, "blocking invalid advertised node");
            self.block_ip(*node.addr.ip());
        }
    }

    fn run_handlers(&self, value: &Value, node: &Node) {
        let handlers: Vec<MessageHandler> = self.handlers.read().clone();
        for handler in handlers {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(value, node)));
            if outcome.is_err() {
                debug!(from = %node.addr, "message handler panicked");
            }
        }
    }

    /// Blocks an IP for [`BLOCKED_IP_TTL`]. A full table evicts its entry
    /// closest to expiry, so a newly seen offender is always blocked.
    fn block_ip(&self, ip: Ipv4Addr) {
        let mut blocked = self.blocked.write();

        if blocked.len() >= MAX_BLOCKED_IPS && !blocked.contains_key(&ip) {
            let oldest = blocked
                .iter()
                .min_by_key(|(_, since)| **since)
                .map(|(ip, _)| *ip);
            if let Some(oldest) = oldest {
                blocked.remove(&oldest);
            }
        }

        blocked.insert(ip, Instant::now());
    }

    /// Drops pending queries that have gone unanswered for too long.
    pub(crate) fn expire_pending(&self, now: Instant) {
        self.pending.write().retain(|_, query| {
            if now.saturating_duration_since(query.issued_at) > PENDING_QUERY_TIMEOUT {
                debug!(
                    query = %query.query_name,
                    to = %query.destination,
                    "expiring unanswered query"
                );
                false
            } else {
                true
            }
        });
    }

    async fn run_maintenance(&self) {
        let now = Instant::now();

        self.routing.write().remove_stale(now, NODE_MAX_AGE);
        self.expire_pending(now);
        self.blocked
            .write()
            .retain(|_, since| now.saturating_duration_since(*since) <= BLOCKED_IP_TTL);

        let questionable = self.routing.read().questionable_nodes(now);
        for node in questionable {
            let tid = message::transaction_id();
            self.send_value(&message::ping_query(&tid, &self.our_id), node.addr);
        }

        let targets = self.routing.read().refresh_targets(now, BUCKET_IDLE);
        for (target, node) in targets {
            debug!(%target, to = %node.addr, "refreshing idle bucket");
            let tid = message::transaction_id();
            self.send_value(
                &message::find_node_query(&tid, &self.our_id, &target),
                node.addr,
            );
        }

        if self.routing.read().active_count() < K {
            debug!("routing table below minimum size, re-bootstrapping");
            self.bootstrap().await;
        }
    }

    async fn recv_loop(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut buf = vec![0u8; RECV_BUFFER_LEN];

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                result = socket.recv_from(&mut buf) => match result {
                    Ok((len, SocketAddr::V4(from))) => {
                        if let Some(reply) = self.process_datagram(&buf[..len], from) {
                            self.send_value(&reply, from);
                        }
                    }
                    Ok((_, addr)) => debug!(%addr, "ignoring non-IPv4 datagram"),
                    Err(err) => warn!(%err, "cannot receive datagram"),
                }
            }
        }
    }

    async fn send_loop(
        self: Arc<Self>,
        socket: Arc<UdpSocket>,
        mut queue: mpsc::Receiver<(Vec<u8>, SocketAddrV4)>,
    ) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                item = queue.recv() => match item {
                    Some((data, dest)) => match socket.send_to(&data, dest).await {
                        Ok(_) => {
                            self.outgoing.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => warn!(%err, to = %dest, "cannot send message"),
                    },
                    None => break,
                }
            }
        }
    }

    async fn maintenance_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut tick = tokio::time::interval(MAINTENANCE_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.bootstrap().await;

        // The first tick completes immediately and would double up on the
        // bootstrap that just ran.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tick.tick() => self.run_maintenance().await,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_contains(&self, transaction_id: &[u8]) -> bool {
        self.pending.read().contains_key(transaction_id)
    }

    #[cfg(test)]
    pub(crate) fn seed_node(&self, node: Node) {
        self.routing.write().add_node(node);
    }
}
