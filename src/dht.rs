//! Dht node, driven by [Dht::pulse].

mod config;
mod handle_request;
mod handle_response;
mod info;
mod socket;

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::{debug, info, trace};

use crate::common::{
    AddressFamily, FindNodeRequestArguments, GetRequestArguments, Id, MessageType, Node,
    NodeQuality, PutImmutableRequestArguments, PutMutableRequestArguments, PutRequest,
    PutRequestSpecific, RequestSpecific, RequestTypeSpecific, RoutingTable, RoutingTables,
    StorageItem, MAX_BUCKET_SIZE_K,
};
use crate::core::distribute::{Distribute, DistributeAction};
use crate::core::job::{Job, JobPurpose};
use crate::core::search::{Search, SearchOwner};
use crate::core::{
    DistributeError, DistributeId, DistributeReport, FindNodeReply, GetReply, JobError, JobId,
    JobState, Reply, SearchId, SearchKind, SearchResult, Server, StorageError, StoreOutcome,
};
use crate::transport::Transport;

use socket::KrpcSocket;

pub use config::Config;
pub use info::Info;
pub use socket::EndpointHandle;

/// Datagrams read from each endpoint per pulse.
pub const MAX_DATAGRAMS_PER_PULSE: usize = 256;
/// Delay between bootstrap attempts while the routing tables stay empty.
pub const BOOTSTRAP_RETRY: Duration = Duration::from_secs(60);
/// How often expired write tokens are forgotten.
const TOKEN_PRUNE_INTERVAL: Duration = Duration::from_secs(60);
/// Targets for which we remember the nodes that accepted our puts.
const MAX_HOLDER_TARGETS: usize = 1000;
const MAX_HOLDERS_PER_TARGET: usize = MAX_BUCKET_SIZE_K * 2;

#[derive(Debug)]
/// A single DHT node.
///
/// Nothing happens between calls to [Dht::pulse]: requests are sent,
/// replies matched, timeouts fired and callbacks run only from inside it.
pub struct Dht {
    request_timeout: Duration,
    max_attempts: u8,
    bootstrap: Vec<SocketAddr>,
    last_bootstrap: Option<Instant>,
    last_prune: Option<Instant>,

    socket: KrpcSocket,
    tables: RoutingTables,
    server: Server,

    jobs: BTreeMap<JobId, Job>,
    /// Transaction ids of sent requests waiting for a reply.
    transactions: HashMap<u32, JobId>,
    searches: BTreeMap<SearchId, Search>,
    distributes: BTreeMap<DistributeId, Distribute>,
    /// Nodes that accepted our puts, per target.
    holders: LruCache<Id, Vec<Node>>,

    next_job: u64,
    next_search: u64,
    next_distribute: u64,
}

impl Dht {
    /// Create a node with this id and default settings.
    pub fn create(id: Id) -> Self {
        Self::new(Config {
            id: Some(id),
            ..Default::default()
        })
    }

    pub fn new(config: Config) -> Self {
        let id = config.id.unwrap_or_else(Id::random);
        let holders = NonZeroUsize::new(MAX_HOLDER_TARGETS).unwrap_or(NonZeroUsize::MIN);

        Self {
            request_timeout: config.request_timeout,
            max_attempts: config.max_attempts.max(1),
            bootstrap: config.bootstrap,
            last_bootstrap: None,
            last_prune: None,

            socket: KrpcSocket::new(),
            tables: RoutingTables::new(id),
            server: Server::new(config.token_ttl, config.max_values),

            jobs: BTreeMap::new(),
            transactions: HashMap::new(),
            searches: BTreeMap::new(),
            distributes: BTreeMap::new(),
            holders: LruCache::new(holders),

            next_job: 0,
            next_search: 0,
            next_distribute: 0,
        }
    }

    // === Getters ===

    /// Returns the node's Id
    pub fn id(&self) -> &Id {
        self.tables.id()
    }

    /// Addresses of every bound endpoint.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.socket.local_addrs()
    }

    pub fn local_addr(&self, handle: EndpointHandle) -> Option<SocketAddr> {
        self.socket.local_addr(handle)
    }

    pub fn routing_table(&self, family: AddressFamily) -> &RoutingTable {
        self.tables.get(family)
    }

    pub fn routing_table_find(&self, family: AddressFamily, id: &Id) -> Option<&Node> {
        self.tables.get(family).find(id)
    }

    pub fn storage_lookup(&self, target: &Id) -> Option<&StorageItem> {
        self.server.storage().lookup(target)
    }

    /// Live shortlist of a running search, closest first.
    pub fn search_closest(&self, search: SearchId) -> Option<&[Node]> {
        self.searches.get(&search).map(|search| search.closest())
    }

    /// Returns a summary of this node's state.
    pub fn info(&self) -> Info {
        Info::from(self)
    }

    // === Public Methods ===

    /// Attach a transport, requests to addresses of its family go through it.
    pub fn bind(&mut self, transport: impl Transport + 'static) -> EndpointHandle {
        self.socket.bind(Box::new(transport))
    }

    /// Add a node we were told about out of band, as [NodeQuality::Questionable]
    /// last seen at `now`.
    pub fn add_node(&mut self, id: Id, address: SocketAddr, now: Instant) {
        let node = Node::new(id, address).with_quality(NodeQuality::Questionable);

        self.tables.for_address(&address).insert(node, now);
    }

    /// Look up our own id through these addresses on the next pulse.
    pub fn bootstrap(&mut self, addresses: impl IntoIterator<Item = SocketAddr>) {
        for address in addresses {
            if !self.bootstrap.contains(&address) {
                self.bootstrap.push(address);
            }
        }

        self.last_bootstrap = None;
    }

    pub fn ping(
        &mut self,
        address: SocketAddr,
        on_finish: impl FnOnce(Result<Id, JobError>) + 'static,
    ) -> JobId {
        self.user_job(address, RequestTypeSpecific::Ping, move |result| {
            on_finish(result.map(|reply| *reply.responder()))
        })
    }

    /// Ping a node whose id we already know.
    ///
    /// It enters the routing table as [NodeQuality::Questionable] once the
    /// request is sent, and becomes [NodeQuality::Good] when it answers.
    pub fn ping_node(
        &mut self,
        id: Id,
        address: SocketAddr,
        on_finish: impl FnOnce(Result<Id, JobError>) + 'static,
    ) -> JobId {
        let callback = move |result: Result<Reply, JobError>| {
            on_finish(result.map(|reply| *reply.responder()))
        };

        self.spawn_job(
            address,
            Some(id),
            RequestTypeSpecific::Ping,
            JobPurpose::User(Box::new(callback)),
        )
    }

    pub fn find_node(
        &mut self,
        address: SocketAddr,
        target: Id,
        on_finish: impl FnOnce(Result<FindNodeReply, JobError>) + 'static,
    ) -> JobId {
        let request = RequestTypeSpecific::FindNode(FindNodeRequestArguments { target });

        self.user_job(address, request, move |result| {
            on_finish(result.and_then(|reply| match reply {
                Reply::FindNode(reply) => Ok(reply),
                _ => Err(JobError::UnexpectedResponse),
            }))
        })
    }

    /// Ask a node for the item at `target`, the reply carries a token to [Dht::put] it.
    pub fn get(
        &mut self,
        address: SocketAddr,
        target: Id,
        on_finish: impl FnOnce(Result<GetReply, JobError>) + 'static,
    ) -> JobId {
        let request = RequestTypeSpecific::Get(GetRequestArguments { target, seq: None });

        self.user_job(address, request, move |result| {
            on_finish(result.and_then(|reply| match reply {
                Reply::Get(reply) => Ok(reply),
                _ => Err(JobError::UnexpectedResponse),
            }))
        })
    }

    /// Store an item at a node, with a token from a previous [Dht::get] to it.
    pub fn put(
        &mut self,
        address: SocketAddr,
        token: Vec<u8>,
        item: StorageItem,
        on_finish: impl FnOnce(Result<Id, JobError>) + 'static,
    ) -> JobId {
        self.user_job(address, put_request(token, &item), move |result| {
            on_finish(result.map(|reply| *reply.responder()))
        })
    }

    /// Complete a job with [JobError::Cancelled] on the next pulse, a late reply is dropped.
    ///
    /// Returns `false` if the job is already gone.
    pub fn cancel(&mut self, job: JobId) -> bool {
        let Some(job) = self.jobs.get_mut(&job) else {
            return false;
        };

        if let Some(tid) = job.transaction_id.take() {
            self.transactions.remove(&tid);
        }

        job.complete(Err(JobError::Cancelled));

        true
    }

    /// Find the nodes closest to `target`.
    pub fn search(
        &mut self,
        target: Id,
        on_result: impl FnOnce(SearchResult) + 'static,
    ) -> SearchId {
        self.start_search(
            target,
            SearchKind::Nodes,
            SearchOwner::User(Box::new(on_result)),
        )
    }

    /// Find the nodes closest to `target` with `get` queries, collecting
    /// their write tokens and the first valid item.
    pub fn search_value(
        &mut self,
        target: Id,
        on_result: impl FnOnce(SearchResult) + 'static,
    ) -> SearchId {
        self.start_search(
            target,
            SearchKind::Value,
            SearchOwner::User(Box::new(on_result)),
        )
    }

    /// Store an item at the nodes closest to its target, and at every node
    /// that accepted an earlier version of it.
    pub fn distribute(
        &mut self,
        item: StorageItem,
        on_finish: impl FnOnce(Result<DistributeReport, DistributeError>) + 'static,
    ) -> DistributeId {
        let id = DistributeId(self.next_distribute);
        self.next_distribute += 1;

        let target = *item.target();

        self.distributes
            .insert(id, Distribute::new(id, item, Box::new(on_finish)));
        self.start_search(target, SearchKind::Value, SearchOwner::Distribute(id));

        id
    }

    /// Store a locally originated item.
    pub fn storage_insert(&mut self, item: StorageItem) -> Result<StoreOutcome, StorageError> {
        self.server.storage_mut().insert(item)
    }

    /// Advance everything by one step.
    ///
    /// Call periodically, replies are only read and timeouts only fired from here.
    pub fn pulse(&mut self, now: Instant) {
        self.receive(now);
        self.advance_jobs(now);
        self.maintain(now);
        self.drive_searches();
        self.drive_distributes();
        self.advance_jobs(now);
    }

    // === Private Methods ===

    fn receive(&mut self, now: Instant) {
        for (message, from) in self.socket.recv(MAX_DATAGRAMS_PER_PULSE) {
            let transaction_id = message.transaction_id;

            match message.message_type {
                MessageType::Request(request) => {
                    self.handle_request(from, transaction_id, request, now)
                }
                response => self.handle_response(from, transaction_id, response),
            }
        }
    }

    fn spawn_job(
        &mut self,
        destination: SocketAddr,
        node: Option<Id>,
        request: RequestTypeSpecific,
        purpose: JobPurpose,
    ) -> JobId {
        let id = JobId(self.next_job);
        self.next_job += 1;

        trace!(job = id.0, ?destination, ?purpose, "New job");

        self.jobs
            .insert(id, Job::new(id, destination, node, request, purpose));

        id
    }

    fn user_job(
        &mut self,
        address: SocketAddr,
        request: RequestTypeSpecific,
        callback: impl FnOnce(Result<Reply, JobError>) + 'static,
    ) -> JobId {
        let node = self
            .tables
            .get(AddressFamily::of(&address))
            .find_by_address(&address)
            .map(|node| *node.id());

        self.spawn_job(address, node, request, JobPurpose::User(Box::new(callback)))
    }

    fn advance_jobs(&mut self, now: Instant) {
        let ids: Vec<JobId> = self.jobs.keys().copied().collect();

        for id in ids {
            self.advance_job(id, now);
        }
    }

    /// Run a job through as many states as it can go this pulse.
    fn advance_job(&mut self, id: JobId, now: Instant) {
        loop {
            let Some(job) = self.jobs.get_mut(&id) else {
                return;
            };

            match job.state {
                JobState::Querying => {
                    let request = RequestSpecific {
                        requester_id: *self.tables.id(),
                        request_type: job.request.clone(),
                    };

                    match self.socket.request(job.destination, request) {
                        Ok(tid) => {
                            job.sent(tid, now, self.request_timeout);
                            self.transactions.insert(tid, id);

                            let contacted = match job.purpose {
                                JobPurpose::User(_) => job.node,
                                _ => None,
                            };
                            let destination = job.destination;

                            if let Some(node) = contacted {
                                self.record_contacted(node, destination, now);
                            }

                            return;
                        }
                        Err(error) => {
                            let destination = job.destination;
                            debug!(job = id.0, ?destination, ?error, "Failed to send request");
                            job.complete(Err(error.into()));
                        }
                    }
                }
                JobState::Responding => {
                    if !job.expired(now) {
                        return;
                    }

                    if let Some(tid) = job.transaction_id {
                        self.transactions.remove(&tid);
                    }

                    if job.attempts < self.max_attempts {
                        trace!(job = id.0, attempts = job.attempts, "Retrying request");
                        job.retry();
                    } else {
                        job.complete(Err(JobError::Timeout));

                        let node = job.node;
                        let destination = job.destination;
                        self.report_timeout(node, destination);
                    }
                }
                JobState::Processing => self.process_job(id, now),
                JobState::Completing => {
                    self.finish_job(id);
                    return;
                }
            }
        }
    }

    /// Add a node we just sent a request to, unless it is already known.
    fn record_contacted(&mut self, id: Id, address: SocketAddr, now: Instant) {
        let table = self.tables.for_address(&address);

        if table.find(&id).is_none() {
            let node = Node::new(id, address)
                .with_quality(NodeQuality::Questionable)
                .with_last_seen(now);
            table.insert(node, now);
        }
    }

    fn report_timeout(&mut self, node: Option<Id>, destination: SocketAddr) {
        let table = self.tables.for_address(&destination);

        let id = node.or_else(|| {
            table
                .find_by_address(&destination)
                .map(|node| *node.id())
        });

        if let Some(id) = id {
            table.mark_timeout(&id);
        }
    }

    /// Purge a completed job and notify its owner.
    fn finish_job(&mut self, id: JobId) {
        let Some(job) = self.jobs.remove(&id) else {
            return;
        };

        if let Some(tid) = job.transaction_id {
            self.transactions.remove(&tid);
        }

        let outcome = job.outcome.unwrap_or(Err(JobError::Cancelled));

        let destination = job.destination;
        match &outcome {
            Ok(_) => debug!(job = job.id.0, ?destination, purpose = ?job.purpose, "Job done"),
            Err(error) => debug!(job = job.id.0, ?destination, ?error, "Job failed"),
        }

        match job.purpose {
            JobPurpose::User(callback) => callback(outcome),
            JobPurpose::Search(search_id) => {
                let (Some(search), Some(queried)) = (self.searches.get_mut(&search_id), job.node)
                else {
                    return;
                };

                match outcome {
                    Ok(reply) => {
                        let responder = Node::new(*reply.responder(), job.destination)
                            .with_quality(NodeQuality::Good);

                        match reply {
                            Reply::FindNode(reply) => {
                                search.on_response(&queried, responder, &reply.nodes, None, None)
                            }
                            Reply::Get(reply) => search.on_response(
                                &queried,
                                responder,
                                &reply.nodes,
                                Some(reply.token),
                                reply.value,
                            ),
                            _ => search.on_failure(&queried),
                        }
                    }
                    Err(_) => search.on_failure(&queried),
                }
            }
            JobPurpose::Distribute(distribute_id) => {
                let Some(queried) = job.node else {
                    return;
                };
                let node = Node::new(queried, job.destination);

                match job.request {
                    RequestTypeSpecific::Get(_) => {
                        let token = outcome.and_then(|reply| match reply {
                            Reply::Get(reply) => Ok(reply.token),
                            _ => Err(JobError::UnexpectedResponse),
                        });

                        let action = self
                            .distributes
                            .get_mut(&distribute_id)
                            .and_then(|distribute| distribute.on_token(node, token));

                        if let Some(action) = action {
                            self.spawn_distribute_action(distribute_id, action);
                        }
                    }
                    _ => {
                        let Some(distribute) = self.distributes.get_mut(&distribute_id) else {
                            return;
                        };

                        let target = *distribute.target();
                        let stored = outcome.is_ok();

                        distribute.on_put(node.clone(), outcome.map(|_| ()));

                        if stored {
                            self.record_holder(target, node);
                        }
                    }
                }
            }
            JobPurpose::Bootstrap => {
                if outcome.is_ok() && !self.bootstrap_search_running() {
                    let own_id = *self.id();
                    self.start_search(own_id, SearchKind::Nodes, SearchOwner::Bootstrap);
                }
            }
            JobPurpose::Maintenance => {}
        }
    }

    fn start_search(&mut self, target: Id, kind: SearchKind, owner: SearchOwner) -> SearchId {
        let id = SearchId(self.next_search);
        self.next_search += 1;

        let seeds = self.tables.nearest(&target, MAX_BUCKET_SIZE_K);
        let search = Search::new(id, *self.id(), target, kind, seeds, owner);

        self.searches.insert(id, search);

        id
    }

    fn bootstrap_search_running(&self) -> bool {
        self.searches
            .values()
            .any(|search| matches!(search.owner, SearchOwner::Bootstrap))
    }

    /// Send the next queries of every search and finish the done ones.
    fn drive_searches(&mut self) {
        let ids: Vec<SearchId> = self.searches.keys().copied().collect();

        for id in ids {
            let Some(search) = self.searches.get_mut(&id) else {
                continue;
            };

            let queries = search.next_queries();
            let target = search.target();
            let kind = search.kind();
            let done = search.is_done();

            for node in queries {
                let request = match kind {
                    SearchKind::Nodes => {
                        RequestTypeSpecific::FindNode(FindNodeRequestArguments { target })
                    }
                    SearchKind::Value => {
                        RequestTypeSpecific::Get(GetRequestArguments { target, seq: None })
                    }
                };

                self.spawn_job(
                    node.address(),
                    Some(*node.id()),
                    request,
                    JobPurpose::Search(id),
                );
            }

            if done {
                if let Some(search) = self.searches.remove(&id) {
                    self.finish_search(search);
                }
            }
        }
    }

    fn finish_search(&mut self, search: Search) {
        let (owner, result) = search.into_result();

        match owner {
            SearchOwner::User(callback) => callback(result),
            SearchOwner::Distribute(id) => {
                let holders = self
                    .holders
                    .get(&result.target)
                    .cloned()
                    .unwrap_or_default();

                let Some(distribute) = self.distributes.get_mut(&id) else {
                    return;
                };

                for action in distribute.on_search_done(result, &holders) {
                    self.spawn_distribute_action(id, action);
                }
            }
            SearchOwner::Refresh => {}
            SearchOwner::Bootstrap => {
                info!(
                    id = ?self.id(),
                    closest = result.closest.len(),
                    v4 = self.tables.get(AddressFamily::V4).size(),
                    v6 = self.tables.get(AddressFamily::V6).size(),
                    "Bootstrapped"
                );
            }
        }
    }

    fn spawn_distribute_action(&mut self, id: DistributeId, action: DistributeAction) {
        let Some(item) = self.distributes.get(&id).map(|d| d.item().clone()) else {
            return;
        };

        match action {
            DistributeAction::Put { node, token } => {
                self.spawn_job(
                    node.address(),
                    Some(*node.id()),
                    put_request(token, &item),
                    JobPurpose::Distribute(id),
                );
            }
            DistributeAction::Get { node } => {
                let request = RequestTypeSpecific::Get(GetRequestArguments {
                    target: *item.target(),
                    seq: None,
                });

                self.spawn_job(
                    node.address(),
                    Some(*node.id()),
                    request,
                    JobPurpose::Distribute(id),
                );
            }
        }
    }

    fn drive_distributes(&mut self) {
        let done: Vec<DistributeId> = self
            .distributes
            .iter()
            .filter(|(_, distribute)| distribute.is_done())
            .map(|(id, _)| *id)
            .collect();

        for id in done {
            if let Some(mut distribute) = self.distributes.remove(&id) {
                distribute.finish();
            }
        }
    }

    fn record_holder(&mut self, target: Id, node: Node) {
        match self.holders.get_mut(&target) {
            Some(holders) => {
                if holders.iter().any(|holder| holder.id() == node.id()) {
                    return;
                }

                if holders.len() >= MAX_HOLDERS_PER_TARGET {
                    holders.remove(0);
                }

                holders.push(node);
            }
            None => {
                self.holders.put(target, vec![node]);
            }
        }
    }

    /// Bucket refreshes, liveness pings, token pruning and bootstrapping.
    fn maintain(&mut self, now: Instant) {
        if self
            .last_prune
            .map_or(true, |last| now.saturating_duration_since(last) >= TOKEN_PRUNE_INTERVAL)
        {
            self.server.prune(now);
            self.last_prune = Some(now);
        }

        for family in [AddressFamily::V4, AddressFamily::V6] {
            let table = self.tables.get_mut(family);
            let decisions = table.tick(now);
            let populated = !table.is_empty();

            if populated {
                for target in decisions.refresh_targets {
                    self.start_search(target, SearchKind::Nodes, SearchOwner::Refresh);
                }
            }

            for node in decisions.nodes_to_ping {
                self.spawn_job(
                    node.address(),
                    Some(*node.id()),
                    RequestTypeSpecific::Ping,
                    JobPurpose::Maintenance,
                );
            }
        }

        let bootstrap_due = match self.last_bootstrap {
            None => true,
            Some(last) => {
                self.tables.is_empty() && now.saturating_duration_since(last) >= BOOTSTRAP_RETRY
            }
        };

        if bootstrap_due && !self.bootstrap.is_empty() {
            self.last_bootstrap = Some(now);

            debug!(nodes = self.bootstrap.len(), "Bootstrapping");

            let own_id = *self.id();

            for address in self.bootstrap.clone() {
                self.spawn_job(
                    address,
                    None,
                    RequestTypeSpecific::FindNode(FindNodeRequestArguments { target: own_id }),
                    JobPurpose::Bootstrap,
                );
            }
        }
    }
}

/// The `put` request storing `item`.
fn put_request(token: Vec<u8>, item: &StorageItem) -> RequestTypeSpecific {
    let put_request_type = match item {
        StorageItem::Immutable(item) => {
            PutRequestSpecific::PutImmutable(PutImmutableRequestArguments {
                target: *item.target(),
                v: item.value().clone(),
            })
        }
        StorageItem::Mutable(item) => PutRequestSpecific::PutMutable(PutMutableRequestArguments {
            target: *item.target(),
            v: item.value().clone(),
            k: item.key().to_vec(),
            seq: item.seq(),
            sig: item.signature().to_vec(),
            salt: item.salt().cloned(),
        }),
    };

    RequestTypeSpecific::Put(PutRequest {
        token,
        put_request_type,
    })
}
