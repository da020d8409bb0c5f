//! Outstanding request state machine.
//!
//! A [Job] is one request to one node, from being handed to the transport
//! until its owner is notified of the outcome.

use std::{
    fmt::{self, Debug, Formatter},
    net::SocketAddr,
    time::{Duration, Instant},
};

use crate::common::{ErrorSpecific, Id, MessageType, Node, RequestTypeSpecific, StorageItem};
use crate::core::{DistributeId, SearchId, StorageError, TokenError};
use crate::transport::TransportError;

/// Default request timeout before retrying or abandoning a request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// Default number of times a request is sent before it times out.
pub const DEFAULT_MAX_ATTEMPTS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Handle of an outstanding request, ordered by creation.
pub struct JobId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting to be handed to the transport.
    Querying,
    /// Sent, waiting for a reply or the deadline.
    Responding,
    /// A matching reply arrived and awaits validation.
    Processing,
    /// Outcome known, the owner gets notified and the job purged.
    Completing,
}

#[derive(thiserror::Error, Debug)]
/// Why a request failed.
pub enum JobError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Token(#[from] TokenError),

    /// Any other error reply.
    #[error("Remote error {}: {}", .0.code, .0.description)]
    Remote(ErrorSpecific),

    /// The reply doesn't fit the request.
    #[error("Unexpected response")]
    UnexpectedResponse,
}

impl JobError {
    /// Map an error reply back to the local error it was produced from.
    pub fn from_remote(error: ErrorSpecific) -> Self {
        match error.code {
            201 => StorageError::Conflict.into(),
            203 if error.description == TokenError::TokenRequired.to_string() => {
                TokenError::TokenRequired.into()
            }
            203 => StorageError::TargetMismatch.into(),
            205 => StorageError::ValueTooLarge.into(),
            206 => StorageError::InvalidSignature.into(),
            207 => StorageError::SaltTooLarge.into(),
            209 => TokenError::TokenExpired.into(),
            302 => StorageError::Stale.into(),
            _ => JobError::Remote(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindNodeReply {
    pub responder: Id,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetReply {
    pub responder: Id,
    /// Write token for a later `put` of the same target from the same address.
    pub token: Vec<u8>,
    pub nodes: Vec<Node>,
    /// A value that passed validation, invalid ones are dropped.
    pub value: Option<StorageItem>,
}

#[derive(Debug, Clone, PartialEq)]
/// A validated reply, shaped after the request that produced it.
pub enum Reply {
    Ping(Id),
    FindNode(FindNodeReply),
    Get(GetReply),
    Put(Id),
}

impl Reply {
    pub fn responder(&self) -> &Id {
        match self {
            Reply::Ping(id) | Reply::Put(id) => id,
            Reply::FindNode(reply) => &reply.responder,
            Reply::Get(reply) => &reply.responder,
        }
    }
}

pub(crate) type JobCallback = Box<dyn FnOnce(Result<Reply, JobError>)>;

/// Who gets notified when a job completes.
pub(crate) enum JobPurpose {
    User(JobCallback),
    Search(SearchId),
    /// A `get` for a write token, or the `put` itself.
    Distribute(DistributeId),
    /// Liveness ping for a routing table node.
    Maintenance,
    /// `find_node` for our own id against a bootstrap address.
    Bootstrap,
}

impl Debug for JobPurpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            JobPurpose::User(_) => write!(f, "User"),
            JobPurpose::Search(id) => write!(f, "Search({})", id.0),
            JobPurpose::Distribute(id) => write!(f, "Distribute({})", id.0),
            JobPurpose::Maintenance => write!(f, "Maintenance"),
            JobPurpose::Bootstrap => write!(f, "Bootstrap"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Job {
    pub id: JobId,
    pub state: JobState,
    pub request: RequestTypeSpecific,
    pub destination: SocketAddr,
    /// Routing table entry to credit or blame, if known.
    pub node: Option<Id>,
    pub transaction_id: Option<u32>,
    pub sent_at: Option<Instant>,
    pub attempts: u8,
    pub deadline: Option<Instant>,
    pub purpose: JobPurpose,
    /// Matched reply, waiting to be processed.
    pub response: Option<MessageType>,
    pub outcome: Option<Result<Reply, JobError>>,
}

impl Job {
    pub fn new(
        id: JobId,
        destination: SocketAddr,
        node: Option<Id>,
        request: RequestTypeSpecific,
        purpose: JobPurpose,
    ) -> Self {
        Self {
            id,
            state: JobState::Querying,
            request,
            destination,
            node,
            transaction_id: None,
            sent_at: None,
            attempts: 0,
            deadline: None,
            purpose,
            response: None,
            outcome: None,
        }
    }

    /// Querying → Responding after a successful hand-off.
    pub fn sent(&mut self, transaction_id: u32, now: Instant, timeout: Duration) {
        self.transaction_id = Some(transaction_id);
        self.sent_at = Some(now);
        self.attempts = self.attempts.saturating_add(1);
        self.deadline = Some(now + timeout);
        self.state = JobState::Responding;
    }

    /// Whether a Responding job passed its deadline.
    pub fn expired(&self, now: Instant) -> bool {
        self.state == JobState::Responding && self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Responding → Querying, the next attempt gets a fresh transaction id.
    pub fn retry(&mut self) {
        self.transaction_id = None;
        self.deadline = None;
        self.state = JobState::Querying;
    }

    /// Responding → Processing with the matched reply.
    pub fn matched(&mut self, response: MessageType) {
        self.transaction_id = None;
        self.response = Some(response);
        self.state = JobState::Processing;
    }

    /// Jump to Completing, keeping the first outcome if there is one already.
    pub fn complete(&mut self, outcome: Result<Reply, JobError>) {
        if self.state == JobState::Completing {
            return;
        }

        self.outcome = Some(outcome);
        self.state = JobState::Completing;
    }
}
