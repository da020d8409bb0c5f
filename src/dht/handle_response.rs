use std::net::SocketAddr;
use std::time::Instant;

use tracing::{debug, trace};

use crate::common::{
    validate_immutable, FindNodeResponseArguments, GetImmutableResponseArguments,
    GetMutableResponseArguments, ImmutableItem, MessageType, MutableItem,
    NoValuesResponseArguments, Node, NodeQuality, RequestTypeSpecific, ResponseSpecific,
    StorageItem,
};
use crate::core::{FindNodeReply, GetReply, JobError, JobId, JobState, Reply};

use super::Dht;

impl Dht {
    /// Match an inbound response or error to the job waiting for it.
    ///
    /// Replies with an unknown transaction id, or from another address than
    /// the request went to, are dropped.
    pub(super) fn handle_response(
        &mut self,
        from: SocketAddr,
        transaction_id: u32,
        message_type: MessageType,
    ) {
        let Some(id) = self.transactions.get(&transaction_id).copied() else {
            trace!(?from, transaction_id, "Response to unknown transaction");
            return;
        };

        let Some(job) = self.jobs.get_mut(&id) else {
            self.transactions.remove(&transaction_id);
            return;
        };

        if job.destination != from
            || job.state != JobState::Responding
            || job.transaction_id != Some(transaction_id)
        {
            trace!(
                job = id.0,
                ?from,
                expected = ?job.destination,
                "Dropped response from unexpected address"
            );
            return;
        }

        self.transactions.remove(&transaction_id);
        job.matched(message_type);
    }

    /// Validate a matched reply, update the routing table and complete the job.
    pub(super) fn process_job(&mut self, id: JobId, now: Instant) {
        let Some(job) = self.jobs.get_mut(&id) else {
            return;
        };

        let destination = job.destination;

        if let Some(sent_at) = job.sent_at {
            let rtt = now.saturating_duration_since(sent_at);
            trace!(job = id.0, ?destination, ?rtt, "Matched reply");
        }

        let outcome = match job.response.take() {
            Some(MessageType::Response(response)) => validate_reply(&job.request, response),
            Some(MessageType::Error(error)) => Err(JobError::from_remote(error)),
            _ => Err(JobError::UnexpectedResponse),
        };

        let (outcome, nodes, responder) = match outcome {
            Ok((reply, nodes)) => {
                let responder = *reply.responder();
                (Ok(reply), nodes, Some(responder))
            }
            // An error reply is still a sign of life.
            Err(error @ JobError::Remote(_))
            | Err(error @ JobError::Storage(_))
            | Err(error @ JobError::Token(_)) => (Err(error), Vec::new(), job.node),
            Err(error) => (Err(error), Vec::new(), None),
        };

        if let Some(responder) = responder {
            if job.node.is_none() {
                job.node = Some(responder);
            }
        }

        job.complete(outcome);

        if let Some(responder) = responder {
            let table = self.tables.for_address(&destination);

            table.insert(
                Node::new(responder, destination)
                    .with_quality(NodeQuality::Good)
                    .with_last_seen(now),
                now,
            );
            table.mark_responded(&responder, now);
        }

        for node in nodes {
            let table = self.tables.for_address(&node.address());
            table.insert(node, now);
        }
    }
}

/// Check a response fits the request it answers.
///
/// Returns the reply and the nodes it told us about.
pub(super) fn validate_reply(
    request: &RequestTypeSpecific,
    response: ResponseSpecific,
) -> Result<(Reply, Vec<Node>), JobError> {
    let responder_id = match &response {
        ResponseSpecific::Ping(arguments) => arguments.responder_id,
        ResponseSpecific::FindNode(arguments) => arguments.responder_id,
        ResponseSpecific::GetImmutable(arguments) => arguments.responder_id,
        ResponseSpecific::GetMutable(arguments) => arguments.responder_id,
        ResponseSpecific::NoValues(arguments) => arguments.responder_id,
    };

    match (request, response) {
        (RequestTypeSpecific::Ping, _) => Ok((Reply::Ping(responder_id), Vec::new())),
        (RequestTypeSpecific::Put(_), _) => Ok((Reply::Put(responder_id), Vec::new())),
        (
            RequestTypeSpecific::FindNode(_),
            ResponseSpecific::FindNode(FindNodeResponseArguments {
                responder_id,
                nodes,
            }),
        ) => Ok((
            Reply::FindNode(FindNodeReply {
                responder: responder_id,
                nodes: nodes.clone(),
            }),
            nodes,
        )),
        (
            RequestTypeSpecific::Get(arguments),
            ResponseSpecific::GetImmutable(GetImmutableResponseArguments {
                responder_id,
                token,
                nodes,
                v,
            }),
        ) => {
            let value = if validate_immutable(&v, &arguments.target) {
                Some(StorageItem::Immutable(ImmutableItem::new(v)))
            } else {
                let target = arguments.target;
                debug!(?target, ?responder_id, "Invalid immutable value");
                None
            };

            Ok((
                Reply::Get(GetReply {
                    responder: responder_id,
                    token,
                    nodes: nodes.clone(),
                    value,
                }),
                nodes,
            ))
        }
        (
            RequestTypeSpecific::Get(arguments),
            ResponseSpecific::GetMutable(GetMutableResponseArguments {
                responder_id,
                token,
                nodes,
                v,
                k,
                seq,
                sig,
                salt,
            }),
        ) => {
            let value = match MutableItem::from_signed(&k, &sig, v, seq, salt) {
                Ok(item) if item.target() == &arguments.target => Some(StorageItem::Mutable(item)),
                Ok(item) => {
                    let target = arguments.target;
                    let got = item.target();
                    debug!(?target, ?got, ?responder_id, "Mutable item for another target");
                    None
                }
                Err(error) => {
                    let target = arguments.target;
                    debug!(?target, ?error, ?responder_id, "Invalid mutable value");
                    None
                }
            };

            Ok((
                Reply::Get(GetReply {
                    responder: responder_id,
                    token,
                    nodes: nodes.clone(),
                    value,
                }),
                nodes,
            ))
        }
        (
            RequestTypeSpecific::Get(_),
            ResponseSpecific::NoValues(NoValuesResponseArguments {
                responder_id,
                token,
                nodes,
            }),
        ) => Ok((
            Reply::Get(GetReply {
                responder: responder_id,
                token,
                nodes: nodes.clone(),
                value: None,
            }),
            nodes,
        )),
        _ => Err(JobError::UnexpectedResponse),
    }
}
