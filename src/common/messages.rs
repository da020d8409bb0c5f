//! Serialize and deserialize KRPC messages.

mod internal;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;

use crate::common::{Id, Node, ID_SIZE};

/// Compact node info size for IPv4 nodes, `id ‖ ip ‖ port`.
pub const NODE4_SIZE: usize = ID_SIZE + 6;
/// Compact node info size for IPv6 nodes, `id ‖ ip ‖ port`.
pub const NODE6_SIZE: usize = ID_SIZE + 18;

#[derive(Debug, PartialEq, Clone)]
pub struct Message {
    pub transaction_id: u32,

    /// The version of the requester or responder.
    pub version: Option<Vec<u8>>,

    pub message_type: MessageType,
}

#[derive(Debug, PartialEq, Clone)]
pub enum MessageType {
    Request(RequestSpecific),

    Response(ResponseSpecific),

    Error(ErrorSpecific),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ErrorSpecific {
    pub code: i32,
    pub description: String,
}

#[derive(Debug, PartialEq, Clone)]
pub struct RequestSpecific {
    pub requester_id: Id,
    pub request_type: RequestTypeSpecific,
}

#[derive(Debug, PartialEq, Clone)]
pub enum RequestTypeSpecific {
    Ping,
    FindNode(FindNodeRequestArguments),
    Get(GetRequestArguments),
    Put(PutRequest),
}

#[derive(Debug, PartialEq, Clone)]
pub struct PutRequest {
    pub token: Vec<u8>,
    pub put_request_type: PutRequestSpecific,
}

#[derive(Debug, PartialEq, Clone)]
pub enum PutRequestSpecific {
    PutImmutable(PutImmutableRequestArguments),
    PutMutable(PutMutableRequestArguments),
}

#[derive(Debug, PartialEq, Clone)]
pub enum ResponseSpecific {
    Ping(PingResponseArguments),
    FindNode(FindNodeResponseArguments),
    GetImmutable(GetImmutableResponseArguments),
    GetMutable(GetMutableResponseArguments),
    NoValues(NoValuesResponseArguments),
}

// === PING ===

#[derive(Debug, PartialEq, Clone)]
pub struct PingResponseArguments {
    pub responder_id: Id,
}

// === FIND_NODE ===

#[derive(Debug, PartialEq, Clone)]
pub struct FindNodeRequestArguments {
    pub target: Id,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FindNodeResponseArguments {
    pub responder_id: Id,
    pub nodes: Vec<Node>,
}

// === GET ===

#[derive(Debug, PartialEq, Clone)]
pub struct GetRequestArguments {
    pub target: Id,
    /// Only return mutable items more recent than this.
    pub seq: Option<i64>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct NoValuesResponseArguments {
    pub responder_id: Id,
    pub token: Vec<u8>,
    pub nodes: Vec<Node>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct GetImmutableResponseArguments {
    pub responder_id: Id,
    pub token: Vec<u8>,
    pub nodes: Vec<Node>,
    pub v: Bytes,
}

#[derive(Debug, PartialEq, Clone)]
pub struct GetMutableResponseArguments {
    pub responder_id: Id,
    pub token: Vec<u8>,
    pub nodes: Vec<Node>,
    pub v: Bytes,
    pub k: Vec<u8>,
    pub seq: i64,
    pub sig: Vec<u8>,
    pub salt: Option<Bytes>,
}

// === PUT ===

#[derive(Debug, PartialEq, Clone)]
pub struct PutImmutableRequestArguments {
    pub target: Id,
    pub v: Bytes,
}

#[derive(Debug, PartialEq, Clone)]
pub struct PutMutableRequestArguments {
    pub target: Id,
    pub v: Bytes,
    pub k: Vec<u8>,
    pub seq: i64,
    pub sig: Vec<u8>,
    pub salt: Option<Bytes>,
}

impl PutRequestSpecific {
    pub fn target(&self) -> &Id {
        match self {
            PutRequestSpecific::PutImmutable(arguments) => &arguments.target,
            PutRequestSpecific::PutMutable(arguments) => &arguments.target,
        }
    }
}

impl Message {
    fn into_serde_message(self) -> internal::KrpcMessage {
        internal::KrpcMessage {
            transaction_id: self.transaction_id.to_be_bytes().to_vec(),
            version: self.version,
            variant: match self.message_type {
                MessageType::Request(RequestSpecific {
                    requester_id,
                    request_type,
                }) => internal::KrpcMessageVariant::Request(match request_type {
                    RequestTypeSpecific::Ping => internal::KrpcRequestSpecific::Ping {
                        arguments: internal::KrpcPingArguments {
                            id: requester_id.to_vec(),
                        },
                    },
                    RequestTypeSpecific::FindNode(arguments) => {
                        internal::KrpcRequestSpecific::FindNode {
                            arguments: internal::KrpcFindNodeRequestArguments {
                                id: requester_id.to_vec(),
                                target: arguments.target.to_vec(),
                            },
                        }
                    }
                    RequestTypeSpecific::Get(arguments) => internal::KrpcRequestSpecific::Get {
                        arguments: internal::KrpcGetRequestArguments {
                            id: requester_id.to_vec(),
                            target: arguments.target.to_vec(),
                            seq: arguments.seq,
                        },
                    },
                    RequestTypeSpecific::Put(PutRequest {
                        token,
                        put_request_type,
                    }) => internal::KrpcRequestSpecific::Put {
                        arguments: match put_request_type {
                            PutRequestSpecific::PutImmutable(arguments) => {
                                internal::KrpcPutRequestArguments {
                                    id: requester_id.to_vec(),
                                    target: arguments.target.to_vec(),
                                    token,
                                    v: arguments.v,
                                    k: None,
                                    sig: None,
                                    seq: None,
                                    salt: None,
                                }
                            }
                            PutRequestSpecific::PutMutable(arguments) => {
                                internal::KrpcPutRequestArguments {
                                    id: requester_id.to_vec(),
                                    target: arguments.target.to_vec(),
                                    token,
                                    v: arguments.v,
                                    k: Some(arguments.k),
                                    sig: Some(arguments.sig),
                                    seq: Some(arguments.seq),
                                    salt: arguments.salt,
                                }
                            }
                        },
                    },
                }),

                MessageType::Response(response) => {
                    internal::KrpcMessageVariant::Response(match response {
                        ResponseSpecific::Ping(arguments) => internal::KrpcResponseSpecific::Ping {
                            arguments: internal::KrpcPingArguments {
                                id: arguments.responder_id.to_vec(),
                            },
                        },
                        ResponseSpecific::FindNode(arguments) => {
                            let (nodes, nodes6) = split_nodes(&arguments.nodes);

                            internal::KrpcResponseSpecific::FindNode {
                                arguments: internal::KrpcFindNodeResponseArguments {
                                    id: arguments.responder_id.to_vec(),
                                    // Always present, so the reply never reads as a ping.
                                    nodes: nodes.unwrap_or_default(),
                                    nodes6,
                                },
                            }
                        }
                        ResponseSpecific::NoValues(arguments) => {
                            let (nodes, nodes6) = split_nodes(&arguments.nodes);

                            internal::KrpcResponseSpecific::NoValues {
                                arguments: internal::KrpcNoValuesResponseArguments {
                                    id: arguments.responder_id.to_vec(),
                                    token: arguments.token,
                                    nodes,
                                    nodes6,
                                },
                            }
                        }
                        ResponseSpecific::GetImmutable(arguments) => {
                            let (nodes, nodes6) = split_nodes(&arguments.nodes);

                            internal::KrpcResponseSpecific::GetImmutable {
                                arguments: internal::KrpcGetImmutableResponseArguments {
                                    id: arguments.responder_id.to_vec(),
                                    token: arguments.token,
                                    nodes,
                                    nodes6,
                                    v: arguments.v,
                                },
                            }
                        }
                        ResponseSpecific::GetMutable(arguments) => {
                            let (nodes, nodes6) = split_nodes(&arguments.nodes);

                            internal::KrpcResponseSpecific::GetMutable {
                                arguments: internal::KrpcGetMutableResponseArguments {
                                    id: arguments.responder_id.to_vec(),
                                    token: arguments.token,
                                    nodes,
                                    nodes6,
                                    v: arguments.v,
                                    k: arguments.k,
                                    sig: arguments.sig,
                                    seq: arguments.seq,
                                    salt: arguments.salt,
                                },
                            }
                        }
                    })
                }

                MessageType::Error(err) => {
                    internal::KrpcMessageVariant::Error(internal::KrpcErrorSpecific {
                        error_info: (err.code, err.description),
                    })
                }
            },
        }
    }

    fn from_serde_message(msg: internal::KrpcMessage) -> Result<Message, DecodeError> {
        Ok(Message {
            transaction_id: transaction_id(&msg.transaction_id)?,
            version: msg.version,
            message_type: match msg.variant {
                internal::KrpcMessageVariant::Request(request) => {
                    MessageType::Request(match request {
                        internal::KrpcRequestSpecific::Ping { arguments } => RequestSpecific {
                            requester_id: Id::from_bytes(arguments.id)?,
                            request_type: RequestTypeSpecific::Ping,
                        },
                        internal::KrpcRequestSpecific::FindNode { arguments } => RequestSpecific {
                            requester_id: Id::from_bytes(arguments.id)?,
                            request_type: RequestTypeSpecific::FindNode(FindNodeRequestArguments {
                                target: Id::from_bytes(arguments.target)?,
                            }),
                        },
                        internal::KrpcRequestSpecific::Get { arguments } => RequestSpecific {
                            requester_id: Id::from_bytes(arguments.id)?,
                            request_type: RequestTypeSpecific::Get(GetRequestArguments {
                                target: Id::from_bytes(arguments.target)?,
                                seq: arguments.seq,
                            }),
                        },
                        internal::KrpcRequestSpecific::Put { arguments } => {
                            let put_request_type = match arguments.k {
                                Some(k) => {
                                    PutRequestSpecific::PutMutable(PutMutableRequestArguments {
                                        target: Id::from_bytes(arguments.target)?,
                                        v: arguments.v,
                                        k,
                                        seq: arguments.seq.ok_or(DecodeError::MissingField("seq"))?,
                                        sig: arguments.sig.ok_or(DecodeError::MissingField("sig"))?,
                                        salt: arguments.salt,
                                    })
                                }
                                None => {
                                    PutRequestSpecific::PutImmutable(PutImmutableRequestArguments {
                                        target: Id::from_bytes(arguments.target)?,
                                        v: arguments.v,
                                    })
                                }
                            };

                            RequestSpecific {
                                requester_id: Id::from_bytes(arguments.id)?,
                                request_type: RequestTypeSpecific::Put(PutRequest {
                                    token: arguments.token,
                                    put_request_type,
                                }),
                            }
                        }
                    })
                }

                internal::KrpcMessageVariant::Response(response) => {
                    MessageType::Response(match response {
                        internal::KrpcResponseSpecific::Ping { arguments } => {
                            ResponseSpecific::Ping(PingResponseArguments {
                                responder_id: Id::from_bytes(arguments.id)?,
                            })
                        }
                        internal::KrpcResponseSpecific::FindNode { arguments } => {
                            ResponseSpecific::FindNode(FindNodeResponseArguments {
                                responder_id: Id::from_bytes(arguments.id)?,
                                nodes: join_nodes(Some(arguments.nodes), arguments.nodes6)?,
                            })
                        }
                        internal::KrpcResponseSpecific::NoValues { arguments } => {
                            ResponseSpecific::NoValues(NoValuesResponseArguments {
                                responder_id: Id::from_bytes(arguments.id)?,
                                token: arguments.token,
                                nodes: join_nodes(arguments.nodes, arguments.nodes6)?,
                            })
                        }
                        internal::KrpcResponseSpecific::GetImmutable { arguments } => {
                            ResponseSpecific::GetImmutable(GetImmutableResponseArguments {
                                responder_id: Id::from_bytes(arguments.id)?,
                                token: arguments.token,
                                nodes: join_nodes(arguments.nodes, arguments.nodes6)?,
                                v: arguments.v,
                            })
                        }
                        internal::KrpcResponseSpecific::GetMutable { arguments } => {
                            ResponseSpecific::GetMutable(GetMutableResponseArguments {
                                responder_id: Id::from_bytes(arguments.id)?,
                                token: arguments.token,
                                nodes: join_nodes(arguments.nodes, arguments.nodes6)?,
                                v: arguments.v,
                                k: arguments.k,
                                seq: arguments.seq,
                                sig: arguments.sig,
                                salt: arguments.salt,
                            })
                        }
                    })
                }

                internal::KrpcMessageVariant::Error(err) => MessageType::Error(ErrorSpecific {
                    code: err.error_info.0,
                    description: err.error_info.1,
                }),
            },
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        self.clone().into_serde_message().to_bytes()
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Message, DecodeError> {
        Message::from_serde_message(internal::KrpcMessage::from_bytes(bytes.as_ref())?)
    }
}

#[cfg(test)]
impl Message {
    /// Return the Id of the sender of the Message, error messages carry none.
    pub fn get_author_id(&self) -> Option<Id> {
        let id = match &self.message_type {
            MessageType::Request(arguments) => arguments.requester_id,
            MessageType::Response(response) => match response {
                ResponseSpecific::Ping(arguments) => arguments.responder_id,
                ResponseSpecific::FindNode(arguments) => arguments.responder_id,
                ResponseSpecific::GetImmutable(arguments) => arguments.responder_id,
                ResponseSpecific::GetMutable(arguments) => arguments.responder_id,
                ResponseSpecific::NoValues(arguments) => arguments.responder_id,
            },
            MessageType::Error(_) => {
                return None;
            }
        };

        Some(id)
    }

    /// Nodes closer to the target carried by a response.
    pub fn get_closer_nodes(&self) -> Option<&[Node]> {
        match &self.message_type {
            MessageType::Response(response) => match response {
                ResponseSpecific::Ping(_) => None,
                ResponseSpecific::FindNode(arguments) => Some(&arguments.nodes),
                ResponseSpecific::GetImmutable(arguments) => Some(&arguments.nodes),
                ResponseSpecific::GetMutable(arguments) => Some(&arguments.nodes),
                ResponseSpecific::NoValues(arguments) => Some(&arguments.nodes),
            },
            _ => None,
        }
    }

    /// Write token carried by a `get` response.
    pub fn get_token(&self) -> Option<&[u8]> {
        match &self.message_type {
            MessageType::Response(response) => match response {
                ResponseSpecific::Ping(_) | ResponseSpecific::FindNode(_) => None,
                ResponseSpecific::GetImmutable(arguments) => Some(&arguments.token),
                ResponseSpecific::GetMutable(arguments) => Some(&arguments.token),
                ResponseSpecific::NoValues(arguments) => Some(&arguments.token),
            },
            _ => None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
/// Why an incoming datagram could not be decoded.
pub enum DecodeError {
    #[error(transparent)]
    Bencode(#[from] serde_bencode::Error),

    #[error("Invalid transaction id {0:?}")]
    InvalidTransactionId(Vec<u8>),

    #[error(transparent)]
    InvalidId(#[from] crate::Error),

    #[error("Compact nodes of {size} bytes is not a multiple of {node_size}")]
    InvalidNodesSize { size: usize, node_size: usize },

    #[error("Missing field {0}")]
    MissingField(&'static str),
}

/// Transaction ids are up to 4 bytes, read as a big-endian integer.
pub fn transaction_id(bytes: &[u8]) -> Result<u32, DecodeError> {
    if bytes.is_empty() || bytes.len() > 4 {
        return Err(DecodeError::InvalidTransactionId(bytes.to_vec()));
    }

    Ok(bytes
        .iter()
        .fold(0_u32, |id, byte| (id << 8) | *byte as u32))
}

fn sockaddr_to_bytes(sockaddr: &SocketAddr) -> Vec<u8> {
    let mut bytes = match sockaddr.ip() {
        IpAddr::V4(ip) => ip.octets().to_vec(),
        IpAddr::V6(ip) => ip.octets().to_vec(),
    };

    bytes.extend(sockaddr.port().to_be_bytes());

    bytes
}

fn bytes_to_sockaddr(bytes: &[u8]) -> SocketAddr {
    let (ip, port) = bytes.split_at(bytes.len() - 2);
    let port = u16::from_be_bytes([port[0], port[1]]);

    let ip = match <[u8; 4]>::try_from(ip) {
        Ok(octets) => IpAddr::V4(Ipv4Addr::from(octets)),
        Err(_) => {
            let mut octets = [0_u8; 16];
            octets.copy_from_slice(ip);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    };

    SocketAddr::new(ip, port)
}

fn nodes_to_bytes<'a>(nodes: impl Iterator<Item = &'a Node>, node_size: usize) -> Vec<u8> {
    let mut bytes = Vec::new();

    for node in nodes {
        bytes.reserve(node_size);
        bytes.extend_from_slice(node.id().as_bytes());
        bytes.extend(sockaddr_to_bytes(&node.address()));
    }

    bytes
}

fn bytes_to_nodes(bytes: &[u8], node_size: usize) -> Result<Vec<Node>, DecodeError> {
    if bytes.len() % node_size != 0 {
        return Err(DecodeError::InvalidNodesSize {
            size: bytes.len(),
            node_size,
        });
    }

    bytes
        .chunks_exact(node_size)
        .map(|chunk| {
            let id = Id::from_bytes(&chunk[..ID_SIZE])?;
            Ok(Node::new(id, bytes_to_sockaddr(&chunk[ID_SIZE..])))
        })
        .collect()
}

/// Split nodes into the compact `nodes` and `nodes6` strings, `None` when empty.
fn split_nodes(nodes: &[Node]) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
    let nodes4 = nodes_to_bytes(
        nodes.iter().filter(|node| node.address().is_ipv4()),
        NODE4_SIZE,
    );
    let nodes6 = nodes_to_bytes(
        nodes.iter().filter(|node| node.address().is_ipv6()),
        NODE6_SIZE,
    );

    (
        (!nodes4.is_empty()).then_some(nodes4),
        (!nodes6.is_empty()).then_some(nodes6),
    )
}

fn join_nodes(
    nodes: Option<Vec<u8>>,
    nodes6: Option<Vec<u8>>,
) -> Result<Vec<Node>, DecodeError> {
    let mut all = match nodes {
        Some(bytes) => bytes_to_nodes(&bytes, NODE4_SIZE)?,
        None => Vec::new(),
    };

    if let Some(bytes) = nodes6 {
        all.extend(bytes_to_nodes(&bytes, NODE6_SIZE)?);
    }

    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: &Message) -> Message {
        Message::from_bytes(message.to_bytes().unwrap()).unwrap()
    }

    fn addresses(nodes: Option<&[Node]>) -> Option<Vec<(Id, SocketAddr)>> {
        nodes.map(|nodes| nodes.iter().map(|n| (*n.id(), n.address())).collect())
    }

    #[test]
    fn test_transaction_id() {
        assert_eq!(transaction_id(&[255]).unwrap(), 255);
        assert_eq!(transaction_id(&[1, 2]).unwrap(), 258);
        assert_eq!(transaction_id(&[0, 0, 1, 2]).unwrap(), 258);
        assert!(transaction_id(&[]).is_err());
        assert!(transaction_id(&[1, 2, 3, 4, 5]).is_err());
    }

    #[test]
    fn test_ping_request_bytes() {
        let requester_id = Id::from_bytes([b'a'; 20]).unwrap();

        let message = Message {
            transaction_id: 0x61616161,
            version: None,
            message_type: MessageType::Request(RequestSpecific {
                requester_id,
                request_type: RequestTypeSpecific::Ping,
            }),
        };

        let bytes = message.to_bytes().unwrap();

        assert_eq!(
            bytes,
            b"d1:ad2:id20:aaaaaaaaaaaaaaaaaaaae1:q4:ping1:t4:aaaa1:y1:qe".to_vec()
        );
        assert_eq!(Message::from_bytes(bytes).unwrap(), message);
    }

    #[test]
    fn test_ping_response() {
        let message = Message {
            transaction_id: 258,
            version: Some(vec![0xde, 0xad]),
            message_type: MessageType::Response(ResponseSpecific::Ping(PingResponseArguments {
                responder_id: Id::random(),
            })),
        };

        assert_eq!(roundtrip(&message), message);
    }

    #[test]
    fn test_find_node_response_both_families() {
        let message = Message {
            transaction_id: 7,
            version: None,
            message_type: MessageType::Response(ResponseSpecific::FindNode(
                FindNodeResponseArguments {
                    responder_id: Id::random(),
                    nodes: vec![
                        Node::new(Id::random(), "49.50.52.52:5354".parse().unwrap()),
                        Node::new(Id::random(), "[2001:db8::1]:6881".parse().unwrap()),
                    ],
                },
            )),
        };

        let parsed = roundtrip(&message);

        assert_eq!(parsed.get_author_id(), message.get_author_id());
        assert_eq!(
            addresses(parsed.get_closer_nodes()),
            addresses(message.get_closer_nodes())
        );
    }

    #[test]
    fn test_empty_find_node_response_is_not_a_ping() {
        let message = Message {
            transaction_id: 7,
            version: None,
            message_type: MessageType::Response(ResponseSpecific::FindNode(
                FindNodeResponseArguments {
                    responder_id: Id::random(),
                    nodes: vec![],
                },
            )),
        };

        assert_eq!(roundtrip(&message), message);
    }

    #[test]
    fn test_get_responses() {
        let no_values = Message {
            transaction_id: 1,
            version: None,
            message_type: MessageType::Response(ResponseSpecific::NoValues(
                NoValuesResponseArguments {
                    responder_id: Id::random(),
                    token: vec![1, 2, 3, 4],
                    nodes: vec![Node::new(Id::random(), "1.2.3.4:5".parse().unwrap())],
                },
            )),
        };

        let parsed = roundtrip(&no_values);
        assert_eq!(parsed.get_token(), Some(&[1, 2, 3, 4][..]));

        let immutable = Message {
            transaction_id: 2,
            version: None,
            message_type: MessageType::Response(ResponseSpecific::GetImmutable(
                GetImmutableResponseArguments {
                    responder_id: Id::random(),
                    token: vec![9; 4],
                    nodes: vec![],
                    v: Bytes::from_static(b"hello"),
                },
            )),
        };

        assert_eq!(roundtrip(&immutable), immutable);

        let mutable = Message {
            transaction_id: 3,
            version: None,
            message_type: MessageType::Response(ResponseSpecific::GetMutable(
                GetMutableResponseArguments {
                    responder_id: Id::random(),
                    token: vec![9; 4],
                    nodes: vec![],
                    v: Bytes::from_static(b"hello"),
                    k: vec![3; 32],
                    seq: 4,
                    sig: vec![5; 64],
                    salt: Some(Bytes::from_static(b"salt")),
                },
            )),
        };

        assert_eq!(roundtrip(&mutable), mutable);
    }

    #[test]
    fn test_put_requests() {
        let immutable = Message {
            transaction_id: 10,
            version: None,
            message_type: MessageType::Request(RequestSpecific {
                requester_id: Id::random(),
                request_type: RequestTypeSpecific::Put(PutRequest {
                    token: vec![1, 2, 3, 4],
                    put_request_type: PutRequestSpecific::PutImmutable(
                        PutImmutableRequestArguments {
                            target: Id::random(),
                            v: Bytes::from_static(b"value"),
                        },
                    ),
                }),
            }),
        };

        assert_eq!(roundtrip(&immutable), immutable);

        let mutable = Message {
            transaction_id: 11,
            version: None,
            message_type: MessageType::Request(RequestSpecific {
                requester_id: Id::random(),
                request_type: RequestTypeSpecific::Put(PutRequest {
                    token: vec![1, 2, 3, 4],
                    put_request_type: PutRequestSpecific::PutMutable(PutMutableRequestArguments {
                        target: Id::random(),
                        v: Bytes::from_static(b"value"),
                        k: vec![1; 32],
                        seq: 2,
                        sig: vec![3; 64],
                        salt: None,
                    }),
                }),
            }),
        };

        assert_eq!(roundtrip(&mutable), mutable);
    }

    #[test]
    fn test_error_message() {
        let message = Message {
            transaction_id: 12,
            version: None,
            message_type: MessageType::Error(ErrorSpecific {
                code: 302,
                description: "sequence number less than current".to_string(),
            }),
        };

        let parsed = roundtrip(&message);

        assert_eq!(parsed, message);
        assert_eq!(parsed.get_author_id(), None);
    }

    #[test]
    fn test_malformed() {
        assert!(Message::from_bytes(b"not bencode").is_err());
        assert!(Message::from_bytes(b"d1:t0:1:y1:qe").is_err());

        // Compact nodes of the wrong size.
        let bytes = b"d1:rd2:id20:aaaaaaaaaaaaaaaaaaaa5:nodes3:abce1:t4:aaaa1:y1:re";
        assert!(matches!(
            Message::from_bytes(bytes),
            Err(DecodeError::InvalidNodesSize { .. })
        ));
    }
}
