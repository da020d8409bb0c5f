//! Answers incoming requests from the local routing tables and storage.
//!
//! Supports the [BEP_0005](https://www.bittorrent.org/beps/bep_0005.html) `ping` and `find_node`
//! queries and the [BEP_0044](https://www.bittorrent.org/beps/bep_0044.html) `get` and `put` queries.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::common::{
    hash_immutable, ErrorSpecific, FindNodeRequestArguments, FindNodeResponseArguments,
    GetImmutableResponseArguments, GetMutableResponseArguments, GetRequestArguments, Id,
    MutableItem, NoValuesResponseArguments, PingResponseArguments, PutImmutableRequestArguments,
    PutMutableRequestArguments, PutRequest, PutRequestSpecific, RequestTypeSpecific,
    ResponseSpecific, RoutingTables, StorageItem, MAX_BUCKET_SIZE_K,
};
use crate::core::{check_limits, Storage, StorageError, StoreOutcome, TokenError, Tokens};

#[derive(Debug, Default)]
/// Request handler owning the write tokens and the local store.
pub struct Server {
    tokens: Tokens,
    storage: Storage,
}

impl Server {
    pub fn new(token_ttl: Duration, max_values: usize) -> Self {
        Self {
            tokens: Tokens::new(token_ttl),
            storage: Storage::new(max_values),
        }
    }

    // === Getters ===

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut Storage {
        &mut self.storage
    }

    pub fn tokens(&self) -> &Tokens {
        &self.tokens
    }

    // === Public Methods ===

    /// Returns a response or an error to send back to the requester.
    pub fn handle_request(
        &mut self,
        tables: &RoutingTables,
        from: SocketAddr,
        request: RequestTypeSpecific,
        now: Instant,
    ) -> Result<ResponseSpecific, ErrorSpecific> {
        let responder_id = *tables.id();

        Ok(match request {
            RequestTypeSpecific::Ping => {
                ResponseSpecific::Ping(PingResponseArguments { responder_id })
            }
            RequestTypeSpecific::FindNode(FindNodeRequestArguments { target }) => {
                ResponseSpecific::FindNode(FindNodeResponseArguments {
                    responder_id,
                    nodes: tables.nearest(&target, MAX_BUCKET_SIZE_K),
                })
            }
            RequestTypeSpecific::Get(GetRequestArguments { target, seq }) => {
                self.handle_get(tables, from, target, seq, now)
            }
            RequestTypeSpecific::Put(put) => {
                self.handle_put(from, put, now)?;

                ResponseSpecific::Ping(PingResponseArguments { responder_id })
            }
        })
    }

    /// Forget expired tokens.
    pub fn prune(&mut self, now: Instant) {
        self.tokens.prune(now);
    }

    // === Private Methods ===

    fn handle_get(
        &mut self,
        tables: &RoutingTables,
        from: SocketAddr,
        target: Id,
        seq: Option<i64>,
        now: Instant,
    ) -> ResponseSpecific {
        let responder_id = *tables.id();
        let token = self.tokens.issue(from, &target, now).to_vec();
        let nodes = tables.nearest(&target, MAX_BUCKET_SIZE_K);

        match self.storage.lookup(&target) {
            Some(StorageItem::Immutable(item)) => {
                ResponseSpecific::GetImmutable(GetImmutableResponseArguments {
                    responder_id,
                    token,
                    nodes,
                    v: item.value().clone(),
                })
            }
            Some(StorageItem::Mutable(item)) if seq.map_or(true, |seq| item.seq() > seq) => {
                ResponseSpecific::GetMutable(GetMutableResponseArguments {
                    responder_id,
                    token,
                    nodes,
                    v: item.value().clone(),
                    k: item.key().to_vec(),
                    seq: item.seq(),
                    sig: item.signature().to_vec(),
                    salt: item.salt().cloned(),
                })
            }
            _ => ResponseSpecific::NoValues(NoValuesResponseArguments {
                responder_id,
                token,
                nodes,
            }),
        }
    }

    fn handle_put(
        &mut self,
        from: SocketAddr,
        put: PutRequest,
        now: Instant,
    ) -> Result<StoreOutcome, ErrorSpecific> {
        let PutRequest {
            token,
            put_request_type,
        } = put;

        let item = item_from_put(put_request_type).map_err(storage_error)?;
        let target = *item.target();

        self.tokens
            .validate(&token, from, &target, now)
            .map_err(token_error)?;

        let outcome = self.storage.insert(item).map_err(|error| {
            debug!(?target, ?from, ?error, "Rejected put");
            storage_error(error)
        })?;

        self.tokens
            .redeem(&token, from, &target, now)
            .map_err(token_error)?;

        debug!(?target, ?from, ?outcome, "Accepted put");

        Ok(outcome)
    }
}

/// Rebuild the item a `put` carries and check it belongs to the claimed target.
fn item_from_put(put: PutRequestSpecific) -> Result<StorageItem, StorageError> {
    let item: StorageItem = match put {
        PutRequestSpecific::PutImmutable(PutImmutableRequestArguments { target, v }) => {
            if hash_immutable(&v) != target {
                return Err(StorageError::TargetMismatch);
            }

            StorageItem::immutable(v)
        }
        PutRequestSpecific::PutMutable(PutMutableRequestArguments {
            target,
            v,
            k,
            seq,
            sig,
            salt,
        }) => {
            let key: [u8; 32] = k
                .as_slice()
                .try_into()
                .map_err(|_| StorageError::InvalidSignature)?;
            let signature: [u8; 64] = sig
                .as_slice()
                .try_into()
                .map_err(|_| StorageError::InvalidSignature)?;

            let item = MutableItem::new_signed_unchecked(key, signature, v, seq, salt);

            if item.target() != &target {
                return Err(StorageError::TargetMismatch);
            }

            item.into()
        }
    };

    check_limits(&item)?;

    Ok(item)
}

fn storage_error(error: StorageError) -> ErrorSpecific {
    ErrorSpecific {
        code: error.code(),
        description: error.to_string(),
    }
}

fn token_error(error: TokenError) -> ErrorSpecific {
    ErrorSpecific {
        code: error.code(),
        description: error.to_string(),
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use ed25519_dalek::SigningKey;

    use super::*;
    use crate::common::{AddressFamily, Node};

    fn requester() -> SocketAddr {
        "127.0.0.1:7000".parse().unwrap()
    }

    fn get(
        server: &mut Server,
        tables: &RoutingTables,
        target: Id,
        now: Instant,
    ) -> ResponseSpecific {
        server
            .handle_request(
                tables,
                requester(),
                RequestTypeSpecific::Get(GetRequestArguments { target, seq: None }),
                now,
            )
            .unwrap()
    }

    fn token_of(response: &ResponseSpecific) -> Vec<u8> {
        match response {
            ResponseSpecific::NoValues(arguments) => arguments.token.clone(),
            ResponseSpecific::GetImmutable(arguments) => arguments.token.clone(),
            ResponseSpecific::GetMutable(arguments) => arguments.token.clone(),
            _ => panic!("not a get response"),
        }
    }

    fn put_immutable(token: Vec<u8>, value: &'static [u8]) -> RequestTypeSpecific {
        RequestTypeSpecific::Put(PutRequest {
            token,
            put_request_type: PutRequestSpecific::PutImmutable(PutImmutableRequestArguments {
                target: hash_immutable(value),
                v: Bytes::from_static(value),
            }),
        })
    }

    fn put_mutable(token: Vec<u8>, item: &MutableItem) -> RequestTypeSpecific {
        RequestTypeSpecific::Put(PutRequest {
            token,
            put_request_type: PutRequestSpecific::PutMutable(PutMutableRequestArguments {
                target: *item.target(),
                v: item.value().clone(),
                k: item.key().to_vec(),
                seq: item.seq(),
                sig: item.signature().to_vec(),
                salt: item.salt().cloned(),
            }),
        })
    }

    #[test]
    fn find_node_returns_nearest() {
        let mut server = Server::default();
        let mut tables = RoutingTables::new(Id::random());
        let now = Instant::now();

        let node = Node::random();
        tables.get_mut(AddressFamily::V4).insert(node.clone(), now);

        let response = server
            .handle_request(
                &tables,
                requester(),
                RequestTypeSpecific::FindNode(FindNodeRequestArguments { target: Id::random() }),
                now,
            )
            .unwrap();

        assert_eq!(
            response,
            ResponseSpecific::FindNode(FindNodeResponseArguments {
                responder_id: *tables.id(),
                nodes: vec![node],
            })
        );
    }

    #[test]
    fn put_requires_a_token() {
        let mut server = Server::default();
        let tables = RoutingTables::new(Id::random());
        let now = Instant::now();

        let error = server
            .handle_request(&tables, requester(), put_immutable(vec![0; 4], b"hello"), now)
            .unwrap_err();

        assert_eq!(error.code, 203);
        assert_eq!(error.description, TokenError::TokenRequired.to_string());
    }

    #[test]
    fn token_is_single_use() {
        let mut server = Server::default();
        let tables = RoutingTables::new(Id::random());
        let now = Instant::now();

        let token = token_of(&get(&mut server, &tables, hash_immutable(b"hello"), now));

        assert!(server
            .handle_request(&tables, requester(), put_immutable(token.clone(), b"hello"), now)
            .is_ok());
        assert!(server
            .handle_request(&tables, requester(), put_immutable(token, b"hello"), now)
            .is_err());

        assert!(matches!(
            get(&mut server, &tables, hash_immutable(b"hello"), now),
            ResponseSpecific::GetImmutable(GetImmutableResponseArguments { v, .. }) if v == Bytes::from_static(b"hello")
        ));
    }

    #[test]
    fn expired_token() {
        let mut server = Server::default();
        let tables = RoutingTables::new(Id::random());
        let now = Instant::now();

        let token = token_of(&get(&mut server, &tables, hash_immutable(b"hello"), now));

        let later = now + server.tokens().ttl() + Duration::from_secs(1);
        let error = server
            .handle_request(&tables, requester(), put_immutable(token, b"hello"), later)
            .unwrap_err();

        assert_eq!(error.code, 209);
    }

    #[test]
    fn rejected_put_keeps_the_token() {
        let mut server = Server::default();
        let tables = RoutingTables::new(Id::random());
        let now = Instant::now();

        let signer = SigningKey::from_bytes(&rand::random());
        let newer = MutableItem::new(&signer, &b"newer"[..], 2, None);
        let older = MutableItem::new(&signer, &b"older"[..], 1, None);

        server.storage_mut().insert(newer.clone().into()).unwrap();

        let token = token_of(&get(&mut server, &tables, *older.target(), now));

        let error = server
            .handle_request(&tables, requester(), put_mutable(token.clone(), &older), now)
            .unwrap_err();
        assert_eq!(error.code, 302);

        let newest = MutableItem::new(&signer, &b"newest"[..], 3, None);
        assert!(server
            .handle_request(&tables, requester(), put_mutable(token, &newest), now)
            .is_ok());
    }

    #[test]
    fn target_mismatch() {
        let mut server = Server::default();
        let tables = RoutingTables::new(Id::random());
        let now = Instant::now();

        let request = RequestTypeSpecific::Put(PutRequest {
            token: vec![0; 4],
            put_request_type: PutRequestSpecific::PutImmutable(PutImmutableRequestArguments {
                target: Id::random(),
                v: Bytes::from_static(b"hello"),
            }),
        });

        let error = server
            .handle_request(&tables, requester(), request, now)
            .unwrap_err();

        assert_eq!(error.code, 203);
        assert_eq!(error.description, StorageError::TargetMismatch.to_string());
    }

    #[test]
    fn get_mutable_respects_seq() {
        let mut server = Server::default();
        let tables = RoutingTables::new(Id::random());
        let now = Instant::now();

        let signer = SigningKey::from_bytes(&rand::random());
        let item = MutableItem::new(&signer, &b"value"[..], 5, None);
        server.storage_mut().insert(item.clone().into()).unwrap();

        let request = |seq| {
            RequestTypeSpecific::Get(GetRequestArguments {
                target: *item.target(),
                seq: Some(seq),
            })
        };

        assert!(matches!(
            server.handle_request(&tables, requester(), request(4), now),
            Ok(ResponseSpecific::GetMutable(GetMutableResponseArguments { seq: 5, .. }))
        ));
        assert!(matches!(
            server.handle_request(&tables, requester(), request(5), now),
            Ok(ResponseSpecific::NoValues(_))
        ));
    }
}
