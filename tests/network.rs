//! End to end scenarios over an in-memory network, with simulated time.

use std::{
    cell::RefCell,
    net::SocketAddr,
    rc::Rc,
    time::{Duration, Instant},
};

use swarm_dht::{
    closer, AddressFamily, Dht, DistributeError, DistributeReport, GetReply, Id, JobError,
    MemoryNetwork, MutableItem, NodeQuality, SearchResult, SigningKey, StorageError, StorageItem,
    StoreOutcome, Testnet, TokenError,
};

type Slot<T> = Rc<RefCell<Option<T>>>;

/// A shared slot and a callback filling it.
fn slot<T: 'static>() -> (Slot<T>, impl FnOnce(T) + 'static) {
    let slot = Rc::new(RefCell::new(None));
    let captured = slot.clone();

    (slot, move |value| *captured.borrow_mut() = Some(value))
}

fn node(network: &MemoryNetwork) -> (Dht, SocketAddr) {
    let mut dht = Dht::create(Id::random());
    let handle = dht.bind(network.bind_v4());
    let address = dht.local_addr(handle).expect("bound endpoint");

    (dht, address)
}

/// One request from `a` answered by `b`.
fn round_trip(a: &mut Dht, b: &mut Dht, now: Instant) {
    a.pulse(now);
    b.pulse(now);
    a.pulse(now);
}

fn token(a: &mut Dht, b: &mut Dht, b_addr: SocketAddr, target: Id, now: Instant) -> Vec<u8> {
    let (reply, on_reply) = slot::<Result<GetReply, JobError>>();
    a.get(b_addr, target, on_reply);
    round_trip(a, b, now);

    let reply = reply.borrow_mut().take();
    match reply {
        Some(Ok(reply)) => reply.token,
        other => panic!("expected a get reply, got {other:?}"),
    }
}

fn put(
    a: &mut Dht,
    b: &mut Dht,
    b_addr: SocketAddr,
    token: Vec<u8>,
    item: StorageItem,
    now: Instant,
) -> Result<Id, JobError> {
    let (result, on_result) = slot::<Result<Id, JobError>>();
    a.put(b_addr, token, item, on_result);
    round_trip(a, b, now);

    let result = result.borrow_mut().take();
    result.expect("put finished")
}

fn mutable(signer: &SigningKey, value: &'static [u8], seq: i64) -> StorageItem {
    MutableItem::new(signer, value, seq, None).into()
}

/// Pulse until every node knows every other one.
fn settled(count: usize) -> (Testnet, Instant) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let start = Instant::now();
    let mut testnet = Testnet::new(count, start);

    let (now, done) = testnet.pulse_until(start, 500, |testnet| {
        testnet
            .nodes
            .iter()
            .all(|node| node.routing_table(AddressFamily::V4).size() == count - 1)
    });
    assert!(done, "testnet didn't settle");

    (testnet, now)
}

#[test]
fn ping_promotes_questionable_node() {
    let network = MemoryNetwork::new();
    let (mut a, _) = node(&network);
    let (mut b, b_addr) = node(&network);
    let now = Instant::now();

    let (pong, on_pong) = slot::<Result<Id, JobError>>();
    a.ping_node(*b.id(), b_addr, on_pong);

    a.pulse(now);
    b.pulse(now);

    assert!(pong.borrow().is_none());
    assert_eq!(
        a.routing_table_find(AddressFamily::V4, b.id())
            .map(|node| node.quality()),
        Some(NodeQuality::Questionable)
    );

    a.pulse(now);

    assert!(matches!(*pong.borrow(), Some(Ok(id)) if id == *b.id()));
    assert_eq!(
        a.routing_table_find(AddressFamily::V4, b.id())
            .map(|node| node.quality()),
        Some(NodeQuality::Good)
    );
}

#[test]
fn unresponsive_node_is_evicted() {
    let network = MemoryNetwork::new();
    let (mut a, _) = node(&network);
    let (b, b_addr) = node(&network);
    let now = Instant::now();

    a.add_node(*b.id(), b_addr, now);
    network.disconnect(&b_addr);

    let mut results = Vec::new();
    for _ in 0..3 {
        let (result, on_result) = slot::<Result<Id, JobError>>();
        a.ping(b_addr, on_result);
        results.push(result);
    }

    let timeout = Duration::from_secs(2);

    a.pulse(now);
    a.pulse(now + timeout);
    assert!(a.routing_table_find(AddressFamily::V4, b.id()).is_some());

    a.pulse(now + timeout * 2);

    for result in results {
        assert!(matches!(*result.borrow(), Some(Err(JobError::Timeout))));
    }
    assert!(a.routing_table_find(AddressFamily::V4, b.id()).is_none());
}

#[test]
fn token_is_single_use() {
    let network = MemoryNetwork::new();
    let (mut a, _) = node(&network);
    let (mut b, b_addr) = node(&network);
    let now = Instant::now();

    let item = StorageItem::immutable(&b"hello"[..]);
    let target = *item.target();

    let token = token(&mut a, &mut b, b_addr, target, now);

    let stored = put(&mut a, &mut b, b_addr, token.clone(), item.clone(), now);
    assert_eq!(stored.ok(), Some(*b.id()));

    let replayed = put(&mut a, &mut b, b_addr, token, item, now);
    assert!(matches!(
        replayed,
        Err(JobError::Token(TokenError::TokenRequired))
    ));
}

#[test]
fn expired_token_is_rejected() {
    let network = MemoryNetwork::new();
    let (mut a, _) = node(&network);
    let (mut b, b_addr) = node(&network);
    let now = Instant::now();

    let item = StorageItem::immutable(&b"hello"[..]);
    let token = token(&mut a, &mut b, b_addr, *item.target(), now);

    let later = now + Duration::from_secs(5 * 60 + 1);
    let result = put(&mut a, &mut b, b_addr, token, item, later);

    assert!(matches!(
        result,
        Err(JobError::Token(TokenError::TokenExpired))
    ));
}

#[test]
fn stale_mutable_item_is_rejected() {
    let network = MemoryNetwork::new();
    let (mut a, _) = node(&network);
    let (mut b, b_addr) = node(&network);
    let now = Instant::now();

    let signer = SigningKey::from_bytes(&[3; 32]);
    let newer = mutable(&signer, b"second", 2);
    let older = mutable(&signer, b"first", 1);
    let target = *newer.target();

    let token_1 = token(&mut a, &mut b, b_addr, target, now);
    assert!(put(&mut a, &mut b, b_addr, token_1, newer.clone(), now).is_ok());

    let token_2 = token(&mut a, &mut b, b_addr, target, now);
    let result = put(&mut a, &mut b, b_addr, token_2.clone(), older, now);

    assert!(matches!(result, Err(JobError::Storage(StorageError::Stale))));
    assert_eq!(b.storage_lookup(&target), Some(&newer));

    // The rejected put didn't consume the token.
    let newest = mutable(&signer, b"third", 3);
    assert!(put(&mut a, &mut b, b_addr, token_2, newest.clone(), now).is_ok());
    assert_eq!(b.storage_lookup(&target), Some(&newest));
}

#[test]
fn immutable_first_write_wins() {
    let network = MemoryNetwork::new();
    let (mut a, _) = node(&network);
    let (mut b, b_addr) = node(&network);
    let now = Instant::now();

    let item = StorageItem::immutable(&b"hello"[..]);
    let target = *item.target();

    assert_eq!(b.storage_insert(item.clone()), Ok(StoreOutcome::Stored));
    assert_eq!(b.storage_insert(item.clone()), Ok(StoreOutcome::Unchanged));

    let token = token(&mut a, &mut b, b_addr, target, now);
    assert!(put(&mut a, &mut b, b_addr, token, item.clone(), now).is_ok());

    assert_eq!(b.storage_lookup(&target), Some(&item));
    assert_eq!(b.info().stored_items(), 1);
}

#[test]
fn search_finds_target_node() {
    let (mut testnet, now) = settled(3);
    let target = *testnet.nodes[2].id();

    let (result, on_result) = slot::<SearchResult>();
    testnet.nodes[0].search(target, on_result);

    let watched = result.clone();
    let (_, done) = testnet.pulse_until(now, 200, move |_| watched.borrow().is_some());
    assert!(done);

    let result = result.borrow_mut().take().expect("search result");
    assert_eq!(result.target, target);
    assert_eq!(result.closest.first().map(|node| *node.id()), Some(target));
    assert!(result.closest.iter().all(|node| node.id() != testnet.nodes[0].id()));
    assert!(result
        .closest
        .windows(2)
        .all(|pair| closer(pair[0].id(), pair[1].id(), &target)));
}

#[test]
fn search_value_finds_stored_item() {
    let (mut testnet, now) = settled(4);

    let item = StorageItem::immutable(&b"needle"[..]);
    let target = *item.target();
    testnet.nodes[3]
        .storage_insert(item.clone())
        .expect("local insert");

    let (result, on_result) = slot::<SearchResult>();
    testnet.nodes[0].search_value(target, on_result);

    let watched = result.clone();
    let (_, done) = testnet.pulse_until(now, 200, move |_| watched.borrow().is_some());
    assert!(done);

    let result = result.borrow_mut().take().expect("search result");
    assert_eq!(result.value, Some(item));
    assert_eq!(result.responders.len(), 3);
}

#[test]
fn distribute_then_redistribute() {
    let (mut testnet, now) = settled(4);

    let signer = SigningKey::from_bytes(&[9; 32]);

    let mut now = now;
    for seq in 1..=2 {
        let item = mutable(&signer, b"value", seq);
        let target = *item.target();

        let (report, on_report) = slot::<Result<DistributeReport, DistributeError>>();
        testnet.nodes[0].distribute(item, on_report);

        let watched = report.clone();
        let (reached, done) =
            testnet.pulse_until(now, 500, move |_| watched.borrow().is_some());
        assert!(done);
        now = reached;

        let report = report
            .borrow_mut()
            .take()
            .expect("distribute report")
            .expect("stored somewhere");
        assert_eq!(report.target, target);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.stored, 3);

        for peer in &testnet.nodes[1..] {
            let stored = peer.storage_lookup(&target).and_then(|item| item.seq());
            assert_eq!(stored, Some(seq));
        }
    }
}
