use std::net::SocketAddr;
use std::time::Instant;

use tracing::trace;

use crate::common::{Node, NodeQuality, RequestSpecific};

use super::Dht;

impl Dht {
    /// Answer an inbound KRPC request from our routing tables and storage.
    pub(super) fn handle_request(
        &mut self,
        from: SocketAddr,
        transaction_id: u32,
        request: RequestSpecific,
        now: Instant,
    ) {
        // Requesters are only questionable until they answer one of our requests.
        let requester = Node::new(request.requester_id, from)
            .with_quality(NodeQuality::Questionable)
            .with_last_seen(now);

        let outcome = self.tables.for_address(&from).insert(requester, now);
        trace!(?from, ?outcome, "Request from node");

        match self
            .server
            .handle_request(&self.tables, from, request.request_type, now)
        {
            Ok(response) => self.socket.response(from, transaction_id, response),
            Err(error) => self.socket.error(from, transaction_id, error),
        }
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use crate::common::{AddressFamily, Id, NodeQuality};
    use crate::transport::MemoryNetwork;
    use crate::Dht;

    #[test]
    fn requester_is_added_as_questionable() {
        let network = MemoryNetwork::new();

        let mut a = Dht::create(Id::random());
        a.bind(network.bind_v4());
        let mut b = Dht::create(Id::random());
        let b_handle = b.bind(network.bind_v4());
        let b_addr = b.local_addr(b_handle).unwrap();

        let pong = Rc::new(RefCell::new(None));
        let captured = pong.clone();
        a.ping(b_addr, move |r| *captured.borrow_mut() = Some(r));

        let now = std::time::Instant::now();
        a.pulse(now);
        b.pulse(now);

        let requester = b
            .routing_table_find(AddressFamily::V4, a.id())
            .expect("requester in routing table");
        assert_eq!(requester.quality(), NodeQuality::Questionable);

        a.pulse(now);
        assert!(matches!(*pong.borrow(), Some(Ok(id)) if id == *b.id()));
    }
}
