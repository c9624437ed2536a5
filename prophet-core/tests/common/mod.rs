//! Minimal in-memory host for driving Controllers from integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use prophet_core::facade::{node_route, route_covers};
use prophet_core::{AlarmId, AlarmTarget, Bundle, BundleCore, BundleKey, Controller, Link, Node, ProphetParams};

#[derive(Debug, Default)]
pub struct Host {
    pub eid: String,
    pub now: u64,
    pub quota: u64,
    pub store: Vec<Bundle>,
    pub payloads: BTreeMap<BundleKey, Vec<u8>>,
    pub outbox: Vec<Bundle>,
    pub dropped: Vec<Bundle>,
    pub persisted: BTreeMap<String, Node>,
    pub alarms: BTreeMap<u64, (AlarmTarget, u64)>,
    next_alarm: u64,
    next_seq: u32,
}

impl Host {
    pub fn new(eid: &str) -> Self {
        Self {
            eid: eid.to_string(),
            now: 5_000_000,
            ..Self::default()
        }
    }
}

impl BundleCore for Host {
    fn should_fwd(&self, _bundle: &Bundle, _link: &Link) -> bool {
        true
    }

    fn get_route(&self, dest: &str) -> String {
        node_route(dest)
    }

    fn get_route_pattern(&self, dest: &str) -> String {
        format!("{dest}/*")
    }

    fn max_bundle_quota(&self) -> u64 {
        self.quota
    }

    fn custody_accepted(&self) -> bool {
        false
    }

    fn bundles(&self) -> Vec<Bundle> {
        self.store.clone()
    }

    fn find(&self, eid: &str, creation_ts: u32, seqno: u32) -> Option<Bundle> {
        self.store
            .iter()
            .find(|b| b.creation_ts == creation_ts && b.seqno == seqno && route_covers(&b.destination, eid))
            .cloned()
    }

    fn drop_bundle(&mut self, bundle: &Bundle) {
        self.store.retain(|b| !b.same_bundle(bundle));
        self.dropped.push(bundle.clone());
    }

    fn send_bundle(&mut self, bundle: &Bundle, _link: &Link) -> bool {
        self.outbox.push(bundle.clone());
        true
    }

    fn write_bundle(&mut self, bundle: &Bundle, payload: &[u8]) -> bool {
        self.payloads.insert(bundle.key(), payload.to_vec());
        true
    }

    fn read_bundle(&self, bundle: &Bundle) -> Option<Vec<u8>> {
        self.payloads.get(&bundle.key()).cloned()
    }

    fn create_bundle(&mut self, source: &str, destination: &str, expiration: u32) -> Bundle {
        self.next_seq += 1;
        let cts = (self.now / 1000) as u32;
        Bundle::new(source, destination, cts, self.next_seq, expiration, 0)
    }

    fn update_node(&mut self, node: &Node) {
        self.persisted.insert(node.route().to_string(), node.clone());
    }

    fn delete_node(&mut self, route: &str) {
        self.persisted.remove(route);
    }

    fn stored_nodes(&self) -> Vec<Node> {
        self.persisted.values().cloned().collect()
    }

    fn local_eid(&self) -> String {
        self.eid.clone()
    }

    fn now_ms(&self) -> u64 {
        self.now
    }

    fn create_alarm(&mut self, target: AlarmTarget, timeout_ms: u64, _jitter: bool) -> Option<AlarmId> {
        self.next_alarm += 1;
        self.alarms.insert(self.next_alarm, (target, self.now + timeout_ms));
        Some(AlarmId(self.next_alarm))
    }

    fn cancel_alarm(&mut self, id: AlarmId) {
        self.alarms.remove(&id.0);
    }

    fn alarm_remaining(&self, id: AlarmId) -> u64 {
        self.alarms
            .get(&id.0)
            .map(|(_, at)| at.saturating_sub(self.now))
            .unwrap_or(0)
    }
}

pub fn router(eid: &str) -> Controller<Host> {
    Controller::new(Host::new(eid), ProphetParams::default())
}

/// Link from `c` toward the router with EID `remote`, named after it.
pub fn link_to(remote: &str) -> Link {
    Link::new(format!("to-{}", remote.trim_start_matches("dtn://")), remote)
}

/// Bring up a contact between `a` and `b` and run it until quiet.
pub fn contact(a: &mut Controller<Host>, b: &mut Controller<Host>) {
    let a_eid = a.core().eid.clone();
    let b_eid = b.core().eid.clone();
    a.new_neighbor(link_to(&b_eid));
    b.new_neighbor(link_to(&a_eid));
    for _ in 0..32 {
        let moved = deliver(a, b, &link_to(&a_eid)) | deliver(b, a, &link_to(&b_eid));
        if !moved {
            return;
        }
    }
    panic!("contact did not settle");
}

/// Move everything `from` has sent into `to`, arriving over `link`.
pub fn deliver(from: &mut Controller<Host>, to: &mut Controller<Host>, link: &Link) -> bool {
    let sent = std::mem::take(&mut from.core_mut().outbox);
    let any = !sent.is_empty();
    for b in sent {
        if let Some(bytes) = from.core().read_bundle(&b) {
            to.core_mut().write_bundle(&b, &bytes);
        }
        to.core_mut().store.push(b.clone());
        if !b.is_control() {
            to.bundle_stored(&b);
        }
        to.handle_bundle_received(&b, link);
    }
    any
}
