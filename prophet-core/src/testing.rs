//! In-memory host used by unit tests.

use std::collections::BTreeMap;

use crate::bundle::{Bundle, BundleKey, Link};
use crate::facade::{node_route, AlarmId, AlarmTarget, BundleCore};
use crate::node::Node;

#[derive(Debug, Clone)]
pub(crate) struct PendingAlarm {
    pub target: AlarmTarget,
    pub deadline: u64,
}

#[derive(Debug, Default)]
pub(crate) struct TestCore {
    pub eid: String,
    pub now: u64,
    pub quota: u64,
    pub forward: bool,
    pub custody: bool,
    pub store: Vec<Bundle>,
    pub payloads: BTreeMap<BundleKey, Vec<u8>>,
    /// `(bundle, link name)` in send order.
    pub sent: Vec<(Bundle, String)>,
    pub dropped: Vec<Bundle>,
    pub updated: Vec<Node>,
    pub deleted: Vec<String>,
    pub stored: Vec<Node>,
    pub alarms: BTreeMap<u64, PendingAlarm>,
    pub next_alarm: u64,
    pub fail_alarms: bool,
    pub fail_sends: bool,
    pub next_seq: u32,
}

impl TestCore {
    pub fn new(eid: &str) -> Self {
        Self {
            eid: eid.to_string(),
            now: 1_000_000,
            forward: true,
            custody: true,
            ..Self::default()
        }
    }

    pub fn add(&mut self, b: Bundle) {
        self.store.push(b);
    }

    /// Control bundles sent so far, with their payloads, oldest first.
    pub fn take_sent(&mut self) -> Vec<(Bundle, Vec<u8>)> {
        let sent = std::mem::take(&mut self.sent);
        sent.into_iter()
            .map(|(b, _)| {
                let payload = self.payloads.get(&b.key()).cloned().unwrap_or_default();
                (b, payload)
            })
            .collect()
    }
}

impl BundleCore for TestCore {
    fn should_fwd(&self, _bundle: &Bundle, _link: &Link) -> bool {
        self.forward
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
        self.custody
    }

    fn bundles(&self) -> Vec<Bundle> {
        self.store.clone()
    }

    fn find(&self, eid: &str, creation_ts: u32, seqno: u32) -> Option<Bundle> {
        self.store
            .iter()
            .find(|b| {
                b.creation_ts == creation_ts && b.seqno == seqno && self.is_route(&b.destination, eid)
            })
            .cloned()
    }

    fn drop_bundle(&mut self, bundle: &Bundle) {
        self.store.retain(|b| !b.same_bundle(bundle));
        self.dropped.push(bundle.clone());
    }

    fn send_bundle(&mut self, bundle: &Bundle, link: &Link) -> bool {
        if self.fail_sends {
            return false;
        }
        self.sent.push((bundle.clone(), link.name.clone()));
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
        let cts = u32::try_from(self.now / 1000).unwrap_or(u32::MAX);
        Bundle::new(source, destination, cts, self.next_seq, expiration, 0)
    }

    fn update_node(&mut self, node: &Node) {
        self.updated.push(node.clone());
    }

    fn delete_node(&mut self, route: &str) {
        self.deleted.push(route.to_string());
    }

    fn stored_nodes(&self) -> Vec<Node> {
        self.stored.clone()
    }

    fn local_eid(&self) -> String {
        self.eid.clone()
    }

    fn now_ms(&self) -> u64 {
        self.now
    }

    fn create_alarm(&mut self, target: AlarmTarget, timeout_ms: u64, _jitter: bool) -> Option<AlarmId> {
        if self.fail_alarms {
            return None;
        }
        self.next_alarm += 1;
        self.alarms.insert(
            self.next_alarm,
            PendingAlarm {
                target,
                deadline: self.now + timeout_ms,
            },
        );
        Some(AlarmId(self.next_alarm))
    }

    fn cancel_alarm(&mut self, id: AlarmId) {
        self.alarms.remove(&id.0);
    }

    fn alarm_remaining(&self, id: AlarmId) -> u64 {
        self.alarms
            .get(&id.0)
            .map(|a| a.deadline.saturating_sub(self.now))
            .unwrap_or(0)
    }
}
