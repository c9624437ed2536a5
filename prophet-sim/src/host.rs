//! In-memory bundle daemon for one simulated node.

use std::collections::BTreeMap;

use prophet_core::facade::{jittered, node_route, route_covers};
use prophet_core::{AlarmId, AlarmTarget, Bundle, BundleCore, BundleKey, Link, Node};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// A bundle handed to the convergence layer, waiting for the simulator to
/// carry it across `link`.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub bundle: Bundle,
    pub link: String,
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct Alarm {
    target: AlarmTarget,
    deadline: u64,
}

/// Bundle storage, persisted routes and alarms of one node. The simulator
/// owns the clock and sets `now` before every call into the router.
#[derive(Debug)]
pub struct SimCore {
    eid: String,
    now: u64,
    quota: u64,
    store: Vec<Bundle>,
    payloads: BTreeMap<BundleKey, Vec<u8>>,
    outbox: Vec<Outgoing>,
    routes: BTreeMap<String, Node>,
    alarms: BTreeMap<u64, Alarm>,
    next_alarm: u64,
    next_seq: u32,
    rng: StdRng,
}

impl SimCore {
    pub fn new(eid: impl Into<String>, quota: u64, seed: u64) -> Self {
        Self {
            eid: eid.into(),
            now: 0,
            quota,
            store: Vec::new(),
            payloads: BTreeMap::new(),
            outbox: Vec::new(),
            routes: BTreeMap::new(),
            alarms: BTreeMap::new(),
            next_alarm: 0,
            next_seq: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn eid(&self) -> &str {
        &self.eid
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn set_now(&mut self, now: u64) {
        self.now = now;
    }

    pub fn set_quota(&mut self, quota: u64) {
        self.quota = quota;
    }

    /// Bundles in storage.
    pub fn stored(&self) -> &[Bundle] {
        &self.store
    }

    pub fn holds(&self, b: &Bundle) -> bool {
        self.store.iter().any(|x| x.same_bundle(b))
    }

    /// Storage usage in bytes.
    pub fn usage(&self) -> u64 {
        self.store.iter().map(|b| b.size).sum()
    }

    /// Put a bundle in storage. Returns false if it is already there.
    pub fn insert(&mut self, b: Bundle, payload: Option<Vec<u8>>) -> bool {
        if self.holds(&b) {
            return false;
        }
        if let Some(p) = payload {
            self.payloads.insert(b.key(), p);
        }
        self.store.push(b);
        true
    }

    /// Count one more forward of the stored copy of `b`; returns the updated view.
    pub fn record_forward(&mut self, b: &Bundle) -> Option<Bundle> {
        let stored = self.store.iter_mut().find(|x| x.same_bundle(b))?;
        stored.num_forward += 1;
        Some(stored.clone())
    }

    /// Everything sent since the last call.
    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Routes written through `update_node`.
    pub fn persisted_routes(&self) -> impl Iterator<Item = &Node> {
        self.routes.values()
    }

    /// Earliest pending alarm.
    pub fn next_alarm(&self) -> Option<u64> {
        self.alarms.values().map(|a| a.deadline).min()
    }

    /// Remove and return every alarm due at the current time, earliest first.
    pub fn take_due_alarms(&mut self) -> Vec<AlarmTarget> {
        let now = self.now;
        let mut due: Vec<(u64, u64)> = self
            .alarms
            .iter()
            .filter(|(_, a)| a.deadline <= now)
            .map(|(id, a)| (a.deadline, *id))
            .collect();
        due.sort_unstable();
        due.into_iter()
            .filter_map(|(_, id)| self.alarms.remove(&id))
            .map(|a| a.target)
            .collect()
    }

    /// Drop every bundle whose lifetime has run out.
    pub fn expire_bundles(&mut self) -> Vec<Bundle> {
        let now_secs = self.now / 1000;
        let (expired, kept): (Vec<Bundle>, Vec<Bundle>) = std::mem::take(&mut self.store)
            .into_iter()
            .partition(|b| b.expires_at() <= now_secs);
        self.store = kept;
        for b in &expired {
            self.payloads.remove(&b.key());
        }
        expired
    }
}

impl BundleCore for SimCore {
    fn should_fwd(&self, bundle: &Bundle, link: &Link) -> bool {
        // never hand a bundle back to where it came from
        !route_covers(&bundle.source, &link.remote_eid)
    }

    fn get_route(&self, dest: &str) -> String {
        node_route(dest)
    }

    fn get_route_pattern(&self, dest: &str) -> String {
        format!("{}/*", node_route(dest))
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
        self.payloads.remove(&bundle.key());
    }

    fn send_bundle(&mut self, bundle: &Bundle, link: &Link) -> bool {
        let payload = self.payloads.get(&bundle.key()).cloned();
        tracing::trace!(eid = %self.eid, link = %link.name, dest = %bundle.destination, seqno = bundle.seqno, "send");
        self.outbox.push(Outgoing {
            bundle: bundle.clone(),
            link: link.name.clone(),
            payload,
        });
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
        self.next_seq = self.next_seq.wrapping_add(1);
        let cts = u32::try_from(self.now / 1000).unwrap_or(u32::MAX);
        Bundle::new(source, destination, cts, self.next_seq, expiration, 0)
    }

    fn update_node(&mut self, node: &Node) {
        self.routes.insert(node.route().to_string(), node.clone());
    }

    fn delete_node(&mut self, route: &str) {
        self.routes.remove(route);
    }

    fn stored_nodes(&self) -> Vec<Node> {
        self.routes.values().cloned().collect()
    }

    fn local_eid(&self) -> String {
        self.eid.clone()
    }

    fn now_ms(&self) -> u64 {
        self.now
    }

    fn create_alarm(&mut self, target: AlarmTarget, timeout_ms: u64, jitter: bool) -> Option<AlarmId> {
        let timeout = if jitter {
            jittered(timeout_ms, &mut self.rng)
        } else {
            timeout_ms
        };
        self.next_alarm += 1;
        self.alarms.insert(
            self.next_alarm,
            Alarm {
                target,
                deadline: self.now + timeout,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarms_fire_in_deadline_order() {
        let mut c = SimCore::new("dtn://a", 0, 1);
        c.create_alarm(AlarmTarget::Maintenance, 500, false);
        c.create_alarm(
            AlarmTarget::Encounter {
                link: "l".into(),
                instance: 1,
            },
            100,
            false,
        );
        assert_eq!(c.next_alarm(), Some(100));
        c.set_now(1000);
        let due = c.take_due_alarms();
        assert!(matches!(due[0], AlarmTarget::Encounter { .. }));
        assert_eq!(due[1], AlarmTarget::Maintenance);
        assert!(c.next_alarm().is_none());
    }

    #[test]
    fn jittered_alarm_stays_near_timeout() {
        let mut c = SimCore::new("dtn://a", 0, 7);
        let id = c.create_alarm(AlarmTarget::Maintenance, 1600, true).unwrap();
        let left = c.alarm_remaining(id);
        assert!((1500..1700).contains(&left), "{left}");
    }

    #[test]
    fn expiry_drops_bundles() {
        let mut c = SimCore::new("dtn://a", 0, 1);
        c.insert(Bundle::new("dtn://a/x", "dtn://b/x", 10, 1, 5, 1), None);
        c.insert(Bundle::new("dtn://a/x", "dtn://b/x", 10, 2, 50, 1), None);
        c.set_now(20_000);
        let gone = c.expire_bundles();
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].seqno, 1);
        assert_eq!(c.stored().len(), 1);
    }

    #[test]
    fn never_returns_bundle_to_its_source() {
        let c = SimCore::new("dtn://a", 0, 1);
        let b = Bundle::new("dtn://b/app", "dtn://c/app", 1, 1, 60, 1);
        assert!(!c.should_fwd(&b, &Link::new("to-b", "dtn://b")));
        assert!(c.should_fwd(&b, &Link::new("to-c", "dtn://c")));
    }

    #[test]
    fn routes_cover_every_service_on_a_node() {
        let c = SimCore::new("dtn://a", 0, 1);
        assert_eq!(c.get_route_pattern("dtn://b/app"), "dtn://b/*");
        assert!(c.is_route("dtn://b/app", "dtn://b"));
        assert!(c.is_route("dtn://b/prophet", "dtn://b/app"));
        assert!(!c.is_route("dtn://bb/app", "dtn://b"));
    }
}
