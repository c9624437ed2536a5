//! Host facade: everything the router needs from the bundle daemon.

use rand::Rng;

use crate::bundle::{Bundle, Link, PROPHET_SERVICE};
use crate::node::Node;

/// Handle for a pending host alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlarmId(pub u64);

/// What an alarm should wake up when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlarmTarget {
    /// Controller table maintenance.
    Maintenance,
    /// Session timer; `instance` guards against a replaced session.
    Encounter { link: String, instance: u16 },
}

/// Services the host daemon provides. Called synchronously from inside a
/// Controller entry point; implementations must not call back into it.
pub trait BundleCore {
    /// Host veto on forwarding `bundle` over `link`.
    fn should_fwd(&self, bundle: &Bundle, link: &Link) -> bool;

    /// Routing-table key for an endpoint.
    fn get_route(&self, dest: &str) -> String;

    /// Pattern that matches every endpoint under `dest`, e.g. `dtn://b/*`.
    /// Empty when `dest` has no pattern form.
    fn get_route_pattern(&self, dest: &str) -> String;

    /// Whether `dest` matches the pattern of `route`.
    fn is_route(&self, dest: &str, route: &str) -> bool {
        pattern_matches(&self.get_route_pattern(route), dest)
    }

    /// Storage quota in bytes; 0 means unbounded.
    fn max_bundle_quota(&self) -> u64;

    fn custody_accepted(&self) -> bool;

    /// Snapshot of every bundle in storage.
    fn bundles(&self) -> Vec<Bundle>;

    /// Look up a stored bundle by destination route and creation stamp.
    fn find(&self, eid: &str, creation_ts: u32, seqno: u32) -> Option<Bundle>;

    fn drop_bundle(&mut self, bundle: &Bundle);

    fn send_bundle(&mut self, bundle: &Bundle, link: &Link) -> bool;

    fn write_bundle(&mut self, bundle: &Bundle, payload: &[u8]) -> bool;

    fn read_bundle(&self, bundle: &Bundle) -> Option<Vec<u8>>;

    /// Allocate a new (empty) bundle; `expiration` is in seconds.
    fn create_bundle(&mut self, source: &str, destination: &str, expiration: u32) -> Bundle;

    /// Persist a route.
    fn update_node(&mut self, node: &Node);

    fn delete_node(&mut self, route: &str);

    /// Routes persisted by earlier runs.
    fn stored_nodes(&self) -> Vec<Node>;

    fn local_eid(&self) -> String;

    /// Milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> u64;

    /// Schedule `target` to fire after `timeout_ms`; jittered when asked.
    fn create_alarm(&mut self, target: AlarmTarget, timeout_ms: u64, jitter: bool)
        -> Option<AlarmId>;

    fn cancel_alarm(&mut self, id: AlarmId);

    /// Milliseconds until `id` fires; 0 if it is not pending.
    fn alarm_remaining(&self, id: AlarmId) -> u64;

    /// Prophet control endpoint of this node.
    fn prophet_id(&self) -> String {
        prophet_endpoint(&self.local_eid())
    }

    /// Prophet control endpoint of the peer across `link`.
    fn prophet_id_for(&self, link: &Link) -> String {
        prophet_endpoint(&link.remote_eid)
    }
}

/// Append the Prophet service tag to `eid`.
pub fn prophet_endpoint(eid: &str) -> String {
    if eid.ends_with('/') {
        format!("{eid}{PROPHET_SERVICE}")
    } else {
        format!("{eid}/{PROPHET_SERVICE}")
    }
}

/// Reduce an endpoint id to its node part: `dtn://host/svc` becomes `dtn://host`.
pub fn node_route(eid: &str) -> String {
    let Some(scheme) = eid.find("://") else {
        return eid.to_string();
    };
    let host = scheme + 3;
    match eid[host..].find('/') {
        Some(slash) => eid[..host + slash].to_string(),
        None => eid.to_string(),
    }
}

/// Whether `dest` lies under `route` (the route itself or any service on it).
pub fn route_covers(dest: &str, route: &str) -> bool {
    let route = route.trim_end_matches('/');
    if route.is_empty() {
        return false;
    }
    match dest.strip_prefix(route) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Match `eid` against a route pattern: a trailing `/*` accepts the route
/// itself and every service under it, anything else must match exactly.
pub fn pattern_matches(pattern: &str, eid: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some(route) => route_covers(eid, route),
        None => !pattern.is_empty() && pattern == eid,
    }
}

/// Spread `timeout_ms` by roughly +/- 5%: subtract 1/16, add up to 1/8.
pub fn jittered<R: Rng + ?Sized>(timeout_ms: u64, rng: &mut R) -> u64 {
    let eighth = timeout_ms >> 3;
    let sixteenth = timeout_ms >> 4;
    let spread = if eighth == 0 {
        0
    } else {
        rng.gen_range(0..eighth)
    };
    timeout_ms - sixteenth + spread
}
