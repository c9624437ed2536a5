//! Route table: nodes keyed by route plus a min-heap on p_value for quota eviction.

use std::collections::{BTreeMap, HashMap};

use crate::bundle::Bundle;
use crate::dictionary::{Dictionary, INVALID_SID};
use crate::error::ParamsError;
use crate::facade::BundleCore;
use crate::heap::Heap;
use crate::node::{Node, NodeParams};
use crate::tlv::Rib;

/// Shortest acceptable route, the length of `"dtn://"`.
pub const MIN_ROUTE_LEN: usize = 6;

/// A pending write to persistent route storage.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteChange {
    Update(Node),
    Delete(String),
}

#[derive(Debug, Clone)]
struct Slot {
    route: String,
    p_value: f64,
}

// root is the lowest p_value
fn lower_p_on_top(a: &Slot, b: &Slot) -> bool {
    a.p_value > b.p_value
}

/// Predictability table. Every node owns exactly one heap slot and `slots`
/// always records where it is.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    persistent: bool,
    params: NodeParams,
    nodes: BTreeMap<String, Node>,
    heap: Heap<Slot>,
    slots: HashMap<String, usize>,
    max_route: usize,
    journal: Vec<RouteChange>,
}

impl Table {
    pub fn new(name: impl Into<String>, persistent: bool) -> Self {
        Self {
            name: name.into(),
            persistent,
            params: NodeParams::default(),
            nodes: BTreeMap::new(),
            heap: Heap::new(),
            slots: HashMap::new(),
            max_route: 0,
            journal: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_route(&self) -> usize {
        self.max_route
    }

    /// Weights given to nodes this table creates from now on; existing
    /// nodes are switched over as well. Out-of-range weights are refused
    /// and the current ones kept.
    pub fn set_params(&mut self, params: NodeParams) -> Result<(), ParamsError> {
        params.validate()?;
        self.params = params;
        for n in self.nodes.values_mut() {
            n.set_params(params);
        }
        Ok(())
    }

    fn valid_route(&self, route: &str) -> bool {
        if route.len() < MIN_ROUTE_LEN {
            tracing::error!(
                subsystem = "table",
                table = %self.name,
                route,
                "destination id is shorter than required minimum"
            );
            return false;
        }
        true
    }

    pub fn find(&self, route: &str) -> Option<&Node> {
        if !self.valid_route(route) {
            return None;
        }
        self.nodes.get(route)
    }

    /// Predictability for `route`; 0.0 when unknown.
    pub fn p_value(&self, route: &str) -> f64 {
        self.find(route).map(Node::p_value).unwrap_or(0.0)
    }

    /// Predictability toward a bundle's destination route.
    pub fn p_value_for(&self, bundle: &Bundle, core: &dyn BundleCore) -> f64 {
        self.p_value(&core.get_route(&bundle.destination))
    }

    /// Routes in order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn clone_nodes(&self) -> Vec<Node> {
        self.nodes.values().cloned().collect()
    }

    /// Take every persistence record queued since the last drain.
    pub fn drain_changes(&mut self) -> Vec<RouteChange> {
        std::mem::take(&mut self.journal)
    }

    /// Insert or replace a node wholesale.
    pub fn update(&mut self, node: Node) {
        if !self.valid_route(&node.route) {
            return;
        }
        let p_old = self.nodes.get(&node.route).map(Node::p_value).unwrap_or(0.0);
        let route = node.route.clone();
        let p_new = node.p_value;
        self.nodes.insert(route.clone(), node);
        self.heap_set(&route, p_new);
        tracing::info!(subsystem = "table", table = %self.name, route = %route, p_old, p_new, "updating route");
        self.journal_update(&route);
        self.enforce_quota();
    }

    /// Direct encounter with `route`.
    pub fn update_route(&mut self, route: &str, relay: bool, custody: bool, internet: bool, now_ms: u64) {
        if !self.valid_route(route) {
            return;
        }
        let params = self.params;
        let node = self.nodes.entry(route.to_string()).or_insert_with(|| {
            let mut n = Node::with_flags(route, relay, custody, internet);
            n.set_params(params);
            n
        });
        let p_old = node.p_value;
        node.update_pvalue(now_ms);
        node.set_flags(relay, custody, internet);
        let p_new = node.p_value;
        self.heap_set(route, p_new);
        tracing::info!(subsystem = "table", table = %self.name, route, p_old, p_new, "updating route direct");
        self.journal_update(route);
        self.enforce_quota();
    }

    /// Learn `route` through `peer`, which reports `bc` toward it.
    #[allow(clippy::too_many_arguments)]
    pub fn update_transitive(
        &mut self,
        route: &str,
        peer: &str,
        bc: f64,
        relay: bool,
        custody: bool,
        internet: bool,
        now_ms: u64,
    ) {
        if !self.valid_route(route) || !self.valid_route(peer) {
            return;
        }
        let ab = self.p_value(peer);
        self.apply_transitive(route, ab, bc, relay, custody, internet, now_ms);
    }

    /// Apply every entry of a peer's RIB transitively.
    pub fn update_transitive_rib(&mut self, peer: &str, rib: &Rib, ribd: &Dictionary, now_ms: u64) {
        if !self.valid_route(peer) {
            return;
        }
        let ab = self.p_value(peer);
        for e in &rib.entries {
            if e.sid == INVALID_SID {
                continue;
            }
            let route = ribd.route(e.sid);
            if route.is_empty() {
                tracing::debug!(subsystem = "table", table = %self.name, sid = e.sid, "unresolved sid in rib");
                continue;
            }
            if route.len() < MIN_ROUTE_LEN {
                continue;
            }
            let route = route.to_string();
            self.apply_transitive(&route, ab, e.p_value, e.relay, e.custody, e.internet_gateway, now_ms);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_transitive(
        &mut self,
        route: &str,
        ab: f64,
        bc: f64,
        relay: bool,
        custody: bool,
        internet: bool,
        now_ms: u64,
    ) {
        let params = self.params;
        let node = self.nodes.entry(route.to_string()).or_insert_with(|| {
            let mut n = Node::with_flags(route, relay, custody, internet);
            n.set_params(params);
            n
        });
        let p_old = node.p_value;
        node.update_transitive(ab, bc, now_ms);
        node.set_flags(relay, custody, internet);
        let p_new = node.p_value;
        self.heap_set(route, p_new);
        tracing::info!(subsystem = "table", table = %self.name, route, p_old, p_new, "updating route transitive");
        self.journal_update(route);
        self.enforce_quota();
    }

    /// Replace contents with a verbatim copy of a peer's RIB.
    pub fn assign_rib(&mut self, rib: &Rib, ribd: &Dictionary) {
        for e in &rib.entries {
            let route = ribd.route(e.sid);
            let mut n = Node::with_flags(route, e.relay, e.custody, e.internet_gateway);
            n.set_p_value(e.p_value);
            n.set_params(self.params);
            self.update(n);
        }
        if !rib.is_empty() {
            tracing::info!(subsystem = "table", table = %self.name, count = rib.len(), "assigned routes from RIB");
        }
    }

    /// Load routes from persistent storage without writing them back.
    pub fn assign_stored(&mut self, nodes: Vec<Node>, params: NodeParams) {
        let persistent = self.persistent;
        self.persistent = false;
        let count = nodes.len();
        for mut n in nodes {
            n.set_params(params);
            self.update(n);
        }
        self.persistent = persistent;
        if count > 0 {
            tracing::info!(subsystem = "table", table = %self.name, count, "assigned routes from permanent storage");
        }
    }

    /// Apply the aging rule to every node; returns how many were aged.
    pub fn age_nodes(&mut self, now_ms: u64) -> usize {
        let mut moved = Vec::with_capacity(self.nodes.len());
        for n in self.nodes.values_mut() {
            n.update_age(now_ms);
            moved.push((n.route.clone(), n.p_value));
            if self.persistent {
                self.journal.push(RouteChange::Update(n.clone()));
            }
        }
        for (route, p) in &moved {
            self.heap_set(route, *p);
        }
        if !moved.is_empty() {
            tracing::info!(subsystem = "table", table = %self.name, count = moved.len(), "applied age algorithm");
        }
        moved.len()
    }

    /// Drop every route below `epsilon`; `epsilon >= 1` empties the table.
    pub fn truncate(&mut self, epsilon: f64) -> usize {
        let mut num = 0;
        if epsilon >= 1.0 {
            let routes: Vec<String> = self.nodes.keys().cloned().collect();
            for r in routes {
                self.remove(&r);
                num += 1;
            }
            return num;
        }
        while let Some(top) = self.heap.top() {
            if top.p_value >= epsilon {
                break;
            }
            let route = top.route.clone();
            self.remove(&route);
            num += 1;
        }
        if num > 0 {
            tracing::info!(subsystem = "table", table = %self.name, num, epsilon, "removed routes below epsilon");
        }
        num
    }

    /// Cap the table at `max` routes, evicting lowest p first; 0 disables the cap.
    pub fn set_max_route(&mut self, max: usize) {
        self.max_route = max;
        self.enforce_quota();
    }

    fn enforce_quota(&mut self) {
        if self.max_route == 0 {
            return;
        }
        while self.nodes.len() > self.max_route {
            let route = match self.heap.top() {
                Some(top) => top.route.clone(),
                None => break,
            };
            tracing::debug!(subsystem = "table", table = %self.name, route = %route, max_route = self.max_route, "evicting route over quota");
            self.remove(&route);
        }
    }

    fn remove(&mut self, route: &str) {
        if self.nodes.remove(route).is_some() && self.persistent {
            self.journal.push(RouteChange::Delete(route.to_string()));
        }
        self.heap_del(route);
    }

    fn journal_update(&mut self, route: &str) {
        if !self.persistent {
            return;
        }
        if let Some(n) = self.nodes.get(route) {
            self.journal.push(RouteChange::Update(n.clone()));
        }
    }

    fn heap_set(&mut self, route: &str, p_value: f64) {
        let slot = Slot {
            route: route.to_string(),
            p_value,
        };
        let existing = self.slots.get(route).copied();
        let slots = &mut self.slots;
        let on_move = |s: &Slot, pos: usize| {
            slots.insert(s.route.clone(), pos);
        };
        match existing {
            Some(pos) => {
                self.heap.replace(pos, slot, lower_p_on_top, on_move);
            }
            None => {
                self.heap.push(slot, lower_p_on_top, on_move);
            }
        }
    }

    fn heap_del(&mut self, route: &str) {
        if let Some(pos) = self.slots.remove(route) {
            let slots = &mut self.slots;
            self.heap.remove(pos, lower_p_on_top, |s: &Slot, p| {
                slots.insert(s.route.clone(), p);
            });
        }
    }

    /// Heap order holds and every node's recorded slot is accurate.
    pub fn check_invariants(&self) -> bool {
        if self.heap.len() != self.nodes.len() || self.slots.len() != self.nodes.len() {
            return false;
        }
        if !self.heap.is_heap(lower_p_on_top) {
            return false;
        }
        self.nodes.iter().all(|(route, n)| {
            self.slots
                .get(route)
                .and_then(|pos| self.heap.get(*pos))
                .map(|s| s.route == *route && s.p_value == n.p_value)
                .unwrap_or(false)
        })
    }
}
