//! Router entry point. The Controller owns the host facade and every piece
//! of shared routing state, and routes host events to the per-link
//! Encounters. Nothing is mutated outside these entry points.

use std::collections::{BTreeMap, HashMap};

use crate::ack::AckList;
use crate::bundle::{Bundle, Link};
use crate::encounter::{retire_bundle, Encounter, EncounterState, RouterState};
use crate::error::{ParamsError, PolicyError};
use crate::facade::{AlarmId, AlarmTarget, BundleCore};
use crate::params::ProphetParams;
use crate::queue_policy::{PolicyEnv, QueuePolicy};
use crate::repository::Repository;
use crate::stats::Stats;
use crate::table::{RouteChange, Table};
use crate::tlv::ProphetTlv;

/// Prophet router for one node.
pub struct Controller<C> {
    core: C,
    params: ProphetParams,
    nodes: Table,
    stats: Stats,
    acks: AckList,
    repository: Repository,
    /// Live sessions keyed by link name.
    encounters: BTreeMap<String, Encounter>,
    /// Acks already offered, per link.
    link_acks: HashMap<String, AckList>,
    next_instance: u16,
    alarm: Option<AlarmId>,
}

impl<C: BundleCore> Controller<C> {
    /// Start a router over `core`. Routes persisted by earlier runs are
    /// loaded and the maintenance alarm is armed.
    pub fn new(core: C, params: ProphetParams) -> Self {
        let params = match params.validate() {
            Ok(()) => params,
            Err(e) => {
                tracing::error!(subsystem = "controller", error = %e, "bad predictability weights, using defaults");
                params.with_default_weights()
            }
        };
        let mut nodes = Table::new("local", true);
        if let Err(e) = nodes.set_params(params.node_params()) {
            tracing::error!(subsystem = "controller", error = %e, "keeping default weights");
        }
        nodes.assign_stored(core.stored_nodes(), params.node_params());
        nodes.set_max_route(params.max_table_size);

        let mut c = Self {
            core,
            params,
            nodes,
            stats: Stats::new(),
            acks: AckList::new(),
            repository: Repository::new(),
            encounters: BTreeMap::new(),
            link_acks: HashMap::new(),
            next_instance: 0,
            alarm: None,
        };
        let (policy, min_forward) = (c.params.queue_policy, c.params.min_forward);
        if let Err(e) = c.set_queue_policy(policy, min_forward) {
            tracing::error!(subsystem = "controller", policy = %policy, error = %e, "bad queue policy, using FIFO");
            c.params.queue_policy = QueuePolicy::Fifo;
        }
        c.schedule_maintenance();
        c.flush_routes();
        tracing::info!(
            subsystem = "controller",
            eid = %c.core.local_eid(),
            routes = c.nodes.len(),
            strategy = %c.params.forward_strategy,
            queue_policy = %c.params.queue_policy,
            "prophet router started"
        );
        c
    }

    pub fn core(&self) -> &C {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }

    pub fn params(&self) -> &ProphetParams {
        &self.params
    }

    /// Local route table.
    pub fn nodes(&self) -> &Table {
        &self.nodes
    }

    pub fn acks(&self) -> &AckList {
        &self.acks
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn encounter(&self, link: &str) -> Option<&Encounter> {
        self.encounters.get(link)
    }

    pub fn encounter_state(&self, link: &str) -> Option<EncounterState> {
        self.encounters.get(link).map(Encounter::state)
    }

    pub fn encounters(&self) -> impl Iterator<Item = &Encounter> {
        self.encounters.values()
    }

    /// Acks already offered over `link`. They outlive the session and are
    /// not offered again after a reconnect.
    pub fn link_acks(&self, link: &str) -> Option<&AckList> {
        self.link_acks.get(link)
    }

    /// Pending maintenance alarm.
    pub fn alarm(&self) -> Option<AlarmId> {
        self.alarm
    }

    fn next_instance(&mut self) -> u16 {
        self.next_instance = self.next_instance.wrapping_add(1);
        if self.next_instance == 0 {
            self.next_instance = 1;
        }
        self.next_instance
    }

    /// Lend the shared state to the session on `link`.
    fn with_encounter<R>(
        &mut self,
        link: &str,
        f: impl FnOnce(&mut Encounter, &mut RouterState<'_>) -> R,
    ) -> Option<R> {
        let e = self.encounters.get_mut(link)?;
        let link_acks = self.link_acks.entry(link.to_string()).or_default();
        let mut ctx = RouterState {
            core: &mut self.core,
            params: &self.params,
            nodes: &mut self.nodes,
            stats: &mut self.stats,
            acks: &mut self.acks,
            repository: &mut self.repository,
            link_acks,
        };
        Some(f(e, &mut ctx))
    }

    fn remove_encounter(&mut self, link: &str) {
        if let Some(mut e) = self.encounters.remove(link) {
            e.close(&mut self.core);
            tracing::debug!(subsystem = "controller", link, instance = e.local_instance(), "session removed");
        }
    }

    /// Drop the session on `link` if it has died.
    fn reap(&mut self, link: &str) {
        if self.encounters.get(link).is_some_and(Encounter::neighbor_gone) {
            tracing::info!(subsystem = "controller", link, "reaping dead session");
            self.remove_encounter(link);
        }
    }

    fn reap_all(&mut self) {
        let gone: Vec<String> = self
            .encounters
            .iter()
            .filter(|(_, e)| e.neighbor_gone())
            .map(|(l, _)| l.clone())
            .collect();
        for l in gone {
            self.reap(&l);
        }
    }

    /// Hand queued route writes to the host.
    fn flush_routes(&mut self) {
        for change in self.nodes.drain_changes() {
            match change {
                RouteChange::Update(n) => self.core.update_node(&n),
                RouteChange::Delete(route) => self.core.delete_node(&route),
            }
        }
    }

    fn schedule_maintenance(&mut self) {
        if let Some(id) = self.alarm.take() {
            self.core.cancel_alarm(id);
        }
        let period = self.params.age_period_ms();
        if period == 0 {
            tracing::warn!(subsystem = "controller", "age_period is 0, table maintenance disabled");
            return;
        }
        self.alarm = self.core.create_alarm(AlarmTarget::Maintenance, period, false);
        if self.alarm.is_none() {
            tracing::error!(subsystem = "controller", "failed to schedule table maintenance");
        }
    }

    /// A contact came up on `link`. A live session is kept; a dead one is
    /// replaced.
    pub fn new_neighbor(&mut self, link: Link) {
        if let Some(e) = self.encounters.get(&link.name) {
            if !e.neighbor_gone() {
                tracing::debug!(subsystem = "controller", link = %link.name, "session already open");
                return;
            }
            self.remove_encounter(&link.name);
        }
        let instance = self.next_instance();
        let name = link.name.clone();
        let link_acks = self.link_acks.entry(name.clone()).or_default();
        let mut ctx = RouterState {
            core: &mut self.core,
            params: &self.params,
            nodes: &mut self.nodes,
            stats: &mut self.stats,
            acks: &mut self.acks,
            repository: &mut self.repository,
            link_acks,
        };
        let mut e = Encounter::new(link, instance, &mut ctx);
        if e.neighbor_gone() {
            tracing::error!(subsystem = "controller", link = %name, "failed to open session");
            e.close(&mut self.core);
        } else {
            tracing::info!(subsystem = "controller", link = %name, remote = %e.remote_eid(), instance, "new neighbor");
            self.encounters.insert(name, e);
        }
        self.flush_routes();
    }

    /// The contact on `link` went down.
    pub fn neighbor_gone(&mut self, link: &str) {
        tracing::info!(subsystem = "controller", link, "neighbor gone");
        self.remove_encounter(link);
    }

    /// Admission check: a non-relay only takes bundles to or from itself.
    pub fn accept_bundle(&self, b: &Bundle) -> bool {
        if self.params.relay_node {
            return true;
        }
        let local = self.core.local_eid();
        let ok = self.core.is_route(&b.destination, &local) || self.core.is_route(&b.source, &local);
        if !ok {
            tracing::debug!(subsystem = "controller", dest = %b.destination, source = %b.source, "not a relay, refusing bundle");
        }
        ok
    }

    /// A bundle arrived over `link`. Control bundles feed the session and
    /// are then dropped from the host.
    pub fn handle_bundle_received(&mut self, b: &Bundle, link: &Link) {
        self.reap(&link.name);
        if !self.encounters.contains_key(&link.name) {
            tracing::info!(subsystem = "controller", link = %link.name, "bundle received without a session");
            return;
        }
        if !b.is_control() {
            self.with_encounter(&link.name, |e, ctx| e.handle_bundle_received(b, ctx));
            self.flush_routes();
            return;
        }

        match self.core.read_bundle(b) {
            None => {
                tracing::error!(subsystem = "controller", link = %link.name, "failed to read control bundle");
            }
            Some(bytes) => match ProphetTlv::decode(&b.source, &b.destination, &bytes) {
                Ok(tlv) => {
                    self.with_encounter(&link.name, |e, ctx| e.receive_tlv(&tlv, ctx));
                    self.reap(&link.name);
                }
                Err(e) => {
                    tracing::error!(subsystem = "controller", link = %link.name, error = %e, "failed to decode control bundle");
                }
            },
        }
        self.core.drop_bundle(b);
        self.flush_routes();
    }

    /// `b` went out over `link`; `b` carries the updated forward count.
    pub fn handle_bundle_transmitted(&mut self, b: &Bundle, link: &Link) {
        if b.is_control() {
            self.core.drop_bundle(b);
            return;
        }
        let p = self.nodes.p_value(&link.remote_eid);
        self.stats.update(b, p);
        let env = PolicyEnv {
            core: &self.core,
            stats: &self.stats,
            nodes: &self.nodes,
        };
        self.repository.change_priority(b, env);
    }

    /// `b` reached its destination.
    pub fn ack(&mut self, b: &Bundle) {
        retire_bundle(
            &mut self.core,
            &self.nodes,
            &mut self.stats,
            &mut self.acks,
            &mut self.repository,
            b,
        );
    }

    fn drop_evicted(&mut self, evicted: Vec<Bundle>) {
        for b in evicted {
            self.stats.drop_bundle(&b);
            self.core.drop_bundle(&b);
        }
    }

    /// The host stored `b`; evicts to stay within quota.
    pub fn bundle_stored(&mut self, b: &Bundle) {
        if b.is_control() {
            return;
        }
        let env = PolicyEnv {
            core: &self.core,
            stats: &self.stats,
            nodes: &self.nodes,
        };
        match self.repository.add(b.clone(), env) {
            Ok(evicted) => self.drop_evicted(evicted),
            Err(e) => tracing::debug!(subsystem = "controller", error = %e, "ignoring stored bundle"),
        }
    }

    /// The host deleted `b` on its own (expiry, delivery).
    pub fn bundle_deleted(&mut self, b: &Bundle) {
        let env = PolicyEnv {
            core: &self.core,
            stats: &self.stats,
            nodes: &self.nodes,
        };
        self.repository.del(b, env);
        self.stats.drop_bundle(b);
    }

    /// The host storage quota changed.
    pub fn handle_quota_changed(&mut self) {
        let env = PolicyEnv {
            core: &self.core,
            stats: &self.stats,
            nodes: &self.nodes,
        };
        let evicted = self.repository.handle_change_max(env);
        self.drop_evicted(evicted);
    }

    /// Dispatch an alarm the host scheduled for us.
    pub fn handle_alarm(&mut self, target: &AlarmTarget) {
        match target {
            AlarmTarget::Maintenance => self.handle_timeout(),
            AlarmTarget::Encounter { link, instance } => {
                let current = self
                    .encounters
                    .get(link)
                    .is_some_and(|e| e.local_instance() == *instance);
                if !current {
                    tracing::debug!(subsystem = "controller", link = %link, instance, "stale session alarm");
                    return;
                }
                self.with_encounter(link, |e, ctx| e.handle_timeout(ctx));
                self.reap(link);
                self.flush_routes();
            }
        }
    }

    /// Table maintenance: expire acks, age and truncate routes, reap dead
    /// sessions.
    pub fn handle_timeout(&mut self) {
        self.alarm = None;
        let now = self.core.now_ms();
        self.acks.expire(now / 1000);
        for acks in self.link_acks.values_mut() {
            acks.expire(now / 1000);
        }
        self.link_acks.retain(|_, acks| !acks.is_empty());
        self.nodes.age_nodes(now);
        self.nodes.truncate(self.params.epsilon);
        self.schedule_maintenance();
        self.reap_all();
        self.flush_routes();
    }

    /// Apply a whole new parameter set. Out-of-range weights reject the
    /// set and leave the router unchanged.
    pub fn set_params(&mut self, params: ProphetParams) -> Result<(), ParamsError> {
        params.validate()?;
        self.nodes.set_params(params.node_params())?;
        if let Err(e) = self.set_queue_policy(params.queue_policy, params.min_forward) {
            tracing::error!(subsystem = "controller", policy = %params.queue_policy, error = %e, "keeping queue policy");
        }
        self.set_max_route(params.max_table_size);
        let hello_interval = params.hello_interval;
        let age_changed = params.age_period != self.params.age_period;
        self.params = ProphetParams {
            queue_policy: self.params.queue_policy,
            min_forward: self.params.min_forward,
            hello_interval: self.params.hello_interval,
            max_table_size: self.params.max_table_size,
            ..params
        };
        self.set_hello_interval(hello_interval);
        if age_changed {
            self.schedule_maintenance();
        }
        self.flush_routes();
        Ok(())
    }

    /// Switch eviction order. Unchanged settings are a no-op.
    pub fn set_queue_policy(&mut self, policy: QueuePolicy, min_forward: u32) -> Result<(), PolicyError> {
        if policy == self.repository.policy() && min_forward == self.repository.min_forward() {
            return Ok(());
        }
        let env = PolicyEnv {
            core: &self.core,
            stats: &self.stats,
            nodes: &self.nodes,
        };
        self.repository.set_policy(policy, min_forward, env)?;
        self.params.queue_policy = policy;
        self.params.min_forward = min_forward;
        Ok(())
    }

    /// Change the hello interval (100 ms units) and retime every session.
    pub fn set_hello_interval(&mut self, interval: u8) {
        if interval == self.params.hello_interval {
            return;
        }
        tracing::info!(subsystem = "controller", from = self.params.hello_interval, to = interval, "hello interval changed");
        self.params.hello_interval = interval;
        let links: Vec<String> = self.encounters.keys().cloned().collect();
        for l in &links {
            self.with_encounter(l, |e, ctx| e.hello_interval_changed(ctx));
        }
        self.reap_all();
    }

    /// Cap the route table; 0 removes the cap.
    pub fn set_max_route(&mut self, max: usize) {
        self.params.max_table_size = max;
        self.nodes.set_max_route(max);
        self.flush_routes();
    }

    /// Cancel every alarm and close every session.
    pub fn shutdown(&mut self) {
        if let Some(id) = self.alarm.take() {
            self.core.cancel_alarm(id);
        }
        let links: Vec<String> = self.encounters.keys().cloned().collect();
        for l in &links {
            self.remove_encounter(l);
        }
        self.link_acks.clear();
        self.flush_routes();
        tracing::info!(subsystem = "controller", "prophet router stopped");
    }
}
