//! Discrete-event driver: a virtual clock, a contact schedule and one
//! Prophet router per node. Bundles cross an up contact instantly.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use prophet_core::{Bundle, BundleCore, BundleKey, Controller, Link};

use crate::config::{Config, MessageConfig};
use crate::host::SimCore;

/// Upper bound on forwarding rounds within one instant.
const MAX_ROUNDS: usize = 10_000;

/// What happened during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub injected: usize,
    pub delivered: usize,
    /// Sum of creation-to-delivery times.
    pub total_delay_ms: u64,
    pub control_bundles: u64,
    pub data_transmissions: u64,
    /// Bundles sent over a contact that had already gone down.
    pub lost: u64,
    pub expired: u64,
}

impl Report {
    pub fn delivery_ratio(&self) -> f64 {
        if self.injected == 0 {
            return 0.0;
        }
        self.delivered as f64 / self.injected as f64
    }

    pub fn mean_delay_secs(&self) -> f64 {
        if self.delivered == 0 {
            return 0.0;
        }
        self.total_delay_ms as f64 / self.delivered as f64 / 1000.0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delivered {}/{} ({:.1}%), mean delay {:.1}s, {} data transmissions, {} control bundles, {} lost, {} expired",
            self.delivered,
            self.injected,
            self.delivery_ratio() * 100.0,
            self.mean_delay_secs(),
            self.data_transmissions,
            self.control_bundles,
            self.lost,
            self.expired
        )
    }
}

pub struct Simulation {
    nodes: BTreeMap<String, Controller<SimCore>>,
    contacts: Vec<(String, String, u64, u64)>,
    /// Indices into `contacts` currently up.
    up: BTreeSet<usize>,
    messages: Vec<MessageConfig>,
    next_message: usize,
    next_seqno: u32,
    /// Injection time of every bundle still in flight.
    injected_at: HashMap<BundleKey, u64>,
    delivered: BTreeSet<BundleKey>,
    now: u64,
    end: u64,
    report: Report,
}

impl Simulation {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        if config.prophet.hello_interval == 0 {
            bail!("hello_interval must be positive");
        }
        let mut nodes = BTreeMap::new();
        for (i, eid) in config.nodes.iter().enumerate() {
            let core = SimCore::new(eid.clone(), config.quota, config.seed.wrapping_add(i as u64));
            nodes.insert(eid.clone(), Controller::new(core, config.prophet.clone()));
        }
        let contacts = config
            .contacts
            .iter()
            .map(|c| (c.a.clone(), c.b.clone(), c.start * 1000, c.end * 1000))
            .collect();
        let mut messages = config.messages.clone();
        messages.sort_by_key(|m| m.at);
        tracing::info!(
            nodes = nodes.len(),
            contacts = config.contacts.len(),
            messages = messages.len(),
            duration = config.duration,
            "simulation ready"
        );
        Ok(Self {
            nodes,
            contacts,
            up: BTreeSet::new(),
            messages,
            next_message: 0,
            next_seqno: 0,
            injected_at: HashMap::new(),
            delivered: BTreeSet::new(),
            now: 0,
            end: config.duration * 1000,
            report: Report::default(),
        })
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn node(&self, eid: &str) -> Option<&Controller<SimCore>> {
        self.nodes.get(eid)
    }

    pub fn node_mut(&mut self, eid: &str) -> Option<&mut Controller<SimCore>> {
        self.nodes.get_mut(eid)
    }

    pub fn is_delivered(&self, key: &BundleKey) -> bool {
        self.delivered.contains(key)
    }

    /// Run to the configured duration.
    pub fn run(&mut self) -> Report {
        self.run_until(&AtomicBool::new(false))
    }

    /// Run to the configured duration or until `stop` is set.
    pub fn run_until(&mut self, stop: &AtomicBool) -> Report {
        loop {
            self.step();
            if stop.load(Ordering::Relaxed) {
                tracing::info!(now = self.now, "simulation interrupted");
                break;
            }
            match self.next_event() {
                Some(t) if t <= self.end => self.now = t,
                _ => break,
            }
        }
        for c in self.nodes.values_mut() {
            c.shutdown();
        }
        tracing::info!(report = %self.report, "simulation finished");
        self.report.clone()
    }

    /// Advance the clock to `t` (no further than the end) processing every
    /// event on the way.
    pub fn run_to(&mut self, t: u64) {
        let t = t.min(self.end);
        self.step();
        while let Some(next) = self.next_event() {
            if next > t {
                break;
            }
            self.now = next;
            self.step();
        }
        if self.now < t {
            self.now = t;
            self.step();
        }
    }

    fn next_event(&self) -> Option<u64> {
        let now = self.now;
        let contacts = self
            .contacts
            .iter()
            .flat_map(|&(_, _, s, e)| [s, e])
            .filter(|&t| t > now);
        let message = self
            .messages
            .get(self.next_message)
            .map(|m| m.at * 1000)
            .filter(|&t| t > now);
        let alarms = self.nodes.values().filter_map(|c| c.core().next_alarm());
        contacts.chain(message).chain(alarms).min()
    }

    /// Process everything due at the current time.
    fn step(&mut self) {
        let now = self.now;
        for c in self.nodes.values_mut() {
            c.core_mut().set_now(now);
        }
        self.update_contacts();
        self.inject_messages();
        for eid in self.eids() {
            let Some(c) = self.nodes.get_mut(&eid) else {
                continue;
            };
            for target in c.core_mut().take_due_alarms() {
                c.handle_alarm(&target);
            }
            for b in c.core_mut().expire_bundles() {
                tracing::debug!(eid = %eid, dest = %b.destination, seqno = b.seqno, "bundle expired");
                c.bundle_deleted(&b);
                if !b.is_control() {
                    self.report.expired += 1;
                }
            }
        }
        self.forward();
    }

    fn eids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    fn link_is_up(&self, a: &str, b: &str) -> bool {
        self.up.iter().any(|&i| {
            let (x, y, _, _) = &self.contacts[i];
            (x == a && y == b) || (x == b && y == a)
        })
    }

    fn update_contacts(&mut self) {
        let now = self.now;
        for i in 0..self.contacts.len() {
            let (a, b, start, end) = self.contacts[i].clone();
            let active = start <= now && now < end;
            if active && !self.up.contains(&i) {
                self.up.insert(i);
                tracing::info!(a = %a, b = %b, now, "contact up");
                if let Some(c) = self.nodes.get_mut(&a) {
                    c.new_neighbor(Link::new(b.clone(), b.clone()));
                }
                if let Some(c) = self.nodes.get_mut(&b) {
                    c.new_neighbor(Link::new(a.clone(), a.clone()));
                }
            } else if !active && self.up.contains(&i) {
                self.up.remove(&i);
                tracing::info!(a = %a, b = %b, now, "contact down");
                if let Some(c) = self.nodes.get_mut(&a) {
                    c.neighbor_gone(&b);
                }
                if let Some(c) = self.nodes.get_mut(&b) {
                    c.neighbor_gone(&a);
                }
            }
        }
    }

    fn inject_messages(&mut self) {
        while let Some(m) = self.messages.get(self.next_message) {
            if m.at * 1000 > self.now {
                break;
            }
            let m = m.clone();
            self.next_message += 1;
            self.next_seqno += 1;
            let cts = u32::try_from(self.now / 1000).unwrap_or(u32::MAX);
            let b = Bundle::new(
                format!("{}/app", m.from),
                format!("{}/app", m.to),
                cts,
                self.next_seqno,
                m.lifetime,
                m.size,
            );
            let Some(c) = self.nodes.get_mut(&m.from) else {
                continue;
            };
            if !c.core_mut().insert(b.clone(), None) {
                continue;
            }
            c.bundle_stored(&b);
            self.injected_at.insert(b.key(), self.now);
            self.report.injected += 1;
            tracing::debug!(from = %m.from, to = %m.to, seqno = b.seqno, size = b.size, "message injected");
        }
    }

    /// Carry sent bundles across their contacts until every outbox is empty.
    fn forward(&mut self) {
        for _ in 0..MAX_ROUNDS {
            let mut moved = false;
            for eid in self.eids() {
                let outgoing = match self.nodes.get_mut(&eid) {
                    Some(c) => c.core_mut().take_outbox(),
                    None => continue,
                };
                for o in outgoing {
                    moved = true;
                    self.carry(&eid, o.bundle, &o.link, o.payload);
                }
            }
            if !moved {
                return;
            }
        }
        tracing::warn!(now = self.now, "forwarding did not settle");
    }

    fn carry(&mut self, from: &str, b: Bundle, to: &str, payload: Option<Vec<u8>>) {
        let up = self.link_is_up(from, to);
        let control = b.is_control();
        if control {
            self.report.control_bundles += 1;
        } else if up {
            self.report.data_transmissions += 1;
        }

        if let Some(sender) = self.nodes.get_mut(from) {
            let out_link = Link::new(to, to);
            if control {
                sender.handle_bundle_transmitted(&b, &out_link);
            } else if up {
                if let Some(sent) = sender.core_mut().record_forward(&b) {
                    sender.handle_bundle_transmitted(&sent, &out_link);
                }
            }
        }
        if !up {
            self.report.lost += 1;
            tracing::debug!(from, to, dest = %b.destination, "contact down, bundle lost");
            return;
        }

        let Some(receiver) = self.nodes.get_mut(to) else {
            return;
        };
        let in_link = Link::new(from, from);
        let local = receiver.core().local_eid();
        let for_us = !control && receiver.core().is_route(&b.destination, &local);
        if control {
            receiver.core_mut().insert(b.clone(), payload);
            receiver.handle_bundle_received(&b, &in_link);
            return;
        }
        if !receiver.accept_bundle(&b) {
            tracing::debug!(to, dest = %b.destination, "bundle refused");
            return;
        }
        let mut copy = b.clone();
        copy.num_forward = 0;
        if receiver.core_mut().insert(copy.clone(), payload) {
            receiver.bundle_stored(&copy);
        }
        receiver.handle_bundle_received(&copy, &in_link);
        if for_us {
            receiver.ack(&copy);
            let key = copy.key();
            if self.delivered.insert(key.clone()) {
                self.report.delivered += 1;
                if let Some(at) = self.injected_at.remove(&key) {
                    self.report.total_delay_ms += self.now.saturating_sub(at);
                }
                tracing::info!(to, dest = %copy.destination, seqno = copy.seqno, now = self.now, "bundle delivered");
            }
        }
    }
}
