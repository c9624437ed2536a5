//! Per-neighbor Prophet session: Hello handshake, then alternating
//! information-exchange phases (RIBD/RIB, Offer, Response) in each direction.
//!
//! The node with the lower EID is the "synsender": it sends the first SYN
//! and takes the initiator role in the first exchange. Every entry point
//! borrows the router's shared state through [`RouterState`] for the length
//! of one call. Any failure sets `neighbor_gone` and the Controller reaps
//! the session.

use std::fmt;

use crate::ack::AckList;
use crate::bundle::{Bundle, Link};
use crate::dictionary::{Dictionary, INVALID_SID};
use crate::facade::{AlarmId, AlarmTarget, BundleCore};
use crate::offer::{build_offer, build_response, build_ribd, build_rib, OfferContext};
use crate::params::ProphetParams;
use crate::queue_policy::PolicyEnv;
use crate::repository::Repository;
use crate::stats::Stats;
use crate::table::Table;
use crate::tlv::{BundleList, EntryKind, Hello, HelloFunction, ProphetTlv, ResultCode, Rib, Ribd, Tlv};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncounterState {
    /// Waiting for the neighbor's SYN.
    WaitNb,
    /// Sent SYN, waiting for SYNACK.
    SynSent,
    /// Got SYN, sent SYNACK, waiting for ACK.
    SynRcvd,
    Estab,
    /// Listener: waiting for the peer's RIBD.
    WaitDict,
    /// Listener: got RIBD, waiting for RIB.
    WaitRib,
    /// Listener: sent Offer, waiting for Response.
    Offer,
    /// Initiator: building RIBD and RIB.
    CreateDr,
    /// Initiator: sent RIBD and RIB, waiting for Offer.
    SendDr,
    /// Initiator: sent Response, waiting for bundles.
    Request,
    /// Exchange complete; idle until timer or peer wakes us.
    WaitInfo,
}

impl EncounterState {
    pub fn as_str(self) -> &'static str {
        match self {
            EncounterState::WaitNb => "WAIT_NB",
            EncounterState::SynSent => "SYNSENT",
            EncounterState::SynRcvd => "SYNRCVD",
            EncounterState::Estab => "ESTAB",
            EncounterState::WaitDict => "WAIT_DICT",
            EncounterState::WaitRib => "WAIT_RIB",
            EncounterState::Offer => "OFFER",
            EncounterState::CreateDr => "CREATE_DR",
            EncounterState::SendDr => "SEND_DR",
            EncounterState::Request => "REQUEST",
            EncounterState::WaitInfo => "WAIT_INFO",
        }
    }
}

impl fmt::Display for EncounterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Router state lent to an Encounter for a single call.
pub struct RouterState<'a> {
    pub core: &'a mut dyn BundleCore,
    pub params: &'a ProphetParams,
    pub nodes: &'a mut Table,
    pub stats: &'a mut Stats,
    pub acks: &'a mut AckList,
    pub repository: &'a mut Repository,
    /// Acks already offered over this session's link.
    pub link_acks: &'a mut AckList,
}

impl RouterState<'_> {
    pub fn now(&self) -> u64 {
        self.core.now_ms()
    }

    /// `b` reached its destination: remember that, then forget the bundle.
    pub fn ack(&mut self, b: &Bundle) {
        retire_bundle(
            &mut *self.core,
            &*self.nodes,
            &mut *self.stats,
            &mut *self.acks,
            &mut *self.repository,
            b,
        );
    }
}

/// Record the ack for a delivered bundle and drop it everywhere.
pub(crate) fn retire_bundle(
    core: &mut dyn BundleCore,
    nodes: &Table,
    stats: &mut Stats,
    acks: &mut AckList,
    repository: &mut Repository,
    b: &Bundle,
) {
    if b.is_control() {
        return;
    }
    tracing::debug!(subsystem = "controller", dest = %b.destination, seqno = b.seqno, "ack");
    acks.insert_bundle(b, &*core);
    stats.drop_bundle(b);
    let env = PolicyEnv {
        core: &*core,
        stats: &*stats,
        nodes,
    };
    repository.del(b, env);
    core.drop_bundle(b);
}

/// One peering session with the neighbor across `link`.
#[derive(Debug)]
pub struct Encounter {
    link: Link,
    local_instance: u16,
    remote_instance: u16,
    /// Transaction id of the peer's latest envelope.
    tid: u32,
    next_tid: u32,
    /// Negotiated interval between messages, ms.
    timeout: u64,
    synsender: bool,
    state: EncounterState,
    synsent: bool,
    estab: bool,
    neighbor_gone: bool,
    local_ribd: Dictionary,
    remote_ribd: Dictionary,
    remote_offers: BundleList,
    local_response: BundleList,
    remote_nodes: Table,
    hello_rate: u64,
    data_sent: u64,
    data_rcvd: u64,
    alarm: Option<AlarmId>,
}

impl Encounter {
    /// Open a session. The synsender greets with SYN straight away.
    pub fn new(link: Link, instance: u16, ctx: &mut RouterState<'_>) -> Self {
        let now = ctx.now();
        let synsender = ctx.core.local_eid() < link.remote_eid;
        let mut e = Self {
            link,
            local_instance: instance,
            remote_instance: 0,
            tid: 0,
            next_tid: 0,
            timeout: ctx.params.hello_interval_ms(),
            synsender,
            state: EncounterState::WaitNb,
            synsent: false,
            estab: false,
            neighbor_gone: false,
            local_ribd: Dictionary::default(),
            remote_ribd: Dictionary::default(),
            remote_offers: BundleList::new(EntryKind::Offer),
            local_response: BundleList::new(EntryKind::Response),
            remote_nodes: Table::new("remote", false),
            hello_rate: 0,
            data_sent: now,
            data_rcvd: now,
            alarm: None,
        };
        if e.synsender && e.send_hello(HelloFunction::Syn, ResultCode::NoSuccessAck, 0, ctx) {
            e.set_state(EncounterState::SynSent);
        }
        e.alarm = ctx
            .core
            .create_alarm(e.alarm_target(), e.timeout, false);
        if e.alarm.is_none() {
            e.neighbor_gone = true;
        }
        tracing::debug!(
            subsystem = "encounter",
            instance = e.local_instance,
            remote = %e.link.remote_eid,
            synsender = e.synsender,
            "session opened"
        );
        e
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn remote_eid(&self) -> &str {
        &self.link.remote_eid
    }

    pub fn local_instance(&self) -> u16 {
        self.local_instance
    }

    pub fn remote_instance(&self) -> u16 {
        self.remote_instance
    }

    pub fn state(&self) -> EncounterState {
        self.state
    }

    pub fn synsender(&self) -> bool {
        self.synsender
    }

    pub fn neighbor_gone(&self) -> bool {
        self.neighbor_gone
    }

    /// Negotiated timeout, ms.
    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn alarm(&self) -> Option<AlarmId> {
        self.alarm
    }

    /// The peer's table as of its last RIB.
    pub fn remote_nodes(&self) -> &Table {
        &self.remote_nodes
    }

    /// Bundles still requested from the peer.
    pub fn pending_requests(&self) -> &BundleList {
        &self.local_response
    }

    pub fn alarm_target(&self) -> AlarmTarget {
        AlarmTarget::Encounter {
            link: self.link.name.clone(),
            instance: self.local_instance,
        }
    }

    /// Cancel the pending alarm; call before dropping the session.
    pub fn close(&mut self, core: &mut dyn BundleCore) {
        if let Some(id) = self.alarm.take() {
            core.cancel_alarm(id);
        }
    }

    fn set_state(&mut self, to: EncounterState) {
        tracing::debug!(
            subsystem = "encounter",
            instance = self.local_instance,
            from = %self.state,
            to = %to,
            "state change"
        );
        self.state = to;
    }

    fn fresh_tid(&mut self) -> u32 {
        self.next_tid = self.next_tid.wrapping_add(1);
        if self.next_tid == 0 {
            self.next_tid = 1;
        }
        self.next_tid
    }

    fn reschedule(&mut self, ctx: &mut RouterState<'_>, jitter: bool) {
        if let Some(id) = self.alarm.take() {
            ctx.core.cancel_alarm(id);
        }
        self.alarm = ctx.core.create_alarm(self.alarm_target(), self.timeout, jitter);
        if self.alarm.is_none() {
            tracing::error!(subsystem = "encounter", instance = self.local_instance, "failed to schedule alarm");
            self.neighbor_gone = true;
        }
    }

    /// The local hello interval changed: shift the pending alarm by the
    /// difference and adopt the new timeout.
    pub fn hello_interval_changed(&mut self, ctx: &mut RouterState<'_>) {
        if self.neighbor_gone {
            return;
        }
        let timeout = ctx.params.hello_interval_ms();
        if timeout == self.timeout {
            return;
        }
        if let Some(id) = self.alarm {
            let remaining = ctx.core.alarm_remaining(id);
            if remaining > 0 {
                let next = if self.timeout > timeout {
                    remaining.saturating_sub(self.timeout - timeout)
                } else {
                    remaining + (timeout - self.timeout)
                };
                ctx.core.cancel_alarm(id);
                self.alarm = ctx.core.create_alarm(self.alarm_target(), next, false);
                if self.alarm.is_none() {
                    self.neighbor_gone = true;
                }
            }
        }
        tracing::debug!(
            subsystem = "encounter",
            instance = self.local_instance,
            from = self.timeout,
            to = timeout,
            "hello interval changed"
        );
        self.timeout = timeout;
    }

    /// Apply every TLV of a received envelope, in order, stopping at the
    /// first failure.
    pub fn receive_tlv(&mut self, tlv: &ProphetTlv, ctx: &mut RouterState<'_>) -> bool {
        if self.neighbor_gone {
            return false;
        }
        tracing::debug!(
            subsystem = "encounter",
            instance = self.local_instance,
            tid = tlv.transaction_id,
            count = tlv.tlvs.len(),
            "receive_tlv"
        );
        self.data_rcvd = ctx.now();
        if let Some(id) = self.alarm.take() {
            ctx.core.cancel_alarm(id);
        }
        self.tid = tlv.transaction_id;

        let mut ok = true;
        for t in &tlv.tlvs {
            ok = self.dispatch_tlv(t, tlv, ctx);
            if !ok {
                break;
            }
        }
        if ok {
            self.reschedule(ctx, true);
        } else {
            tracing::info!(subsystem = "encounter", instance = self.local_instance, state = %self.state, "session failed");
            self.neighbor_gone = true;
        }
        ok
    }

    fn dispatch_tlv(&mut self, t: &Tlv, envelope: &ProphetTlv, ctx: &mut RouterState<'_>) -> bool {
        let pre_dispatch = self.estab;
        match t {
            Tlv::Hello(hello) => {
                let ok = self.handle_hello_tlv(hello, envelope, ctx);
                if ok && !pre_dispatch && self.estab {
                    if self.synsender {
                        return self.begin_exchange(ctx);
                    }
                    self.set_state(EncounterState::WaitDict);
                }
                ok
            }
            Tlv::Error(_) => false,
            _ if !self.estab => {
                // traffic before the handshake finished: nudge the peer
                self.hello_rate = 2;
                match self.state {
                    EncounterState::SynSent => {
                        self.send_hello(HelloFunction::Syn, ResultCode::NoSuccessAck, 0, ctx)
                    }
                    EncounterState::SynRcvd => {
                        self.send_hello(HelloFunction::SynAck, ResultCode::NoSuccessAck, self.tid, ctx)
                    }
                    _ => true,
                }
            }
            Tlv::Ribd(ribd) => self.handle_ribd_tlv(ribd, ctx),
            Tlv::Rib(rib) => self.handle_rib_tlv(rib, ctx),
            Tlv::Offer(offer) => {
                let ok = self.handle_offer_tlv(offer, ctx);
                if ok && self.synsender && self.state == EncounterState::WaitInfo {
                    // initiator phase done, listen now
                    self.set_state(EncounterState::WaitDict);
                }
                ok
            }
            Tlv::Response(response) => {
                let ok = self.handle_response_tlv(response, ctx);
                if ok && !self.synsender && self.state == EncounterState::WaitInfo {
                    // listener phase done, initiate now
                    return self.begin_exchange(ctx);
                }
                ok
            }
        }
    }

    fn begin_exchange(&mut self, ctx: &mut RouterState<'_>) -> bool {
        self.set_state(EncounterState::CreateDr);
        let ok = self.send_dictionary_rib(ctx);
        if ok {
            self.set_state(EncounterState::SendDr);
        }
        ok
    }

    /// The peer has been quiet for longer than one hello interval since we last sent.
    fn idle_since_sent(&self, ctx: &RouterState<'_>) -> bool {
        ctx.now().saturating_sub(self.data_sent) > ctx.params.hello_interval_ms()
    }

    fn handle_hello_tlv(&mut self, hello: &Hello, envelope: &ProphetTlv, ctx: &mut RouterState<'_>) -> bool {
        let hello_a = self.remote_instance == envelope.sender_instance;
        let hello_b = hello_a && ctx.core.prophet_id_for(&self.link) == envelope.source;
        let hello_c = self.local_instance == envelope.receiver_instance;
        tracing::debug!(
            subsystem = "encounter",
            instance = self.local_instance,
            hf = hello.function.as_str(),
            timer = hello.timer,
            from = %hello.sender,
            hello_a,
            hello_b,
            hello_c,
            "handle_hello_tlv"
        );

        // both ends settle on the shorter interval
        let timer = u64::from(ctx.params.hello_interval.min(hello.timer)) * 100;
        if !self.estab && timer != self.timeout {
            tracing::debug!(subsystem = "encounter", instance = self.local_instance, from = self.timeout, to = timer, "timeout negotiated");
            self.timeout = timer;
        }

        let tid = self.tid;
        match hello.function {
            HelloFunction::Syn | HelloFunction::SynAck if self.estab => {
                self.hello_rate = 2;
                self.send_hello(HelloFunction::Ack, ResultCode::NoSuccessAck, tid, ctx)
            }
            HelloFunction::Syn => {
                if matches!(
                    self.state,
                    EncounterState::SynSent | EncounterState::SynRcvd | EncounterState::WaitNb
                ) {
                    self.remote_instance = envelope.sender_instance;
                    let ok = self.send_hello(HelloFunction::SynAck, ResultCode::NoSuccessAck, tid, ctx);
                    self.set_state(EncounterState::SynRcvd);
                    return ok;
                }
                true
            }
            HelloFunction::SynAck => {
                if !matches!(self.state, EncounterState::SynSent | EncounterState::SynRcvd) {
                    return true;
                }
                if !hello_c {
                    return self.send_hello(HelloFunction::RstAck, ResultCode::Failure, tid, ctx);
                }
                self.hello_rate = 0;
                self.remote_instance = envelope.sender_instance;
                let ok = self.send_hello(HelloFunction::Ack, ResultCode::NoSuccessAck, tid, ctx);
                if ok {
                    self.set_state(EncounterState::Estab);
                    self.estab = true;
                }
                ok
            }
            HelloFunction::Ack => self.handle_hello_ack(hello_b && hello_c, ctx),
            HelloFunction::RstAck => {
                if hello_a && hello_c && !self.synsent {
                    tracing::info!(subsystem = "encounter", instance = self.local_instance, "peer reset the session");
                    return false;
                }
                true
            }
            HelloFunction::Unknown(_) => true,
        }
    }

    fn handle_hello_ack(&mut self, verified: bool, ctx: &mut RouterState<'_>) -> bool {
        let tid = self.tid;
        if self.estab && !verified {
            return self.send_hello(HelloFunction::RstAck, ResultCode::Failure, tid, ctx);
        }
        match self.state {
            EncounterState::SynSent => {
                self.send_hello(HelloFunction::RstAck, ResultCode::Failure, tid, ctx)
            }
            EncounterState::SynRcvd => {
                if verified {
                    self.set_state(EncounterState::Estab);
                    self.estab = true;
                    true
                } else {
                    self.send_hello(HelloFunction::RstAck, ResultCode::Failure, tid, ctx)
                }
            }
            EncounterState::WaitRib | EncounterState::Offer => {
                self.set_state(EncounterState::WaitDict);
                true
            }
            EncounterState::Request => self.begin_exchange(ctx),
            EncounterState::WaitInfo => {
                // the peer is asking what is up
                if self.idle_since_sent(ctx) {
                    if self.synsender {
                        return self.begin_exchange(ctx);
                    }
                    self.set_state(EncounterState::WaitDict);
                }
                true
            }
            _ => true,
        }
    }

    /// Dictionary roles: the synsender's route is SID 0.
    fn roles(&self, ctx: &RouterState<'_>) -> (String, String) {
        let local = ctx.core.local_eid();
        let remote = self.link.remote_eid.clone();
        if self.synsender {
            (local, remote)
        } else {
            (remote, local)
        }
    }

    fn handle_ribd_tlv(&mut self, ribd: &Ribd, ctx: &mut RouterState<'_>) -> bool {
        tracing::debug!(subsystem = "encounter", instance = self.local_instance, state = %self.state, "handle_ribd_tlv");
        if self.state == EncounterState::WaitInfo && self.idle_since_sent(ctx) {
            if self.synsender {
                return false;
            }
            self.set_state(EncounterState::WaitDict);
        }
        match self.state {
            EncounterState::WaitInfo | EncounterState::WaitDict | EncounterState::WaitRib => {
                let (sender, receiver) = self.roles(ctx);
                match ribd.dictionary(&sender, &receiver) {
                    Ok(d) => self.remote_ribd = d,
                    Err(e) => {
                        tracing::error!(subsystem = "encounter", instance = self.local_instance, error = %e, "bad dictionary from peer");
                        return false;
                    }
                }
                self.remote_ribd.dump("encounter");
                self.set_state(EncounterState::WaitRib);
                true
            }
            EncounterState::Offer => self.send_offer(ctx),
            _ => false,
        }
    }

    fn handle_rib_tlv(&mut self, rib: &Rib, ctx: &mut RouterState<'_>) -> bool {
        tracing::debug!(subsystem = "encounter", instance = self.local_instance, entries = rib.len(), "handle_rib_tlv");
        if self.state != EncounterState::WaitRib {
            return false;
        }
        let now = ctx.now();
        let peer = self.link.remote_eid.clone();
        ctx.nodes
            .update_route(&peer, rib.relay, rib.custody, rib.internet_gateway, now);
        ctx.nodes.update_transitive_rib(&peer, rib, &self.remote_ribd, now);
        let mut remote = Table::new("remote", false);
        remote.assign_rib(rib, &self.remote_ribd);
        self.remote_nodes = remote;
        self.set_state(EncounterState::Offer);
        self.send_offer(ctx)
    }

    fn handle_offer_tlv(&mut self, offer: &BundleList, ctx: &mut RouterState<'_>) -> bool {
        match self.state {
            EncounterState::SendDr | EncounterState::Request => {
                tracing::debug!(subsystem = "encounter", instance = self.local_instance, offers = offer.len(), "received offers");
                self.remote_offers = offer.clone();
                self.set_state(EncounterState::Request);
                self.send_response(ctx)
            }
            EncounterState::WaitInfo => true,
            state => {
                tracing::error!(subsystem = "encounter", instance = self.local_instance, state = %state, "received offer in wrong state");
                false
            }
        }
    }

    fn handle_response_tlv(&mut self, response: &BundleList, ctx: &mut RouterState<'_>) -> bool {
        match self.state {
            EncounterState::WaitRib => {
                self.set_state(EncounterState::WaitDict);
                let tid = self.tid;
                self.send_hello(HelloFunction::Ack, ResultCode::NoSuccessAck, tid, ctx)
            }
            EncounterState::Offer if response.is_empty() => {
                tracing::debug!(subsystem = "encounter", instance = self.local_instance, "received empty request");
                self.set_state(EncounterState::WaitInfo);
                true
            }
            EncounterState::Offer => {
                tracing::debug!(subsystem = "encounter", instance = self.local_instance, requests = response.len(), "received requests");
                for r in response.iter() {
                    let eid = self.remote_ribd.route(r.sid).to_string();
                    let Some(b) = ctx.core.find(&eid, r.creation_ts, r.seqno) else {
                        tracing::error!(subsystem = "encounter", sid = r.sid, eid = %eid, cts = r.creation_ts, seqno = r.seqno, "failed to locate bundle for request");
                        continue;
                    };
                    if !ctx.core.send_bundle(&b, &self.link) {
                        tracing::error!(subsystem = "encounter", eid = %eid, cts = r.creation_ts, seqno = r.seqno, "failed to send bundle for request");
                        continue;
                    }
                    self.data_sent = ctx.now();
                }
                true
            }
            state => {
                tracing::error!(subsystem = "encounter", instance = self.local_instance, state = %state, "received response in wrong state");
                false
            }
        }
    }

    /// A data bundle arrived from the peer; strike it from our requests.
    pub fn handle_bundle_received(&mut self, b: &Bundle, ctx: &mut RouterState<'_>) {
        if self.state != EncounterState::Request {
            return;
        }
        tracing::debug!(subsystem = "encounter", dest = %b.destination, cts = b.creation_ts, seqno = b.seqno, "handle_bundle_received");
        let eid = ctx.core.get_route(&b.destination);
        let sid = self.local_ribd.find(&eid);
        if sid == INVALID_SID {
            return;
        }
        self.local_response.remove_entry(b.creation_ts, b.seqno, sid);
        self.reschedule(ctx, true);
    }

    /// The session alarm fired.
    pub fn handle_timeout(&mut self, ctx: &mut RouterState<'_>) {
        if self.neighbor_gone {
            return;
        }
        self.alarm = None;
        let tid = self.tid;
        let now = ctx.now();
        tracing::debug!(subsystem = "encounter", instance = self.local_instance, state = %self.state, "handle_timeout");
        let ok = match self.state {
            EncounterState::WaitNb => true,
            EncounterState::SynSent => {
                self.send_hello(HelloFunction::Syn, ResultCode::NoSuccessAck, 0, ctx)
            }
            EncounterState::SynRcvd => {
                self.send_hello(HelloFunction::SynAck, ResultCode::NoSuccessAck, tid, ctx)
            }
            EncounterState::Estab | EncounterState::CreateDr => false,
            EncounterState::WaitDict => {
                self.send_hello(HelloFunction::Ack, ResultCode::NoSuccessAck, tid, ctx)
            }
            EncounterState::WaitRib => {
                let ok = self.send_hello(HelloFunction::Ack, ResultCode::NoSuccessAck, tid, ctx);
                self.set_state(EncounterState::WaitDict);
                ok
            }
            EncounterState::Offer => self.send_offer(ctx),
            EncounterState::SendDr => self.send_dictionary_rib(ctx),
            EncounterState::Request => self.send_response(ctx),
            EncounterState::WaitInfo => {
                if now.saturating_sub(self.data_rcvd) > ctx.params.hello_dead_ms() / 2 {
                    if self.synsender {
                        self.begin_exchange(ctx)
                    } else {
                        self.set_state(EncounterState::WaitDict);
                        true
                    }
                } else {
                    true
                }
            }
        };
        if !ok || now.saturating_sub(self.data_rcvd) > ctx.params.hello_dead_ms() {
            tracing::info!(subsystem = "encounter", instance = self.local_instance, state = %self.state, "neighbor gone");
            self.neighbor_gone = true;
            return;
        }
        self.reschedule(ctx, true);
    }

    fn envelope(&mut self, result: ResultCode, tid: u32, ctx: &RouterState<'_>) -> ProphetTlv {
        let tid = if tid == 0 { self.fresh_tid() } else { tid };
        ProphetTlv::new(
            ctx.core.prophet_id(),
            ctx.core.prophet_id_for(&self.link),
            result,
            self.local_instance,
            self.remote_instance,
            tid,
        )
    }

    fn send_hello(&mut self, hf: HelloFunction, result: ResultCode, tid: u32, ctx: &mut RouterState<'_>) -> bool {
        // flow control on repeated hellos
        if self.state != EncounterState::WaitNb
            && self.hello_rate > 0
            && hf != HelloFunction::RstAck
            && ctx.now().saturating_sub(self.data_sent) < self.timeout / self.hello_rate
        {
            return true;
        }
        let hello = Hello::new(hf, ctx.params.hello_interval, ctx.core.local_eid());
        tracing::debug!(subsystem = "encounter", instance = self.local_instance, hf = hf.as_str(), timer = hello.timer, "send_hello");
        let mut tlv = self.envelope(result, tid, ctx);
        tlv.add_tlv(Tlv::Hello(hello));
        let ok = self.send_tlv(&tlv, ctx);
        if ok && matches!(hf, HelloFunction::Syn | HelloFunction::SynAck) {
            self.synsent = true;
        }
        ok
    }

    fn send_dictionary_rib(&mut self, ctx: &mut RouterState<'_>) -> bool {
        if !matches!(self.state, EncounterState::CreateDr | EncounterState::SendDr) {
            return false;
        }
        let (sender, receiver) = self.roles(ctx);
        let (ribd, dict) = match build_ribd(&*ctx.core, ctx.nodes, &sender, &receiver) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(subsystem = "encounter", instance = self.local_instance, error = %e, "failed to build dictionary");
                return false;
            }
        };
        self.local_ribd = dict;
        let rib = match build_rib(
            ctx.nodes,
            &self.local_ribd,
            ctx.params.relay_node,
            ctx.core.custody_accepted(),
            ctx.params.internet_gw,
        ) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(subsystem = "encounter", instance = self.local_instance, error = %e, "failed to build rib");
                return false;
            }
        };
        let mut tlv = self.envelope(ResultCode::NoSuccessAck, 0, ctx);
        tlv.add_tlv(Tlv::Ribd(ribd));
        tlv.add_tlv(Tlv::Rib(rib));
        self.send_tlv(&tlv, ctx)
    }

    fn send_offer(&mut self, ctx: &mut RouterState<'_>) -> bool {
        let offer_ctx = OfferContext {
            core: &*ctx.core,
            params: ctx.params,
            link: &self.link,
            local: &*ctx.nodes,
            stats: &*ctx.stats,
            acks: &*ctx.acks,
        };
        let list = match build_offer(&offer_ctx, &self.remote_nodes, &self.remote_ribd, &mut *ctx.link_acks) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(subsystem = "encounter", instance = self.local_instance, error = %e, "failed to build offer");
                return false;
            }
        };
        let mut tlv = self.envelope(ResultCode::NoSuccessAck, 0, ctx);
        tlv.add_tlv(Tlv::Offer(list));
        self.send_tlv(&tlv, ctx)
    }

    fn send_response(&mut self, ctx: &mut RouterState<'_>) -> bool {
        let outcome = build_response(
            &*ctx.core,
            &*ctx.acks,
            &self.remote_offers,
            &self.local_ribd,
            &mut self.local_response,
        );
        for b in &outcome.delivered {
            ctx.ack(b);
        }
        for a in &outcome.acks {
            ctx.acks.insert_ack(a);
        }
        let wait_info = self.local_response.is_empty();
        let mut tlv = self.envelope(ResultCode::NoSuccessAck, 0, ctx);
        tlv.add_tlv(Tlv::Response(self.local_response.clone()));
        let ok = self.send_tlv(&tlv, ctx);
        if ok && wait_info {
            self.set_state(EncounterState::WaitInfo);
        }
        ok
    }

    /// Wrap `tlv` in a control bundle and hand it to the host.
    fn send_tlv(&mut self, tlv: &ProphetTlv, ctx: &mut RouterState<'_>) -> bool {
        let bytes = match tlv.encode() {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(subsystem = "encounter", instance = self.local_instance, error = %e, "failed to encode TLV");
                return false;
            }
        };
        let expiration = ctx.params.control_expiration();
        let b = ctx.core.create_bundle(&tlv.source, &tlv.destination, expiration);
        tracing::trace!(subsystem = "encounter", instance = self.local_instance, tid = tlv.transaction_id, count = tlv.tlvs.len(), len = bytes.len(), "send_tlv");
        if !ctx.core.write_bundle(&b, &bytes) {
            tracing::error!(subsystem = "encounter", instance = self.local_instance, "failed to write TLV");
            return false;
        }
        if !ctx.core.send_bundle(&b, &self.link) {
            tracing::error!(subsystem = "encounter", instance = self.local_instance, "failed to send TLV");
            return false;
        }
        self.data_sent = ctx.now();
        true
    }
}
