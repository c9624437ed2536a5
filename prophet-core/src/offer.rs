//! Builders for the information-exchange TLVs: RIBD, RIB, Offer and Response.

use crate::ack::{Ack, AckList};
use crate::bundle::{Bundle, Link};
use crate::dictionary::{Dictionary, INVALID_SID, RECEIVER_SID, SENDER_SID};
use crate::error::{DictionaryError, PolicyError};
use crate::facade::BundleCore;
use crate::params::ProphetParams;
use crate::stats::Stats;
use crate::strategy::{Decider, FwdStrategy};
use crate::table::Table;
use crate::tlv::{BundleList, EntryKind, Rib, RibEntry, Ribd};

/// Bundles the Decider accepted, kept in FwdStrategy order.
pub struct BundleOffer<'a> {
    comp: FwdStrategy<'a>,
    decider: Decider<'a>,
    list: Vec<Bundle>,
}

impl<'a> BundleOffer<'a> {
    pub fn new(comp: FwdStrategy<'a>, decider: Decider<'a>) -> Self {
        Self {
            comp,
            decider,
            list: Vec::new(),
        }
    }

    /// Insert `b` in offer order if the Decider accepts it.
    pub fn add_bundle(&mut self, b: Bundle) -> bool {
        if !self.decider.accept(&b) {
            return false;
        }
        let pos = self
            .list
            .iter()
            .position(|i| !self.comp.comp(&b, i))
            .unwrap_or(self.list.len());
        self.list.insert(pos, b);
        true
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Offer entries for every accepted bundle, then every ack, that the
    /// peer's dictionary can name.
    pub fn get_bundle_offer(&self, core: &dyn BundleCore, ribd: &Dictionary, acks: &[Ack]) -> BundleList {
        let mut list = BundleList::new(EntryKind::Offer);
        for b in &self.list {
            let sid = ribd.find(&core.get_route(&b.destination));
            if sid == INVALID_SID {
                continue;
            }
            list.add_offer(b.creation_ts, b.seqno, sid, b.custody_requested, false);
        }
        for a in acks {
            let sid = ribd.find(&core.get_route(&a.route));
            if sid == INVALID_SID {
                continue;
            }
            list.add_offer(a.creation_ts, a.seqno, sid, false, true);
        }
        list
    }
}

/// Dictionary covering every route in `nodes`, plus the session roles.
pub fn build_ribd(
    core: &dyn BundleCore,
    nodes: &Table,
    sender: &str,
    receiver: &str,
) -> Result<(Ribd, Dictionary), DictionaryError> {
    let mut ribd = Dictionary::new(sender, receiver);
    for n in nodes.nodes() {
        let eid = core.get_route(n.route());
        if let Err(e) = ribd.insert(&eid) {
            if ribd.find(&eid) == INVALID_SID {
                return Err(e);
            }
        }
    }
    ribd.dump("ribd");
    Ok((Ribd::from_dictionary(&ribd), ribd))
}

/// Our predictabilities, named through `ribd`. The session roles are left
/// out; both ends know them.
pub fn build_rib(
    nodes: &Table,
    ribd: &Dictionary,
    relay: bool,
    custody: bool,
    internet: bool,
) -> Result<Rib, DictionaryError> {
    let sender = ribd.route(SENDER_SID);
    let receiver = ribd.route(RECEIVER_SID);
    let mut rib = Rib::new(relay, custody, internet);
    for n in nodes.nodes() {
        if n.route() == sender || n.route() == receiver {
            continue;
        }
        let sid = ribd.find(n.route());
        if sid == INVALID_SID {
            return Err(DictionaryError::InvalidSid);
        }
        tracing::debug!(subsystem = "rib", route = n.route(), sid, p = n.p_value(), "rib entry");
        rib.push(RibEntry {
            sid,
            p_value: n.p_value(),
            relay: n.relay(),
            custody: n.custody(),
            internet_gateway: n.internet_gateway(),
        });
    }
    Ok(rib)
}

/// Inputs to an Offer.
pub struct OfferContext<'a> {
    pub core: &'a dyn BundleCore,
    pub params: &'a ProphetParams,
    pub link: &'a Link,
    pub local: &'a Table,
    pub stats: &'a Stats,
    pub acks: &'a AckList,
}

/// Offer for the peer across `ctx.link`. `remote` and `ribd` are the peer's
/// table and dictionary. Acks already offered over this link are skipped;
/// the rest are recorded in `link_acks`.
pub fn build_offer(
    ctx: &OfferContext<'_>,
    remote: &Table,
    ribd: &Dictionary,
    link_acks: &mut AckList,
) -> Result<BundleList, PolicyError> {
    let strategy = ctx.params.forward_strategy;
    let comp = FwdStrategy::new(strategy, ctx.core, Some(ctx.local), Some(remote))?;
    let peer_relay = ctx
        .local
        .find(&ctx.link.remote_eid)
        .map(|n| n.relay())
        .unwrap_or(true);
    let decider = Decider::new(
        strategy,
        ctx.link,
        ctx.core,
        ctx.local,
        remote,
        Some(ctx.stats),
        ctx.params.max_forward,
        peer_relay,
    )?;
    let mut offer = BundleOffer::new(comp, decider);
    for b in ctx.core.bundles() {
        if b.is_control() {
            continue;
        }
        offer.add_bundle(b);
    }

    let fresh: Vec<Ack> = ctx
        .acks
        .iter()
        .filter(|a| link_acks.insert_ack(a))
        .collect();
    let list = offer.get_bundle_offer(ctx.core, ribd, &fresh);
    if list.is_empty() {
        tracing::debug!(subsystem = "offer", link = %ctx.link.name, "empty bundle offer");
    }
    for e in list.iter() {
        tracing::debug!(
            subsystem = "offer",
            cts = e.creation_ts,
            seqno = e.seqno,
            sid = e.sid,
            custody = e.custody,
            ack = e.ack,
            "offer entry"
        );
    }
    Ok(list)
}

/// What a received Offer asks of the local router.
#[derive(Debug, Default)]
pub struct ResponseOutcome {
    /// Stored bundles the peer reports delivered.
    pub delivered: Vec<Bundle>,
    /// Acks for bundles we do not hold.
    pub acks: Vec<Ack>,
}

/// Extend `response` with a request for every offered bundle we neither
/// hold nor know to be delivered. Acks in the offer are returned for the
/// caller to apply.
pub fn build_response(
    core: &dyn BundleCore,
    acks: &AckList,
    offers: &BundleList,
    ribd: &Dictionary,
    response: &mut BundleList,
) -> ResponseOutcome {
    let mut outcome = ResponseOutcome::default();
    let bundles = core.bundles();
    for o in offers.iter() {
        let eid = ribd.route(o.sid);
        let held = bundles
            .iter()
            .find(|b| b.creation_ts == o.creation_ts && b.seqno == o.seqno && core.is_route(&b.destination, eid));
        if o.ack {
            tracing::debug!(subsystem = "response", eid, cts = o.creation_ts, seqno = o.seqno, "ACK");
            match held {
                Some(b) => outcome.delivered.push(b.clone()),
                None => outcome.acks.push(Ack {
                    route: eid.to_string(),
                    creation_ts: o.creation_ts,
                    seqno: o.seqno,
                    expiry: 0,
                }),
            }
            continue;
        }
        if held.is_some() {
            continue;
        }
        if acks.is_ackd(eid, o.creation_ts, o.seqno) {
            tracing::debug!(subsystem = "response", eid, cts = o.creation_ts, seqno = o.seqno, "not requesting ACK'd bundle");
            continue;
        }
        let custody = o.custody && core.custody_accepted();
        if response.add_response(o.creation_ts, o.seqno, o.sid, custody) {
            tracing::debug!(subsystem = "response", eid, sid = o.sid, cts = o.creation_ts, seqno = o.seqno, "request");
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::strategy::ForwardStrategy;
    use crate::testing::TestCore;

    fn bundle(dest: &str, seq: u32) -> Bundle {
        Bundle::new("dtn://a/app", dest, 100, seq, 3600, 10)
    }

    #[test]
    fn ribd_and_rib_skip_roles() {
        let core = TestCore::new("dtn://a");
        let mut nodes = Table::new("local", false);
        nodes.update(Node::restore("dtn://b", 0.75, true, true, false, 0));
        nodes.update(Node::restore("dtn://c", 0.5, false, true, false, 0));
        let (ribd_tlv, ribd) = build_ribd(&core, &nodes, "dtn://a", "dtn://b").unwrap();
        assert_eq!(ribd.len(), 3);
        assert_eq!(ribd_tlv.entries().len(), 1);
        let rib = build_rib(&nodes, &ribd, true, true, false).unwrap();
        assert_eq!(rib.len(), 1);
        assert_eq!(rib.entries[0].sid, ribd.find("dtn://c"));
        assert!(!rib.entries[0].relay);
    }

    #[test]
    fn rib_fails_on_unnamed_route() {
        let mut nodes = Table::new("local", false);
        nodes.update(Node::restore("dtn://c", 0.5, true, true, false, 0));
        let ribd = Dictionary::new("dtn://a", "dtn://b");
        assert_eq!(
            build_rib(&nodes, &ribd, true, true, false).unwrap_err(),
            DictionaryError::InvalidSid
        );
    }

    #[test]
    fn offer_filters_orders_and_adds_acks_once() {
        let mut core = TestCore::new("dtn://a");
        core.add(bundle("dtn://c/app", 2));
        core.add(bundle("dtn://b/inbox", 3));
        core.add(bundle("dtn://c/app", 1));
        core.add(bundle("dtn://z/app", 4));
        core.add(Bundle::new("dtn://a/prophet", "dtn://b/prophet", 100, 5, 40, 0));

        let params = ProphetParams::default();
        let link = Link::new("l", "dtn://b");
        let mut local = Table::new("local", false);
        local.update_route("dtn://b", true, true, false, 0);
        let mut remote = Table::new("remote", false);
        remote.update(Node::restore("dtn://c", 0.6, true, true, false, 0));
        remote.update(Node::restore("dtn://z", 0.6, true, true, false, 0));

        // remote's dictionary names b (sender), a (receiver), c; z is unnamed
        let mut ribd = Dictionary::new("dtn://b", "dtn://a");
        let sid_c = ribd.insert("dtn://c").unwrap();

        let stats = Stats::new();
        let mut acks = AckList::new();
        acks.insert("dtn://c", 50, 9, 0);
        acks.insert("dtn://q", 50, 9, 0);
        let ctx = OfferContext {
            core: &core,
            params: &params,
            link: &link,
            local: &local,
            stats: &stats,
            acks: &acks,
        };
        let mut link_acks = AckList::new();
        let list = build_offer(&ctx, &remote, &ribd, &mut link_acks).unwrap();
        let got: Vec<(u32, u16, bool)> = list.iter().map(|e| (e.seqno, e.sid, e.ack)).collect();
        assert_eq!(
            got,
            vec![(1, sid_c, false), (2, sid_c, false), (3, 0, false), (9, sid_c, true)]
        );
        assert_eq!(link_acks.len(), 2);

        // acks go over a link once
        let again = build_offer(&ctx, &remote, &ribd, &mut link_acks).unwrap();
        assert!(again.iter().all(|e| !e.ack));
    }

    #[test]
    fn grtr_max_orders_by_remote_p() {
        let mut core = TestCore::new("dtn://a");
        core.add(bundle("dtn://c/app", 1));
        core.add(bundle("dtn://d/app", 2));
        let params = ProphetParams {
            forward_strategy: ForwardStrategy::GrtrMax,
            ..ProphetParams::default()
        };
        let link = Link::new("l", "dtn://b");
        let local = Table::new("local", false);
        let mut remote = Table::new("remote", false);
        remote.update(Node::restore("dtn://c", 0.3, true, true, false, 0));
        remote.update(Node::restore("dtn://d", 0.9, true, true, false, 0));
        let mut ribd = Dictionary::new("dtn://b", "dtn://a");
        ribd.insert("dtn://c").unwrap();
        ribd.insert("dtn://d").unwrap();
        let stats = Stats::new();
        let acks = AckList::new();
        let ctx = OfferContext {
            core: &core,
            params: &params,
            link: &link,
            local: &local,
            stats: &stats,
            acks: &acks,
        };
        let list = build_offer(&ctx, &remote, &ribd, &mut AckList::new()).unwrap();
        let seqs: Vec<u32> = list.iter().map(|e| e.seqno).collect();
        assert_eq!(seqs, vec![2, 1]);
    }

    #[test]
    fn response_requests_missing_and_collects_acks() {
        let mut core = TestCore::new("dtn://b");
        core.custody = false;
        core.add(bundle("dtn://c/app", 2));
        core.add(bundle("dtn://c/app", 7));

        let mut ribd = Dictionary::new("dtn://a", "dtn://b");
        let sid_c = ribd.insert("dtn://c").unwrap();
        let mut offers = BundleList::new(EntryKind::Offer);
        offers.add_offer(100, 1, sid_c, true, false);
        offers.add_offer(100, 2, sid_c, false, false);
        offers.add_offer(100, 3, sid_c, false, false);
        offers.add_offer(100, 7, sid_c, false, true);
        offers.add_offer(100, 8, sid_c, false, true);

        let mut acks = AckList::new();
        acks.insert("dtn://c", 100, 3, 0);
        let mut response = BundleList::new(EntryKind::Response);
        let outcome = build_response(&core, &acks, &offers, &ribd, &mut response);

        let req: Vec<(u32, bool)> = response.iter().map(|e| (e.seqno, e.custody)).collect();
        assert_eq!(req, vec![(1, false)]);
        assert_eq!(outcome.delivered.len(), 1);
        assert_eq!(outcome.delivered[0].seqno, 7);
        assert_eq!(outcome.acks.len(), 1);
        assert_eq!(outcome.acks[0].seqno, 8);

        // the list persists: a second pass adds nothing new
        build_response(&core, &acks, &offers, &ribd, &mut response);
        assert_eq!(response.len(), 1);
    }
}
