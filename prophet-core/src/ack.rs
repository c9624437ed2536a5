//! Delivery acknowledgements, so delivered bundles stop circulating.

use std::collections::BTreeMap;

use crate::bundle::Bundle;
use crate::facade::BundleCore;

/// Lifetime given to acks that arrive without one, in seconds.
pub const DEFAULT_ACK_EXPIRY: u32 = 86_400;

/// Delivery record, ordered by `(route, creation_ts, seqno)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub route: String,
    pub creation_ts: u32,
    pub seqno: u32,
    /// Seconds after `creation_ts` at which the ack lapses.
    pub expiry: u32,
}

type AckKey = (String, u32, u32);

#[derive(Debug, Clone, Default)]
pub struct AckList {
    acks: BTreeMap<AckKey, u32>,
}

impl AckList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the ack was already present. `expiry == 0` means the default.
    pub fn insert(&mut self, route: &str, creation_ts: u32, seqno: u32, expiry: u32) -> bool {
        let expiry = if expiry == 0 { DEFAULT_ACK_EXPIRY } else { expiry };
        let key = (route.to_string(), creation_ts, seqno);
        if self.acks.contains_key(&key) {
            return false;
        }
        self.acks.insert(key, expiry);
        true
    }

    pub fn insert_ack(&mut self, ack: &Ack) -> bool {
        self.insert(&ack.route, ack.creation_ts, ack.seqno, ack.expiry)
    }

    /// Ack the delivery of `b`, keyed by its destination route.
    pub fn insert_bundle(&mut self, b: &Bundle, core: &dyn BundleCore) -> bool {
        self.insert(
            &core.get_route(&b.destination),
            b.creation_ts,
            b.seqno,
            b.expiration,
        )
    }

    pub fn is_ackd(&self, route: &str, creation_ts: u32, seqno: u32) -> bool {
        self.acks
            .contains_key(&(route.to_string(), creation_ts, seqno))
    }

    /// Every ack in order.
    pub fn clone_acks(&self) -> Vec<Ack> {
        self.iter().collect()
    }

    /// Acks for one route.
    pub fn fetch(&self, route: &str) -> Vec<Ack> {
        let start = (route.to_string(), 0, 0);
        self.acks
            .range(start..)
            .take_while(|((r, _, _), _)| r == route)
            .map(|((r, c, s), e)| Ack {
                route: r.clone(),
                creation_ts: *c,
                seqno: *s,
                expiry: *e,
            })
            .collect()
    }

    /// Drop acks older than their expiry; `now_secs` is wall time in seconds.
    pub fn expire(&mut self, now_secs: u64) -> usize {
        let before = self.acks.len();
        self.acks.retain(|(_, cts, _), ets| {
            now_secs.saturating_sub(u64::from(*cts)) <= u64::from(*ets)
        });
        let num = before - self.acks.len();
        if num > 0 {
            tracing::debug!(subsystem = "ack", num, "expired acks");
        }
        num
    }

    pub fn iter(&self) -> impl Iterator<Item = Ack> + '_ {
        self.acks.iter().map(|((r, c, s), e)| Ack {
            route: r.clone(),
            creation_ts: *c,
            seqno: *s,
            expiry: *e,
        })
    }

    pub fn len(&self) -> usize {
        self.acks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_unique_by_identity() {
        let mut l = AckList::new();
        assert!(l.insert("dtn://d", 10, 1, 0));
        assert!(!l.insert("dtn://d", 10, 1, 500));
        assert!(l.insert("dtn://d", 10, 2, 0));
        assert_eq!(l.len(), 2);
        assert_eq!(l.clone_acks()[0].expiry, DEFAULT_ACK_EXPIRY);
        assert!(l.is_ackd("dtn://d", 10, 2));
        assert!(!l.is_ackd("dtn://e", 10, 2));
    }

    #[test]
    fn ordering_and_fetch() {
        let mut l = AckList::new();
        l.insert("dtn://b", 5, 1, 0);
        l.insert("dtn://a", 9, 1, 0);
        l.insert("dtn://a", 2, 7, 0);
        l.insert("dtn://c", 1, 1, 0);
        let routes: Vec<(String, u32)> = l.iter().map(|a| (a.route, a.creation_ts)).collect();
        assert_eq!(
            routes,
            vec![
                ("dtn://a".into(), 2),
                ("dtn://a".into(), 9),
                ("dtn://b".into(), 5),
                ("dtn://c".into(), 1)
            ]
        );
        assert_eq!(l.fetch("dtn://a").len(), 2);
        assert!(l.fetch("dtn://z").is_empty());
    }

    #[test]
    fn expire_after_lifetime() {
        let mut l = AckList::new();
        l.insert("dtn://a", 100, 1, 50);
        l.insert("dtn://a", 100, 2, 500);
        assert_eq!(l.expire(150), 0);
        assert_eq!(l.expire(151), 1);
        assert!(l.is_ackd("dtn://a", 100, 2));
        assert_eq!(l.expire(700), 1);
        assert!(l.is_empty());
    }
}
