//! Per-bundle forwarding statistics used by the _PLUS strategies and MOPR queue policies.

use std::collections::HashMap;

use crate::bundle::{Bundle, BundleKey};

/// Running values for one bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsEntry {
    /// Highest predictability of any peer the bundle went to.
    pub p_max: f64,
    /// `mopr += (1 - mopr) * p` per forward.
    pub mopr: f64,
    /// `lmopr += p` per forward.
    pub lmopr: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    entries: HashMap<BundleKey, StatsEntry>,
    dropped: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a forward of `b` to a peer with predictability `p`.
    pub fn update(&mut self, b: &Bundle, p: f64) {
        let e = self.entries.entry(b.key()).or_default();
        if e.p_max < p {
            e.p_max = p;
        }
        e.mopr += (1.0 - e.mopr) * p;
        e.lmopr += p;
        tracing::trace!(
            subsystem = "stats",
            dest = %b.destination,
            seqno = b.seqno,
            p_max = e.p_max,
            mopr = e.mopr,
            lmopr = e.lmopr,
            "updated bundle stats"
        );
    }

    pub fn get(&self, b: &Bundle) -> StatsEntry {
        self.entries.get(&b.key()).copied().unwrap_or_default()
    }

    pub fn p_max(&self, b: &Bundle) -> f64 {
        self.get(b).p_max
    }

    pub fn mopr(&self, b: &Bundle) -> f64 {
        self.get(b).mopr
    }

    pub fn lmopr(&self, b: &Bundle) -> f64 {
        self.get(b).lmopr
    }

    /// Forget `b`; counts toward `dropped` only if it had an entry.
    pub fn drop_bundle(&mut self, b: &Bundle) {
        if self.entries.remove(&b.key()).is_some() {
            self.dropped += 1;
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn running_values() {
        let b = Bundle::new("dtn://s", "dtn://d", 1, 1, 60, 10);
        let mut s = Stats::new();
        assert_eq!(s.get(&b), StatsEntry::default());
        s.update(&b, 0.5);
        s.update(&b, 0.25);
        assert!(close(s.p_max(&b), 0.5));
        // 0.5, then 0.5 + 0.5 * 0.25
        assert!(close(s.mopr(&b), 0.625));
        assert!(close(s.lmopr(&b), 0.75));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn drop_counts_only_known_bundles() {
        let a = Bundle::new("dtn://s", "dtn://d", 1, 1, 60, 10);
        let b = Bundle::new("dtn://s", "dtn://d", 1, 2, 60, 10);
        let mut s = Stats::new();
        s.update(&a, 0.1);
        s.drop_bundle(&b);
        assert_eq!(s.dropped(), 0);
        s.drop_bundle(&a);
        assert_eq!(s.dropped(), 1);
        assert!(s.is_empty());
        assert_eq!(s.mopr(&a), 0.0);
    }
}
