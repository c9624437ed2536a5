//! Value views of host bundles and links.

use std::cmp::Ordering;

/// Suffix that marks a Prophet control bundle's endpoint.
pub const PROPHET_SERVICE: &str = "prophet";

/// Lightweight view of a host bundle. The host owns the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bundle {
    pub source: String,
    pub destination: String,
    pub creation_ts: u32,
    pub seqno: u32,
    /// Lifetime in seconds, counted from `creation_ts`.
    pub expiration: u32,
    pub size: u64,
    pub num_forward: u32,
    pub custody_requested: bool,
}

/// Identity of a bundle as the host resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleKey {
    pub destination: String,
    pub creation_ts: u32,
    pub seqno: u32,
}

impl Bundle {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        creation_ts: u32,
        seqno: u32,
        expiration: u32,
        size: u64,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            creation_ts,
            seqno,
            expiration,
            size,
            num_forward: 0,
            custody_requested: false,
        }
    }

    pub fn key(&self) -> BundleKey {
        BundleKey {
            destination: self.destination.clone(),
            creation_ts: self.creation_ts,
            seqno: self.seqno,
        }
    }

    /// Same `(destination, creation_ts, seqno)`.
    pub fn same_bundle(&self, other: &Bundle) -> bool {
        self.creation_ts == other.creation_ts
            && self.seqno == other.seqno
            && self.destination == other.destination
    }

    /// Arrival order: by sequence number, then destination.
    pub fn fifo_cmp(&self, other: &Bundle) -> Ordering {
        self.seqno
            .cmp(&other.seqno)
            .then_with(|| self.destination.cmp(&other.destination))
    }

    /// Control bundles carry Prophet TLVs between routers.
    pub fn is_control(&self) -> bool {
        self.destination
            .strip_suffix(PROPHET_SERVICE)
            .is_some_and(|rest| rest.ends_with('/'))
    }

    /// Absolute expiry, in seconds.
    pub fn expires_at(&self) -> u64 {
        u64::from(self.creation_ts) + u64::from(self.expiration)
    }
}

/// A contact with a neighbor, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    /// Host-side link name; encounters are keyed by it.
    pub name: String,
    pub remote_eid: String,
    pub nexthop: String,
}

impl Link {
    pub fn new(name: impl Into<String>, remote_eid: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            nexthop: name.clone(),
            name,
            remote_eid: remote_eid.into(),
        }
    }

    pub fn with_nexthop(mut self, nexthop: impl Into<String>) -> Self {
        self.nexthop = nexthop.into();
        self
    }
}
