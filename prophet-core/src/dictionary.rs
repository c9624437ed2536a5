//! Session dictionary: bidirectional route <-> SID map used to compress the RIB.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::error::DictionaryError;

/// Session-local route identifier.
pub type Sid = u16;

/// Sentinel returned by lookups that fail.
pub const INVALID_SID: Sid = 0xffff;

/// SID reserved for the route of the session initiator.
pub const SENDER_SID: Sid = 0;

/// SID reserved for the route of the session responder.
pub const RECEIVER_SID: Sid = 1;

/// Bytes of fixed header per serialized route entry (sid, length, unused).
pub const ROUTE_ENTRY_HEADER: usize = 4;

/// Round `n` up to the next multiple of four.
pub fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Bidirectional mapping between routes and SIDs.
///
/// SIDs 0 and 1 belong to the sender and receiver; `insert` hands out the
/// rest densely from 2. Both directions always hold the same entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    by_route: HashMap<String, Sid>,
    by_sid: BTreeMap<Sid, String>,
}

impl Dictionary {
    /// Dictionary pre-loaded with the session roles. Empty routes leave the slot open.
    pub fn new(sender: &str, receiver: &str) -> Self {
        let mut d = Self::default();
        if !sender.is_empty() {
            let _ = d.assign(sender, SENDER_SID);
        }
        if !receiver.is_empty() {
            let _ = d.assign(receiver, RECEIVER_SID);
        }
        d
    }

    /// SID for `route`, or [`INVALID_SID`].
    pub fn find(&self, route: &str) -> Sid {
        if route.is_empty() {
            return INVALID_SID;
        }
        self.by_route.get(route).copied().unwrap_or(INVALID_SID)
    }

    /// Route for `sid`, or `""` if unassigned.
    pub fn route(&self, sid: Sid) -> &str {
        self.by_sid.get(&sid).map(String::as_str).unwrap_or("")
    }

    pub fn sender(&self) -> &str {
        self.route(SENDER_SID)
    }

    pub fn receiver(&self) -> &str {
        self.route(RECEIVER_SID)
    }

    /// Insert a new route and return its SID (always >= 2).
    pub fn insert(&mut self, route: &str) -> Result<Sid, DictionaryError> {
        if route.is_empty() {
            return Err(DictionaryError::EmptyRoute);
        }
        if self.by_route.contains_key(route) {
            return Err(DictionaryError::DuplicateRoute(route.to_string()));
        }
        let mut sid = u32::try_from(self.by_sid.len() + 2).unwrap_or(u32::from(INVALID_SID));
        while sid < u32::from(INVALID_SID) && self.by_sid.contains_key(&(sid as Sid)) {
            sid += 1;
        }
        if sid >= u32::from(INVALID_SID) {
            return Err(DictionaryError::Exhausted);
        }
        let sid = sid as Sid;
        self.by_route.insert(route.to_string(), sid);
        self.by_sid.insert(sid, route.to_string());
        Ok(sid)
    }

    /// Bind `route` to a caller-chosen `sid` (as read off the wire).
    pub fn assign(&mut self, route: &str, sid: Sid) -> Result<(), DictionaryError> {
        if route.is_empty() {
            return Err(DictionaryError::EmptyRoute);
        }
        if sid == INVALID_SID {
            return Err(DictionaryError::InvalidSid);
        }
        if self.by_sid.contains_key(&sid) {
            return Err(DictionaryError::SidCollision(sid));
        }
        if self.by_route.contains_key(route) {
            return Err(DictionaryError::DuplicateRoute(route.to_string()));
        }
        self.by_route.insert(route.to_string(), sid);
        self.by_sid.insert(sid, route.to_string());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.by_route.clear();
        self.by_sid.clear();
    }

    pub fn len(&self) -> usize {
        self.by_sid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sid.is_empty()
    }

    /// Entries in SID order.
    pub fn iter(&self) -> impl Iterator<Item = (Sid, &str)> {
        self.by_sid.iter().map(|(sid, r)| (*sid, r.as_str()))
    }

    /// Serialized size of every entry, each padded to four bytes.
    pub fn guess_size(&self) -> usize {
        self.by_sid
            .values()
            .map(|r| align4(ROUTE_ENTRY_HEADER + r.len()))
            .sum()
    }

    /// Log the contents at trace level.
    pub fn dump(&self, subsystem: &'static str) {
        for (sid, route) in self.iter() {
            tracing::trace!(subsystem, sid, route, "dictionary entry");
        }
    }
}
