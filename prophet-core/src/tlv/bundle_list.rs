//! Offer and Response TLVs: lists of 12-byte bundle entries.

use crate::dictionary::Sid;
use crate::error::{DecodeError, EncodeError};

use super::{
    put_u16, put_u32, split_tlv, wire_len, write_encoded, Reader, LIST_HEADER_SIZE, OFFER_TLV,
    RESPONSE_TLV,
};

pub const BUNDLE_ENTRY_SIZE: usize = 12;

pub const CUSTODY: u8 = 0x01;
pub const ACCEPTED: u8 = 0x02;
pub const ACK: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Offer,
    Response,
}

impl EntryKind {
    /// Infer the entry kind from its flag combination; `None` when illegal.
    pub fn from_flags(custody: bool, accept: bool, ack: bool) -> Option<Self> {
        if accept && ack {
            return None;
        }
        if !accept {
            // custody on an ack makes no sense
            if custody && ack {
                return None;
            }
            return Some(EntryKind::Offer);
        }
        Some(EntryKind::Response)
    }

    pub fn type_code(self) -> u8 {
        match self {
            EntryKind::Offer => OFFER_TLV,
            EntryKind::Response => RESPONSE_TLV,
        }
    }
}

/// One offered or requested bundle, identified by `(cts, seq, sid)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleEntry {
    pub creation_ts: u32,
    pub seqno: u32,
    pub sid: Sid,
    pub custody: bool,
    pub accept: bool,
    pub ack: bool,
}

impl BundleEntry {
    pub fn kind(&self) -> Option<EntryKind> {
        EntryKind::from_flags(self.custody, self.accept, self.ack)
    }

    fn flags(&self) -> u8 {
        let mut f = 0;
        if self.custody {
            f |= CUSTODY;
        }
        if self.accept {
            f |= ACCEPTED;
        }
        if self.ack {
            f |= ACK;
        }
        f
    }

    fn matches(&self, cts: u32, seq: u32, sid: Sid) -> bool {
        self.creation_ts == cts && self.seqno == seq && self.sid == sid
    }
}

/// Ordered, duplicate-free list holding entries of a single kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleList {
    kind: EntryKind,
    entries: Vec<BundleEntry>,
}

impl BundleList {
    pub fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Append an entry. Fails on a kind mismatch, an illegal flag mix, or a duplicate.
    pub fn push(&mut self, entry: BundleEntry) -> bool {
        if entry.kind() != Some(self.kind) {
            return false;
        }
        if self.find(entry.creation_ts, entry.seqno, entry.sid).is_some() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn add_offer(&mut self, cts: u32, seq: u32, sid: Sid, custody: bool, ack: bool) -> bool {
        self.push(BundleEntry {
            creation_ts: cts,
            seqno: seq,
            sid,
            custody,
            accept: false,
            ack,
        })
    }

    pub fn add_response(&mut self, cts: u32, seq: u32, sid: Sid, custody: bool) -> bool {
        self.push(BundleEntry {
            creation_ts: cts,
            seqno: seq,
            sid,
            custody,
            accept: true,
            ack: false,
        })
    }

    pub fn find(&self, cts: u32, seq: u32, sid: Sid) -> Option<&BundleEntry> {
        self.entries.iter().find(|e| e.matches(cts, seq, sid))
    }

    /// Remove the entry if present; returns whether one was removed.
    pub fn remove_entry(&mut self, cts: u32, seq: u32, sid: Sid) -> bool {
        match self.entries.iter().position(|e| e.matches(cts, seq, sid)) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BundleEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn length(&self) -> usize {
        LIST_HEADER_SIZE + BUNDLE_ENTRY_SIZE * self.entries.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let total = self.length();
        let mut out = Vec::with_capacity(total);
        out.push(self.kind.type_code());
        out.push(0);
        put_u16(&mut out, wire_len(total)?);
        put_u16(&mut out, wire_len(self.entries.len())?);
        put_u16(&mut out, 0);
        for e in &self.entries {
            put_u16(&mut out, e.sid);
            out.push(e.flags());
            out.push(0);
            put_u32(&mut out, e.creation_ts);
            put_u32(&mut out, e.seqno);
        }
        Ok(out)
    }

    /// Write into `buf` and return bytes written. `buf` is untouched on error.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        write_encoded(self.encode(), buf)
    }

    /// Write into `buf`; 0 on failure with `buf` untouched.
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        self.encode_into(buf).unwrap_or(0)
    }

    /// Decode a list that must hold entries of `kind` only.
    pub fn decode_kind(buf: &[u8], kind: EntryKind) -> Result<Self, DecodeError> {
        let (_flags, body) = split_tlv(buf, kind.type_code(), LIST_HEADER_SIZE)?;
        let mut r = Reader::new(body);
        r.bytes(4)?;
        let count = r.u16()?;
        r.u16()?;
        let mut list = BundleList::new(kind);
        for _ in 0..count {
            let sid = r.u16()?;
            let flags = r.u8()?;
            r.u8()?;
            let creation_ts = r.u32()?;
            let seqno = r.u32()?;
            let entry = BundleEntry {
                creation_ts,
                seqno,
                sid,
                custody: flags & CUSTODY != 0,
                accept: flags & ACCEPTED != 0,
                ack: flags & ACK != 0,
            };
            match entry.kind() {
                None => return Err(DecodeError::IllegalFlags(flags)),
                Some(k) if k != kind => return Err(DecodeError::WrongEntryKind),
                Some(_) => {}
            }
            if !list.push(entry) {
                return Err(DecodeError::DuplicateEntry);
            }
        }
        if r.pos() != body.len() {
            return Err(DecodeError::LengthMismatch {
                declared: body.len(),
                actual: r.pos(),
            });
        }
        Ok(list)
    }
}

impl<'a> IntoIterator for &'a BundleList {
    type Item = &'a BundleEntry;
    type IntoIter = std::slice::Iter<'a, BundleEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
