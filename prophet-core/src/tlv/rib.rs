//! RIB TLV: per-route delivery predictabilities keyed by dictionary SID.

use crate::dictionary::Sid;
use crate::error::{DecodeError, EncodeError};

use super::{put_u16, split_tlv, wire_len, Reader, WireTlv, LIST_HEADER_SIZE, RIB_TLV};

pub const RIB_ENTRY_SIZE: usize = 4;

pub const RELAY_NODE: u8 = 0x01;
pub const CUSTODY_NODE: u8 = 0x02;
pub const INTERNET_GW_NODE: u8 = 0x04;

fn encode_flags(relay: bool, custody: bool, internet: bool) -> u8 {
    let mut flags = 0;
    if relay {
        flags |= RELAY_NODE;
    }
    if custody {
        flags |= CUSTODY_NODE;
    }
    if internet {
        flags |= INTERNET_GW_NODE;
    }
    flags
}

/// Scale a predictability to the 8-bit wire form.
pub fn p_to_wire(p: f64) -> u8 {
    (p.clamp(0.0, 1.0) * 255.0) as u8
}

pub fn p_from_wire(b: u8) -> f64 {
    f64::from(b) / 255.0
}

/// One remote route estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct RibEntry {
    pub sid: Sid,
    pub p_value: f64,
    pub relay: bool,
    pub custody: bool,
    pub internet_gateway: bool,
}

/// RIB TLV. The header flags describe the sender itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rib {
    pub relay: bool,
    pub custody: bool,
    pub internet_gateway: bool,
    pub entries: Vec<RibEntry>,
}

impl Rib {
    pub fn new(relay: bool, custody: bool, internet_gateway: bool) -> Self {
        Self {
            relay,
            custody,
            internet_gateway,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: RibEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WireTlv for Rib {
    const TYPE: u8 = RIB_TLV;

    fn length(&self) -> usize {
        LIST_HEADER_SIZE + RIB_ENTRY_SIZE * self.entries.len()
    }

    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let total = self.length();
        let mut out = Vec::with_capacity(total);
        out.push(RIB_TLV);
        out.push(encode_flags(self.relay, self.custody, self.internet_gateway));
        put_u16(&mut out, wire_len(total)?);
        put_u16(&mut out, wire_len(self.entries.len())?);
        put_u16(&mut out, 0);
        for e in &self.entries {
            put_u16(&mut out, e.sid);
            out.push(p_to_wire(e.p_value));
            out.push(encode_flags(e.relay, e.custody, e.internet_gateway));
        }
        Ok(out)
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (flags, body) = split_tlv(buf, RIB_TLV, LIST_HEADER_SIZE)?;
        let mut r = Reader::new(body);
        r.bytes(4)?;
        let count = r.u16()?;
        r.u16()?;
        let mut rib = Rib::new(
            flags & RELAY_NODE != 0,
            flags & CUSTODY_NODE != 0,
            flags & INTERNET_GW_NODE != 0,
        );
        for _ in 0..count {
            let sid = r.u16()?;
            let p = r.u8()?;
            let f = r.u8()?;
            rib.push(RibEntry {
                sid,
                p_value: p_from_wire(p),
                relay: f & RELAY_NODE != 0,
                custody: f & CUSTODY_NODE != 0,
                internet_gateway: f & INTERNET_GW_NODE != 0,
            });
        }
        if r.pos() != body.len() {
            return Err(DecodeError::LengthMismatch {
                declared: body.len(),
                actual: r.pos(),
            });
        }
        Ok(rib)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sid: Sid, p: f64) -> RibEntry {
        RibEntry {
            sid,
            p_value: p,
            relay: true,
            custody: false,
            internet_gateway: sid % 2 == 0,
        }
    }

    #[test]
    fn layout() {
        let mut rib = Rib::new(true, true, false);
        rib.push(entry(2, 1.0));
        rib.push(entry(3, 0.5));
        let bytes = rib.encode().unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[1], RELAY_NODE | CUSTODY_NODE);
        assert_eq!(&bytes[4..6], &[0, 2]);
        assert_eq!(&bytes[8..12], &[0, 2, 255, RELAY_NODE | INTERNET_GW_NODE]);
        assert_eq!(&bytes[12..16], &[0, 3, 127, RELAY_NODE]);
    }

    #[test]
    fn decode_scales_p_value() {
        let mut rib = Rib::new(false, false, true);
        rib.push(entry(5, 0.75));
        let decoded = Rib::decode(&rib.encode().unwrap()).unwrap();
        assert!(decoded.internet_gateway);
        assert!(!decoded.relay);
        assert_eq!(decoded.len(), 1);
        let e = &decoded.entries[0];
        assert_eq!(e.sid, 5);
        assert!((e.p_value - 0.75).abs() < 1.0 / 255.0);
        assert!(e.relay);
        assert!(!e.internet_gateway);
    }

    #[test]
    fn exact_wire_values_roundtrip() {
        let mut rib = Rib::new(true, false, false);
        rib.push(entry(2, 0.0));
        rib.push(entry(4, 1.0));
        let decoded = Rib::decode(&rib.encode().unwrap()).unwrap();
        assert_eq!(decoded, rib);
    }

    #[test]
    fn decode_rejects_count_beyond_length() {
        let mut rib = Rib::new(true, false, false);
        rib.push(entry(2, 0.5));
        let mut bytes = rib.encode().unwrap();
        bytes[5] = 2;
        assert!(matches!(
            Rib::decode(&bytes),
            Err(DecodeError::Truncated { .. })
        ));
        bytes[5] = 0;
        assert!(matches!(
            Rib::decode(&bytes),
            Err(DecodeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn empty_rib() {
        let rib = Rib::new(true, true, true);
        let bytes = rib.encode().unwrap();
        assert_eq!(bytes.len(), LIST_HEADER_SIZE);
        assert_eq!(Rib::decode(&bytes).unwrap(), rib);
    }
}
