//! RIBD TLV: the routing information base dictionary.

use crate::dictionary::{align4, Dictionary, Sid, ROUTE_ENTRY_HEADER};
use crate::error::{DecodeError, DictionaryError, EncodeError};

use super::{put_u16, split_tlv, wire_len, Reader, WireTlv, LIST_HEADER_SIZE, RIBD_TLV};

/// Dictionary entries as carried on the wire. SIDs 0 and 1 are implied by
/// the session roles and never transmitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ribd {
    entries: Vec<(Sid, String)>,
}

impl Ribd {
    pub fn from_dictionary(dict: &Dictionary) -> Self {
        let entries = dict
            .iter()
            .filter(|(sid, _)| *sid >= 2)
            .map(|(sid, route)| (sid, route.to_string()))
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[(Sid, String)] {
        &self.entries
    }

    /// Rebuild the session dictionary, binding the two role SIDs first.
    pub fn dictionary(&self, sender: &str, receiver: &str) -> Result<Dictionary, DictionaryError> {
        let mut d = Dictionary::new(sender, receiver);
        for (sid, route) in &self.entries {
            d.assign(route, *sid)?;
        }
        Ok(d)
    }
}

impl WireTlv for Ribd {
    const TYPE: u8 = RIBD_TLV;

    fn length(&self) -> usize {
        LIST_HEADER_SIZE
            + self
                .entries
                .iter()
                .map(|(_, r)| align4(ROUTE_ENTRY_HEADER + r.len()))
                .sum::<usize>()
    }

    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let total = self.length();
        let mut out = Vec::with_capacity(total);
        out.push(RIBD_TLV);
        out.push(0);
        put_u16(&mut out, wire_len(total)?);
        put_u16(&mut out, wire_len(self.entries.len())?);
        put_u16(&mut out, 0);
        for (sid, route) in &self.entries {
            let len = u8::try_from(route.len()).map_err(|_| EncodeError::TooLarge(route.len()))?;
            let start = out.len();
            put_u16(&mut out, *sid);
            out.push(len);
            out.push(0);
            out.extend_from_slice(route.as_bytes());
            out.resize(start + align4(ROUTE_ENTRY_HEADER + route.len()), 0);
        }
        Ok(out)
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (_flags, body) = split_tlv(buf, RIBD_TLV, LIST_HEADER_SIZE)?;
        let mut r = Reader::new(body);
        r.bytes(4)?;
        let count = r.u16()?;
        r.u16()?;
        // assign into a scratch dictionary to catch duplicate sids or routes
        let mut seen = Dictionary::default();
        let mut entries = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let sid = r.u16()?;
            let len = usize::from(r.u8()?);
            r.u8()?;
            let padded = align4(ROUTE_ENTRY_HEADER + len) - ROUTE_ENTRY_HEADER;
            if padded > r.remaining() {
                return Err(DecodeError::Truncated {
                    need: r.pos() + padded,
                    got: body.len(),
                });
            }
            let raw = r.bytes(padded)?;
            let route = std::str::from_utf8(&raw[..len])
                .map_err(|_| DecodeError::BadRoute)?
                .to_string();
            seen.assign(&route, sid)?;
            entries.push((sid, route));
        }
        if r.pos() != body.len() {
            return Err(DecodeError::LengthMismatch {
                declared: body.len(),
                actual: r.pos(),
            });
        }
        Ok(Self { entries })
    }
}
