//! Prophet wire format: the outer envelope and the nested TLV family.
//!
//! All multi-byte integers are network byte order. Every TLV starts with
//! `type:u8, flags:u8, length:u16`, where `length` counts the whole TLV.

mod bundle_list;
mod hello;
mod rib;
mod ribd;

pub use bundle_list::{BundleEntry, BundleList, EntryKind, BUNDLE_ENTRY_SIZE};
pub use hello::{Hello, HelloFunction, HELLO_HEADER_SIZE};
pub use rib::{Rib, RibEntry, RIB_ENTRY_SIZE};
pub use ribd::Ribd;

use crate::error::{DecodeError, EncodeError};

pub const HELLO_TLV: u8 = 0x01;
pub const ERROR_TLV: u8 = 0x02;
pub const RIBD_TLV: u8 = 0xa0;
pub const RIB_TLV: u8 = 0xa1;
pub const OFFER_TLV: u8 = 0xa2;
pub const RESPONSE_TLV: u8 = 0xa3;

/// Bytes in the common `type, flags, length` prefix.
pub const TLV_HEADER_SIZE: usize = 4;

/// Bytes in the RIBD/RIB/Offer/Response header (prefix + count + unused).
pub const LIST_HEADER_SIZE: usize = 8;

/// Bytes in the Prophet envelope header.
pub const PROPHET_HEADER_SIZE: usize = 16;

/// Protocol version carried in every envelope.
pub const PROPHET_VERSION: u8 = 0x01;

/// Encode/decode contract shared by every nested TLV.
pub trait WireTlv: Sized {
    const TYPE: u8;

    /// Total encoded length, header included.
    fn length(&self) -> usize;

    fn encode(&self) -> Result<Vec<u8>, EncodeError>;

    /// Decode one TLV from the front of `buf`. Trailing bytes are ignored.
    fn decode(buf: &[u8]) -> Result<Self, DecodeError>;

    /// Write into `buf` and return bytes written. `buf` is untouched on error.
    fn encode_into(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        write_encoded(self.encode(), buf)
    }

    /// [`WireTlv::encode_into`] with 0 standing for failure.
    fn serialize(&self, buf: &mut [u8]) -> usize {
        self.encode_into(buf).unwrap_or(0)
    }
}

/// Copy a finished encoding to the front of `buf`.
pub(crate) fn write_encoded(encoded: Result<Vec<u8>, EncodeError>, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let bytes = encoded?;
    if bytes.len() > buf.len() {
        return Err(EncodeError::BufferTooSmall {
            need: bytes.len(),
            have: buf.len(),
        });
    }
    buf[..bytes.len()].copy_from_slice(&bytes);
    Ok(bytes.len())
}

/// Bounds-checked reader over a TLV body.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                need: self.pos + n,
                got: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

pub(crate) fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn wire_len(n: usize) -> Result<u16, EncodeError> {
    u16::try_from(n).map_err(|_| EncodeError::TooLarge(n))
}

/// Validate the common prefix and return `(flags, body)` where `body` spans
/// exactly the declared length.
pub(crate) fn split_tlv(buf: &[u8], expected: u8, min_len: usize) -> Result<(u8, &[u8]), DecodeError> {
    if buf.len() < min_len {
        return Err(DecodeError::Truncated {
            need: min_len,
            got: buf.len(),
        });
    }
    if buf[0] != expected {
        return Err(DecodeError::TypeMismatch {
            expected,
            found: buf[0],
        });
    }
    let declared = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
    if declared < min_len || declared > buf.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: buf.len(),
        });
    }
    Ok((buf[1], &buf[..declared]))
}

/// Error TLV: carried opaquely; receiving one ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorTlv {
    pub flags: u8,
    pub body: Vec<u8>,
}

impl WireTlv for ErrorTlv {
    const TYPE: u8 = ERROR_TLV;

    fn length(&self) -> usize {
        TLV_HEADER_SIZE + self.body.len()
    }

    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let len = wire_len(self.length())?;
        let mut out = Vec::with_capacity(self.length());
        out.push(ERROR_TLV);
        out.push(self.flags);
        put_u16(&mut out, len);
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (flags, body) = split_tlv(buf, ERROR_TLV, TLV_HEADER_SIZE)?;
        Ok(Self {
            flags,
            body: body[TLV_HEADER_SIZE..].to_vec(),
        })
    }
}

/// Any nested TLV.
#[derive(Debug, Clone, PartialEq)]
pub enum Tlv {
    Hello(Hello),
    Error(ErrorTlv),
    Ribd(Ribd),
    Rib(Rib),
    Offer(BundleList),
    Response(BundleList),
}

impl Tlv {
    pub fn type_code(&self) -> u8 {
        match self {
            Tlv::Hello(_) => HELLO_TLV,
            Tlv::Error(_) => ERROR_TLV,
            Tlv::Ribd(_) => RIBD_TLV,
            Tlv::Rib(_) => RIB_TLV,
            Tlv::Offer(_) => OFFER_TLV,
            Tlv::Response(_) => RESPONSE_TLV,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tlv::Hello(_) => "hello",
            Tlv::Error(_) => "error",
            Tlv::Ribd(_) => "ribd",
            Tlv::Rib(_) => "rib",
            Tlv::Offer(_) => "offer",
            Tlv::Response(_) => "response",
        }
    }

    pub fn length(&self) -> usize {
        match self {
            Tlv::Hello(t) => t.length(),
            Tlv::Error(t) => t.length(),
            Tlv::Ribd(t) => t.length(),
            Tlv::Rib(t) => t.length(),
            Tlv::Offer(t) | Tlv::Response(t) => t.length(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        match self {
            Tlv::Hello(t) => t.encode(),
            Tlv::Error(t) => t.encode(),
            Tlv::Ribd(t) => t.encode(),
            Tlv::Rib(t) => t.encode(),
            Tlv::Offer(t) | Tlv::Response(t) => t.encode(),
        }
    }

    /// Decode whichever TLV starts at `buf[0]`.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let typecode = *buf.first().ok_or(DecodeError::Truncated { need: 1, got: 0 })?;
        match typecode {
            HELLO_TLV => Hello::decode(buf).map(Tlv::Hello),
            ERROR_TLV => ErrorTlv::decode(buf).map(Tlv::Error),
            RIBD_TLV => Ribd::decode(buf).map(Tlv::Ribd),
            RIB_TLV => Rib::decode(buf).map(Tlv::Rib),
            OFFER_TLV => BundleList::decode_kind(buf, EntryKind::Offer).map(Tlv::Offer),
            RESPONSE_TLV => BundleList::decode_kind(buf, EntryKind::Response).map(Tlv::Response),
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}

/// Disposition code in the envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Unknown = 0,
    NoSuccessAck = 1,
    AckAll = 2,
    Success = 3,
    Failure = 4,
    ReturnReceipt = 5,
}

impl ResultCode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ResultCode::NoSuccessAck,
            2 => ResultCode::AckAll,
            3 => ResultCode::Success,
            4 => ResultCode::Failure,
            5 => ResultCode::ReturnReceipt,
            _ => ResultCode::Unknown,
        }
    }
}

/// The outer Prophet message: header plus an ordered list of nested TLVs.
///
/// `source` and `destination` are not on the wire; they come from the bundle
/// that carried the envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ProphetTlv {
    pub source: String,
    pub destination: String,
    pub result: ResultCode,
    pub sender_instance: u16,
    pub receiver_instance: u16,
    pub transaction_id: u32,
    pub tlvs: Vec<Tlv>,
}

impl ProphetTlv {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        result: ResultCode,
        sender_instance: u16,
        receiver_instance: u16,
        transaction_id: u32,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            result,
            sender_instance,
            receiver_instance,
            transaction_id,
            tlvs: Vec::new(),
        }
    }

    pub fn add_tlv(&mut self, tlv: Tlv) {
        self.tlvs.push(tlv);
    }

    /// Header plus every nested TLV.
    pub fn length(&self) -> usize {
        PROPHET_HEADER_SIZE + self.tlvs.iter().map(Tlv::length).sum::<usize>()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut body = Vec::new();
        for tlv in &self.tlvs {
            body.extend_from_slice(&tlv.encode()?);
        }
        let total = wire_len(PROPHET_HEADER_SIZE + body.len())?;
        let mut out = Vec::with_capacity(usize::from(total));
        out.push(PROPHET_VERSION);
        out.push(0);
        out.push(self.result as u8);
        out.push(0);
        put_u16(&mut out, self.sender_instance);
        put_u16(&mut out, self.receiver_instance);
        put_u32(&mut out, self.transaction_id);
        put_u16(&mut out, 0);
        put_u16(&mut out, total);
        out.extend_from_slice(&body);
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

    /// Parse an envelope. Any malformed nested TLV fails the whole message.
    pub fn decode(source: &str, destination: &str, buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        if buf.len() < PROPHET_HEADER_SIZE {
            return Err(DecodeError::Truncated {
                need: PROPHET_HEADER_SIZE,
                got: buf.len(),
            });
        }
        let version = r.u8()?;
        if version != PROPHET_VERSION {
            return Err(DecodeError::BadVersion(version));
        }
        let flags = r.u8()?;
        let result = r.u8()?;
        let code = r.u8()?;
        if flags != 0 || code != 0 {
            return Err(DecodeError::Reserved);
        }
        let sender_instance = r.u16()?;
        let receiver_instance = r.u16()?;
        let transaction_id = r.u32()?;
        let submessage = r.u16()?;
        let length = usize::from(r.u16()?);
        if length > buf.len() || length < PROPHET_HEADER_SIZE {
            return Err(DecodeError::LengthMismatch {
                declared: length,
                actual: buf.len(),
            });
        }
        // flag bit or a non-zero submessage number both mean fragmentation
        if submessage != 0 {
            return Err(DecodeError::Fragmented);
        }
        let mut tlvs = Vec::new();
        let mut pos = PROPHET_HEADER_SIZE;
        while pos < length {
            let rest = &buf[pos..length];
            let tlv = Tlv::decode(rest)?;
            // split_tlv already checked the prefix, so the declared length is present
            pos += usize::from(u16::from_be_bytes([rest[2], rest[3]]));
            tlvs.push(tlv);
        }
        tracing::trace!(
            subsystem = "tlv",
            tid = transaction_id,
            count = tlvs.len(),
            length,
            "decoded envelope"
        );
        Ok(Self {
            source: source.to_string(),
            destination: destination.to_string(),
            result: ResultCode::from_u8(result),
            sender_instance,
            receiver_instance,
            transaction_id,
            tlvs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;

    fn hello(hf: HelloFunction) -> Tlv {
        Tlv::Hello(Hello::new(hf, 20, "dtn://a"))
    }

    fn sample_envelope() -> ProphetTlv {
        let mut p = ProphetTlv::new(
            "dtn://a/prophet",
            "dtn://b/prophet",
            ResultCode::NoSuccessAck,
            7,
            9,
            0xdead_beef,
        );
        p.add_tlv(hello(HelloFunction::Syn));
        p
    }

    #[test]
    fn envelope_header_layout() {
        let p = sample_envelope();
        let bytes = p.encode().unwrap();
        assert_eq!(bytes.len(), p.length());
        assert_eq!(bytes[0], PROPHET_VERSION);
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes[2], ResultCode::NoSuccessAck as u8);
        assert_eq!(bytes[3], 0);
        assert_eq!(&bytes[4..6], &[0, 7]);
        assert_eq!(&bytes[6..8], &[0, 9]);
        assert_eq!(&bytes[8..12], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(&bytes[12..14], &[0, 0]);
        assert_eq!(u16::from_be_bytes([bytes[14], bytes[15]]) as usize, bytes.len());
        assert_eq!(bytes[16], HELLO_TLV);
    }

    #[test]
    fn envelope_roundtrip_multiple_tlvs() {
        let mut p = sample_envelope();
        let mut d = Dictionary::new("dtn://a", "dtn://b");
        d.insert("dtn://c").unwrap();
        p.add_tlv(Tlv::Ribd(Ribd::from_dictionary(&d)));
        let mut offers = BundleList::new(EntryKind::Offer);
        assert!(offers.add_offer(100, 1, 2, true, false));
        p.add_tlv(Tlv::Offer(offers));
        let bytes = p.encode().unwrap();
        let q = ProphetTlv::decode("dtn://a/prophet", "dtn://b/prophet", &bytes).unwrap();
        assert_eq!(p, q);
    }

    #[test]
    fn envelope_rejects_bad_header() {
        let bytes = sample_envelope().encode().unwrap();

        let mut bad = bytes.clone();
        bad[0] = 2;
        assert_eq!(
            ProphetTlv::decode("", "", &bad),
            Err(DecodeError::BadVersion(2))
        );

        let mut bad = bytes.clone();
        bad[1] = 1;
        assert_eq!(ProphetTlv::decode("", "", &bad), Err(DecodeError::Reserved));

        let mut bad = bytes.clone();
        bad[3] = 1;
        assert_eq!(ProphetTlv::decode("", "", &bad), Err(DecodeError::Reserved));

        assert!(matches!(
            ProphetTlv::decode("", "", &bytes[..bytes.len() - 1]),
            Err(DecodeError::LengthMismatch { .. })
        ));
        assert!(matches!(
            ProphetTlv::decode("", "", &bytes[..10]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn envelope_rejects_fragments() {
        let bytes = sample_envelope().encode().unwrap();
        let mut flagged = bytes.clone();
        flagged[12] = 0x80;
        assert_eq!(
            ProphetTlv::decode("", "", &flagged),
            Err(DecodeError::Fragmented)
        );
        let mut numbered = bytes;
        numbered[13] = 0x01;
        assert_eq!(
            ProphetTlv::decode("", "", &numbered),
            Err(DecodeError::Fragmented)
        );
    }

    #[test]
    fn envelope_rejects_unknown_nested() {
        let mut bytes = sample_envelope().encode().unwrap();
        bytes[PROPHET_HEADER_SIZE] = 0x55;
        assert_eq!(
            ProphetTlv::decode("", "", &bytes),
            Err(DecodeError::UnknownType(0x55))
        );
    }

    #[test]
    fn empty_envelope_is_header_only() {
        let p = ProphetTlv::new("s", "d", ResultCode::Success, 1, 2, 3);
        let bytes = p.encode().unwrap();
        assert_eq!(bytes.len(), PROPHET_HEADER_SIZE);
        let q = ProphetTlv::decode("s", "d", &bytes).unwrap();
        assert!(q.tlvs.is_empty());
        assert_eq!(q.result, ResultCode::Success);
    }

    #[test]
    fn serialize_short_buffer_untouched() {
        let p = sample_envelope();
        let mut buf = vec![0xaa; p.length() - 1];
        assert_eq!(p.serialize(&mut buf), 0);
        assert_eq!(
            p.encode_into(&mut buf),
            Err(EncodeError::BufferTooSmall {
                need: p.length(),
                have: p.length() - 1
            })
        );
        assert!(buf.iter().all(|b| *b == 0xaa));
        let mut buf = vec![0; p.length()];
        assert_eq!(p.serialize(&mut buf), p.length());
    }

    #[test]
    fn error_tlv_roundtrip() {
        let e = ErrorTlv {
            flags: 3,
            body: vec![1, 2, 3, 4],
        };
        let bytes = e.encode().unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(Tlv::decode(&bytes).unwrap(), Tlv::Error(e));
    }

    #[test]
    fn result_code_mapping() {
        assert_eq!(ResultCode::from_u8(4), ResultCode::Failure);
        assert_eq!(ResultCode::from_u8(9), ResultCode::Unknown);
    }
}
