//! Hello TLV: the four-way peering handshake message.

use crate::dictionary::align4;
use crate::error::{DecodeError, EncodeError};

use super::{put_u16, split_tlv, wire_len, WireTlv, HELLO_TLV};

/// `type, flags(HF), length, timer, name_length`.
pub const HELLO_HEADER_SIZE: usize = 6;

const HF_MASK: u8 = 0x07;

/// Hello function carried in the low three flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloFunction {
    Syn,
    SynAck,
    Ack,
    RstAck,
    Unknown(u8),
}

impl HelloFunction {
    pub fn from_bits(bits: u8) -> Self {
        match bits & HF_MASK {
            1 => HelloFunction::Syn,
            2 => HelloFunction::SynAck,
            3 => HelloFunction::Ack,
            4 => HelloFunction::RstAck,
            other => HelloFunction::Unknown(other),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            HelloFunction::Syn => 1,
            HelloFunction::SynAck => 2,
            HelloFunction::Ack => 3,
            HelloFunction::RstAck => 4,
            HelloFunction::Unknown(b) => b & HF_MASK,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HelloFunction::Syn => "SYN",
            HelloFunction::SynAck => "SYNACK",
            HelloFunction::Ack => "ACK",
            HelloFunction::RstAck => "RSTACK",
            HelloFunction::Unknown(_) => "HF_UNKNOWN",
        }
    }
}

/// Hello TLV. `timer` is the sender's hello interval in 100 ms units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub function: HelloFunction,
    pub timer: u8,
    pub sender: String,
}

impl Hello {
    pub fn new(function: HelloFunction, timer: u8, sender: impl Into<String>) -> Self {
        Self {
            function,
            timer,
            sender: sender.into(),
        }
    }
}

impl WireTlv for Hello {
    const TYPE: u8 = HELLO_TLV;

    fn length(&self) -> usize {
        align4(HELLO_HEADER_SIZE + self.sender.len())
    }

    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.sender.is_empty() {
            return Err(EncodeError::MissingField("sender"));
        }
        let name_len =
            u8::try_from(self.sender.len()).map_err(|_| EncodeError::TooLarge(self.sender.len()))?;
        let total = self.length();
        let mut out = Vec::with_capacity(total);
        out.push(HELLO_TLV);
        out.push(self.function.bits());
        put_u16(&mut out, wire_len(total)?);
        out.push(self.timer);
        out.push(name_len);
        out.extend_from_slice(self.sender.as_bytes());
        out.resize(total, 0);
        Ok(out)
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (flags, body) = split_tlv(buf, HELLO_TLV, HELLO_HEADER_SIZE)?;
        let timer = body[4];
        let name_len = usize::from(body[5]);
        if name_len > body.len() - HELLO_HEADER_SIZE {
            return Err(DecodeError::LengthMismatch {
                declared: name_len,
                actual: body.len() - HELLO_HEADER_SIZE,
            });
        }
        let name = &body[HELLO_HEADER_SIZE..HELLO_HEADER_SIZE + name_len];
        let sender = std::str::from_utf8(name)
            .map_err(|_| DecodeError::BadRoute)?
            .to_string();
        Ok(Self {
            function: HelloFunction::from_bits(flags),
            timer,
            sender,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_padded() {
        let h = Hello::new(HelloFunction::SynAck, 20, "dtn://abc");
        let bytes = h.encode().unwrap();
        // 6 + 9 = 15 -> 16
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[0], HELLO_TLV);
        assert_eq!(bytes[1], 2);
        assert_eq!(&bytes[2..4], &[0, 16]);
        assert_eq!(bytes[4], 20);
        assert_eq!(bytes[5], 9);
        assert_eq!(&bytes[6..15], b"dtn://abc");
        assert_eq!(bytes[15], 0);
    }

    #[test]
    fn roundtrip_each_function() {
        for hf in [
            HelloFunction::Syn,
            HelloFunction::SynAck,
            HelloFunction::Ack,
            HelloFunction::RstAck,
        ] {
            let h = Hello::new(hf, 7, "dtn://node-1");
            let bytes = h.encode().unwrap();
            assert_eq!(Hello::decode(&bytes).unwrap(), h);
        }
    }

    #[test]
    fn empty_sender_fails_to_serialize() {
        let h = Hello::new(HelloFunction::Syn, 20, "");
        assert_eq!(h.encode(), Err(EncodeError::MissingField("sender")));
        let mut buf = [0u8; 32];
        assert_eq!(h.serialize(&mut buf), 0);
    }

    #[test]
    fn decode_rejects_wrong_type_and_short_buffers() {
        let bytes = Hello::new(HelloFunction::Syn, 20, "dtn://a").encode().unwrap();
        let mut wrong = bytes.clone();
        wrong[0] = 0xa0;
        assert!(matches!(
            Hello::decode(&wrong),
            Err(DecodeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            Hello::decode(&bytes[..4]),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(
            Hello::decode(&bytes[..bytes.len() - 1]),
            Err(DecodeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn decode_rejects_oversized_name() {
        let mut bytes = Hello::new(HelloFunction::Syn, 20, "dtn://a").encode().unwrap();
        bytes[5] = 40;
        assert!(matches!(
            Hello::decode(&bytes),
            Err(DecodeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn unknown_function_is_preserved() {
        let mut bytes = Hello::new(HelloFunction::Syn, 20, "dtn://a").encode().unwrap();
        bytes[1] = 0x06;
        let h = Hello::decode(&bytes).unwrap();
        assert_eq!(h.function, HelloFunction::Unknown(6));
        assert_eq!(h.function.as_str(), "HF_UNKNOWN");
    }
}
