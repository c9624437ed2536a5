//! Error types for the wire codecs and the policy factories.

/// Failure decoding a Prophet TLV or envelope from a buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer too short: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    #[error("unexpected TLV type 0x{found:02x} (expected 0x{expected:02x})")]
    TypeMismatch { expected: u8, found: u8 },
    #[error("unknown TLV type 0x{0:02x}")]
    UnknownType(u8),
    #[error("declared length {declared} does not match {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),
    #[error("reserved header field is non-zero")]
    Reserved,
    #[error("fragmented envelopes are not supported")]
    Fragmented,
    #[error("illegal bundle entry flags 0x{0:02x}")]
    IllegalFlags(u8),
    #[error("entry kind does not match list kind")]
    WrongEntryKind,
    #[error("duplicate bundle entry")]
    DuplicateEntry,
    #[error("route is not valid UTF-8")]
    BadRoute,
    #[error("dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),
}

/// Failure encoding a Prophet TLV into a buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },
    #[error("required field is unset: {0}")]
    MissingField(&'static str),
    #[error("encoded length {0} exceeds u16")]
    TooLarge(usize),
}

/// Failure mutating a [`crate::Dictionary`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DictionaryError {
    #[error("empty route")]
    EmptyRoute,
    #[error("route already present: {0}")]
    DuplicateRoute(String),
    #[error("sid {0} already assigned")]
    SidCollision(u16),
    #[error("invalid sid")]
    InvalidSid,
    #[error("sid space exhausted")]
    Exhausted,
}

/// A forwarding strategy or queue policy could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("{0} requires max_forward > 0")]
    MaxForwardZero(&'static str),
    #[error("{0} requires min_forward > 0")]
    MinForwardZero(&'static str),
    #[error("{0} requires forwarding statistics")]
    MissingStats(&'static str),
    #[error("{0} requires a route table")]
    MissingTable(&'static str),
    #[error("next hop has no endpoint id")]
    EmptyNexthop,
    #[error("unknown policy name: {0}")]
    UnknownName(String),
}

/// Router parameters outside their valid range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamsError {
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },
}

/// A bundle could not be added to the [`crate::Repository`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("bundle already stored: {dest} {cts}:{seq}")]
    Duplicate { dest: String, cts: u32, seq: u32 },
}
