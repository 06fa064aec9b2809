use thiserror::Error;

/// The primary error type for the `bpv7` crate.
///
/// Decoding errors are recovered at the reception boundary: a bundle that
/// fails to parse is dropped, never propagated across the node pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// The input is not well-formed CBOR.
    #[error("malformed CBOR: {0}")]
    MalformedCbor(#[from] tundra_cbor::decode::Error),

    /// The CBOR is well-formed but does not follow the RFC 9171 layout.
    #[error("invalid bundle structure: {0}")]
    InvalidStructure(&'static str),

    /// The primary block reports a bundle protocol version other than 7.
    #[error("unsupported bundle protocol version {0}")]
    UnsupportedVersion(u64),

    /// A block's CRC does not match its serialization.
    #[error("block CRC mismatch")]
    CrcMismatch,

    /// An EID carries a scheme code this node does not understand.
    #[error("unknown EID scheme {0}")]
    UnknownScheme(u64),

    /// A block declares a CRC type outside {0, 1, 2}.
    #[error("invalid CRC type {0}")]
    InvalidCrcType(u64),

    /// A string is not a valid `dtn:` or `ipn:` URI.
    #[error("invalid EID URI {0:?}")]
    InvalidUri(String),
}
