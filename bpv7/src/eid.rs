//! Endpoint Identifiers in the `dtn:` and `ipn:` schemes (RFC 9171 §4.2.5).

use crate::Error;
use std::str::FromStr;
use tundra_cbor::{decode, encode};

const DTN_SCHEME: u64 = 1;
const IPN_SCHEME: u64 = 2;

/// A BP endpoint identifier.
///
/// `Null` is the `dtn:none` sentinel; it is also the default value. The
/// scheme-specific part of a `dtn:` EID is opaque text to this node.
#[derive(Default, Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Eid {
    #[default]
    Null,
    Dtn(Box<str>),
    Ipn { node: u64, service: u64 },
}

impl Eid {
    pub fn is_null(&self) -> bool {
        matches!(self, Eid::Null)
    }

    /// The URI form, e.g. `dtn:host`, `dtn:none` or `ipn:42.7`.
    pub fn uri(&self) -> String {
        self.to_string()
    }

    pub fn parse(dec: &mut decode::Decoder) -> Result<Self, Error> {
        let Some(2) = dec.pull_array()? else {
            return Err(Error::InvalidStructure("EID must be a 2-element array"));
        };
        match dec.pull_uint()? {
            DTN_SCHEME => {
                // integer 0 is the "none" sentinel, anything else is text
                match dec.pull_uint() {
                    Ok(0) => Ok(Eid::Null),
                    Ok(_) => Err(Error::InvalidStructure("dtn SSP must be text or 0")),
                    Err(decode::Error::IncorrectType { .. }) => {
                        let ssp = dec.pull_text()?;
                        if ssp == "none" {
                            Ok(Eid::Null)
                        } else {
                            Ok(Eid::Dtn(ssp.into()))
                        }
                    }
                    Err(e) => Err(e.into()),
                }
            }
            IPN_SCHEME => {
                let Some(2) = dec.pull_array()? else {
                    return Err(Error::InvalidStructure(
                        "ipn SSP must be a 2-element array",
                    ));
                };
                Ok(Eid::Ipn {
                    node: dec.pull_uint()?,
                    service: dec.pull_uint()?,
                })
            }
            scheme => Err(Error::UnknownScheme(scheme)),
        }
    }
}

/// Wire form: a 2-element array `[scheme-code, ssp]`.
impl encode::ToCbor for Eid {
    fn to_cbor(&self, encoder: &mut encode::Encoder) {
        encoder.emit_array(Some(2), |a| match self {
            Eid::Null => {
                a.emit_uint(DTN_SCHEME);
                a.emit_uint(0);
            }
            Eid::Dtn(ssp) => {
                a.emit_uint(DTN_SCHEME);
                a.emit_text(ssp);
            }
            Eid::Ipn { node, service } => {
                a.emit_uint(IPN_SCHEME);
                a.emit_array(Some(2), |a| {
                    a.emit_uint(*node);
                    a.emit_uint(*service);
                });
            }
        });
    }
}

impl std::fmt::Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eid::Null => f.write_str("dtn:none"),
            Eid::Dtn(ssp) => write!(f, "dtn:{ssp}"),
            Eid::Ipn { node, service } => write!(f, "ipn:{node}.{service}"),
        }
    }
}

impl FromStr for Eid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if let Some(ssp) = s.strip_prefix("dtn:") {
            if ssp == "none" {
                Ok(Eid::Null)
            } else if ssp.is_empty() {
                Err(Error::InvalidUri(s.into()))
            } else {
                Ok(Eid::Dtn(ssp.into()))
            }
        } else if let Some(ssp) = s.strip_prefix("ipn:") {
            let (node, service) = ssp.split_once('.').ok_or_else(|| Error::InvalidUri(s.into()))?;
            Ok(Eid::Ipn {
                node: node.parse().map_err(|_| Error::InvalidUri(s.into()))?,
                service: service.parse().map_err(|_| Error::InvalidUri(s.into()))?,
            })
        } else {
            Err(Error::InvalidUri(s.into()))
        }
    }
}
