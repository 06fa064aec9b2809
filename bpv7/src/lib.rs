/*!
A Rust implementation of the Bundle Protocol Version 7 (BPv7) data model and
wire format, as defined in [RFC 9171](https://www.rfc-editor.org/rfc/rfc9171.html).

This crate provides the building blocks for working with BPv7 bundles:
endpoint identifiers, primary and canonical blocks, CRC protection, and the
deterministic CBOR codec used on the wire.

# Key Modules

- [`bundle`]: The [`Bundle`](bundle::Bundle) type and its block-manipulation
  helpers.
- [`eid`]: Endpoint Identifiers in the `dtn:` and `ipn:` schemes.
- [`block`]: Canonical blocks, including the well-known previous-node,
  bundle-age and hop-count extension blocks.
- [`crc`]: CRC-16/X.25 and CRC-32C protection of serialized blocks.

# Example

```rust
use tundra_bpv7::block::CanonicalBlock;
use tundra_bpv7::bundle::Bundle;
use tundra_bpv7::creation_timestamp::CreationTimestamp;
use tundra_bpv7::crc::CrcType;
use tundra_bpv7::dtn_time::DtnTime;
use tundra_bpv7::eid::Eid;
use tundra_bpv7::primary_block::PrimaryBlock;

let source: Eid = "dtn:source".parse().unwrap();
let destination: Eid = "dtn:dest".parse().unwrap();

let primary = PrimaryBlock::new(
    destination,
    source,
    Eid::Null,
    CreationTimestamp::new(DtnTime::new(1_700_000_000_000), 0),
    60_000,
    CrcType::None,
);
let bundle = Bundle::new(primary, CanonicalBlock::payload(b"hi", CrcType::None));

let wire = bundle.to_cbor();
let parsed = Bundle::from_cbor(&wire).unwrap();
assert_eq!(parsed.id(), bundle.id());
```
*/

pub mod block;
pub mod block_flags;
pub mod bundle;
pub mod bundle_flags;
pub mod crc;
pub mod creation_timestamp;
pub mod dtn_time;
pub mod eid;
pub mod primary_block;

mod error;
pub use error::Error;
