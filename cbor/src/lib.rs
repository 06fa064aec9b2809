/*!
Deterministic CBOR primitives for the tundra DTN stack.

This is not a general-purpose CBOR library. It implements exactly the subset
of RFC 8949 that the BPv7 wire format and the storage serializers need:
unsigned integers, byte strings, text strings, booleans, single-precision
floats, and definite- or indefinite-length arrays. Integers and string
lengths are always emitted in their shortest form, so encoding the same value
twice yields the same bytes.

[`encode::Encoder`] builds a byte buffer through closure-scoped arrays;
[`decode::Decoder`] is a cursor over a byte slice with typed `pull_*`
accessors.
*/

pub mod decode;
pub mod encode;

#[cfg(test)]
mod decode_tests;

#[cfg(test)]
mod encode_tests;
