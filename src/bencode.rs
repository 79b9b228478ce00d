//! Bencode encoding and decoding (BEP-3).
//!
//! Bencode is BitTorrent's canonical encoding for integers, byte strings,
//! lists, and dictionaries. DHT messages (BEP-5) are bencoded dictionaries
//! on the wire.
//!
//! Encoding is canonical: dictionary keys are emitted in ascending byte
//! order, which the [`Value`] representation guarantees by construction.
//! Decoding is strict and rejects anything a canonical encoder would not
//! produce, so `encode(&decode(bytes)?) == bytes` for every accepted input.

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::encode;
pub use error::BencodeError;
pub use value::Value;

#[cfg(test)]
mod tests;
