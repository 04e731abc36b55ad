//! Dense typed column storage (C2) and per-column compression codecs (C4).

pub mod codec;
pub mod column;

pub use codec::{choose_codec, decode, encode, Codec};
pub use column::{CardinalityStats, Column};
