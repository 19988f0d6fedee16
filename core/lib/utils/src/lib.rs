//! Shared helpers for the Whiteflag relay crates: hex normalisation, log
//! sanitisation and timestamp formatting.

pub mod hex_repr;
pub mod sanitize;
pub mod time;

pub use hex_repr::{decode_hex, encode_hex, normalize_hex, HexError};
pub use sanitize::scrub_credentials;
pub use time::iso8601_now;
