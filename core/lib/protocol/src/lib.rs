//! Whiteflag protocol core: the message data model, the bit-exact binary
//! codec and format validation.
//!
//! A Whiteflag message has three parts: the [`MetaHeader`] (API-local
//! metadata that never goes on the wire), the [`MessageHeader`] and the
//! [`MessageBody`] (both encoded bit-exactly per the protocol field schema).
//! Encryption of the encoded buffer is out of this crate's hands; the codec
//! deals in plaintext buffers and exposes the cleartext 4-byte prefix that
//! survives encryption.

pub mod codec;
pub mod errors;
pub mod message;
pub mod validation;

pub use codec::{decode, encode, encryption_indicator, CodecError, CLEARTEXT_PREFIX_LEN};
pub use errors::{ProcessingError, ProtocolError, WfErrorCode};
pub use message::{
    AuthenticationBody, CryptoBody, FreeTextBody, MessageBody, MessageCode, MessageHeader,
    MetaHeader, ObjectRequest, ResourceBody, SignSignalBody, TestBody, TransceiveDirection,
    WhiteflagMessage, ZERO_REFERENCE,
};
pub use validation::verify_format;
