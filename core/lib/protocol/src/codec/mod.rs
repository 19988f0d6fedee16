//! Bit-exact binary codec for Whiteflag messages.
//!
//! The encoder catenates header and body fields into an unaligned bit string
//! and packs it into bytes with a trailing zero pad. The first four bytes
//! (`WF`, version, encryption indicator) always stay cleartext; everything
//! after them may be encrypted by the crypto layer, which this crate does
//! not call into.

pub mod bits;
pub mod fields;

use thiserror::Error;

use self::bits::{BitReader, BitWriter};
use crate::message::{
    AuthenticationBody, CryptoBody, FreeTextBody, MessageBody, MessageCode, MessageHeader,
    ObjectRequest, ResourceBody, SignSignalBody, TestBody,
};

/// Bytes of the encoded message that remain cleartext under every
/// encryption method: prefix, version and encryption indicator.
pub const CLEARTEXT_PREFIX_LEN: usize = 4;

/// Minimum encoded size: the 301-bit header.
const MIN_MESSAGE_BYTES: usize = 38;

const REFERENCED_MESSAGE_NIBBLES: usize = 64;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message buffer exhausted: needed {needed} bits, {available} available")]
    OutOfBits { needed: usize, available: usize },
    #[error("invalid character {character:?} in field {field}")]
    InvalidChar {
        field: &'static str,
        character: char,
    },
    #[error("invalid value for field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
    #[error("invalid BCD digit {0:#x}")]
    InvalidBcdDigit(u8),
    #[error("not a Whiteflag message: bad prefix or version")]
    BadPrefix,
    #[error("unknown message code {0:?}")]
    UnknownMessageCode(char),
    #[error("message body does not match message code {0}")]
    BodyMismatch(MessageCode),
    #[error("encoded message too short: {0} bytes")]
    TooShort(usize),
}

fn expect_len(field: &'static str, value: &str, len: usize) -> Result<(), CodecError> {
    if value.chars().count() != len {
        return Err(CodecError::InvalidField {
            field,
            reason: format!("expected {len} characters, got {value:?}"),
        });
    }
    Ok(())
}

/// Encodes a message header and body into the packed wire buffer
/// (unencrypted).
pub fn encode(header: &MessageHeader, body: &MessageBody) -> Result<Vec<u8>, CodecError> {
    let mut w = BitWriter::new();

    expect_len("Prefix", &header.prefix, 2)?;
    expect_len("Version", &header.version, 1)?;
    expect_len("EncryptionIndicator", &header.encryption_indicator, 1)?;
    expect_len("DuressIndicator", &header.duress_indicator, 1)?;
    expect_len("ReferenceIndicator", &header.reference_indicator, 1)?;
    expect_len(
        "ReferencedMessage",
        &header.referenced_message,
        REFERENCED_MESSAGE_NIBBLES,
    )?;

    fields::write_utf8(&mut w, "Prefix", &header.prefix)?;
    fields::write_utf8(&mut w, "Version", &header.version)?;
    fields::write_utf8(&mut w, "EncryptionIndicator", &header.encryption_indicator)?;
    fields::write_bin(&mut w, "DuressIndicator", &header.duress_indicator)?;
    fields::write_utf8(
        &mut w,
        "MessageCode",
        &header.message_code.as_char().to_string(),
    )?;
    fields::write_hex(&mut w, "ReferenceIndicator", &header.reference_indicator)?;
    fields::write_hex(&mut w, "ReferencedMessage", &header.referenced_message)?;

    encode_body(&mut w, header.message_code, body)?;
    Ok(w.into_bytes())
}

fn encode_body(
    w: &mut BitWriter,
    code: MessageCode,
    body: &MessageBody,
) -> Result<(), CodecError> {
    match (code, body) {
        (MessageCode::Authentication, MessageBody::Authentication(auth)) => {
            expect_len("VerificationMethod", &auth.verification_method, 1)?;
            fields::write_hex(w, "VerificationMethod", &auth.verification_method)?;
            fields::write_utf8(w, "VerificationData", &auth.verification_data)
        }
        (MessageCode::Crypto, MessageBody::Crypto(crypto)) => {
            expect_len("CryptoDataType", &crypto.crypto_data_type, 2)?;
            fields::write_hex(w, "CryptoDataType", &crypto.crypto_data_type)?;
            fields::write_hex(w, "CryptoData", &crypto.crypto_data)
        }
        (MessageCode::FreeText, MessageBody::FreeText(text)) => {
            fields::write_utf8(w, "Text", &text.text)
        }
        (MessageCode::Resource, MessageBody::Resource(resource)) => {
            expect_len("ResourceMethod", &resource.resource_method, 1)?;
            fields::write_hex(w, "ResourceMethod", &resource.resource_method)?;
            fields::write_utf8(w, "ResourceData", &resource.resource_data)
        }
        (code, MessageBody::SignSignal(body)) if code.is_sign_signal() => {
            encode_sign_signal(w, code, body)
        }
        (MessageCode::Test, MessageBody::Test(test)) => {
            expect_len("PseudoMessageCode", &test.pseudo_message_code, 1)?;
            let pseudo_char = test.pseudo_message_code.chars().next().unwrap_or(' ');
            let pseudo_code = MessageCode::from_char(pseudo_char)
                .ok_or(CodecError::UnknownMessageCode(pseudo_char))?;
            if pseudo_code == MessageCode::Test {
                return Err(CodecError::InvalidField {
                    field: "PseudoMessageCode",
                    reason: "test messages cannot nest".to_string(),
                });
            }
            fields::write_utf8(w, "PseudoMessageCode", &test.pseudo_message_code)?;
            encode_body(w, pseudo_code, &test.pseudo_body)
        }
        (code, _) => Err(CodecError::BodyMismatch(code)),
    }
}

fn encode_sign_signal(
    w: &mut BitWriter,
    code: MessageCode,
    body: &SignSignalBody,
) -> Result<(), CodecError> {
    expect_len("SubjectCode", &body.subject_code, 2)?;
    expect_len("ObjectType", &body.object_type, 2)?;
    expect_len("ObjectSizeDim1", &body.object_size_dim1, 4)?;
    expect_len("ObjectSizeDim2", &body.object_size_dim2, 4)?;
    expect_len("ObjectOrientation", &body.object_orientation, 3)?;

    fields::write_hex(w, "SubjectCode", &body.subject_code)?;
    fields::write_datetime(w, &body.date_time)?;
    fields::write_duration(w, &body.duration)?;
    fields::write_hex(w, "ObjectType", &body.object_type)?;
    fields::write_latitude(w, &body.object_latitude)?;
    fields::write_longitude(w, &body.object_longitude)?;
    fields::write_dec(w, "ObjectSizeDim1", &body.object_size_dim1)?;
    fields::write_dec(w, "ObjectSizeDim2", &body.object_size_dim2)?;
    fields::write_dec(w, "ObjectOrientation", &body.object_orientation)?;

    if code == MessageCode::RequestSignal {
        for request in &body.object_requests {
            expect_len("ObjectType", &request.object_type, 2)?;
            expect_len("ObjectTypeQuant", &request.object_type_quant, 2)?;
            fields::write_hex(w, "ObjectType", &request.object_type)?;
            fields::write_dec(w, "ObjectTypeQuant", &request.object_type_quant)?;
        }
    } else if !body.object_requests.is_empty() {
        return Err(CodecError::InvalidField {
            field: "ObjectTypeQuant",
            reason: "object requests are only valid on request signals".to_string(),
        });
    }
    Ok(())
}

/// The encryption method digit from the cleartext prefix of an encoded
/// buffer (byte 3).
pub fn encryption_indicator(encoded: &[u8]) -> Result<u8, CodecError> {
    if encoded.len() < CLEARTEXT_PREFIX_LEN {
        return Err(CodecError::TooShort(encoded.len()));
    }
    char::from(encoded[3])
        .to_digit(10)
        .map(|d| d as u8)
        .ok_or(CodecError::InvalidField {
            field: "EncryptionIndicator",
            reason: format!("not a decimal digit: {:#04x}", encoded[3]),
        })
}

/// Decodes a fully decrypted wire buffer into header and body.
pub fn decode(encoded: &[u8]) -> Result<(MessageHeader, MessageBody), CodecError> {
    if encoded.len() < MIN_MESSAGE_BYTES {
        return Err(CodecError::TooShort(encoded.len()));
    }
    let mut r = BitReader::new(encoded);

    let prefix: String = [fields::read_utf8_char(&mut r)?, fields::read_utf8_char(&mut r)?]
        .iter()
        .collect();
    let version = fields::read_utf8_char(&mut r)?.to_string();
    if prefix != "WF" || version != "1" {
        return Err(CodecError::BadPrefix);
    }
    let encryption_indicator = fields::read_utf8_char(&mut r)?;
    if !encryption_indicator.is_ascii_digit() {
        return Err(CodecError::InvalidField {
            field: "EncryptionIndicator",
            reason: format!("not a decimal digit: {encryption_indicator:?}"),
        });
    }
    let duress_indicator = fields::read_bin(&mut r, 1)?;
    let code_char = fields::read_utf8_char(&mut r)?;
    let message_code =
        MessageCode::from_char(code_char).ok_or(CodecError::UnknownMessageCode(code_char))?;
    let reference_indicator = fields::read_hex(&mut r, 1)?;
    let referenced_message = fields::read_hex(&mut r, REFERENCED_MESSAGE_NIBBLES)?;

    let message_body = decode_body(&mut r, message_code)?;

    Ok((
        MessageHeader {
            prefix,
            version,
            encryption_indicator: encryption_indicator.to_string(),
            duress_indicator,
            message_code,
            reference_indicator,
            referenced_message,
        },
        message_body,
    ))
}

fn decode_body(r: &mut BitReader<'_>, code: MessageCode) -> Result<MessageBody, CodecError> {
    Ok(match code {
        MessageCode::Authentication => MessageBody::Authentication(AuthenticationBody {
            verification_method: fields::read_hex(r, 1)?,
            verification_data: fields::read_utf8_to_end(r)?,
        }),
        MessageCode::Crypto => MessageBody::Crypto(CryptoBody {
            crypto_data_type: fields::read_hex(r, 2)?,
            crypto_data: fields::read_hex_to_end(r)?,
        }),
        MessageCode::FreeText => MessageBody::FreeText(FreeTextBody {
            text: fields::read_utf8_to_end(r)?,
        }),
        MessageCode::Resource => MessageBody::Resource(ResourceBody {
            resource_method: fields::read_hex(r, 1)?,
            resource_data: fields::read_utf8_to_end(r)?,
        }),
        MessageCode::Test => {
            let pseudo_char = fields::read_utf8_char(r)?;
            let pseudo_code = MessageCode::from_char(pseudo_char)
                .ok_or(CodecError::UnknownMessageCode(pseudo_char))?;
            if pseudo_code == MessageCode::Test {
                return Err(CodecError::InvalidField {
                    field: "PseudoMessageCode",
                    reason: "test messages cannot nest".to_string(),
                });
            }
            MessageBody::Test(TestBody {
                pseudo_message_code: pseudo_char.to_string(),
                pseudo_body: Box::new(decode_body(r, pseudo_code)?),
            })
        }
        code => {
            debug_assert!(code.is_sign_signal());
            let mut body = SignSignalBody {
                subject_code: fields::read_hex(r, 2)?,
                date_time: fields::read_datetime(r)?,
                duration: fields::read_duration(r)?,
                object_type: fields::read_hex(r, 2)?,
                object_latitude: fields::read_latitude(r)?,
                object_longitude: fields::read_longitude(r)?,
                object_size_dim1: fields::read_dec(r, 4)?,
                object_size_dim2: fields::read_dec(r, 4)?,
                object_orientation: fields::read_dec(r, 3)?,
                object_requests: Vec::new(),
            };
            if code == MessageCode::RequestSignal {
                while r.remaining() >= 16 {
                    body.object_requests.push(ObjectRequest {
                        object_type: fields::read_hex(r, 2)?,
                        object_type_quant: fields::read_dec(r, 2)?,
                    });
                }
            }
            MessageBody::SignSignal(body)
        }
    })
}
