//! Structural format verification. Checks field presence and value
//! constraints the way the protocol's JSON schema specifies them, plus the
//! cross-field subject/object consistency rules, and reports every violation
//! found.

use crate::errors::{ProtocolError, WfErrorCode};
use crate::message::{MessageBody, MessageCode, SignSignalBody, WhiteflagMessage};

/// Object type classes (first hex nibble) a subject class may mark. Subject
/// class `0` is unspecified and unconstrained; object class `0` likewise.
const SUBJECT_OBJECT_CLASSES: &[(u8, &[u8])] = &[
    (1, &[0, 1, 2, 3]),
    (2, &[0, 1, 2, 3, 4]),
    (3, &[0, 3, 4, 5]),
    (4, &[0, 1, 2, 3, 4, 5]),
    (5, &[0, 1, 2, 3, 4, 5]),
];

/// Highest object type class defined by the reference table.
const MAX_OBJECT_CLASS: u8 = 5;

fn is_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_dec(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

struct Violations(Vec<String>);

impl Violations {
    fn check(&mut self, ok: bool, message: impl FnOnce() -> String) {
        if !ok {
            self.0.push(message());
        }
    }
}

/// Verifies the message format. Returns a `FormatError` listing each
/// violation; an empty result means the message is well-formed.
pub fn verify_format(message: &WhiteflagMessage) -> Result<(), ProtocolError> {
    let mut v = Violations(Vec::new());
    let (Some(header), Some(body)) = (&message.message_header, &message.message_body) else {
        return Err(ProtocolError::with_causes(
            WfErrorCode::FormatError,
            format!("message format verification failed for {}", message.log_context()),
            vec!["message is not decoded".to_string()],
        ));
    };

    v.check(header.prefix == "WF", || {
        format!("invalid prefix {:?}", header.prefix)
    });
    v.check(header.version == "1", || {
        format!("unsupported version {:?}", header.version)
    });
    v.check(
        header.encryption_indicator.len() == 1
            && header.encryption_indicator.chars().all(|c| c.is_ascii_digit()),
        || format!("invalid encryption indicator {:?}", header.encryption_indicator),
    );
    v.check(
        header.duress_indicator == "0" || header.duress_indicator == "1",
        || format!("invalid duress indicator {:?}", header.duress_indicator),
    );
    v.check(
        header.reference_indicator.len() == 1
            && header.reference_indicator.chars().all(|c| c.is_ascii_digit()),
        || format!("invalid reference indicator {:?}", header.reference_indicator),
    );
    v.check(is_hex(&header.referenced_message, 64), || {
        "referenced message is not a 256-bit hash".to_string()
    });

    verify_body(&mut v, header.message_code, body);

    if v.0.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::with_causes(
            WfErrorCode::FormatError,
            format!("message format verification failed for {}", message.log_context()),
            v.0,
        ))
    }
}

fn verify_body(v: &mut Violations, code: MessageCode, body: &MessageBody) {
    match (code, body) {
        (MessageCode::Authentication, MessageBody::Authentication(auth)) => {
            v.check(
                auth.verification_method == "1" || auth.verification_method == "2",
                || format!("invalid verification method {:?}", auth.verification_method),
            );
            v.check(!auth.verification_data.is_empty(), || {
                "empty verification data".to_string()
            });
        }
        (MessageCode::Crypto, MessageBody::Crypto(crypto)) => {
            v.check(is_hex(&crypto.crypto_data_type, 2), || {
                format!("invalid crypto data type {:?}", crypto.crypto_data_type)
            });
            v.check(
                !crypto.crypto_data.is_empty()
                    && crypto.crypto_data.chars().all(|c| c.is_ascii_hexdigit()),
                || "crypto data is not hexadecimal".to_string(),
            );
        }
        (MessageCode::FreeText, MessageBody::FreeText(text)) => {
            v.check(!text.text.is_empty(), || "empty text".to_string());
        }
        (MessageCode::Resource, MessageBody::Resource(resource)) => {
            v.check(resource.resource_method == "1", || {
                format!("invalid resource method {:?}", resource.resource_method)
            });
            v.check(!resource.resource_data.is_empty(), || {
                "empty resource data".to_string()
            });
        }
        (MessageCode::Test, MessageBody::Test(test)) => {
            match test
                .pseudo_message_code
                .chars()
                .next()
                .and_then(MessageCode::from_char)
            {
                Some(MessageCode::Test) | None => v.0.push(format!(
                    "invalid pseudo message code {:?}",
                    test.pseudo_message_code
                )),
                Some(pseudo_code) => verify_body(v, pseudo_code, &test.pseudo_body),
            }
        }
        (code, MessageBody::SignSignal(body)) if code.is_sign_signal() => {
            verify_sign_signal(v, code, body);
        }
        (code, _) => v.0.push(format!("message body does not match message code {code}")),
    }
}

fn verify_sign_signal(v: &mut Violations, code: MessageCode, body: &SignSignalBody) {
    v.check(is_hex(&body.subject_code, 2), || {
        format!("invalid subject code {:?}", body.subject_code)
    });
    v.check(is_hex(&body.object_type, 2), || {
        format!("invalid object type {:?}", body.object_type)
    });
    verify_datetime(v, &body.date_time);
    verify_duration(v, &body.duration);
    verify_coordinate(v, "latitude", &body.object_latitude, 2, 90);
    verify_coordinate(v, "longitude", &body.object_longitude, 3, 180);
    v.check(is_dec(&body.object_size_dim1, 4), || {
        format!("invalid object size {:?}", body.object_size_dim1)
    });
    v.check(is_dec(&body.object_size_dim2, 4), || {
        format!("invalid object size {:?}", body.object_size_dim2)
    });
    v.check(
        is_dec(&body.object_orientation, 3)
            && body.object_orientation.parse::<u16>().map_or(false, |o| o < 360),
        || format!("invalid object orientation {:?}", body.object_orientation),
    );

    verify_subject_object(v, &body.subject_code, &body.object_type);

    if code == MessageCode::RequestSignal {
        for request in &body.object_requests {
            v.check(is_hex(&request.object_type, 2), || {
                format!("invalid requested object type {:?}", request.object_type)
            });
            v.check(
                is_dec(&request.object_type_quant, 2) && request.object_type_quant != "00",
                || format!("invalid object quantity {:?}", request.object_type_quant),
            );
        }
    } else {
        v.check(body.object_requests.is_empty(), || {
            "object requests are only valid on request signals".to_string()
        });
    }
}

fn verify_subject_object(v: &mut Violations, subject_code: &str, object_type: &str) {
    let (Some(subject_class), Some(object_class)) = (
        subject_code.chars().next().and_then(|c| c.to_digit(16)),
        object_type.chars().next().and_then(|c| c.to_digit(16)),
    ) else {
        return; // syntactic violations already recorded
    };
    let (subject_class, object_class) = (subject_class as u8, object_class as u8);

    v.check(object_class <= MAX_OBJECT_CLASS, || {
        format!("object type {object_type:?} is outside the reference table")
    });
    if subject_class == 0 || object_class == 0 {
        return;
    }
    if let Some((_, allowed)) = SUBJECT_OBJECT_CLASSES
        .iter()
        .find(|(class, _)| *class == subject_class)
    {
        v.check(allowed.contains(&object_class), || {
            format!("subject code {subject_code:?} cannot mark object type {object_type:?}")
        });
    }
}

fn verify_datetime(v: &mut Violations, value: &str) {
    let bytes = value.as_bytes();
    let shape_ok = value.len() == 20
        && value.is_ascii()
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes[10] == b'T'
        && bytes[13] == b':'
        && bytes[16] == b':'
        && bytes[19] == b'Z';
    if !shape_ok {
        v.0.push(format!("invalid datetime {value:?}"));
        return;
    }
    let month: u8 = value[5..7].parse().unwrap_or(0);
    let day: u8 = value[8..10].parse().unwrap_or(0);
    let hour: u8 = value[11..13].parse().unwrap_or(99);
    let minute: u8 = value[14..16].parse().unwrap_or(99);
    let second: u8 = value[17..19].parse().unwrap_or(99);
    v.check(
        (1..=12).contains(&month)
            && (1..=31).contains(&day)
            && hour < 24
            && minute < 60
            && second < 60,
        || format!("datetime {value:?} is out of range"),
    );
}

fn verify_duration(v: &mut Violations, value: &str) {
    let bytes = value.as_bytes();
    let shape_ok = value.len() == 10
        && value.is_ascii()
        && bytes[0] == b'P'
        && bytes[3] == b'D'
        && bytes[6] == b'H'
        && bytes[9] == b'M'
        && value[1..3].chars().all(|c| c.is_ascii_digit())
        && value[4..6].chars().all(|c| c.is_ascii_digit())
        && value[7..9].chars().all(|c| c.is_ascii_digit());
    if !shape_ok {
        v.0.push(format!("invalid duration {value:?}"));
        return;
    }
    let hours: u8 = value[4..6].parse().unwrap_or(99);
    let minutes: u8 = value[7..9].parse().unwrap_or(99);
    v.check(hours < 24 && minutes < 60, || {
        format!("duration {value:?} is out of range")
    });
}

fn verify_coordinate(
    v: &mut Violations,
    name: &'static str,
    value: &str,
    integer_digits: usize,
    max_degrees: u16,
) {
    let mut chars = value.chars();
    let sign_ok = matches!(chars.next(), Some('+') | Some('-'));
    let rest: String = chars.collect();
    let parts: Vec<&str> = rest.split('.').collect();
    let shape_ok = sign_ok
        && parts.len() == 2
        && parts[0].len() == integer_digits
        && parts[1].len() == 5
        && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()));
    if !shape_ok {
        v.0.push(format!("invalid {name} {value:?}"));
        return;
    }
    let degrees: u16 = parts[0].parse().unwrap_or(u16::MAX);
    v.check(degrees <= max_degrees, || {
        format!("{name} {value:?} is out of range")
    });
}
