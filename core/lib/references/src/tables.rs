//! Static relation tables for reference validation: which reference
//! indicators each message type may use, which message types it may
//! reference, and the per-indicator originator and chaining policies.

use wf_protocol::MessageCode;

pub(crate) struct ReferencePolicy {
    /// The referencing message may come from the referenced message's
    /// originator.
    pub same_originator: bool,
    /// The referencing message may come from another originator.
    pub different_originator: bool,
    /// Reference indicators the referenced message itself may carry.
    pub allowed_to_reference: &'static [char],
}

const ANY_INDICATOR: &[char] = &['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
const ORIGINAL_CHAIN: &[char] = &['0', '2', '3'];

/// Per-indicator policy. Indicator 0 (original message) has no policy; its
/// reference field is ignored.
pub(crate) fn policy(indicator: char) -> Option<&'static ReferencePolicy> {
    const RECALL: ReferencePolicy = ReferencePolicy {
        same_originator: true,
        different_originator: false,
        allowed_to_reference: ORIGINAL_CHAIN,
    };
    const UPDATE: ReferencePolicy = ReferencePolicy {
        same_originator: true,
        different_originator: false,
        allowed_to_reference: ORIGINAL_CHAIN,
    };
    const ADDITION: ReferencePolicy = ReferencePolicy {
        same_originator: true,
        different_originator: true,
        allowed_to_reference: ANY_INDICATOR,
    };
    const RELATED: ReferencePolicy = ReferencePolicy {
        same_originator: true,
        different_originator: true,
        allowed_to_reference: ANY_INDICATOR,
    };
    const DISCONTINUE: ReferencePolicy = ReferencePolicy {
        same_originator: true,
        different_originator: false,
        allowed_to_reference: &['0', '2', '3', '4'],
    };
    const CONFIRMATION: ReferencePolicy = ReferencePolicy {
        same_originator: false,
        different_originator: true,
        allowed_to_reference: ORIGINAL_CHAIN,
    };
    const ACKNOWLEDGE: ReferencePolicy = ReferencePolicy {
        same_originator: false,
        different_originator: true,
        allowed_to_reference: ORIGINAL_CHAIN,
    };
    const COMPLY: ReferencePolicy = ReferencePolicy {
        same_originator: false,
        different_originator: true,
        allowed_to_reference: ORIGINAL_CHAIN,
    };
    const REJECT: ReferencePolicy = ReferencePolicy {
        same_originator: false,
        different_originator: true,
        allowed_to_reference: ORIGINAL_CHAIN,
    };

    Some(match indicator {
        '1' => &RECALL,
        '2' => &UPDATE,
        '3' => &ADDITION,
        '4' => &RELATED,
        '5' => &DISCONTINUE,
        '6' => &CONFIRMATION,
        '7' => &ACKNOWLEDGE,
        '8' => &COMPLY,
        '9' => &REJECT,
        _ => return None,
    })
}

/// Reference indicators each message type may use.
pub(crate) fn allowed_indicators(code: MessageCode) -> &'static [char] {
    match code {
        MessageCode::Authentication => &['0', '1', '2', '4'],
        MessageCode::Crypto => &['0', '3', '4'],
        _ => ANY_INDICATOR,
    }
}

/// Message types a message of the given type may reference.
pub(crate) fn allowed_referenced_codes(code: MessageCode) -> &'static [MessageCode] {
    const ALL: &[MessageCode] = &[
        MessageCode::Authentication,
        MessageCode::Crypto,
        MessageCode::FreeText,
        MessageCode::Test,
        MessageCode::ProtectiveSign,
        MessageCode::DangerSign,
        MessageCode::StatusSignal,
        MessageCode::EmergencySignal,
        MessageCode::InfrastructureSign,
        MessageCode::MissionSignal,
        MessageCode::RequestSignal,
        MessageCode::Resource,
    ];
    const SIGNS_AND_SIGNALS: &[MessageCode] = &[
        MessageCode::ProtectiveSign,
        MessageCode::DangerSign,
        MessageCode::StatusSignal,
        MessageCode::EmergencySignal,
        MessageCode::InfrastructureSign,
        MessageCode::MissionSignal,
        MessageCode::RequestSignal,
    ];

    match code {
        // Authentication messages manage their own chain.
        MessageCode::Authentication => &[MessageCode::Authentication],
        // Signs and signals relate to other signs and signals.
        code if code.is_sign_signal() => SIGNS_AND_SIGNALS,
        // Crypto, free text, resources and tests may reference anything.
        _ => ALL,
    }
}
