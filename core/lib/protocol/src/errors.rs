use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-level error codes. These string constants surface verbatim in API
/// responses and in persisted `validationErrors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WfErrorCode {
    MetaheaderError,
    FormatError,
    ReferenceError,
    AuthError,
    EncryptionError,
    BadRequest,
    NoResource,
    NoData,
    ResourceConflict,
    NotImplemented,
    NotAvailable,
    NotAllowed,
}

impl WfErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MetaheaderError => "WF_METAHEADER_ERROR",
            Self::FormatError => "WF_FORMAT_ERROR",
            Self::ReferenceError => "WF_REFERENCE_ERROR",
            Self::AuthError => "WF_AUTH_ERROR",
            Self::EncryptionError => "WF_ENCRYPTION_ERROR",
            Self::BadRequest => "WF_API_BAD_REQUEST",
            Self::NoResource => "WF_API_NO_RESOURCE",
            Self::NoData => "WF_API_NO_DATA",
            Self::ResourceConflict => "WF_API_RESOURCE_CONFLICT",
            Self::NotImplemented => "WF_API_NOT_IMPLEMENTED",
            Self::NotAvailable => "WF_API_NOT_AVAILABLE",
            Self::NotAllowed => "WF_API_NOT_ALLOWED",
        }
    }
}

impl std::fmt::Display for WfErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client- or configuration-caused error. Surfaces to callers; the external
/// HTTP layer maps the code to a response status.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct ProcessingError {
    pub code: WfErrorCode,
    pub message: String,
    pub causes: Vec<String>,
}

impl ProcessingError {
    pub fn new(code: WfErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            causes: Vec::new(),
        }
    }

    pub fn with_causes(
        code: WfErrorCode,
        message: impl Into<String>,
        causes: Vec<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            causes,
        }
    }
}

/// On-wire protocol violation. In the rx direction these are typically
/// downgraded to warnings on the message's `validationErrors`; in tx they are
/// fatal to that send.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct ProtocolError {
    pub code: WfErrorCode,
    pub message: String,
    pub causes: Vec<String>,
}

impl ProtocolError {
    pub fn new(code: WfErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            causes: Vec::new(),
        }
    }

    pub fn with_causes(
        code: WfErrorCode,
        message: impl Into<String>,
        causes: Vec<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            causes,
        }
    }

    /// The strings appended to `validationErrors` when the error is
    /// downgraded to a warning.
    pub fn into_warnings(self) -> Vec<String> {
        if self.causes.is_empty() {
            vec![format!("{}: {}", self.code, self.message)]
        } else {
            self.causes
                .into_iter()
                .map(|cause| format!("{}: {}", self.code, cause))
                .collect()
        }
    }
}

impl From<ProtocolError> for ProcessingError {
    fn from(err: ProtocolError) -> Self {
        Self {
            code: err.code,
            message: err.message,
            causes: err.causes,
        }
    }
}
