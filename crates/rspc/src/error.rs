use std::{borrow::Cow, fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};

pub use crate::model::ErrorData;
use crate::model::{ProcedureKind, RequestId};

/// The kind of failure a procedure reports. Every code maps onto an HTTP
/// status so transports that speak HTTP can reuse it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotSupported,
    Timeout,
    Conflict,
    PreconditionFailed,
    PayloadTooLarge,
    ClientClosedRequest,
    InternalServerError,
}

impl ErrorCode {
    pub const fn to_status_code(&self) -> u16 {
        match self {
            ErrorCode::BadRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotSupported => 405,
            ErrorCode::Timeout => 408,
            ErrorCode::Conflict => 409,
            ErrorCode::PreconditionFailed => 412,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::ClientClosedRequest => 499,
            ErrorCode::InternalServerError => 500,
        }
    }

    pub const fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            400 => Some(ErrorCode::BadRequest),
            401 => Some(ErrorCode::Unauthorized),
            403 => Some(ErrorCode::Forbidden),
            404 => Some(ErrorCode::NotFound),
            405 => Some(ErrorCode::MethodNotSupported),
            408 => Some(ErrorCode::Timeout),
            409 => Some(ErrorCode::Conflict),
            412 => Some(ErrorCode::PreconditionFailed),
            413 => Some(ErrorCode::PayloadTooLarge),
            499 => Some(ErrorCode::ClientClosedRequest),
            500 => Some(ErrorCode::InternalServerError),
            _ => None,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u16(self.to_status_code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = u16::deserialize(deserializer)?;
        ErrorCode::from_status_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code {code}")))
    }
}

/// The error a resolver or middleware returns.
///
/// Only the code and message reach the caller; the optional cause stays on
/// the server for logging.
#[derive(Debug, Clone)]
pub struct Error {
    code: ErrorCode,
    message: String,
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause<E>(code: ErrorCode, message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            code,
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn to_error_data(&self) -> ErrorData {
        ErrorData::new(self.code, self.message.clone())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl Display for ErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(data) = &self.data {
            write!(f, "({})", data)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorData {}

/// Failures raised while executing a request against a router.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("the requested operation '{0}' is not supported by this server")]
    OperationNotFound(String),
    #[error("error deserializing procedure arguments: {0}")]
    DeserializingArg(#[source] serde_json::Error),
    #[error("error serializing procedure result: {0}")]
    SerializingResult(#[source] serde_json::Error),
    #[error("resolver returned an error: {0}")]
    Resolver(#[source] Error),
    #[error("middleware rejected the request: {0}")]
    Middleware(#[source] Error),
    #[error("subscriptions must be started with a non-null id")]
    SubscriptionWithNullId,
    #[error("a subscription with id {0} is already running")]
    SubscriptionDuplicateId(RequestId),
    #[error("method '{0}' is not supported here")]
    UnsupportedMethod(Cow<'static, str>),
    #[error("procedure finished without producing a result")]
    NoResult,
}

impl ExecError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ExecError::OperationNotFound(_) => ErrorCode::NotFound,
            ExecError::DeserializingArg(_) => ErrorCode::BadRequest,
            ExecError::SerializingResult(_) => ErrorCode::InternalServerError,
            ExecError::Resolver(err) | ExecError::Middleware(err) => err.code(),
            ExecError::SubscriptionWithNullId | ExecError::SubscriptionDuplicateId(_) => {
                ErrorCode::BadRequest
            }
            ExecError::UnsupportedMethod(_) => ErrorCode::MethodNotSupported,
            ExecError::NoResult => ErrorCode::InternalServerError,
        }
    }

    /// Resolver and middleware messages are forwarded as written, everything
    /// else is described by the variant.
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            ExecError::Resolver(err) | ExecError::Middleware(err) => err.to_error_data(),
            ExecError::SerializingResult(_) => {
                ErrorData::new(self.code(), "error serializing procedure result")
            }
            other => ErrorData::new(other.code(), other.to_string()),
        }
    }
}

impl From<ExecError> for ErrorData {
    fn from(value: ExecError) -> Self {
        value.to_error_data()
    }
}

/// Errors writing the type bindings of a router.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write bindings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize bindings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that stop a [`RouterBuilder`](crate::RouterBuilder) from producing a router.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{kind} '{key}' is registered more than once")]
    DuplicateKey { kind: ProcedureKind, key: String },
    #[error("{kind} key '{key}' is invalid: {reason}")]
    InvalidKey {
        kind: ProcedureKind,
        key: String,
        reason: &'static str,
    },
    #[error("exporting bindings failed: {0}")]
    Export(#[from] ExportError),
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_error_code_status_round_trip() {
        for code in [
            ErrorCode::BadRequest,
            ErrorCode::Unauthorized,
            ErrorCode::Forbidden,
            ErrorCode::NotFound,
            ErrorCode::MethodNotSupported,
            ErrorCode::Timeout,
            ErrorCode::Conflict,
            ErrorCode::PreconditionFailed,
            ErrorCode::PayloadTooLarge,
            ErrorCode::ClientClosedRequest,
            ErrorCode::InternalServerError,
        ] {
            assert_eq!(ErrorCode::from_status_code(code.to_status_code()), Some(code));
        }
        assert_eq!(ErrorCode::from_status_code(200), None);
    }

    #[test]
    fn test_error_code_serializes_as_number() {
        assert_eq!(serde_json::to_string(&ErrorCode::NotFound).unwrap(), "404");
        let code: ErrorCode = serde_json::from_str("409").unwrap();
        assert_eq!(code, ErrorCode::Conflict);
        assert!(serde_json::from_str::<ErrorCode>("418").is_err());
    }

    #[test]
    fn test_error_data_display_without_data() {
        let error = ErrorData::new(ErrorCode::BadRequest, "Invalid Request");
        assert_eq!(format!("{}", error), "400: Invalid Request");
    }

    #[test]
    fn test_error_data_display_with_data() {
        let error = ErrorData {
            code: 400,
            message: "Invalid Request".into(),
            data: Some(serde_json::json!({"detail": "missing field"})),
        };
        assert_eq!(
            format!("{}", error),
            "400: Invalid Request({\"detail\":\"missing field\"})"
        );
    }

    #[test]
    fn test_error_keeps_cause_as_source() {
        let error = Error::with_cause(
            ErrorCode::InternalServerError,
            "database unavailable",
            io::Error::other("connection refused"),
        );
        let source = std::error::Error::source(&error).expect("cause should be the source");
        assert_eq!(source.to_string(), "connection refused");
        assert_eq!(error.to_string(), "database unavailable");
    }

    #[test]
    fn test_resolver_errors_keep_their_message() {
        let error = ExecError::Resolver(Error::new(ErrorCode::Forbidden, "not yours"));
        let data = error.to_error_data();
        assert_eq!(data.code, 403);
        assert_eq!(data.message, "not yours");
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let serde_error = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        let data = ExecError::SerializingResult(serde_error).to_error_data();
        assert_eq!(data.code, 500);
        assert_eq!(data.message, "error serializing procedure result");

        let data = ExecError::OperationNotFound("missing".into()).to_error_data();
        assert_eq!(data.code, 404);
        assert!(data.message.contains("missing"));
    }
}
