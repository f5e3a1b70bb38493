use std::{borrow::Cow, fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ProcedureKind;
use crate::ErrorCode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JsonRpcVersion2_0;

impl JsonRpcVersion2_0 {
    pub const VALUE: &'static str = "2.0";
}

impl Serialize for JsonRpcVersion2_0 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion2_0 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let version: Cow<'de, str> = Deserialize::deserialize(deserializer)?;
        if version == Self::VALUE {
            Ok(JsonRpcVersion2_0)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected jsonrpc version \"2.0\", found \"{version}\""
            )))
        }
    }
}

/// Identifies a request and, for subscriptions, every event produced for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Null,
    Number(u32),
    String(Arc<str>),
}

impl Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Null => f.write_str("null"),
            RequestId::Number(number) => Display::fmt(number, f),
            RequestId::String(string) => Display::fmt(string, f),
        }
    }
}

impl From<u32> for RequestId {
    fn from(value: u32) -> Self {
        RequestId::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::String(value.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: JsonRpcVersion2_0,
    pub id: RequestId,
    #[serde(flatten)]
    pub inner: RequestInner,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, inner: RequestInner) -> Self {
        Self {
            jsonrpc: JsonRpcVersion2_0,
            id: id.into(),
            inner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum RequestInner {
    Query {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    Mutation {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    Subscription {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    /// Stops the subscription started with the same request id.
    SubscriptionStop,
}

impl RequestInner {
    pub fn procedure(kind: ProcedureKind, path: impl Into<String>, input: Option<Value>) -> Self {
        let path = path.into();
        match kind {
            ProcedureKind::Query => RequestInner::Query { path, input },
            ProcedureKind::Mutation => RequestInner::Mutation { path, input },
            ProcedureKind::Subscription => RequestInner::Subscription { path, input },
        }
    }

    pub fn kind(&self) -> Option<ProcedureKind> {
        match self {
            RequestInner::Query { .. } => Some(ProcedureKind::Query),
            RequestInner::Mutation { .. } => Some(ProcedureKind::Mutation),
            RequestInner::Subscription { .. } => Some(ProcedureKind::Subscription),
            RequestInner::SubscriptionStop => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub jsonrpc: JsonRpcVersion2_0,
    pub id: RequestId,
    pub result: ResponseInner,
}

impl Response {
    pub fn new(id: RequestId, result: ResponseInner) -> Self {
        Self {
            jsonrpc: JsonRpcVersion2_0,
            id,
            result,
        }
    }

    pub fn error(id: RequestId, error: impl Into<ErrorData>) -> Self {
        Self::new(id, ResponseInner::Error(error.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ResponseInner {
    /// One item of a running subscription.
    Event(Value),
    /// The single result of a query or mutation.
    Response(Value),
    Error(ErrorData),
    /// The subscription's stream ended on the server.
    Complete,
}

/// The error payload carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: i32,
    pub message: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorData {
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: code.to_status_code() as i32,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `None` when the peer sent a code this crate does not define.
    pub fn error_code(&self) -> Option<ErrorCode> {
        u16::try_from(self.code)
            .ok()
            .and_then(ErrorCode::from_status_code)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = Request::new(
            1,
            RequestInner::Query {
                path: "getUser".into(),
                input: Some(json!(7)),
            },
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "query",
                "params": { "path": "getUser", "input": 7 }
            })
        );
    }

    #[test]
    fn test_request_without_input_or_version() {
        let request: Request = serde_json::from_value(json!({
            "id": "a",
            "method": "mutation",
            "params": { "path": "reset" }
        }))
        .unwrap();
        assert_eq!(request.id, RequestId::from("a"));
        assert_eq!(
            request.inner,
            RequestInner::Mutation {
                path: "reset".into(),
                input: None
            }
        );
    }

    #[test]
    fn test_subscription_stop_has_no_params() {
        let request: Request =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 4, "method": "subscriptionStop" }))
                .unwrap();
        assert_eq!(request.inner, RequestInner::SubscriptionStop);
        assert_eq!(request.inner.kind(), None);
    }

    #[test]
    fn test_wrong_version_is_rejected() {
        let result = serde_json::from_value::<Request>(json!({
            "jsonrpc": "1.0",
            "id": null,
            "method": "query",
            "params": { "path": "version" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_null_id() {
        let id: RequestId = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(id, RequestId::Null);
        assert_eq!(serde_json::to_value(RequestId::Null).unwrap(), json!(null));
    }

    #[test]
    fn test_response_wire_format() {
        let response = Response::new(RequestId::Number(3), ResponseInner::Event(json!("tick")));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "jsonrpc": "2.0", "id": 3, "result": { "type": "event", "data": "tick" } })
        );

        let complete = Response::new(RequestId::Number(3), ResponseInner::Complete);
        assert_eq!(
            serde_json::to_value(&complete).unwrap(),
            json!({ "jsonrpc": "2.0", "id": 3, "result": { "type": "complete" } })
        );
    }

    #[test]
    fn test_error_response_round_trip() {
        let response = Response::error(
            RequestId::Null,
            ErrorData::new(ErrorCode::NotFound, "no such user"),
        );
        let text = serde_json::to_string(&response).unwrap();
        let parsed: Response = serde_json::from_str(&text).unwrap();
        match parsed.result {
            ResponseInner::Error(error) => {
                assert_eq!(error.error_code(), Some(ErrorCode::NotFound));
                assert_eq!(error.message, "no such user");
            }
            other => panic!("Expected error, got {other:?}"),
        }
    }
}
