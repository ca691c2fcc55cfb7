//! Purpose: Request/response envelopes for the line-delimited worker protocol.
//! Exports: `Request`, `Operation`, `Response`, `ResponseType`, `ErrorInfo`, parse helpers.
//! Role: Decodes untrusted lines into typed operations and encodes every outcome.
//! Invariants: Every encoded response carries all of `id`, `type`, `value`, `ref`, `error`.
//! Invariants: `type` alone decides which of `value`/`ref`/`error` is non-null.
//! Invariants: Undecodable input maps to a `DecodeError` response with id `"unknown"`.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::core::error::{Error, ErrorKind};
use crate::runtime::classify::Classification;

pub const UNKNOWN_ID: &str = "unknown";

#[derive(Clone, Debug, PartialEq)]
pub struct CallRequest {
    pub target: String,
    pub method: Option<String>,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttrRequest {
    pub target: String,
    pub attr: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Call(CallRequest),
    GetAttr(AttrRequest),
    Release { refs: Vec<String>, skipped: usize },
    Ping,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Call(_) => "call",
            Operation::GetAttr(_) => "getattr",
            Operation::Release { .. } => "del",
            Operation::Ping => "ping",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub id: String,
    pub operation: Operation,
    /// The `type` text when it named no known operation (dispatched as `call`).
    pub unrecognized_type: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Value,
    Ref,
    None,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub category: String,
    pub message: String,
    pub traceback: Option<String>,
}

impl ErrorInfo {
    pub fn from_error(err: &Error) -> Self {
        Self {
            category: err.category().to_string(),
            message: err.message().to_string(),
            traceback: Some(err.traceback()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub value: Option<Value>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub error: Option<ErrorInfo>,
}

impl Response {
    pub fn value(id: impl Into<String>, value: Value) -> Self {
        Self {
            id: id.into(),
            response_type: ResponseType::Value,
            value: Some(value),
            reference: None,
            error: None,
        }
    }

    pub fn none(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            response_type: ResponseType::None,
            value: None,
            reference: None,
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            id: id.into(),
            response_type: ResponseType::Error,
            value: None,
            reference: None,
            error: Some(error),
        }
    }

    pub fn from_error(id: impl Into<String>, err: &Error) -> Self {
        Self::error(id, ErrorInfo::from_error(err))
    }

    pub fn from_classification(id: impl Into<String>, classification: Classification) -> Self {
        match classification {
            Classification::None => Self::none(id),
            Classification::Value(value) => Self::value(id, value),
            Classification::Ref { id: handle, descriptor } => Self {
                id: id.into(),
                response_type: ResponseType::Ref,
                value: Some(descriptor.to_json()),
                reference: Some(handle.to_string()),
                error: None,
            },
        }
    }

    pub fn is_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }

    pub(crate) fn decode_error(message: impl Into<String>) -> Self {
        Self::error(
            UNKNOWN_ID,
            ErrorInfo {
                category: ErrorKind::Decode.category().to_string(),
                message: message.into(),
                traceback: None,
            },
        )
    }
}

pub fn parse_request_line(line: &str) -> Result<Value, Response> {
    serde_json::from_str::<Value>(line)
        .map_err(|err| Response::decode_error(format!("Invalid JSON: {err}")))
}

pub fn parse_request(value: Value) -> Result<Request, Response> {
    let mut object = match value {
        Value::Object(object) => object,
        _ => return Err(Response::decode_error("request must be a JSON object")),
    };

    let id = parse_id(object.remove("id"));
    let invalid = |message: &str| {
        Response::from_error(
            id.clone(),
            &Error::new(ErrorKind::InvalidRequest).with_message(message),
        )
    };

    let raw_type = object.remove("type");
    let (kind, unrecognized_type) = match raw_type.as_ref() {
        None | Some(Value::Null) => ("call", None),
        Some(Value::String(text)) => match text.as_str() {
            "call" | "getattr" | "del" | "ping" => (text.as_str(), None),
            other => ("call", Some(other.to_string())),
        },
        Some(other) => ("call", Some(other.to_string())),
    };

    let operation = match kind {
        "ping" => Operation::Ping,
        "del" => {
            let (refs, skipped) = parse_refs(object.remove("refs"));
            Operation::Release { refs, skipped }
        }
        "getattr" => Operation::GetAttr(AttrRequest {
            target: take_string(&mut object, "target")
                .map_err(|_| invalid("target must be a string"))?,
            attr: take_string(&mut object, "attr")
                .map_err(|_| invalid("attr must be a string"))?,
        }),
        _ => {
            let target = take_string(&mut object, "target")
                .map_err(|_| invalid("target must be a string"))?;
            let method = take_string(&mut object, "method")
                .map_err(|_| invalid("method must be a string"))?;
            let args = match object.remove("args") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(args)) => args,
                Some(_) => return Err(invalid("args must be an array")),
            };
            let kwargs = match object.remove("kwargs") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(kwargs)) => kwargs,
                Some(_) => return Err(invalid("kwargs must be an object")),
            };
            Operation::Call(CallRequest {
                target,
                method: (!method.is_empty()).then_some(method),
                args,
                kwargs,
            })
        }
    };

    Ok(Request {
        id,
        operation,
        unrecognized_type,
    })
}

fn parse_id(raw: Option<Value>) -> String {
    match raw {
        Some(Value::String(id)) => id,
        Some(Value::Number(number)) if number.is_i64() || number.is_u64() => number.to_string(),
        _ => UNKNOWN_ID.to_string(),
    }
}

/// Missing or null fields read as the empty string.
fn take_string(object: &mut Map<String, Value>, key: &str) -> Result<String, ()> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(text)) => Ok(text),
        Some(_) => Err(()),
    }
}

fn parse_refs(raw: Option<Value>) -> (Vec<String>, usize) {
    let items = match raw {
        None | Some(Value::Null) => return (Vec::new(), 0),
        Some(Value::Array(items)) => items,
        Some(_) => return (Vec::new(), 1),
    };
    let total = items.len();
    let refs: Vec<String> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(id),
            _ => None,
        })
        .collect();
    let skipped = total - refs.len();
    (refs, skipped)
}

/// The value payload of a `ping` response.
pub fn ping_payload(refs_count: usize) -> Value {
    json!({ "status": "ok", "refs_count": refs_count })
}

/// The value payload of a `del` response.
pub fn release_payload(deleted: &[String], remaining: usize) -> Value {
    json!({ "deleted": deleted, "remaining": remaining })
}
