//! Purpose: Route decoded requests to operation handlers and build response envelopes.
//! Key exports: `Dispatcher`, `RequestHandler`, `TypePolicy`, `ReleaseReport`.
//! Role: Transport-agnostic protocol core used by the stdio loop and tests.
//! Invariants: Exactly one response per dispatched line or value; nothing is dropped.
//! Invariants: Handler failures become `type: "error"` responses carrying the request id.
//! Invariants: `del` and `ping` never produce error responses.
//! Invariants: A panicking handler yields an `InternalError` response; the loop keeps going.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::core::error::{Error, ErrorKind};
use crate::protocol::{
    AttrRequest, CallRequest, Operation, Request, Response, parse_request, parse_request_line,
    ping_payload, release_payload,
};
use crate::runtime::classify::Classification;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub deleted: Vec<String>,
    pub remaining: usize,
}

pub trait RequestHandler {
    fn call(&mut self, request: CallRequest) -> Result<Classification, Error>;
    fn get_attr(&mut self, request: AttrRequest) -> Result<Classification, Error>;
    fn release(&mut self, refs: &[String]) -> ReleaseReport;
    fn ref_count(&self) -> usize;
}

/// How a `type` value that names no known operation is treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TypePolicy {
    /// Dispatch as `call`, matching minimal request shapes.
    #[default]
    Permissive,
    /// Reply with an `UnsupportedOperation` error.
    Strict,
}

pub struct Dispatcher<H> {
    handler: H,
    policy: TypePolicy,
    dispatched: u64,
}

impl<H: RequestHandler> Dispatcher<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            policy: TypePolicy::default(),
            dispatched: 0,
        }
    }

    pub fn with_policy(mut self, policy: TypePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Raw transport input; bytes that are not UTF-8 get a decode error response.
    pub fn dispatch_bytes(&mut self, line: &[u8]) -> Response {
        match std::str::from_utf8(line) {
            Ok(text) => self.dispatch_line(text),
            Err(err) => {
                self.dispatched += 1;
                warn!(bytes = line.len(), "request line is not valid UTF-8");
                Response::decode_error(format!("request line is not valid UTF-8: {err}"))
            }
        }
    }

    pub fn dispatch_line(&mut self, line: &str) -> Response {
        match parse_request_line(line) {
            Ok(value) => self.dispatch_value(value),
            Err(response) => {
                self.dispatched += 1;
                warn!("undecodable request line");
                response
            }
        }
    }

    pub fn dispatch_value(&mut self, value: Value) -> Response {
        match parse_request(value) {
            Ok(request) => self.dispatch_request(request),
            Err(response) => {
                self.dispatched += 1;
                response
            }
        }
    }

    pub fn dispatch_request(&mut self, request: Request) -> Response {
        self.dispatched += 1;
        let Request {
            id,
            operation,
            unrecognized_type,
        } = request;

        if let Some(raw_type) = unrecognized_type {
            match self.policy {
                TypePolicy::Permissive => {
                    warn!(id = %id, r#type = %raw_type, "unrecognized request type, dispatching as call");
                }
                TypePolicy::Strict => {
                    let err = Error::new(ErrorKind::UnsupportedOperation)
                        .with_message(format!("unsupported request type: {raw_type}"));
                    return Response::from_error(id, &err);
                }
            }
        }

        debug!(id = %id, operation = operation.name(), "dispatching request");
        match operation {
            Operation::Call(call) => self.classified(id, |handler| handler.call(call)),
            Operation::GetAttr(attr) => self.classified(id, |handler| handler.get_attr(attr)),
            Operation::Release { refs, skipped } => {
                if skipped > 0 {
                    warn!(id = %id, skipped, "ignored malformed handle ids in release");
                }
                let report = self.handler.release(&refs);
                Response::value(id, release_payload(&report.deleted, report.remaining))
            }
            Operation::Ping => Response::value(id, ping_payload(self.handler.ref_count())),
        }
    }

    fn classified(
        &mut self,
        id: String,
        operation: impl FnOnce(&mut H) -> Result<Classification, Error>,
    ) -> Response {
        let handler = &mut self.handler;
        match panic::catch_unwind(AssertUnwindSafe(|| operation(handler))) {
            Ok(Ok(classification)) => Response::from_classification(id, classification),
            Ok(Err(err)) => {
                debug!(id = %id, category = err.category(), message = err.message(), "request failed");
                Response::from_error(id, &err)
            }
            Err(payload) => {
                let detail = panic_detail(payload.as_ref());
                error!(id = %id, detail = %detail, "handler panicked");
                let err = Error::new(ErrorKind::Internal)
                    .with_message(format!("worker panicked while handling request: {detail}"));
                Response::from_error(id, &err)
            }
        }
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
