// Per-stream response state machine.
//
// AwaitingHeaders -> AwaitingBody -> Complete, with Failed reachable from any
// non-terminal state. Out-of-order or late events never abort the exchange;
// they come back as a ProtocolViolation for the caller to log and count. The
// one exception is a stream that ends before any HEADERS frame, which fails.
use bytes::BytesMut;
use strand_wire::{HeaderField, PSEUDO_STATUS};

use super::{InboundEvent, StreamId};
use crate::error::{ErrorKind, RequestError};
use crate::request::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    AwaitingHeaders,
    AwaitingBody,
    Complete,
    Failed,
}

impl AssemblyState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AssemblyState::Complete | AssemblyState::Failed)
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Complete,
    Failed,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("stream {stream_id}: {reason} (state {state:?})")]
pub struct ProtocolViolation {
    pub stream_id: StreamId,
    pub state: AssemblyState,
    pub reason: &'static str,
}

#[derive(Debug)]
pub struct ResponseAssembler {
    stream_id: StreamId,
    state: AssemblyState,
    status: Option<u16>,
    headers: Vec<HeaderField>,
    body: BytesMut,
    decode_errors: u64,
    failure: Option<RequestError>,
}

impl ResponseAssembler {
    pub fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            state: AssemblyState::AwaitingHeaders,
            status: None,
            headers: Vec::new(),
            body: BytesMut::new(),
            decode_errors: 0,
            failure: None,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Header values seen so far that were not valid text.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    pub fn failure(&self) -> Option<&RequestError> {
        self.failure.as_ref()
    }

    pub fn apply(&mut self, event: InboundEvent) -> Result<Progress, ProtocolViolation> {
        if event.stream_id() != self.stream_id {
            return Err(self.violation("event for another stream"));
        }
        match (self.state, event) {
            (AssemblyState::Complete | AssemblyState::Failed, _) => {
                Err(self.violation("event after stream end"))
            }
            (_, InboundEvent::Reset { message, .. }) => {
                self.fail(RequestError::transport(format!("stream reset: {message}")));
                Ok(Progress::Failed)
            }
            (
                AssemblyState::AwaitingHeaders,
                InboundEvent::Headers {
                    headers,
                    stream_ended,
                    ..
                },
            ) => {
                self.record_headers(headers);
                Ok(self.advance(AssemblyState::AwaitingBody, stream_ended))
            }
            (
                AssemblyState::AwaitingHeaders,
                InboundEvent::Data {
                    stream_ended: true,
                    ..
                },
            ) => {
                self.fail(RequestError::new(
                    ErrorKind::ProtocolViolation,
                    "stream ended before headers",
                ));
                Ok(Progress::Failed)
            }
            (AssemblyState::AwaitingHeaders, InboundEvent::Data { .. }) => {
                Err(self.violation("data before headers"))
            }
            (
                AssemblyState::AwaitingBody,
                InboundEvent::Data {
                    data, stream_ended, ..
                },
            ) => {
                self.body.extend_from_slice(&data);
                Ok(self.advance(AssemblyState::AwaitingBody, stream_ended))
            }
            (
                AssemblyState::AwaitingBody,
                InboundEvent::Headers {
                    headers,
                    stream_ended,
                    ..
                },
            ) => {
                // Trailers: kept, but they never change the status.
                self.headers.extend(headers);
                Ok(self.advance(AssemblyState::AwaitingBody, stream_ended))
            }
        }
    }

    /// Move to `Failed` unless already terminal. Returns whether it moved.
    pub fn fail(&mut self, error: RequestError) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = AssemblyState::Failed;
        self.failure = Some(error);
        true
    }

    /// Hand out what was assembled; complete on success, partial otherwise.
    pub fn finish(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body.freeze(),
        }
    }

    fn record_headers(&mut self, headers: Vec<HeaderField>) {
        for field in headers {
            if field.name.as_ref() == PSEUDO_STATUS.as_bytes() {
                match field.value_str().ok().map(|value| value.trim().parse::<u16>()) {
                    Some(Ok(code)) => self.status = Some(code),
                    Some(Err(_)) => {
                        tracing::debug!(stream_id = %self.stream_id, "non-numeric status header");
                        self.decode_errors += 1;
                    }
                    None => {
                        tracing::debug!(stream_id = %self.stream_id, "status header is not utf-8");
                        self.decode_errors += 1;
                    }
                }
            } else if field.value_str().is_err() {
                self.decode_errors += 1;
            }
            self.headers.push(field);
        }
    }

    fn advance(&mut self, next: AssemblyState, stream_ended: bool) -> Progress {
        if stream_ended {
            self.state = AssemblyState::Complete;
            Progress::Complete
        } else {
            self.state = next;
            Progress::Pending
        }
    }

    fn violation(&self, reason: &'static str) -> ProtocolViolation {
        ProtocolViolation {
            stream_id: self.stream_id,
            state: self.state,
            reason,
        }
    }
}
