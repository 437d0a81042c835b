// Logical stream identity, inbound events, and the per-connection routing layer.
use bytes::Bytes;
use std::fmt;
use strand_wire::HeaderField;

mod allocator;
mod assembler;
mod demux;

pub use allocator::{FIRST_CLIENT_STREAM_ID, STREAM_ID_STEP, StreamAllocator};
pub use assembler::{AssemblyState, Progress, ProtocolViolation, ResponseAssembler};
pub use demux::{Demultiplexer, Dispatch, EventSink, RouteError};
pub(crate) use demux::run_dispatcher;

/// Identifier of one logical request/response exchange on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event produced by the transport for some stream.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Headers {
        stream_id: StreamId,
        headers: Vec<HeaderField>,
        stream_ended: bool,
    },
    Data {
        stream_id: StreamId,
        data: Bytes,
        stream_ended: bool,
    },
    /// The stream was reset or its transport failed before a clean end.
    Reset { stream_id: StreamId, message: String },
}

impl InboundEvent {
    pub fn stream_id(&self) -> StreamId {
        match self {
            InboundEvent::Headers { stream_id, .. }
            | InboundEvent::Data { stream_id, .. }
            | InboundEvent::Reset { stream_id, .. } => *stream_id,
        }
    }

    /// True when no further events will follow on this stream.
    pub fn is_terminal(&self) -> bool {
        match self {
            InboundEvent::Headers { stream_ended, .. } | InboundEvent::Data { stream_ended, .. } => {
                *stream_ended
            }
            InboundEvent::Reset { .. } => true,
        }
    }
}
