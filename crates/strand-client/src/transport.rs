// Seam between the correlation core and whatever carries the frames.
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use strand_wire::HeaderField;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::counters::StreamCounters;
use crate::error::RequestError;
use crate::stream::{Demultiplexer, InboundEvent, StreamId, run_dispatcher};

/// Sending half of a connection's inbound event feed. Transports push every
/// event they decode here; the connection's dispatcher routes them.
pub type EventFeed = mpsc::Sender<InboundEvent>;

pub fn event_feed(depth: usize) -> (EventFeed, mpsc::Receiver<InboundEvent>) {
    mpsc::channel(depth.max(1))
}

/// Outbound side of a multiplexed connection.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    /// Send headers and an optional body on `stream_id`. A `terminal` send
    /// closes the local side of the stream.
    async fn send_frame(
        &self,
        stream_id: StreamId,
        headers: Vec<HeaderField>,
        body: Option<Bytes>,
        terminal: bool,
    ) -> Result<(), RequestError>;

    /// Stop all local work for the stream. Called exactly once per attempt,
    /// whether it succeeded, failed or was cancelled.
    fn close_stream(&self, stream_id: StreamId);
}

/// One multiplexed connection plus its routing state and dispatcher task.
pub struct MuxConnection<T> {
    transport: T,
    demux: Arc<Demultiplexer>,
    dispatcher: JoinHandle<()>,
}

impl<T: StreamTransport> MuxConnection<T> {
    /// Must be called inside a tokio runtime; spawns the dispatcher.
    pub fn new(transport: T, feed: mpsc::Receiver<InboundEvent>) -> Self {
        let demux = Arc::new(Demultiplexer::new(Arc::new(StreamCounters::default())));
        let dispatcher = tokio::spawn(run_dispatcher(feed, Arc::clone(&demux)));
        Self {
            transport,
            demux,
            dispatcher,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn demux(&self) -> &Demultiplexer {
        &self.demux
    }

    pub fn counters(&self) -> &StreamCounters {
        self.demux.counters()
    }

    /// Streams allocated on this connection and not yet retired.
    pub fn open_streams(&self) -> usize {
        self.demux.open_streams()
    }
}

impl<T> Drop for MuxConnection<T> {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

impl<T> std::fmt::Debug for MuxConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxConnection")
            .field("open_streams", &self.demux.open_streams())
            .finish_non_exhaustive()
    }
}
