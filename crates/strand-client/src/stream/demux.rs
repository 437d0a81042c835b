// Routing table from stream id to the single consumer awaiting that stream.
//
// All routing state sits behind one lock held only for map operations, and a
// single dispatcher task feeds events in, so event n on a connection is fully
// routed before event n+1 is looked at.
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{InboundEvent, StreamAllocator, StreamId};
use crate::counters::StreamCounters;

/// What happened to one dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Routed,
    /// Routed, and the event was terminal so the route is gone.
    Retired,
    /// No live consumer; counted as a dropped event.
    Dropped,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("stream {0} is not open")]
    NotOpen(StreamId),
    #[error("stream {0} already has a consumer")]
    AlreadyRegistered(StreamId),
}

/// Receiving end for the events of one stream.
#[derive(Debug)]
pub struct EventSink {
    stream_id: StreamId,
    rx: mpsc::UnboundedReceiver<InboundEvent>,
}

impl EventSink {
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Next event, or `None` once the route is gone and the queue drained.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.rx.recv().await
    }
}

#[derive(Debug, Default)]
struct Routes {
    allocator: StreamAllocator,
    sinks: HashMap<StreamId, mpsc::UnboundedSender<InboundEvent>>,
}

#[derive(Debug)]
pub struct Demultiplexer {
    routes: Mutex<Routes>,
    counters: Arc<StreamCounters>,
}

impl Default for Demultiplexer {
    fn default() -> Self {
        Self::new(Arc::new(StreamCounters::default()))
    }
}

impl Demultiplexer {
    pub fn new(counters: Arc<StreamCounters>) -> Self {
        Self {
            routes: Mutex::new(Routes::default()),
            counters,
        }
    }

    pub fn counters(&self) -> &Arc<StreamCounters> {
        &self.counters
    }

    /// Allocate an id without a consumer yet; pair with [`Self::register`].
    pub fn allocate(&self) -> StreamId {
        let stream_id = self.routes.lock().allocator.allocate();
        t_gauge!("strand_client_open_streams").increment(1.0);
        stream_id
    }

    /// Allocate and register in one critical section.
    pub fn open_stream(&self) -> (StreamId, EventSink) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream_id = {
            let mut routes = self.routes.lock();
            let stream_id = routes.allocator.allocate();
            routes.sinks.insert(stream_id, tx);
            stream_id
        };
        t_gauge!("strand_client_open_streams").increment(1.0);
        (stream_id, EventSink { stream_id, rx })
    }

    pub fn register(&self, stream_id: StreamId) -> Result<EventSink, RouteError> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut routes = self.routes.lock();
            if !routes.allocator.is_open(stream_id) {
                return Err(RouteError::NotOpen(stream_id));
            }
            if routes.sinks.contains_key(&stream_id) {
                return Err(RouteError::AlreadyRegistered(stream_id));
            }
            routes.sinks.insert(stream_id, tx);
        }
        Ok(EventSink { stream_id, rx })
    }

    pub fn dispatch(&self, event: InboundEvent) -> Dispatch {
        let stream_id = event.stream_id();
        let terminal = event.is_terminal();
        let outcome = {
            let mut routes = self.routes.lock();
            let sent = routes
                .sinks
                .get(&stream_id)
                .map(|sink| sink.send(event).is_ok());
            match sent {
                Some(true) if terminal => {
                    routes.sinks.remove(&stream_id);
                    Dispatch::Retired
                }
                Some(true) => Dispatch::Routed,
                Some(false) => {
                    // Consumer went away without retiring.
                    routes.sinks.remove(&stream_id);
                    Dispatch::Dropped
                }
                None => Dispatch::Dropped,
            }
        };
        if outcome == Dispatch::Dropped {
            self.counters.record_dropped_event();
            tracing::debug!(stream_id = %stream_id, terminal, "dropping event for unrouted stream");
        }
        outcome
    }

    /// Drop the route (if any) and release the id. Safe to call repeatedly.
    pub fn retire(&self, stream_id: StreamId) {
        let released = {
            let mut routes = self.routes.lock();
            routes.sinks.remove(&stream_id);
            routes.allocator.release(stream_id)
        };
        if released {
            t_gauge!("strand_client_open_streams").decrement(1.0);
            tracing::debug!(stream_id = %stream_id, "stream retired");
        }
    }

    /// Ids allocated and not yet retired.
    pub fn open_streams(&self) -> usize {
        self.routes.lock().allocator.open_count()
    }

    /// Ids that still have a consumer attached.
    pub fn routed_streams(&self) -> usize {
        self.routes.lock().sinks.len()
    }

    pub fn dropped_events(&self) -> u64 {
        self.counters.dropped_events()
    }
}

/// Drain the connection's event feed into the routing table until the feed closes.
pub(crate) async fn run_dispatcher(
    mut feed: mpsc::Receiver<InboundEvent>,
    demux: Arc<Demultiplexer>,
) {
    while let Some(event) = feed.recv().await {
        demux.dispatch(event);
    }
    tracing::debug!("event feed closed; dispatcher exiting");
}
