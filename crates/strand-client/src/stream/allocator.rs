use std::collections::HashSet;

use super::StreamId;

/// First client-initiated bidirectional stream id.
pub const FIRST_CLIENT_STREAM_ID: u64 = 0;
/// Distance between consecutive client-initiated bidirectional ids.
pub const STREAM_ID_STEP: u64 = 4;

/// Hands out stream ids for one connection. Ids are never reused, even after
/// release, so a late event can never be confused with a newer exchange.
#[derive(Debug)]
pub struct StreamAllocator {
    next: u64,
    open: HashSet<StreamId>,
}

impl Default for StreamAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAllocator {
    pub fn new() -> Self {
        Self {
            next: FIRST_CLIENT_STREAM_ID,
            open: HashSet::new(),
        }
    }

    pub fn allocate(&mut self) -> StreamId {
        let id = StreamId(self.next);
        self.next += STREAM_ID_STEP;
        self.open.insert(id);
        id
    }

    /// Returns false when the id was not open; releasing twice is harmless.
    pub fn release(&mut self, id: StreamId) -> bool {
        self.open.remove(&id)
    }

    pub fn is_open(&self, id: StreamId) -> bool {
        self.open.contains(&id)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Total ids handed out since creation.
    pub fn issued(&self) -> u64 {
        (self.next - FIRST_CLIENT_STREAM_ID) / STREAM_ID_STEP
    }
}
