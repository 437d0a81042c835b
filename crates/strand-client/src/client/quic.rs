// StreamTransport backed by one QUIC bidirectional stream per logical stream.
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use quinn::SendStream;
use std::collections::HashMap;
use strand_transport::QuicConnection;
use strand_wire::HeaderField;
use tokio::task::AbortHandle;

use crate::error::RequestError;
use crate::stream::StreamId;
use crate::transport::{EventFeed, StreamTransport};
use crate::wire::{run_stream_reader, write_request};

#[derive(Default)]
struct OpenStream {
    // Present while the local side is still writable.
    send: Option<SendStream>,
    reader: Option<AbortHandle>,
}

pub struct QuicStreamTransport {
    connection: QuicConnection,
    feed: EventFeed,
    max_frame_bytes: usize,
    streams: Mutex<HashMap<StreamId, OpenStream>>,
}

impl QuicStreamTransport {
    pub fn new(connection: QuicConnection, feed: EventFeed, max_frame_bytes: usize) -> Self {
        Self {
            connection,
            feed,
            max_frame_bytes,
            streams: Mutex::new(HashMap::new()),
        }
    }

    pub fn connection(&self) -> &QuicConnection {
        &self.connection
    }

    /// QUIC streams currently held open for logical streams.
    pub fn active_streams(&self) -> usize {
        self.streams.lock().len()
    }

    async fn send_stream(&self, stream_id: StreamId) -> Result<SendStream, RequestError> {
        let existing = self
            .streams
            .lock()
            .get_mut(&stream_id)
            .and_then(|open| open.send.take());
        if let Some(send) = existing {
            return Ok(send);
        }
        let (send, recv) = self
            .connection
            .open_bi()
            .await
            .map_err(|err| RequestError::transport(format!("{err:#}")))?;
        let reader = tokio::spawn(run_stream_reader(
            stream_id,
            recv,
            self.feed.clone(),
            self.max_frame_bytes,
        ));
        tracing::debug!(
            stream_id = %stream_id,
            quic_stream = %send.id(),
            "opened quic stream"
        );
        self.streams.lock().entry(stream_id).or_default().reader = Some(reader.abort_handle());
        Ok(send)
    }
}

#[async_trait]
impl StreamTransport for QuicStreamTransport {
    async fn send_frame(
        &self,
        stream_id: StreamId,
        headers: Vec<HeaderField>,
        body: Option<Bytes>,
        terminal: bool,
    ) -> Result<(), RequestError> {
        let mut send = self.send_stream(stream_id).await?;
        write_request(&mut send, headers, body)
            .await
            .map_err(|err| RequestError::transport(format!("{err:#}")))?;
        if terminal {
            send.finish()
                .map_err(|err| RequestError::transport(format!("finish request: {err}")))?;
        } else {
            self.streams.lock().entry(stream_id).or_default().send = Some(send);
        }
        Ok(())
    }

    fn close_stream(&self, stream_id: StreamId) {
        let Some(open) = self.streams.lock().remove(&stream_id) else {
            return;
        };
        if let Some(reader) = open.reader {
            reader.abort();
        }
        if let Some(mut send) = open.send {
            let _ = send.reset(quinn::VarInt::from_u32(0));
        }
    }
}

impl std::fmt::Debug for QuicStreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuicStreamTransport")
            .field("peer", &self.connection.info().peer_addr)
            .field("active_streams", &self.active_streams())
            .finish()
    }
}
