// Frame IO for request/response exchanges over QUIC bidirectional streams.
use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use quinn::{RecvStream, SendStream};
use strand_wire::{Frame, FrameDecoder, HeaderField};

use crate::stream::{InboundEvent, StreamId};
use crate::transport::EventFeed;
use crate::wire::decode_log::log_decode_error;

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Write a HEADERS frame (if any headers) followed by a DATA frame (if any body).
pub(crate) async fn write_request(
    send: &mut SendStream,
    headers: Vec<HeaderField>,
    body: Option<Bytes>,
) -> Result<()> {
    let mut buf = BytesMut::new();
    if !headers.is_empty() {
        Frame::Headers(headers)
            .encode(&mut buf)
            .context("encode headers frame")?;
    }
    if let Some(body) = body.filter(|body| !body.is_empty()) {
        Frame::Data(body)
            .encode(&mut buf)
            .context("encode data frame")?;
    }
    send.write_all(&buf).await.context("write request frames")?;
    t_counter!("strand_client_bytes_out_total").increment(buf.len() as u64);
    Ok(())
}

/// Decode frames from `recv` into events for `stream_id` until the stream ends.
///
/// Always finishes with exactly one terminal event: an empty DATA event on a
/// clean FIN, or a reset when reading or decoding fails.
pub(crate) async fn run_stream_reader(
    stream_id: StreamId,
    mut recv: RecvStream,
    feed: EventFeed,
    max_frame_bytes: usize,
) {
    let mut decoder = FrameDecoder::new(max_frame_bytes);
    let terminal = 'read: loop {
        let chunk = match recv.read_chunk(READ_CHUNK_BYTES, true).await {
            Ok(Some(chunk)) => chunk.bytes,
            Ok(None) => {
                break match decoder.finish() {
                    Ok(()) => InboundEvent::Data {
                        stream_id,
                        data: Bytes::new(),
                        stream_ended: true,
                    },
                    Err(err) => reset(stream_id, format!("stream ended mid-frame: {err}")),
                };
            }
            Err(err) => break reset(stream_id, format!("read response: {err}")),
        };
        t_counter!("strand_client_bytes_in_total").increment(chunk.len() as u64);
        decoder.extend(&chunk);
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    let Some(event) = frame_event(stream_id, frame) else {
                        continue;
                    };
                    if feed.send(event).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    log_decode_error(stream_id, &err, decoder.pending());
                    break 'read reset(stream_id, format!("decode response: {err}"));
                }
            }
        }
    };
    if feed.send(terminal).await.is_err() {
        tracing::debug!(stream_id = %stream_id, "event feed closed before stream end");
    }
}

fn frame_event(stream_id: StreamId, frame: Frame) -> Option<InboundEvent> {
    match frame {
        Frame::Headers(headers) => Some(InboundEvent::Headers {
            stream_id,
            headers,
            stream_ended: false,
        }),
        Frame::Data(data) => Some(InboundEvent::Data {
            stream_id,
            data,
            stream_ended: false,
        }),
        Frame::Unknown { frame_type, .. } => {
            tracing::debug!(stream_id = %stream_id, frame_type, "skipping unknown frame");
            None
        }
    }
}

fn reset(stream_id: StreamId, message: String) -> InboundEvent {
    InboundEvent::Reset { stream_id, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_wire::PSEUDO_STATUS;

    #[test]
    fn frames_map_to_non_terminal_events() {
        let id = StreamId(12);
        let headers = frame_event(id, Frame::Headers(vec![HeaderField::new(PSEUDO_STATUS, "200")]))
            .expect("headers event");
        assert!(!headers.is_terminal());
        let data = frame_event(id, Frame::Data(Bytes::from_static(b"abc"))).expect("data event");
        assert_eq!(
            data,
            InboundEvent::Data {
                stream_id: id,
                data: Bytes::from_static(b"abc"),
                stream_ended: false,
            }
        );
        assert!(
            frame_event(
                id,
                Frame::Unknown {
                    frame_type: 0x21,
                    payload: Bytes::new(),
                }
            )
            .is_none()
        );
    }
}
