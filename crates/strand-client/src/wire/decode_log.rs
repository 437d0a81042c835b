// Rate-limited logging of undecodable stream bytes.
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::stream::StreamId;

static DECODE_ERROR_LOGS: AtomicUsize = AtomicUsize::new(0);

const DECODE_ERROR_LOG_LIMIT: usize = 20;
const PREVIEW_BYTES: usize = 64;

pub(crate) fn log_decode_error(
    stream_id: StreamId,
    err: &strand_wire::Error,
    pending: &[u8],
) {
    let count = DECODE_ERROR_LOGS.fetch_add(1, Ordering::Relaxed);
    if count >= DECODE_ERROR_LOG_LIMIT {
        return;
    }
    let preview = &pending[..pending.len().min(PREVIEW_BYTES)];
    let hex = preview
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ");
    let printable = preview
        .iter()
        .map(|b| {
            let c = *b as char;
            if c.is_ascii_graphic() || c == ' ' {
                c
            } else {
                '.'
            }
        })
        .collect::<String>();
    tracing::warn!(
        stream_id = %stream_id,
        error = %err,
        buffered = pending.len(),
        preview_hex = %hex,
        preview_printable = %printable,
        "frame decode error"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_decode_error_does_not_panic() {
        let err = strand_wire::Error::MalformedHeaderBlock("truncated header name");
        log_decode_error(StreamId(0), &err, b"\x01\x02\xff");
    }

    #[test]
    fn log_decode_error_with_large_preview() {
        let mut data = vec![b'X'; 100];
        data[50] = 0x00;
        let err = strand_wire::Error::FrameTooLarge {
            length: 1 << 30,
            max: 1024,
        };
        log_decode_error(StreamId(4), &err, &data);
    }
}
