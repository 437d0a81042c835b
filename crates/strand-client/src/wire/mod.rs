// Frame IO between QUIC streams and the inbound event feed.
pub(crate) use self::frame_io::{run_stream_reader, write_request};

mod decode_log;
mod frame_io;
