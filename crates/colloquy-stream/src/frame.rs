use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};

use crate::error::StreamError;

/// Field prefix that marks a data-bearing line
const DATA_FIELD: &str = "data:";

/// Payload of one complete `data:` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Text after the field prefix, without the line terminator
    pub data: String,
}

impl Frame {
    /// Create a frame from its payload
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

/// Incremental splitter from raw bytes to frames
///
/// Chunk boundaries may fall anywhere, including inside a multi-byte
/// character or between the `\r` and `\n` of a line terminator; the emitted
/// frames depend only on the concatenated bytes.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a newline
    buffer: String,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every frame it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.decode_utf8(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;

        while let Some(offset) = self.buffer[consumed..].find('\n') {
            let end = consumed + offset;
            let line = &self.buffer[consumed..end];
            let line = line.strip_suffix('\r').unwrap_or(line);

            if let Some(frame) = parse_line(line) {
                frames.push(frame);
            }

            consumed = end + 1;
        }

        self.buffer.drain(..consumed);
        frames
    }

    /// Signal end of input
    ///
    /// An unterminated final line is dropped rather than emitted, since a
    /// truncated payload cannot be trusted. Returns the number of bytes
    /// discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len() + self.pending.len();

        if discarded > 0 {
            tracing::debug!(bytes = discarded, "discarding unterminated trailing data");
        }

        self.buffer.clear();
        self.pending.clear();
        discarded
    }

    /// Append the decodable prefix of `pending + chunk` to the text buffer
    fn decode_utf8(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut input = self.pending.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    self.buffer.push_str(std::str::from_utf8(valid).unwrap_or_default());

                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        // Incomplete sequence at the end, wait for more bytes
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - input.len();
        self.pending.drain(..consumed);
    }
}

/// Turn one line into a frame if it carries the data field
///
/// Blank separators, comments (`:`), and other fields (`event:`, `id:`,
/// `retry:`) produce nothing.
fn parse_line(line: &str) -> Option<Frame> {
    let value = line.strip_prefix(DATA_FIELD)?;
    let value = value.strip_prefix(' ').unwrap_or(value);
    Some(Frame::new(value))
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: FrameDecoder,
    ready: VecDeque<Frame>,
    finished: bool,
}

/// Adapt a byte stream into a stream of frames
///
/// A transport error is forwarded once as [`StreamError::Transport`] and
/// ends the stream; nothing is retried.
pub fn decode_frames<S, B, E>(bytes: S) -> impl Stream<Item = Result<Frame, StreamError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.ready.pop_front() {
                return Some((Ok(frame), state));
            }

            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(chunk.as_ref());
                    state.ready.extend(frames);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(StreamError::Transport(e.to_string())), state));
                }
                None => {
                    state.decoder.finish();
                    state.finished = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "data: {\"type\":\"text\",\"content\":\"héllo wörld ✓\"}\r\n\r\n\
                          : ping\r\n\r\n\
                          event: message\r\n\
                          data: {\"type\":\"thinking\",\"content\":\"🤔\"}\r\n\r\n\
                          data:{\"type\":\"done\"}\n\n";

    fn decode_all(chunks: &[&[u8]]) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(decoder.push(chunk));
        }
        decoder.finish();
        frames
    }

    #[test]
    fn extracts_data_lines_only() {
        let frames = decode_all(&[SAMPLE.as_bytes()]);
        assert_eq!(
            frames,
            vec![
                Frame::new("{\"type\":\"text\",\"content\":\"héllo wörld ✓\"}"),
                Frame::new("{\"type\":\"thinking\",\"content\":\"🤔\"}"),
                Frame::new("{\"type\":\"done\"}"),
            ]
        );
    }

    #[test]
    fn every_two_way_split_yields_same_frames() {
        let bytes = SAMPLE.as_bytes();
        let expected = decode_all(&[bytes]);

        // Covers splits inside multi-byte characters and inside "\r\n"
        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_all(&[a, b]), expected, "split at byte {split}");
        }
    }

    #[test]
    fn fixed_size_chunks_yield_same_frames() {
        let bytes = SAMPLE.as_bytes();
        let expected = decode_all(&[bytes]);

        for size in 1..8 {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            assert_eq!(decode_all(&chunks), expected, "chunk size {size}");
        }
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let frames = decode_all(&[b"data: a\n\ndata: b\n\ndata: c\n\n".as_slice()]);
        assert_eq!(frames, vec![Frame::new("a"), Frame::new("b"), Frame::new("c")]);
    }

    #[test]
    fn unterminated_tail_is_discarded() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"data: complete\n\ndata: {\"type\":\"te");
        assert_eq!(frames, vec![Frame::new("complete")]);
        assert_eq!(decoder.finish(), "data: {\"type\":\"te".len());
    }

    #[test]
    fn incomplete_character_waits_for_next_chunk() {
        let snowman = "☃".as_bytes();
        let mut decoder = FrameDecoder::new();

        let mut first = b"data: ".to_vec();
        first.extend_from_slice(&snowman[..1]);
        assert!(decoder.push(&first).is_empty());

        let mut second = snowman[1..].to_vec();
        second.extend_from_slice(b"\n");
        assert_eq!(decoder.push(&second), vec![Frame::new("☃")]);
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let frames = decode_all(&[b"data: a\xFFb\n".as_slice()]);
        assert_eq!(frames, vec![Frame::new("a\u{FFFD}b")]);
    }

    #[test]
    fn blank_and_field_lines_produce_nothing() {
        let frames = decode_all(&[b"\n\r\n: keepalive\nid: 7\nretry: 100\nevent: x\n".as_slice()]);
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn stream_adapter_yields_frames() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(b"data: one\n".as_slice()),
            Ok(b"\ndata: t".as_slice()),
            Ok(b"wo\n\n".as_slice()),
        ];

        let frames: Vec<_> = decode_frames(stream::iter(chunks)).collect().await;
        assert_eq!(frames, vec![Ok(Frame::new("one")), Ok(Frame::new("two"))]);
    }

    #[tokio::test]
    async fn stream_adapter_forwards_transport_error_and_stops() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(b"data: one\n\n".as_slice()),
            Err("connection reset".to_owned()),
            Ok(b"data: never\n\n".as_slice()),
        ];

        let frames: Vec<_> = decode_frames(stream::iter(chunks)).collect().await;
        assert_eq!(
            frames,
            vec![
                Ok(Frame::new("one")),
                Err(StreamError::Transport("connection reset".to_owned())),
            ]
        );
    }
}
