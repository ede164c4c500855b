//! Splits a server-sent-events byte stream into frames.

const DEFAULT_EVENT: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let mut event = None;
        let mut data_lines = Vec::new();

        for line in raw.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "event" => event = (!value.is_empty()).then(|| value.to_string()),
                "data" => data_lines.push(value),
                _ => {}
            }
        }

        if event.is_none() && data_lines.is_empty() {
            return None;
        }

        Some(Self::new(
            event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data_lines.join("\n"),
        ))
    }
}

/// Accumulates transport chunks until whole frames are available.
///
/// Bytes are kept undecoded so a multi-byte character split across two
/// chunks survives intact. CR, LF and CRLF line endings all become LF.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
    after_cr: bool,
}

impl FrameBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        for &byte in chunk {
            match byte {
                b'\n' if self.after_cr => {}
                b'\r' => self.buffer.push(b'\n'),
                other => self.buffer.push(other),
            }
            self.after_cr = byte == b'\r';
        }

        let mut frames = Vec::new();
        while let Some(idx) = find_blank_line(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..idx + 2).collect();
            let raw = String::from_utf8_lossy(&raw[..idx]);
            if let Some(frame) = SseFrame::parse(&raw) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes whatever is left once the transport has closed.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let raw = std::mem::take(&mut self.buffer);
        self.after_cr = false;
        SseFrame::parse(&String::from_utf8_lossy(&raw))
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_frames_across_chunks() {
        let mut buffer = FrameBuffer::default();
        assert!(buffer.push(b"event: data\ndata: {\"a\"").is_empty());

        let frames = buffer.push(b": 1}\n\nevent: end\n\n");
        assert_eq!(
            frames,
            vec![
                SseFrame::new("data", "{\"a\": 1}"),
                SseFrame::new("end", ""),
            ]
        );
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn normalizes_crlf_and_skips_keep_alive_comments() {
        let mut buffer = FrameBuffer::default();
        let frames = buffer.push(b":keep-alive\r\n\r\nevent: data\r\ndata: x\r\n\r\n");
        assert_eq!(frames, vec![SseFrame::new("data", "x")]);
    }

    #[test]
    fn splits_frames_on_bare_carriage_returns() {
        let mut buffer = FrameBuffer::default();
        let mut frames = buffer.push(b"event: data\rdata: {\"x\":1}\r\revent: end\r\r");
        frames.extend(buffer.finish());
        assert_eq!(
            frames,
            vec![
                SseFrame::new("data", "{\"x\":1}"),
                SseFrame::new("end", ""),
            ]
        );
    }

    #[test]
    fn crlf_split_between_chunks_is_one_line_break() {
        let mut buffer = FrameBuffer::default();
        assert!(buffer.push(b"event: data\r\ndata: x\r").is_empty());
        assert!(buffer.push(b"\ndata: y\r").is_empty());
        let frames = buffer.push(b"\n\r\n");
        assert_eq!(frames, vec![SseFrame::new("data", "x\ny")]);
    }

    #[test]
    fn empty_event_label_means_message() {
        let mut buffer = FrameBuffer::default();
        let frames = buffer.push(b"event:\ndata: hi\n\n");
        assert_eq!(frames, vec![SseFrame::new("message", "hi")]);
    }

    #[test]
    fn joins_multiline_data_and_defaults_event_label() {
        let mut buffer = FrameBuffer::default();
        let frames = buffer.push(b"id: 7\ndata: one\ndata:two\n\n");
        assert_eq!(frames, vec![SseFrame::new("message", "one\ntwo")]);
    }

    #[test]
    fn keeps_multibyte_characters_split_between_chunks() {
        let encoded = "event: data\ndata: caf\u{e9}\n\n".as_bytes();
        let split = encoded.len() - 3;

        let mut buffer = FrameBuffer::default();
        assert!(buffer.push(&encoded[..split]).is_empty());
        let frames = buffer.push(&encoded[split..]);
        assert_eq!(frames, vec![SseFrame::new("data", "caf\u{e9}")]);
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut buffer = FrameBuffer::default();
        assert!(buffer.push(b"event: end").is_empty());
        assert_eq!(buffer.finish(), Some(SseFrame::new("end", "")));
    }
}
