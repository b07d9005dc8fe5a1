//! Incremental Server-Sent Events decoding.
//!
//! Bytes arrive in arbitrary chunks; complete lines are drained from the
//! buffer and a frame is dispatched on each blank line.

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    line_buffer: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.line_buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(newline_index) = self.line_buffer.iter().position(|byte| *byte == b'\n') {
            let mut line = self.line_buffer.drain(..=newline_index).collect::<Vec<_>>();
            line.pop();
            if matches!(line.last(), Some(b'\r')) {
                line.pop();
            }
            if let Some(frame) = self.consume_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame the stream closed without terminating.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.line_buffer.is_empty() {
            let line = std::mem::take(&mut self.line_buffer);
            let line = line.strip_suffix(b"\r").unwrap_or(line.as_slice());
            if let Some(frame) = self.consume_line(line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn consume_line(&mut self, line: &[u8]) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        let line = String::from_utf8_lossy(line);
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };
        match field {
            "data" => self.data_lines.push(value.to_owned()),
            "event" => self.event = Some(value.to_owned()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data_lines).join("\n");
        Some(SseFrame { event, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_on_blank_line() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: {\"current\":1}\n\ndata: {\"current\":2}\n\n");
        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: None,
                    data: "{\"current\":1}".to_owned()
                },
                SseFrame {
                    event: None,
                    data: "{\"current\":2}".to_owned()
                },
            ]
        );
    }

    #[test]
    fn frames_survive_arbitrary_chunk_boundaries() {
        let payload = b"event: progress\r\ndata: {\"current\":3,\r\ndata: \"total\":4}\r\n\r\n";
        let mut decoder = SseDecoder::new();
        let mut frames = Vec::new();
        for byte in payload.iter() {
            frames.extend(decoder.push(std::slice::from_ref(byte)));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("progress"));
        assert_eq!(frames[0].data, "{\"current\":3,\n\"total\":4}");
    }

    #[test]
    fn comments_and_unknown_fields_are_ignored() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": keep-alive\nid: 7\nretry: 1000\n\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(
            decoder.finish(),
            Some(SseFrame {
                event: None,
                data: "tail".to_owned()
            })
        );
        assert_eq!(decoder.finish(), None);
    }
}
