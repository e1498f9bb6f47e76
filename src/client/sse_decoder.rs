//! Incremental decoder for `text/event-stream` bodies.

/// One dispatched item of an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// `:`-prefixed line, used by the server for keep-alives.
    Comment(String),
    Event { event: Option<String>, data: String },
}

/// Feeds arbitrary byte chunks and yields complete frames.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk; frames split across chunks are held back until complete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.feed_line(line) {
                frames.push(frame);
            }
        }

        frames
    }

    fn feed_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            if self.data.is_empty() && self.event.is_none() {
                return None;
            }
            let data = self.data.join("\n");
            self.data.clear();
            return Some(SseFrame::Event {
                event: self.event.take(),
                data,
            });
        }

        if let Some(comment) = line.strip_prefix(':') {
            return Some(SseFrame::Comment(comment.trim_start().to_owned()));
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: room.changed\nda").is_empty());
        let frames = decoder.push(b"ta: {\"v\":1}\n\n: keep-alive\n\n");
        assert_eq!(
            frames,
            vec![
                SseFrame::Event {
                    event: Some("room.changed".into()),
                    data: "{\"v\":1}".into(),
                },
                SseFrame::Comment("keep-alive".into()),
            ]
        );
    }

    #[test]
    fn joins_multiline_data_and_handles_crlf() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: a\r\ndata: b\r\n\r\n");
        assert_eq!(
            frames,
            vec![SseFrame::Event {
                event: None,
                data: "a\nb".into(),
            }]
        );
    }
}
