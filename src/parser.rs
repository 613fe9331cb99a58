use serde::{Deserialize, Serialize};

const FIELD_SEPARATOR: char = ':';
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// Terminal `data` payload of an OpenAI-style completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

// ============================================================================
// Event Frame
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
}

impl EventFrame {
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    /// `true` when this frame announces the end of the stream.
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Default)]
pub struct EventFrameParser {
    /// Undecoded tail, line terminators already normalized to `\n`.
    buffer: String,
    /// Last character fed was `\r`; a following `\n` belongs to the same terminator.
    pending_cr: bool,
    /// Prefix of `buffer` already searched for a frame boundary.
    scanned: usize,
}

impl EventFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of text and collect every frame it completes, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<EventFrame> {
        if chunk.is_empty() {
            return Vec::new();
        }

        self.buffer.reserve(chunk.len());
        for ch in chunk.chars() {
            match ch {
                '\n' if self.pending_cr => self.pending_cr = false,
                '\r' => {
                    self.buffer.push('\n');
                    self.pending_cr = true;
                }
                _ => {
                    self.buffer.push(ch);
                    self.pending_cr = false;
                }
            }
        }

        // A boundary may straddle the previous chunk's trailing `\n`.
        let mut from = match self.scanned.checked_sub(1) {
            Some(prev) if self.buffer.as_bytes()[prev] == b'\n' => prev,
            _ => self.scanned,
        };

        let mut frames = Vec::new();
        while let Some(offset) = self.buffer[from..].find("\n\n") {
            let pos = from + offset;
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(frame) = Self::parse_block(&block[..pos]) {
                frames.push(frame);
            }
            from = 0;
        }
        self.scanned = self.buffer.len();

        frames
    }

    /// Decode whatever is left once the body is complete.
    pub fn flush(&mut self) -> Option<EventFrame> {
        self.pending_cr = false;
        self.scanned = 0;
        let block = std::mem::take(&mut self.buffer);
        Self::parse_block(&block)
    }

    /// Bytes currently held back waiting for a frame boundary.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending_cr = false;
        self.scanned = 0;
    }

    fn parse_block(block: &str) -> Option<EventFrame> {
        if block.trim().is_empty() {
            return None;
        }

        let mut frame = EventFrame::message(String::new());
        let mut seen_field = false;

        for line in block.split('\n') {
            let line = line.trim_end();
            // Empty lines and `:comment` lines both land here.
            let index = match line.find(FIELD_SEPARATOR) {
                Some(index) if index > 0 => index,
                _ => continue,
            };

            let field = &line[..index];
            let value = line[index + 1..].trim_start();

            match field {
                "data" => frame.data.push_str(value),
                "event" => frame.event_type = value.to_string(),
                "id" => frame.id = Some(value.to_string()),
                "retry" => match value.parse::<u64>() {
                    Ok(retry) => frame.retry = Some(retry),
                    Err(_) => continue,
                },
                _ => continue,
            }
            seen_field = true;
        }

        if frame.event_type.is_empty() {
            frame.event_type = DEFAULT_EVENT_TYPE.to_string();
        }

        seen_field.then_some(frame)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&str]) -> Vec<EventFrame> {
        let mut parser = EventFrameParser::new();
        let mut frames: Vec<EventFrame> = chunks.iter().flat_map(|c| parser.feed(c)).collect();
        frames.extend(parser.flush());
        frames
    }

    #[test]
    fn test_single_frame() {
        let mut parser = EventFrameParser::new();
        let frames = parser.feed("data: hello\n\n");
        assert_eq!(frames, vec![EventFrame::message("hello")]);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_split_across_chunks() {
        let frames = feed_all(&["data:", " A\n\nda", "ta: B\n\n"]);
        let data: Vec<_> = frames.iter().map(|f| f.data.as_str()).collect();
        assert_eq!(data, vec!["A", "B"]);
    }

    #[test]
    fn test_split_inside_field_name() {
        let mut parser = EventFrameParser::new();
        assert!(parser.feed("dat").is_empty());
        assert!(parser.feed("a: hello").is_empty());
        let frames = parser.feed("\n\n");
        assert_eq!(frames[0].data, "hello");
    }

    #[test]
    fn test_every_partition_matches_whole_text() {
        let text = "data: {\"a\":1}\r\n\r\nevent: ping\ndata: x\n\n: keep-alive\n\ndata: [DONE]\n\n";
        let whole = feed_all(&[text]);
        assert_eq!(whole.len(), 3);

        for split in 0..=text.len() {
            if !text.is_char_boundary(split) {
                continue;
            }
            let (left, right) = text.split_at(split);
            assert_eq!(feed_all(&[left, right]), whole, "split at {}", split);
        }

        let per_char: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        let per_char: Vec<&str> = per_char.iter().map(String::as_str).collect();
        assert_eq!(feed_all(&per_char), whole);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut parser = EventFrameParser::new();
        let frames = parser.feed("data: 1\n\ndata: 2\n\ndata: 3\n\n");
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].data, "3");
    }

    #[test]
    fn test_mixed_line_terminators() {
        let frames = feed_all(&["data: a\r\rdata: b\r\n\r\ndata: c\n\n"]);
        let data: Vec<_> = frames.iter().map(|f| f.data.as_str()).collect();
        assert_eq!(data, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_crlf_split_between_chunks() {
        let frames = feed_all(&["data: a\r", "\n\r", "\ndata: b\r\n\r\n"]);
        let data: Vec<_> = frames.iter().map(|f| f.data.as_str()).collect();
        assert_eq!(data, vec!["a", "b"]);
    }

    #[test]
    fn test_repeated_data_lines_concatenate() {
        let mut parser = EventFrameParser::new();
        let frames = parser.feed("data: Hel\ndata: lo\n\n");
        assert_eq!(frames[0].data, "Hello");
    }

    #[test]
    fn test_fields_and_unknown_fields() {
        let mut parser = EventFrameParser::new();
        let frames = parser.feed("event: delta\nid: 42\nretry: 3000\nfoo: bar\ndata: x\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_type, "delta");
        assert_eq!(frames[0].id.as_deref(), Some("42"));
        assert_eq!(frames[0].retry, Some(3000));
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn test_invalid_retry_ignored() {
        let mut parser = EventFrameParser::new();
        let frames = parser.feed("retry: soon\ndata: x\n\n");
        assert_eq!(frames[0].retry, None);
    }

    #[test]
    fn test_comment_only_block_is_skipped() {
        let mut parser = EventFrameParser::new();
        assert!(parser.feed(": keep-alive\n\n").is_empty());
        assert!(parser.feed("no separator here\n\n").is_empty());
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let mut parser = EventFrameParser::new();
        assert!(parser.feed("").is_empty());
        assert_eq!(parser.buffered_len(), 0);
        assert!(parser.flush().is_none());
    }

    #[test]
    fn test_flush_emits_trailing_frame() {
        let mut parser = EventFrameParser::new();
        assert!(parser.feed("data: tail").is_empty());
        assert_eq!(parser.flush(), Some(EventFrame::message("tail")));
        assert!(parser.flush().is_none());
    }

    #[test]
    fn test_buffer_only_holds_tail() {
        let mut parser = EventFrameParser::new();
        parser.feed("data: first\n\ndata: sec");
        assert_eq!(parser.buffered_len(), "data: sec".len());
    }

    #[test]
    fn test_long_frame_in_small_chunks() {
        let payload = "привіт, ".repeat(2_000);
        let text = format!("data: {}\n\ndata: end\n\n", payload);

        let mut parser = EventFrameParser::new();
        let mut frames = Vec::new();
        let mut rest = text.as_str();
        while !rest.is_empty() {
            let mut cut = rest.len().min(7);
            while !rest.is_char_boundary(cut) {
                cut += 1;
            }
            let (chunk, tail) = rest.split_at(cut);
            frames.extend(parser.feed(chunk));
            rest = tail;
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, payload.trim_end());
        assert_eq!(frames[1].data, "end");
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_done_sentinel() {
        let mut parser = EventFrameParser::new();
        let frames = parser.feed("data: [DONE]\n\n");
        assert!(frames[0].is_done());
        assert!(!EventFrame::message("{\"done\":true}").is_done());
    }
}
