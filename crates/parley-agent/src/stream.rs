/// Events produced while a generator streams its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Next piece of response text.
    TextDelta { text: String },

    /// Stream completed successfully.
    Done {
        model: String,
        tokens_in: u32,
        tokens_out: u32,
        stop_reason: String,
    },

    /// Transport or upstream failure after the stream started.
    Error { message: String },
}

/// One parsed line of a server-sent event stream.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine<'a> {
    Event(&'a str),
    Data(&'a str),
    /// Sentinel some OpenAI-compatible servers send instead of closing.
    Done,
}

/// Parse a single SSE line. Comments, ids and blank lines yield `None`.
pub fn parse_sse_line(line: &str) -> Option<SseLine<'_>> {
    let line = line.trim_end_matches('\r');
    if let Some(event) = line.strip_prefix("event:") {
        return Some(SseLine::Event(event.trim_start()));
    }
    let data = line.strip_prefix("data:")?.trim_start();
    if data.trim() == "[DONE]" {
        Some(SseLine::Done)
    } else {
        Some(SseLine::Data(data))
    }
}

/// Splits a byte stream into complete lines, buffering any partial tail.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append `chunk` and return every line it completed.
    ///
    /// Works on bytes so a multi-byte character split across chunks is
    /// decoded only once both halves have arrived.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_event_and_done() {
        assert_eq!(parse_sse_line("data: {\"a\":1}"), Some(SseLine::Data("{\"a\":1}")));
        assert_eq!(parse_sse_line("data:[DONE]\r"), Some(SseLine::Done));
        assert_eq!(parse_sse_line("event: ping"), Some(SseLine::Event("ping")));
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line(""), None);
    }

    #[test]
    fn line_buffer_holds_partial_lines() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"data: he").is_empty());
        assert_eq!(buf.push(b"llo\ndata: x\nda"), vec!["data: hello", "data: x"]);
        assert_eq!(buf.push(b"ta: y\n"), vec!["data: y"]);
    }

    #[test]
    fn line_buffer_reassembles_split_utf8() {
        let bytes = "data: chào\n".as_bytes();
        let mut buf = LineBuffer::default();
        // Split inside the two-byte 'à'.
        let split = bytes.iter().position(|&b| b >= 0x80).unwrap() + 1;
        assert!(buf.push(&bytes[..split]).is_empty());
        assert_eq!(buf.push(&bytes[split..]), vec!["data: chào"]);
    }
}
