//! Incremental parser for the generation endpoint's streamed reply.
//!
//! The endpoint delivers newline-delimited JSON objects, each carrying a
//! text increment and a completion flag:
//!
//! ```text
//! {"response":"Hel","done":false}
//! {"response":"lo","done":false}
//! {"response":"","done":true}
//! ```
//!
//! A body that arrives in one buffered chunk parses identically to a
//! true stream. The fragment sequence for one reply is ordered and ends
//! with exactly one terminal event.

/// One event in a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    /// An incremental piece of reply text, in generation order.
    Fragment(String),
    /// The reply completed normally.
    Done,
    /// The stream ended in a fault. Fragments delivered before the fault
    /// remain valid and are never retracted.
    Failed(String),
}

impl ReplyEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplyEvent::Done | ReplyEvent::Failed(_))
    }
}

/// Incremental NDJSON reply parser.
///
/// Feed byte chunks via [`NdjsonParser::push`]; call
/// [`NdjsonParser::flush`] at end of input to parse a trailing line that
/// lacks its newline. After a terminal event, further input is ignored.
#[derive(Debug, Default)]
pub struct NdjsonParser {
    line_buffer: String,
    finished: bool,
}

impl NdjsonParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminal event has been emitted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Push a chunk of bytes, returning any events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ReplyEvent> {
        let text = String::from_utf8_lossy(chunk);
        let mut events = Vec::new();

        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line_buffer);
                self.process_line(line.trim_end_matches('\r'), &mut events);
            } else {
                self.line_buffer.push(ch);
            }
        }

        events
    }

    /// Parse any trailing buffered line as final input.
    pub fn flush(&mut self) -> Vec<ReplyEvent> {
        let mut events = Vec::new();
        if !self.line_buffer.is_empty() {
            let line = std::mem::take(&mut self.line_buffer);
            self.process_line(line.trim_end_matches('\r'), &mut events);
        }
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<ReplyEvent>) {
        if self.finished || line.trim().is_empty() {
            return;
        }

        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            // Malformed interleaved lines (keep-alives, partial writes)
            // are skipped rather than faulting the stream.
            Err(_) => return,
        };

        if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
            self.finished = true;
            events.push(ReplyEvent::Failed(error.to_owned()));
            return;
        }

        if let Some(text) = value.get("response").and_then(|r| r.as_str())
            && !text.is_empty()
        {
            events.push(ReplyEvent::Fragment(text.to_owned()));
        }

        if value.get("done").and_then(|d| d.as_bool()) == Some(true) {
            self.finished = true;
            events.push(ReplyEvent::Done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments(events: &[ReplyEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                ReplyEvent::Fragment(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_complete_lines() {
        let mut parser = NdjsonParser::new();
        let events = parser.push(b"{\"response\":\"Hi\",\"done\":false}\n");
        assert_eq!(events, vec![ReplyEvent::Fragment("Hi".into())]);
    }

    #[test]
    fn line_split_across_chunks() {
        let mut parser = NdjsonParser::new();
        assert!(parser.push(b"{\"response\":\"Hel").is_empty());
        let events = parser.push(b"lo\",\"done\":false}\n");
        assert_eq!(events, vec![ReplyEvent::Fragment("Hello".into())]);
    }

    #[test]
    fn done_marker_terminates() {
        let mut parser = NdjsonParser::new();
        let events = parser.push(
            b"{\"response\":\"a\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n",
        );
        assert_eq!(
            events,
            vec![ReplyEvent::Fragment("a".into()), ReplyEvent::Done]
        );
        assert!(parser.is_finished());
    }

    #[test]
    fn final_line_may_carry_text_and_done() {
        let mut parser = NdjsonParser::new();
        let events = parser.push(b"{\"response\":\"bye\",\"done\":true}\n");
        assert_eq!(
            events,
            vec![ReplyEvent::Fragment("bye".into()), ReplyEvent::Done]
        );
    }

    #[test]
    fn error_line_fails_stream() {
        let mut parser = NdjsonParser::new();
        let events = parser.push(b"{\"error\":\"model not found\"}\n");
        assert_eq!(events, vec![ReplyEvent::Failed("model not found".into())]);
        assert!(parser.is_finished());
    }

    #[test]
    fn input_after_terminal_is_ignored() {
        let mut parser = NdjsonParser::new();
        parser.push(b"{\"response\":\"x\",\"done\":true}\n");
        let events = parser.push(b"{\"response\":\"y\",\"done\":false}\n");
        assert!(events.is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut parser = NdjsonParser::new();
        let events =
            parser.push(b"not json\n{\"response\":\"ok\",\"done\":false}\n");
        assert_eq!(events, vec![ReplyEvent::Fragment("ok".into())]);
    }

    #[test]
    fn flush_parses_trailing_line_without_newline() {
        let mut parser = NdjsonParser::new();
        assert!(parser.push(b"{\"response\":\"tail\",\"done\":true}").is_empty());
        let events = parser.flush();
        assert_eq!(
            events,
            vec![ReplyEvent::Fragment("tail".into()), ReplyEvent::Done]
        );
    }

    #[test]
    fn buffered_body_degrades_to_single_pass() {
        // An endpoint that buffers instead of streaming delivers the
        // whole reply in one chunk; concatenation is unchanged.
        let mut parser = NdjsonParser::new();
        let body = b"{\"response\":\"Hel\",\"done\":false}\n\
{\"response\":\"lo wor\",\"done\":false}\n\
{\"response\":\"ld\",\"done\":false}\n\
{\"response\":\"\",\"done\":true}\n";
        let events = parser.push(body);
        assert_eq!(fragments(&events), "Hello world");
        assert_eq!(events.last(), Some(&ReplyEvent::Done));
    }

    #[test]
    fn crlf_lines_are_handled() {
        let mut parser = NdjsonParser::new();
        let events = parser.push(b"{\"response\":\"a\",\"done\":false}\r\n");
        assert_eq!(events, vec![ReplyEvent::Fragment("a".into())]);
    }

    #[test]
    fn keepalive_blank_lines_are_ignored() {
        let mut parser = NdjsonParser::new();
        let events = parser.push(b"\n\n{\"response\":\"a\",\"done\":false}\n\n");
        assert_eq!(events, vec![ReplyEvent::Fragment("a".into())]);
    }
}
