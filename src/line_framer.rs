//! Reassembles newline-delimited lines from text that arrives in chunks of
//! arbitrary size. A chunk may end in the middle of a line; that tail is kept
//! until a later chunk completes it.

/// Buffers incomplete trailing text between calls to [`LineFramer::feed`].
///
/// Lines are terminated by `\n` or `\r\n`. The pending buffer has no upper
/// bound, so a stream that never sends a terminator grows it forever.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: String,
}

impl LineFramer {
    /// Instantiates a framer with an empty pending buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` to the pending buffer and returns an iterator over
    /// the lines it completed, in order, without their terminators.
    ///
    /// Lines are taken out of the buffer lazily. Any line left unread when
    /// the iterator is dropped stays buffered and comes out first on the
    /// next call.
    pub fn feed(&mut self, chunk: &str) -> Lines<'_> {
        self.pending.push_str(chunk);
        Lines {
            framer: self,
            start: 0,
        }
    }

    /// The text received since the last terminator.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Throws away any partial line.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Lines completed by one [`LineFramer::feed`] call.
#[derive(Debug)]
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
    // consumed prefix of the pending buffer, removed in one go on drop
    start: usize,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.framer.pending[self.start..];
        let end = rest.find('\n')?;
        let line = rest[..end].strip_suffix('\r').unwrap_or(&rest[..end]);
        let line = line.to_owned();
        self.start += end + 1;
        Some(line)
    }
}

impl Drop for Lines<'_> {
    fn drop(&mut self) {
        self.framer.pending.drain(..self.start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "1.500,10,20,30\r\n0.800,11,21,31\n\n  \nVoltage: 1.2\r\n";

    fn expected() -> Vec<String> {
        vec!["1.500,10,20,30", "0.800,11,21,31", "", "  ", "Voltage: 1.2"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn whole_stream_in_one_chunk() {
        let mut framer = LineFramer::new();
        let lines: Vec<_> = framer.feed(STREAM).collect();
        assert_eq!(lines, expected());
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn chunk_without_terminator_only_buffers() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed("1.5,1").count(), 0);
        assert_eq!(framer.feed("0,20").count(), 0);
        assert_eq!(framer.pending(), "1.5,10,20");
        let lines: Vec<_> = framer.feed(",30\n").collect();
        assert_eq!(lines, vec!["1.5,10,20,30".to_string()]);
    }

    #[test]
    fn split_at_every_boundary() {
        for cut in 0..=STREAM.len() {
            let (head, tail) = STREAM.split_at(cut);
            let mut framer = LineFramer::new();
            let mut lines: Vec<_> = framer.feed(head).collect();
            lines.extend(framer.feed(tail));
            assert_eq!(lines, expected(), "split at {}", cut);
        }
    }

    #[test]
    fn one_byte_at_a_time() {
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for i in 0..STREAM.len() {
            lines.extend(framer.feed(&STREAM[i..i + 1]));
        }
        assert_eq!(lines, expected());
    }

    #[test]
    fn carriage_return_split_from_its_newline() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed("Z_raw: 7\r").count(), 0);
        let lines: Vec<_> = framer.feed("\n").collect();
        assert_eq!(lines, vec!["Z_raw: 7".to_string()]);
    }

    #[test]
    fn unread_lines_survive_until_next_feed() {
        let mut framer = LineFramer::new();
        let first = framer.feed("a\nb\nc").next();
        assert_eq!(first, Some("a".to_string()));
        let rest: Vec<_> = framer.feed("\n").collect();
        assert_eq!(rest, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn many_lines_in_one_chunk() {
        let text: String = (0..5000).map(|i| format!("{},1,2,3\r\n", i)).collect();
        let mut framer = LineFramer::new();
        let mut lines = framer.feed(&text);
        assert_eq!(lines.next(), Some("0,1,2,3".to_string()));
        assert_eq!(lines.count(), 4999);
        assert_eq!(framer.pending(), "");

        assert_eq!(framer.feed("tail").count(), 0);
        assert_eq!(framer.pending(), "tail");
    }

    #[test]
    fn clear_drops_partial_line() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed("garbage").count(), 0);
        framer.clear();
        let lines: Vec<_> = framer.feed("ok\n").collect();
        assert_eq!(lines, vec!["ok".to_string()]);
    }
}
