//! Console output buffer
//!
//! Append-only text accumulated from a connection's output. Retention is
//! bounded: once the retained text grows past `capacity` plus half of it
//! again, the oldest text is dropped so that exactly the newest `capacity`
//! bytes (rounded to a character boundary) remain. Snapshots never show more
//! than `capacity` bytes.

use parking_lot::Mutex;

/// Default retained bytes per console
pub const DEFAULT_CONSOLE_CAPACITY: usize = 64 * 1024;

/// Immutable view of a console at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSnapshot {
    text: String,
    start_offset: u64,
    end_offset: u64,
}

impl ConsoleSnapshot {
    /// Retained text, oldest first
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Absolute offset of the first retained byte.
    ///
    /// Greater than zero once anything has been evicted.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Total bytes of text ever appended
    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    /// Text appended after absolute offset `offset`.
    ///
    /// If `offset` has already been evicted the whole retained text is
    /// returned; callers can detect that with [`start_offset`](Self::start_offset).
    pub fn since(&self, offset: u64) -> &str {
        if offset <= self.start_offset {
            return &self.text;
        }
        let relative = usize::try_from(offset - self.start_offset).unwrap_or(usize::MAX);
        if relative >= self.text.len() {
            return "";
        }
        let mut start = relative;
        while !self.text.is_char_boundary(start) {
            start += 1;
        }
        &self.text[start..]
    }
}

struct ConsoleState {
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    partial: Vec<u8>,
    evicted: u64,
    appended: u64,
}

/// Bounded, append-only console buffer
pub struct ConsoleBuffer {
    capacity: usize,
    state: Mutex<ConsoleState>,
}

impl ConsoleBuffer {
    /// Create a buffer retaining roughly `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(ConsoleState {
                text: String::new(),
                partial: Vec::new(),
                evicted: 0,
                appended: 0,
            }),
        }
    }

    /// Retention cap in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append decoded text
    pub fn append(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.text.push_str(text);
        state.appended += text.len() as u64;
        self.evict(&mut state);
    }

    /// Decode raw output and append it.
    ///
    /// Multi-byte sequences split across chunks are carried over to the next
    /// call; invalid bytes become U+FFFD.
    pub fn append_bytes(&self, data: &[u8]) {
        let mut state = self.state.lock();
        let decoded = decode_utf8(&mut state.partial, data);
        if decoded.is_empty() {
            return;
        }
        state.text.push_str(&decoded);
        state.appended += decoded.len() as u64;
        self.evict(&mut state);
    }

    /// Copy of the newest `capacity` bytes
    pub fn snapshot(&self) -> ConsoleSnapshot {
        let state = self.state.lock();
        let start = tail_start(&state.text, self.capacity);
        ConsoleSnapshot {
            text: state.text[start..].to_owned(),
            start_offset: state.evicted + start as u64,
            end_offset: state.appended,
        }
    }

    fn evict(&self, state: &mut ConsoleState) {
        if state.text.len() <= self.capacity + self.capacity / 2 {
            return;
        }
        let cut = tail_start(&state.text, self.capacity);
        state.text.drain(..cut);
        state.evicted += cut as u64;
    }
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CAPACITY)
    }
}

/// Byte index where the last `capacity` bytes of `text` begin
fn tail_start(text: &str, capacity: usize) -> usize {
    if text.len() <= capacity {
        return 0;
    }
    let mut start = text.len() - capacity;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    start
}

fn decode_utf8(partial: &mut Vec<u8>, data: &[u8]) -> String {
    let mut bytes = std::mem::take(partial);
    bytes.extend_from_slice(data);

    let mut out = String::with_capacity(bytes.len());
    let mut rest = &bytes[..];
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, tail) = rest.split_at(e.valid_up_to());
                out.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        rest = &tail[len..];
                    }
                    None => {
                        partial.extend_from_slice(tail);
                        break;
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_snapshot() {
        let console = ConsoleBuffer::new(1024);
        console.append("$ ls\n");
        console.append("bin etc\n");

        let snapshot = console.snapshot();
        assert_eq!(snapshot.text(), "$ ls\nbin etc\n");
        assert_eq!(snapshot.start_offset(), 0);
        assert_eq!(snapshot.end_offset(), 13);
    }

    #[test]
    fn test_snapshot_is_detached_from_later_appends() {
        let console = ConsoleBuffer::new(1024);
        console.append("first");
        let before = console.snapshot();
        console.append(" second");

        assert_eq!(before.text(), "first");
        assert_eq!(console.snapshot().text(), "first second");
    }

    #[test]
    fn test_eviction_keeps_newest_capacity_bytes() {
        let console = ConsoleBuffer::new(10);
        for i in 0..10 {
            console.append(&format!("{}", i));
            console.append("abcd");
        }

        let snapshot = console.snapshot();
        assert_eq!(snapshot.text().len(), 10);
        assert!(snapshot.text().ends_with("9abcd"));
        assert_eq!(snapshot.end_offset(), 50);
        assert_eq!(snapshot.start_offset(), 40);
    }

    #[test]
    fn test_eviction_respects_char_boundaries() {
        let console = ConsoleBuffer::new(4);
        console.append("ééééé");

        let snapshot = console.snapshot();
        assert_eq!(snapshot.text(), "éé");
    }

    #[test]
    fn test_split_utf8_sequence_is_carried_over() {
        let console = ConsoleBuffer::new(1024);
        let bytes = "héllo".as_bytes();
        console.append_bytes(&bytes[..2]);
        assert_eq!(console.snapshot().text(), "h");

        console.append_bytes(&bytes[2..]);
        assert_eq!(console.snapshot().text(), "héllo");
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let console = ConsoleBuffer::new(1024);
        console.append_bytes(b"ok\xffok");
        assert_eq!(console.snapshot().text(), "ok\u{FFFD}ok");
    }

    #[test]
    fn test_since_returns_new_text() {
        let console = ConsoleBuffer::new(1024);
        console.append("abc");
        let first = console.snapshot();
        console.append("def");
        let second = console.snapshot();

        assert_eq!(second.since(first.end_offset()), "def");
        assert_eq!(second.since(second.end_offset()), "");
    }

    #[test]
    fn test_since_evicted_offset_returns_everything_retained() {
        let console = ConsoleBuffer::new(4);
        console.append("0123456789");
        let snapshot = console.snapshot();
        assert_eq!(snapshot.since(2), "6789");
    }
}
