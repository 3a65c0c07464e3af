//! Incremental UTF-8 decoding of PTY output.
//!
//! PTY reads return arbitrary byte ranges, so a multi-byte character can be
//! split across two reads. Decoding each read on its own would turn both
//! halves into U+FFFD; `Utf8Decoder` holds the incomplete tail back and
//! prepends it to the next chunk instead.

/// Longest UTF-8 encoding of a single code point.
const MAX_SEQUENCE_LEN: usize = 4;

/// Stateful decoder that carries partial sequences between chunks.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, keeping any trailing incomplete sequence for the next call.
    ///
    /// Bytes that can never form a valid sequence are replaced with U+FFFD.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let split = bytes.len() - incomplete_tail_len(&bytes);
        self.pending = bytes.split_off(split);

        String::from_utf8(bytes)
            .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
    }

    /// Flush a dangling partial sequence as U+FFFD. Call at end of stream.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }

    /// Number of bytes currently held back.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Length of the suffix of `bytes` that is a valid but truncated sequence.
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    let max = bytes.len().min(MAX_SEQUENCE_LEN - 1);
    (1..=max)
        .find(|&len| {
            match std::str::from_utf8(&bytes[bytes.len() - len..]) {
                // `error_len() == None` means the input ended mid-sequence.
                Err(err) => err.valid_up_to() == 0 && err.error_len().is_none(),
                Ok(_) => false,
            }
        })
        .unwrap_or(0)
}
