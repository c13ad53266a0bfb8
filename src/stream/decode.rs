/// Incremental UTF-8 decoder for transport chunks.
///
/// A multi-byte character split across two network chunks must decode to the
/// same text as the unsplit stream. Incomplete trailing bytes are carried over
/// and prepended to the next chunk; invalid sequences degrade to U+FFFD
/// substitution instead of aborting the stream.
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self { carry: Vec::new() }
    }

    /// Decode one chunk of raw bytes, returning the text that is complete so far.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        if self.carry.is_empty() {
            if let Ok(text) = std::str::from_utf8(chunk) {
                return text.to_string();
            }
        }

        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                    out.push_str(unsafe { std::str::from_utf8_unchecked(&rest[..valid_up_to]) });
                    match err.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid_up_to + invalid_len..];
                        }
                        None => {
                            // Incomplete trailing sequence; hold it for the next chunk.
                            self.carry.extend_from_slice(&rest[valid_up_to..]);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush any carried bytes at end-of-transport.
    ///
    /// A dangling incomplete sequence at EOF can never complete, so it decodes
    /// lossily to replacement characters.
    pub fn finish(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        let tail = std::mem::take(&mut self.carry);
        String::from_utf8_lossy(&tail).into_owned()
    }
}

impl Default for Utf8Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_split(input: &[u8], split_at: usize) -> String {
        let mut decoder = Utf8Decoder::new();
        let mut out = decoder.decode(&input[..split_at]);
        out.push_str(&decoder.decode(&input[split_at..]));
        out.push_str(&decoder.finish());
        out
    }

    #[test]
    fn test_ascii_passthrough() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"hello"), "hello");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_multibyte_in_single_chunk() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode("köpek".as_bytes()), "köpek");
    }

    #[test]
    fn test_split_invariance_every_boundary() {
        let input = "köpeğimi 犬 🐕 seviyorum".as_bytes();
        let expected = std::str::from_utf8(input).unwrap();
        for split_at in 0..=input.len() {
            assert_eq!(decode_split(input, split_at), expected, "split at {split_at}");
        }
    }

    #[test]
    fn test_three_way_split_mid_character() {
        // 🐕 is four bytes; feed them one at a time.
        let input = "a🐕b".as_bytes();
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        for byte in input {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, "a🐕b");
    }

    #[test]
    fn test_invalid_interior_bytes_substitute() {
        let mut decoder = Utf8Decoder::new();
        let out = decoder.decode(b"ab\xFF\xFEcd");
        assert_eq!(out, "ab\u{FFFD}\u{FFFD}cd");
    }

    #[test]
    fn test_dangling_tail_flushes_lossily() {
        let mut decoder = Utf8Decoder::new();
        // First two bytes of a three-byte sequence, then EOF.
        let out = decoder.decode(&[0xE2, 0x82]);
        assert_eq!(out, "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_carry_then_valid_continuation() {
        let mut decoder = Utf8Decoder::new();
        let bytes = "ö".as_bytes();
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..]), "ö");
    }
}
