/// Splits a chunked byte stream into complete lines.
///
/// HTTP bodies arrive in arbitrary chunks, so a single SSE or data stream
/// frame can be cut anywhere, including inside a multi-byte character.
/// Bytes are held until a `\n` arrives; since `\n` never occurs inside a
/// UTF-8 sequence every emitted line is whole.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Returns whatever is left once the stream has ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).trim_end_matches('\r').to_string();
        self.pending.clear();
        Some(rest)
    }
}

/// Incremental UTF-8 decoding for the raw text protocol. A character split
/// across chunks is held back until its remaining bytes arrive.
#[derive(Debug, Default)]
pub struct TextDecoder {
    pending: Vec<u8>,
}

impl TextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let out = text.to_string();
                self.pending.clear();
                out
            }
            Err(e) if e.error_len().is_none() => {
                // incomplete trailing sequence
                let valid = e.valid_up_to();
                let out = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                out
            }
            Err(_) => {
                let out = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                out
            }
        }
    }

    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        assert_eq!(buf.push(b":1}\r\n\ndata: [DO"), vec!["data: {\"a\":1}".to_string(), String::new()]);
        assert_eq!(buf.push(b"NE]\n"), vec!["data: [DONE]".to_string()]);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn keeps_gujarati_intact_when_split_mid_character() {
        let text = "0:\"નમસ્તે\"\n".as_bytes();
        let mut buf = LineBuffer::new();
        let (a, b) = text.split_at(5);
        assert!(buf.push(a).is_empty());
        assert_eq!(buf.push(b), vec!["0:\"નમસ્તે\"".to_string()]);
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut buf = LineBuffer::new();
        buf.push(b"d:{}");
        assert_eq!(buf.finish().as_deref(), Some("d:{}"));
    }

    #[test]
    fn text_decoder_holds_partial_character() {
        let bytes = "અમદાવાદ".as_bytes();
        let mut dec = TextDecoder::new();
        let mut out = dec.push(&bytes[..4]);
        out.push_str(&dec.push(&bytes[4..]));
        assert_eq!(out, "અમદાવાદ");
        assert_eq!(dec.finish(), None);
    }
}
