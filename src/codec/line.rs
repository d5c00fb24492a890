//! A newline-delimited UTF-8 line codec — the simplest possible
//! `Decoder`/`Encoder` pair, used by the `chat_dispatch` example.

use super::{Decoder, Encoder};
use crate::poll::Try;
use crate::Error;

#[derive(Default)]
pub struct LineCodec {
    max_line_len: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        LineCodec {
            max_line_len: 64 * 1024,
        }
    }

    pub fn with_max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = max;
        self
    }
}

impl Decoder for LineCodec {
    type Item = String;

    fn decode(&mut self, buf: &mut Vec<u8>) -> Try<Option<String>> {
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = buf.drain(..=pos).collect();
            line.pop(); // the '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let text = String::from_utf8(line)
                .map_err(|e| Error::custom(e.utf8_error()))?;
            return Ok(Some(text));
        }
        if buf.len() > self.max_line_len {
            return Err(Error::Dispatch(format!(
                "line exceeded {} bytes with no delimiter",
                self.max_line_len
            )));
        }
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut Vec<u8>) -> Try<Option<String>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let line = std::mem::take(buf);
        let text = String::from_utf8(line).map_err(|e| Error::custom(e.utf8_error()))?;
        Ok(Some(text))
    }
}

impl Encoder<String> for LineCodec {
    fn encode(&mut self, item: String, buf: &mut Vec<u8>) -> Try<()> {
        buf.extend_from_slice(item.as_bytes());
        buf.push(b'\n');
        Ok(())
    }
}

impl Encoder<&str> for LineCodec {
    fn encode(&mut self, item: &str, buf: &mut Vec<u8>) -> Try<()> {
        buf.extend_from_slice(item.as_bytes());
        buf.push(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_complete_line_and_drains_it_from_the_buffer() {
        let mut codec = LineCodec::new();
        let mut buf = b"hello\nworld".to_vec();
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("hello".to_string()));
        assert_eq!(buf, b"world");
    }

    #[test]
    fn strips_trailing_carriage_return() {
        let mut codec = LineCodec::new();
        let mut buf = b"hello\r\n".to_vec();
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("hello".to_string()));
    }

    #[test]
    fn partial_prefix_returns_none_until_delimiter_arrives() {
        let mut codec = LineCodec::new();
        let mut buf = b"hel".to_vec();
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"lo\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("hello".to_string()));
    }

    #[test]
    fn decode_eof_flushes_a_trailing_line_with_no_delimiter() {
        let mut codec = LineCodec::new();
        let mut buf = b"no newline".to_vec();
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some("no newline".to_string())
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn oversized_line_with_no_delimiter_is_an_error() {
        let mut codec = LineCodec::new().with_max_line_len(4);
        let mut buf = b"way too long".to_vec();
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn encode_round_trips_through_decode() {
        let mut codec = LineCodec::new();
        let mut wire = Vec::new();
        codec.encode("round trip".to_string(), &mut wire).unwrap();
        assert_eq!(codec.decode(&mut wire).unwrap(), Some("round trip".to_string()));
    }
}
