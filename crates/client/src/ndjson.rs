//! Incremental decoder for newline-delimited JSON bodies.
//!
//! Bytes arrive in chunks with arbitrary boundaries. A chunk may end in the
//! middle of a line or in the middle of a multi-byte character, so both the
//! undecoded tail bytes and the unterminated line are carried to the next
//! chunk. Lines that are blank are skipped; lines that do not decode are
//! dropped with a warning and the sequence continues.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::pin::Pin;

use futures::{Stream, StreamExt, stream};
use serde::de::DeserializeOwned;

/// Push-based line decoder. One instance serves exactly one byte source.
pub struct NdjsonDecoder<T> {
    buffer: String,
    partial_char: Vec<u8>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Default for NdjsonDecoder<T> {
    fn default() -> Self {
        Self {
            buffer: String::new(),
            partial_char: Vec::new(),
            _record: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> NdjsonDecoder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every record completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<T> {
        self.decode_utf8(chunk);

        let mut records = Vec::new();
        while let Some(index) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=index).collect();
            if let Some(record) = parse_line(&line) {
                records.push(record);
            }
        }
        records
    }

    /// Flushes the residual buffer once the byte source is exhausted.
    pub fn finish(mut self) -> Option<T> {
        if !self.partial_char.is_empty() {
            let tail = std::mem::take(&mut self.partial_char);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        parse_line(&self.buffer)
    }

    /// Bytes held back because they end in an incomplete character.
    pub fn pending_bytes(&self) -> usize {
        self.partial_char.len()
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        self.partial_char.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.partial_char) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.partial_char.clear();
                    return;
                }
                Err(error) => {
                    let valid_up_to = error.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.partial_char[..valid_up_to]) {
                        self.buffer.push_str(valid);
                    }

                    match error.error_len() {
                        // Truncated character at the end of the chunk; wait for more bytes.
                        None => {
                            self.partial_char.drain(..valid_up_to);
                            return;
                        }
                        Some(invalid_len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.partial_char.drain(..valid_up_to + invalid_len);
                        }
                    }
                }
            }
        }
    }
}

fn parse_line<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let line = raw.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(line) {
        Ok(record) => Some(record),
        Err(error) => {
            tracing::warn!(line = %line, error = %error, "dropping undecodable stream line");
            None
        }
    }
}

struct DecodeState<S, T> {
    source: Pin<Box<S>>,
    decoder: Option<NdjsonDecoder<T>>,
    ready: VecDeque<T>,
}

/// Adapts a chunked byte source into a lazy stream of decoded records.
///
/// Errors from the byte source are passed through as `Err` items and end the
/// stream; anything still buffered at that point is discarded.
pub fn decode_records<T, S, B, E>(byte_stream: S) -> impl Stream<Item = Result<T, E>>
where
    T: DeserializeOwned,
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let state = DecodeState {
        source: Box::pin(byte_stream),
        decoder: Some(NdjsonDecoder::new()),
        ready: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.ready.pop_front() {
                return Some((Ok(record), state));
            }

            if state.decoder.is_none() {
                return None;
            }

            match state.source.next().await {
                Some(Ok(chunk)) => {
                    if let Some(decoder) = state.decoder.as_mut() {
                        state.ready.extend(decoder.push(chunk.as_ref()));
                    }
                }
                Some(Err(error)) => {
                    state.decoder = None;
                    return Some((Err(error), state));
                }
                None => {
                    if let Some(decoder) = state.decoder.take() {
                        state.ready.extend(decoder.finish());
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordKind, StreamRecord};
    use serde_json::{Value, json};

    const BODY: &str = concat!(
        "{\"type\":\"text\",\"content\":\"Grüße \",\"timestamp\":\"t1\"}\n",
        "   \n",
        "{\"type\":\"text\",\"content\":\"日本語 🦀\",\"timestamp\":\"t2\"}\r\n",
        "{\"type\":\"done\",\"content\":\"\",\"timestamp\":\"t3\"}"
    );

    fn decode_chunks(chunks: &[&[u8]]) -> Vec<StreamRecord> {
        let mut decoder = NdjsonDecoder::new();
        let mut records = Vec::new();
        for chunk in chunks {
            records.extend(decoder.push(chunk));
        }
        records.extend(decoder.finish());
        records
    }

    #[test]
    fn decodes_whole_body_in_one_chunk() {
        let records = decode_chunks(&[BODY.as_bytes()]);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].content, "Grüße ");
        assert_eq!(records[1].content, "日本語 🦀");
        assert_eq!(records[2].kind, RecordKind::Done);
    }

    #[test]
    fn every_two_way_split_yields_identical_records() {
        let bytes = BODY.as_bytes();
        let expected = decode_chunks(&[bytes]);

        for split in 0..=bytes.len() {
            let (head, tail) = bytes.split_at(split);
            assert_eq!(decode_chunks(&[head, tail]), expected, "split at byte {split}");
        }
    }

    #[test]
    fn byte_at_a_time_yields_identical_records() {
        let bytes = BODY.as_bytes();
        let expected = decode_chunks(&[bytes]);
        let single_bytes = bytes.chunks(1).collect::<Vec<_>>();

        assert_eq!(decode_chunks(&single_bytes), expected);
    }

    #[test]
    fn split_inside_multibyte_character_is_carried_over() {
        let line = "{\"type\":\"text\",\"content\":\"🦀\"}\n".as_bytes();
        let crab_start = line
            .iter()
            .position(|byte| *byte == 0xF0)
            .expect("crab emoji start byte");

        let mut decoder = NdjsonDecoder::<StreamRecord>::new();
        assert!(decoder.push(&line[..crab_start + 2]).is_empty());
        assert_eq!(decoder.pending_bytes(), 2);

        let records = decoder.push(&line[crab_start + 2..]);
        assert_eq!(decoder.pending_bytes(), 0);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "🦀");
    }

    #[test]
    fn malformed_line_is_dropped_without_halting() {
        let body: &[u8] = b"{\"type\":\"text\",\"content\":\"a\"}\n{not json}\n\t \n{\"type\":\"text\",\"content\":\"b\"}\n";
        let records = decode_chunks(&[body]);

        let contents = records
            .iter()
            .map(|record| record.content.as_str())
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["a", "b"]);
    }

    #[test]
    fn whitespace_residual_yields_nothing() {
        let mut decoder = NdjsonDecoder::<Value>::new();
        assert_eq!(decoder.push(b"{\"a\":1}\n  ").len(), 1);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn malformed_residual_is_dropped_on_finish() {
        let mut decoder = NdjsonDecoder::<StreamRecord>::new();
        let records = decoder.push(b"{\"type\":\"text\",\"content\":\"ok\"}\n{\"type\":\"text\",\"cont");

        assert_eq!(records.len(), 1);
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn stream_adapter_drops_truncated_tail() {
        let chunks: Vec<Result<&'static [u8], std::io::Error>> = vec![
            Ok(&b"{\"n\":1}\n"[..]),
            Ok(&b"{\"n\":2"[..]),
        ];

        let values = decode_records::<Value, _, _, _>(stream::iter(chunks))
            .map(|item| item.expect("no transport error"))
            .collect::<Vec<_>>()
            .await;

        assert_eq!(values, vec![json!({"n": 1})]);
    }

    #[test]
    fn invalid_utf8_is_replaced_and_decoding_continues() {
        let mut body = b"{\"type\":\"text\",\"content\":\"x".to_vec();
        body.push(0xFF);
        body.extend_from_slice(b"y\"}\n");

        let records = decode_chunks(&[body.as_slice()]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "x\u{FFFD}y");
    }

    #[tokio::test]
    async fn stream_adapter_flushes_residual_on_exhaustion() {
        let chunks: Vec<Result<&'static [u8], std::io::Error>> = vec![
            Ok(&b"{\"n\":1}\n{\"n\""[..]),
            Ok(&b":2}\n{\"n\":3}"[..]),
        ];

        let values = decode_records::<Value, _, _, _>(stream::iter(chunks))
            .map(|item| item.expect("no transport error"))
            .collect::<Vec<_>>()
            .await;

        assert_eq!(values, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
    }

    #[tokio::test]
    async fn stream_adapter_ends_after_source_error() {
        let chunks: Vec<Result<&'static [u8], std::io::Error>> = vec![
            Ok(&b"{\"n\":1}\n{\"n\":"[..]),
            Err(std::io::Error::other("connection reset")),
            Ok(&b"{\"n\":9}\n"[..]),
        ];

        let items = decode_records::<Value, _, _, _>(stream::iter(chunks))
            .collect::<Vec<_>>()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().ok(), Some(&json!({"n": 1})));
        assert!(items[1].is_err());
    }
}
