//! Split a raw byte stream into `(name, value)` records.
//!
//! Wire layout: each content is `[len: u8][len bytes]`, and contents come
//! in pairs (field name, then field value). Transport reads do not line up
//! with record boundaries, so the decoder buffers until a whole pair is
//! present and keeps any trailing partial bytes for the next push.

use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};

use crate::types::{Record, Result, TramError, MAX_CONTENT_LEN};

/// Bytes requested from the transport per read by `RecordReader`.
pub const DEFAULT_READ_SIZE: usize = 255;

// ---------------------------------------------------------------------------
// Sans-IO decoder
// ---------------------------------------------------------------------------

/// Incremental record decoder. Feed bytes with `push`, drain with `next_record`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder {
            // Two maximal contents plus their length bytes.
            buf: BytesMut::with_capacity(2 * (MAX_CONTENT_LEN + 1)),
        }
    }

    /// Append bytes from a transport read.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete record, or `None` if more bytes are needed.
    pub fn next_record(&mut self) -> Option<Record> {
        let name_len = *self.buf.first()? as usize;
        let value_len_at = 1 + name_len;
        let value_len = *self.buf.get(value_len_at)? as usize;
        if self.buf.len() < value_len_at + 1 + value_len {
            return None;
        }

        self.buf.advance(1);
        let name = self.buf.split_to(name_len).freeze();
        self.buf.advance(1);
        let value = self.buf.split_to(value_len).freeze();
        Some(Record { name, value })
    }

    /// Bytes held back waiting for the rest of a record.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Signal end of stream. Leftover bytes mean the stream was cut mid-record.
    pub fn finish(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(TramError::UnexpectedEndOfStream {
                buffered: self.buf.len(),
            })
        }
    }

    /// Drop any partial record without error (used on cancellation).
    /// Returns how many bytes were thrown away.
    pub fn discard(&mut self) -> usize {
        let n = self.buf.len();
        self.buf.clear();
        n
    }
}

// ---------------------------------------------------------------------------
// Blocking reader
// ---------------------------------------------------------------------------

/// Pull records from any blocking byte source.
pub struct RecordReader<R> {
    inner: R,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
    eof: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_read_size(inner, DEFAULT_READ_SIZE)
    }

    pub fn with_read_size(inner: R, read_size: usize) -> Self {
        RecordReader {
            inner,
            decoder: FrameDecoder::new(),
            chunk: vec![0u8; read_size.max(1)],
            eof: false,
        }
    }

    /// Block until a record is available.
    ///
    /// Returns `Ok(None)` on a clean end of stream, and
    /// `UnexpectedEndOfStream` if the stream closes mid-record.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.decoder.next_record() {
                return Ok(Some(record));
            }
            if self.eof {
                return Ok(None);
            }

            let n = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                self.eof = true;
                self.decoder.finish()?;
                return Ok(None);
            }
            self.decoder.push(&self.chunk[..n]);
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Append one `[len][name][len][value]` pair to `out`.
pub fn encode_record(name: &[u8], value: &[u8], out: &mut Vec<u8>) -> Result<()> {
    for content in [name, value] {
        if content.len() > MAX_CONTENT_LEN {
            return Err(TramError::ContentTooLong(content.len()));
        }
    }
    out.reserve(name.len() + value.len() + 2);
    out.push(name.len() as u8);
    out.extend_from_slice(name);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    fn encode(records: &[(&str, &str)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, value) in records {
            encode_record(name.as_bytes(), value.as_bytes(), &mut out).unwrap();
        }
        out
    }

    fn sample() -> Vec<(&'static str, &'static str)> {
        vec![
            ("MSGTYPE", "LOCATION"),
            ("TRAM_ID", "TRAMABC"),
            ("VALUE", "CITY"),
        ]
    }

    fn read_all(data: &[u8], step: usize) -> Result<Vec<Record>> {
        let mut reader = RecordReader::new(Trickle { data, step });
        let mut out = Vec::new();
        while let Some(record) = reader.next_record()? {
            out.push(record);
        }
        Ok(out)
    }

    #[test]
    fn test_encode_matches_wire_example() {
        let bytes = encode(&sample());
        let mut expected = Vec::new();
        expected.push(7);
        expected.extend_from_slice(b"MSGTYPE");
        expected.push(8);
        expected.extend_from_slice(b"LOCATION");
        expected.push(7);
        expected.extend_from_slice(b"TRAM_ID");
        expected.push(7);
        expected.extend_from_slice(b"TRAMABC");
        expected.push(5);
        expected.extend_from_slice(b"VALUE");
        expected.push(4);
        expected.extend_from_slice(b"CITY");
        assert_eq!(bytes, expected);
        assert_eq!(bytes.len(), 44);
    }

    #[test]
    fn test_decode_whole_buffer() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&encode(&sample()));

        let first = decoder.next_record().unwrap();
        assert_eq!(&first.name[..], b"MSGTYPE");
        assert_eq!(&first.value[..], b"LOCATION");
        assert_eq!(&decoder.next_record().unwrap().value[..], b"TRAMABC");
        assert_eq!(&decoder.next_record().unwrap().value[..], b"CITY");
        assert!(decoder.next_record().is_none());
        assert_eq!(decoder.buffered(), 0);
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_partial_record_is_held() {
        let bytes = encode(&sample());
        let mut decoder = FrameDecoder::new();

        // Name complete, value length byte missing.
        decoder.push(&bytes[..8]);
        assert!(decoder.next_record().is_none());
        assert_eq!(decoder.buffered(), 8);

        // Value length present, payload short by one byte.
        decoder.push(&bytes[8..16]);
        assert!(decoder.next_record().is_none());

        decoder.push(&bytes[16..17]);
        let record = decoder.next_record().unwrap();
        assert_eq!(record, Record::new("MSGTYPE", "LOCATION"));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_chunking_invariance() {
        let expected: Vec<Record> = sample()
            .into_iter()
            .map(|(n, v)| Record::new(n, v))
            .collect();
        let bytes = encode(&sample());

        for step in [1, 2, 3, 5, 7, 16, 51, 255] {
            let records = read_all(&bytes, step).unwrap();
            assert_eq!(records, expected, "step={step}");
        }
    }

    #[test]
    fn test_empty_contents_round_trip() {
        let bytes = encode(&[("", ""), ("NAME", ""), ("", "VAL")]);
        assert_eq!(&bytes[..2], &[0, 0]);

        let records = read_all(&bytes, 1).unwrap();
        assert_eq!(
            records,
            vec![
                Record::new("", ""),
                Record::new("NAME", ""),
                Record::new("", "VAL"),
            ]
        );
    }

    #[test]
    fn test_max_length_content() {
        let long = "x".repeat(255);
        let bytes = encode(&[(long.as_str(), long.as_str())]);
        assert_eq!(bytes.len(), 512);

        let records = read_all(&bytes, 100).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value.len(), 255);
    }

    #[test]
    fn test_encode_rejects_oversized_content() {
        let mut out = Vec::new();
        let long = vec![b'a'; 256];
        let err = encode_record(b"VALUE", &long, &mut out).unwrap_err();
        assert!(matches!(err, TramError::ContentTooLong(256)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_truncated_stream() {
        let mut bytes = encode(&[("MSGTYPE", "LOCATION"), ("TRAM_ID", "TRAMABC")]);
        bytes.truncate(bytes.len() - 1);

        let err = read_all(&bytes, 4).unwrap_err();
        assert!(matches!(
            err,
            TramError::UnexpectedEndOfStream { buffered: 15 }
        ));
    }

    #[test]
    fn test_half_pair_is_truncation() {
        // Field name present, value never arrives.
        let mut bytes = encode(&[("MSGTYPE", "LOCATION")]);
        bytes.push(7);
        bytes.extend_from_slice(b"TRAM_ID");

        let err = read_all(&bytes, 255).unwrap_err();
        assert!(matches!(err, TramError::UnexpectedEndOfStream { .. }));
    }

    #[test]
    fn test_empty_stream_is_clean() {
        assert!(read_all(&[], 1).unwrap().is_empty());
    }

    #[test]
    fn test_discard_drops_partial() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[7, b'M', b'S']);
        assert_eq!(decoder.discard(), 3);
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_transport_error_propagates() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(ErrorKind::ConnectionReset, "reset"))
            }
        }

        let mut reader = RecordReader::new(Broken);
        assert!(matches!(
            reader.next_record(),
            Err(TramError::Transport(_))
        ));
    }
}
