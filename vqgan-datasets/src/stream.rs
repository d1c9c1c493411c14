//! Length prefixed stream of [`TextData`] records: `[u32 little endian length][message]`.
use std::io::{ErrorKind, Read, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use prost::Message;

use crate::protos::TextData;
use crate::{Error, Result};

/// Encodes one record with its length prefix.
pub fn pack_pb_stream(record: &TextData) -> Vec<u8> {
    let len = record.encoded_len();
    let mut buf = Vec::with_capacity(4 + len);
    let mut header = [0u8; 4];
    LittleEndian::write_u32(&mut header, len as u32);
    buf.extend_from_slice(&header);
    // Writing into a Vec cannot run out of capacity.
    let _ = record.encode(&mut buf);
    buf
}

pub fn write_pb_stream<W: Write>(writer: &mut W, record: &TextData) -> Result<()> {
    let body = record.encode_to_vec();
    writer.write_u32::<LittleEndian>(body.len() as u32)?;
    writer.write_all(&body)?;
    Ok(())
}

/// Fills `buf`, returning how many bytes were read before the end of the stream.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(read)
}

/// Iterator over the records of a stream. Stops at a clean end of stream, a partial header or
/// body is reported as [`Error::TruncatedRecord`].
pub struct PbStream<R> {
    reader: R,
    done: bool,
}

impl<R: Read> PbStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    fn next_record(&mut self) -> Result<Option<TextData>> {
        let mut header = [0u8; 4];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(None),
            4 => {}
            got => return Err(Error::TruncatedRecord { expected: 4, got }),
        }
        let len = LittleEndian::read_u32(&header) as usize;
        let mut body = vec![0u8; len];
        let got = read_full(&mut self.reader, &mut body)?;
        if got != len {
            return Err(Error::TruncatedRecord { expected: len, got });
        }
        Ok(Some(TextData::decode(body.as_slice())?))
    }
}

impl<R: Read> Iterator for PbStream<R> {
    type Item = Result<TextData>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

pub fn read_pb_stream<R: Read>(reader: R) -> Result<Vec<TextData>> {
    let mut records = vec![];
    for (idx, record) in PbStream::new(reader).enumerate() {
        records.push(record?);
        if (idx + 1) % 10000 == 0 {
            tracing::info!("loaded {} groups", idx + 1);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protos::{Semantics, Sentence};

    fn record(name: &str) -> TextData {
        TextData {
            source: "src".to_string(),
            name: name.to_string(),
            languages: vec!["EN".to_string()],
            sentences: vec![Sentence {
                text: "hi".to_string(),
                phones: vec!["h".to_string(), "i".to_string()],
                semantics: vec![Semantics {
                    values: vec![1, 2, 3],
                }],
            }],
        }
    }

    #[test]
    fn header_is_little_endian_length() {
        let r = record("a");
        let bytes = pack_pb_stream(&r);
        assert_eq!(
            LittleEndian::read_u32(&bytes[..4]) as usize,
            bytes.len() - 4
        );
        let mut written = vec![];
        write_pb_stream(&mut written, &r).unwrap();
        assert_eq!(written, bytes);
    }

    #[test]
    fn reads_until_clean_eof() -> Result<()> {
        let mut bytes = pack_pb_stream(&record("a"));
        bytes.extend(pack_pb_stream(&record("b")));
        let records = read_pb_stream(bytes.as_slice())?;
        assert_eq!(records, [record("a"), record("b")]);
        assert!(read_pb_stream(&[][..])?.is_empty());
        Ok(())
    }

    #[test]
    fn truncation_is_an_error() {
        let bytes = pack_pb_stream(&record("a"));
        for cut in [2, bytes.len() - 1] {
            let err = read_pb_stream(&bytes[..cut]).unwrap_err();
            assert!(matches!(err, Error::TruncatedRecord { .. }), "{err}");
        }
    }
}
