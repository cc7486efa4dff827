//! Event Stream Decoder
//!
//! Bedrockのストリーミング応答（`application/vnd.amazon.eventstream`）の
//! バイナリフレームを読み出すモジュール。
//!
//! # フレーム構造
//!
//! ```text
//! +----------------+----------------+----------------+
//! | total length   | headers length | prelude CRC32  |   12 bytes (big endian)
//! +----------------+----------------+----------------+
//! | headers ...                                      |
//! | payload ...                                      |
//! +----------------+
//! | message CRC32  |   直前までの全バイトに対するCRC
//! +----------------+
//! ```

use std::io::{ErrorKind, Read};

use crate::error::XlsxVisionError;

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
/// 1メッセージの最大長（16MiB）
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// ヘッダー値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Vec<u8>),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

/// デコード済みのメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Vec<u8>,
}

impl Message {
    /// 文字列型ヘッダーの値
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(key, value)| match value {
            HeaderValue::String(s) if key == name => Some(s.as_str()),
            _ => None,
        })
    }
}

fn crc32(data: &[u8]) -> u32 {
    crc_fast::checksum(crc_fast::CrcAlgorithm::Crc32IsoHdlc, data) as u32
}

fn stream_error(message: impl Into<String>) -> XlsxVisionError {
    XlsxVisionError::EventStream(message.into())
}

/// ストリームからメッセージを順に読み出すリーダー
pub struct EventStreamReader<R> {
    inner: R,
}

impl<R: Read> EventStreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// 次のメッセージを読み出す
    ///
    /// メッセージ境界でストリームが終わった場合は`Ok(None)`を返します。
    pub fn next_message(&mut self) -> Result<Option<Message>, XlsxVisionError> {
        let mut prelude = [0u8; PRELUDE_LEN];
        if !self.read_prelude(&mut prelude)? {
            return Ok(None);
        }

        let total_len = u32::from_be_bytes([prelude[0], prelude[1], prelude[2], prelude[3]]) as usize;
        let headers_len = u32::from_be_bytes([prelude[4], prelude[5], prelude[6], prelude[7]]) as usize;
        let prelude_crc = u32::from_be_bytes([prelude[8], prelude[9], prelude[10], prelude[11]]);

        if crc32(&prelude[..8]) != prelude_crc {
            return Err(stream_error("prelude checksum mismatch"));
        }
        if total_len < PRELUDE_LEN + CRC_LEN || total_len > MAX_MESSAGE_LEN {
            return Err(stream_error(format!("invalid message length: {}", total_len)));
        }
        let body_len = total_len - PRELUDE_LEN - CRC_LEN;
        if headers_len > body_len {
            return Err(stream_error(format!(
                "headers length {} exceeds message body {}",
                headers_len, body_len
            )));
        }

        let mut rest = vec![0u8; total_len - PRELUDE_LEN];
        self.inner.read_exact(&mut rest).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => stream_error("stream ended inside a message"),
            _ => XlsxVisionError::Io(e),
        })?;

        let (body, crc_bytes) = rest.split_at(body_len);
        let message_crc = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let mut framed = Vec::with_capacity(PRELUDE_LEN + body_len);
        framed.extend_from_slice(&prelude);
        framed.extend_from_slice(body);
        if crc32(&framed) != message_crc {
            return Err(stream_error("message checksum mismatch"));
        }

        let (header_bytes, payload) = body.split_at(headers_len);
        Ok(Some(Message {
            headers: decode_headers(header_bytes)?,
            payload: payload.to_vec(),
        }))
    }

    /// プレリュードを読む（先頭で即EOFなら`false`）
    fn read_prelude(&mut self, prelude: &mut [u8; PRELUDE_LEN]) -> Result<bool, XlsxVisionError> {
        let mut filled = 0;
        while filled < PRELUDE_LEN {
            match self.inner.read(&mut prelude[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(stream_error("stream ended inside a prelude")),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(XlsxVisionError::Io(e)),
            }
        }
        Ok(true)
    }
}

/// ヘッダー領域を順に読むためのカーソル
struct HeaderCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> HeaderCursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], XlsxVisionError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| stream_error("truncated header"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], XlsxVisionError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn is_done(&self) -> bool {
        self.pos >= self.data.len()
    }
}

fn decode_headers(data: &[u8]) -> Result<Vec<(String, HeaderValue)>, XlsxVisionError> {
    let mut cursor = HeaderCursor { data, pos: 0 };
    let mut headers = Vec::new();

    while !cursor.is_done() {
        let name_len = cursor.array::<1>()?[0] as usize;
        let name = std::str::from_utf8(cursor.take(name_len)?)?.to_string();
        let value = match cursor.array::<1>()?[0] {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => HeaderValue::Byte(i8::from_be_bytes(cursor.array()?)),
            3 => HeaderValue::Short(i16::from_be_bytes(cursor.array()?)),
            4 => HeaderValue::Int(i32::from_be_bytes(cursor.array()?)),
            5 => HeaderValue::Long(i64::from_be_bytes(cursor.array()?)),
            6 => {
                let len = u16::from_be_bytes(cursor.array()?) as usize;
                HeaderValue::Bytes(cursor.take(len)?.to_vec())
            }
            7 => {
                let len = u16::from_be_bytes(cursor.array()?) as usize;
                HeaderValue::String(std::str::from_utf8(cursor.take(len)?)?.to_string())
            }
            8 => HeaderValue::Timestamp(i64::from_be_bytes(cursor.array()?)),
            9 => HeaderValue::Uuid(cursor.array()?),
            other => {
                return Err(stream_error(format!(
                    "unknown header type {} for '{}'",
                    other, name
                )))
            }
        };
        headers.push((name, value));
    }

    Ok(headers)
}

/// 文字列ヘッダーのみを持つメッセージをエンコード（テスト用）
#[cfg(test)]
pub(crate) fn encode_message(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(7);
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }

    let total_len = PRELUDE_LEN + header_bytes.len() + payload.len() + CRC_LEN;
    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&(total_len as u32).to_be_bytes());
    out.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    let prelude_crc = crc32(&out);
    out.extend_from_slice(&prelude_crc.to_be_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(payload);
    let message_crc = crc32(&out);
    out.extend_from_slice(&message_crc.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_crc32_check_value() {
        // CRC-32/ISO-HDLCのチェック値
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_round_trip_messages() {
        let mut stream = encode_message(&[(":event-type", "chunk"), (":message-type", "event")], b"{\"a\":1}");
        stream.extend(encode_message(&[], b""));

        let mut reader = EventStreamReader::new(Cursor::new(stream));
        let first = reader.next_message().unwrap().unwrap();
        assert_eq!(first.header_str(":event-type"), Some("chunk"));
        assert_eq!(first.header_str(":message-type"), Some("event"));
        assert_eq!(first.header_str(":missing"), None);
        assert_eq!(first.payload, b"{\"a\":1}");

        let second = reader.next_message().unwrap().unwrap();
        assert!(second.headers.is_empty());
        assert!(second.payload.is_empty());

        assert!(reader.next_message().unwrap().is_none());
    }

    #[test]
    fn test_corrupted_payload_is_rejected() {
        let mut frame = encode_message(&[(":event-type", "chunk")], b"payload");
        let last_payload_byte = frame.len() - CRC_LEN - 1;
        frame[last_payload_byte] ^= 0xFF;

        let mut reader = EventStreamReader::new(Cursor::new(frame));
        match reader.next_message() {
            Err(XlsxVisionError::EventStream(msg)) => assert!(msg.contains("message checksum")),
            other => panic!("Expected checksum error, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupted_prelude_is_rejected() {
        let mut frame = encode_message(&[], b"x");
        frame[3] ^= 0x01;
        let mut reader = EventStreamReader::new(Cursor::new(frame));
        assert!(matches!(
            reader.next_message(),
            Err(XlsxVisionError::EventStream(_))
        ));
    }

    #[test]
    fn test_truncated_stream() {
        let frame = encode_message(&[(":event-type", "chunk")], b"payload");
        let mut reader = EventStreamReader::new(Cursor::new(frame[..frame.len() - 2].to_vec()));
        assert!(matches!(
            reader.next_message(),
            Err(XlsxVisionError::EventStream(_))
        ));

        let mut reader = EventStreamReader::new(Cursor::new(frame[..5].to_vec()));
        assert!(matches!(
            reader.next_message(),
            Err(XlsxVisionError::EventStream(_))
        ));
    }

    #[test]
    fn test_decode_typed_headers() {
        let mut data = Vec::new();
        data.push(4);
        data.extend_from_slice(b"flag");
        data.push(0);
        data.push(5);
        data.extend_from_slice(b"count");
        data.push(4);
        data.extend_from_slice(&42i32.to_be_bytes());

        let headers = decode_headers(&data).unwrap();
        assert_eq!(headers[0], ("flag".to_string(), HeaderValue::Bool(true)));
        assert_eq!(headers[1], ("count".to_string(), HeaderValue::Int(42)));

        assert!(decode_headers(&[3, b'a', b'b', b'c', 42]).is_err());
        assert!(decode_headers(&[3, b'a', b'b', b'c', 4, 0]).is_err());
    }
}
