//! HTTP chunked transfer-encoding codec for ICAP bodies (spec.md §4.7).
//!
//! ICAP glues chunked-encoded HTTP bodies directly onto the encapsulated
//! message stream, so the core needs its own minimal codec rather than
//! relying on `hyper`'s body type (which expects a full HTTP connection,
//! not a raw offset-addressed blob).

use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::IcapError;

/// Read a chunked-encoded body from `reader` until the zero-length
/// terminating chunk, returning the concatenated, de-chunked bytes.
///
/// # Errors
///
/// Returns [`IcapError::Framing`] if a chunk-size line is not valid hex or
/// a chunk's trailing CRLF is missing, or [`IcapError::Io`] if the
/// underlying read fails.
pub async fn read_chunked<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, IcapError> {
    let mut body = Vec::new();
    loop {
        let size_line = read_line(reader).await?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|e| IcapError::Framing(format!("invalid chunk size {size_str:?}: {e}")))?;

        if size == 0 {
            // Trailing headers (if any) end with a blank line; we accept
            // none and just consume the terminating CRLF.
            read_line(reader).await?;
            return Ok(body);
        }

        let mut chunk = vec![0u8; size];
        reader
            .read_exact(&mut chunk)
            .await
            .map_err(|e| IcapError::Io(e.to_string()))?;
        body.extend_from_slice(&chunk);

        let trailer = read_line(reader).await?;
        if !trailer.is_empty() {
            return Err(IcapError::Framing("missing CRLF after chunk data".to_string()));
        }
    }
}

/// Encode `body` as a single chunk followed by the zero-length terminator.
/// An empty `body` still produces a valid (zero-chunk-only) encoding.
#[must_use]
pub fn write_chunked(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 32);
    if !body.is_empty() {
        out.extend_from_slice(format!("{:x}\r\n", body.len()).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

/// Read one CRLF-terminated line (without the terminator) from `reader`.
pub(super) async fn read_line<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, IcapError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await.map_err(|e| IcapError::Io(e.to_string()))?;
        if n == 0 {
            return Err(IcapError::Framing("unexpected EOF while reading line".to_string()));
        }
        if byte[0] == b'\n' {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            break;
        }
        line.push(byte[0]);
    }
    String::from_utf8(line).map_err(|e| IcapError::Framing(format!("non-UTF8 line: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_round_trip() {
        let body = b"hello world";
        let encoded = write_chunked(body);
        let mut cursor = Cursor::new(encoded);
        let decoded = read_chunked(&mut cursor).await.unwrap();
        assert_eq!(decoded, body);
    }

    #[tokio::test]
    async fn test_empty_body_round_trip() {
        let encoded = write_chunked(b"");
        let mut cursor = Cursor::new(encoded);
        let decoded = read_chunked(&mut cursor).await.unwrap();
        assert!(decoded.is_empty());
    }

    #[tokio::test]
    async fn test_multi_chunk_decode() {
        let raw = b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n".to_vec();
        let mut cursor = Cursor::new(raw);
        let decoded = read_chunked(&mut cursor).await.unwrap();
        assert_eq!(decoded, b"Wikipedia");
    }

    #[tokio::test]
    async fn test_invalid_chunk_size_is_framing_error() {
        let raw = b"zz\r\n".to_vec();
        let mut cursor = Cursor::new(raw);
        let err = read_chunked(&mut cursor).await.unwrap_err();
        assert!(matches!(err, IcapError::Framing(_)));
    }
}
