//! Minimal embedded-HTTP preamble parsing and serialization (spec.md §4.7).
//!
//! The HTTP request/response line and headers carried inside an ICAP
//! encapsulated section are plain text, already delimited by the
//! `Encapsulated` offsets. This is a hand-rolled line parser, not `hyper`
//! — `hyper` models a full connection and has no entry point for "parse
//! this header block I already have in memory."

use tokio::io::{AsyncRead, AsyncReadExt};

use super::chunked::read_line;
use super::error::IcapError;

/// Read lines from `reader` up to and including the terminating blank
/// line, returning the raw bytes (each line plus its CRLF, including the
/// final blank one) for handing to [`Preamble::parse`].
///
/// Used for both the ICAP header block itself and any embedded HTTP
/// header section whose length is not already known from `Encapsulated`
/// offsets.
///
/// # Errors
///
/// Returns [`IcapError::Framing`] on EOF before a blank line is seen.
pub async fn read_header_block<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, IcapError> {
    let mut raw = Vec::new();
    loop {
        let line = read_line(reader).await?;
        let is_blank = line.is_empty();
        raw.extend_from_slice(line.as_bytes());
        raw.extend_from_slice(b"\r\n");
        if is_blank {
            return Ok(raw);
        }
    }
}

/// Read exactly `len` raw bytes of an already-length-known header
/// section (per `Encapsulated` offsets).
///
/// # Errors
///
/// Returns [`IcapError::Io`] if the underlying read fails.
pub async fn read_exact_section<R: AsyncRead + Unpin>(reader: &mut R, len: usize) -> Result<Vec<u8>, IcapError> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(|e| IcapError::Io(e.to_string()))?;
    Ok(buf)
}

/// A parsed HTTP request or response preamble: the start line plus
/// ordered headers (duplicates preserved, as a real HTTP message may
/// repeat a header name).
#[derive(Debug, Clone)]
pub struct Preamble {
    /// The request line (`"GET /path HTTP/1.1"`) or status line
    /// (`"HTTP/1.1 200 OK"`), without the trailing CRLF.
    pub start_line: String,
    /// Header lines in original order as `(name, value)`.
    pub headers: Vec<(String, String)>,
}

impl Preamble {
    /// Parse a raw header-section byte slice (start line, header lines,
    /// terminating blank line) into a [`Preamble`].
    ///
    /// # Errors
    ///
    /// Returns [`IcapError::Framing`] if the bytes are not valid UTF-8 or
    /// the block has no start line.
    pub fn parse(raw: &[u8]) -> Result<Self, IcapError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| IcapError::Framing(format!("non-UTF8 HTTP preamble: {e}")))?;
        let mut lines = text.split("\r\n");

        let start_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| IcapError::Framing("missing HTTP start line".to_string()))?
            .to_string();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| IcapError::Framing(format!("malformed header line: {line:?}")))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Self { start_line, headers })
    }

    /// Path component of a request start line (`"GET /path HTTP/1.1"` →
    /// `"/path"`); `None` for a status line or a malformed request line.
    #[must_use]
    pub fn request_path(&self) -> Option<&str> {
        self.start_line.split_whitespace().nth(1)
    }

    /// Method/verb token, whichever protocol's start line this is
    /// (`"REQMOD"`, `"GET"`, ...). `None` for an empty start line.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.start_line.split_whitespace().next()
    }

    /// Second token of the start line (the request URI for both HTTP
    /// request lines and ICAP request lines).
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.start_line.split_whitespace().nth(1)
    }

    /// Status code of a response start line (`"HTTP/1.1 200 OK"` → `200`).
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.start_line.split_whitespace().nth(1)?.parse().ok()
    }

    /// First header value matching `name`, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace (or insert) the `Content-Length` header with `len`.
    pub fn set_content_length(&mut self, len: usize) {
        if let Some(entry) = self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case("Content-Length")) {
            entry.1 = len.to_string();
        } else {
            self.headers.push(("Content-Length".to_string(), len.to_string()));
        }
    }

    /// Serialize back to `start_line\r\nheader: value\r\n...\r\n\r\n`.
    #[must_use]
    pub fn render(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&self.start_line);
        out.push_str("\r\n");
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.into_bytes()
    }
}
