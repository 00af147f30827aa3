//! ICAP (RFC 3507) REQMOD/RESPMOD adaptor (spec.md §4.7).
//!
//! A single-connection, line-oriented text protocol distinct enough from
//! HTTP proper (the `Encapsulated` offset header, raw chunked bodies
//! glued onto a non-HTTP status line) that it is parsed by hand here
//! rather than through `hyper`. See `server` for the accept loop,
//! `reqmod`/`respmod` for the two rewriting pipelines, and
//! `encapsulated`/`chunked`/`message` for the framing primitives they
//! share.

pub mod chunked;
pub mod encapsulated;
pub mod error;
pub mod message;
pub mod options;
pub mod reqmod;
pub mod respmod;
pub mod server;

pub use error::IcapError;
pub use server::{IcapState, serve};

/// Service string advertised in ICAP `OPTIONS` responses (spec.md §6).
pub const SERVICE_STRING: &str = "TokenShield Unified 1.0";
/// `ISTag` advertised in ICAP responses (spec.md §6).
pub const ISTAG: &str = "\"TS-001\"";

/// An outcome of processing one REQMOD/RESPMOD transaction.
#[derive(Debug)]
pub enum IcapResponse {
    /// The body was unmodified, or the rewrite failed; spec.md's
    /// fail-open-to-204 policy for a degraded ICAP rewrite.
    NoContent,
    /// The body was rewritten; carries the fully-rendered preamble and
    /// body to emit under the supplied `Encapsulated` section names.
    Modified {
        /// `(section name, offset)` pairs for the outbound `Encapsulated` header.
        sections: Vec<(&'static str, usize)>,
        /// Rendered HTTP preamble (status/request line + headers + blank line).
        preamble: Vec<u8>,
        /// Rewritten body bytes, not yet chunk-encoded.
        body: Vec<u8>,
    },
}

impl IcapResponse {
    /// Render the full ICAP response (status line, headers, and any
    /// encapsulated body) ready to write to the connection.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::NoContent => format!("ICAP/1.0 204 No Content\r\nISTag: {ISTAG}\r\n\r\n").into_bytes(),
            Self::Modified { sections, preamble, body } => {
                let encapsulated = encapsulated::render(sections);
                let mut out = format!(
                    "ICAP/1.0 200 OK\r\nISTag: {ISTAG}\r\nEncapsulated: {encapsulated}\r\n\r\n"
                )
                .into_bytes();
                out.extend_from_slice(preamble);
                out.extend_from_slice(&chunked::write_chunked(body));
                out
            }
        }
    }
}
