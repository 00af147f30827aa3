//! REQMOD pipeline: reinstate real PANs in a request bound for the
//! payment gateway (spec.md §4.7).

use tokio::io::AsyncRead;
use tracing::warn;

use super::chunked::read_chunked;
use super::encapsulated::{self, Sections};
use super::message::{read_exact_section, Preamble};
use super::{IcapError, IcapResponse};
use crate::config::TokenFormat;
use crate::rewriter;
use crate::token_engine::TokenEngine;

/// Run the REQMOD pipeline: read the embedded HTTP request (and its
/// chunked body, if present) described by `sections`, apply the JSON
/// detokenize walk, and return either [`IcapResponse::NoContent`] (no
/// change, or a rewrite failure — fail-open per spec.md §4.7) or
/// [`IcapResponse::Modified`].
///
/// # Errors
///
/// Returns [`IcapError::Framing`] if the `Encapsulated` sections cannot
/// be read from `reader` (malformed framing aborts the connection rather
/// than degrading to 204, per spec.md §4.7/§9).
pub async fn handle<R: AsyncRead + Unpin>(
    sections: &Sections,
    reader: &mut R,
    engine: &TokenEngine,
    token_format: TokenFormat,
) -> Result<IcapResponse, IcapError> {
    let req_hdr_len = encapsulated::section_len(sections, "req-hdr")
        .ok_or_else(|| IcapError::Framing("REQMOD frame has no req-hdr section".to_string()))?;
    let req_hdr_raw = read_exact_section(reader, req_hdr_len).await?;
    let mut preamble = Preamble::parse(&req_hdr_raw)?;

    let body = if encapsulated::has_body(sections, "req-body") {
        read_chunked(reader).await?
    } else {
        Vec::new()
    };

    if body.is_empty() {
        return Ok(IcapResponse::NoContent);
    }

    let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return Ok(IcapResponse::NoContent);
    };

    match rewriter::detokenize_walk(&mut value, engine, token_format, None).await {
        Ok(true) => {}
        Ok(false) => return Ok(IcapResponse::NoContent),
        Err(e) => {
            warn!(error = %e, "REQMOD rewrite failed, degrading to 204");
            return Ok(IcapResponse::NoContent);
        }
    }

    let Ok(rewritten) = serde_json::to_vec(&value) else {
        return Ok(IcapResponse::NoContent);
    };

    preamble.set_content_length(rewritten.len());
    let preamble_bytes = preamble.render();

    Ok(IcapResponse::Modified {
        sections: vec![("req-hdr", 0), ("req-body", preamble_bytes.len())],
        preamble: preamble_bytes,
        body: rewritten,
    })
}
