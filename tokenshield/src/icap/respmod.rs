//! RESPMOD pipeline: substitute tokens for PANs in a response bound for
//! the downstream application (spec.md §4.7).

use tokio::io::AsyncRead;
use tracing::warn;

use super::chunked::read_chunked;
use super::encapsulated::{self, Sections};
use super::message::{read_exact_section, Preamble};
use super::{IcapError, IcapResponse};
use crate::config::TokenFormat;
use crate::rewriter;
use crate::token_engine::TokenEngine;

/// Run the RESPMOD pipeline. `sections` may name `req-hdr` (the request
/// context, read and discarded per spec.md §4.7), followed by `res-hdr`
/// and either `res-body` or `null-body`.
///
/// # Errors
///
/// Returns [`IcapError::Framing`] if the sections are malformed or
/// `res-hdr` is absent — both cases abort the connection rather than
/// degrade to 204, per spec.md §9's truncation guidance.
pub async fn handle<R: AsyncRead + Unpin>(
    sections: &Sections,
    reader: &mut R,
    engine: &TokenEngine,
    token_format: TokenFormat,
) -> Result<IcapResponse, IcapError> {
    let mut res_hdr_raw: Option<Vec<u8>> = None;

    for (idx, (name, _)) in sections.iter().enumerate() {
        if name.ends_with("-body") {
            break; // the final entry is always a body placeholder/marker
        }
        let len = sections
            .get(idx + 1)
            .map(|(_, next_offset)| next_offset - sections[idx].1)
            .ok_or_else(|| IcapError::Framing(format!("{name} section has no following offset")))?;
        let raw = read_exact_section(reader, len).await?;
        if name == "res-hdr" {
            res_hdr_raw = Some(raw);
        }
        // req-hdr (if present) is read and discarded per spec.md §4.7.
    }

    let res_hdr_raw = res_hdr_raw.ok_or_else(|| IcapError::Framing("RESPMOD frame has no res-hdr section".to_string()))?;
    let mut preamble = Preamble::parse(&res_hdr_raw)?;

    let body = if encapsulated::has_body(sections, "res-body") {
        read_chunked(reader).await?
    } else {
        Vec::new()
    };

    if body.is_empty() {
        return Ok(IcapResponse::NoContent);
    }

    let is_json = preamble
        .header("Content-Type")
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"));
    if !is_json {
        return Ok(IcapResponse::NoContent);
    }

    let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return Ok(IcapResponse::NoContent);
    };

    match rewriter::tokenize_walk(&mut value, engine, token_format, None).await {
        Ok(true) => {}
        Ok(false) => return Ok(IcapResponse::NoContent),
        Err(e) => {
            warn!(error = %e, "RESPMOD rewrite failed, degrading to 204");
            return Ok(IcapResponse::NoContent);
        }
    }

    let Ok(rewritten) = serde_json::to_vec(&value) else {
        return Ok(IcapResponse::NoContent);
    };

    preamble.set_content_length(rewritten.len());
    let preamble_bytes = preamble.render();

    Ok(IcapResponse::Modified {
        sections: vec![("res-hdr", 0), ("res-body", preamble_bytes.len())],
        preamble: preamble_bytes,
        body: rewritten,
    })
}
