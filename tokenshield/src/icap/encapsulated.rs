//! `Encapsulated` header parsing (spec.md §4.7).
//!
//! RFC 3507's `Encapsulated` header names the byte offsets, within the
//! encapsulated-message stream that follows the ICAP header block, at
//! which each named section (`req-hdr`, `req-body`, `res-hdr`, `res-body`,
//! `null-body`) begins. Offsets are ascending and contiguous, so the
//! difference between consecutive offsets gives each header section's
//! exact byte length.

use super::error::IcapError;

/// One `(section name, byte offset)` pair from an `Encapsulated` header,
/// in the order they appeared.
pub type Sections = Vec<(String, usize)>;

/// Parse an `Encapsulated` header value, e.g. `"req-hdr=0, req-body=145"`.
///
/// # Errors
///
/// Returns [`IcapError::Framing`] if the value is empty, a pair is
/// malformed, or the offsets are not strictly ascending (a truncated or
/// corrupt frame per spec.md §9's steer to abort rather than guess).
pub fn parse(value: &str) -> Result<Sections, IcapError> {
    let mut sections = Sections::new();
    for part in value.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, offset) = part
            .split_once('=')
            .ok_or_else(|| IcapError::Framing(format!("malformed Encapsulated pair: {part:?}")))?;
        let offset: usize = offset
            .trim()
            .parse()
            .map_err(|e| IcapError::Framing(format!("non-numeric Encapsulated offset: {e}")))?;
        sections.push((name.trim().to_string(), offset));
    }

    if sections.is_empty() {
        return Err(IcapError::Framing("empty Encapsulated header".to_string()));
    }
    if sections.windows(2).any(|w| w[1].1 < w[0].1) {
        return Err(IcapError::Framing("Encapsulated offsets are not ascending".to_string()));
    }
    Ok(sections)
}

/// Byte length of the section named `name`, given its position relative
/// to the next section (or `None` if `name` is the last section, whose
/// length is determined by the body codec rather than an offset diff).
#[must_use]
pub fn section_len(sections: &Sections, name: &str) -> Option<usize> {
    let idx = sections.iter().position(|(n, _)| n == name)?;
    let (_, start) = sections[idx];
    sections.get(idx + 1).map(|(_, end)| end - start)
}

/// True if `sections` names a body section (`req-body` or `res-body`) as
/// opposed to only a `null-body` placeholder.
#[must_use]
pub fn has_body(sections: &Sections, body_name: &str) -> bool {
    sections.iter().any(|(n, _)| n == body_name)
}

/// Render an `Encapsulated` header value for an outbound response.
#[must_use]
pub fn render(sections: &[(&str, usize)]) -> String {
    sections
        .iter()
        .map(|(name, offset)| format!("{name}={offset}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_req_hdr_and_body() {
        let sections = parse("req-hdr=0, req-body=145").unwrap();
        assert_eq!(sections, vec![("req-hdr".to_string(), 0), ("req-body".to_string(), 145)]);
        assert_eq!(section_len(&sections, "req-hdr"), Some(145));
        assert!(has_body(&sections, "req-body"));
        assert!(!has_body(&sections, "null-body"));
    }

    #[test]
    fn test_parse_null_body() {
        let sections = parse("req-hdr=0, null-body=88").unwrap();
        assert!(has_body(&sections, "null-body"));
        assert_eq!(section_len(&sections, "req-hdr"), Some(88));
    }

    #[test]
    fn test_parse_respmod_three_sections() {
        let sections = parse("req-hdr=0, res-hdr=120, res-body=350").unwrap();
        assert_eq!(sections.len(), 3);
        assert_eq!(section_len(&sections, "res-hdr"), Some(230));
    }

    #[test]
    fn test_rejects_empty_header() {
        assert!(parse("").is_err());
    }

    #[test]
    fn test_rejects_non_ascending_offsets() {
        assert!(parse("req-hdr=100, req-body=10").is_err());
    }

    #[test]
    fn test_render_round_trips_shape() {
        let rendered = render(&[("req-hdr", 0), ("req-body", 42)]);
        assert_eq!(rendered, "req-hdr=0, req-body=42");
    }
}
