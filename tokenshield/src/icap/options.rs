//! `OPTIONS` handling (spec.md §4.7, §6).

use super::{ISTAG, SERVICE_STRING};

/// Build the `OPTIONS` response for `uri`. Advertises `REQMOD` unless the
/// request URI contains `/respmod`, in which case it advertises
/// `RESPMOD`, per spec.md §4.7.
#[must_use]
pub fn response(uri: &str) -> Vec<u8> {
    let methods = if uri.contains("/respmod") { "RESPMOD" } else { "REQMOD" };
    format!(
        "ICAP/1.0 200 OK\r\n\
         Methods: {methods}\r\n\
         Service: {SERVICE_STRING}\r\n\
         ISTag: {ISTAG}\r\n\
         Max-Connections: 100\r\n\
         Options-TTL: 3600\r\n\
         Allow: 204\r\n\
         Preview: 0\r\n\
         Transfer-Complete: *\r\n\
         Encapsulated: null-body=0\r\n\
         \r\n"
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reqmod_uri_advertises_reqmod() {
        let resp = String::from_utf8(response("icap://host/reqmod")).unwrap();
        assert!(resp.contains("Methods: REQMOD"));
    }

    #[test]
    fn test_respmod_uri_advertises_respmod() {
        let resp = String::from_utf8(response("icap://host/respmod")).unwrap();
        assert!(resp.contains("Methods: RESPMOD"));
    }

    #[test]
    fn test_always_advertises_204() {
        let resp = String::from_utf8(response("icap://host/reqmod")).unwrap();
        assert!(resp.contains("Allow: 204"));
    }
}
