//! Instance identifiers: UUIDs, meta URIs and storage urls.
//!
//! Identity rule: every instance has a UUID.  If the instance has a uri,
//! the UUID is the deterministic version-5 UUID of that uri under the DNS
//! namespace `6ba7b810-9dad-11d1-80b4-00c04fd430c8`; otherwise a random
//! version-4 UUID is used.  Any two runtimes must agree on UUIDs given the
//! same uri.

use crate::errors::{ensure_or, raise, ErrorKind, Result};
use uuid::Uuid;

/// Length of a textual UUID (excluding any terminator).
pub const UUID_LEN: usize = 36;

/// How a UUID was obtained from an id string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UuidSource {
    /// The id was already a valid UUID and was copied (lowercased).
    Verbatim,
    /// The id was a non-UUID string; a version-5 UUID was derived from it.
    Hashed,
    /// No id was given; a random version-4 UUID was generated.
    Random,
}

/// Returns `true` if `s` is a valid 36-character hyphenated UUID.
pub fn is_uuid(s: &str) -> bool {
    s.len() == UUID_LEN
        && s.as_bytes()[8] == b'-'
        && s.as_bytes()[13] == b'-'
        && s.as_bytes()[18] == b'-'
        && s.as_bytes()[23] == b'-'
        && Uuid::try_parse(s).is_ok()
}

/// Deterministic version-5 UUID of `uri` under the DNS namespace.
pub fn uuid_of(uri: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, uri.as_bytes())
        .hyphenated()
        .to_string()
}

/// Random version-4 UUID.
pub fn random_uuid() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

/// Computes the UUID for an optional id per the identity rule.
///
/// - `None` or an empty string: a new random version-4 UUID.
/// - A valid UUID string: copied, normalized to lowercase.
/// - Anything else: the version-5 UUID of the string.
pub fn uuid_for(id: Option<&str>) -> (String, UuidSource) {
    match id {
        None => (random_uuid(), UuidSource::Random),
        Some("") => (random_uuid(), UuidSource::Random),
        Some(s) if is_uuid(s) => (s.to_ascii_lowercase(), UuidSource::Verbatim),
        Some(s) => (uuid_of(s), UuidSource::Hashed),
    }
}

/// Parses a textual UUID, accepting only the 36-character hyphenated form.
pub fn parse_uuid(s: &str) -> Result<Uuid> {
    ensure_or!(is_uuid(s), ErrorKind::Parse, "invalid uuid: \"{s}\"");
    Ok(Uuid::try_parse(s).expect("checked by is_uuid"))
}

// ---------------------------------------------------------------------------
// Meta URIs
// ---------------------------------------------------------------------------

/// Builds a meta uri `namespace/version/name`.
pub fn join_meta_uri(name: &str, version: &str, namespace: &str) -> String {
    format!("{namespace}/{version}/{name}")
}

/// Splits a meta uri into `(name, version, namespace)`.
pub fn split_meta_uri(uri: &str) -> Result<(String, String, String)> {
    let (rest, name) = match uri.rsplit_once('/') {
        Some(v) => v,
        None => raise!(ErrorKind::Syntax, "invalid meta uri: \"{uri}\""),
    };
    let (namespace, version) = match rest.rsplit_once('/') {
        Some(v) => v,
        None => raise!(ErrorKind::Syntax, "invalid meta uri: \"{uri}\""),
    };
    ensure_or!(
        !name.is_empty() && !version.is_empty() && !namespace.is_empty(),
        ErrorKind::Syntax,
        "invalid meta uri: \"{uri}\""
    );
    Ok((name.to_owned(), version.to_owned(), namespace.to_owned()))
}

// ---------------------------------------------------------------------------
// Storage urls
// ---------------------------------------------------------------------------

/// Components of a storage url `scheme://location?query#fragment`.
///
/// `scheme` names a driver, `query` holds the driver options and
/// `fragment` is an id shortcut for a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlParts<'a> {
    pub scheme: &'a str,
    pub location: &'a str,
    pub query: Option<&'a str>,
    pub fragment: Option<&'a str>,
}

/// Splits a storage url into its parts.
///
/// The location is everything between `scheme:[//]` and the first `?` or
/// `#`; it may be a bare filesystem path and is not normalized.
pub fn split_url(url: &str) -> Result<UrlParts<'_>> {
    let (scheme, rest) = match url.split_once(':') {
        Some(v) => v,
        None => raise!(ErrorKind::Syntax, "missing scheme in url: \"{url}\""),
    };
    ensure_or!(
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
        ErrorKind::Syntax,
        "invalid scheme in url: \"{url}\""
    );
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (rest, fragment) = match rest.split_once('#') {
        Some((r, f)) => (r, Some(f)),
        None => (rest, None),
    };
    let (location, query) = match rest.split_once('?') {
        Some((l, q)) => (l, Some(q)),
        None => (rest, None),
    };
    Ok(UrlParts {
        scheme,
        location,
        query,
        fragment,
    })
}

/// Builds a storage url from its parts.
pub fn join_url(
    scheme: &str,
    location: &str,
    query: Option<&str>,
    fragment: Option<&str>,
) -> String {
    let mut url = format!("{scheme}://{location}");
    if let Some(q) = query {
        url.push('?');
        url.push_str(q);
    }
    if let Some(f) = fragment {
        url.push('#');
        url.push_str(f);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_v5_from_dns_namespace() {
        assert_eq!(
            uuid_of("www.widgets.com"),
            "21f7f8de-8051-5b89-8680-0195ef798b6a"
        );
        assert_eq!(
            uuid_of("http://www.sintef.no/calm/0.1/Chemistry"),
            "62bfca3a-cd16-5046-b44b-a3d69b34fcff"
        );
    }

    #[test]
    fn uuid_round_trips() {
        let u = uuid_of("http://www.sintef.no/calm/0.1/Chemistry");
        assert!(is_uuid(&u));
        assert_eq!(parse_uuid(&u).unwrap().hyphenated().to_string(), u);
    }

    #[test]
    fn id_rule() {
        let (u, src) = uuid_for(None);
        assert_eq!(src, UuidSource::Random);
        assert!(is_uuid(&u));

        let (u, src) = uuid_for(Some("21F7F8DE-8051-5B89-8680-0195EF798B6A"));
        assert_eq!(src, UuidSource::Verbatim);
        assert_eq!(u, "21f7f8de-8051-5b89-8680-0195ef798b6a");

        let (u, src) = uuid_for(Some("www.widgets.com"));
        assert_eq!(src, UuidSource::Hashed);
        assert_eq!(u, "21f7f8de-8051-5b89-8680-0195ef798b6a");
    }

    #[test]
    fn meta_uri_split_join() {
        let uri = join_meta_uri("Chemistry", "0.1", "http://www.sintef.no/calm");
        assert_eq!(uri, "http://www.sintef.no/calm/0.1/Chemistry");
        let (name, version, namespace) = split_meta_uri(&uri).unwrap();
        assert_eq!(name, "Chemistry");
        assert_eq!(version, "0.1");
        assert_eq!(namespace, "http://www.sintef.no/calm");
        assert!(split_meta_uri("no-slashes-here").is_err());
    }

    #[test]
    fn url_split() {
        let p = split_url("json:///data/inst.json?mode=r;compact=yes#my-id").unwrap();
        assert_eq!(p.scheme, "json");
        assert_eq!(p.location, "/data/inst.json");
        assert_eq!(p.query, Some("mode=r;compact=yes"));
        assert_eq!(p.fragment, Some("my-id"));

        let p = split_url("memory://buf1").unwrap();
        assert_eq!(p.scheme, "memory");
        assert_eq!(p.location, "buf1");
        assert_eq!(p.query, None);
        assert_eq!(p.fragment, None);

        assert!(split_url("no-scheme-at-all").is_err());
    }

    #[test]
    fn url_join() {
        assert_eq!(
            join_url("json", "a.json", Some("mode=w"), Some("x")),
            "json://a.json?mode=w#x"
        );
        assert_eq!(join_url("json", "a.json", None, None), "json://a.json");
    }
}
